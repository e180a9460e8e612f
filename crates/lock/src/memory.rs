use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{CoordinationStore, LockError, Result};

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-memory coordination store for tests and single-instance deployments.
///
/// Expiry follows `tokio::time`, so paused-clock tests can advance past a
/// TTL without sleeping.
#[derive(Clone, Default)]
pub struct InMemoryCoordinationStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    fail_on_acquire: Arc<AtomicBool>,
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_acquire(&self, fail: bool) {
        self.fail_on_acquire.store(fail, Ordering::SeqCst);
    }

    /// Returns the live value under `key`, if any.
    pub async fn value(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    /// Number of keys currently held.
    pub async fn held_count(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        if self.fail_on_acquire.load(Ordering::SeqCst) {
            return Err(LockError::Store("set_if_absent disabled".to_string()));
        }

        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        if let Some(existing) = entries.get(key)
            && existing.expires_at > now
        {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        match entries.get(key) {
            Some(entry) if entry.value == expected && entry.expires_at > now => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
