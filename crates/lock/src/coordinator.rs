use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{CoordinationStore, LockError, LockKey, Result};

/// Lock coordinator configuration.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// TTL used when the caller does not pick one.
    pub default_ttl: Duration,
    /// How long `acquire` keeps retrying a held lock before giving up.
    pub wait: Duration,
    pub poll_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(30),
            wait: Duration::from_secs(5),
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl LockConfig {
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Named, token-guarded mutual exclusion with TTL.
///
/// A lock is released only by the holder of the token that acquired it, so
/// a caller whose TTL lapsed cannot free a lock someone else has since
/// taken.
#[derive(Clone)]
pub struct LockCoordinator {
    store: Arc<dyn CoordinationStore>,
    config: LockConfig,
}

impl LockCoordinator {
    pub fn new(store: Arc<dyn CoordinationStore>, config: LockConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Single attempt to take `key` for `token`.
    pub async fn try_acquire(&self, key: &LockKey, token: &str, ttl: Duration) -> Result<bool> {
        self.store
            .set_if_absent(&key.to_string(), token, ttl)
            .await
    }

    /// Releases `key` if it is still held by `token`.
    pub async fn release(&self, key: &LockKey, token: &str) -> Result<bool> {
        self.store.compare_and_delete(&key.to_string(), token).await
    }

    /// Polls until `key` is taken for `token` or `wait` elapses.
    ///
    /// A zero `wait` makes exactly one attempt.
    pub async fn acquire(
        &self,
        key: &LockKey,
        token: &str,
        ttl: Duration,
        wait: Duration,
    ) -> Result<()> {
        let started = Instant::now();

        loop {
            if self.try_acquire(key, token, ttl).await? {
                metrics::histogram!("lock_wait_seconds").record(started.elapsed().as_secs_f64());
                debug!(key = %key, "Acquired lock");
                return Ok(());
            }

            let waited = started.elapsed();
            if waited >= wait {
                metrics::counter!("lock_contention_total").increment(1);
                warn!(key = %key, waited_ms = waited.as_millis() as u64, "Lock busy");
                return Err(LockError::Busy {
                    key: key.to_string(),
                    waited,
                });
            }

            tokio::time::sleep(self.config.poll_interval.min(wait - waited)).await;
        }
    }

    /// Runs `f` while holding `key`, waiting up to the configured bound.
    pub async fn with_lock<F, Fut, T, E>(
        &self,
        key: &LockKey,
        ttl: Duration,
        f: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<LockError>,
    {
        self.with_lock_within(key, ttl, self.config.wait, f).await
    }

    /// Runs `f` while holding `key`, waiting up to `wait` to acquire it.
    ///
    /// The lock is released whether `f` returns `Ok`, returns `Err` or
    /// panics; a panic is resumed after release.
    pub async fn with_lock_within<F, Fut, T, E>(
        &self,
        key: &LockKey,
        ttl: Duration,
        wait: Duration,
        f: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<LockError>,
    {
        let token = Uuid::new_v4().to_string();
        self.acquire(key, &token, ttl, wait).await?;

        let outcome = AssertUnwindSafe(async move { f().await })
            .catch_unwind()
            .await;

        match self.release(key, &token).await {
            Ok(true) => debug!(key = %key, "Released lock"),
            Ok(false) => warn!(key = %key, "Lock expired before release"),
            Err(e) => warn!(key = %key, error = %e, "Failed to release lock"),
        }

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
