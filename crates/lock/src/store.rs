use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// A shared key-value store offering the two atomic primitives locks need.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Stores `value` under `key` with a TTL only if `key` is absent or
    /// expired. Returns true if the value was stored.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Deletes `key` only if it currently holds `expected`. Returns true if
    /// the key was deleted.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool>;
}
