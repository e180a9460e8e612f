use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when taking or releasing a lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock is held by someone else and was not freed within the wait bound.
    #[error("Too many concurrent requests: lock {key} still held after {waited:?}")]
    Busy { key: String, waited: Duration },

    /// The coordination store failed.
    #[error("Coordination store error: {0}")]
    Store(String),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Result type for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;
