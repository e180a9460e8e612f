//! Lock Coordinator.
//!
//! Named, token-guarded mutual exclusion with TTL over any store offering
//! atomic set-if-absent and compare-and-delete:
//! - `CoordinationStore` trait with in-memory and Redis implementations
//! - `LockCoordinator` with single-attempt, bounded-wait and scoped acquisition
//! - `LockKey` naming per concern

pub mod coordinator;
pub mod error;
pub mod key;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod store;

pub use coordinator::{LockConfig, LockCoordinator};
pub use error::{LockError, Result};
pub use key::LockKey;
pub use memory::InMemoryCoordinationStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisCoordinationStore;
pub use store::CoordinationStore;
