//! Cart service trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::UserId;

use super::{read, write};
use crate::error::CoordinatorError;

/// Trait for cart operations the coordinator needs.
#[async_trait]
pub trait CartService: Send + Sync {
    /// Removes the items the buyer had selected for checkout.
    async fn clear_selected_items(&self, user_id: UserId) -> Result<(), CoordinatorError>;
}

#[derive(Debug, Default)]
struct InMemoryCartState {
    cleared: Vec<UserId>,
    fail_on_clear: bool,
}

/// In-memory cart service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartService {
    state: Arc<RwLock<InMemoryCartState>>,
}

impl InMemoryCartService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_clear(&self, fail: bool) {
        write(&self.state).fail_on_clear = fail;
    }

    /// Returns how many times the user's selection was cleared.
    pub fn clear_count(&self, user_id: UserId) -> usize {
        read(&self.state)
            .cleared
            .iter()
            .filter(|u| **u == user_id)
            .count()
    }
}

#[async_trait]
impl CartService for InMemoryCartService {
    async fn clear_selected_items(&self, user_id: UserId) -> Result<(), CoordinatorError> {
        let mut state = write(&self.state);

        if state.fail_on_clear {
            return Err(CoordinatorError::CartService(
                "Cart service unavailable".to_string(),
            ));
        }

        state.cleared.push(user_id);
        Ok(())
    }
}
