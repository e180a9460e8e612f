//! Durable record of stock restorations that did not go through.
//!
//! A cancelled or refunded order stays cancelled or refunded when a restore
//! call fails. The failure is appended here and replayed later by
//! [`crate::OrderLifecycleCoordinator::retry_compensations`].

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, OrderNo, ProductId};

use crate::error::{CoordinatorError, Result};
use crate::services::{read, write};

/// A stock restoration still owed to the product service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationEntry {
    pub id: u64,
    pub order_id: OrderId,
    pub order_no: OrderNo,
    pub product_id: ProductId,
    pub quantity: u32,
    pub reason: String,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub done: bool,
}

/// Input for [`CompensationLog::record`].
#[derive(Debug, Clone)]
pub struct PendingRestore {
    pub order_id: OrderId,
    pub order_no: OrderNo,
    pub product_id: ProductId,
    pub quantity: u32,
    pub reason: String,
}

#[async_trait]
pub trait CompensationLog: Send + Sync {
    /// Appends an entry and returns its id.
    async fn record(&self, restore: PendingRestore, now: DateTime<Utc>) -> Result<u64>;

    /// Entries not yet marked done, oldest first.
    async fn pending(&self) -> Result<Vec<CompensationEntry>>;

    async fn mark_done(&self, id: u64) -> Result<()>;

    /// Counts a failed replay.
    async fn mark_attempted(&self, id: u64) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryLogState {
    entries: Vec<CompensationEntry>,
    next_id: u64,
    fail_on_record: bool,
}

/// In-memory compensation log. Entries do not survive a restart.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCompensationLog {
    state: Arc<RwLock<InMemoryLogState>>,
}

impl InMemoryCompensationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_record(&self, fail: bool) {
        write(&self.state).fail_on_record = fail;
    }

    pub fn entries(&self) -> Vec<CompensationEntry> {
        read(&self.state).entries.clone()
    }

    pub fn pending_count(&self) -> usize {
        read(&self.state).entries.iter().filter(|e| !e.done).count()
    }
}

#[async_trait]
impl CompensationLog for InMemoryCompensationLog {
    async fn record(&self, restore: PendingRestore, now: DateTime<Utc>) -> Result<u64> {
        let mut state = write(&self.state);

        if state.fail_on_record {
            return Err(CoordinatorError::CompensationLog(
                "Log unavailable".to_string(),
            ));
        }

        state.next_id += 1;
        let id = state.next_id;
        state.entries.push(CompensationEntry {
            id,
            order_id: restore.order_id,
            order_no: restore.order_no,
            product_id: restore.product_id,
            quantity: restore.quantity,
            reason: restore.reason,
            attempts: 0,
            created_at: now,
            done: false,
        });
        Ok(id)
    }

    async fn pending(&self) -> Result<Vec<CompensationEntry>> {
        Ok(read(&self.state)
            .entries
            .iter()
            .filter(|e| !e.done)
            .cloned()
            .collect())
    }

    async fn mark_done(&self, id: u64) -> Result<()> {
        let mut state = write(&self.state);
        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| CoordinatorError::CompensationLog(format!("Unknown entry {id}")))?;
        entry.done = true;
        Ok(())
    }

    async fn mark_attempted(&self, id: u64) -> Result<()> {
        let mut state = write(&self.state);
        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| CoordinatorError::CompensationLog(format!("Unknown entry {id}")))?;
        entry.attempts += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn restore(product: i64) -> PendingRestore {
        PendingRestore {
            order_id: OrderId::new(1),
            order_no: OrderNo::new("ORD1"),
            product_id: ProductId::new(product),
            quantity: 2,
            reason: "cancel".to_string(),
        }
    }

    #[tokio::test]
    async fn test_pending_excludes_done_entries() {
        let log = InMemoryCompensationLog::new();
        let first = log.record(restore(1), Utc::now()).await.unwrap();
        let second = log.record(restore(2), Utc::now()).await.unwrap();

        log.mark_attempted(second).await.unwrap();
        log.mark_done(first).await.unwrap();

        let pending = log.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second);
        assert_eq!(pending[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_unknown_entry_is_an_error() {
        let log = InMemoryCompensationLog::new();
        assert!(log.mark_done(42).await.is_err());
    }
}
