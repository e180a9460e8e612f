//! Payment service trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::OrderNo;
use domain::Money;

use super::{read, write};
use crate::error::CoordinatorError;

/// Acknowledgement of a refund request.
#[derive(Debug, Clone)]
pub struct RefundAck {
    /// The refund ID assigned by the payment service.
    pub refund_id: String,
}

/// Trait for payment operations the coordinator needs.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Asks the payment provider to return `amount` for an order.
    async fn refund(
        &self,
        order_no: &OrderNo,
        amount: Money,
        reason: &str,
    ) -> Result<RefundAck, CoordinatorError>;
}

/// A refund accepted by the in-memory service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundRecord {
    pub refund_id: String,
    pub order_no: OrderNo,
    pub amount: Money,
    pub reason: String,
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    refunds: Vec<RefundRecord>,
    next_id: u32,
    fail_on_refund: bool,
}

/// In-memory payment service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentService {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentService {
    /// Creates a new in-memory payment service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail every refund call.
    pub fn set_fail_on_refund(&self, fail: bool) {
        write(&self.state).fail_on_refund = fail;
    }

    /// Returns the number of accepted refunds.
    pub fn refund_count(&self) -> usize {
        read(&self.state).refunds.len()
    }

    pub fn refunds_for(&self, order_no: &OrderNo) -> Vec<RefundRecord> {
        read(&self.state)
            .refunds
            .iter()
            .filter(|r| &r.order_no == order_no)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PaymentService for InMemoryPaymentService {
    async fn refund(
        &self,
        order_no: &OrderNo,
        amount: Money,
        reason: &str,
    ) -> Result<RefundAck, CoordinatorError> {
        let mut state = write(&self.state);

        if state.fail_on_refund {
            return Err(CoordinatorError::PaymentService(
                "Refund declined".to_string(),
            ));
        }

        state.next_id += 1;
        let refund_id = format!("REF-{:04}", state.next_id);
        state.refunds.push(RefundRecord {
            refund_id: refund_id.clone(),
            order_no: order_no.clone(),
            amount,
            reason: reason.to_string(),
        });

        Ok(RefundAck { refund_id })
    }
}
