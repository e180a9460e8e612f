//! Order event types and their routing.

use serde::{Deserialize, Serialize};

use super::OrderStatus;

/// Kinds of notification published to downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderEventType {
    OrderCreated,
    OrderPaid,
    OrderShipped,
    OrderCompleted,
    OrderCancelled,
    OrderTimeout,
    RefundRequested,
    OrderRefunded,
    RefundRejected,
    StockDeductionFailed,
}

impl OrderEventType {
    /// Event announcing that an order entered `status`.
    pub fn for_status(status: OrderStatus) -> Option<OrderEventType> {
        match status {
            OrderStatus::Pending => Some(OrderEventType::OrderCreated),
            OrderStatus::Paid => Some(OrderEventType::OrderPaid),
            OrderStatus::Shipped => Some(OrderEventType::OrderShipped),
            OrderStatus::Completed => Some(OrderEventType::OrderCompleted),
            OrderStatus::Cancelled => Some(OrderEventType::OrderCancelled),
            OrderStatus::RefundPending => Some(OrderEventType::RefundRequested),
            OrderStatus::Refunded => Some(OrderEventType::OrderRefunded),
        }
    }

    /// Message-bus routing key.
    pub fn routing_key(&self) -> &'static str {
        match self {
            OrderEventType::OrderCreated => "order.created",
            OrderEventType::OrderPaid => "order.paid",
            OrderEventType::OrderShipped => "order.shipped",
            OrderEventType::OrderCompleted => "order.completed",
            OrderEventType::OrderCancelled => "order.cancelled",
            OrderEventType::OrderTimeout => "order.timeout",
            OrderEventType::RefundRequested => "order.refund_requested",
            OrderEventType::OrderRefunded => "order.refunded",
            OrderEventType::RefundRejected => "order.refund_rejected",
            OrderEventType::StockDeductionFailed => "stock.deduction_failed",
        }
    }

    /// Returns the event type name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderEventType::OrderCreated => "OrderCreated",
            OrderEventType::OrderPaid => "OrderPaid",
            OrderEventType::OrderShipped => "OrderShipped",
            OrderEventType::OrderCompleted => "OrderCompleted",
            OrderEventType::OrderCancelled => "OrderCancelled",
            OrderEventType::OrderTimeout => "OrderTimeout",
            OrderEventType::RefundRequested => "RefundRequested",
            OrderEventType::OrderRefunded => "OrderRefunded",
            OrderEventType::RefundRejected => "RefundRejected",
            OrderEventType::StockDeductionFailed => "StockDeductionFailed",
        }
    }
}

impl std::fmt::Display for OrderEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_status_has_an_event() {
        for status in OrderStatus::ALL {
            assert!(OrderEventType::for_status(status).is_some(), "{status}");
        }
    }

    #[test]
    fn routing_keys_are_unique() {
        let keys: std::collections::HashSet<_> = [
            OrderEventType::OrderCreated,
            OrderEventType::OrderPaid,
            OrderEventType::OrderShipped,
            OrderEventType::OrderCompleted,
            OrderEventType::OrderCancelled,
            OrderEventType::OrderTimeout,
            OrderEventType::RefundRequested,
            OrderEventType::OrderRefunded,
            OrderEventType::RefundRejected,
            OrderEventType::StockDeductionFailed,
        ]
        .iter()
        .map(OrderEventType::routing_key)
        .collect();
        assert_eq!(keys.len(), 10);
    }

    #[test]
    fn timeout_is_distinct_from_cancel() {
        assert_ne!(
            OrderEventType::OrderTimeout.routing_key(),
            OrderEventType::OrderCancelled.routing_key()
        );
    }
}
