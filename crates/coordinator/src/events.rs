//! Event Publisher.
//!
//! Turns committed transitions into messages for downstream consumers.
//! Publication is bounded by a timeout and its failures never fail the
//! transition that produced the event.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, OrderNo, UserId};
use domain::{Money, Order, OrderEventType, OrderStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoordinatorError;
use crate::services::{read, write};

/// A message describing something that happened to an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub event_id: Uuid,
    pub event_type: OrderEventType,
    pub order_id: OrderId,
    pub order_no: OrderNo,
    pub user_id: UserId,
    pub old_status: Option<OrderStatus>,
    pub new_status: Option<OrderStatus>,
    pub amount: Money,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl OrderEvent {
    /// Builds an event from the order's state after a transition.
    pub fn for_order(
        event_type: OrderEventType,
        order: &Order,
        old_status: Option<OrderStatus>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let amount = match event_type {
            OrderEventType::RefundRequested => order.payable_amount(),
            OrderEventType::OrderRefunded => order.refund_amount(),
            OrderEventType::OrderPaid => order.paid_amount(),
            _ => order.total_amount(),
        };

        Self {
            event_id: Uuid::new_v4(),
            event_type,
            order_id: order.id(),
            order_no: order.order_no().clone(),
            user_id: order.user_id(),
            old_status,
            new_status: Some(order.status()),
            amount,
            description: describe(event_type, order),
            occurred_at,
            payload: payload(event_type, order),
        }
    }

    pub fn routing_key(&self) -> &'static str {
        self.event_type.routing_key()
    }
}

fn describe(event_type: OrderEventType, order: &Order) -> String {
    match event_type {
        OrderEventType::OrderCreated => "Order created".to_string(),
        OrderEventType::OrderPaid => "Order paid".to_string(),
        OrderEventType::OrderShipped => "Order shipped".to_string(),
        OrderEventType::OrderCompleted => "Order completed".to_string(),
        OrderEventType::OrderCancelled => match order.cancel_reason() {
            Some(reason) => format!("Order cancelled: {reason}"),
            None => "Order cancelled".to_string(),
        },
        OrderEventType::OrderTimeout => "Order payment timed out".to_string(),
        OrderEventType::RefundRequested => match order.refund_reason() {
            Some(reason) => format!("Refund requested: {reason}"),
            None => "Refund requested".to_string(),
        },
        OrderEventType::OrderRefunded => "Order refunded".to_string(),
        OrderEventType::RefundRejected => "Refund rejected".to_string(),
        OrderEventType::StockDeductionFailed => "Stock deduction failed".to_string(),
    }
}

fn payload(event_type: OrderEventType, order: &Order) -> serde_json::Value {
    match event_type {
        OrderEventType::OrderCreated | OrderEventType::StockDeductionFailed => {
            let items: Vec<_> = order
                .items()
                .iter()
                .map(|item| {
                    serde_json::json!({
                        "productId": item.product_id,
                        "quantity": item.quantity,
                    })
                })
                .collect();
            serde_json::json!({ "items": items })
        }
        OrderEventType::OrderPaid => serde_json::json!({
            "paymentId": order.payment_id(),
            "paidAt": order.paid_at(),
        }),
        OrderEventType::OrderShipped => serde_json::json!({
            "logisticsCompany": order.logistics_company(),
            "trackingNo": order.tracking_no(),
        }),
        OrderEventType::OrderCancelled | OrderEventType::OrderTimeout => serde_json::json!({
            "reason": order.cancel_reason(),
            "stockRestored": order.stock_restored(),
        }),
        OrderEventType::RefundRequested | OrderEventType::RefundRejected => serde_json::json!({
            "reason": order.refund_reason(),
        }),
        OrderEventType::OrderRefunded => serde_json::json!({
            "refundAmount": order.refund_amount(),
        }),
        OrderEventType::OrderCompleted => serde_json::json!({
            "confirmedAt": order.confirmed_at(),
        }),
    }
}

/// Destination for order events, such as a message broker.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Delivers one event under its routing key.
    async fn publish(&self, event: &OrderEvent) -> Result<(), CoordinatorError>;
}

#[derive(Debug, Default)]
struct InMemorySinkState {
    events: Vec<OrderEvent>,
    fail_on_publish: bool,
    delay: Option<Duration>,
}

/// In-memory event sink for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventSink {
    state: Arc<RwLock<InMemorySinkState>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_publish(&self, fail: bool) {
        write(&self.state).fail_on_publish = fail;
    }

    /// Delays every publish call, to exercise the publish timeout.
    pub fn set_delay(&self, delay: Option<Duration>) {
        write(&self.state).delay = delay;
    }

    pub fn events(&self) -> Vec<OrderEvent> {
        read(&self.state).events.clone()
    }

    pub fn events_for(&self, order_id: OrderId) -> Vec<OrderEvent> {
        read(&self.state)
            .events
            .iter()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect()
    }

    /// Event types published for an order, in order.
    pub fn types_for(&self, order_id: OrderId) -> Vec<OrderEventType> {
        self.events_for(order_id)
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }

    pub fn count_of(&self, event_type: OrderEventType) -> usize {
        read(&self.state)
            .events
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn publish(&self, event: &OrderEvent) -> Result<(), CoordinatorError> {
        let delay = read(&self.state).delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = write(&self.state);
        if state.fail_on_publish {
            return Err(CoordinatorError::EventSink("Broker unavailable".to_string()));
        }
        state.events.push(event.clone());
        Ok(())
    }
}

/// Fire-and-forget publisher with a bounded wait.
#[derive(Clone)]
pub struct EventPublisher {
    sink: Arc<dyn EventSink>,
    timeout: Duration,
}

impl EventPublisher {
    pub fn new(sink: Arc<dyn EventSink>, timeout: Duration) -> Self {
        Self { sink, timeout }
    }

    /// Publishes `event`, logging instead of failing. Returns true if the
    /// sink accepted it in time.
    pub async fn publish(&self, event: OrderEvent) -> bool {
        let routing_key = event.routing_key();

        match tokio::time::timeout(self.timeout, self.sink.publish(&event)).await {
            Ok(Ok(())) => {
                metrics::counter!("order_events_published_total", "routing_key" => routing_key)
                    .increment(1);
                tracing::debug!(
                    event_id = %event.event_id,
                    order_id = %event.order_id,
                    routing_key,
                    "Published order event"
                );
                true
            }
            Ok(Err(e)) => {
                metrics::counter!("order_event_publish_failures_total", "routing_key" => routing_key)
                    .increment(1);
                tracing::warn!(
                    order_id = %event.order_id,
                    routing_key,
                    error = %e,
                    "Failed to publish order event"
                );
                false
            }
            Err(_) => {
                metrics::counter!("order_event_publish_failures_total", "routing_key" => routing_key)
                    .increment(1);
                tracing::warn!(
                    order_id = %event.order_id,
                    routing_key,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Timed out publishing order event"
                );
                false
            }
        }
    }
}
