//! Event sink that writes order events to the log.

use async_trait::async_trait;
use coordinator::{CoordinatorError, EventSink, OrderEvent};

/// Emits each event as a structured `info` record under the
/// `order_events` target, with the serialized event attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn publish(&self, event: &OrderEvent) -> Result<(), CoordinatorError> {
        let body = serde_json::to_string(event)
            .map_err(|e| CoordinatorError::EventSink(format!("failed to encode event: {e}")))?;

        tracing::info!(
            target: "order_events",
            routing_key = event.routing_key(),
            order_no = %event.order_no,
            event = %body,
            "{}",
            event.description
        );
        Ok(())
    }
}
