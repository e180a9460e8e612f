use common::{OrderId, OrderNo};
use domain::Version;
use thiserror::Error;

/// Errors that can occur when interacting with the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another writer saved the order after it was loaded.
    #[error(
        "Concurrency conflict for order {order_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        order_id: OrderId,
        expected: Version,
        actual: Version,
    },

    /// The order was not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// No order carries this order number.
    #[error("Order not found for order number: {0}")]
    OrderNoNotFound(OrderNo),

    /// An order with the same id or order number already exists.
    #[error("Duplicate order: {order_id} ({order_no})")]
    Duplicate { order_id: OrderId, order_no: OrderNo },

    /// The backing store could not serve the request.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for order store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
