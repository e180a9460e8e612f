//! Coordinator error types.

use common::{OrderId, OrderNo, ProductId};
use domain::OrderError;
use lock::LockError;
use order_store::StoreError;
use thiserror::Error;

/// Errors that can occur during coordinator operations.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// No order with this order number.
    #[error("Order not found for order number: {0}")]
    OrderNoNotFound(OrderNo),

    /// A requested product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Not enough stock for a requested quantity.
    #[error("Insufficient stock for product {product_id}: requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
    },

    /// Stock deduction failed after the order was persisted.
    #[error("Stock deduction failed for product {product_id} on order {order_no}: {reason}")]
    StockDeductionFailed {
        product_id: ProductId,
        order_no: OrderNo,
        reason: String,
    },

    /// Guard or aggregate rejection.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Order store error.
    #[error("Order store error: {0}")]
    Store(#[from] StoreError),

    /// Lock error.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Product service error.
    #[error("Product service error: {0}")]
    ProductService(String),

    /// Cart service error.
    #[error("Cart service error: {0}")]
    CartService(String),

    /// Payment service error.
    #[error("Payment service error: {0}")]
    PaymentService(String),

    /// Event sink error.
    #[error("Event sink error: {0}")]
    EventSink(String),

    /// Compensation log error.
    #[error("Compensation log error: {0}")]
    CompensationLog(String),

    /// Malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Failure category exposed to the calling layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Permission,
    InvalidState,
    /// Back off and retry later.
    ConcurrencyRejected,
    Collaborator,
    Validation,
    Internal,
}

impl ErrorKind {
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::Permission => 403,
            ErrorKind::InvalidState => 409,
            ErrorKind::ConcurrencyRejected => 429,
            ErrorKind::Collaborator => 502,
            ErrorKind::Validation => 400,
            ErrorKind::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Permission => "permission",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::ConcurrencyRejected => "concurrency_rejected",
            ErrorKind::Collaborator => "collaborator",
            ErrorKind::Validation => "validation",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CoordinatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoordinatorError::OrderNotFound(_)
            | CoordinatorError::OrderNoNotFound(_)
            | CoordinatorError::ProductNotFound(_) => ErrorKind::NotFound,

            CoordinatorError::InsufficientStock { .. } | CoordinatorError::InvalidRequest(_) => {
                ErrorKind::Validation
            }

            CoordinatorError::Order(e) => match e {
                OrderError::PermissionDenied { .. } => ErrorKind::Permission,
                OrderError::InvalidState { .. } => ErrorKind::InvalidState,
                OrderError::NoItems
                | OrderError::InvalidQuantity { .. }
                | OrderError::InvalidAmount { .. } => ErrorKind::Validation,
            },

            CoordinatorError::Store(e) => match e {
                StoreError::OrderNotFound(_) | StoreError::OrderNoNotFound(_) => {
                    ErrorKind::NotFound
                }
                StoreError::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyRejected,
                StoreError::Duplicate { .. } | StoreError::Unavailable(_) => ErrorKind::Internal,
            },

            CoordinatorError::Lock(LockError::Busy { .. }) => ErrorKind::ConcurrencyRejected,
            CoordinatorError::Lock(_) => ErrorKind::Internal,

            CoordinatorError::StockDeductionFailed { .. }
            | CoordinatorError::ProductService(_)
            | CoordinatorError::CartService(_)
            | CoordinatorError::PaymentService(_)
            | CoordinatorError::EventSink(_) => ErrorKind::Collaborator,

            CoordinatorError::CompensationLog(_) => ErrorKind::Internal,
        }
    }

    /// True if a lock was busy or another writer got there first.
    pub fn is_concurrency_rejection(&self) -> bool {
        self.kind() == ErrorKind::ConcurrencyRejected
    }
}

/// Convenience type alias for coordinator results.
pub type Result<T> = std::result::Result<T, CoordinatorError>;
