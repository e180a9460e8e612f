//! Order aggregate and related types.

mod aggregate;
mod events;
mod state;
mod transition;
pub mod validator;
mod value_objects;

pub use aggregate::{NewOrder, Order};
pub use events::OrderEventType;
pub use state::OrderStatus;
pub use transition::{OrderTransition, SideEffect, TransitionKind, TransitionOutcome};
pub use value_objects::{Money, OrderItem, Recipient, Version};

use common::{OrderId, ProductId, UserId};
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The caller does not own the order.
    #[error("User {user_id} does not own order {order_id}")]
    PermissionDenied { order_id: OrderId, user_id: UserId },

    /// Order is not in a status that allows the action.
    #[error("Invalid state transition: cannot {action} from {current} state")]
    InvalidState {
        current: OrderStatus,
        action: &'static str,
    },

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// Invalid quantity.
    #[error("Invalid quantity for product {product_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    /// Negative amount.
    #[error("Invalid {field}: {amount}")]
    InvalidAmount { field: &'static str, amount: Money },
}
