//! Domain layer for the order lifecycle service.
//!
//! This crate provides the order aggregate and everything needed to decide
//! whether a transition is allowed, without performing any I/O:
//! - `OrderStatus` and the executable transition table
//! - Validator guards separating ownership failures from invalid-state failures
//! - Event routing keyed by status
//! - Fixed-point `Money`

pub mod order;

pub use order::{
    Money, NewOrder, Order, OrderError, OrderEventType, OrderItem, OrderStatus, OrderTransition,
    Recipient, SideEffect, TransitionKind, TransitionOutcome, Version, validator,
};
