//! External collaborator traits and in-memory implementations.

pub mod cart;
pub mod payment;
pub mod product;

pub use cart::{CartService, InMemoryCartService};
pub use payment::{InMemoryPaymentService, PaymentService, RefundAck, RefundRecord};
pub use product::{InMemoryProductService, ProductService, ProductSnapshot, StockMovement};

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

// Fakes keep serving after a panicking test thread poisoned their state.
pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
