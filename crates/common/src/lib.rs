//! Identifier types shared across the order lifecycle crates.

pub mod types;

pub use types::{MerchantId, OrderId, OrderNo, ProductId, UserId};
