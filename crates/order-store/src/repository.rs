use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, OrderNo, UserId};
use domain::{Money, Order, OrderStatus, Version};

use crate::{Result, StoreError};

/// Persistence boundary for orders.
///
/// Orders are inserted once and afterwards only replaced through
/// [`OrderRepository::save`], which enforces optimistic versioning. Nothing
/// is ever deleted. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Allocates the surrogate id for a new order.
    async fn next_id(&self) -> Result<OrderId>;

    /// Persists a freshly placed order together with its items.
    ///
    /// Fails with `Duplicate` if the id or order number is taken. Returns the
    /// version assigned to the stored order.
    async fn insert(&self, order: &Order) -> Result<Version>;

    /// Replaces a stored order.
    ///
    /// Fails with `ConcurrencyConflict` if the stored version is not
    /// `expected`. Returns the new version.
    async fn save(&self, order: &Order, expected: Version) -> Result<Version>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>>;

    async fn find_by_order_no(&self, order_no: &OrderNo) -> Result<Option<Order>>;

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Orders in `status` created strictly before `cutoff`, oldest first.
    async fn find_by_status_created_before(
        &self,
        status: OrderStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>>;

    /// Orders in `status` shipped strictly before `cutoff`, oldest first.
    async fn find_by_status_shipped_before(
        &self,
        status: OrderStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>>;

    /// Number of orders in every status. Statuses with no orders map to 0.
    async fn count_by_status(&self) -> Result<HashMap<OrderStatus, u64>>;

    /// Sum of paid amounts over orders whose payment still stands.
    async fn sum_paid_revenue(&self) -> Result<Money>;
}

/// Extension trait providing convenience methods for order repositories.
#[async_trait]
pub trait OrderRepositoryExt: OrderRepository {
    /// Loads an order or fails with `OrderNotFound`.
    async fn load(&self, id: OrderId) -> Result<Order> {
        self.get(id).await?.ok_or(StoreError::OrderNotFound(id))
    }

    /// Loads an order by number or fails with `OrderNoNotFound`.
    async fn load_by_order_no(&self, order_no: &OrderNo) -> Result<Order> {
        self.find_by_order_no(order_no)
            .await?
            .ok_or_else(|| StoreError::OrderNoNotFound(order_no.clone()))
    }

    /// Saves `order` against the version it was loaded at and stamps the
    /// new version back onto it.
    async fn save_versioned(&self, order: &mut Order) -> Result<Version> {
        let version = self.save(order, order.version()).await?;
        order.set_version(version);
        Ok(version)
    }

    async fn total_count(&self) -> Result<u64> {
        Ok(self.count_by_status().await?.values().sum())
    }
}

// Blanket implementation for all OrderRepository implementations
impl<T: OrderRepository + ?Sized> OrderRepositoryExt for T {}

/// Statuses whose paid amount counts as revenue.
pub fn counts_as_revenue(status: OrderStatus) -> bool {
    matches!(
        status,
        OrderStatus::Paid | OrderStatus::Shipped | OrderStatus::Completed
    )
}
