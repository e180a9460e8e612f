use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, OrderNo, UserId};
use domain::{Money, Order, OrderStatus, Version};
use tokio::sync::RwLock;

use crate::{OrderRepository, Result, StoreError, repository::counts_as_revenue};

#[derive(Default)]
struct State {
    orders: HashMap<OrderId, Order>,
    by_order_no: HashMap<OrderNo, OrderId>,
}

/// In-memory order repository.
///
/// Provides the same versioning semantics a relational store would give
/// through a `WHERE version = ?` update, and is the default backing store
/// for tests and the standalone server.
#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    state: Arc<RwLock<State>>,
    sequence: Arc<AtomicI64>,
    fail_on_save: Arc<AtomicBool>,
    fail_on_insert: Arc<AtomicBool>,
}

impl InMemoryOrderRepository {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `save` fail with `Unavailable`.
    pub fn set_fail_on_save(&self, fail: bool) {
        self.fail_on_save.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `insert` fail with `Unavailable`.
    pub fn set_fail_on_insert(&self, fail: bool) {
        self.fail_on_insert.store(fail, Ordering::SeqCst);
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

fn oldest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by_key(|o| (o.created_at(), o.id()));
    orders
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn next_id(&self) -> Result<OrderId> {
        Ok(OrderId::new(self.sequence.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn insert(&self, order: &Order) -> Result<Version> {
        if self.fail_on_insert.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("insert disabled".to_string()));
        }

        let mut state = self.state.write().await;

        if state.orders.contains_key(&order.id())
            || state.by_order_no.contains_key(order.order_no())
        {
            return Err(StoreError::Duplicate {
                order_id: order.id(),
                order_no: order.order_no().clone(),
            });
        }

        let version = Version::initial().next();
        let mut stored = order.clone();
        stored.set_version(version);

        state
            .by_order_no
            .insert(order.order_no().clone(), order.id());
        state.orders.insert(order.id(), stored);

        Ok(version)
    }

    async fn save(&self, order: &Order, expected: Version) -> Result<Version> {
        if self.fail_on_save.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("save disabled".to_string()));
        }

        let mut state = self.state.write().await;

        let current = state
            .orders
            .get(&order.id())
            .map(Order::version)
            .ok_or(StoreError::OrderNotFound(order.id()))?;

        if current != expected {
            metrics::counter!("order_store_conflicts_total").increment(1);
            return Err(StoreError::ConcurrencyConflict {
                order_id: order.id(),
                expected,
                actual: current,
            });
        }

        let version = current.next();
        let mut stored = order.clone();
        stored.set_version(version);
        state.orders.insert(order.id(), stored);

        Ok(version)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn find_by_order_no(&self, order_no: &OrderNo) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .by_order_no
            .get(order_no)
            .and_then(|id| state.orders.get(id))
            .cloned())
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let orders = state
            .orders
            .values()
            .filter(|o| o.user_id() == user_id)
            .cloned()
            .collect();
        Ok(oldest_first(orders))
    }

    async fn find_by_status_created_before(
        &self,
        status: OrderStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let orders = state
            .orders
            .values()
            .filter(|o| o.status() == status && o.created_at() < cutoff)
            .cloned()
            .collect();
        Ok(oldest_first(orders))
    }

    async fn find_by_status_shipped_before(
        &self,
        status: OrderStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.status() == status && o.shipped_at().is_some_and(|at| at < cutoff))
            .cloned()
            .collect();
        orders.sort_by_key(|o| (o.shipped_at(), o.id()));
        Ok(orders)
    }

    async fn count_by_status(&self) -> Result<HashMap<OrderStatus, u64>> {
        let state = self.state.read().await;
        let mut counts: HashMap<OrderStatus, u64> =
            OrderStatus::ALL.into_iter().map(|s| (s, 0)).collect();
        for order in state.orders.values() {
            *counts.entry(order.status()).or_default() += 1;
        }
        Ok(counts)
    }

    async fn sum_paid_revenue(&self) -> Result<Money> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .filter(|o| counts_as_revenue(o.status()))
            .map(Order::paid_amount)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OrderRepositoryExt;
    use chrono::Duration;
    use common::ProductId;
    use domain::{NewOrder, OrderItem, OrderTransition, Recipient};

    async fn placed(repo: &InMemoryOrderRepository, created_at: DateTime<Utc>) -> Order {
        let id = repo.next_id().await.unwrap();
        let mut order = Order::place(NewOrder {
            id,
            order_no: OrderNo::new(format!("ORD{id}")),
            user_id: UserId::new(1),
            items: vec![OrderItem::new(
                ProductId::new(1),
                "Widget",
                Money::from_cents(1000),
                1,
            )],
            shipping_fee: Money::zero(),
            discount_amount: Money::zero(),
            recipient: Recipient::default(),
            remark: None,
            created_at,
        })
        .unwrap();
        let version = repo.insert(&order).await.unwrap();
        order.set_version(version);
        order
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = InMemoryOrderRepository::new();
        let order = placed(&repo, Utc::now()).await;

        let loaded = repo.load(order.id()).await.unwrap();
        assert_eq!(loaded.version(), Version::new(1));
        assert_eq!(loaded, order);

        let by_no = repo.load_by_order_no(order.order_no()).await.unwrap();
        assert_eq!(by_no.id(), order.id());
    }

    #[tokio::test]
    async fn test_ids_are_sequential() {
        let repo = InMemoryOrderRepository::new();
        assert_eq!(repo.next_id().await.unwrap(), OrderId::new(1));
        assert_eq!(repo.next_id().await.unwrap(), OrderId::new(2));
    }

    #[tokio::test]
    async fn test_duplicate_order_no_rejected() {
        let repo = InMemoryOrderRepository::new();
        let order = placed(&repo, Utc::now()).await;

        let result = repo.insert(&order).await;
        assert!(matches!(result, Err(StoreError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn test_stale_save_conflicts() {
        let repo = InMemoryOrderRepository::new();
        let order = placed(&repo, Utc::now()).await;

        let mut first = order.clone();
        first
            .apply_transition(
                OrderTransition::Cancel {
                    reason: "a".to_string(),
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(repo.save_versioned(&mut first).await.unwrap(), Version::new(2));

        let mut second = order;
        second
            .apply_transition(
                OrderTransition::SweepCancel {
                    reason: "b".to_string(),
                },
                Utc::now(),
            )
            .unwrap();
        let result = repo.save_versioned(&mut second).await;

        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict { expected, actual, .. })
                if expected == Version::new(1) && actual == Version::new(2)
        ));
    }

    #[tokio::test]
    async fn test_find_stale_pending() {
        let repo = InMemoryOrderRepository::new();
        let now = Utc::now();
        let old = placed(&repo, now - Duration::minutes(40)).await;
        let _fresh = placed(&repo, now - Duration::minutes(5)).await;

        let stale = repo
            .find_by_status_created_before(OrderStatus::Pending, now - Duration::minutes(30))
            .await
            .unwrap();

        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id(), old.id());
    }

    #[tokio::test]
    async fn test_counts_and_revenue() {
        let repo = InMemoryOrderRepository::new();
        let mut paid = placed(&repo, Utc::now()).await;
        let _pending = placed(&repo, Utc::now()).await;

        paid.apply_transition(
            OrderTransition::Pay {
                payment_id: "P1".to_string(),
            },
            Utc::now(),
        )
        .unwrap();
        repo.save_versioned(&mut paid).await.unwrap();

        let counts = repo.count_by_status().await.unwrap();
        assert_eq!(counts[&OrderStatus::Pending], 1);
        assert_eq!(counts[&OrderStatus::Paid], 1);
        assert_eq!(counts[&OrderStatus::Refunded], 0);
        assert_eq!(repo.total_count().await.unwrap(), 2);
        assert_eq!(repo.sum_paid_revenue().await.unwrap(), Money::from_cents(1000));
    }

    #[tokio::test]
    async fn test_fail_on_save_switch() {
        let repo = InMemoryOrderRepository::new();
        let order = placed(&repo, Utc::now()).await;
        repo.set_fail_on_save(true);

        let result = repo.save(&order, order.version()).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
