//! Read-through cache for order lookups.
//!
//! Invalidation is an explicit call made after every persisted transition.
//! A transition invalidates the by-id entry, the by-number entry and every
//! cached list belonging to the order's user.

use std::collections::HashMap;
use std::sync::Arc;

use common::{OrderId, OrderNo, UserId};
use domain::Order;
use tokio::sync::RwLock;

#[derive(Default)]
struct Entries {
    by_id: HashMap<OrderId, Order>,
    by_order_no: HashMap<OrderNo, OrderId>,
    by_user: HashMap<UserId, Vec<Order>>,
}

#[derive(Clone, Default)]
pub struct OrderCache {
    entries: Arc<RwLock<Entries>>,
}

impl OrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: OrderId) -> Option<Order> {
        let hit = self.entries.read().await.by_id.get(&id).cloned();
        record_lookup(hit.is_some());
        hit
    }

    pub async fn get_by_order_no(&self, order_no: &OrderNo) -> Option<Order> {
        let entries = self.entries.read().await;
        let hit = entries
            .by_order_no
            .get(order_no)
            .and_then(|id| entries.by_id.get(id))
            .cloned();
        record_lookup(hit.is_some());
        hit
    }

    pub async fn get_user_orders(&self, user_id: UserId) -> Option<Vec<Order>> {
        let hit = self.entries.read().await.by_user.get(&user_id).cloned();
        record_lookup(hit.is_some());
        hit
    }

    pub async fn put(&self, order: &Order) {
        let mut entries = self.entries.write().await;
        entries
            .by_order_no
            .insert(order.order_no().clone(), order.id());
        entries.by_id.insert(order.id(), order.clone());
    }

    pub async fn put_user_orders(&self, user_id: UserId, orders: Vec<Order>) {
        self.entries.write().await.by_user.insert(user_id, orders);
    }

    /// Drops every entry that could describe `order`.
    pub async fn invalidate(&self, order: &Order) {
        let mut entries = self.entries.write().await;
        entries.by_id.remove(&order.id());
        entries.by_order_no.remove(order.order_no());
        entries.by_user.remove(&order.user_id());
        tracing::debug!(
            order_id = %order.id(),
            order_no = %order.order_no(),
            user_id = %order.user_id(),
            "Invalidated cached order"
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn record_lookup(hit: bool) {
    if hit {
        metrics::counter!("order_cache_hits_total").increment(1);
    } else {
        metrics::counter!("order_cache_misses_total").increment(1);
    }
}
