//! Order Lifecycle Coordinator.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{OrderId, OrderNo, ProductId, UserId};
use domain::{
    NewOrder, Order, OrderError, OrderEventType, OrderItem, OrderStatus, OrderTransition,
    TransitionKind, TransitionOutcome, validator,
};
use lock::{LockCoordinator, LockKey};
use order_store::{OrderCache, OrderRepository, OrderRepositoryExt};
use tracing::{debug, error, info, warn};

use crate::compensation::{CompensationLog, InMemoryCompensationLog, PendingRestore};
use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, ErrorKind, Result};
use crate::events::{EventPublisher, OrderEvent};
use crate::metrics::{MetricsRecorder, NoopMetricsRecorder};
use crate::requests::{
    CompensationReport, CreateOrderRequest, Logistics, OrderLineRequest, PaymentOutcome,
};
use crate::services::{CartService, PaymentService, ProductService, ProductSnapshot};

/// Drives orders through their lifecycle.
///
/// Every mutation loads the order, checks the guards, applies one
/// transition from the table, saves against the loaded version and then
/// performs the transition's side effects: stock restoration, refund
/// initiation, cache invalidation, metrics and events. Mutations for the
/// same order, order number or buyer are serialized through the lock
/// coordinator; confirmation is the exception and relies on versioning.
pub struct OrderLifecycleCoordinator<R, P, C, Y>
where
    R: OrderRepository,
    P: ProductService,
    C: CartService,
    Y: PaymentService,
{
    repository: R,
    products: P,
    cart: C,
    payment: Y,
    locks: LockCoordinator,
    publisher: EventPublisher,
    metrics: Arc<dyn MetricsRecorder>,
    compensation: Arc<dyn CompensationLog>,
    cache: OrderCache,
    config: CoordinatorConfig,
}

impl<R, P, C, Y> OrderLifecycleCoordinator<R, P, C, Y>
where
    R: OrderRepository,
    P: ProductService,
    C: CartService,
    Y: PaymentService,
{
    /// Creates a coordinator with no-op metrics, an in-memory compensation
    /// log and an empty cache.
    pub fn new(
        repository: R,
        products: P,
        cart: C,
        payment: Y,
        locks: LockCoordinator,
        publisher: EventPublisher,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            repository,
            products,
            cart,
            payment,
            locks,
            publisher,
            metrics: Arc::new(NoopMetricsRecorder),
            compensation: Arc::new(InMemoryCompensationLog::new()),
            cache: OrderCache::new(),
            config,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_compensation_log(mut self, log: Arc<dyn CompensationLog>) -> Self {
        self.compensation = log;
        self
    }

    pub fn with_cache(mut self, cache: OrderCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn locks(&self) -> &LockCoordinator {
        &self.locks
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    // ---- create ----

    pub async fn create(&self, request: CreateOrderRequest) -> Result<Order> {
        self.create_at(request, Utc::now()).await
    }

    /// Places an order for `request.user_id`.
    ///
    /// Every line is checked for stock before anything is written. Stock is
    /// deducted after the order is persisted; if a deduction fails the
    /// order is cancelled, the lines already deducted are restored and the
    /// error is returned.
    #[tracing::instrument(
        skip(self, request),
        fields(user_id = %request.user_id, lines = request.items.len())
    )]
    pub async fn create_at(&self, request: CreateOrderRequest, now: DateTime<Utc>) -> Result<Order> {
        let started = std::time::Instant::now();
        let key = LockKey::Create(request.user_id);

        let result = self
            .locks
            .with_lock(&key, self.config.create_lock_ttl, move || {
                self.create_locked(request, now)
            })
            .await;

        if let Ok(order) = &result {
            self.metrics.record_created(order, started.elapsed());
        }
        self.observe("create", result)
    }

    async fn create_locked(&self, request: CreateOrderRequest, now: DateTime<Utc>) -> Result<Order> {
        if request.items.is_empty() {
            return Err(OrderError::NoItems.into());
        }
        if let Some(line) = request.items.iter().find(|line| line.quantity == 0) {
            return Err(OrderError::InvalidQuantity {
                product_id: line.product_id,
                quantity: line.quantity,
            }
            .into());
        }

        let items = self.snapshot_items(&request.items).await?;

        for item in &items {
            if !self
                .products
                .check_stock(item.product_id, item.quantity)
                .await?
            {
                return Err(CoordinatorError::InsufficientStock {
                    product_id: item.product_id,
                    requested: item.quantity,
                });
            }
        }

        let id = self.repository.next_id().await?;
        let mut order = Order::place(NewOrder {
            id,
            order_no: OrderNo::generate(&self.config.order_no_prefix, now),
            user_id: request.user_id,
            items,
            shipping_fee: request.shipping_fee,
            discount_amount: request.discount_amount,
            recipient: request.recipient,
            remark: request.remark,
            created_at: now,
        })?;

        let version = self.repository.insert(&order).await?;
        order.set_version(version);
        self.cache.invalidate(&order).await;

        let mut deducted = Vec::new();
        for (product_id, quantity) in lines(&order) {
            let failure = match self
                .products
                .deduct_stock(product_id, quantity, order.order_no())
                .await
            {
                Ok(true) => {
                    deducted.push((product_id, quantity));
                    continue;
                }
                Ok(false) => "stock service refused the deduction".to_string(),
                Err(e) => e.to_string(),
            };
            return Err(self
                .abort_creation(order, &deducted, product_id, failure, now)
                .await);
        }

        let mut settled = order.clone();
        settled.mark_stock_deducted()?;
        match self.repository.save_versioned(&mut settled).await {
            Ok(_) => order = settled,
            Err(e) => {
                // Stock is out but the record does not say so; a later
                // cancellation restores nothing for this order.
                metrics::counter!("order_stock_deduction_unrecorded_total").increment(1);
                error!(
                    order_id = %order.id(),
                    order_no = %order.order_no(),
                    error = %e,
                    "Failed to record stock deduction"
                );
            }
        }
        self.cache.invalidate(&order).await;

        if let Err(e) = self.cart.clear_selected_items(order.user_id()).await {
            warn!(
                order_id = %order.id(),
                user_id = %order.user_id(),
                error = %e,
                "Failed to clear cart selection"
            );
        }

        self.publish(OrderEventType::OrderCreated, &order, None, now)
            .await;

        info!(
            order_id = %order.id(),
            order_no = %order.order_no(),
            total = %order.total_amount(),
            "Order created"
        );
        Ok(order)
    }

    /// Copies catalog data onto order lines. Prices always come from the
    /// catalog.
    async fn snapshot_items(&self, lines: &[OrderLineRequest]) -> Result<Vec<OrderItem>> {
        let ids: Vec<ProductId> = lines.iter().map(|line| line.product_id).collect();
        let catalog: HashMap<ProductId, ProductSnapshot> = self
            .products
            .get_products_batch(&ids)
            .await?
            .into_iter()
            .map(|product| (product.product_id, product))
            .collect();

        lines
            .iter()
            .map(|line| {
                let product = catalog
                    .get(&line.product_id)
                    .ok_or(CoordinatorError::ProductNotFound(line.product_id))?;

                let mut item = OrderItem::new(
                    product.product_id,
                    product.name.clone(),
                    product.price,
                    line.quantity,
                );
                if let Some(merchant_id) = product.merchant_id {
                    item = item.with_merchant(merchant_id);
                }
                if let Some(image) = &product.image {
                    item = item.with_image(image.clone());
                }
                if let Some(spec) = &line.spec {
                    item = item.with_spec(spec.clone());
                }
                Ok(item)
            })
            .collect()
    }

    /// Undoes a creation whose stock deduction failed part-way.
    ///
    /// The stored order was never marked as deducted, so no later
    /// cancellation restores its stock. The lines deducted here are put
    /// back here and nowhere else.
    async fn abort_creation(
        &self,
        mut order: Order,
        deducted: &[(ProductId, u32)],
        failed_product: ProductId,
        reason: String,
        now: DateTime<Utc>,
    ) -> CoordinatorError {
        error!(
            order_id = %order.id(),
            order_no = %order.order_no(),
            product_id = %failed_product,
            reason = %reason,
            "Stock deduction failed, aborting order"
        );

        self.publish(OrderEventType::StockDeductionFailed, &order, None, now)
            .await;

        let abort = OrderTransition::Cancel {
            reason: "stock deduction failed".to_string(),
        };
        if let Err(e) = self.persist(&mut order, abort, now).await {
            error!(
                order_id = %order.id(),
                error = %e,
                "Failed to cancel order after stock deduction failure"
            );
        }

        self.restore_lines(&order, deducted, "aborted creation", now)
            .await;

        CoordinatorError::StockDeductionFailed {
            product_id: failed_product,
            order_no: order.order_no().clone(),
            reason,
        }
    }

    // ---- buyer transitions ----

    pub async fn cancel(&self, order_id: OrderId, user_id: UserId, reason: String) -> Result<Order> {
        self.cancel_at(order_id, user_id, reason, Utc::now()).await
    }

    /// Cancels a PENDING or PAID order owned by `user_id`.
    #[tracing::instrument(skip(self, reason))]
    pub async fn cancel_at(
        &self,
        order_id: OrderId,
        user_id: UserId,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        let result = self
            .locks
            .with_lock(
                &LockKey::Cancel(order_id),
                self.config.cancel_lock_ttl,
                move || async move {
                    let order = self.load(order_id).await?;
                    validator::is_owner(&order, user_id)?;
                    validator::can_cancel(&order)?;
                    self.drive(order, OrderTransition::Cancel { reason }, now)
                        .await
                },
            )
            .await;
        self.observe("cancel", result)
    }

    pub async fn confirm(&self, order_id: OrderId, user_id: UserId) -> Result<Order> {
        self.confirm_at(order_id, user_id, Utc::now()).await
    }

    /// Marks a SHIPPED order as received.
    ///
    /// Takes no lock: SHIPPED is the only source state, so a concurrent
    /// second confirm fails the version check or the state guard.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_at(
        &self,
        order_id: OrderId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        let result = async {
            let order = self.load(order_id).await?;
            validator::is_owner(&order, user_id)?;
            validator::can_confirm(&order)?;
            self.drive(order, OrderTransition::Confirm, now).await
        }
        .await;
        self.observe("confirm", result)
    }

    pub async fn apply_refund(
        &self,
        order_id: OrderId,
        user_id: UserId,
        reason: String,
    ) -> Result<Order> {
        self.apply_refund_at(order_id, user_id, reason, Utc::now())
            .await
    }

    /// Requests a refund and asks the payment service to return the payable
    /// amount.
    ///
    /// If the payment service refuses, the order is moved back to the
    /// status it had before the request and the payment error is returned.
    #[tracing::instrument(skip(self, reason))]
    pub async fn apply_refund_at(
        &self,
        order_id: OrderId,
        user_id: UserId,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        let result = self
            .locks
            .with_lock(
                &LockKey::Status(order_id),
                self.config.status_lock_ttl,
                move || async move {
                    let order = self.load(order_id).await?;
                    validator::is_owner(&order, user_id)?;
                    validator::can_refund(&order)?;
                    self.drive(order, OrderTransition::RequestRefund { reason }, now)
                        .await
                },
            )
            .await;
        self.observe("apply_refund", result)
    }

    // ---- merchant and administrative transitions ----

    pub async fn pay(&self, order_no: &OrderNo, payment_id: String) -> Result<PaymentOutcome> {
        self.pay_at(order_no, payment_id, Utc::now()).await
    }

    /// Applies a payment callback.
    ///
    /// A callback for an order that already left PENDING changes nothing and
    /// reports the current status, so duplicate deliveries are harmless.
    #[tracing::instrument(skip(self, order_no), fields(order_no = %order_no))]
    pub async fn pay_at(
        &self,
        order_no: &OrderNo,
        payment_id: String,
        now: DateTime<Utc>,
    ) -> Result<PaymentOutcome> {
        let result: Result<PaymentOutcome> = self
            .locks
            .with_lock(
                &LockKey::Pay(order_no.clone()),
                self.config.pay_lock_ttl,
                move || async move {
                    let order = self.load_by_order_no(order_no).await?;

                    if let Err(rejected) = validator::can_pay(&order) {
                        info!(
                            order_id = %order.id(),
                            reason = %rejected,
                            "Ignoring payment callback for order that is no longer pending"
                        );
                        return Ok(PaymentOutcome::AlreadyProcessed(order.status()));
                    }

                    let order = self
                        .drive(order, OrderTransition::Pay { payment_id }, now)
                        .await?;
                    Ok(PaymentOutcome::Applied(order))
                },
            )
            .await;
        self.observe("pay", result)
    }

    pub async fn ship(
        &self,
        order_id: OrderId,
        carrier: String,
        tracking_no: String,
    ) -> Result<Order> {
        self.ship_at(order_id, carrier, tracking_no, Utc::now())
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn ship_at(
        &self,
        order_id: OrderId,
        carrier: String,
        tracking_no: String,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        let result = self
            .locks
            .with_lock(
                &LockKey::Status(order_id),
                self.config.status_lock_ttl,
                move || async move {
                    let order = self.load(order_id).await?;
                    validator::can_ship(&order)?;
                    let transition = OrderTransition::Ship {
                        carrier,
                        tracking_no,
                    };
                    self.drive(order, transition, now).await
                },
            )
            .await;
        self.observe("ship", result)
    }

    pub async fn handle_refund(
        &self,
        order_id: OrderId,
        approved: bool,
        reason: Option<String>,
    ) -> Result<Order> {
        self.handle_refund_at(order_id, approved, reason, Utc::now())
            .await
    }

    /// Decides a pending refund. Approval restores stock; rejection returns
    /// the order to the status it had before the request.
    #[tracing::instrument(skip(self, reason))]
    pub async fn handle_refund_at(
        &self,
        order_id: OrderId,
        approved: bool,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        let result = self
            .locks
            .with_lock(
                &LockKey::Status(order_id),
                self.config.status_lock_ttl,
                move || async move {
                    let order = self.load(order_id).await?;
                    validator::can_decide_refund(&order)?;
                    let transition = if approved {
                        OrderTransition::ApproveRefund
                    } else {
                        OrderTransition::RejectRefund { reason }
                    };
                    self.drive(order, transition, now).await
                },
            )
            .await;
        self.observe("handle_refund", result)
    }

    pub async fn update_status(&self, order_id: OrderId, target: OrderStatus) -> Result<Order> {
        self.update_status_at(order_id, target, Utc::now()).await
    }

    /// Moves an order to `target` through the same transition the dedicated
    /// operation would use.
    ///
    /// Targets with no transition from the current status fail with an
    /// invalid-state error.
    #[tracing::instrument(skip(self))]
    pub async fn update_status_at(
        &self,
        order_id: OrderId,
        target: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        let result = self
            .locks
            .with_lock(
                &LockKey::Status(order_id),
                self.config.status_lock_ttl,
                move || async move {
                    let order = self.load(order_id).await?;
                    let transition = transition_to(&order, target)?;
                    self.drive(order, transition, now).await
                },
            )
            .await;
        self.observe("update_status", result)
    }

    // ---- system transitions ----

    /// Cancels a PENDING order whose payment window closed before `now`.
    ///
    /// Returns `None` if the order is no longer eligible when re-read under
    /// the lock.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_for_timeout(
        &self,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>> {
        let result = self
            .locks
            .with_lock(
                &LockKey::Cancel(order_id),
                self.config.cancel_lock_ttl,
                move || async move {
                    let order = self.load(order_id).await?;
                    if order.status() != OrderStatus::Pending || !self.payment_expired(&order, now)
                    {
                        debug!(status = %order.status(), "Order no longer eligible for timeout");
                        return Ok(None);
                    }

                    let transition = OrderTransition::SweepCancel {
                        reason: "payment timeout".to_string(),
                    };
                    self.drive(order, transition, now).await.map(Some)
                },
            )
            .await;
        self.observe("cancel_for_timeout", result)
    }

    /// Completes a SHIPPED order whose grace period ended before `now`,
    /// without an ownership check.
    #[tracing::instrument(skip(self))]
    pub async fn auto_confirm(
        &self,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>> {
        let result = async {
            let order = self.load(order_id).await?;
            let cutoff = now - self.config.auto_confirm_after;
            let due = order.shipped_at().is_some_and(|shipped| shipped < cutoff);
            if order.status() != OrderStatus::Shipped || !due {
                debug!(status = %order.status(), "Order no longer eligible for auto-confirm");
                return Ok(None);
            }

            self.drive(order, OrderTransition::SweepConfirm, now)
                .await
                .map(Some)
        }
        .await;
        self.observe("auto_confirm", result)
    }

    // ---- queries ----

    /// Returns an order owned by `user_id`.
    pub async fn get_order(&self, order_id: OrderId, user_id: UserId) -> Result<Order> {
        let order = match self.cache.get(order_id).await {
            Some(order) => order,
            None => {
                let order = self.load(order_id).await?;
                self.cache.put(&order).await;
                order
            }
        };
        validator::is_owner(&order, user_id)?;
        Ok(order)
    }

    pub async fn get_order_by_no(&self, order_no: &OrderNo) -> Result<Order> {
        if let Some(order) = self.cache.get_by_order_no(order_no).await {
            return Ok(order);
        }
        let order = self.load_by_order_no(order_no).await?;
        self.cache.put(&order).await;
        Ok(order)
    }

    pub async fn list_user_orders(&self, user_id: UserId) -> Result<Vec<Order>> {
        if let Some(orders) = self.cache.get_user_orders(user_id).await {
            return Ok(orders);
        }
        let orders = self.repository.find_by_user(user_id).await?;
        self.cache.put_user_orders(user_id, orders.clone()).await;
        Ok(orders)
    }

    pub async fn get_logistics(&self, order_id: OrderId, user_id: UserId) -> Result<Logistics> {
        let order = self.get_order(order_id, user_id).await?;
        validator::can_view_logistics(&order)?;
        Ok(Logistics::for_order(&order))
    }

    pub async fn is_payment_timed_out(&self, order_id: OrderId) -> Result<bool> {
        self.is_payment_timed_out_at(order_id, Utc::now()).await
    }

    pub async fn is_payment_timed_out_at(
        &self,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let order = self.load(order_id).await?;
        Ok(order.status() == OrderStatus::Pending && self.payment_expired(&order, now))
    }

    pub async fn remaining_payment_time(&self, order_id: OrderId) -> Result<Option<chrono::Duration>> {
        self.remaining_payment_time_at(order_id, Utc::now()).await
    }

    /// Time left to pay, zero once expired. `None` unless the order is
    /// PENDING.
    pub async fn remaining_payment_time_at(
        &self,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Option<chrono::Duration>> {
        let order = self.load(order_id).await?;
        if order.status() != OrderStatus::Pending {
            return Ok(None);
        }
        let deadline = order.created_at() + self.config.payment_timeout;
        Ok(Some((deadline - now).max(chrono::Duration::zero())))
    }

    // ---- supplementary operations ----

    /// Places a new order with the lines, shipping fee and recipient of an
    /// existing one, at current catalog prices.
    pub async fn reorder(&self, order_id: OrderId, user_id: UserId) -> Result<Order> {
        let previous = self.get_order(order_id, user_id).await?;

        let lines = previous
            .items()
            .iter()
            .map(|item| OrderLineRequest {
                product_id: item.product_id,
                quantity: item.quantity,
                spec: item.product_spec.clone(),
            })
            .collect();

        let request = CreateOrderRequest::new(user_id, lines)
            .with_shipping_fee(previous.shipping_fee())
            .with_recipient(previous.recipient().clone());

        self.create(request).await
    }

    /// Replays stock restorations recorded in the compensation log.
    #[tracing::instrument(skip(self))]
    pub async fn retry_compensations(&self) -> Result<CompensationReport> {
        let mut report = CompensationReport::default();

        for entry in self.compensation.pending().await? {
            let restored = self
                .products
                .restore_stock(entry.product_id, entry.quantity, &entry.order_no)
                .await;

            match restored {
                Ok(true) => {
                    self.compensation.mark_done(entry.id).await?;
                    report.succeeded += 1;
                }
                Ok(false) | Err(_) => {
                    self.compensation.mark_attempted(entry.id).await?;
                    report.failed += 1;
                    warn!(
                        entry_id = entry.id,
                        order_no = %entry.order_no,
                        product_id = %entry.product_id,
                        attempts = entry.attempts + 1,
                        "Compensation replay failed"
                    );
                }
            }
        }

        if report.succeeded + report.failed > 0 {
            info!(
                succeeded = report.succeeded,
                failed = report.failed,
                "Compensation replay finished"
            );
        }
        Ok(report)
    }

    // ---- internals ----

    async fn load(&self, order_id: OrderId) -> Result<Order> {
        self.repository
            .get(order_id)
            .await?
            .ok_or(CoordinatorError::OrderNotFound(order_id))
    }

    async fn load_by_order_no(&self, order_no: &OrderNo) -> Result<Order> {
        self.repository
            .find_by_order_no(order_no)
            .await?
            .ok_or_else(|| CoordinatorError::OrderNoNotFound(order_no.clone()))
    }

    fn payment_expired(&self, order: &Order, now: DateTime<Utc>) -> bool {
        order.created_at() < now - self.config.payment_timeout
    }

    /// Applies `transition`, saves against the loaded version and drops
    /// cached copies.
    async fn persist(
        &self,
        order: &mut Order,
        transition: OrderTransition,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome> {
        let outcome = order.apply_transition(transition, now)?;
        self.repository.save_versioned(order).await?;
        self.cache.invalidate(order).await;
        Ok(outcome)
    }

    /// Persists a transition and runs its side effects.
    async fn commit(
        &self,
        order: &mut Order,
        transition: OrderTransition,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome> {
        let outcome = self.persist(order, transition, now).await?;
        self.metrics.record_transition(&outcome, order);

        info!(
            order_id = %order.id(),
            from = %outcome.from,
            to = %outcome.to,
            transition = %outcome.kind,
            "Order transition committed"
        );

        if outcome.restores_stock() {
            self.restore_lines(order, &lines(order), outcome.kind.action(), now)
                .await;
        }
        Ok(outcome)
    }

    /// Commits a transition, initiates any refund it owes and publishes its
    /// events.
    async fn drive(
        &self,
        mut order: Order,
        transition: OrderTransition,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        let outcome = self.commit(&mut order, transition, now).await?;

        if let Some((amount, reason)) = outcome.refund() {
            let refunded = self.payment.refund(order.order_no(), amount, reason).await;
            match refunded {
                Ok(ack) => info!(
                    order_id = %order.id(),
                    refund_id = %ack.refund_id,
                    amount = %amount,
                    "Refund initiated"
                ),
                Err(e) if outcome.kind == TransitionKind::RequestRefund => {
                    warn!(
                        order_id = %order.id(),
                        error = %e,
                        "Payment service refused refund, reverting request"
                    );
                    self.commit(&mut order, OrderTransition::RevertRefund, now)
                        .await?;
                    return Err(e);
                }
                Err(e) => {
                    metrics::counter!("order_refund_initiation_failures_total").increment(1);
                    warn!(
                        order_id = %order.id(),
                        amount = %amount,
                        error = %e,
                        "Refund initiation failed after cancellation"
                    );
                }
            }
        }

        for event_type in &outcome.events {
            self.publish(*event_type, &order, Some(outcome.from), now)
                .await;
        }
        Ok(order)
    }

    async fn publish(
        &self,
        event_type: OrderEventType,
        order: &Order,
        old_status: Option<OrderStatus>,
        now: DateTime<Utc>,
    ) {
        let event = OrderEvent::for_order(event_type, order, old_status, now);
        self.publisher.publish(event).await;
    }

    /// Returns each line to stock independently. Failures are logged and
    /// appended to the compensation log.
    async fn restore_lines(
        &self,
        order: &Order,
        lines: &[(ProductId, u32)],
        cause: &str,
        now: DateTime<Utc>,
    ) {
        for &(product_id, quantity) in lines {
            let failure = match self
                .products
                .restore_stock(product_id, quantity, order.order_no())
                .await
            {
                Ok(true) => continue,
                Ok(false) => "stock service refused the restoration".to_string(),
                Err(e) => e.to_string(),
            };

            metrics::counter!("order_stock_restore_failures_total").increment(1);
            warn!(
                order_id = %order.id(),
                product_id = %product_id,
                quantity,
                error = %failure,
                "Stock restoration failed, recording compensation"
            );

            let pending = PendingRestore {
                order_id: order.id(),
                order_no: order.order_no().clone(),
                product_id,
                quantity,
                reason: format!("{cause}: {failure}"),
            };
            if let Err(e) = self.compensation.record(pending, now).await {
                error!(
                    order_id = %order.id(),
                    product_id = %product_id,
                    error = %e,
                    "Failed to record stock compensation"
                );
            }
        }
    }

    fn observe<T>(&self, operation: &'static str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            let kind = e.kind();
            self.metrics.record_failure(operation, kind);
            match kind {
                ErrorKind::Collaborator | ErrorKind::Internal => {
                    error!(operation, error = %e, "Order operation failed")
                }
                _ => debug!(operation, kind = %kind, error = %e, "Order operation rejected"),
            }
        }
        result
    }
}

fn lines(order: &Order) -> Vec<(ProductId, u32)> {
    order
        .items()
        .iter()
        .map(|item| (item.product_id, item.quantity))
        .collect()
}

/// Picks the transition that moves `order` to `target`.
fn transition_to(order: &Order, target: OrderStatus) -> Result<OrderTransition> {
    if order.status() == OrderStatus::RefundPending && order.refund_origin() == Some(target) {
        return Ok(OrderTransition::RejectRefund { reason: None });
    }

    let transition = match target {
        OrderStatus::Paid => OrderTransition::Pay {
            payment_id: format!("MANUAL-{}", order.order_no()),
        },
        OrderStatus::Shipped => OrderTransition::Ship {
            carrier: "MANUAL".to_string(),
            tracking_no: order.order_no().to_string(),
        },
        OrderStatus::Completed => OrderTransition::Confirm,
        OrderStatus::Cancelled => OrderTransition::Cancel {
            reason: "cancelled by administrator".to_string(),
        },
        OrderStatus::RefundPending => OrderTransition::RequestRefund {
            reason: "requested by administrator".to_string(),
        },
        OrderStatus::Refunded => OrderTransition::ApproveRefund,
        OrderStatus::Pending => {
            return Err(OrderError::InvalidState {
                current: order.status(),
                action: "update status",
            }
            .into());
        }
    };
    Ok(transition)
}
