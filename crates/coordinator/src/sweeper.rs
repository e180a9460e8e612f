//! Timeout Sweeper.
//!
//! Two recurring passes: cancel PENDING orders whose payment window closed,
//! and confirm SHIPPED orders past their grace period. Each pass holds a
//! store-wide lock so only one service instance runs it at a time, and
//! each order is handled independently.
//!
//! The passes and the compensation replay are separate [`SweepJob`]s with
//! their own intervals, so a slow job never delays another.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use domain::{Order, OrderStatus};
use lock::{LockError, LockKey};
use order_store::OrderRepository;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::coordinator::OrderLifecycleCoordinator;
use crate::error::{CoordinatorError, Result};
use crate::services::{CartService, PaymentService, ProductService};

/// Counts from one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Orders matched by the staleness query.
    pub scanned: usize,
    pub succeeded: usize,
    /// Orders that had already moved on when re-read under their lock.
    pub skipped: usize,
    pub failed: usize,
    /// True if another instance held the sweep lock and nothing ran.
    pub lock_skipped: bool,
}

#[derive(Debug, Clone, Copy)]
enum Sweep {
    PaymentTimeout,
    AutoConfirm,
}

impl Sweep {
    fn name(self) -> &'static str {
        match self {
            Sweep::PaymentTimeout => "payment_timeout",
            Sweep::AutoConfirm => "auto_confirm",
        }
    }
}

/// Recurring background work, each on its own schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepJob {
    PaymentTimeout,
    AutoConfirm,
    CompensationReplay,
}

impl SweepJob {
    pub const ALL: [SweepJob; 3] = [
        SweepJob::PaymentTimeout,
        SweepJob::AutoConfirm,
        SweepJob::CompensationReplay,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SweepJob::PaymentTimeout => "payment_timeout",
            SweepJob::AutoConfirm => "auto_confirm",
            SweepJob::CompensationReplay => "compensation_replay",
        }
    }
}

pub struct TimeoutSweeper<R, P, C, Y>
where
    R: OrderRepository,
    P: ProductService,
    C: CartService,
    Y: PaymentService,
{
    coordinator: Arc<OrderLifecycleCoordinator<R, P, C, Y>>,
}

impl<R, P, C, Y> Clone for TimeoutSweeper<R, P, C, Y>
where
    R: OrderRepository,
    P: ProductService,
    C: CartService,
    Y: PaymentService,
{
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<R, P, C, Y> TimeoutSweeper<R, P, C, Y>
where
    R: OrderRepository,
    P: ProductService,
    C: CartService,
    Y: PaymentService,
{
    pub fn new(coordinator: Arc<OrderLifecycleCoordinator<R, P, C, Y>>) -> Self {
        Self { coordinator }
    }

    pub async fn run_timeout_sweep(&self) -> Result<SweepReport> {
        self.run_timeout_sweep_at(Utc::now()).await
    }

    /// Cancels every PENDING order created before `now - payment_timeout`.
    #[tracing::instrument(skip(self))]
    pub async fn run_timeout_sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let config = self.coordinator.config();
        self.locked_pass(
            Sweep::PaymentTimeout,
            LockKey::TimeoutSweep,
            config.timeout_sweep_lock_ttl,
            now,
        )
        .await
    }

    pub async fn run_auto_confirm(&self) -> Result<SweepReport> {
        self.run_auto_confirm_at(Utc::now()).await
    }

    /// Confirms every SHIPPED order shipped before `now - auto_confirm_after`.
    #[tracing::instrument(skip(self))]
    pub async fn run_auto_confirm_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let config = self.coordinator.config();
        self.locked_pass(
            Sweep::AutoConfirm,
            LockKey::AutoConfirmSweep,
            config.auto_confirm_lock_ttl,
            now,
        )
        .await
    }

    async fn locked_pass(
        &self,
        sweep: Sweep,
        key: LockKey,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<SweepReport> {
        let result = self
            .coordinator
            .locks()
            .with_lock_within(&key, ttl, Duration::ZERO, || self.pass(sweep, now))
            .await;

        match result {
            Err(CoordinatorError::Lock(LockError::Busy { .. })) => {
                info!(sweep = sweep.name(), "Sweep already running elsewhere, skipping");
                Ok(SweepReport {
                    lock_skipped: true,
                    ..SweepReport::default()
                })
            }
            other => other,
        }
    }

    async fn pass(&self, sweep: Sweep, now: DateTime<Utc>) -> Result<SweepReport> {
        let config = self.coordinator.config();
        let repository = self.coordinator.repository();

        let stale: Vec<Order> = match sweep {
            Sweep::PaymentTimeout => {
                repository
                    .find_by_status_created_before(OrderStatus::Pending, now - config.payment_timeout)
                    .await?
            }
            Sweep::AutoConfirm => {
                repository
                    .find_by_status_shipped_before(
                        OrderStatus::Shipped,
                        now - config.auto_confirm_after,
                    )
                    .await?
            }
        };

        let mut report = SweepReport {
            scanned: stale.len(),
            ..SweepReport::default()
        };

        for order in stale {
            let outcome = match sweep {
                Sweep::PaymentTimeout => self.coordinator.cancel_for_timeout(order.id(), now).await,
                Sweep::AutoConfirm => self.coordinator.auto_confirm(order.id(), now).await,
            };

            match outcome {
                Ok(Some(_)) => report.succeeded += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        sweep = sweep.name(),
                        order_id = %order.id(),
                        error = %e,
                        "Sweep failed for order"
                    );
                }
            }
        }

        metrics::counter!("order_sweep_processed_total", "sweep" => sweep.name())
            .increment(report.succeeded as u64);
        metrics::counter!("order_sweep_failures_total", "sweep" => sweep.name())
            .increment(report.failed as u64);

        info!(
            sweep = sweep.name(),
            scanned = report.scanned,
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed,
            "Sweep finished"
        );
        Ok(report)
    }

    /// Runs one job on its own interval until `shutdown` is cancelled.
    ///
    /// A pass that has started runs to completion before shutdown is
    /// observed.
    pub async fn run_job(&self, job: SweepJob, shutdown: CancellationToken) {
        let config = self.coordinator.config();
        let period = match job {
            SweepJob::PaymentTimeout => config.timeout_sweep_interval,
            SweepJob::AutoConfirm => config.auto_confirm_interval,
            SweepJob::CompensationReplay => config.compensation_retry_interval,
        };
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(job = job.name(), period = ?period, "Sweep job started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(job = job.name(), "Sweep job stopped");
                    return;
                }
                _ = tick.tick() => {
                    let result = match job {
                        SweepJob::PaymentTimeout => self.run_timeout_sweep().await.map(drop),
                        SweepJob::AutoConfirm => self.run_auto_confirm().await.map(drop),
                        SweepJob::CompensationReplay => {
                            self.coordinator.retry_compensations().await.map(drop)
                        }
                    };
                    if let Err(e) = result {
                        warn!(job = job.name(), error = %e, "Sweep job pass failed");
                    }
                }
            }
        }
    }

    /// Runs every job concurrently until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        tokio::join!(
            self.run_job(SweepJob::PaymentTimeout, shutdown.clone()),
            self.run_job(SweepJob::AutoConfirm, shutdown.clone()),
            self.run_job(SweepJob::CompensationReplay, shutdown),
        );
    }
}
