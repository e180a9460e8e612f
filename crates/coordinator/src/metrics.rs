//! Metrics Recorder.
//!
//! The coordinator reports through an injected [`MetricsRecorder`] so tests
//! can substitute [`NoopMetricsRecorder`] or [`RecordingMetricsRecorder`].
//! [`PrometheusMetricsRecorder`] keeps per-status gauges in memory and
//! forwards them to the `metrics` facade; [`MetricsReconciler`] corrects
//! drift from repository aggregates on an interval.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use common::OrderId;
use domain::{Money, Order, OrderStatus, TransitionKind, TransitionOutcome};
use order_store::OrderRepository;
use order_store::repository::counts_as_revenue;
use tokio_util::sync::CancellationToken;

use crate::error::{ErrorKind, Result};

pub trait MetricsRecorder: Send + Sync {
    fn record_created(&self, order: &Order, elapsed: Duration);

    /// Called once per committed transition, with the order as saved.
    fn record_transition(&self, outcome: &TransitionOutcome, order: &Order);

    fn record_failure(&self, operation: &'static str, kind: ErrorKind);

    /// Replaces the in-memory gauges with authoritative aggregates.
    fn reconcile(&self, counts: &HashMap<OrderStatus, u64>, revenue: Money);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetricsRecorder;

impl MetricsRecorder for NoopMetricsRecorder {
    fn record_created(&self, _order: &Order, _elapsed: Duration) {}

    fn record_transition(&self, _outcome: &TransitionOutcome, _order: &Order) {}

    fn record_failure(&self, _operation: &'static str, _kind: ErrorKind) {}

    fn reconcile(&self, _counts: &HashMap<OrderStatus, u64>, _revenue: Money) {}
}

/// Point-in-time copy of the gauges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub by_status: HashMap<OrderStatus, u64>,
    pub total: u64,
    pub revenue: Money,
}

impl MetricsSnapshot {
    pub fn count(&self, status: OrderStatus) -> u64 {
        self.by_status.get(&status).copied().unwrap_or_default()
    }
}

/// Recorder backed by the `metrics` facade.
///
/// Gauges are derived from in-memory state that only ever moves by whole
/// transitions, so a missed transition (say, a crash between save and
/// record) persists until the next reconcile.
#[derive(Debug, Clone, Default)]
pub struct PrometheusMetricsRecorder {
    gauges: Arc<Mutex<MetricsSnapshot>>,
}

impl PrometheusMetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.gauges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, f: impl FnOnce(&mut MetricsSnapshot)) {
        let mut gauges = self.gauges.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut gauges);
        publish_gauges(&gauges);
    }
}

fn publish_gauges(snapshot: &MetricsSnapshot) {
    for status in OrderStatus::ALL {
        metrics::gauge!("orders_by_status", "status" => status.as_str())
            .set(snapshot.count(status) as f64);
    }
    metrics::gauge!("orders_total").set(snapshot.total as f64);
    metrics::gauge!("orders_revenue").set(snapshot.revenue.as_f64());
}

impl MetricsRecorder for PrometheusMetricsRecorder {
    fn record_created(&self, _order: &Order, elapsed: Duration) {
        metrics::counter!("orders_created_total").increment(1);
        metrics::histogram!("order_create_duration_seconds").record(elapsed.as_secs_f64());

        self.update(|gauges| {
            *gauges.by_status.entry(OrderStatus::Pending).or_default() += 1;
            gauges.total += 1;
        });
    }

    fn record_transition(&self, outcome: &TransitionOutcome, order: &Order) {
        metrics::counter!("order_transitions_total", "transition" => outcome.kind.action())
            .increment(1);

        self.update(|gauges| {
            let from = gauges.by_status.entry(outcome.from).or_default();
            *from = from.saturating_sub(1);
            *gauges.by_status.entry(outcome.to).or_default() += 1;

            match (counts_as_revenue(outcome.from), counts_as_revenue(outcome.to)) {
                (false, true) => gauges.revenue += order.paid_amount(),
                (true, false) => gauges.revenue = gauges.revenue - order.paid_amount(),
                _ => {}
            }
        });
    }

    fn record_failure(&self, operation: &'static str, kind: ErrorKind) {
        metrics::counter!(
            "order_operation_failures_total",
            "operation" => operation,
            "kind" => kind.as_str()
        )
        .increment(1);
    }

    fn reconcile(&self, counts: &HashMap<OrderStatus, u64>, revenue: Money) {
        self.update(|gauges| {
            gauges.by_status = counts.clone();
            gauges.total = counts.values().sum();
            gauges.revenue = revenue;
        });
    }
}

/// One call observed by [`RecordingMetricsRecorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedMetric {
    Created {
        order_id: OrderId,
    },
    Transition {
        order_id: OrderId,
        kind: TransitionKind,
        from: OrderStatus,
        to: OrderStatus,
    },
    Failure {
        operation: &'static str,
        kind: ErrorKind,
    },
    Reconciled {
        total: u64,
        revenue: Money,
    },
}

/// Recorder that keeps every call for assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingMetricsRecorder {
    entries: Arc<Mutex<Vec<RecordedMetric>>>,
}

impl RecordingMetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<RecordedMetric> {
        self.lock().clone()
    }

    pub fn created_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|e| matches!(e, RecordedMetric::Created { .. }))
            .count()
    }

    pub fn transition_count(&self, kind: TransitionKind) -> usize {
        self.lock()
            .iter()
            .filter(|e| matches!(e, RecordedMetric::Transition { kind: k, .. } if *k == kind))
            .count()
    }

    pub fn failures(&self) -> Vec<(&'static str, ErrorKind)> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                RecordedMetric::Failure { operation, kind } => Some((*operation, *kind)),
                _ => None,
            })
            .collect()
    }

    fn push(&self, entry: RecordedMetric) {
        self.lock().push(entry);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RecordedMetric>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MetricsRecorder for RecordingMetricsRecorder {
    fn record_created(&self, order: &Order, _elapsed: Duration) {
        self.push(RecordedMetric::Created {
            order_id: order.id(),
        });
    }

    fn record_transition(&self, outcome: &TransitionOutcome, order: &Order) {
        self.push(RecordedMetric::Transition {
            order_id: order.id(),
            kind: outcome.kind,
            from: outcome.from,
            to: outcome.to,
        });
    }

    fn record_failure(&self, operation: &'static str, kind: ErrorKind) {
        self.push(RecordedMetric::Failure { operation, kind });
    }

    fn reconcile(&self, counts: &HashMap<OrderStatus, u64>, revenue: Money) {
        self.push(RecordedMetric::Reconciled {
            total: counts.values().sum(),
            revenue,
        });
    }
}

/// Periodically overwrites the recorder's gauges from the repository.
pub struct MetricsReconciler<R> {
    repository: R,
    recorder: Arc<dyn MetricsRecorder>,
    interval: Duration,
}

impl<R: OrderRepository> MetricsReconciler<R> {
    pub fn new(repository: R, recorder: Arc<dyn MetricsRecorder>, interval: Duration) -> Self {
        Self {
            repository,
            recorder,
            interval,
        }
    }

    pub async fn reconcile_once(&self) -> Result<()> {
        let counts = self.repository.count_by_status().await?;
        let revenue = self.repository.sum_paid_revenue().await?;
        self.recorder.reconcile(&counts, revenue);

        tracing::info!(
            total = counts.values().sum::<u64>(),
            revenue = %revenue,
            "Reconciled order metrics"
        );
        Ok(())
    }

    /// Runs until `shutdown` is cancelled. The first pass runs immediately.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Metrics reconciler stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.reconcile_once().await {
                        tracing::warn!(error = %e, "Metrics reconciliation failed");
                    }
                }
            }
        }
    }
}
