//! Order lifecycle coordination.
//!
//! This crate drives orders through the domain state machine while keeping
//! the outside world consistent with it:
//! - `OrderLifecycleCoordinator`: create, pay, ship, confirm, cancel and
//!   refund under per-order locks, with stock and refund side effects
//! - `TimeoutSweeper`: payment-timeout cancellation and auto-confirmation
//! - `EventPublisher`: bounded, non-failing event publication
//! - `MetricsRecorder`: injected counters and gauges, reconciled from the
//!   repository
//! - Collaborator traits (product, cart, payment) with in-memory fakes

pub mod compensation;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod metrics;
pub mod requests;
pub mod services;
pub mod sweeper;

pub use compensation::{CompensationEntry, CompensationLog, InMemoryCompensationLog, PendingRestore};
pub use config::CoordinatorConfig;
pub use coordinator::OrderLifecycleCoordinator;
pub use error::{CoordinatorError, ErrorKind, Result};
pub use events::{EventPublisher, EventSink, InMemoryEventSink, OrderEvent};
pub use metrics::{
    MetricsReconciler, MetricsRecorder, MetricsSnapshot, NoopMetricsRecorder,
    PrometheusMetricsRecorder, RecordedMetric, RecordingMetricsRecorder,
};
pub use requests::{
    CompensationReport, CreateOrderRequest, Logistics, LogisticsTrack, OrderLineRequest,
    PaymentOutcome,
};
pub use services::{
    CartService, InMemoryCartService, InMemoryPaymentService, InMemoryProductService,
    PaymentService, ProductService, ProductSnapshot,
};
pub use sweeper::{SweepJob, SweepReport, TimeoutSweeper};
