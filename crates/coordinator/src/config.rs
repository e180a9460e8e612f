//! Coordinator configuration.

use std::time::Duration;

/// Timings and naming used by the coordinator and its background sweeps.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long a PENDING order may wait for payment.
    pub payment_timeout: chrono::Duration,
    /// How long after shipment an order is confirmed automatically.
    pub auto_confirm_after: chrono::Duration,

    pub timeout_sweep_interval: Duration,
    pub auto_confirm_interval: Duration,
    pub metrics_reconcile_interval: Duration,
    pub compensation_retry_interval: Duration,

    pub order_no_prefix: String,
    /// Upper bound on a single event publication.
    pub event_publish_timeout: Duration,

    pub create_lock_ttl: Duration,
    pub cancel_lock_ttl: Duration,
    pub pay_lock_ttl: Duration,
    pub status_lock_ttl: Duration,
    pub timeout_sweep_lock_ttl: Duration,
    pub auto_confirm_lock_ttl: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            payment_timeout: chrono::Duration::minutes(30),
            auto_confirm_after: chrono::Duration::days(7),
            timeout_sweep_interval: Duration::from_secs(5 * 60),
            auto_confirm_interval: Duration::from_secs(60 * 60),
            metrics_reconcile_interval: Duration::from_secs(60 * 60),
            compensation_retry_interval: Duration::from_secs(5 * 60),
            order_no_prefix: "ORD".to_string(),
            event_publish_timeout: Duration::from_secs(2),
            create_lock_ttl: Duration::from_secs(10),
            cancel_lock_ttl: Duration::from_secs(5),
            pay_lock_ttl: Duration::from_secs(5),
            status_lock_ttl: Duration::from_secs(5),
            timeout_sweep_lock_ttl: Duration::from_secs(300),
            auto_confirm_lock_ttl: Duration::from_secs(600),
        }
    }
}

impl CoordinatorConfig {
    pub fn with_payment_timeout(mut self, timeout: chrono::Duration) -> Self {
        self.payment_timeout = timeout;
        self
    }

    pub fn with_auto_confirm_after(mut self, after: chrono::Duration) -> Self {
        self.auto_confirm_after = after;
        self
    }

    pub fn with_order_no_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.order_no_prefix = prefix.into();
        self
    }

    pub fn with_event_publish_timeout(mut self, timeout: Duration) -> Self {
        self.event_publish_timeout = timeout;
        self
    }
}
