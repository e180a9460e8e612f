//! Health check endpoint.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::State;
use coordinator::PrometheusMetricsRecorder;
use domain::{Money, OrderStatus};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub orders: OrderTotals,
}

/// Order gauges as last recorded or reconciled.
#[derive(Serialize)]
pub struct OrderTotals {
    pub total: u64,
    pub by_status: BTreeMap<&'static str, u64>,
    pub revenue: Money,
}

/// GET /health: liveness plus the current order gauges.
pub async fn check(State(recorder): State<PrometheusMetricsRecorder>) -> Json<HealthResponse> {
    let snapshot = recorder.snapshot();
    let by_status = OrderStatus::ALL
        .iter()
        .map(|status| (status.as_str(), snapshot.count(*status)))
        .collect();

    Json(HealthResponse {
        status: "ok",
        orders: OrderTotals {
            total: snapshot.total,
            by_status,
            revenue: snapshot.revenue,
        },
    })
}
