//! Process liveness endpoint.
//!
//! `/healthz` reports on the proxy itself and answers 200 whenever the
//! process can serve requests. Upstream reachability is included for
//! operators but does not change the status code.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub upstream: UpstreamStatus,
}

pub async fn healthz(State(state): State<AppState>) -> Json<HealthReport> {
    let upstream = if state.health.check() { UpstreamStatus::Healthy } else { UpstreamStatus::Unhealthy };
    Json(HealthReport { status: "ok", upstream })
}
