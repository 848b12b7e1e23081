//! # Health & Readiness
//!
//! This engine has no external dependency (no Redis, no database) to report
//! on — it is single-process by design. `/health` and `/ready` both report
//! the filter's enabled flag and current state-store size; there is no
//! distinction between liveness and readiness for a process with nothing to
//! warm up or reconnect to, but both endpoints are kept since orchestrators
//! commonly probe both.

use std::sync::Arc;
use std::time::SystemTime;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::filter::ThrottlingFilter;

static START_TIME: std::sync::LazyLock<SystemTime> = std::sync::LazyLock::new(SystemTime::now);

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub throttling_enabled: bool,
    pub state_store_size: u64,
}

fn build_status(filter: &ThrottlingFilter) -> HealthStatus {
    let uptime = SystemTime::now()
        .duration_since(*START_TIME)
        .unwrap_or_default()
        .as_secs();

    HealthStatus {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        throttling_enabled: filter.is_enabled(),
        state_store_size: filter.store().len(),
    }
}

pub async fn health_check(State(filter): State<Arc<ThrottlingFilter>>) -> Json<HealthStatus> {
    Json(build_status(&filter))
}

pub async fn readiness_check(State(filter): State<Arc<ThrottlingFilter>>) -> Json<HealthStatus> {
    Json(build_status(&filter))
}
