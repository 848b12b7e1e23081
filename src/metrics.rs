//! # Operational Metrics
//!
//! Two monotonic counters plus the state store's current size, exposed as
//! JSON on `/metrics`. Visibility across threads is all that's required —
//! not strict ordering — so both counters are plain `AtomicU64`s with
//! relaxed ordering.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::filter::ThrottlingFilter;

#[derive(Debug, Default)]
pub struct Metrics {
    throttled_total: AtomicU64,
    banned_total: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_throttled(&self) {
        self.throttled_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_banned(&self) {
        self.banned_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn throttled_total(&self) -> u64 {
        self.throttled_total.load(Ordering::Relaxed)
    }

    pub fn banned_total(&self) -> u64 {
        self.banned_total.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsReport {
    pub state_store_size: u64,
    pub throttled_total: u64,
    pub banned_total: u64,
}

pub async fn metrics_endpoint(State(filter): State<Arc<ThrottlingFilter>>) -> Json<MetricsReport> {
    Json(MetricsReport {
        state_store_size: filter.store().len(),
        throttled_total: filter.metrics().throttled_total(),
        banned_total: filter.metrics().banned_total(),
    })
}
