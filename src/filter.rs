//! # Throttling Filter
//!
//! The orchestrator: classifies each request into a bucket, consults the
//! ban and time/error throttlers, and either short-circuits with 403/429 or
//! calls the downstream handler and accounts its outcome. Installed as an
//! `axum::middleware::from_fn_with_state` layer ahead of the protected
//! routes.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::ban::BanThrottler;
use crate::bucketing::{BucketingChain, RequestContext};
use crate::config::Config;
use crate::metrics::Metrics;
use crate::state_store::StateStore;
use crate::throttler::TimeAndErrorsThrottler;

pub struct ThrottlingFilter {
    enabled: bool,
    chain: BucketingChain,
    throttler: TimeAndErrorsThrottler,
    banner: BanThrottler,
    metrics: Arc<Metrics>,
    store: Arc<StateStore>,
}

impl ThrottlingFilter {
    pub fn new(
        enabled: bool,
        chain: BucketingChain,
        throttler: TimeAndErrorsThrottler,
        banner: BanThrottler,
        metrics: Arc<Metrics>,
        store: Arc<StateStore>,
    ) -> Self {
        Self {
            enabled,
            chain,
            throttler,
            banner,
            metrics,
            store,
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

fn extract_context(headers: &HeaderMap, source_ip: IpAddr, uri_query: Option<&str>) -> RequestContext {
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let header_map = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();

    let query_params: std::collections::HashMap<String, String> = uri_query
        .map(|q| {
            form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default();

    let query_param = query_params.get("query").cloned();

    RequestContext {
        source_ip,
        user_agent,
        query_param,
        headers: header_map,
        query_params,
    }
}

fn banned_body(deadline: std::time::SystemTime) -> String {
    let iso: DateTime<Utc> = deadline.into();
    format!(
        "You have been banned until {}, please respect throttling and retry-after headers.",
        iso.to_rfc3339()
    )
}

fn throttled_body(retry_after_secs: u64) -> String {
    format!("Too Many Requests - Please retry in {retry_after_secs} seconds.")
}

fn seconds_ceiling(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// `axum::middleware::from_fn_with_state` entry point implementing the
/// state machine from the engine's component design: classify, check ban,
/// check throttle, run the handler, account the outcome.
pub async fn throttling_middleware(
    State(filter): State<Arc<ThrottlingFilter>>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !filter.is_enabled() {
        return next.run(request).await;
    }

    let source_ip = client_ip(request.headers()).unwrap_or_else(|| addr.ip());
    let ctx = extract_context(request.headers(), source_ip, request.uri().query());

    let Some(key) = filter.chain.classify(&ctx) else {
        return next.run(request).await;
    };

    if let Some(deadline) = filter.banner.throttled_until(&key, &ctx) {
        filter.metrics.record_banned();
        warn!(?key, "request banned");
        return (StatusCode::FORBIDDEN, banned_body(deadline)).into_response();
    }

    let throttle_for = filter.throttler.throttled_duration(&key, &ctx);
    if throttle_for > Duration::ZERO {
        filter.metrics.record_throttled();
        filter.banner.note_throttled(&key);
        let retry_after = seconds_ceiling(throttle_for);
        info!(?key, retry_after, "request throttled");
        let mut response = (StatusCode::TOO_MANY_REQUESTS, throttled_body(retry_after)).into_response();
        if let Ok(value) = retry_after.to_string().parse() {
            response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
        }
        return response;
    }

    let start = Instant::now();
    let response = next.run(request).await;
    let elapsed = start.elapsed();

    if response.status().as_u16() < 400 {
        filter.throttler.record_success(&key, elapsed);
    } else {
        filter.throttler.record_failure(&key, elapsed);
    }

    response
}

/// Prefers `X-Forwarded-For` (first hop) over the TCP peer address, since
/// this engine typically runs behind a reverse proxy.
fn client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse::<IpAddr>().ok())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .and_then(|ip| ip.trim().parse::<IpAddr>().ok())
        })
}

pub fn build_filter(config: &Config, clock: Arc<dyn crate::clock::Clock>) -> Arc<ThrottlingFilter> {
    let store = Arc::new(StateStore::new(
        config.max_state_size,
        config.state_expiration,
        config.state_limits(),
        clock,
    ));

    let query_patterns = config
        .query_pattern_file
        .as_deref()
        .map(crate::bucketing::load_patterns)
        .unwrap_or_default();
    let ua_patterns = config
        .user_agent_pattern_file
        .as_deref()
        .map(crate::bucketing::load_patterns)
        .unwrap_or_default();
    let chain = BucketingChain::standard(query_patterns, ua_patterns);

    let throttle_gate = crate::gate::AdmissionGate::new(
        config.enable_throttling_if_header.clone(),
        config.always_throttle_param.clone(),
    );
    let ban_gate = crate::gate::AdmissionGate::new(
        config.enable_ban_if_header.clone(),
        config.always_ban_param.clone(),
    );

    let throttler = TimeAndErrorsThrottler::new(store.clone(), throttle_gate, config.request_duration_threshold);
    let banner = BanThrottler::new(store.clone(), ban_gate);
    let metrics = Arc::new(Metrics::new());

    Arc::new(ThrottlingFilter::new(
        config.enabled,
        chain,
        throttler,
        banner,
        metrics,
        store,
    ))
}
