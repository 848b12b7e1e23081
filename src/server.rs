//! # HTTP Server
//!
//! Builds the Axum router with the throttling filter installed as a
//! `from_fn_with_state` middleware layer ahead of the protected routes, and
//! runs it with graceful shutdown.
//!
//! ## Graceful Shutdown
//!
//! The server handles shutdown signals gracefully:
//! - `SIGINT` (Ctrl+C) - Interactive shutdown
//! - `SIGTERM` - Container/orchestrator shutdown (Unix only)
//!
//! In-flight requests are allowed to complete before the server exits.

use std::sync::Arc;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::ThrottlerError;
use crate::filter::{throttling_middleware, ThrottlingFilter};
use crate::health::{health_check, readiness_check};
use crate::metrics::metrics_endpoint;

pub struct Server {
    app: Router,
    bind_address: String,
}

/// Builds the router: health/readiness/metrics endpoints plus a stand-in
/// protected route, all behind the throttling middleware. A real deployment
/// would nest the actual query-service routes here instead of `protected`;
/// this engine's concern is the filter in front of them, not the routes
/// themselves (see Purpose & Scope).
pub fn create_app(filter: Arc<ThrottlingFilter>) -> Router {
    Router::new()
        .route("/", get(protected_root))
        .route_layer(middleware::from_fn_with_state(filter.clone(), throttling_middleware))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_endpoint))
        .with_state(filter)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

async fn protected_root() -> &'static str {
    "ok"
}

impl Server {
    pub fn new(bind_address: String, filter: Arc<ThrottlingFilter>) -> Self {
        let app = create_app(filter);
        Self { app, bind_address }
    }

    pub async fn run(self) -> Result<(), ThrottlerError> {
        let listener = tokio::net::TcpListener::bind(&self.bind_address)
            .await
            .map_err(|source| ThrottlerError::Bind {
                address: self.bind_address.clone(),
                source,
            })?;

        tracing::info!("throttling engine listening on {}", self.bind_address);
        tracing::info!("health check available at /health");
        tracing::info!("readiness check available at /ready");
        tracing::info!("metrics available at /metrics");

        axum::serve(
            listener,
            self.app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| ThrottlerError::Bind {
            address: self.bind_address.clone(),
            source: std::io::Error::other(err),
        })?;

        Ok(())
    }
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("received terminate signal, initiating graceful shutdown");
        },
    }
}
