//! # Error Types
//!
//! This engine produces exactly two kinds of error: configuration problems
//! detected at startup, and the I/O failure of binding the HTTP listener.
//! Both are fatal — they prevent the server from starting at all. The 403
//! and 429 responses the filter issues during normal operation are *not*
//! errors; they are ordinary [`axum::response::Response`] values the filter
//! constructs directly (see `filter.rs`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThrottlerError {
    /// Configuration failed to load or failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// The configured bind address could not be bound.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

impl IntoResponse for ThrottlerError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": "startup_error",
            "message": self.to_string(),
        });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ThrottlerError>;
