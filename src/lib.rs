//! # query-throttle
//!
//! A request throttling and banning engine that sits in front of a shared
//! query service. It classifies every request into a bucket (a
//! client-identity equivalence class), accounts the request's compute-time
//! cost and error outcome against per-bucket token buckets, and either
//! admits, throttles (429 with `Retry-After`), or bans (403) the client.
//! Repeated throttling incidents escalate into a temporary ban.
//!
//! ## Architecture Overview
//!
//! ```text
//! request → classify(bucket_key) → BanThrottler::throttled_until → [403]
//!   → TimeAndErrorsThrottler::throttled_duration → [429, note_throttled]
//!   → downstream handler → timer stops
//!   → TimeAndErrorsThrottler::record_success/record_failure
//! ```
//!
//! ## Core Components
//!
//! - [`token_bucket::TokenBucket`] - integer, fixed-interval-refill counter
//! - [`bucketing`] - request → bucket key classification strategies
//! - [`state_store::StateStore`] - bounded, idle-evicting cache of per-bucket state
//! - [`throttler::TimeAndErrorsThrottler`] - time/error throttling decisions
//! - [`ban::BanThrottler`] - throttle-incident → ban escalation
//! - [`filter`] - the Axum middleware orchestrating the above
//!
//! ## Module Organization
//!
//! - [`clock`] - injectable monotonic/wall-clock time source
//! - [`bucketing`] - request classification into bucket keys
//! - [`token_bucket`] - the rate-limited integer counter
//! - [`state`] - per-bucket throttling state
//! - [`state_store`] - bounded, idle-evicting state cache
//! - [`gate`] - admission-gating (enable-if-header / always-force overrides)
//! - [`throttler`] - time/error throttling decisions
//! - [`ban`] - ban escalation
//! - [`metrics`] - operational counters and the `/metrics` endpoint
//! - [`filter`] - the orchestrating middleware
//! - [`config`] - configuration loading
//! - [`config_validator`] - cross-field configuration checks
//! - [`error`] - startup error types
//! - [`health`] - `/health` and `/ready` endpoints
//! - [`server`] - HTTP server setup and routing

pub mod ban;
pub mod bucketing;
pub mod clock;
pub mod config;
pub mod config_validator;
pub mod error;
pub mod filter;
pub mod gate;
pub mod health;
pub mod metrics;
pub mod server;
pub mod state;
pub mod state_store;
pub mod throttler;
pub mod token_bucket;

pub use config::Config;
pub use error::ThrottlerError;
pub use filter::ThrottlingFilter;

pub type Result<T> = std::result::Result<T, ThrottlerError>;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
