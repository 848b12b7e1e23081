//! # Configuration
//!
//! Static configuration, read once at startup. Loaded via the `config`
//! crate from an optional TOML file layered under `THROTTLE_`-prefixed
//! environment variables (e.g. `THROTTLE_ENABLED=false`,
//! `THROTTLE_BAN_DURATION=10m`). Duration-valued fields use `humantime_serde`
//! so they can be written as `"60s"`, `"5m"`, etc., in either source.
//!
//! Validity (non-zero capacities, non-zero periods, ...) is not fully
//! expressible with `validator`'s derive alone — see [`crate::config_validator`]
//! for the remaining checks. Both layers run before the server binds;
//! failure at either is fatal startup, per this engine's error-handling
//! design.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use validator::Validate;

use crate::error::ThrottlerError;
use crate::state::{BucketLimits, StateLimits};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    /// Master switch. When `false`, the filter passes every request through
    /// untouched and no accounting occurs.
    pub enabled: bool,

    /// Successful requests faster than this are not charged against the
    /// time bucket at all.
    #[serde(with = "humantime_serde")]
    pub request_duration_threshold: Duration,

    #[validate(range(min = 1))]
    pub time_bucket_capacity_secs: u64,
    #[validate(range(min = 1))]
    pub time_bucket_refill_amount_secs: u64,
    #[serde(with = "humantime_serde")]
    pub time_bucket_refill_period: Duration,

    #[validate(range(min = 1))]
    pub error_bucket_capacity: u64,
    #[validate(range(min = 1))]
    pub error_bucket_refill_amount: u64,
    #[serde(with = "humantime_serde")]
    pub error_bucket_refill_period: Duration,

    #[validate(range(min = 1))]
    pub throttle_bucket_capacity: u64,
    #[validate(range(min = 1))]
    pub throttle_bucket_refill_amount: u64,
    #[serde(with = "humantime_serde")]
    pub throttle_bucket_refill_period: Duration,

    #[serde(with = "humantime_serde")]
    pub ban_duration: Duration,

    #[validate(range(min = 1))]
    pub max_state_size: u64,
    #[serde(with = "humantime_serde")]
    pub state_expiration: Duration,

    /// If set, a throttler is only active for requests carrying this header.
    pub enable_throttling_if_header: Option<String>,
    /// If set, the banner is only active for requests carrying this header.
    pub enable_ban_if_header: Option<String>,
    /// If set, requests carrying this query parameter are always throttled.
    pub always_throttle_param: Option<String>,
    /// If set, requests carrying this query parameter are always banned.
    pub always_ban_param: Option<String>,

    /// One regex per line, matched against the `query` query parameter.
    pub query_pattern_file: Option<PathBuf>,
    /// One regex per line, matched against the `User-Agent` header.
    pub user_agent_pattern_file: Option<PathBuf>,

    pub bind_address: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            request_duration_threshold: Duration::from_millis(500),
            time_bucket_capacity_secs: 60,
            time_bucket_refill_amount_secs: 60,
            time_bucket_refill_period: Duration::from_secs(60),
            error_bucket_capacity: 5,
            error_bucket_refill_amount: 5,
            error_bucket_refill_period: Duration::from_secs(60),
            throttle_bucket_capacity: 10,
            throttle_bucket_refill_amount: 10,
            throttle_bucket_refill_period: Duration::from_secs(60),
            ban_duration: Duration::from_secs(60),
            max_state_size: 100_000,
            state_expiration: Duration::from_secs(3600),
            enable_throttling_if_header: None,
            enable_ban_if_header: None,
            always_throttle_param: None,
            always_ban_param: None,
            query_pattern_file: None,
            user_agent_pattern_file: None,
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from an optional TOML file at `path`, layered
    /// under `THROTTLE_`-prefixed environment variables, falling back to
    /// [`Config::default`] field-by-field for anything neither source sets.
    pub fn load(path: &str) -> Result<Self, ThrottlerError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("THROTTLE").separator("__"))
            .build()
            .map_err(|err| ThrottlerError::Config(err.to_string()))?;

        match settings.try_deserialize::<PartialConfig>() {
            Ok(partial) => Ok(partial.into_config_with_defaults()),
            Err(err) => Err(ThrottlerError::Config(err.to_string())),
        }
    }

    pub fn time_bucket_limits(&self) -> BucketLimits {
        BucketLimits {
            capacity: self.time_bucket_capacity_secs * 1000,
            refill_amount: self.time_bucket_refill_amount_secs * 1000,
            refill_period: self.time_bucket_refill_period,
        }
    }

    pub fn error_bucket_limits(&self) -> BucketLimits {
        BucketLimits {
            capacity: self.error_bucket_capacity,
            refill_amount: self.error_bucket_refill_amount,
            refill_period: self.error_bucket_refill_period,
        }
    }

    pub fn throttle_bucket_limits(&self) -> BucketLimits {
        BucketLimits {
            capacity: self.throttle_bucket_capacity,
            refill_amount: self.throttle_bucket_refill_amount,
            refill_period: self.throttle_bucket_refill_period,
        }
    }

    pub fn state_limits(&self) -> StateLimits {
        StateLimits {
            time_bucket: self.time_bucket_limits(),
            error_bucket: self.error_bucket_limits(),
            throttle_bucket: self.throttle_bucket_limits(),
            ban_duration: self.ban_duration,
        }
    }
}

/// Mirrors `Config` with every field optional, so a partially-specified
/// file/environment layer can be merged onto `Config::default()` instead of
/// failing deserialization outright for the fields it omits.
#[derive(Debug, Deserialize, Default)]
struct PartialConfig {
    enabled: Option<bool>,
    #[serde(default, with = "humantime_serde::option")]
    request_duration_threshold: Option<Duration>,
    time_bucket_capacity_secs: Option<u64>,
    time_bucket_refill_amount_secs: Option<u64>,
    #[serde(default, with = "humantime_serde::option")]
    time_bucket_refill_period: Option<Duration>,
    error_bucket_capacity: Option<u64>,
    error_bucket_refill_amount: Option<u64>,
    #[serde(default, with = "humantime_serde::option")]
    error_bucket_refill_period: Option<Duration>,
    throttle_bucket_capacity: Option<u64>,
    throttle_bucket_refill_amount: Option<u64>,
    #[serde(default, with = "humantime_serde::option")]
    throttle_bucket_refill_period: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    ban_duration: Option<Duration>,
    max_state_size: Option<u64>,
    #[serde(default, with = "humantime_serde::option")]
    state_expiration: Option<Duration>,
    enable_throttling_if_header: Option<String>,
    enable_ban_if_header: Option<String>,
    always_throttle_param: Option<String>,
    always_ban_param: Option<String>,
    query_pattern_file: Option<PathBuf>,
    user_agent_pattern_file: Option<PathBuf>,
    bind_address: Option<String>,
}

impl PartialConfig {
    fn into_config_with_defaults(self) -> Config {
        let default = Config::default();
        Config {
            enabled: self.enabled.unwrap_or(default.enabled),
            request_duration_threshold: self
                .request_duration_threshold
                .unwrap_or(default.request_duration_threshold),
            time_bucket_capacity_secs: self
                .time_bucket_capacity_secs
                .unwrap_or(default.time_bucket_capacity_secs),
            time_bucket_refill_amount_secs: self
                .time_bucket_refill_amount_secs
                .unwrap_or(default.time_bucket_refill_amount_secs),
            time_bucket_refill_period: self
                .time_bucket_refill_period
                .unwrap_or(default.time_bucket_refill_period),
            error_bucket_capacity: self.error_bucket_capacity.unwrap_or(default.error_bucket_capacity),
            error_bucket_refill_amount: self
                .error_bucket_refill_amount
                .unwrap_or(default.error_bucket_refill_amount),
            error_bucket_refill_period: self
                .error_bucket_refill_period
                .unwrap_or(default.error_bucket_refill_period),
            throttle_bucket_capacity: self
                .throttle_bucket_capacity
                .unwrap_or(default.throttle_bucket_capacity),
            throttle_bucket_refill_amount: self
                .throttle_bucket_refill_amount
                .unwrap_or(default.throttle_bucket_refill_amount),
            throttle_bucket_refill_period: self
                .throttle_bucket_refill_period
                .unwrap_or(default.throttle_bucket_refill_period),
            ban_duration: self.ban_duration.unwrap_or(default.ban_duration),
            max_state_size: self.max_state_size.unwrap_or(default.max_state_size),
            state_expiration: self.state_expiration.unwrap_or(default.state_expiration),
            enable_throttling_if_header: self
                .enable_throttling_if_header
                .or(default.enable_throttling_if_header),
            enable_ban_if_header: self.enable_ban_if_header.or(default.enable_ban_if_header),
            always_throttle_param: self.always_throttle_param.or(default.always_throttle_param),
            always_ban_param: self.always_ban_param.or(default.always_ban_param),
            query_pattern_file: self.query_pattern_file.or(default.query_pattern_file),
            user_agent_pattern_file: self
                .user_agent_pattern_file
                .or(default.user_agent_pattern_file),
            bind_address: self.bind_address.unwrap_or(default.bind_address),
        }
    }
}
