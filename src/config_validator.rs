//! # Config Validation Beyond `validator`'s Derive
//!
//! `validator`'s derive macro (used on [`crate::config::Config`]) handles
//! per-field numeric ranges. It cannot express cross-field checks or
//! path-existence checks, so those live here as a small manual validator in
//! the same spirit — one function per concern, returning the first failure.

use std::time::Duration;

use tracing::warn;

use crate::config::Config;
use crate::error::ThrottlerError;

pub struct ConfigValidator;

impl ConfigValidator {
    /// Runs every check this module owns, returning the first failure.
    /// Called after `Config::validate()` (the `validator`-derived checks)
    /// passes, so both failure classes are fatal at startup in the same way.
    /// A missing pattern file is not among these failures — see
    /// `warn_if_pattern_file_missing` below.
    pub fn validate(config: &Config) -> Result<(), ThrottlerError> {
        Self::validate_bind_address(&config.bind_address)?;
        Self::validate_nonzero_period(config.time_bucket_refill_period, "time_bucket_refill_period")?;
        Self::validate_nonzero_period(config.error_bucket_refill_period, "error_bucket_refill_period")?;
        Self::validate_nonzero_period(
            config.throttle_bucket_refill_period,
            "throttle_bucket_refill_period",
        )?;
        Self::validate_nonzero_period(config.ban_duration, "ban_duration")?;
        Self::validate_nonzero_period(config.state_expiration, "state_expiration")?;
        Self::warn_if_pattern_file_missing(config.query_pattern_file.as_deref());
        Self::warn_if_pattern_file_missing(config.user_agent_pattern_file.as_deref());
        Ok(())
    }

    fn validate_bind_address(address: &str) -> Result<(), ThrottlerError> {
        if address.parse::<std::net::SocketAddr>().is_err() {
            return Err(ThrottlerError::Config(format!(
                "bind_address '{address}' is not a valid host:port"
            )));
        }
        Ok(())
    }

    fn validate_nonzero_period(period: Duration, field: &str) -> Result<(), ThrottlerError> {
        if period.is_zero() {
            return Err(ThrottlerError::Config(format!("{field} must be a positive duration")));
        }
        Ok(())
    }

    /// A configured pattern file that doesn't exist is not fatal — per the
    /// engine's error-handling design, pattern file I/O errors degrade the
    /// owning bucketing strategy to "no opinion" rather than blocking
    /// startup (`bucketing::load_patterns` already does this on its own).
    /// This only logs so the operator notices the typo.
    fn warn_if_pattern_file_missing(path: Option<&std::path::Path>) {
        if let Some(path) = path {
            if !path.exists() {
                warn!(path = %path.display(), "configured pattern file does not exist; that bucketing strategy will degrade to no-opinion");
            }
        }
    }
}
