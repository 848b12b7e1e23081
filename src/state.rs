//! # Throttling State
//!
//! [`ThrottlingState`] is the per-bucket record the throttler and banner
//! mutate: three token buckets with different units, plus a ban deadline.
//! The state itself is inert — it exposes field accessors only; all
//! arithmetic lives in [`crate::throttler::TimeAndErrorsThrottler`] and
//! [`crate::ban::BanThrottler`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::clock::Clock;
use crate::token_bucket::TokenBucket;

/// The capacity/refill triple for one of the three buckets a
/// `ThrottlingState` holds.
#[derive(Debug, Clone, Copy)]
pub struct BucketLimits {
    pub capacity: u64,
    pub refill_amount: u64,
    pub refill_period: Duration,
}

/// The three bucket limits that together parameterize a `ThrottlingState`.
#[derive(Debug, Clone, Copy)]
pub struct StateLimits {
    pub time_bucket: BucketLimits,
    pub error_bucket: BucketLimits,
    pub throttle_bucket: BucketLimits,
    pub ban_duration: Duration,
}

/// Per-bucket accounting record: a compute-time budget, an error budget, a
/// throttle-incident budget, and a ban deadline. `banned_until` is stored as
/// nanoseconds-since-epoch so it can be updated with a single lock-free
/// max-compare-and-swap rather than a mutex, since it is read and written far
/// more often than the rare configuration-time reconstruction of the whole
/// state would justify.
pub struct ThrottlingState {
    pub time_bucket: TokenBucket,
    pub error_bucket: TokenBucket,
    pub throttle_bucket: TokenBucket,
    ban_duration: Duration,
    banned_until_nanos: AtomicI64,
    clock: Arc<dyn Clock>,
}

/// Sentinel meaning "not banned" for the purposes of `banned_until`.
const NOT_BANNED: i64 = 0;

impl ThrottlingState {
    pub fn new(limits: StateLimits, clock: Arc<dyn Clock>) -> Self {
        Self {
            time_bucket: TokenBucket::new(
                limits.time_bucket.capacity,
                limits.time_bucket.refill_amount,
                limits.time_bucket.refill_period,
                clock.clone(),
            ),
            error_bucket: TokenBucket::new(
                limits.error_bucket.capacity,
                limits.error_bucket.refill_amount,
                limits.error_bucket.refill_period,
                clock.clone(),
            ),
            throttle_bucket: TokenBucket::new(
                limits.throttle_bucket.capacity,
                limits.throttle_bucket.refill_amount,
                limits.throttle_bucket.refill_period,
                clock.clone(),
            ),
            ban_duration: limits.ban_duration,
            banned_until_nanos: AtomicI64::new(NOT_BANNED),
            clock,
        }
    }

    /// The current ban deadline, or `None` if not banned (including a ban
    /// that has already expired).
    pub fn banned_until(&self) -> Option<SystemTime> {
        let nanos = self.banned_until_nanos.load(Ordering::Acquire);
        if nanos == NOT_BANNED {
            return None;
        }
        let deadline = nanos_to_system_time(nanos);
        if deadline > self.clock.wall_now() {
            Some(deadline)
        } else {
            None
        }
    }

    /// Extends the ban to `now + ban_duration`, never shortening an existing
    /// ban (monotonic via a max compare-and-swap loop).
    pub fn extend_ban(&self) {
        let new_deadline = self.clock.wall_now() + self.ban_duration;
        let new_nanos = system_time_to_nanos(new_deadline);
        let mut current = self.banned_until_nanos.load(Ordering::Acquire);
        loop {
            if current >= new_nanos {
                return;
            }
            match self.banned_until_nanos.compare_exchange_weak(
                current,
                new_nanos,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }
}

fn system_time_to_nanos(t: SystemTime) -> i64 {
    t.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos().min(i64::MAX as u128) as i64)
        .unwrap_or(NOT_BANNED)
}

fn nanos_to_system_time(nanos: i64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_nanos(nanos.max(0) as u64)
}
