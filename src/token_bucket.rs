//! # Token Bucket
//!
//! An integer, fixed-interval-refill token bucket. Two buckets in this crate
//! count milliseconds of compute time; the other two count events (errors,
//! throttling incidents). All four share this one implementation — only the
//! units attached by the caller differ.
//!
//! ## Refill policy
//!
//! At time `t`, `count = min(capacity, last_count + floor((t - last_refill) / period) * refill_amount)`,
//! and `last_refill` advances by the whole number of periods consumed rather
//! than snapping to `t`. This preserves partial progress toward the next
//! period across calls, so the refill amount never depends on how often the
//! bucket happens to be polled.
//!
//! ## Thread safety
//!
//! All operations lock a small internal mutex for the duration of the
//! refill-then-mutate sequence. Contention is per-bucket only.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::clock::Clock;

struct Bucket {
    count: u64,
    last_refill: Instant,
}

/// A rate-limited integer counter with capacity `C`, refilling by `R` every
/// period `P`.
pub struct TokenBucket {
    capacity: u64,
    refill_amount: u64,
    refill_period: Duration,
    clock: std::sync::Arc<dyn Clock>,
    state: Mutex<Bucket>,
}

impl TokenBucket {
    /// Creates a full bucket. `capacity`, `refill_amount` must be non-zero and
    /// `refill_period` must be a non-zero, finite duration — callers are
    /// expected to have validated these at configuration time (see
    /// `config_validator`); this constructor trusts that invariant rather
    /// than re-checking it on every bucket instantiation.
    pub fn new(
        capacity: u64,
        refill_amount: u64,
        refill_period: Duration,
        clock: std::sync::Arc<dyn Clock>,
    ) -> Self {
        debug_assert!(capacity > 0, "token bucket capacity must be positive");
        debug_assert!(refill_amount > 0, "token bucket refill amount must be positive");
        debug_assert!(!refill_period.is_zero(), "token bucket refill period must be positive");
        let now = clock.now();
        Self {
            capacity,
            refill_amount,
            refill_period,
            clock,
            state: Mutex::new(Bucket {
                count: capacity,
                last_refill: now,
            }),
        }
    }

    fn refill_locked(&self, bucket: &mut Bucket) {
        let now = self.clock.now();
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        let periods = elapsed.as_nanos() / self.refill_period.as_nanos();
        if periods == 0 {
            return;
        }
        let periods = periods.min(u32::MAX as u128) as u32;
        bucket.count = bucket
            .count
            .saturating_add((periods as u64).saturating_mul(self.refill_amount))
            .min(self.capacity);
        bucket.last_refill += self.refill_period * periods;
    }

    /// Succeeds (and decrements) iff the post-refill count is at least `n`.
    pub fn try_consume(&self, n: u64) -> bool {
        let mut bucket = self.state.lock().unwrap();
        self.refill_locked(&mut bucket);
        if bucket.count >= n {
            bucket.count -= n;
            true
        } else {
            false
        }
    }

    /// Always decrements, clamping at zero. Returns the shortfall — how many
    /// tokens were owed beyond what the bucket actually held.
    pub fn consume_or_overdraw(&self, n: u64) -> u64 {
        let mut bucket = self.state.lock().unwrap();
        self.refill_locked(&mut bucket);
        let shortfall = n.saturating_sub(bucket.count);
        bucket.count = bucket.count.saturating_sub(n);
        shortfall
    }

    /// Whether `n` tokens are available right now, without consuming any.
    pub fn peek_available(&self, n: u64) -> bool {
        let mut bucket = self.state.lock().unwrap();
        self.refill_locked(&mut bucket);
        bucket.count >= n
    }

    /// How long until `try_consume(n)` would succeed, assuming no further
    /// consumption in the meantime. Zero if already available.
    pub fn time_until_available(&self, n: u64) -> Duration {
        let mut bucket = self.state.lock().unwrap();
        self.refill_locked(&mut bucket);
        if bucket.count >= n {
            return Duration::ZERO;
        }
        let deficit = n - bucket.count;
        let periods_needed = deficit.div_ceil(self.refill_amount);
        self.refill_period * periods_needed.min(u32::MAX as u64) as u32
    }

    /// Current count, after a lazy refill. Read-only; used by metrics/tests.
    pub fn count(&self) -> u64 {
        let mut bucket = self.state.lock().unwrap();
        self.refill_locked(&mut bucket);
        bucket.count
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}
