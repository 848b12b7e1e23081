//! Injectable time sources.
//!
//! Token bucket refill is driven by a monotonic clock; ban deadlines are
//! expressed as wall-clock instants so they can be formatted as ISO-8601 and
//! survive process restarts conceptually (even though state itself does not).
//! Tests substitute [`ManualClock`] so bucket refill and ban expiry can be
//! exercised without sleeping.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

/// Source of monotonic and wall-clock time for the throttling engine.
pub trait Clock: Send + Sync {
    /// Monotonic instant, used for token bucket refill.
    fn now(&self) -> Instant;
    /// Wall-clock instant, used for ban deadlines and their ISO-8601 rendering.
    fn wall_now(&self) -> SystemTime;
}

/// The real clock, backed by `Instant::now()` / `SystemTime::now()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock that only advances when told to. Used by tests that need to cross
/// refill periods or ban windows deterministically.
#[derive(Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<(Instant, SystemTime)>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new((Instant::now(), SystemTime::now()))),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut guard = self.inner.lock().unwrap();
        guard.0 += duration;
        guard.1 += duration;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.inner.lock().unwrap().0
    }

    fn wall_now(&self) -> SystemTime {
        self.inner.lock().unwrap().1
    }
}
