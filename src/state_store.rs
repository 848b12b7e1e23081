//! # State Store
//!
//! A bounded, concurrent map from [`BucketKey`] to [`ThrottlingState`], with
//! two eviction axes — maximum size and idle-time expiry — both supplied
//! directly by `mini_moka`'s cache builder. Eviction is silent: a bucket
//! evicted for being idle or for exceeding the size cap simply starts fresh
//! (full buckets, no ban) the next time it is seen. That is by design, not a
//! leak.

use std::sync::Arc;
use std::time::Duration;

use mini_moka::sync::Cache;

use crate::bucketing::BucketKey;
use crate::clock::Clock;
use crate::state::{StateLimits, ThrottlingState};

pub struct StateStore {
    cache: Cache<BucketKey, Arc<ThrottlingState>>,
    limits: StateLimits,
    clock: Arc<dyn Clock>,
}

impl StateStore {
    pub fn new(max_size: u64, idle_expiry: Duration, limits: StateLimits, clock: Arc<dyn Clock>) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_size)
            .time_to_idle(idle_expiry)
            .build();
        Self { cache, limits, clock }
    }

    /// Returns the existing state for `key`, if any, without creating one.
    /// Used by the throttling decision path, which treats an absent state as
    /// "never throttled" without paying for an allocation.
    pub fn get_existing(&self, key: &BucketKey) -> Option<Arc<ThrottlingState>> {
        self.cache.get(key)
    }

    /// Returns the existing state for `key`, creating and inserting a fresh
    /// one if absent. Used by accounting calls, which always need a state to
    /// mutate.
    pub fn get_or_create(&self, key: &BucketKey) -> Arc<ThrottlingState> {
        if let Some(existing) = self.cache.get(key) {
            return existing;
        }
        let fresh = Arc::new(ThrottlingState::new(self.limits, self.clock.clone()));
        self.cache.insert(key.clone(), fresh.clone());
        fresh
    }

    /// Approximate current size, for the `/metrics` endpoint.
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::net::{IpAddr, Ipv4Addr};

    fn limits() -> StateLimits {
        StateLimits {
            time_bucket: crate::state::BucketLimits {
                capacity: 1000,
                refill_amount: 1000,
                refill_period: Duration::from_secs(60),
            },
            error_bucket: crate::state::BucketLimits {
                capacity: 5,
                refill_amount: 5,
                refill_period: Duration::from_secs(60),
            },
            throttle_bucket: crate::state::BucketLimits {
                capacity: 10,
                refill_amount: 10,
                refill_period: Duration::from_secs(60),
            },
            ban_duration: Duration::from_secs(60),
        }
    }

    fn key(n: u8) -> BucketKey {
        BucketKey::IpAndUserAgent(IpAddr::V4(Ipv4Addr::new(127, 0, 0, n)), "ua".to_string())
    }

    #[test]
    fn get_existing_on_unseen_key_is_none() {
        let clock = Arc::new(ManualClock::new());
        let store = StateStore::new(100, Duration::from_secs(300), limits(), clock);
        assert!(store.get_existing(&key(1)).is_none());
    }

    #[test]
    fn get_or_create_then_get_existing_returns_same_state() {
        let clock = Arc::new(ManualClock::new());
        let store = StateStore::new(100, Duration::from_secs(300), limits(), clock);
        let created = store.get_or_create(&key(1));
        created.time_bucket.consume_or_overdraw(500);

        let fetched = store.get_existing(&key(1)).expect("should exist now");
        assert_eq!(fetched.time_bucket.count(), 500);
    }

    #[test]
    fn size_cap_bounds_entry_count() {
        let clock = Arc::new(ManualClock::new());
        let store = StateStore::new(4, Duration::from_secs(300), limits(), clock);
        for n in 0..20u8 {
            store.get_or_create(&key(n));
        }
        store.cache.run_pending_tasks();
        assert!(store.len() <= 4);
    }

    #[test]
    fn idle_eviction_drops_untouched_entries() {
        let clock = Arc::new(ManualClock::new());
        let store = StateStore::new(100, Duration::from_millis(50), limits(), clock);
        store.get_or_create(&key(1));
        std::thread::sleep(Duration::from_millis(150));
        store.cache.run_pending_tasks();
        assert!(store.get_existing(&key(1)).is_none());
    }
}
