//! # Time/Error Throttler
//!
//! Decides whether a request should be throttled based on the bucket's
//! remaining compute-time and error budgets, and updates those budgets after
//! the downstream handler completes. State is created lazily — a
//! well-behaved client that never crosses the cost threshold and never
//! errors never gets a `ThrottlingState` allocated at all.

use std::sync::Arc;
use std::time::Duration;

use crate::bucketing::{BucketKey, RequestContext};
use crate::gate::AdmissionGate;
use crate::state_store::StateStore;

pub struct TimeAndErrorsThrottler {
    store: Arc<StateStore>,
    gate: AdmissionGate,
    request_duration_threshold: Duration,
}

impl TimeAndErrorsThrottler {
    pub fn new(store: Arc<StateStore>, gate: AdmissionGate, request_duration_threshold: Duration) -> Self {
        Self {
            store,
            gate,
            request_duration_threshold,
        }
    }

    /// How long the caller should back off, or `Duration::ZERO` if not
    /// throttled. Reads existing state only — never creates one — so a
    /// bucket key never seen by `record_success`/`record_failure` is never
    /// throttled.
    pub fn throttled_duration(&self, key: &BucketKey, ctx: &RequestContext) -> Duration {
        if !self.gate.is_enabled(ctx) {
            return Duration::ZERO;
        }
        if self.gate.is_forced(ctx) {
            return Duration::from_secs(1);
        }
        let Some(state) = self.store.get_existing(key) else {
            return Duration::ZERO;
        };
        let time_exhausted = !state.time_bucket.peek_available(1);
        let errors_exhausted = !state.error_bucket.peek_available(1);
        if !time_exhausted && !errors_exhausted {
            return Duration::ZERO;
        }
        state
            .time_bucket
            .time_until_available(1)
            .max(state.error_bucket.time_until_available(1))
    }

    /// Charges a successful request's elapsed time against the time bucket,
    /// but only once `elapsed` reaches the configured threshold — and only
    /// then does it create state for a previously-unseen bucket.
    pub fn record_success(&self, key: &BucketKey, elapsed: Duration) {
        if elapsed < self.request_duration_threshold {
            return;
        }
        let state = self.store.get_or_create(key);
        state.time_bucket.consume_or_overdraw(elapsed_ms(elapsed));
    }

    /// Charges a failed request's elapsed time against the time bucket and
    /// one unit against the error bucket, unconditionally — failures always
    /// create state and always charge, regardless of threshold.
    pub fn record_failure(&self, key: &BucketKey, elapsed: Duration) {
        let state = self.store.get_or_create(key);
        state.time_bucket.consume_or_overdraw(elapsed_ms(elapsed));
        state.error_bucket.consume_or_overdraw(1);
    }
}

fn elapsed_ms(elapsed: Duration) -> u64 {
    elapsed.as_millis().min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::state::{BucketLimits, StateLimits};
    use std::net::{IpAddr, Ipv4Addr};

    fn limits() -> StateLimits {
        StateLimits {
            time_bucket: BucketLimits {
                capacity: 60_000,
                refill_amount: 60_000,
                refill_period: Duration::from_secs(60),
            },
            error_bucket: BucketLimits {
                capacity: 5,
                refill_amount: 5,
                refill_period: Duration::from_secs(60),
            },
            throttle_bucket: BucketLimits {
                capacity: 10,
                refill_amount: 10,
                refill_period: Duration::from_secs(60),
            },
            ban_duration: Duration::from_secs(60),
        }
    }

    fn key() -> BucketKey {
        BucketKey::IpAndUserAgent(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), "ua".to_string())
    }

    fn ctx() -> RequestContext {
        RequestContext {
            source_ip: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            user_agent: "ua".to_string(),
            query_param: None,
            headers: Default::default(),
            query_params: Default::default(),
        }
    }

    fn throttler(threshold: Duration) -> (TimeAndErrorsThrottler, Arc<StateStore>) {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(StateStore::new(100, Duration::from_secs(300), limits(), clock));
        let gate = AdmissionGate::new(None, None);
        (
            TimeAndErrorsThrottler::new(store.clone(), gate, threshold),
            store,
        )
    }

    #[test]
    fn fresh_key_is_not_throttled() {
        let (throttler, _store) = throttler(Duration::from_millis(500));
        assert_eq!(throttler.throttled_duration(&key(), &ctx()), Duration::ZERO);
    }

    #[test]
    fn success_below_threshold_does_not_create_state() {
        let (throttler, store) = throttler(Duration::from_millis(500));
        throttler.record_success(&key(), Duration::from_millis(10));
        assert!(store.get_existing(&key()).is_none());
    }

    #[test]
    fn success_at_or_above_threshold_charges_time_bucket() {
        let (throttler, store) = throttler(Duration::from_millis(500));
        throttler.record_success(&key(), Duration::from_millis(10_000));
        let state = store.get_existing(&key()).expect("state created");
        assert_eq!(state.time_bucket.count(), 50_000);
    }

    #[test]
    fn failure_always_creates_state_and_charges_both_buckets() {
        let (throttler, store) = throttler(Duration::from_millis(500));
        throttler.record_failure(&key(), Duration::from_millis(10));
        let state = store.get_existing(&key()).expect("state created");
        assert_eq!(state.time_bucket.count(), 59_990);
        assert_eq!(state.error_bucket.count(), 4);
    }

    #[test]
    fn repeated_costly_successes_eventually_throttle() {
        let (throttler, _store) = throttler(Duration::from_millis(500));
        for _ in 0..5 {
            throttler.record_success(&key(), Duration::from_millis(10_000));
        }
        assert_eq!(throttler.throttled_duration(&key(), &ctx()), Duration::ZERO);
        throttler.record_success(&key(), Duration::from_millis(10_000));
        assert!(throttler.throttled_duration(&key(), &ctx()) > Duration::ZERO);
    }

    #[test]
    fn disabled_gate_never_throttles() {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(StateStore::new(100, Duration::from_secs(300), limits(), clock));
        let gate = AdmissionGate::new(Some("X-Enable".to_string()), None);
        let throttler = TimeAndErrorsThrottler::new(store.clone(), gate, Duration::from_millis(500));
        for _ in 0..10 {
            throttler.record_failure(&key(), Duration::from_millis(10));
        }
        assert_eq!(throttler.throttled_duration(&key(), &ctx()), Duration::ZERO);
    }

    #[test]
    fn forced_param_throttles_regardless_of_state() {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(StateStore::new(100, Duration::from_secs(300), limits(), clock));
        let gate = AdmissionGate::new(None, Some("forceThrottle".to_string()));
        let throttler = TimeAndErrorsThrottler::new(store, gate, Duration::from_millis(500));
        let mut forced_ctx = ctx();
        forced_ctx
            .query_params
            .insert("forceThrottle".to_string(), "1".to_string());
        assert!(throttler.throttled_duration(&key(), &forced_ctx) > Duration::ZERO);
    }

    // S3: error bucket C=5, R=5, P=60000ms. Six consecutive failures empty the
    // error bucket; the 7th request is throttled.
    #[test]
    fn s3_six_consecutive_failures_then_seventh_request_is_throttled() {
        let (throttler, _store) = throttler(Duration::from_millis(500));
        for _ in 0..6 {
            throttler.record_failure(&key(), Duration::from_millis(10));
        }
        assert!(throttler.throttled_duration(&key(), &ctx()) > Duration::ZERO);
    }

    // S5: two distinct clients (different IP/UA) whose requests share a
    // regex-matched bucket combine their cost against one time bucket, even
    // though neither client's request alone would exhaust it.
    #[test]
    fn s5_two_distinct_clients_sharing_a_regex_bucket_combine_cost() {
        use crate::bucketing::BucketingChain;
        use std::net::Ipv4Addr;

        let chain = BucketingChain::standard(
            vec![regex::Regex::new(r".*WHERE \{\?a \?b \?c\}.*").unwrap()],
            vec![],
        );
        let query = "SELECT * WHERE {?a ?b ?c}";
        let ctx_a = RequestContext {
            source_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            user_agent: "client-a/1.0".to_string(),
            query_param: Some(query.to_string()),
            headers: Default::default(),
            query_params: Default::default(),
        };
        let ctx_b = RequestContext {
            source_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            user_agent: "client-b/2.0".to_string(),
            query_param: Some(query.to_string()),
            headers: Default::default(),
            query_params: Default::default(),
        };

        let key_a = chain.classify(&ctx_a).expect("query pattern should match");
        let key_b = chain.classify(&ctx_b).expect("query pattern should match");
        assert_eq!(key_a, key_b, "both clients must share one bucket");

        let mut shared_limits = limits();
        shared_limits.time_bucket = BucketLimits {
            capacity: 15_000,
            refill_amount: 15_000,
            refill_period: Duration::from_secs(60),
        };
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(StateStore::new(100, Duration::from_secs(300), shared_limits, clock));
        let gate = AdmissionGate::new(None, None);
        let throttler = TimeAndErrorsThrottler::new(store, gate, Duration::from_millis(500));

        // Neither client's 10s request alone would exhaust a 15s budget.
        throttler.record_success(&key_a, Duration::from_millis(10_000));
        assert_eq!(throttler.throttled_duration(&key_b, &ctx_b), Duration::ZERO);

        // The second client's request against the same shared bucket pushes
        // combined cost (20s) past the 15s capacity.
        throttler.record_success(&key_b, Duration::from_millis(10_000));
        assert!(throttler.throttled_duration(&key_a, &ctx_a) > Duration::ZERO);
    }
}
