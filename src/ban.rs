//! # Ban Throttler
//!
//! Converts repeated throttling incidents into a temporary ban. Every time
//! the filter decides to throttle a request, it calls [`BanThrottler::note_throttled`]
//! once the decision is made; when the throttle-incident bucket empties, the
//! bucket's ban deadline is extended.

use std::sync::Arc;
use std::time::SystemTime;

use crate::bucketing::{BucketKey, RequestContext};
use crate::gate::AdmissionGate;
use crate::state_store::StateStore;

pub struct BanThrottler {
    store: Arc<StateStore>,
    gate: AdmissionGate,
}

impl BanThrottler {
    pub fn new(store: Arc<StateStore>, gate: AdmissionGate) -> Self {
        Self { store, gate }
    }

    /// The ban deadline for `key`, if it is currently banned. Reads existing
    /// state only; a bucket key never throttled is never banned.
    pub fn throttled_until(&self, key: &BucketKey, ctx: &RequestContext) -> Option<SystemTime> {
        if !self.gate.is_enabled(ctx) {
            return None;
        }
        if self.gate.is_forced(ctx) {
            let state = self.store.get_or_create(key);
            state.extend_ban();
            return state.banned_until();
        }
        self.store.get_existing(key).and_then(|state| state.banned_until())
    }

    /// Records one throttling incident against `key`'s throttle bucket;
    /// lazily creates state. If the throttle bucket is now empty, extends
    /// the ban — never shortening an existing one.
    pub fn note_throttled(&self, key: &BucketKey) {
        let state = self.store.get_or_create(key);
        state.throttle_bucket.consume_or_overdraw(1);
        if state.throttle_bucket.count() == 0 {
            state.extend_ban();
        }
    }
}
