//! Token bucket rate limiter.
//!
//! Each key owns a bucket that starts full, refills continuously at
//! `max_per_minute / 60` tokens per second up to `burst_capacity`, and spends
//! one token per admitted request.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

use super::backend::{Decision, DenialCause, RateLimiter};
use super::clock::Clock;
use super::key::RateLimitKey;
use super::store::RateLimitStore;
use crate::config::{Algorithm, StoreConfig, TokenBucketConfig};

/// Per-key token bucket state.
#[derive(Debug, Clone)]
pub struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Credit tokens for the time elapsed since the last refill.
    fn refill(&mut self, now: Instant, capacity: f64, rate: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    fn try_consume(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whole seconds until one token is available, never less than one.
    fn retry_after_secs(&self, rate: f64) -> u64 {
        ((1.0 - self.tokens) / rate).ceil().max(1.0) as u64
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn last_refill(&self) -> Instant {
        self.last_refill
    }
}

/// Token bucket limiter over a bounded key store.
pub struct TokenBucketLimiter {
    capacity: f64,
    refill_rate: f64,
    clock: Arc<dyn Clock>,
    store: RateLimitStore<Bucket>,
}

impl TokenBucketLimiter {
    pub fn new(config: &TokenBucketConfig, store: &StoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            capacity: f64::from(config.burst_capacity),
            refill_rate: config.refill_rate(),
            clock,
            store: RateLimitStore::new(store),
        }
    }

    /// Snapshot of the bucket for `key`, as of its last check.
    pub fn bucket(&self, key: &RateLimitKey) -> Option<Bucket> {
        self.store.inspect(key, Bucket::clone)
    }
}

impl RateLimiter for TokenBucketLimiter {
    fn check_and_consume(&self, key: &RateLimitKey) -> Decision {
        let now = self.clock.now();
        let (capacity, rate) = (self.capacity, self.refill_rate);

        self.store.with_entry(
            key,
            now,
            || {
                debug!(key = %key, capacity, rate, "Creating token bucket");
                Bucket::full(capacity, now)
            },
            |bucket| {
                bucket.refill(now, capacity, rate);
                trace!(key = %key, tokens = bucket.tokens, "Bucket refilled");

                if bucket.try_consume() {
                    Decision::Allowed
                } else {
                    let retry_after_secs = bucket.retry_after_secs(rate);
                    debug!(key = %key, tokens = bucket.tokens, retry_after_secs, "Bucket empty");
                    Decision::Denied {
                        retry_after_secs,
                        cause: DenialCause::BucketEmpty,
                    }
                }
            },
        )
    }

    fn sweep_idle(&self) -> usize {
        self.store.sweep(self.clock.now())
    }

    fn tracked_keys(&self) -> usize {
        self.store.len()
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::TokenBucket
    }
}
