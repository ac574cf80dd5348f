//! Trailing-window rate limiter with a secondary burst cap.
//!
//! Each key keeps a log of admission instants. On every check the log is
//! pruned to the trailing window, then compared against the burst cap and
//! the per-window cap, in that order.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::backend::{Decision, DenialCause, RateLimiter};
use super::clock::Clock;
use super::key::RateLimitKey;
use super::store::RateLimitStore;
use crate::config::{Algorithm, FixedWindowConfig, RetryAfterMode, StoreConfig};

/// Admission instants for one key inside the trailing window.
#[derive(Debug, Clone, Default)]
pub struct WindowLog {
    admitted: VecDeque<Instant>,
}

impl WindowLog {
    /// Discard every admission at or before `now - window`.
    fn prune(&mut self, now: Instant, window: Duration) {
        self.admitted
            .retain(|t| now.saturating_duration_since(*t) < window);
    }

    /// Seconds until the log drops below `limit` entries, rounded up and
    /// never less than one.
    fn time_until_below(&self, limit: usize, now: Instant, window: Duration) -> u64 {
        let mut sorted: Vec<Instant> = self.admitted.iter().copied().collect();
        sorted.sort_unstable();

        let index = sorted.len().saturating_sub(limit);
        let remaining = sorted
            .get(index)
            .map(|t| match t.checked_add(window) {
                Some(expires) => expires.saturating_duration_since(now),
                // Past the platform's Instant range: the entry outlives any
                // horizon we can represent, so wait the whole window.
                None => window,
            })
            .unwrap_or(Duration::ZERO);

        let secs = remaining
            .as_secs()
            .saturating_add(u64::from(remaining.subsec_nanos() > 0));
        secs.max(1)
    }

    pub fn len(&self) -> usize {
        self.admitted.len()
    }
}

/// Fixed-window limiter over a bounded key store.
pub struct FixedWindowLimiter {
    window: Duration,
    max_per_window: usize,
    burst_limit: usize,
    retry_after: RetryAfterMode,
    clock: Arc<dyn Clock>,
    store: RateLimitStore<WindowLog>,
}

impl FixedWindowLimiter {
    pub fn new(config: &FixedWindowConfig, store: &StoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            window: config.window_duration(),
            max_per_window: config.max_per_window as usize,
            burst_limit: config.burst_limit as usize,
            retry_after: config.retry_after,
            clock,
            store: RateLimitStore::new(store),
        }
    }

    /// Number of admissions logged for `key`, as of its last check.
    pub fn logged(&self, key: &RateLimitKey) -> Option<usize> {
        self.store.inspect(key, WindowLog::len)
    }

    fn deny(&self, log: &WindowLog, limit: usize, now: Instant, cause: DenialCause) -> Decision {
        let retry_after_secs = match self.retry_after {
            RetryAfterMode::FullWindow => self.window.as_secs().max(1),
            RetryAfterMode::Precise => log.time_until_below(limit, now, self.window),
        };
        Decision::Denied {
            retry_after_secs,
            cause,
        }
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn check_and_consume(&self, key: &RateLimitKey) -> Decision {
        let now = self.clock.now();

        self.store.with_entry(key, now, WindowLog::default, |log| {
            log.prune(now, self.window);
            let count = log.len();
            trace!(key = %key, count, "Window pruned");

            // With burst_limit <= max_per_window the second branch never fires.
            let decision = if count >= self.burst_limit {
                self.deny(log, self.burst_limit, now, DenialCause::BurstLimit)
            } else if count >= self.max_per_window {
                self.deny(log, self.max_per_window, now, DenialCause::WindowLimit)
            } else {
                log.admitted.push_back(now);
                Decision::Allowed
            };

            if let Decision::Denied {
                retry_after_secs,
                cause,
            } = decision
            {
                debug!(key = %key, count, %cause, retry_after_secs, "Window limit hit");
            }
            decision
        })
    }

    fn sweep_idle(&self) -> usize {
        self.store.sweep(self.clock.now())
    }

    fn tracked_keys(&self) -> usize {
        self.store.len()
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::FixedWindow
    }
}
