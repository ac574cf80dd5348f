//! Rate limiter trait for abstracting over the limiting algorithms.

use std::sync::Arc;

use super::clock::Clock;
use super::fixed_window::FixedWindowLimiter;
use super::key::RateLimitKey;
use super::token_bucket::TokenBucketLimiter;
use crate::config::{Algorithm, RateLimitingConfig};

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialCause {
    /// Token bucket holds less than one token
    BucketEmpty,
    /// Fixed-window burst cap reached
    BurstLimit,
    /// Fixed-window per-window cap reached
    WindowLimit,
}

impl std::fmt::Display for DenialCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenialCause::BucketEmpty => write!(f, "bucket empty"),
            DenialCause::BurstLimit => write!(f, "burst limit reached"),
            DenialCause::WindowLimit => write!(f, "window limit reached"),
        }
    }
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied {
        /// Advisory wait before retrying, at least one second
        retry_after_secs: u64,
        cause: DenialCause,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Decision::Allowed => None,
            Decision::Denied {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
        }
    }
}

/// Trait for rate limiter implementations.
///
/// Checks are CPU-bound and complete in bounded time apart from contention on
/// the key's lock, so the trait is synchronous.
pub trait RateLimiter: Send + Sync {
    /// Decide whether the subject identified by `key` may proceed, consuming
    /// quota if it may.
    fn check_and_consume(&self, key: &RateLimitKey) -> Decision;

    /// Drop state for keys that have been idle past the store's timeout.
    /// Returns the number of keys removed.
    fn sweep_idle(&self) -> usize;

    /// Get the number of keys currently tracked.
    fn tracked_keys(&self) -> usize;

    fn algorithm(&self) -> Algorithm;
}

/// Build the limiter selected by configuration.
pub fn build_limiter(config: &RateLimitingConfig, clock: Arc<dyn Clock>) -> Arc<dyn RateLimiter> {
    match config.algorithm {
        Algorithm::TokenBucket => Arc::new(TokenBucketLimiter::new(
            &config.token_bucket,
            &config.store,
            clock,
        )),
        Algorithm::FixedWindow => Arc::new(FixedWindowLimiter::new(
            &config.fixed_window,
            &config.store,
            clock,
        )),
    }
}
