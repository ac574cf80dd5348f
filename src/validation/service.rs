//! Validation service combining the category gate with admission control.

use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::verdict::{ValidateRequest, ValidationError, Verdict};
use crate::config::GuardConfig;
use crate::ratelimit::{build_limiter, Clock, Decision, KeyDeriver, RateLimiter};

/// Produces a [`Verdict`] for each validation request.
pub struct ValidationService {
    limiter: Arc<dyn RateLimiter>,
    keys: KeyDeriver,
    category: String,
}

impl ValidationService {
    pub fn new(limiter: Arc<dyn RateLimiter>, keys: KeyDeriver, category: impl Into<String>) -> Self {
        Self {
            limiter,
            keys,
            category: category.into(),
        }
    }

    /// Build the service and its limiter from configuration.
    pub fn from_config(config: &GuardConfig, clock: Arc<dyn Clock>) -> Self {
        let limiter = build_limiter(&config.rate_limiting, clock);
        info!(
            algorithm = %limiter.algorithm(),
            granularity = ?config.rate_limiting.key_granularity,
            category = %config.validation.category,
            "Validation service initialized"
        );
        Self::new(
            limiter,
            KeyDeriver::new(config.rate_limiting.key_granularity),
            config.validation.category.clone(),
        )
    }

    pub fn limiter(&self) -> &Arc<dyn RateLimiter> {
        &self.limiter
    }

    /// Validate one request from `source`.
    ///
    /// The category gate runs first and does not consume rate-limit quota.
    pub fn validate(&self, request: &ValidateRequest, source: IpAddr) -> Result<Verdict, ValidationError> {
        if request.category != self.category {
            info!(category = %request.category, "Rejected unsupported category");
            return Err(ValidationError::InvalidCategory);
        }

        let key = self.keys.derive(source, Some(&request.user_id));

        match self.limiter.check_and_consume(&key) {
            Decision::Allowed => {
                debug!(key = %key, "Request admitted");
                Ok(Verdict::passed(&request.input))
            }
            Decision::Denied {
                retry_after_secs,
                cause,
            } => {
                warn!(key = %key, %cause, retry_after_secs, "Rate limit exceeded");
                Err(ValidationError::RateLimited { retry_after_secs })
            }
        }
    }
}
