//! Request, verdict and rejection types for the validation endpoint.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Body of a validation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub user_id: String,
    pub input: String,
    pub category: String,
}

/// Structured outcome returned to the caller for every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub blocked: bool,
    pub reason: String,
    pub sanitized_output: Option<String>,
    pub confidence: f64,
}

impl Verdict {
    /// Verdict for a request that passed every check.
    pub fn passed(input: &str) -> Self {
        Self {
            blocked: false,
            reason: "Input passed all security checks".to_string(),
            sanitized_output: Some(input.trim().to_string()),
            confidence: 0.95,
        }
    }

    fn blocked(reason: &str, confidence: f64) -> Self {
        Self {
            blocked: true,
            reason: reason.to_string(),
            sanitized_output: None,
            confidence,
        }
    }
}

/// Ways a validation request can be rejected.
///
/// All are terminal for the request; callers decide whether to retry from
/// the status code and `Retry-After`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The category is not the one this endpoint supports
    #[error("Invalid security category")]
    InvalidCategory,

    /// Admission denied by the rate limiter
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Anything unexpected while processing the request
    #[error("Request validation failed: {0}")]
    InternalValidationFailure(String),
}

impl ValidationError {
    pub fn status(&self) -> StatusCode {
        match self {
            ValidationError::InvalidCategory => StatusCode::BAD_REQUEST,
            ValidationError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ValidationError::InternalValidationFailure(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// The verdict body rendered for this rejection.
    pub fn verdict(&self) -> Verdict {
        match self {
            ValidationError::InvalidCategory => Verdict::blocked("Invalid security category", 0.80),
            ValidationError::RateLimited { .. } => Verdict::blocked("Rate limit exceeded", 0.99),
            ValidationError::InternalValidationFailure(_) => {
                Verdict::blocked("Request validation failed", 0.75)
            }
        }
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ValidationError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}
