//! HTTP handlers for the validation endpoint.

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info_span};
use uuid::Uuid;

use super::client_ip::resolve_client_ip;
use crate::config::ClientIpSource;
use crate::validation::{ValidateRequest, ValidationError, ValidationService};

/// Shared application state.
pub struct AppState {
    pub service: ValidationService,
    pub client_ip: ClientIpSource,
}

/// Liveness response.
#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub message: &'static str,
    pub timestamp: String,
}

/// Liveness check.
pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        message: "Admission guard is running",
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Validate a request against the category gate and the rate limiter.
///
/// Body parse failures are answered with a `Request validation failed`
/// verdict rather than the extractor's default rejection.
pub async fn validate(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Json<ValidateRequest>, JsonRejection>,
) -> Response {
    let span = info_span!("validate", request_id = %Uuid::new_v4(), peer = %peer);

    span.in_scope(|| {
        let Json(request) = match payload {
            Ok(payload) => payload,
            Err(rejection) => {
                error!(error = %rejection.body_text(), "Validation error occurred");
                return ValidationError::InternalValidationFailure(rejection.body_text())
                    .into_response();
            }
        };

        let source = resolve_client_ip(&state.client_ip, &headers, peer);
        match state.service.validate(&request, source) {
            Ok(verdict) => (StatusCode::OK, Json(verdict)).into_response(),
            Err(err) => err.into_response(),
        }
    })
}

impl IntoResponse for ValidationError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(self.verdict());

        match self.retry_after_secs() {
            Some(secs) => (status, [(header::RETRY_AFTER, secs.to_string())], body).into_response(),
            None => (status, body).into_response(),
        }
    }
}

/// Render a handler panic as a failed validation instead of dropping the
/// connection.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };

    error!(panic = %detail, "Handler panicked");
    ValidationError::InternalValidationFailure(detail).into_response()
}
