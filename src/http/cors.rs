//! Cross-origin policy built from configuration.

use axum::http::HeaderValue;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};

use crate::config::CorsConfig;
use crate::error::{GuardError, Result};

/// Build the CORS layer.
///
/// Browsers refuse a literal `*` together with credentials, so a wildcard
/// combined with `allow_credentials` mirrors the request's origin, method and
/// headers instead.
pub fn cors_layer(config: &CorsConfig) -> Result<CorsLayer> {
    let origin = if config.allows_any_origin() {
        if config.allow_credentials {
            AllowOrigin::mirror_request()
        } else {
            AllowOrigin::from(Any)
        }
    } else {
        let origins = config
            .allowed_origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin).map_err(|e| {
                    GuardError::Config(format!("Invalid CORS origin {:?}: {}", origin, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        AllowOrigin::list(origins)
    };

    let layer = CorsLayer::new().allow_origin(origin);
    let layer = if config.allow_credentials {
        layer
            .allow_credentials(true)
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
    } else {
        layer.allow_methods(Any).allow_headers(Any)
    };

    Ok(layer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds() {
        assert!(cors_layer(&CorsConfig::default()).is_ok());
    }

    #[test]
    fn test_explicit_origins_build() {
        let config = CorsConfig {
            allowed_origins: vec![
                "https://exam.example.com".to_string(),
                "https://admin.example.com".to_string(),
            ],
            allow_credentials: false,
        };
        assert!(cors_layer(&config).is_ok());
    }

    #[test]
    fn test_invalid_origin_rejected() {
        let config = CorsConfig {
            allowed_origins: vec!["https://bad\norigin".to_string()],
            allow_credentials: true,
        };
        assert!(matches!(cors_layer(&config), Err(GuardError::Config(_))));
    }
}
