//! Credora HTTP API
//!
//! The engine is consumed in-process by the surrounding application; the
//! HTTP surface here is what outside systems call.
//!
//! ```text
//! /
//! ├── /health               - liveness
//! └── /webhooks/payments    - signed payment gateway events (HMAC-SHA512)
//! ```

pub mod error;
pub mod handlers;
pub mod routes;
pub mod signature;
pub mod state;

use std::sync::Arc;

use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use state::{AppState, WebhookConfig};

/// API configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Enable CORS for browser clients
    pub enable_cors: bool,
    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
    /// Enable request tracing
    pub enable_tracing: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enable_cors: false,
            cors_origins: vec!["*".to_string()],
            enable_tracing: true,
        }
    }
}

/// Create the API router with middleware
pub fn create_router(state: Arc<AppState>, config: ApiConfig) -> Router {
    let mut router = routes::routes().with_state(state);

    if config.enable_tracing {
        router = router.layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            },
        ));
    }

    if config.enable_cors {
        let cors = if config.cors_origins.iter().any(|o| o == "*") {
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
                .allow_origin(
                    config
                        .cors_origins
                        .iter()
                        .filter_map(|o| o.parse().ok())
                        .collect::<Vec<_>>(),
                )
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers(Any)
        };
        router = router.layer(cors);
    }

    router
}

/// Router without middleware, for tests
pub fn create_test_router(state: Arc<AppState>) -> Router {
    routes::routes().with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert!(!config.enable_cors);
        assert!(config.enable_tracing);
    }

    #[test]
    fn test_default_webhook_config_requires_signature() {
        let config = WebhookConfig::default();
        assert!(!config.demo_mode);
        assert!(!config.has_secret());
        assert_eq!(config.signature_header, "x-webhook-signature");
    }
}
