//! Application state for the API server

use std::sync::Arc;

use atelier_core::CheckoutService;

/// API server state
#[derive(Clone)]
pub struct AppState {
    /// The checkout engine facade
    pub service: Arc<CheckoutService>,
    /// API version
    pub version: String,
}

impl AppState {
    /// Create app state over a built service
    pub fn new(service: Arc<CheckoutService>) -> Self {
        Self {
            service,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            enable_cors: true,
        }
    }
}

impl ApiConfig {
    /// Read overrides from `ATELIER_API_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("ATELIER_API_HOST").unwrap_or(defaults.host),
            port: std::env::var("ATELIER_API_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            enable_cors: std::env::var("ATELIER_API_CORS")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(defaults.enable_cors),
        }
    }
}
