//! Application state shared across handlers

use credora_engine::Engine;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Payment gateway webhook settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Shared HMAC secret
    pub secret: String,
    /// Header carrying the hex signature
    pub signature_header: String,
    /// Accept unsigned events (local development and tests only)
    pub demo_mode: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            signature_header: DEFAULT_SIGNATURE_HEADER.to_string(),
            demo_mode: false,
        }
    }
}

impl WebhookConfig {
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ..Default::default()
        }
    }

    pub fn has_secret(&self) -> bool {
        !self.secret.trim().is_empty()
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub webhook: WebhookConfig,
}

impl AppState {
    pub fn new(engine: Engine, webhook: WebhookConfig) -> Self {
        Self { engine, webhook }
    }
}
