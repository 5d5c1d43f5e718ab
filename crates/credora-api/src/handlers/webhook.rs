//! Payment gateway webhook
//!
//! The signature covers the raw body, so the handler takes `Bytes` and only
//! parses after verification. Unsigned or mis-signed requests are rejected
//! before anything reaches the engine, unless demo mode is on.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use credora_engine::WebhookEvent;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::signature;
use crate::state::AppState;

/// Acknowledgement returned to the gateway
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
    pub event: String,
    pub reference: String,
    pub outcome: String,
}

pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let config = &state.webhook;
    if !config.demo_mode {
        let provided = headers
            .get(config.signature_header.as_str())
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !signature::verify(&config.secret, &body, provided) {
            warn!(
                header = %config.signature_header,
                present = !provided.is_empty(),
                "Rejected webhook with invalid signature"
            );
            metrics::counter!("credora_webhook_events_total", "outcome" => "rejected").increment(1);
            return Err(ApiError::InvalidSignature);
        }
    }

    let event: WebhookEvent = serde_json::from_slice(&body)?;
    let (name, reference) = (event.event.clone(), event.data.reference.clone());

    let outcome = state.engine.handle_webhook_event(event).await?;
    info!(event = %name, reference = %reference, outcome = outcome.label(), "Webhook processed");

    Ok(Json(WebhookAck {
        received: true,
        event: name,
        reference,
        outcome: outcome.label().to_string(),
    }))
}
