//! API Routes

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/webhooks", webhook_routes())
}

fn webhook_routes() -> Router<Arc<AppState>> {
    Router::new().route("/payments", post(handlers::webhook::payment_webhook))
}
