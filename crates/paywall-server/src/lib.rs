//! # paywall-server
//!
//! Axum HTTP surface for creator-paywall. Caller identity arrives in the
//! `x-user-id` header from the upstream auth layer; webhook routes are
//! authenticated by provider signature instead.

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};

pub use config::Config;
pub use error::{ApiError, ErrorResponse};
pub use state::AppState;

use crate::handlers::{
    card_webhook, create_intent, crypto_webhook, get_library, get_media, health_check,
    payment_status,
};

/// All routes over `state`, without transport layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(health_check))
        // Payments
        .route("/payments/intent", post(create_intent))
        .route("/payments/{id}/status", get(payment_status))
        .route("/payments/webhook/crypto", post(crypto_webhook))
        .route("/payments/webhook/card", post(card_webhook))
        // Content
        .route("/media/{id}", get(get_media))
        .route("/library", get(get_library))
        .with_state(state)
}
