//! HTTP Handlers

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
};
use paywall_core::PaymentRail;
use paywall_payments::{
    IntentRequest, MediaView, PaymentIntent, PaymentStatusView, ReconcileOutcome,
    signature::{CARD_SIGNATURE_HEADER, CRYPTO_SIGNATURE_HEADER},
};
use serde::Serialize;

use crate::error::ApiError;
use crate::extractors::{CallerId, Json};
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub card_enabled: bool,
    pub crypto_enabled: bool,
}

#[derive(Serialize)]
pub struct LibraryResponse {
    pub items: Vec<MediaView>,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        card_enabled: state.gateways.is_enabled(PaymentRail::Card),
        crypto_enabled: state.gateways.is_enabled(PaymentRail::Crypto),
    })
}

/// Start a purchase
pub async fn create_intent(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Json(request): Json<IntentRequest>,
) -> ApiResult<PaymentIntent> {
    let intent = state.intents.create(&caller, request).await?;
    Ok(Json(intent))
}

/// Canonical status of one of the caller's payments
pub async fn payment_status(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Path(payment_id): Path<String>,
) -> ApiResult<PaymentStatusView> {
    Ok(Json(state.poller.status(&caller, &payment_id).await?))
}

/// Crypto processor IPN callback
pub async fn crypto_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<ReconcileOutcome> {
    let outcome = state
        .webhooks
        .handle_crypto(&body, header(&headers, CRYPTO_SIGNATURE_HEADER))
        .await?;
    Ok(Json(outcome))
}

/// Card processor event callback
pub async fn card_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<ReconcileOutcome> {
    let outcome = state
        .webhooks
        .handle_card(&body, header(&headers, CARD_SIGNATURE_HEADER))
        .await?;
    Ok(Json(outcome))
}

/// One media item as the caller sees it
pub async fn get_media(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Path(media_id): Path<String>,
) -> ApiResult<MediaView> {
    Ok(Json(state.library.media(&caller, &media_id)?))
}

/// Everything the caller may open
pub async fn get_library(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
) -> ApiResult<LibraryResponse> {
    let items = state.library.library(&caller)?;
    Ok(Json(LibraryResponse { items }))
}
