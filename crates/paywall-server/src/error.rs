//! HTTP Error Mapping

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use paywall_payments::PaymentError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    /// Set when the same request may succeed later
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

/// Everything a handler can fail with
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// No caller identity on a route that needs one
    #[error("missing caller identity")]
    Unauthenticated,

    #[error("invalid request body: {0}")]
    BadRequest(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Payment(e) => match e {
                PaymentError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
                PaymentError::InvalidAmount(_) => (StatusCode::BAD_REQUEST, "INVALID_AMOUNT"),
                PaymentError::SignatureInvalid(_) => (StatusCode::BAD_REQUEST, "INVALID_SIGNATURE"),
                PaymentError::WebhookParse(_) => (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD"),
                PaymentError::AlreadyOwned(_) => (StatusCode::CONFLICT, "ALREADY_OWNED"),
                PaymentError::PaymentNotFound(_) => (StatusCode::NOT_FOUND, "PAYMENT_NOT_FOUND"),
                PaymentError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                PaymentError::Provider(_) => (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Payment(e) => match e {
                // Caller-facing detail is safe to echo for client errors
                PaymentError::Validation(m) | PaymentError::InvalidAmount(m) => m.clone(),
                other => other.user_message().to_string(),
            },
            Self::Unauthenticated => "Missing x-user-id header".into(),
            Self::BadRequest(m) => m.clone(),
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::Payment(e) if e.is_retryable())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let retryable = self.is_retryable();
        if status.is_server_error() {
            tracing::error!(error = %self, code, retryable, "Request failed");
        } else {
            tracing::debug!(error = %self, code, "Request rejected");
        }

        let body = ErrorResponse {
            error: self.message(),
            code: code.into(),
            retryable,
        };
        (status, Json(body)).into_response()
    }
}
