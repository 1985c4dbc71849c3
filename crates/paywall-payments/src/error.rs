//! Payment Error Types

use paywall_core::CoreError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Malformed or missing request fields
    #[error("Validation error: {0}")]
    Validation(String),

    /// The user already holds what they are trying to buy
    #[error("Already owned: {0}")]
    AlreadyOwned(String),

    /// Amount below the minimum or otherwise unacceptable
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    SignatureInvalid(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Webhook or poll referenced a payment the ledger does not know
    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    /// Catalog item (media, message, plan) does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Upstream payment API error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Connection pool error
    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Stored record failed a domain invariant
    #[error("Domain error: {0}")]
    Domain(#[from] CoreError),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PaymentError {
    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::Storage(_) | Self::Pool(_) | Self::Internal(_)
        )
    }

    /// Get user-friendly message
    pub const fn user_message(&self) -> &str {
        match self {
            Self::Validation(_) => "The request is missing or has invalid fields.",
            Self::AlreadyOwned(_) => "You already have access to this item.",
            Self::InvalidAmount(_) => "The amount is not valid.",
            Self::SignatureInvalid(_) => "Invalid webhook signature.",
            Self::PaymentNotFound(_) => "Payment not found.",
            Self::NotFound(_) => "Not found.",
            Self::Provider(_) => "Payment processing failed. Please try again.",
            Self::Config(_) => "Service configuration error.",
            _ => "An error occurred processing your request.",
        }
    }
}
