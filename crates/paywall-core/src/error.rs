//! Error Types

use thiserror::Error;

/// Result type alias for domain operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A stored or submitted tag did not name a known variant
    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    /// Amount could not be represented in minor units
    #[error("Amount out of range: {0}")]
    AmountOutOfRange(String),

    /// Payment metadata does not match the payment type
    #[error("Metadata mismatch: {0}")]
    MetadataMismatch(String),
}

impl CoreError {
    pub(crate) fn unknown(kind: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownVariant {
            kind,
            value: value.into(),
        }
    }
}
