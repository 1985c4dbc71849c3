//! Canonical Status Mapping
//!
//! Each rail speaks its own status vocabulary. These closed enums parse the
//! raw strings and map them onto [`PaymentStatus`]. The mapping is total:
//! anything unrecognised lands on `Pending` (and is logged), never on
//! `Completed`.

use serde::{Deserialize, Serialize};

use crate::model::PaymentStatus;

/// Crypto processor payment statuses
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CryptoStatus {
    Waiting,
    Confirming,
    Confirmed,
    Sending,
    PartiallyPaid,
    Finished,
    Failed,
    Refunded,
    Expired,
    Unknown(String),
}

impl CryptoStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "waiting" => Self::Waiting,
            "confirming" => Self::Confirming,
            "confirmed" => Self::Confirmed,
            "sending" => Self::Sending,
            "partially_paid" => Self::PartiallyPaid,
            "finished" => Self::Finished,
            "failed" => Self::Failed,
            "refunded" => Self::Refunded,
            "expired" => Self::Expired,
            _ => Self::Unknown(raw.to_string()),
        }
    }

    pub fn canonical(&self) -> PaymentStatus {
        match self {
            Self::Waiting | Self::Confirming | Self::PartiallyPaid => PaymentStatus::Pending,
            Self::Confirmed | Self::Sending | Self::Finished => PaymentStatus::Completed,
            Self::Failed | Self::Expired => PaymentStatus::Failed,
            Self::Refunded => PaymentStatus::Refunded,
            Self::Unknown(raw) => {
                tracing::warn!(status = %raw, "Unknown crypto payment status, treating as pending");
                PaymentStatus::Pending
            }
        }
    }
}

/// Card processor webhook event types
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CardEvent {
    /// `checkout.session.completed`; `paid` is false for delayed payment methods
    CheckoutCompleted { paid: bool },
    AsyncPaymentSucceeded,
    AsyncPaymentFailed,
    CheckoutExpired,
    PaymentFailed,
    ChargeRefunded,
    Unknown(String),
}

impl CardEvent {
    pub fn parse(event_type: &str, payment_status: Option<&str>) -> Self {
        match event_type {
            "checkout.session.completed" => Self::CheckoutCompleted {
                paid: matches!(payment_status, Some("paid" | "no_payment_required")),
            },
            "checkout.session.async_payment_succeeded" => Self::AsyncPaymentSucceeded,
            "checkout.session.async_payment_failed" => Self::AsyncPaymentFailed,
            "checkout.session.expired" => Self::CheckoutExpired,
            "payment_intent.payment_failed" => Self::PaymentFailed,
            "charge.refunded" => Self::ChargeRefunded,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn canonical(&self) -> PaymentStatus {
        match self {
            Self::CheckoutCompleted { paid: true } | Self::AsyncPaymentSucceeded => {
                PaymentStatus::Completed
            }
            Self::CheckoutCompleted { paid: false } => PaymentStatus::Pending,
            Self::AsyncPaymentFailed | Self::CheckoutExpired | Self::PaymentFailed => {
                PaymentStatus::Failed
            }
            Self::ChargeRefunded => PaymentStatus::Refunded,
            Self::Unknown(raw) => {
                tracing::warn!(event_type = %raw, "Unknown card event type, treating as pending");
                PaymentStatus::Pending
            }
        }
    }
}

/// Decision for moving a payment from its stored status to a newly observed one
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum Transition {
    /// Duplicate or stale delivery: nothing to write
    Unchanged,
    /// Forward move to apply
    Apply { from: PaymentStatus, to: PaymentStatus },
    /// Move the lifecycle never allows (e.g. refunding a pending payment)
    Illegal { from: PaymentStatus, to: PaymentStatus },
}

impl Transition {
    /// Decide what observing `next` means for a payment currently in `current`.
    pub fn plan(current: PaymentStatus, next: PaymentStatus) -> Self {
        use PaymentStatus::{Completed, Refunded};

        if current == next {
            return Self::Unchanged;
        }
        match (current, next) {
            (Completed, Refunded) => Self::Apply { from: current, to: next },
            (_, Refunded) => Self::Illegal { from: current, to: next },
            (c, _) if c.is_terminal() => Self::Unchanged,
            _ => Self::Apply { from: current, to: next },
        }
    }

    /// PENDING → COMPLETED: the one move that grants an entitlement
    pub const fn grants_entitlement(&self) -> bool {
        matches!(
            self,
            Self::Apply {
                from: PaymentStatus::Pending,
                to: PaymentStatus::Completed,
            }
        )
    }

    /// COMPLETED → REFUNDED
    pub const fn is_refund(&self) -> bool {
        matches!(
            self,
            Self::Apply {
                from: PaymentStatus::Completed,
                to: PaymentStatus::Refunded,
            }
        )
    }
}
