//! # paywall-core
//!
//! Domain types for a creator paywall: the payment ledger records, the
//! canonical payment lifecycle, and the access tier rules.
//!
//! ## Lifecycle
//!
//! ```text
//!            provider vocabularies                canonical
//! ┌──────────────────────────────────┐     ┌──────────────────┐
//! │ waiting / confirming / unpaid     │────▶│ PENDING          │
//! │ finished / confirmed / paid       │────▶│ COMPLETED        │
//! │ failed / expired / session expiry │────▶│ FAILED           │
//! │ refunded / charge.refunded        │────▶│ REFUNDED         │
//! └──────────────────────────────────┘     └──────────────────┘
//! ```
//!
//! Nothing in this crate performs I/O; the payment engine and HTTP surface
//! live in `paywall-payments` and `paywall-server`.

pub mod access;
pub mod actor;
pub mod error;
pub mod model;
pub mod status;

pub use access::{AccessContext, accessible, has_access, tier_covers};
pub use actor::{Actor, Caller};
pub use error::{CoreError, Result};
pub use model::{
    AccessTier, BillingInterval, MediaContent, MediaPurchase, Message, MessagePayment,
    MessagePaymentKind, Payment, PaymentKind, PaymentMetadata, PaymentRail, PaymentStatus, Plan,
    Subscription, SubscriptionStatus, from_minor_units, to_minor_units,
};
pub use status::{CardEvent, CryptoStatus, Transition};
