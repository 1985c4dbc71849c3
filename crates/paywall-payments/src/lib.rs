//! # paywall-payments
//!
//! Payment engine for creator-paywall: intents, webhook reconciliation and
//! entitlement granting over a SQLite ledger.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐  PENDING row   ┌──────────┐   pays    ┌────────────┐
//! │ IntentFactory│───────────────▶│  Ledger  │◀──────────│  Provider  │
//! └──────┬───────┘                └────▲─────┘           └─────┬──────┘
//!        │ provider session            │ CAS status            │ webhook
//!        ▼                             │ + grant               ▼
//! ┌──────────────┐                ┌────┴────────────┐   ┌────────────┐
//! │   Gateway    │                │WebhookReconciler│◀──│ Signature  │
//! │ card / crypto│                └────┬────────────┘   │  verifier  │
//! └──────────────┘                     │ after commit   └────────────┘
//!                                      ▼
//!                          accounting export, notifications
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use paywall_payments::{create_pool, WebhookReconciler, WebhookSecrets};
//!
//! let pool = create_pool("paywall.db")?;
//! let reconciler = WebhookReconciler::new(pool, WebhookSecrets {
//!     crypto_ipn_secret: Some(ipn_secret),
//!     card_signing_secret: Some(whsec),
//! });
//!
//! // In the crypto webhook handler:
//! let outcome = reconciler.handle_crypto(&body, signature).await?;
//! ```

pub mod db;
pub mod entitlement;
pub mod forwarder;
pub mod gateway;
pub mod intent;
pub mod library;
pub mod notify;
pub mod poll;
pub mod signature;
pub mod webhook;

mod error;

pub use db::{DbPool, create_pool, init_db};
pub use error::{PaymentError, Result};
pub use forwarder::{AccountingRecord, AccountingSink, HttpAccountingSink, NoopAccountingSink};
pub use gateway::{
    GatewayRequest, Gateways, MockGateway, NowPaymentsConfig, NowPaymentsGateway, PaymentGateway,
    ProviderPayload, ProviderSession, StripeCheckoutConfig, StripeGateway,
};
pub use intent::{IntentConfig, IntentFactory, IntentRequest, PaymentIntent, Quote};
pub use library::{Library, MediaView};
pub use notify::{EntitlementEvent, Notifier};
pub use poll::{PaymentStatusView, StatusPoller};
pub use webhook::{ReconcileOutcome, WebhookEvent, WebhookReconciler, WebhookSecrets};
