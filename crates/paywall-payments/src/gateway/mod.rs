//! Payment Gateways
//!
//! One implementation per rail. A gateway opens the provider-side session for a
//! freshly minted ledger id and can report the provider's raw status for a
//! transaction later on. It never touches the ledger.

mod card;
mod mock;
mod nowpayments;

pub use card::{PAYMENT_ID_METADATA_KEY, StripeCheckoutConfig, StripeGateway};
pub use mock::MockGateway;
pub use nowpayments::{NowPaymentsConfig, NowPaymentsGateway};

use std::sync::Arc;

use async_trait::async_trait;
use paywall_core::PaymentRail;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};

/// What a gateway needs to open a provider session
#[derive(Clone, Debug)]
pub struct GatewayRequest {
    /// Ledger id, echoed back by the provider as order id / metadata
    pub payment_id: String,

    /// Paying user
    pub user_id: String,

    /// Amount to charge
    pub amount: Decimal,

    /// Lowercase ISO currency of `amount`
    pub currency: String,

    /// Line item / order description shown to the payer
    pub description: String,

    /// Crypto asset to pay in (crypto rail only)
    pub pay_currency: Option<String>,
}

/// Provider-side session returned to the client
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderPayload {
    /// Hosted checkout page to redirect to
    #[serde(rename_all = "camelCase")]
    Checkout { checkout_url: String },

    /// Address and exact amount to send
    #[serde(rename_all = "camelCase")]
    CryptoInvoice {
        pay_address: String,
        pay_amount: Decimal,
        pay_currency: String,
    },
}

/// Result of opening a provider session
#[derive(Clone, Debug)]
pub struct ProviderSession {
    /// Provider transaction / session id; becomes the ledger's `provider_tx_id`
    pub provider_tx_id: String,

    /// Client-facing payload
    pub payload: ProviderPayload,

    /// Raw provider status at creation time, if reported
    pub provider_status: Option<String>,
}

/// Render a provider id that may arrive as a JSON number or string
pub(crate) fn provider_id_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Like [`provider_id_to_string`], also accepting an expanded object's `id`
pub(crate) fn provider_id_or_object_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Object(map) => map.get("id").and_then(provider_id_to_string),
        other => provider_id_to_string(other),
    }
}

/// Payment gateway trait (Strategy pattern)
///
/// Implement this for each rail's processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Rail this gateway settles on
    fn rail(&self) -> PaymentRail;

    /// Open a provider session for `request`
    async fn create_payment(&self, request: &GatewayRequest) -> Result<ProviderSession>;

    /// Current raw provider status for a transaction, `None` if the provider
    /// does not know it
    async fn fetch_status(&self, provider_tx_id: &str) -> Result<Option<String>>;

    /// Gateway name for logging
    fn name(&self) -> &str;
}

/// The configured gateway per rail
#[derive(Clone, Default)]
pub struct Gateways {
    card: Option<Arc<dyn PaymentGateway>>,
    crypto: Option<Arc<dyn PaymentGateway>>,
}

impl Gateways {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `gateway` for the rail it reports
    #[must_use]
    pub fn with(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        match gateway.rail() {
            PaymentRail::Card => self.card = Some(gateway),
            PaymentRail::Crypto => self.crypto = Some(gateway),
        }
        self
    }

    /// Gateway for `rail`, or a validation error when that rail is not configured
    pub fn get(&self, rail: PaymentRail) -> Result<&Arc<dyn PaymentGateway>> {
        let gateway = match rail {
            PaymentRail::Card => self.card.as_ref(),
            PaymentRail::Crypto => self.crypto.as_ref(),
        };
        gateway.ok_or_else(|| PaymentError::Validation(format!("{rail} payments are not enabled")))
    }

    pub fn is_enabled(&self, rail: PaymentRail) -> bool {
        self.get(rail).is_ok()
    }
}

impl std::fmt::Debug for Gateways {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateways")
            .field("card", &self.card.as_ref().map(|g| g.name().to_string()))
            .field("crypto", &self.crypto.as_ref().map(|g| g.name().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_routes_by_rail() {
        let gateways = Gateways::new().with(Arc::new(MockGateway::new(PaymentRail::Crypto)));
        assert!(gateways.is_enabled(PaymentRail::Crypto));
        assert_eq!(gateways.get(PaymentRail::Crypto).unwrap().rail(), PaymentRail::Crypto);
        assert!(matches!(
            gateways.get(PaymentRail::Card),
            Err(PaymentError::Validation(_))
        ));
    }

    #[test]
    fn test_provider_ids() {
        assert_eq!(provider_id_to_string(&serde_json::json!(5524759814_i64)).as_deref(), Some("5524759814"));
        assert_eq!(provider_id_to_string(&serde_json::json!("abc")).as_deref(), Some("abc"));
        assert_eq!(provider_id_to_string(&serde_json::json!("")), None);
        assert_eq!(provider_id_to_string(&serde_json::Value::Null), None);
        assert_eq!(
            provider_id_or_object_id(&serde_json::json!({"id": "pi_1", "object": "payment_intent"})).as_deref(),
            Some("pi_1")
        );
        assert_eq!(provider_id_or_object_id(&serde_json::json!("pi_2")).as_deref(), Some("pi_2"));
    }

    #[test]
    fn test_payload_wire_shape() {
        let payload = ProviderPayload::CryptoInvoice {
            pay_address: "bc1qxyz".into(),
            pay_amount: Decimal::new(41, 5),
            pay_currency: "btc".into(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "crypto_invoice");
        assert_eq!(json["payAddress"], "bc1qxyz");
        assert_eq!(json["payCurrency"], "btc");
    }
}
