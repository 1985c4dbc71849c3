//! Card Gateway (Stripe Checkout)
//!
//! Every payment type, subscriptions included, is a one-off hosted checkout in
//! `payment` mode: renewal is driven by a new intent, not by a provider-side
//! recurring price. The ledger id rides along in both the session metadata
//! and the payment intent metadata so refunds can be traced back.

use std::collections::HashMap;

use async_trait::async_trait;
use paywall_core::{PaymentRail, to_minor_units};
use stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionId, CheckoutSessionMode, Client,
    CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionLineItemsPriceData, CreateCheckoutSessionLineItemsPriceDataProductData,
    CreateCheckoutSessionPaymentIntentData, Currency,
};

use super::{GatewayRequest, PaymentGateway, ProviderPayload, ProviderSession};
use crate::error::{PaymentError, Result};

/// Metadata key carrying the ledger id
pub const PAYMENT_ID_METADATA_KEY: &str = "payment_id";

/// Card gateway settings
#[derive(Clone, Debug)]
pub struct StripeCheckoutConfig {
    /// Secret API key (`sk_...`)
    pub secret_key: String,

    /// Public origin the payer is sent back to after checkout
    pub public_base_url: String,
}

/// Stripe client wrapper
pub struct StripeGateway {
    client: Client,
    public_base_url: String,
}

impl StripeGateway {
    pub fn new(config: &StripeCheckoutConfig) -> Self {
        Self {
            client: Client::new(config.secret_key.clone()),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn success_url(&self, payment_id: &str) -> String {
        format!("{}/payments/{payment_id}/success", self.public_base_url)
    }

    fn cancel_url(&self, payment_id: &str) -> String {
        format!("{}/payments/{payment_id}/cancel", self.public_base_url)
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn rail(&self) -> PaymentRail {
        PaymentRail::Card
    }

    async fn create_payment(&self, request: &GatewayRequest) -> Result<ProviderSession> {
        let unit_amount = to_minor_units(request.amount)?;
        let success_url = self.success_url(&request.payment_id);
        let cancel_url = self.cancel_url(&request.payment_id);

        let mut metadata = HashMap::new();
        metadata.insert(PAYMENT_ID_METADATA_KEY.to_string(), request.payment_id.clone());
        metadata.insert("user_id".to_string(), request.user_id.clone());

        let mut params = CreateCheckoutSession::new();
        params.success_url = Some(&success_url);
        params.cancel_url = Some(&cancel_url);
        params.client_reference_id = Some(&request.payment_id);
        params.mode = Some(CheckoutSessionMode::Payment);
        params.metadata = Some(metadata.clone());
        params.payment_intent_data = Some(CreateCheckoutSessionPaymentIntentData {
            metadata: Some(metadata),
            ..Default::default()
        });
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            quantity: Some(1),
            price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                currency: Currency::USD,
                unit_amount: Some(unit_amount),
                product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: request.description.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);

        let session = StripeCheckoutSession::create(&self.client, params)
            .await
            .map_err(|e| PaymentError::Provider(format!("Stripe checkout: {e}")))?;

        let checkout_url = session
            .url
            .ok_or_else(|| PaymentError::Provider("No checkout URL returned".into()))?;

        tracing::info!(
            payment_id = %request.payment_id,
            session_id = %session.id,
            amount = %request.amount,
            "Created card checkout session"
        );

        Ok(ProviderSession {
            provider_tx_id: session.id.to_string(),
            payload: ProviderPayload::Checkout { checkout_url },
            provider_status: Some(session.payment_status.as_str().to_string()),
        })
    }

    async fn fetch_status(&self, provider_tx_id: &str) -> Result<Option<String>> {
        let id: CheckoutSessionId = provider_tx_id
            .parse()
            .map_err(|e| PaymentError::Validation(format!("bad session id {provider_tx_id}: {e}")))?;

        let session = StripeCheckoutSession::retrieve(&self.client, &id, &[])
            .await
            .map_err(|e| PaymentError::Provider(format!("Stripe session lookup: {e}")))?;

        Ok(Some(session.payment_status.as_str().to_string()))
    }

    fn name(&self) -> &str {
        "Stripe"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_urls() {
        let gateway = StripeGateway::new(&StripeCheckoutConfig {
            secret_key: "sk_test_123".into(),
            public_base_url: "https://fans.example.com/".into(),
        });
        assert_eq!(
            gateway.success_url("pay_1"),
            "https://fans.example.com/payments/pay_1/success"
        );
        assert_eq!(
            gateway.cancel_url("pay_1"),
            "https://fans.example.com/payments/pay_1/cancel"
        );
        assert_eq!(gateway.rail(), PaymentRail::Card);
    }
}
