//! Crypto Gateway (NOWPayments API)
//!
//! Pay-to-address invoices: the processor quotes an amount in the chosen
//! asset and an address to send it to, then reports progress through IPN
//! callbacks keyed by its own `payment_id`.

use std::time::Duration;

use async_trait::async_trait;
use paywall_core::PaymentRail;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    GatewayRequest, PaymentGateway, ProviderPayload, ProviderSession, provider_id_to_string,
};
use crate::error::{PaymentError, Result};

const DEFAULT_API_URL: &str = "https://api.nowpayments.io";
const DEFAULT_PAY_CURRENCY: &str = "usdttrc20";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Crypto gateway settings
#[derive(Clone, Debug)]
pub struct NowPaymentsConfig {
    /// API key sent as `x-api-key`
    pub api_key: String,

    /// API origin; defaults to the production endpoint
    pub api_url: Option<String>,

    /// Where the processor posts IPN callbacks
    pub ipn_callback_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreatePaymentBody<'a> {
    price_amount: Decimal,
    price_currency: &'a str,
    pay_currency: &'a str,
    order_id: &'a str,
    order_description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ipn_callback_url: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    payment_id: serde_json::Value,
    payment_status: Option<String>,
    #[serde(default)]
    pay_address: Option<String>,
    #[serde(default)]
    pay_amount: Option<Decimal>,
    #[serde(default)]
    pay_currency: Option<String>,
}

/// An invoice is only usable with its address and the exact crypto amount to send.
fn into_session(payment: PaymentResponse, requested_currency: &str) -> Result<ProviderSession> {
    let provider_tx_id = provider_id_to_string(&payment.payment_id)
        .ok_or_else(|| PaymentError::Provider("NOWPayments returned no payment_id".into()))?;
    let pay_address = payment
        .pay_address
        .ok_or_else(|| PaymentError::Provider("NOWPayments returned no pay_address".into()))?;
    let pay_amount = payment
        .pay_amount
        .ok_or_else(|| PaymentError::Provider("NOWPayments returned no pay_amount".into()))?;

    Ok(ProviderSession {
        provider_tx_id,
        payload: ProviderPayload::CryptoInvoice {
            pay_address,
            pay_amount,
            pay_currency: payment
                .pay_currency
                .unwrap_or_else(|| requested_currency.to_string()),
        },
        provider_status: payment.payment_status,
    })
}

/// NOWPayments client wrapper
pub struct NowPaymentsGateway {
    client: Client,
    api_key: String,
    api_url: String,
    ipn_callback_url: Option<String>,
}

impl NowPaymentsGateway {
    pub fn new(config: &NowPaymentsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PaymentError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_url: config
                .api_url
                .as_deref()
                .unwrap_or(DEFAULT_API_URL)
                .trim_end_matches('/')
                .to_string(),
            ipn_callback_url: config.ipn_callback_url.clone(),
        })
    }

    async fn read_payment(&self, response: reqwest::Response) -> Result<PaymentResponse> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Provider(format!(
                "NOWPayments returned {status}: {body}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| PaymentError::Provider(format!("Failed to parse NOWPayments response: {e}")))
    }
}

#[async_trait]
impl PaymentGateway for NowPaymentsGateway {
    fn rail(&self) -> PaymentRail {
        PaymentRail::Crypto
    }

    async fn create_payment(&self, request: &GatewayRequest) -> Result<ProviderSession> {
        let pay_currency = request.pay_currency.as_deref().unwrap_or(DEFAULT_PAY_CURRENCY);
        let body = CreatePaymentBody {
            price_amount: request.amount,
            price_currency: &request.currency,
            pay_currency,
            order_id: &request.payment_id,
            order_description: &request.description,
            ipn_callback_url: self.ipn_callback_url.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/v1/payment", self.api_url))
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentError::Provider(format!("NOWPayments request: {e}")))?;

        let session = into_session(self.read_payment(response).await?, pay_currency)?;
        tracing::info!(
            payment_id = %request.payment_id,
            provider_tx_id = %session.provider_tx_id,
            pay_currency = %pay_currency,
            "Created crypto invoice"
        );
        Ok(session)
    }

    async fn fetch_status(&self, provider_tx_id: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(format!("{}/v1/payment/{provider_tx_id}", self.api_url))
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| PaymentError::Provider(format!("NOWPayments request: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(self.read_payment(response).await?.payment_status)
    }

    fn name(&self) -> &str {
        "NOWPayments"
    }
}
