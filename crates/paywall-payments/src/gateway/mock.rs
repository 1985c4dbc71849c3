//! Mock Gateway
//!
//! For testing and local development. Opens sessions without any network
//! access and reports whatever raw status a test stages for a transaction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use paywall_core::PaymentRail;

use super::{GatewayRequest, PaymentGateway, ProviderPayload, ProviderSession};
use crate::error::{PaymentError, Result};

/// In-memory gateway for one rail
pub struct MockGateway {
    rail: PaymentRail,
    fail: AtomicBool,
    created: AtomicUsize,
    status_calls: AtomicUsize,
    statuses: Mutex<HashMap<String, String>>,
}

impl MockGateway {
    pub fn new(rail: PaymentRail) -> Self {
        Self {
            rail,
            fail: AtomicBool::new(false),
            created: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            statuses: Mutex::new(HashMap::new()),
        }
    }

    /// Make every subsequent `create_payment` fail with a provider error
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Stage the raw status `fetch_status` reports for `provider_tx_id`
    pub fn set_status(&self, provider_tx_id: &str, status: &str) {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider_tx_id.to_string(), status.to_string());
    }

    /// Sessions opened so far
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Status lookups served so far
    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Transaction id this gateway assigns to a ledger id
    pub fn tx_id_for(&self, payment_id: &str) -> String {
        match self.rail {
            PaymentRail::Card => format!("cs_mock_{payment_id}"),
            PaymentRail::Crypto => format!("np_mock_{payment_id}"),
        }
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn rail(&self) -> PaymentRail {
        self.rail
    }

    async fn create_payment(&self, request: &GatewayRequest) -> Result<ProviderSession> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PaymentError::Provider("mock gateway unavailable".into()));
        }
        self.created.fetch_add(1, Ordering::SeqCst);

        let provider_tx_id = self.tx_id_for(&request.payment_id);
        let (payload, provider_status) = match self.rail {
            PaymentRail::Card => (
                ProviderPayload::Checkout {
                    checkout_url: format!("https://checkout.mock/pay/{provider_tx_id}"),
                },
                Some("unpaid".to_string()),
            ),
            PaymentRail::Crypto => (
                ProviderPayload::CryptoInvoice {
                    pay_address: format!("mock_address_{}", request.payment_id),
                    pay_amount: request.amount,
                    pay_currency: request
                        .pay_currency
                        .clone()
                        .unwrap_or_else(|| "usdttrc20".to_string()),
                },
                Some("waiting".to_string()),
            ),
        };

        Ok(ProviderSession {
            provider_tx_id,
            payload,
            provider_status,
        })
    }

    async fn fetch_status(&self, provider_tx_id: &str) -> Result<Option<String>> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider_tx_id)
            .cloned())
    }

    fn name(&self) -> &str {
        "MockGateway"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> GatewayRequest {
        GatewayRequest {
            payment_id: "pay_1".into(),
            user_id: "fan".into(),
            amount: dec!(5.00),
            currency: "usd".into(),
            description: "Tip".into(),
            pay_currency: Some("btc".into()),
        }
    }

    #[tokio::test]
    async fn test_mock_gateway_sessions() {
        let gateway = MockGateway::new(PaymentRail::Crypto);
        let session = gateway.create_payment(&request()).await.unwrap();
        assert_eq!(session.provider_tx_id, "np_mock_pay_1");
        assert!(matches!(
            session.payload,
            ProviderPayload::CryptoInvoice { ref pay_currency, .. } if pay_currency == "btc"
        ));
        assert_eq!(gateway.created_count(), 1);

        assert_eq!(gateway.fetch_status("np_mock_pay_1").await.unwrap(), None);
        gateway.set_status("np_mock_pay_1", "confirming");
        assert_eq!(
            gateway.fetch_status("np_mock_pay_1").await.unwrap().as_deref(),
            Some("confirming")
        );
    }

    #[tokio::test]
    async fn test_mock_gateway_failure() {
        let gateway = MockGateway::new(PaymentRail::Card);
        gateway.set_failing(true);
        let err = gateway.create_payment(&request()).await.unwrap_err();
        assert!(matches!(err, PaymentError::Provider(_)));
        assert_eq!(gateway.created_count(), 0);
    }
}
