//! Accounting Forwarder
//!
//! Best-effort export of settled payments to a downstream accounting
//! endpoint. Runs in a spawned task after the ledger transaction commits;
//! failures and panics are logged and abandoned, never surfaced to the
//! webhook that triggered them.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use paywall_core::{Payment, PaymentKind, PaymentRail, PaymentStatus, to_minor_units};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{PaymentError, Result};

/// Retry delays in milliseconds; the first attempt goes out immediately.
const RETRY_DELAYS_MS: &[u64] = &[100, 200];

/// Per-attempt timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Record exported for every completed or refunded payment
#[derive(Clone, Debug, Serialize)]
pub struct AccountingRecord {
    /// "payment_completed" or "payment_refunded"
    pub event: String,
    pub payment_id: String,
    pub user_id: String,
    pub kind: PaymentKind,
    pub provider: PaymentRail,
    pub provider_tx_id: String,
    pub status: PaymentStatus,
    pub amount: Decimal,
    /// Minor units; negative for refunds
    pub amount_cents: i64,
    pub currency: String,
    /// Unix timestamp
    pub timestamp: i64,
    /// Stable per (payment, event) so the receiver can drop our retries
    pub idempotency_key: String,
}

impl AccountingRecord {
    pub fn from_payment(payment: &Payment) -> Result<Self> {
        let (event, sign) = match payment.status {
            PaymentStatus::Completed => ("payment_completed", 1),
            PaymentStatus::Refunded => ("payment_refunded", -1),
            other => {
                return Err(PaymentError::Internal(format!(
                    "payment {} is {other}, only completed and refunded payments are exported",
                    payment.id
                )));
            }
        };
        Ok(Self {
            event: event.to_string(),
            payment_id: payment.id.clone(),
            user_id: payment.user_id.clone(),
            kind: payment.kind(),
            provider: payment.provider,
            provider_tx_id: payment.provider_tx_id.clone(),
            status: payment.status,
            amount: payment.amount,
            amount_cents: sign * to_minor_units(payment.amount)?,
            currency: payment.currency.clone(),
            timestamp: payment.updated_at.timestamp(),
            idempotency_key: format!("{}:{event}", payment.id),
        })
    }
}

/// Downstream accounting sink
#[async_trait]
pub trait AccountingSink: Send + Sync {
    async fn record(&self, record: &AccountingRecord) -> Result<()>;

    fn name(&self) -> &str;
}

/// Sink used when no accounting endpoint is configured
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAccountingSink;

#[async_trait]
impl AccountingSink for NoopAccountingSink {
    async fn record(&self, record: &AccountingRecord) -> Result<()> {
        tracing::trace!(payment_id = %record.payment_id, "Accounting export disabled");
        Ok(())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// POSTs each record as JSON to a fixed URL
#[derive(Clone, Debug)]
pub struct HttpAccountingSink {
    client: Client,
    url: String,
}

impl HttpAccountingSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl AccountingSink for HttpAccountingSink {
    async fn record(&self, record: &AccountingRecord) -> Result<()> {
        let mut last_error = String::new();

        for (attempt, delay_ms) in std::iter::once(&0u64)
            .chain(RETRY_DELAYS_MS.iter())
            .enumerate()
        {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
            }

            match self
                .client
                .post(&self.url)
                .json(record)
                .timeout(REQUEST_TIMEOUT)
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    if attempt > 0 {
                        tracing::debug!(attempt, "Accounting export succeeded after retry");
                    }
                    return Ok(());
                }
                Ok(resp) => last_error = format!("status {}", resp.status()),
                Err(e) => last_error = e.to_string(),
            }
            tracing::debug!(attempt, error = %last_error, "Accounting export attempt failed");
        }

        Err(PaymentError::Provider(format!(
            "accounting export failed after {} attempts: {last_error}",
            RETRY_DELAYS_MS.len() + 1
        )))
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Export `record` in the background.
///
/// Outside a Tokio runtime the record is dropped with a warning.
pub fn spawn_forward(sink: Arc<dyn AccountingSink>, record: AccountingRecord) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        tracing::warn!(payment_id = %record.payment_id, "No runtime, accounting export skipped");
        return;
    };

    let payment_id = record.payment_id.clone();
    handle.spawn(
        AssertUnwindSafe(async move {
            if let Err(e) = sink.record(&record).await {
                tracing::warn!(
                    payment_id = %record.payment_id,
                    sink = sink.name(),
                    error = %e,
                    "Accounting export abandoned"
                );
            }
        })
        .catch_unwind()
        .map(move |result| {
            if let Err(panic) = result {
                let panic_msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(payment_id = %payment_id, panic = %panic_msg, "Accounting task panicked");
            }
        }),
    );
}
