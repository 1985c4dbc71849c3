//! Payment Status Poll
//!
//! Clients poll their own payment while waiting for the provider. A PENDING
//! payment whose cached provider status has gone stale is refreshed from the
//! gateway, but only the cache moves: the lifecycle belongs to webhooks.

use chrono::{DateTime, Duration, Utc};
use paywall_core::{Caller, Payment, PaymentKind, PaymentRail, PaymentStatus};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::db::{DbPool, queries};
use crate::error::{PaymentError, Result};
use crate::gateway::Gateways;

/// Default staleness window for the cached provider status
pub const DEFAULT_REFRESH_AFTER_SECS: i64 = 30;

/// What the caller sees about one of their payments
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusView {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub kind: PaymentKind,
    pub provider: PaymentRail,
    pub amount: Decimal,
    pub currency: String,
    /// Last raw status reported by the provider
    pub provider_status: Option<String>,
    pub provider_checked_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<Payment> for PaymentStatusView {
    fn from(payment: Payment) -> Self {
        Self {
            kind: payment.kind(),
            payment_id: payment.id,
            status: payment.status,
            provider: payment.provider,
            amount: payment.amount,
            currency: payment.currency,
            provider_status: payment.provider_status,
            provider_checked_at: payment.provider_checked_at,
            updated_at: payment.updated_at,
        }
    }
}

/// Whether `payment` should be refreshed from its provider at `now`
pub fn needs_refresh(payment: &Payment, now: DateTime<Utc>, refresh_after: Duration) -> bool {
    payment.status == PaymentStatus::Pending
        && payment
            .provider_checked_at
            .is_none_or(|checked| now - checked >= refresh_after)
}

/// Answers status polls for the paying user
#[derive(Clone, Debug)]
pub struct StatusPoller {
    pool: DbPool,
    gateways: Gateways,
    refresh_after: Duration,
}

impl StatusPoller {
    pub fn new(pool: DbPool, gateways: Gateways, refresh_after: Duration) -> Self {
        Self {
            pool,
            gateways,
            refresh_after,
        }
    }

    /// Canonical status of the caller's payment `payment_id`.
    ///
    /// Someone else's payment is reported as not found.
    pub async fn status(&self, caller: &Caller, payment_id: &str) -> Result<PaymentStatusView> {
        let mut payment = {
            let conn = self.pool.get()?;
            queries::get_payment(&conn, payment_id)?
        }
        .filter(|p| p.user_id == caller.user_id)
        .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.to_string()))?;

        let now = Utc::now();
        if !needs_refresh(&payment, now, self.refresh_after) {
            return Ok(payment.into());
        }
        let Ok(gateway) = self.gateways.get(payment.provider) else {
            return Ok(payment.into());
        };

        match gateway.fetch_status(&payment.provider_tx_id).await {
            Ok(Some(raw)) => {
                {
                    let conn = self.pool.get()?;
                    queries::cache_provider_status(&conn, &payment.id, &raw, now)?;
                }
                tracing::debug!(payment_id = %payment.id, provider_status = %raw, "Provider status refreshed");
                payment.provider_status = Some(raw);
                payment.provider_checked_at = Some(now);
            }
            Ok(None) => {
                tracing::debug!(payment_id = %payment.id, "Provider has no status for payment");
            }
            Err(e) => {
                tracing::warn!(payment_id = %payment.id, error = %e, "Provider status refresh failed");
            }
        }

        Ok(payment.into())
    }
}
