//! Payment Intent Factory
//!
//! Validates a purchase request against the catalog and the caller's
//! holdings, opens the provider session, then records the PENDING payment.
//!
//! ```text
//! quote (read conn) ─▶ mint ledger id ─▶ gateway session ─▶ INSERT PENDING
//!        │                                     │
//!        └─ Validation / AlreadyOwned /        └─ Provider error: nothing written
//!           InvalidAmount
//! ```

use chrono::Utc;
use paywall_core::{
    Actor, BillingInterval, Caller, Payment, PaymentKind, PaymentMetadata, PaymentRail,
    PaymentStatus, to_minor_units,
};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db::{DbPool, queries};
use crate::error::{PaymentError, Result};
use crate::gateway::{GatewayRequest, Gateways, ProviderPayload};

/// Smallest tip accepted unless configured otherwise
pub const DEFAULT_MIN_TIP: Decimal = Decimal::ONE;

/// Largest tip accepted unless configured otherwise
pub const DEFAULT_MAX_TIP: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Currency every price in the catalog is denominated in
pub const LEDGER_CURRENCY: &str = "usd";

/// Purchase request as sent by the client
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRequest {
    /// What is being bought
    #[serde(rename = "type")]
    pub kind: PaymentKind,

    /// Rail to pay on
    pub provider: PaymentRail,

    /// SUBSCRIPTION
    #[serde(default)]
    pub plan_id: Option<String>,

    /// SUBSCRIPTION
    #[serde(default)]
    pub billing_interval: Option<BillingInterval>,

    /// MEDIA_PURCHASE
    #[serde(default)]
    pub media_id: Option<String>,

    /// PPV_UNLOCK (required), TIP (optional)
    #[serde(default)]
    pub message_id: Option<String>,

    /// TIP (required); PPV_UNLOCK (optional, must match the message price)
    #[serde(default)]
    pub amount: Option<Decimal>,

    /// Crypto asset to pay in
    #[serde(default)]
    pub pay_currency: Option<String>,
}

/// Created intent returned to the client
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub payment_id: String,
    pub provider: PaymentRail,
    pub kind: PaymentKind,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub provider_payload: ProviderPayload,
}

/// Intent policy knobs
#[derive(Clone, Debug)]
pub struct IntentConfig {
    pub min_tip_amount: Decimal,
    pub max_tip_amount: Decimal,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            min_tip_amount: DEFAULT_MIN_TIP,
            max_tip_amount: DEFAULT_MAX_TIP,
        }
    }
}

/// Validated price and grant payload for a request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Quote {
    pub amount: Decimal,
    pub metadata: PaymentMetadata,
    pub description: String,
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| PaymentError::Validation(format!("{field} is required")))
}

fn positive_price(price: Option<Decimal>, what: &str) -> Result<Decimal> {
    price
        .filter(|p| *p > Decimal::ZERO)
        .ok_or_else(|| PaymentError::Validation(format!("{what} has no price")))
}

/// Price and validate `request` for `user_id` against the current catalog.
pub fn quote(
    conn: &Connection,
    creator: &Actor,
    user_id: &str,
    request: &IntentRequest,
    config: &IntentConfig,
) -> Result<Quote> {
    if creator.is(user_id) {
        return Err(PaymentError::Validation(
            "the creator cannot purchase their own content".into(),
        ));
    }

    match request.kind {
        PaymentKind::Subscription => {
            let plan_id = required(request.plan_id.as_deref(), "planId")?;
            let interval = request
                .billing_interval
                .ok_or_else(|| PaymentError::Validation("billingInterval is required".into()))?;
            let plan = queries::get_plan(conn, plan_id)?
                .filter(|p| p.is_active)
                .ok_or_else(|| PaymentError::Validation(format!("plan {plan_id} is not available")))?;
            let amount = positive_price(Some(plan.price_for(interval)), "plan")?;

            Ok(Quote {
                amount,
                description: format!("{} ({})", plan.name, interval.as_str().to_lowercase()),
                metadata: PaymentMetadata::Subscription {
                    plan_id: plan.id,
                    billing_interval: interval,
                },
            })
        }

        PaymentKind::MediaPurchase => {
            let media_id = required(request.media_id.as_deref(), "mediaId")?;
            let media = queries::get_media(conn, media_id)?
                .ok_or_else(|| PaymentError::Validation(format!("media {media_id} does not exist")))?;
            if !media.is_purchaseable {
                return Err(PaymentError::Validation(format!(
                    "media {media_id} is not for sale"
                )));
            }
            let amount = positive_price(media.price, "media")?;
            if queries::owns_media(conn, user_id, media_id)? {
                return Err(PaymentError::AlreadyOwned(format!("media {media_id}")));
            }

            Ok(Quote {
                amount,
                description: media.title,
                metadata: PaymentMetadata::MediaPurchase { media_id: media.id },
            })
        }

        PaymentKind::PpvUnlock => {
            let message_id = required(request.message_id.as_deref(), "messageId")?;
            let message = queries::get_message(conn, message_id)?
                .ok_or_else(|| PaymentError::Validation(format!("message {message_id} does not exist")))?;
            if !message.is_ppv {
                return Err(PaymentError::Validation(format!(
                    "message {message_id} is not pay-per-view"
                )));
            }
            let amount = positive_price(message.ppv_price, "message")?;
            if message.sender_id == user_id || message.is_unlocked_by(user_id) {
                return Err(PaymentError::AlreadyOwned(format!("message {message_id}")));
            }
            if let Some(offered) = request.amount.filter(|a| *a != amount) {
                return Err(PaymentError::Validation(format!(
                    "amount {offered} does not match message price {amount}"
                )));
            }

            Ok(Quote {
                amount,
                description: "Unlock message".to_string(),
                metadata: PaymentMetadata::PpvUnlock {
                    message_id: message.id,
                },
            })
        }

        PaymentKind::Tip => {
            let amount = request
                .amount
                .ok_or_else(|| PaymentError::InvalidAmount("amount is required".into()))?;
            if amount < config.min_tip_amount {
                return Err(PaymentError::InvalidAmount(format!(
                    "minimum tip is {}",
                    config.min_tip_amount
                )));
            }
            if amount > config.max_tip_amount {
                return Err(PaymentError::InvalidAmount(format!(
                    "maximum tip is {}",
                    config.max_tip_amount
                )));
            }
            if amount.normalize().scale() > 2 {
                return Err(PaymentError::InvalidAmount(
                    "amount has more than two decimal places".into(),
                ));
            }
            let message_id = match request.message_id.as_deref().filter(|m| !m.is_empty()) {
                Some(id) => Some(
                    queries::get_message(conn, id)?
                        .ok_or_else(|| PaymentError::Validation(format!("message {id} does not exist")))?
                        .id,
                ),
                None => None,
            };

            Ok(Quote {
                amount,
                description: "Tip".to_string(),
                metadata: PaymentMetadata::Tip { message_id },
            })
        }
    }
}

/// Creates PENDING payments and their provider sessions
#[derive(Clone, Debug)]
pub struct IntentFactory {
    pool: DbPool,
    gateways: Gateways,
    creator: Actor,
    config: IntentConfig,
}

impl IntentFactory {
    pub fn new(pool: DbPool, gateways: Gateways, creator: Actor, config: IntentConfig) -> Self {
        Self {
            pool,
            gateways,
            creator,
            config,
        }
    }

    /// Validate `request`, open the provider session and record the PENDING payment.
    pub async fn create(&self, caller: &Caller, request: IntentRequest) -> Result<PaymentIntent> {
        let gateway = self.gateways.get(request.provider)?.clone();

        let quote = {
            let conn = self.pool.get()?;
            quote(&conn, &self.creator, &caller.user_id, &request, &self.config)?
        };
        // Must fit the ledger before a provider session exists
        to_minor_units(quote.amount).map_err(|e| PaymentError::InvalidAmount(e.to_string()))?;

        let payment_id = uuid::Uuid::new_v4().to_string();
        let session = gateway
            .create_payment(&GatewayRequest {
                payment_id: payment_id.clone(),
                user_id: caller.user_id.clone(),
                amount: quote.amount,
                currency: LEDGER_CURRENCY.to_string(),
                description: quote.description.clone(),
                pay_currency: request.pay_currency.clone(),
            })
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    payment_id = %payment_id,
                    gateway = gateway.name(),
                    error = %e,
                    "Provider session failed, no payment recorded"
                );
            })?;

        let now = Utc::now();
        let payment = Payment {
            id: payment_id,
            user_id: caller.user_id.clone(),
            amount: quote.amount,
            currency: LEDGER_CURRENCY.to_string(),
            provider: request.provider,
            provider_tx_id: session.provider_tx_id,
            status: PaymentStatus::Pending,
            metadata: quote.metadata,
            provider_details: serde_json::Map::new(),
            provider_checked_at: session.provider_status.as_ref().map(|_| now),
            provider_status: session.provider_status,
            created_at: now,
            updated_at: now,
        };

        {
            let conn = self.pool.get()?;
            queries::insert_payment(&conn, &payment)?;
        }

        tracing::info!(
            payment_id = %payment.id,
            user_id = %payment.user_id,
            kind = %payment.kind(),
            provider = %payment.provider,
            amount = %payment.amount,
            provider_tx_id = %payment.provider_tx_id,
            "Payment intent created"
        );

        Ok(PaymentIntent {
            kind: payment.kind(),
            payment_id: payment.id,
            provider: payment.provider,
            amount: payment.amount,
            currency: payment.currency,
            status: payment.status,
            provider_payload: session.payload,
        })
    }
}
