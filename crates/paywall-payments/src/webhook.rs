//! Webhook Reconciliation
//!
//! Consumes provider callbacks for both rails and drives the payment
//! lifecycle:
//!
//! ```text
//! verify ─▶ parse ─▶ map status ─▶ BEGIN IMMEDIATE
//!                                    │ look up payment (404 if unknown)
//!                                    │ plan transition
//!                                    │   unchanged / illegal ─▶ no writes
//!                                    │   apply ─▶ CAS status, merge details
//!                                    │            grant or revoke entitlement
//!                                  COMMIT ─▶ accounting export, notification
//! ```
//!
//! Deliveries may be duplicated, reordered or concurrent. The transaction
//! plus the compare-and-swap on the stored status make each payment settle
//! exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use paywall_core::{CardEvent, CryptoStatus, Payment, PaymentRail, PaymentStatus, Transition};
use rusqlite::{Connection, TransactionBehavior};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db::{DbPool, queries};
use crate::entitlement;
use crate::error::{PaymentError, Result};
use crate::forwarder::{AccountingRecord, AccountingSink, NoopAccountingSink, spawn_forward};
use crate::gateway::PAYMENT_ID_METADATA_KEY;
use crate::notify::{EntitlementEvent, Notifier};
use crate::signature;

/// Shared secrets for both rails; a missing one disables that rail's webhooks
#[derive(Clone, Default)]
pub struct WebhookSecrets {
    pub crypto_ipn_secret: Option<String>,
    pub card_signing_secret: Option<String>,
}

impl std::fmt::Debug for WebhookSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSecrets")
            .field("crypto_ipn_secret", &self.crypto_ipn_secret.as_ref().map(|_| "<redacted>"))
            .field("card_signing_secret", &self.card_signing_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// ============ Crypto IPN ============

/// Crypto processor IPN body
#[derive(Clone, Debug, Deserialize)]
pub struct CryptoIpn {
    pub payment_id: serde_json::Value,
    pub payment_status: String,
    #[serde(default)]
    pub pay_address: Option<String>,
    #[serde(default)]
    pub pay_amount: Option<Decimal>,
    #[serde(default)]
    pub pay_currency: Option<String>,
    #[serde(default)]
    pub price_amount: Option<Decimal>,
    #[serde(default)]
    pub price_currency: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub actually_paid: Option<Decimal>,
    #[serde(default)]
    pub outcome_amount: Option<Decimal>,
    #[serde(default)]
    pub outcome_currency: Option<String>,
}

// ============ Card events ============

#[derive(Clone, Debug, Deserialize)]
struct CardEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: CardEventData,
}

#[derive(Clone, Debug, Deserialize)]
struct CardEventData {
    object: CardObject,
}

/// The fields used from a checkout session, payment intent or charge
#[derive(Clone, Debug, Deserialize)]
struct CardObject {
    id: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    amount_refunded: Option<i64>,
    /// Charge amount in minor units
    #[serde(default)]
    amount: Option<i64>,
    /// Set on charges once the whole amount has been refunded
    #[serde(default)]
    refunded: Option<bool>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    payment_intent: Option<serde_json::Value>,
}

// ============ Normalized event ============

/// How a webhook identifies its payment
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentRef {
    /// The rail's transaction / session id
    ProviderTx(String),

    /// A card payment intent, with the ledger id from metadata when present
    CardIntent {
        payment_intent: String,
        ledger_id: Option<String>,
    },
}

/// A verified callback reduced to what reconciliation needs
#[derive(Clone, Debug)]
pub struct WebhookEvent {
    pub provider: PaymentRail,
    pub reference: PaymentRef,
    /// Provider vocabulary the status was mapped from
    pub raw_status: String,
    pub status: PaymentStatus,
    /// Provider facts merged into the payment's details on a transition
    pub details: serde_json::Map<String, serde_json::Value>,
}

fn put<T: Serialize>(details: &mut serde_json::Map<String, serde_json::Value>, key: &str, value: Option<T>) {
    if let Some(v) = value.and_then(|v| serde_json::to_value(v).ok()) {
        details.insert(key.to_string(), v);
    }
}

/// Parse a crypto IPN body.
pub fn parse_crypto(body: &[u8]) -> Result<WebhookEvent> {
    let ipn: CryptoIpn = serde_json::from_slice(body)
        .map_err(|e| PaymentError::WebhookParse(format!("crypto IPN: {e}")))?;
    let provider_tx_id = crate::gateway::provider_id_to_string(&ipn.payment_id)
        .ok_or_else(|| PaymentError::WebhookParse("crypto IPN without payment_id".into()))?;

    let status = CryptoStatus::parse(&ipn.payment_status).canonical();

    let mut details = serde_json::Map::new();
    put(&mut details, "pay_address", ipn.pay_address);
    put(&mut details, "pay_amount", ipn.pay_amount);
    put(&mut details, "pay_currency", ipn.pay_currency);
    put(&mut details, "price_amount", ipn.price_amount);
    put(&mut details, "price_currency", ipn.price_currency);
    put(&mut details, "actually_paid", ipn.actually_paid);
    put(&mut details, "outcome_amount", ipn.outcome_amount);
    put(&mut details, "outcome_currency", ipn.outcome_currency);
    put(&mut details, "order_id", ipn.order_id);

    Ok(WebhookEvent {
        provider: PaymentRail::Crypto,
        reference: PaymentRef::ProviderTx(provider_tx_id),
        raw_status: ipn.payment_status,
        status,
        details,
    })
}

/// A charge counts as fully refunded when the processor says so, or when the
/// refunded amount covers the charge. Without either fact the refund is full.
fn is_full_refund(object: &CardObject) -> bool {
    match (object.refunded, object.amount_refunded, object.amount) {
        (Some(refunded), _, _) => refunded,
        (None, Some(refunded), Some(amount)) => refunded >= amount,
        _ => true,
    }
}

/// Parse a card event envelope; `None` for event types that do not concern
/// payments and for partial refunds, which leave access in place.
pub fn parse_card(body: &[u8]) -> Result<Option<WebhookEvent>> {
    let envelope: CardEnvelope = serde_json::from_slice(body)
        .map_err(|e| PaymentError::WebhookParse(format!("card event: {e}")))?;
    let object = envelope.data.object;

    let event = CardEvent::parse(&envelope.event_type, object.payment_status.as_deref());
    if let CardEvent::Unknown(event_type) = &event {
        tracing::debug!(event_id = %envelope.id, event_type = %event_type, "Ignoring card event");
        return Ok(None);
    }
    if event == CardEvent::ChargeRefunded && !is_full_refund(&object) {
        tracing::info!(
            event_id = %envelope.id,
            charge = %object.id,
            amount = ?object.amount,
            amount_refunded = ?object.amount_refunded,
            "Partial refund, payment left as is"
        );
        return Ok(None);
    }

    let payment_intent = object
        .payment_intent
        .as_ref()
        .and_then(crate::gateway::provider_id_or_object_id);
    let ledger_id = object.metadata.get(PAYMENT_ID_METADATA_KEY).cloned();

    let reference = match event {
        CardEvent::CheckoutCompleted { .. }
        | CardEvent::AsyncPaymentSucceeded
        | CardEvent::AsyncPaymentFailed
        | CardEvent::CheckoutExpired => PaymentRef::ProviderTx(object.id.clone()),
        CardEvent::PaymentFailed => PaymentRef::CardIntent {
            payment_intent: object.id.clone(),
            ledger_id,
        },
        CardEvent::ChargeRefunded => PaymentRef::CardIntent {
            payment_intent: payment_intent.clone().ok_or_else(|| {
                PaymentError::WebhookParse("refund event without payment_intent".into())
            })?,
            ledger_id,
        },
        CardEvent::Unknown(_) => return Ok(None),
    };

    let mut details = serde_json::Map::new();
    put(&mut details, "event_id", Some(envelope.id));
    put(&mut details, "payment_intent", payment_intent);
    put(&mut details, "payment_status", object.payment_status);
    put(&mut details, "amount_total", object.amount_total);
    put(&mut details, "amount_refunded", object.amount_refunded);
    put(&mut details, "currency", object.currency);

    Ok(Some(WebhookEvent {
        provider: PaymentRail::Card,
        reference,
        raw_status: envelope.event_type,
        status: event.canonical(),
        details,
    }))
}

// ============ Reconciler ============

/// What a delivery did to the ledger
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ReconcileOutcome {
    /// Status moved; `granted` when an entitlement was created
    Applied {
        payment_id: String,
        from: PaymentStatus,
        to: PaymentStatus,
        granted: bool,
    },
    /// Duplicate, stale or raced delivery: nothing written
    Unchanged {
        payment_id: String,
        status: PaymentStatus,
    },
    /// The lifecycle forbids this move; logged, nothing written
    Illegal {
        payment_id: String,
        from: PaymentStatus,
        to: PaymentStatus,
    },
    /// Event type that carries no payment state
    Ignored,
}

/// Result of the transactional half of reconciliation
struct Settled {
    outcome: ReconcileOutcome,
    payment: Option<Payment>,
    event: Option<EntitlementEvent>,
}

fn resolve_payment(conn: &Connection, event: &WebhookEvent) -> Result<Option<Payment>> {
    match &event.reference {
        PaymentRef::ProviderTx(tx_id) => queries::get_payment_by_provider_tx(conn, event.provider, tx_id),
        PaymentRef::CardIntent {
            payment_intent,
            ledger_id,
        } => {
            if let Some(payment) = queries::get_card_payment_by_intent(conn, payment_intent)? {
                return Ok(Some(payment));
            }
            match ledger_id {
                Some(id) => Ok(queries::get_payment(conn, id)?
                    .filter(|p| p.provider == PaymentRail::Card)),
                None => Ok(None),
            }
        }
    }
}

fn reference_label(reference: &PaymentRef) -> &str {
    match reference {
        PaymentRef::ProviderTx(id) => id,
        PaymentRef::CardIntent { payment_intent, .. } => payment_intent,
    }
}

/// Apply `event` to the ledger in one immediate transaction.
fn settle(pool: &DbPool, event: &WebhookEvent, now: DateTime<Utc>) -> Result<Settled> {
    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let Some(payment) = resolve_payment(&tx, event)? else {
        tracing::warn!(
            provider = %event.provider,
            reference = %reference_label(&event.reference),
            raw_status = %event.raw_status,
            "Webhook for unknown payment"
        );
        return Err(PaymentError::PaymentNotFound(reference_label(&event.reference).to_string()));
    };

    let transition = Transition::plan(payment.status, event.status);
    let (from, to) = match transition {
        Transition::Unchanged => {
            tracing::debug!(
                payment_id = %payment.id,
                status = %payment.status,
                raw_status = %event.raw_status,
                "Webhook is a no-op"
            );
            return Ok(Settled {
                outcome: ReconcileOutcome::Unchanged {
                    payment_id: payment.id,
                    status: payment.status,
                },
                payment: None,
                event: None,
            });
        }
        Transition::Illegal { from, to } => {
            tracing::warn!(
                payment_id = %payment.id,
                from = %from,
                to = %to,
                raw_status = %event.raw_status,
                "Illegal payment transition ignored"
            );
            return Ok(Settled {
                outcome: ReconcileOutcome::Illegal {
                    payment_id: payment.id,
                    from,
                    to,
                },
                payment: None,
                event: None,
            });
        }
        Transition::Apply { from, to } => (from, to),
    };

    let mut details = payment.provider_details.clone();
    details.extend(event.details.clone());

    if !queries::transition_payment(&tx, &payment.id, from, to, &details, now)? {
        tracing::info!(payment_id = %payment.id, "Payment moved concurrently, delivery dropped");
        return Ok(Settled {
            outcome: ReconcileOutcome::Unchanged {
                payment_id: payment.id,
                status: payment.status,
            },
            payment: None,
            event: None,
        });
    }

    let mut updated = payment;
    updated.status = to;
    updated.provider_details = details;
    updated.updated_at = now;

    let entitlement_event = if transition.grants_entitlement() {
        Some(entitlement::grant(&tx, &updated, now)?)
    } else if transition.is_refund() {
        Some(entitlement::revoke(&tx, &updated, now)?)
    } else {
        None
    };

    tx.commit()?;

    tracing::info!(
        payment_id = %updated.id,
        provider = %updated.provider,
        kind = %updated.kind(),
        from = %from,
        to = %to,
        "Payment reconciled"
    );

    // Only settlements that move money are exported
    let exported = transition.grants_entitlement() || transition.is_refund();
    Ok(Settled {
        outcome: ReconcileOutcome::Applied {
            payment_id: updated.id.clone(),
            from,
            to,
            granted: transition.grants_entitlement(),
        },
        payment: exported.then_some(updated),
        event: entitlement_event,
    })
}

/// Verifies, reconciles and fans out provider callbacks
#[derive(Clone)]
pub struct WebhookReconciler {
    pool: DbPool,
    secrets: WebhookSecrets,
    sink: Arc<dyn AccountingSink>,
    notifier: Notifier,
}

impl WebhookReconciler {
    pub fn new(pool: DbPool, secrets: WebhookSecrets) -> Self {
        Self {
            pool,
            secrets,
            sink: Arc::new(NoopAccountingSink),
            notifier: Notifier::default(),
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn AccountingSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Handle a crypto IPN delivery.
    pub async fn handle_crypto(&self, body: &[u8], signature: Option<&str>) -> Result<ReconcileOutcome> {
        signature::verify_crypto(self.secrets.crypto_ipn_secret.as_deref(), body, signature)?;
        let event = parse_crypto(body)?;
        tracing::info!(
            reference = %reference_label(&event.reference),
            raw_status = %event.raw_status,
            "Processing crypto webhook"
        );
        self.reconcile(event).await
    }

    /// Handle a card event delivery.
    pub async fn handle_card(&self, body: &[u8], signature: Option<&str>) -> Result<ReconcileOutcome> {
        signature::verify_card(
            self.secrets.card_signing_secret.as_deref(),
            body,
            signature,
            Utc::now().timestamp(),
        )?;
        let Some(event) = parse_card(body)? else {
            return Ok(ReconcileOutcome::Ignored);
        };
        tracing::info!(
            reference = %reference_label(&event.reference),
            raw_status = %event.raw_status,
            "Processing card webhook"
        );
        self.reconcile(event).await
    }

    /// Apply an already verified event, then export and notify after commit.
    pub async fn reconcile(&self, event: WebhookEvent) -> Result<ReconcileOutcome> {
        let pool = self.pool.clone();
        let settled = tokio::task::spawn_blocking(move || settle(&pool, &event, Utc::now()))
            .await
            .map_err(|e| PaymentError::Internal(format!("reconcile task failed: {e}")))
            .and_then(|settled| settled)
            .inspect_err(|e| {
                tracing::warn!(error = %e, retryable = e.is_retryable(), "Webhook not reconciled");
            })?;

        if let Some(payment) = &settled.payment {
            match AccountingRecord::from_payment(payment) {
                Ok(record) => spawn_forward(self.sink.clone(), record),
                Err(e) => tracing::warn!(payment_id = %payment.id, error = %e, "Accounting record skipped"),
            }
        }
        if let Some(event) = settled.event {
            self.notifier.publish(event);
        }

        Ok(settled.outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_crypto_ipn() {
        let body = br#"{
            "payment_id": 5077125051,
            "payment_status": "finished",
            "pay_address": "bc1qxyz",
            "price_amount": 29.99,
            "price_currency": "usd",
            "pay_amount": 0.00041,
            "actually_paid": 0.00041,
            "pay_currency": "btc",
            "order_id": "pay_1",
            "outcome_amount": null,
            "outcome_currency": null
        }"#;
        let event = parse_crypto(body).unwrap();
        assert_eq!(event.provider, PaymentRail::Crypto);
        assert_eq!(event.reference, PaymentRef::ProviderTx("5077125051".into()));
        assert_eq!(event.status, PaymentStatus::Completed);
        assert_eq!(event.details["pay_currency"], "btc");
        assert_eq!(event.details["actually_paid"], serde_json::json!(dec!(0.00041)));
        assert!(!event.details.contains_key("outcome_amount"));
    }

    #[test]
    fn test_parse_crypto_rejects_garbage() {
        assert!(matches!(parse_crypto(b"{}"), Err(PaymentError::WebhookParse(_))));
        assert!(matches!(
            parse_crypto(br#"{"payment_id":null,"payment_status":"finished"}"#),
            Err(PaymentError::WebhookParse(_))
        ));
    }

    #[test]
    fn test_parse_card_checkout_completed() {
        let body = br#"{
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {
                "id": "cs_test_1",
                "object": "checkout.session",
                "payment_status": "paid",
                "amount_total": 2999,
                "currency": "usd",
                "payment_intent": "pi_1",
                "metadata": {"payment_id": "pay_1"}
            }}
        }"#;
        let event = parse_card(body).unwrap().unwrap();
        assert_eq!(event.reference, PaymentRef::ProviderTx("cs_test_1".into()));
        assert_eq!(event.status, PaymentStatus::Completed);
        assert_eq!(event.details["payment_intent"], "pi_1");
        assert_eq!(event.details["amount_total"], 2999);
        assert_eq!(event.details["event_id"], "evt_1");
    }

    #[test]
    fn test_parse_card_refund_resolves_by_intent() {
        let body = br#"{
            "id": "evt_2",
            "type": "charge.refunded",
            "data": {"object": {
                "id": "ch_1",
                "payment_intent": "pi_1",
                "amount_refunded": 2999,
                "metadata": {}
            }}
        }"#;
        let event = parse_card(body).unwrap().unwrap();
        assert_eq!(
            event.reference,
            PaymentRef::CardIntent {
                payment_intent: "pi_1".into(),
                ledger_id: None
            }
        );
        assert_eq!(event.status, PaymentStatus::Refunded);
    }

    #[test]
    fn test_partial_card_refund_is_ignored() {
        let partial = br#"{
            "id": "evt_5",
            "type": "charge.refunded",
            "data": {"object": {
                "id": "ch_1",
                "payment_intent": "pi_1",
                "amount": 1250,
                "amount_refunded": 500,
                "refunded": false
            }}
        }"#;
        assert!(parse_card(partial).unwrap().is_none());

        let by_amount = br#"{"id":"evt_6","type":"charge.refunded","data":{"object":{
            "id":"ch_1","payment_intent":"pi_1","amount":1250,"amount_refunded":1249}}}"#;
        assert!(parse_card(by_amount).unwrap().is_none());

        let full = br#"{"id":"evt_7","type":"charge.refunded","data":{"object":{
            "id":"ch_1","payment_intent":"pi_1","amount":1250,"amount_refunded":1250,"refunded":true}}}"#;
        assert_eq!(parse_card(full).unwrap().unwrap().status, PaymentStatus::Refunded);
    }

    #[test]
    fn test_parse_card_ignores_unrelated_events() {
        let body = br#"{"id":"evt_3","type":"customer.created","data":{"object":{"id":"cus_1"}}}"#;
        assert!(parse_card(body).unwrap().is_none());
    }

    #[test]
    fn test_refund_without_intent_is_parse_error() {
        let body = br#"{"id":"evt_4","type":"charge.refunded","data":{"object":{"id":"ch_1"}}}"#;
        assert!(matches!(parse_card(body), Err(PaymentError::WebhookParse(_))));
    }
}
