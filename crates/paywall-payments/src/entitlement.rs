//! Entitlement Grantor
//!
//! Type-specific side effects of a payment settling. Both functions run on
//! the reconciler's open transaction: any error rolls the whole
//! reconciliation back, payment status included. Uniqueness constraints make
//! every write safe to repeat.

use chrono::{DateTime, Utc};
use paywall_core::{MessagePaymentKind, Payment, PaymentMetadata, PaymentStatus, SubscriptionStatus, to_minor_units};
use rusqlite::Connection;

use crate::db::queries;
use crate::error::{PaymentError, Result};
use crate::notify::EntitlementEvent;

/// Grant what `payment` bought, as of `now`.
pub fn grant(conn: &Connection, payment: &Payment, now: DateTime<Utc>) -> Result<EntitlementEvent> {
    match &payment.metadata {
        PaymentMetadata::Subscription {
            plan_id,
            billing_interval,
        } => {
            let period_end = billing_interval.period_end(now).ok_or_else(|| {
                PaymentError::Internal(format!("subscription period overflows for {}", payment.id))
            })?;
            queries::upsert_subscription(
                conn,
                &payment.user_id,
                plan_id,
                payment.provider,
                *billing_interval,
                now,
                period_end,
            )?;

            tracing::info!(
                payment_id = %payment.id,
                user_id = %payment.user_id,
                plan_id = %plan_id,
                period_end = %period_end,
                "Subscription activated"
            );

            Ok(EntitlementEvent::SubscriptionActivated {
                user_id: payment.user_id.clone(),
                plan_id: plan_id.clone(),
                provider: payment.provider,
                period_end,
            })
        }

        PaymentMetadata::MediaPurchase { media_id } => {
            if queries::grant_media_purchase(conn, payment, media_id, now)? {
                tracing::info!(
                    payment_id = %payment.id,
                    user_id = %payment.user_id,
                    media_id = %media_id,
                    "Media purchase recorded"
                );
            } else {
                tracing::warn!(
                    payment_id = %payment.id,
                    user_id = %payment.user_id,
                    media_id = %media_id,
                    "Media already owned, purchase not re-recorded"
                );
            }

            Ok(EntitlementEvent::MediaUnlocked {
                user_id: payment.user_id.clone(),
                media_id: media_id.clone(),
            })
        }

        PaymentMetadata::PpvUnlock { message_id } => {
            let added = queries::add_message_unlock(conn, message_id, &payment.user_id, now)?;
            let recorded = queries::insert_message_payment(
                conn,
                payment,
                message_id,
                MessagePaymentKind::PpvUnlock,
                now,
            )?;

            tracing::info!(
                payment_id = %payment.id,
                user_id = %payment.user_id,
                message_id = %message_id,
                added,
                recorded,
                "Message unlocked"
            );

            Ok(EntitlementEvent::MessageUnlocked {
                user_id: payment.user_id.clone(),
                message_id: message_id.clone(),
            })
        }

        PaymentMetadata::Tip { message_id } => {
            match message_id {
                Some(message_id) => {
                    let recorded = queries::insert_message_payment(
                        conn,
                        payment,
                        message_id,
                        MessagePaymentKind::Tip,
                        now,
                    )?;
                    // The accumulator moves exactly when a new tip row lands.
                    if recorded && !queries::add_message_tips(conn, message_id, to_minor_units(payment.amount)?)? {
                        return Err(PaymentError::Internal(format!(
                            "tip target message {message_id} disappeared"
                        )));
                    }
                    tracing::info!(
                        payment_id = %payment.id,
                        user_id = %payment.user_id,
                        message_id = %message_id,
                        amount = %payment.amount,
                        recorded,
                        "Tip recorded"
                    );
                }
                None => tracing::info!(
                    payment_id = %payment.id,
                    user_id = %payment.user_id,
                    amount = %payment.amount,
                    "Tip received without a message"
                ),
            }

            Ok(EntitlementEvent::TipReceived {
                user_id: payment.user_id.clone(),
                message_id: message_id.clone(),
                amount: payment.amount,
            })
        }
    }
}

/// Withdraw what a refunded `payment` granted.
///
/// Ownership rows flip to REFUNDED and a subscription is canceled. The PPV
/// unlock set and the tip accumulator only grow, so they are left as is.
pub fn revoke(conn: &Connection, payment: &Payment, now: DateTime<Utc>) -> Result<EntitlementEvent> {
    let touched = match &payment.metadata {
        PaymentMetadata::Subscription { plan_id, .. } => queries::set_subscription_status(
            conn,
            &payment.user_id,
            plan_id,
            payment.provider,
            SubscriptionStatus::Canceled,
            now,
        )?,
        PaymentMetadata::MediaPurchase { .. } => {
            queries::set_media_purchase_status_by_payment(conn, &payment.id, PaymentStatus::Refunded)?
        }
        PaymentMetadata::PpvUnlock { .. } | PaymentMetadata::Tip { .. } => {
            queries::set_message_payment_status_by_payment(conn, &payment.id, PaymentStatus::Refunded)?
        }
    };

    tracing::info!(
        payment_id = %payment.id,
        user_id = %payment.user_id,
        kind = %payment.kind(),
        touched,
        "Entitlement revoked after refund"
    );

    Ok(EntitlementEvent::PaymentRefunded {
        user_id: payment.user_id.clone(),
        payment_id: payment.id.clone(),
        kind: payment.kind(),
    })
}
