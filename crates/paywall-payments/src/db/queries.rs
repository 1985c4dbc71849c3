//! Ledger, catalog and entitlement queries.
//!
//! Every function takes a plain `&Connection`; pass a `&Transaction` (which
//! derefs to one) to run it inside the caller's atomic scope.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use paywall_core::{
    BillingInterval, MediaContent, MediaPurchase, Message, MessagePayment, MessagePaymentKind,
    Payment, PaymentRail, PaymentStatus, Plan, Subscription, SubscriptionStatus,
    from_minor_units, to_minor_units,
};

use super::from_row::{
    MEDIA_COLS, MEDIA_PURCHASE_COLS, MESSAGE_PAYMENT_COLS, PAYMENT_COLS, PLAN_COLS,
    SUBSCRIPTION_COLS, query_all, query_one,
};
use crate::error::Result;

fn gen_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============ Catalog ============

pub fn insert_plan(conn: &Connection, plan: &Plan) -> Result<()> {
    conn.execute(
        "INSERT INTO plans (id, name, access_tier, monthly_price_cents, annual_price_cents, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            plan.id,
            plan.name,
            plan.access_tier.as_str(),
            to_minor_units(plan.monthly_price)?,
            to_minor_units(plan.annual_price)?,
            plan.is_active,
        ],
    )?;
    Ok(())
}

pub fn get_plan(conn: &Connection, id: &str) -> Result<Option<Plan>> {
    Ok(query_one(
        conn,
        &format!("SELECT {PLAN_COLS} FROM plans WHERE id = ?1"),
        &[&id],
    )?)
}

pub fn insert_media(conn: &Connection, media: &MediaContent) -> Result<()> {
    let price_cents = media.price.map(to_minor_units).transpose()?;
    conn.execute(
        "INSERT INTO media (id, title, access_tier, price_cents, is_purchaseable, content_url, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            media.id,
            media.title,
            media.access_tier.as_str(),
            price_cents,
            media.is_purchaseable,
            media.content_url,
            Utc::now().timestamp(),
        ],
    )?;
    Ok(())
}

pub fn get_media(conn: &Connection, id: &str) -> Result<Option<MediaContent>> {
    Ok(query_one(
        conn,
        &format!("SELECT {MEDIA_COLS} FROM media WHERE id = ?1"),
        &[&id],
    )?)
}

/// Whole catalog, newest first
pub fn list_media(conn: &Connection) -> Result<Vec<MediaContent>> {
    Ok(query_all(
        conn,
        &format!("SELECT {MEDIA_COLS} FROM media ORDER BY created_at DESC, id"),
        &[],
    )?)
}

/// Input for [`insert_message`]
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub id: &'a str,
    pub sender_id: &'a str,
    pub is_ppv: bool,
    pub ppv_price: Option<rust_decimal::Decimal>,
}

pub fn insert_message(conn: &Connection, message: &NewMessage<'_>) -> Result<()> {
    let price_cents = message.ppv_price.map(to_minor_units).transpose()?;
    conn.execute(
        "INSERT INTO messages (id, sender_id, is_ppv, ppv_price_cents, total_tips_cents, created_at)
         VALUES (?1, ?2, ?3, ?4, 0, ?5)",
        params![
            message.id,
            message.sender_id,
            message.is_ppv,
            price_cents,
            Utc::now().timestamp(),
        ],
    )?;
    Ok(())
}

/// Message with its unlock set and tip total
pub fn get_message(conn: &Connection, id: &str) -> Result<Option<Message>> {
    let row = conn
        .query_row(
            "SELECT id, sender_id, is_ppv, ppv_price_cents, total_tips_cents FROM messages WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, bool>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((id, sender_id, is_ppv, price_cents, tips_cents)) = row else {
        return Ok(None);
    };

    let mut stmt = conn.prepare("SELECT user_id FROM message_unlocks WHERE message_id = ?1")?;
    let unlocked_by = stmt
        .query_map(params![id], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<BTreeSet<_>>>()?;

    Ok(Some(Message {
        id,
        sender_id,
        is_ppv,
        ppv_price: price_cents.map(from_minor_units),
        unlocked_by,
        total_tips: from_minor_units(tips_cents),
    }))
}

// ============ Payment Ledger ============

pub fn insert_payment(conn: &Connection, payment: &Payment) -> Result<()> {
    conn.execute(
        "INSERT INTO payments (id, user_id, amount_cents, currency, provider, provider_tx_id, status, kind,
                               metadata, provider_details, provider_status, provider_checked_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            payment.id,
            payment.user_id,
            to_minor_units(payment.amount)?,
            payment.currency,
            payment.provider.as_str(),
            payment.provider_tx_id,
            payment.status.as_str(),
            payment.kind().as_str(),
            serde_json::to_string(&payment.metadata)?,
            serde_json::to_string(&payment.provider_details)?,
            payment.provider_status,
            payment.provider_checked_at.map(|t| t.timestamp()),
            payment.created_at.timestamp(),
            payment.updated_at.timestamp(),
        ],
    )?;
    Ok(())
}

pub fn get_payment(conn: &Connection, id: &str) -> Result<Option<Payment>> {
    Ok(query_one(
        conn,
        &format!("SELECT {PAYMENT_COLS} FROM payments WHERE id = ?1"),
        &[&id],
    )?)
}

pub fn get_payment_by_provider_tx(
    conn: &Connection,
    provider: PaymentRail,
    provider_tx_id: &str,
) -> Result<Option<Payment>> {
    Ok(query_one(
        conn,
        &format!("SELECT {PAYMENT_COLS} FROM payments WHERE provider = ?1 AND provider_tx_id = ?2"),
        &[&provider.as_str(), &provider_tx_id],
    )?)
}

/// Card payment whose completion recorded `payment_intent` in its provider details
pub fn get_card_payment_by_intent(conn: &Connection, payment_intent: &str) -> Result<Option<Payment>> {
    Ok(query_one(
        conn,
        &format!(
            "SELECT {PAYMENT_COLS} FROM payments
             WHERE provider = 'CARD' AND json_extract(provider_details, '$.payment_intent') = ?1"
        ),
        &[&payment_intent],
    )?)
}

/// Move a payment from `from` to `to`, replacing its provider details.
///
/// Compare-and-swap on the stored status: returns false when another writer
/// already moved the row.
pub fn transition_payment(
    conn: &Connection,
    id: &str,
    from: PaymentStatus,
    to: PaymentStatus,
    provider_details: &serde_json::Map<String, serde_json::Value>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payments SET status = ?1, provider_details = ?2, updated_at = ?3
         WHERE id = ?4 AND status = ?5",
        params![
            to.as_str(),
            serde_json::to_string(provider_details)?,
            now.timestamp(),
            id,
            from.as_str(),
        ],
    )?;
    Ok(affected > 0)
}

/// Refresh the cached raw provider status without touching the lifecycle.
pub fn cache_provider_status(
    conn: &Connection,
    id: &str,
    provider_status: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE payments SET provider_status = ?1, provider_checked_at = ?2 WHERE id = ?3",
        params![provider_status, now.timestamp(), id],
    )?;
    Ok(())
}

// ============ Subscriptions ============

/// Create or extend the (user, plan, rail) subscription to `[start, end)`.
///
/// An existing row keeps its id and original start; only its end, interval
/// and status move.
pub fn upsert_subscription(
    conn: &Connection,
    user_id: &str,
    plan_id: &str,
    provider: PaymentRail,
    interval: BillingInterval,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO subscriptions (id, user_id, plan_id, provider, status, billing_interval,
                                    current_period_start, current_period_end, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'ACTIVE', ?5, ?6, ?7, ?6, ?6)
         ON CONFLICT (user_id, plan_id, provider) DO UPDATE SET
             status = 'ACTIVE',
             billing_interval = excluded.billing_interval,
             current_period_end = excluded.current_period_end,
             updated_at = excluded.updated_at",
        params![
            gen_id(),
            user_id,
            plan_id,
            provider.as_str(),
            interval.as_str(),
            start.timestamp(),
            end.timestamp(),
        ],
    )?;
    Ok(())
}

pub fn get_subscription(
    conn: &Connection,
    user_id: &str,
    plan_id: &str,
    provider: PaymentRail,
) -> Result<Option<Subscription>> {
    Ok(query_one(
        conn,
        &format!(
            "SELECT {SUBSCRIPTION_COLS} FROM subscriptions
             WHERE user_id = ?1 AND plan_id = ?2 AND provider = ?3"
        ),
        &[&user_id, &plan_id, &provider.as_str()],
    )?)
}

/// Every subscription of a user paired with its plan
pub fn list_subscriptions_with_plans(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<(Subscription, Plan)>> {
    let subs: Vec<Subscription> = query_all(
        conn,
        &format!("SELECT {SUBSCRIPTION_COLS} FROM subscriptions WHERE user_id = ?1"),
        &[&user_id],
    )?;

    let mut out = Vec::with_capacity(subs.len());
    for sub in subs {
        match get_plan(conn, &sub.plan_id)? {
            Some(plan) => out.push((sub, plan)),
            None => tracing::warn!(plan_id = %sub.plan_id, "Subscription references a missing plan"),
        }
    }
    Ok(out)
}

pub fn set_subscription_status(
    conn: &Connection,
    user_id: &str,
    plan_id: &str,
    provider: PaymentRail,
    status: SubscriptionStatus,
    now: DateTime<Utc>,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE subscriptions SET status = ?1, updated_at = ?2
         WHERE user_id = ?3 AND plan_id = ?4 AND provider = ?5",
        params![status.as_str(), now.timestamp(), user_id, plan_id, provider.as_str()],
    )?;
    Ok(affected > 0)
}

// ============ Media Purchases ============

/// Record ownership of a media item for the payment's user.
///
/// A completed row for (user, media) already existing makes this a no-op
/// (returns false). A previously refunded row is re-owned in place.
pub fn grant_media_purchase(
    conn: &Connection,
    payment: &Payment,
    media_id: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let affected = conn.execute(
        "INSERT INTO media_purchases (id, user_id, media_id, amount_cents, provider, provider_tx_id,
                                      payment_id, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'COMPLETED', ?8)
         ON CONFLICT (user_id, media_id) DO UPDATE SET
             amount_cents = excluded.amount_cents,
             provider = excluded.provider,
             provider_tx_id = excluded.provider_tx_id,
             payment_id = excluded.payment_id,
             status = 'COMPLETED',
             created_at = excluded.created_at
         WHERE media_purchases.status != 'COMPLETED'",
        params![
            gen_id(),
            payment.user_id,
            media_id,
            to_minor_units(payment.amount)?,
            payment.provider.as_str(),
            payment.provider_tx_id,
            payment.id,
            now.timestamp(),
        ],
    )?;
    Ok(affected > 0)
}

pub fn get_media_purchase(
    conn: &Connection,
    user_id: &str,
    media_id: &str,
) -> Result<Option<MediaPurchase>> {
    Ok(query_one(
        conn,
        &format!(
            "SELECT {MEDIA_PURCHASE_COLS} FROM media_purchases WHERE user_id = ?1 AND media_id = ?2"
        ),
        &[&user_id, &media_id],
    )?)
}

/// Whether the user currently owns the item
pub fn owns_media(conn: &Connection, user_id: &str, media_id: &str) -> Result<bool> {
    Ok(get_media_purchase(conn, user_id, media_id)?
        .is_some_and(|p| p.status == PaymentStatus::Completed))
}

/// Media ids the user currently owns
pub fn purchased_media_ids(conn: &Connection, user_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT media_id FROM media_purchases WHERE user_id = ?1 AND status = 'COMPLETED'",
    )?;
    let ids = stmt
        .query_map(params![user_id], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

pub fn set_media_purchase_status_by_payment(
    conn: &Connection,
    payment_id: &str,
    status: PaymentStatus,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE media_purchases SET status = ?1 WHERE payment_id = ?2",
        params![status.as_str(), payment_id],
    )?;
    Ok(affected > 0)
}

// ============ Messages: unlocks and tips ============

/// Add `user_id` to the message's unlock set. Returns false if already a member.
pub fn add_message_unlock(
    conn: &Connection,
    message_id: &str,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO message_unlocks (message_id, user_id, unlocked_at) VALUES (?1, ?2, ?3)",
        params![message_id, user_id, now.timestamp()],
    )?;
    Ok(affected > 0)
}

pub fn is_message_unlocked(conn: &Connection, message_id: &str, user_id: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM message_unlocks WHERE message_id = ?1 AND user_id = ?2",
            params![message_id, user_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Record a completed message payment for `payment`.
///
/// Returns false when the payment was already recorded or, for PPV unlocks,
/// when the user already has one for this message.
pub fn insert_message_payment(
    conn: &Connection,
    payment: &Payment,
    message_id: &str,
    kind: MessagePaymentKind,
    now: DateTime<Utc>,
) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO message_payments (id, message_id, user_id, kind, amount_cents, provider,
                                                 payment_id, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'COMPLETED', ?8)",
        params![
            gen_id(),
            message_id,
            payment.user_id,
            kind.as_str(),
            to_minor_units(payment.amount)?,
            payment.provider.as_str(),
            payment.id,
            now.timestamp(),
        ],
    )?;
    Ok(affected > 0)
}

/// Atomically add to the message's tip accumulator.
pub fn add_message_tips(conn: &Connection, message_id: &str, amount_cents: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE messages SET total_tips_cents = total_tips_cents + ?1 WHERE id = ?2",
        params![amount_cents, message_id],
    )?;
    Ok(affected > 0)
}

pub fn list_message_payments(conn: &Connection, message_id: &str) -> Result<Vec<MessagePayment>> {
    Ok(query_all(
        conn,
        &format!(
            "SELECT {MESSAGE_PAYMENT_COLS} FROM message_payments WHERE message_id = ?1 ORDER BY created_at, id"
        ),
        &[&message_id],
    )?)
}

pub fn set_message_payment_status_by_payment(
    conn: &Connection,
    payment_id: &str,
    status: PaymentStatus,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE message_payments SET status = ?1 WHERE payment_id = ?2",
        params![status.as_str(), payment_id],
    )?;
    Ok(affected > 0)
}
