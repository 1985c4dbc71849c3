//! Row mapping trait and helpers for the ledger queries.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use paywall_core::{
    MediaContent, MediaPurchase, MessagePayment, Payment, Plan, Subscription, from_minor_units,
};

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?
        .parse::<T>()
        .map_err(|_| rusqlite::Error::InvalidColumnType(col, col_name.to_string(), Type::Text))
}

/// Parse a JSON text column.
fn parse_json<T: serde::de::DeserializeOwned>(row: &Row, col: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(col)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(col, Type::Text, Box::new(e)))
}

/// Unix seconds to UTC; out-of-range values collapse to the epoch.
fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

fn ts_col(row: &Row, col: usize) -> rusqlite::Result<DateTime<Utc>> {
    Ok(ts(row.get(col)?))
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> rusqlite::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row).optional()
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> rusqlite::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const PAYMENT_COLS: &str = "id, user_id, amount_cents, currency, provider, provider_tx_id, status, metadata, provider_details, provider_status, provider_checked_at, created_at, updated_at";

pub const PLAN_COLS: &str =
    "id, name, access_tier, monthly_price_cents, annual_price_cents, is_active";

pub const SUBSCRIPTION_COLS: &str = "id, user_id, plan_id, provider, status, billing_interval, current_period_start, current_period_end, updated_at";

pub const MEDIA_COLS: &str = "id, title, access_tier, price_cents, is_purchaseable, content_url";

pub const MEDIA_PURCHASE_COLS: &str =
    "id, user_id, media_id, amount_cents, provider, provider_tx_id, status, created_at";

pub const MESSAGE_PAYMENT_COLS: &str =
    "id, message_id, user_id, kind, amount_cents, provider, payment_id, status, created_at";

// ============ FromRow Implementations ============

impl FromRow for Payment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            amount: from_minor_units(row.get(2)?),
            currency: row.get(3)?,
            provider: parse_enum(row, 4, "provider")?,
            provider_tx_id: row.get(5)?,
            status: parse_enum(row, 6, "status")?,
            metadata: parse_json(row, 7)?,
            provider_details: parse_json(row, 8)?,
            provider_status: row.get(9)?,
            provider_checked_at: row.get::<_, Option<i64>>(10)?.map(ts),
            created_at: ts_col(row, 11)?,
            updated_at: ts_col(row, 12)?,
        })
    }
}

impl FromRow for Plan {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            access_tier: parse_enum(row, 2, "access_tier")?,
            monthly_price: from_minor_units(row.get(3)?),
            annual_price: from_minor_units(row.get(4)?),
            is_active: row.get(5)?,
        })
    }
}

impl FromRow for Subscription {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            plan_id: row.get(2)?,
            provider: parse_enum(row, 3, "provider")?,
            status: parse_enum(row, 4, "status")?,
            billing_interval: parse_enum(row, 5, "billing_interval")?,
            current_period_start: ts_col(row, 6)?,
            current_period_end: ts_col(row, 7)?,
            updated_at: ts_col(row, 8)?,
        })
    }
}

impl FromRow for MediaContent {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            access_tier: parse_enum(row, 2, "access_tier")?,
            price: row.get::<_, Option<i64>>(3)?.map(from_minor_units),
            is_purchaseable: row.get(4)?,
            content_url: row.get(5)?,
        })
    }
}

impl FromRow for MediaPurchase {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            media_id: row.get(2)?,
            amount: from_minor_units(row.get(3)?),
            provider: parse_enum(row, 4, "provider")?,
            provider_tx_id: row.get(5)?,
            status: parse_enum(row, 6, "status")?,
            created_at: ts_col(row, 7)?,
        })
    }
}

impl FromRow for MessagePayment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            message_id: row.get(1)?,
            user_id: row.get(2)?,
            kind: parse_enum(row, 3, "kind")?,
            amount: from_minor_units(row.get(4)?),
            provider: parse_enum(row, 5, "provider")?,
            payment_id: row.get(6)?,
            status: parse_enum(row, 7, "status")?,
            created_at: ts_col(row, 8)?,
        })
    }
}
