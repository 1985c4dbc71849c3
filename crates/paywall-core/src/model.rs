//! Domain Models
//!
//! Ledger, catalog and entitlement records shared by the payment engine and
//! the HTTP surface. All money is `rust_decimal::Decimal` in the domain and
//! integer minor units (cents) at rest.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Months, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Convert a decimal amount into integer cents, rounding half away from zero.
pub fn to_minor_units(amount: Decimal) -> Result<i64> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or_else(|| CoreError::AmountOutOfRange(amount.to_string()))?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| CoreError::AmountOutOfRange(amount.to_string()))
}

/// Convert integer cents back into a decimal amount.
pub fn from_minor_units(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Payment rail a payment is settled on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentRail {
    /// Card processor (hosted checkout)
    Card,
    /// Cryptocurrency processor (pay-to-address)
    Crypto,
}

impl PaymentRail {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Card => "CARD",
            Self::Crypto => "CRYPTO",
        }
    }
}

impl FromStr for PaymentRail {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CARD" => Ok(Self::Card),
            "CRYPTO" => Ok(Self::Crypto),
            _ => Err(CoreError::unknown("payment rail", s)),
        }
    }
}

impl fmt::Display for PaymentRail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical payment lifecycle
///
/// ```text
/// PENDING ──▶ COMPLETED ──▶ REFUNDED
///    │
///    └──────▶ FAILED
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Refunded => "REFUNDED",
        }
    }

    /// Whether no further generic status update may move this payment
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl FromStr for PaymentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "REFUNDED" => Ok(Self::Refunded),
            _ => Err(CoreError::unknown("payment status", s)),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a payment buys
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentKind {
    Subscription,
    MediaPurchase,
    PpvUnlock,
    Tip,
}

impl PaymentKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Subscription => "SUBSCRIPTION",
            Self::MediaPurchase => "MEDIA_PURCHASE",
            Self::PpvUnlock => "PPV_UNLOCK",
            Self::Tip => "TIP",
        }
    }
}

impl FromStr for PaymentKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SUBSCRIPTION" => Ok(Self::Subscription),
            "MEDIA_PURCHASE" => Ok(Self::MediaPurchase),
            "PPV_UNLOCK" => Ok(Self::PpvUnlock),
            "TIP" => Ok(Self::Tip),
            _ => Err(CoreError::unknown("payment type", s)),
        }
    }
}

impl fmt::Display for PaymentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription billing interval
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingInterval {
    Monthly,
    Annual,
}

impl BillingInterval {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "MONTHLY",
            Self::Annual => "ANNUAL",
        }
    }

    /// End of a period of this length starting at `start`.
    ///
    /// Calendar arithmetic: Jan 31 + 1 month clamps to the last day of February.
    pub fn period_end(self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let months = match self {
            Self::Monthly => Months::new(1),
            Self::Annual => Months::new(12),
        };
        start.checked_add_months(months)
    }
}

impl FromStr for BillingInterval {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "MONTHLY" => Ok(Self::Monthly),
            "ANNUAL" | "YEARLY" => Ok(Self::Annual),
            _ => Err(CoreError::unknown("billing interval", s)),
        }
    }
}

/// Subscription state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    Expired,
}

impl SubscriptionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Canceled => "CANCELED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "CANCELED" => Ok(Self::Canceled),
            "EXPIRED" => Ok(Self::Expired),
            _ => Err(CoreError::unknown("subscription status", s)),
        }
    }
}

/// Content access tier, totally ordered from least to most exclusive
///
/// Variant order is the rank order: `Free < Basic < Premium < Vip`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessTier {
    Free,
    Basic,
    Premium,
    Vip,
}

impl AccessTier {
    /// All tiers in rank order
    pub const ALL: [Self; 4] = [Self::Free, Self::Basic, Self::Premium, Self::Vip];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Basic => "BASIC",
            Self::Premium => "PREMIUM",
            Self::Vip => "VIP",
        }
    }

    /// Position in the tier order
    pub const fn rank(self) -> u8 {
        match self {
            Self::Free => 0,
            Self::Basic => 1,
            Self::Premium => 2,
            Self::Vip => 3,
        }
    }
}

impl FromStr for AccessTier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "FREE" => Ok(Self::Free),
            "BASIC" => Ok(Self::Basic),
            "PREMIUM" => Ok(Self::Premium),
            "VIP" => Ok(Self::Vip),
            _ => Err(CoreError::unknown("access tier", s)),
        }
    }
}

/// Kind of a message-level payment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessagePaymentKind {
    PpvUnlock,
    Tip,
}

impl MessagePaymentKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PpvUnlock => "PPV_UNLOCK",
            Self::Tip => "TIP",
        }
    }
}

impl FromStr for MessagePaymentKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PPV_UNLOCK" => Ok(Self::PpvUnlock),
            "TIP" => Ok(Self::Tip),
            _ => Err(CoreError::unknown("message payment type", s)),
        }
    }
}

/// Everything needed to grant a payment's entitlement once it completes.
///
/// The provider callback only echoes its own transaction id, so the original
/// request is captured here when the intent is created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum PaymentMetadata {
    Subscription {
        plan_id: String,
        billing_interval: BillingInterval,
    },
    MediaPurchase {
        media_id: String,
    },
    PpvUnlock {
        message_id: String,
    },
    Tip {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
}

impl PaymentMetadata {
    pub const fn kind(&self) -> PaymentKind {
        match self {
            Self::Subscription { .. } => PaymentKind::Subscription,
            Self::MediaPurchase { .. } => PaymentKind::MediaPurchase,
            Self::PpvUnlock { .. } => PaymentKind::PpvUnlock,
            Self::Tip { .. } => PaymentKind::Tip,
        }
    }
}

/// One payment attempt in the ledger
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    /// Ledger id
    pub id: String,

    /// Paying user
    pub user_id: String,

    /// Amount charged, USD-denominated
    pub amount: Decimal,

    /// ISO currency of `amount` (lowercase)
    pub currency: String,

    /// Rail the payment is settled on
    pub provider: PaymentRail,

    /// Provider's transaction/session id, unique per rail
    pub provider_tx_id: String,

    /// Canonical lifecycle state
    pub status: PaymentStatus,

    /// Type-specific grant payload
    pub metadata: PaymentMetadata,

    /// Extra fields echoed by the provider (amount actually paid, pay currency, ...)
    #[serde(default)]
    pub provider_details: serde_json::Map<String, serde_json::Value>,

    /// Last raw status seen from the provider by a status poll
    #[serde(default)]
    pub provider_status: Option<String>,

    /// When `provider_status` was last refreshed
    #[serde(default)]
    pub provider_checked_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub const fn kind(&self) -> PaymentKind {
        self.metadata.kind()
    }
}

/// A purchasable subscription plan
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    pub name: String,

    /// Highest content tier this plan unlocks
    pub access_tier: AccessTier,

    pub monthly_price: Decimal,
    pub annual_price: Decimal,
    pub is_active: bool,
}

impl Plan {
    /// Price charged for one period of `interval`
    pub const fn price_for(&self, interval: BillingInterval) -> Decimal {
        match interval {
            BillingInterval::Monthly => self.monthly_price,
            BillingInterval::Annual => self.annual_price,
        }
    }
}

/// A user's subscription to a plan on one rail
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    pub provider: PaymentRail,
    pub status: SubscriptionStatus,
    pub billing_interval: BillingInterval,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Active and inside the paid period
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.current_period_end > now
    }
}

/// Access-relevant view of a media item
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaContent {
    pub id: String,
    pub title: String,
    pub access_tier: AccessTier,

    /// One-off purchase price, if sold individually
    pub price: Option<Decimal>,

    pub is_purchaseable: bool,

    /// Location of the protected content
    pub content_url: String,
}

/// Ownership record for an individually purchased media item
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaPurchase {
    pub id: String,
    pub user_id: String,
    pub media_id: String,
    pub amount: Decimal,
    pub provider: PaymentRail,
    pub provider_tx_id: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// PPV-relevant view of a direct message
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub is_ppv: bool,
    pub ppv_price: Option<Decimal>,

    /// Users who unlocked the message (append-only set)
    pub unlocked_by: BTreeSet<String>,

    /// Sum of completed tips (monotonically increasing)
    pub total_tips: Decimal,
}

impl Message {
    pub fn is_unlocked_by(&self, user_id: &str) -> bool {
        !self.is_ppv || self.unlocked_by.contains(user_id)
    }
}

/// A PPV unlock or tip attached to a message
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayment {
    pub id: String,
    pub message_id: String,
    pub user_id: String,
    pub kind: MessagePaymentKind,
    pub amount: Decimal,
    pub provider: PaymentRail,

    /// Originating ledger entry
    pub payment_id: String,

    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}
