//! Content Access
//!
//! Gathers what a caller holds from the ledger and runs the tier resolver
//! over the catalog. The single-item view and the library listing share one
//! [`AccessContext`], so they always agree.

use chrono::{DateTime, Utc};
use paywall_core::{AccessContext, AccessTier, Actor, Caller, MediaContent, has_access};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::db::{DbPool, queries};
use crate::error::{PaymentError, Result};

/// Media as shown to a particular caller
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaView {
    pub id: String,
    pub title: String,
    pub access_tier: AccessTier,
    pub price: Option<Decimal>,
    pub is_purchaseable: bool,
    pub has_access: bool,
    /// Withheld unless `has_access`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
}

impl MediaView {
    fn new(media: MediaContent, has_access: bool) -> Self {
        Self {
            id: media.id,
            title: media.title,
            access_tier: media.access_tier,
            price: media.price,
            is_purchaseable: media.is_purchaseable,
            has_access,
            content_url: has_access.then_some(media.content_url),
        }
    }
}

/// Build the caller's access context from the ledger.
pub fn access_context(
    conn: &Connection,
    caller: &Caller,
    creator: &Actor,
    now: DateTime<Utc>,
) -> Result<AccessContext> {
    let purchases = queries::purchased_media_ids(conn, &caller.user_id)?;
    let subscriptions = queries::list_subscriptions_with_plans(conn, &caller.user_id)?;

    Ok(AccessContext::new(caller.user_id.clone())
        .creator(caller.is_creator(creator))
        .with_purchases(purchases)
        .with_subscriptions(now, subscriptions.iter().map(|(sub, plan)| (sub, plan))))
}

/// Read side of the catalog, filtered per caller
#[derive(Clone, Debug)]
pub struct Library {
    pool: DbPool,
    creator: Actor,
}

impl Library {
    pub fn new(pool: DbPool, creator: Actor) -> Self {
        Self { pool, creator }
    }

    /// One media item; its content URL only when the caller has access.
    pub fn media(&self, caller: &Caller, media_id: &str) -> Result<MediaView> {
        let conn = self.pool.get()?;
        let media = queries::get_media(&conn, media_id)?
            .ok_or_else(|| PaymentError::NotFound(format!("media {media_id}")))?;
        let ctx = access_context(&conn, caller, &self.creator, Utc::now())?;
        let allowed = has_access(&ctx, &media);
        Ok(MediaView::new(media, allowed))
    }

    /// Every media item the caller may see.
    pub fn library(&self, caller: &Caller) -> Result<Vec<MediaView>> {
        let conn = self.pool.get()?;
        let ctx = access_context(&conn, caller, &self.creator, Utc::now())?;
        let items = queries::list_media(&conn)?
            .into_iter()
            .filter(|m| has_access(&ctx, m))
            .map(|m| MediaView::new(m, true))
            .collect();
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_content_url_is_withheld() {
        let media = MediaContent {
            id: "m1".into(),
            title: "Set".into(),
            access_tier: AccessTier::Premium,
            price: Some(dec!(4.99)),
            is_purchaseable: true,
            content_url: "https://cdn.example.com/m1".into(),
        };
        let locked = serde_json::to_value(MediaView::new(media.clone(), false)).unwrap();
        assert_eq!(locked["hasAccess"], false);
        assert!(locked.get("contentUrl").is_none());

        let open = serde_json::to_value(MediaView::new(media, true)).unwrap();
        assert_eq!(open["contentUrl"], "https://cdn.example.com/m1");
    }
}
