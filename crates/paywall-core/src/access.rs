//! Access Tier Resolution
//!
//! One pure rule decides whether a user may see a media item. The content
//! endpoint and the library listing both go through [`has_access`], so they
//! can never disagree.
//!
//! ```text
//! access = creator
//!        | purchased(media)
//!        | media.tier == FREE
//!        | rank(current subscription tier) >= rank(media.tier)
//! ```

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::model::{AccessTier, MediaContent, Plan, Subscription};

/// What a user holds, gathered from the ledger before resolving access
#[derive(Clone, Debug, Default)]
pub struct AccessContext {
    /// Requesting user
    pub user_id: String,

    /// The requesting user is the creator
    pub is_creator: bool,

    /// Media ids with a completed purchase
    pub purchased: HashSet<String>,

    /// Highest tier among current subscriptions
    pub subscription_tier: Option<AccessTier>,
}

impl AccessContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn creator(mut self, is_creator: bool) -> Self {
        self.is_creator = is_creator;
        self
    }

    #[must_use]
    pub fn with_purchases(mut self, media_ids: impl IntoIterator<Item = String>) -> Self {
        self.purchased.extend(media_ids);
        self
    }

    /// Record the best tier among subscriptions that are active at `now`.
    #[must_use]
    pub fn with_subscriptions<'a>(
        mut self,
        now: DateTime<Utc>,
        subscriptions: impl IntoIterator<Item = (&'a Subscription, &'a Plan)>,
    ) -> Self {
        let best = subscriptions
            .into_iter()
            .filter(|(sub, _)| sub.is_current(now))
            .map(|(_, plan)| plan.access_tier)
            .max();
        self.subscription_tier = self.subscription_tier.max(best);
        self
    }
}

/// Whether a subscriber at `held` may see content at `required`
pub const fn tier_covers(held: AccessTier, required: AccessTier) -> bool {
    held.rank() >= required.rank()
}

/// Decide whether the user described by `ctx` may see `media`.
pub fn has_access(ctx: &AccessContext, media: &MediaContent) -> bool {
    if ctx.is_creator || ctx.purchased.contains(&media.id) {
        return true;
    }
    if media.access_tier == AccessTier::Free {
        return true;
    }
    ctx.subscription_tier
        .is_some_and(|held| tier_covers(held, media.access_tier))
}

/// The subset of `items` the user may see, in input order.
pub fn accessible<'a>(
    ctx: &AccessContext,
    items: impl IntoIterator<Item = &'a MediaContent>,
) -> Vec<&'a MediaContent> {
    items.into_iter().filter(|m| has_access(ctx, m)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BillingInterval, PaymentRail, SubscriptionStatus};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn media(id: &str, tier: AccessTier) -> MediaContent {
        MediaContent {
            id: id.into(),
            title: format!("{id} title"),
            access_tier: tier,
            price: Some(dec!(9.99)),
            is_purchaseable: true,
            content_url: format!("https://cdn.example.com/{id}"),
        }
    }

    fn plan(tier: AccessTier) -> Plan {
        Plan {
            id: format!("plan_{}", tier.as_str()),
            name: tier.as_str().into(),
            access_tier: tier,
            monthly_price: dec!(29.99),
            annual_price: dec!(299.99),
            is_active: true,
        }
    }

    fn subscription(plan: &Plan, status: SubscriptionStatus, end: DateTime<Utc>) -> Subscription {
        Subscription {
            id: "sub_1".into(),
            user_id: "fan".into(),
            plan_id: plan.id.clone(),
            provider: PaymentRail::Crypto,
            status,
            billing_interval: BillingInterval::Monthly,
            current_period_start: end - Duration::days(30),
            current_period_end: end,
            updated_at: end - Duration::days(30),
        }
    }

    #[test]
    fn test_free_content_is_open() {
        let ctx = AccessContext::new("fan");
        assert!(has_access(&ctx, &media("m1", AccessTier::Free)));
        assert!(!has_access(&ctx, &media("m2", AccessTier::Basic)));
    }

    #[test]
    fn test_purchase_grants_access_regardless_of_tier() {
        let ctx = AccessContext::new("fan").with_purchases(["m_vip".to_string()]);
        assert!(has_access(&ctx, &media("m_vip", AccessTier::Vip)));
        assert!(!has_access(&ctx, &media("other", AccessTier::Vip)));
    }

    #[test]
    fn test_creator_sees_everything() {
        let ctx = AccessContext::new("creator").creator(true);
        assert!(has_access(&ctx, &media("m", AccessTier::Vip)));
    }

    #[test]
    fn test_tier_monotonicity() {
        let now = Utc::now();
        for held in AccessTier::ALL {
            let p = plan(held);
            let sub = subscription(&p, SubscriptionStatus::Active, now + Duration::days(10));
            let ctx = AccessContext::new("fan").with_subscriptions(now, [(&sub, &p)]);
            for required in AccessTier::ALL {
                let expected = required <= held;
                assert_eq!(
                    has_access(&ctx, &media("m", required)),
                    expected,
                    "held {held:?} required {required:?}"
                );
            }
        }
    }

    #[test]
    fn test_inactive_or_lapsed_subscription_is_ignored() {
        let now = Utc::now();
        let p = plan(AccessTier::Vip);
        let canceled = subscription(&p, SubscriptionStatus::Canceled, now + Duration::days(10));
        let lapsed = subscription(&p, SubscriptionStatus::Active, now - Duration::days(1));
        let ctx = AccessContext::new("fan").with_subscriptions(now, [(&canceled, &p), (&lapsed, &p)]);
        assert_eq!(ctx.subscription_tier, None);
        assert!(!has_access(&ctx, &media("m", AccessTier::Basic)));
    }

    #[test]
    fn test_library_uses_same_rule() {
        let now = Utc::now();
        let p = plan(AccessTier::Basic);
        let sub = subscription(&p, SubscriptionStatus::Active, now + Duration::days(3));
        let ctx = AccessContext::new("fan")
            .with_purchases(["bought".to_string()])
            .with_subscriptions(now, [(&sub, &p)]);

        let items = vec![
            media("free", AccessTier::Free),
            media("basic", AccessTier::Basic),
            media("premium", AccessTier::Premium),
            media("bought", AccessTier::Vip),
        ];
        let ids: Vec<&str> = accessible(&ctx, &items).iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["free", "basic", "bought"]);
        for item in &items {
            assert_eq!(ids.contains(&item.id.as_str()), has_access(&ctx, item));
        }
    }
}
