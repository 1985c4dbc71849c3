//! Content access through subscriptions, purchases and refunds.

mod common;

use common::*;
use paywall_core::Caller;
use rust_decimal_macros::dec;
use serde_json::json;

fn visible(env: &TestEnv, caller: &Caller) -> Vec<String> {
    let mut ids: Vec<String> = env
        .library
        .library(caller)
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    ids.sort();
    ids
}

async fn pay(env: &TestEnv, user: &str, body: serde_json::Value, amount: rust_decimal::Decimal) -> String {
    let intent = env.factory.create(&fan(user), request(body)).await.unwrap();
    let tx_id = env.crypto.tx_id_for(&intent.payment_id);
    let (body, sig) = crypto_ipn(&tx_id, "finished", amount);
    env.reconciler.handle_crypto(&body, Some(sig.as_str())).await.unwrap();
    tx_id
}

#[tokio::test]
async fn test_anonymous_fan_sees_free_content_only() {
    let env = setup();
    assert_eq!(visible(&env, &fan("fan_1")), vec!["free_clip"]);

    let locked = env.library.media(&fan("fan_1"), "vip_video").unwrap();
    assert!(!locked.has_access);
    assert!(locked.content_url.is_none());
    assert_eq!(locked.price, Some(dec!(12.50)));
}

#[tokio::test]
async fn test_creator_sees_everything() {
    let env = setup();
    assert_eq!(
        visible(&env, &fan(CREATOR)),
        vec!["basic_set", "free_clip", "premium_set", "vip_video"]
    );
}

#[tokio::test]
async fn test_subscription_unlocks_covered_tiers() {
    let env = setup();
    pay(
        &env,
        "fan_1",
        json!({"type": "SUBSCRIPTION", "provider": "CRYPTO", "planId": "gold", "billingInterval": "MONTHLY"}),
        dec!(29.99),
    )
    .await;

    assert_eq!(visible(&env, &fan("fan_1")), vec!["basic_set", "free_clip", "premium_set"]);
    let view = env.library.media(&fan("fan_1"), "premium_set").unwrap();
    assert!(view.has_access);
    assert_eq!(view.content_url.as_deref(), Some("https://cdn.example.com/premium_set"));

    // Vip is above the plan's tier
    assert!(!env.library.media(&fan("fan_1"), "vip_video").unwrap().has_access);
    // Other fans are unaffected
    assert_eq!(visible(&env, &fan("fan_2")), vec!["free_clip"]);
}

#[tokio::test]
async fn test_purchase_unlocks_item_and_refund_revokes() {
    let env = setup();
    let tx_id = pay(
        &env,
        "fan_1",
        json!({"type": "MEDIA_PURCHASE", "provider": "CRYPTO", "mediaId": "vip_video"}),
        dec!(12.50),
    )
    .await;
    assert_eq!(visible(&env, &fan("fan_1")), vec!["free_clip", "vip_video"]);

    let (body, sig) = crypto_ipn(&tx_id, "refunded", dec!(12.50));
    let outcome = env.reconciler.handle_crypto(&body, Some(sig.as_str())).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Applied { granted: false, .. }));
    assert_eq!(visible(&env, &fan("fan_1")), vec!["free_clip"]);
    assert!(!env.library.media(&fan("fan_1"), "vip_video").unwrap().has_access);

    // Buying it again after the refund is allowed
    pay(
        &env,
        "fan_1",
        json!({"type": "MEDIA_PURCHASE", "provider": "CRYPTO", "mediaId": "vip_video"}),
        dec!(12.50),
    )
    .await;
    assert!(env.library.media(&fan("fan_1"), "vip_video").unwrap().has_access);
    assert_eq!(count(&env.pool, "SELECT COUNT(*) FROM media_purchases"), 1);
}

#[tokio::test]
async fn test_refunded_subscription_loses_access() {
    let env = setup();
    let tx_id = pay(
        &env,
        "fan_1",
        json!({"type": "SUBSCRIPTION", "provider": "CRYPTO", "planId": "basic", "billingInterval": "MONTHLY"}),
        dec!(9.99),
    )
    .await;
    assert_eq!(visible(&env, &fan("fan_1")), vec!["basic_set", "free_clip"]);

    let (body, sig) = crypto_ipn(&tx_id, "refunded", dec!(9.99));
    env.reconciler.handle_crypto(&body, Some(sig.as_str())).await.unwrap();
    assert_eq!(visible(&env, &fan("fan_1")), vec!["free_clip"]);
}

#[tokio::test]
async fn test_unknown_media_is_not_found() {
    let env = setup();
    let err = env.library.media(&fan("fan_1"), "nope").unwrap_err();
    assert!(matches!(err, PaymentError::NotFound(_)));
}
