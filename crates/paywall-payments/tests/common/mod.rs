//! Test utilities and fixtures for paywall-payments integration tests

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use paywall_core::{AccessTier, Actor, Caller, MediaContent, PaymentRail, Plan};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub use paywall_payments::db::queries;
pub use paywall_payments::db::queries::NewMessage;
pub use paywall_payments::signature;
pub use paywall_payments::{
    DbPool, Gateways, IntentConfig, IntentFactory, IntentRequest, Library, MockGateway, Notifier,
    PaymentError, ReconcileOutcome, StatusPoller, WebhookReconciler, WebhookSecrets, create_pool,
};

pub const IPN_SECRET: &str = "test_ipn_secret";
pub const CARD_SECRET: &str = "whsec_test_secret";
pub const CREATOR: &str = "creator_1";

/// A file-backed ledger plus every engine component wired to mock gateways.
///
/// File-backed so that pooled connections share one database.
pub struct TestEnv {
    pub path: PathBuf,
    pub pool: DbPool,
    pub crypto: Arc<MockGateway>,
    pub card: Arc<MockGateway>,
    pub notifier: Notifier,
    pub factory: IntentFactory,
    pub reconciler: WebhookReconciler,
    pub poller: StatusPoller,
    pub library: Library,
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut p = self.path.clone().into_os_string();
            p.push(suffix);
            let _ = std::fs::remove_file(p);
        }
    }
}

pub fn setup() -> TestEnv {
    let path = std::env::temp_dir().join(format!("paywall-test-{}.db", uuid::Uuid::new_v4()));
    let pool = create_pool(path.to_str().expect("utf-8 temp path")).expect("Failed to create pool");
    seed_catalog(&pool);

    let crypto = Arc::new(MockGateway::new(PaymentRail::Crypto));
    let card = Arc::new(MockGateway::new(PaymentRail::Card));
    let gateways = Gateways::new().with(crypto.clone()).with(card.clone());
    let creator = Actor::creator(CREATOR);
    let notifier = Notifier::default();

    TestEnv {
        factory: IntentFactory::new(pool.clone(), gateways.clone(), creator.clone(), IntentConfig::default()),
        reconciler: WebhookReconciler::new(
            pool.clone(),
            WebhookSecrets {
                crypto_ipn_secret: Some(IPN_SECRET.into()),
                card_signing_secret: Some(CARD_SECRET.into()),
            },
        )
        .with_notifier(notifier.clone()),
        poller: StatusPoller::new(pool.clone(), gateways, Duration::seconds(30)),
        library: Library::new(pool.clone(), creator),
        notifier,
        crypto,
        card,
        pool,
        path,
    }
}

fn media(id: &str, tier: AccessTier, price: Option<Decimal>) -> MediaContent {
    MediaContent {
        id: id.into(),
        title: format!("{id} title"),
        access_tier: tier,
        price,
        is_purchaseable: price.is_some(),
        content_url: format!("https://cdn.example.com/{id}"),
    }
}

fn seed_catalog(pool: &DbPool) {
    let conn = pool.get().unwrap();
    for (id, tier, monthly, annual) in [
        ("basic", AccessTier::Basic, dec!(9.99), dec!(99.99)),
        ("gold", AccessTier::Premium, dec!(29.99), dec!(299.99)),
    ] {
        queries::insert_plan(
            &conn,
            &Plan {
                id: id.into(),
                name: id.to_uppercase(),
                access_tier: tier,
                monthly_price: monthly,
                annual_price: annual,
                is_active: true,
            },
        )
        .unwrap();
    }

    queries::insert_media(&conn, &media("free_clip", AccessTier::Free, None)).unwrap();
    queries::insert_media(&conn, &media("basic_set", AccessTier::Basic, None)).unwrap();
    queries::insert_media(&conn, &media("premium_set", AccessTier::Premium, Some(dec!(15.00)))).unwrap();
    queries::insert_media(&conn, &media("vip_video", AccessTier::Vip, Some(dec!(12.50)))).unwrap();

    queries::insert_message(
        &conn,
        &NewMessage {
            id: "ppv_msg",
            sender_id: CREATOR,
            is_ppv: true,
            ppv_price: Some(dec!(7.00)),
        },
    )
    .unwrap();
    queries::insert_message(
        &conn,
        &NewMessage {
            id: "chat_msg",
            sender_id: CREATOR,
            is_ppv: false,
            ppv_price: None,
        },
    )
    .unwrap();
}

pub fn fan(id: &str) -> Caller {
    Caller::new(id)
}

pub fn request(json: serde_json::Value) -> IntentRequest {
    serde_json::from_value(json).expect("valid intent request")
}

/// A signed crypto IPN body and its signature
pub fn crypto_ipn(provider_tx_id: &str, status: &str, amount: Decimal) -> (Vec<u8>, String) {
    let body = serde_json::to_vec(&serde_json::json!({
        "payment_id": provider_tx_id,
        "payment_status": status,
        "pay_address": "mock_address",
        "price_amount": amount,
        "price_currency": "usd",
        "pay_amount": amount,
        "actually_paid": amount,
        "pay_currency": "usdttrc20",
        "order_id": "ignored",
        "outcome_amount": amount,
        "outcome_currency": "usdttrc20"
    }))
    .unwrap();
    let sig = signature::sign_crypto(IPN_SECRET, &body).unwrap();
    (body, sig)
}

/// A signed card event body and its `stripe-signature` header
pub fn card_event(event_type: &str, object: serde_json::Value) -> (Vec<u8>, String) {
    let body = serde_json::to_vec(&serde_json::json!({
        "id": format!("evt_{}", uuid::Uuid::new_v4().simple()),
        "type": event_type,
        "data": { "object": object }
    }))
    .unwrap();
    let header = signature::card_signature_header(CARD_SECRET, &body, Utc::now().timestamp()).unwrap();
    (body, header)
}

pub fn count(pool: &DbPool, sql: &str) -> i64 {
    let conn = pool.get().unwrap();
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

pub fn payment_status(pool: &DbPool, payment_id: &str) -> String {
    let conn = pool.get().unwrap();
    conn.query_row(
        "SELECT status FROM payments WHERE id = ?1",
        [payment_id],
        |row| row.get(0),
    )
    .unwrap()
}
