//! Router tests: status codes and JSON shapes over mock gateways.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, Utc};
use paywall_core::{AccessTier, Actor, MediaContent, PaymentRail};
use paywall_payments::{
    Gateways, IntentConfig, MockGateway, WebhookSecrets, create_pool, db::queries, signature,
};
use paywall_server::{AppState, router};
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use tower::ServiceExt;

const IPN_SECRET: &str = "ipn_secret";
const CARD_SECRET: &str = "whsec_secret";

struct TestApp {
    app: Router,
    crypto: Arc<MockGateway>,
    path: PathBuf,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut p = self.path.clone().into_os_string();
            p.push(suffix);
            let _ = std::fs::remove_file(p);
        }
    }
}

fn test_app() -> TestApp {
    let path = std::env::temp_dir().join(format!("paywall-api-{}.db", uuid::Uuid::new_v4()));
    let pool = create_pool(path.to_str().unwrap()).unwrap();
    {
        let conn = pool.get().unwrap();
        queries::insert_media(
            &conn,
            &MediaContent {
                id: "clip".into(),
                title: "Clip".into(),
                access_tier: AccessTier::Premium,
                price: Some(dec!(4.99)),
                is_purchaseable: true,
                content_url: "https://cdn.example.com/clip".into(),
            },
        )
        .unwrap();
    }

    let crypto = Arc::new(MockGateway::new(PaymentRail::Crypto));
    let state = AppState::new(
        pool,
        Gateways::new().with(crypto.clone()),
        Actor::creator("creator"),
        WebhookSecrets {
            crypto_ipn_secret: Some(IPN_SECRET.into()),
            card_signing_secret: Some(CARD_SECRET.into()),
        },
        IntentConfig::default(),
        Duration::seconds(30),
    );

    TestApp {
        app: router(state),
        crypto,
        path,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn get(uri: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, user: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-user-id", user)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn crypto_webhook(provider_tx_id: &str, status: &str, secret: &str) -> Request<Body> {
    let body = serde_json::to_vec(&json!({
        "payment_id": provider_tx_id,
        "payment_status": status,
        "price_amount": "4.99",
        "price_currency": "usd"
    }))
    .unwrap();
    let sig = signature::sign_crypto(secret, &body).unwrap();
    Request::builder()
        .method("POST")
        .uri("/payments/webhook/crypto")
        .header("x-nowpayments-sig", sig)
        .body(Body::from(body))
        .unwrap()
}

async fn buy_clip(app: &Router, user: &str) -> String {
    let (status, body) = send(
        app,
        post_json(
            "/payments/intent",
            user,
            &json!({"type": "MEDIA_PURCHASE", "provider": "CRYPTO", "mediaId": "clip"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["paymentId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let t = test_app();
    let (status, body) = send(&t.app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["crypto_enabled"], true);
    assert_eq!(body["card_enabled"], false);
}

#[tokio::test]
async fn test_missing_caller_is_unauthorized() {
    let t = test_app();
    let (status, body) = send(&t.app, get("/library", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn test_intent_purchase_and_access_flow() {
    let t = test_app();

    let (_, media) = send(&t.app, get("/media/clip", Some("fan"))).await;
    assert_eq!(media["hasAccess"], false);
    assert!(media.get("contentUrl").is_none());

    let payment_id = buy_clip(&t.app, "fan").await;
    let (status, view) = send(&t.app, get(&format!("/payments/{payment_id}/status"), Some("fan"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "PENDING");

    let tx_id = t.crypto.tx_id_for(&payment_id);
    let (status, outcome) = send(&t.app, crypto_webhook(&tx_id, "finished", IPN_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["outcome"], "applied");
    assert_eq!(outcome["to"], "COMPLETED");

    // Replay is a 200 no-op
    let (status, outcome) = send(&t.app, crypto_webhook(&tx_id, "finished", IPN_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["outcome"], "unchanged");

    let (_, media) = send(&t.app, get("/media/clip", Some("fan"))).await;
    assert_eq!(media["hasAccess"], true);
    assert_eq!(media["contentUrl"], "https://cdn.example.com/clip");

    let (_, library) = send(&t.app, get("/library", Some("fan"))).await;
    assert_eq!(library["items"].as_array().unwrap().len(), 1);

    let (status, body) = send(
        &t.app,
        post_json(
            "/payments/intent",
            "fan",
            &json!({"type": "MEDIA_PURCHASE", "provider": "CRYPTO", "mediaId": "clip"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ALREADY_OWNED");
}

#[tokio::test]
async fn test_intent_error_statuses() {
    let t = test_app();

    let (status, body) = send(
        &t.app,
        post_json("/payments/intent", "fan", &json!({"type": "TIP", "provider": "CRYPTO", "amount": "0.10"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_AMOUNT");

    let (status, body) = send(
        &t.app,
        post_json("/payments/intent", "fan", &json!({"type": "TIP", "provider": "CARD", "amount": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body.get("retryable").is_none());

    let (status, body) = send(
        &t.app,
        post_json("/payments/intent", "fan", &json!({"type": "LIFETIME", "provider": "CRYPTO"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");

    t.crypto.set_failing(true);
    let (status, body) = send(
        &t.app,
        post_json("/payments/intent", "fan", &json!({"type": "TIP", "provider": "CRYPTO", "amount": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "PROVIDER_ERROR");
    assert_eq!(body["retryable"], true);
}

#[tokio::test]
async fn test_webhook_error_statuses() {
    let t = test_app();
    let payment_id = buy_clip(&t.app, "fan").await;
    let tx_id = t.crypto.tx_id_for(&payment_id);

    let (status, body) = send(&t.app, crypto_webhook(&tx_id, "finished", "wrong_secret")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_SIGNATURE");

    let (status, body) = send(&t.app, crypto_webhook("np_unknown", "finished", IPN_SECRET)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "PAYMENT_NOT_FOUND");

    // Card rail: signed but irrelevant event types are acknowledged
    let body = br#"{"id":"evt_1","type":"invoice.created","data":{"object":{"id":"in_1"}}}"#;
    let header = signature::card_signature_header(CARD_SECRET, body, Utc::now().timestamp()).unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/payments/webhook/card")
        .header("stripe-signature", header)
        .body(Body::from(body.to_vec()))
        .unwrap();
    let (status, outcome) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["outcome"], "ignored");

    let (_, view) = send(&t.app, get(&format!("/payments/{payment_id}/status"), Some("fan"))).await;
    assert_eq!(view["status"], "PENDING");
}

#[tokio::test]
async fn test_status_is_private_to_payer() {
    let t = test_app();
    let payment_id = buy_clip(&t.app, "fan").await;
    let (status, body) = send(&t.app, get(&format!("/payments/{payment_id}/status"), Some("other"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "PAYMENT_NOT_FOUND");

    let (status, _) = send(&t.app, get("/media/missing", Some("fan"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
