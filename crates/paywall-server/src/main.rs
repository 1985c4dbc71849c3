//! creator-paywall HTTP Server

use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paywall_core::PaymentRail;
use paywall_server::{AppState, Config, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(?config, "Configuration loaded");

    let state = AppState::from_config(&config)?;
    for (rail, hint) in [
        (PaymentRail::Card, "STRIPE_SECRET_KEY"),
        (PaymentRail::Crypto, "NOWPAYMENTS_API_KEY"),
    ] {
        if state.gateways.is_enabled(rail) {
            tracing::info!(%rail, "Payment rail enabled");
        } else {
            tracing::warn!(%rail, "Payment rail disabled, set {hint} to enable");
        }
    }
    if config.card.as_ref().is_some_and(|c| c.webhook_secret.is_none()) {
        tracing::warn!("STRIPE_WEBHOOK_SECRET not set, card webhooks will be rejected");
    }
    if config.crypto.as_ref().is_some_and(|c| c.ipn_secret.is_none()) {
        tracing::warn!("NOWPAYMENTS_IPN_SECRET not set, crypto webhooks will be rejected");
    }

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "creator-paywall server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
