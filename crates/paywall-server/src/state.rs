//! Application State

use std::sync::Arc;

use chrono::Duration;
use paywall_core::Actor;
use paywall_payments::{
    DbPool, Gateways, HttpAccountingSink, IntentConfig, IntentFactory, Library, Notifier,
    NowPaymentsGateway, Result, StatusPoller, StripeGateway, WebhookReconciler, WebhookSecrets,
    create_pool, poll::DEFAULT_REFRESH_AFTER_SECS,
};

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Creates PENDING payments and provider sessions
    pub intents: IntentFactory,

    /// Applies verified provider callbacks to the ledger
    pub webhooks: WebhookReconciler,

    /// Serves status polls
    pub poller: StatusPoller,

    /// Access-filtered catalog
    pub library: Library,

    /// Which rails are live
    pub gateways: Gateways,
}

impl AppState {
    /// Wire every component onto one ledger pool.
    pub fn new(
        pool: DbPool,
        gateways: Gateways,
        creator: Actor,
        secrets: WebhookSecrets,
        intent_config: IntentConfig,
        refresh_after: Duration,
    ) -> Self {
        Self {
            intents: IntentFactory::new(pool.clone(), gateways.clone(), creator.clone(), intent_config),
            webhooks: WebhookReconciler::new(pool.clone(), secrets),
            poller: StatusPoller::new(pool.clone(), gateways.clone(), refresh_after),
            library: Library::new(pool, creator),
            gateways,
        }
    }

    /// Build the state described by `config`: open the ledger and the configured gateways.
    pub fn from_config(config: &Config) -> Result<Self> {
        let pool = create_pool(&config.database_path)?;

        let mut gateways = Gateways::new();
        let mut secrets = WebhookSecrets::default();
        if let Some(card) = &config.card {
            gateways = gateways.with(Arc::new(StripeGateway::new(&card.checkout)));
            secrets.card_signing_secret.clone_from(&card.webhook_secret);
        }
        if let Some(crypto) = &config.crypto {
            gateways = gateways.with(Arc::new(NowPaymentsGateway::new(&crypto.api)?));
            secrets.crypto_ipn_secret.clone_from(&crypto.ipn_secret);
        }

        let intent_config = config
            .min_tip_amount
            .map_or_else(IntentConfig::default, |min_tip_amount| IntentConfig {
                min_tip_amount,
                ..IntentConfig::default()
            });
        let refresh_after = config
            .status_refresh
            .unwrap_or_else(|| Duration::seconds(DEFAULT_REFRESH_AFTER_SECS));

        let mut state = Self::new(
            pool,
            gateways,
            Actor::creator(config.creator_user_id.clone()),
            secrets,
            intent_config,
            refresh_after,
        );
        if let Some(url) = &config.accounting_webhook_url {
            state.webhooks = state.webhooks.with_sink(Arc::new(HttpAccountingSink::new(url.clone())));
        }
        Ok(state)
    }

    /// Entitlement events, for the chat transport
    pub fn notifier(&self) -> &Notifier {
        self.webhooks.notifier()
    }
}
