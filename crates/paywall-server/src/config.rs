//! Server Configuration
//!
//! Read once from the environment at startup. A payment rail whose
//! credentials are missing is left disabled rather than failing the boot.

use std::str::FromStr;

use chrono::Duration;
use paywall_payments::{NowPaymentsConfig, PaymentError, Result, StripeCheckoutConfig};
use rust_decimal::Decimal;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_DATABASE_PATH: &str = "paywall.db";
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3000";

/// Card rail settings
#[derive(Clone)]
pub struct CardRailConfig {
    pub checkout: StripeCheckoutConfig,
    pub webhook_secret: Option<String>,
}

/// Crypto rail settings
#[derive(Clone)]
pub struct CryptoRailConfig {
    pub api: NowPaymentsConfig,
    pub ipn_secret: Option<String>,
}

#[derive(Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_path: String,
    pub creator_user_id: String,
    pub public_base_url: String,
    pub card: Option<CardRailConfig>,
    pub crypto: Option<CryptoRailConfig>,
    pub accounting_webhook_url: Option<String>,
    pub min_tip_amount: Option<Decimal>,
    /// Staleness window for status polls
    pub status_refresh: Option<Duration>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_addr", &self.bind_addr)
            .field("database_path", &self.database_path)
            .field("creator_user_id", &self.creator_user_id)
            .field("public_base_url", &self.public_base_url)
            .field("card_enabled", &self.card.is_some())
            .field("crypto_enabled", &self.crypto.is_some())
            .field("accounting_webhook_url", &self.accounting_webhook_url)
            .finish_non_exhaustive()
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>> {
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| PaymentError::Config(format!("{name} is not valid: {raw}")))
        })
        .transpose()
}

impl Config {
    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create from any variable source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let creator_user_id = lookup("CREATOR_USER_ID")
            .ok_or_else(|| PaymentError::Config("CREATOR_USER_ID not set".into()))?;
        let public_base_url = lookup("PUBLIC_BASE_URL")
            .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.into())
            .trim_end_matches('/')
            .to_string();

        let card = lookup("STRIPE_SECRET_KEY").map(|secret_key| CardRailConfig {
            checkout: StripeCheckoutConfig {
                secret_key,
                public_base_url: public_base_url.clone(),
            },
            webhook_secret: lookup("STRIPE_WEBHOOK_SECRET"),
        });

        let crypto = lookup("NOWPAYMENTS_API_KEY").map(|api_key| CryptoRailConfig {
            api: NowPaymentsConfig {
                api_key,
                api_url: lookup("NOWPAYMENTS_API_URL"),
                ipn_callback_url: Some(format!("{public_base_url}/payments/webhook/crypto")),
            },
            ipn_secret: lookup("NOWPAYMENTS_IPN_SECRET"),
        });

        let min_tip_amount: Option<Decimal> = parsed(&lookup, "MIN_TIP_AMOUNT")?;
        if min_tip_amount.is_some_and(|m| m <= Decimal::ZERO) {
            return Err(PaymentError::Config("MIN_TIP_AMOUNT must be positive".into()));
        }

        let status_refresh = parsed::<i64>(&lookup, "STATUS_REFRESH_SECS")?
            .map(|secs| {
                Duration::try_seconds(secs)
                    .filter(|d| *d >= Duration::zero())
                    .ok_or_else(|| PaymentError::Config(format!("STATUS_REFRESH_SECS out of range: {secs}")))
            })
            .transpose()?;

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
            database_path: lookup("DATABASE_PATH").unwrap_or_else(|| DEFAULT_DATABASE_PATH.into()),
            creator_user_id,
            public_base_url,
            card,
            crypto,
            accounting_webhook_url: lookup("ACCOUNTING_WEBHOOK_URL"),
            min_tip_amount,
            status_refresh,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_minimal_config_disables_rails() {
        let cfg = config(&[("CREATOR_USER_ID", "creator")]).unwrap();
        assert_eq!(cfg.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(cfg.database_path, DEFAULT_DATABASE_PATH);
        assert!(cfg.card.is_none());
        assert!(cfg.crypto.is_none());
        assert!(cfg.min_tip_amount.is_none());
    }

    #[test]
    fn test_creator_is_required() {
        assert!(matches!(config(&[]), Err(PaymentError::Config(_))));
        assert!(matches!(
            config(&[("CREATOR_USER_ID", "  ")]),
            Err(PaymentError::Config(_))
        ));
    }

    #[test]
    fn test_rails_and_callback_url() {
        let cfg = config(&[
            ("CREATOR_USER_ID", "creator"),
            ("PUBLIC_BASE_URL", "https://paywall.example.com/"),
            ("STRIPE_SECRET_KEY", "sk_test"),
            ("STRIPE_WEBHOOK_SECRET", "whsec"),
            ("NOWPAYMENTS_API_KEY", "np_key"),
            ("STATUS_REFRESH_SECS", "10"),
            ("MIN_TIP_AMOUNT", "2.50"),
        ])
        .unwrap();

        let card = cfg.card.unwrap();
        assert_eq!(card.checkout.public_base_url, "https://paywall.example.com");
        assert_eq!(card.webhook_secret.as_deref(), Some("whsec"));

        let crypto = cfg.crypto.unwrap();
        assert_eq!(
            crypto.api.ipn_callback_url.as_deref(),
            Some("https://paywall.example.com/payments/webhook/crypto")
        );
        assert!(crypto.ipn_secret.is_none());
        assert_eq!(cfg.status_refresh, Some(Duration::seconds(10)));
        assert_eq!(cfg.min_tip_amount, Some(Decimal::new(250, 2)));
    }

    #[test]
    fn test_bad_numbers_are_rejected() {
        assert!(config(&[("CREATOR_USER_ID", "c"), ("STATUS_REFRESH_SECS", "soon")]).is_err());
        assert!(config(&[("CREATOR_USER_ID", "c"), ("MIN_TIP_AMOUNT", "0")]).is_err());
        assert!(config(&[("CREATOR_USER_ID", "c"), ("STATUS_REFRESH_SECS", "-5")]).is_err());
    }

    #[test]
    fn test_refresh_window_beyond_chrono_range_is_a_config_error() {
        let err = config(&[("CREATOR_USER_ID", "c"), ("STATUS_REFRESH_SECS", &i64::MAX.to_string())])
            .unwrap_err();
        assert!(matches!(err, PaymentError::Config(_)));
    }
}
