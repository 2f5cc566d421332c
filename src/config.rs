//! Typed, validated environment loading (A1). Every component that needs a
//! runtime-configurable value reads it from `AppConfig`, loaded once at
//! startup, instead of calling `std::env::var` at arbitrary call sites.
//!
//! Missing variables that a reachable feature genuinely requires fail fast
//! with [`crate::error::AppError`]'s `ConfigMissing` kind rather than
//! surfacing as a confusing downstream error the first time that feature is
//! exercised.

use std::env;
use std::time::Duration;

use crate::error::{AppError, AppErrorKind, InfrastructureError};

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn required(key: &str) -> Result<String, AppError> {
    env_var(key).ok_or_else(|| {
        AppError::new(
            AppErrorKind::Infrastructure(InfrastructureError::ConfigMissing {
                variable: key.to_string(),
            }),
            format!("required environment variable {key} is not set"),
        )
        .with_status_code(axum::http::StatusCode::SERVICE_UNAVAILABLE)
    })
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Top-level application configuration, loaded once in `main` and shared
/// behind an `Arc` with every handler and background task.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub node_env: String,
    pub allowed_origin: String,
    pub database_url: String,
    pub redis_url: Option<String>,
    pub self_base_url: String,

    pub rate_limit_window_ms: u64,
    pub rate_limit_max: u32,

    pub price: PriceConfig,
    pub offramp: OfframpConfig,
    pub indexer: IndexerConfig,
    pub internal_api_key: Option<String>,
    pub lenco: Option<LencoConfig>,
    pub monnify: Option<MonnifyConfig>,
}

#[derive(Debug, Clone)]
pub struct PriceConfig {
    pub coingecko_api_url: String,
    pub cache_ttl: Duration,
    pub stale_ttl: Duration,
    pub base_backoff: Duration,
    pub emergency_usd_ngn: f64,
    pub emergency_stx_usd: f64,
    pub emergency_usdc_usd: f64,
}

#[derive(Debug, Clone)]
pub struct OfframpConfig {
    pub flat_fee_ngn: i64,
    pub min_token: f64,
    pub max_token: f64,
    pub min_buffer_ngn: i64,
    pub expiry_minutes: i64,
    pub underdelivery_policy: UnderDeliveryPolicy,
    pub confirmation_blocks: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnderDeliveryPolicy {
    AcceptAndFlag,
    Reject,
}

impl UnderDeliveryPolicy {
    fn from_env() -> Self {
        match env_var("OFFRAMP_UNDERDELIVERY_POLICY").as_deref() {
            Some("reject") => Self::Reject,
            _ => Self::AcceptAndFlag,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub poll_interval: Duration,
    pub history_limit: u32,
    pub platform_stx_address: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LencoConfig {
    pub api_key: String,
    pub account_id: String,
    pub webhook_secret: String,
    pub min_balance_ngn: i64,
}

#[derive(Debug, Clone)]
pub struct MonnifyConfig {
    pub api_key: String,
    pub contract_code: String,
    pub webhook_secret: String,
}

impl AppConfig {
    /// Load configuration from the process environment (after `dotenv` has
    /// populated it in development). Fails fast only on variables required
    /// by a feature that is actually reachable — e.g. Lenco credentials are
    /// optional at the type level and checked again when the offramp HTTP
    /// routes are wired, per A1.
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = required("DATABASE_URL")?;

        Ok(Self {
            port: parse_env("PORT", 3000),
            node_env: env_var("NODE_ENV").unwrap_or_else(|| "development".to_string()),
            allowed_origin: env_var("ALLOWED_ORIGIN").unwrap_or_else(|| "*".to_string()),
            database_url,
            redis_url: env_var("REDIS_URL"),
            self_base_url: env_var("SELF_BASE_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),

            rate_limit_window_ms: parse_env("RATE_LIMIT_WINDOW_MS", 60_000),
            rate_limit_max: parse_env("RATE_LIMIT_MAX", 100),

            price: PriceConfig {
                coingecko_api_url: env_var("COINGECKO_API_URL")
                    .unwrap_or_else(|| "https://api.coingecko.com/api/v3".to_string()),
                cache_ttl: Duration::from_millis(parse_env("PRICE_CACHE_TTL_MS", 60_000)),
                stale_ttl: Duration::from_millis(parse_env("PRICE_STALE_TTL_MS", 300_000)),
                base_backoff: Duration::from_millis(parse_env("PRICE_BASE_BACKOFF_MS", 1_000)),
                emergency_usd_ngn: parse_env("EMERGENCY_USD_NGN", 1_600.0),
                emergency_stx_usd: parse_env("EMERGENCY_STX_USD", 1.8),
                emergency_usdc_usd: parse_env("EMERGENCY_USDC_USD", 1.0),
            },

            offramp: OfframpConfig {
                flat_fee_ngn: parse_env("OFFRAMP_FLAT_FEE_NGN", 100),
                min_token: parse_env("OFFRAMP_MIN_TOKEN", 1.0),
                max_token: parse_env("OFFRAMP_MAX_TOKEN", 100_000.0),
                min_buffer_ngn: parse_env("LENCO_MIN_BALANCE_NGN", 5_000),
                expiry_minutes: parse_env("OFFRAMP_EXPIRY_MINUTES", 30),
                underdelivery_policy: UnderDeliveryPolicy::from_env(),
                confirmation_blocks: parse_env("CONFIRMATION_BLOCKS", 0),
            },

            indexer: IndexerConfig {
                poll_interval: Duration::from_millis(parse_env("INDEXER_POLL_INTERVAL_MS", 20_000)),
                history_limit: parse_env("INDEXER_HISTORY_LIMIT", 50),
                platform_stx_address: env_var("PLATFORM_STX_ADDRESS"),
            },

            internal_api_key: env_var("INTERNAL_API_KEY"),

            lenco: match (
                env_var("LENCO_API_KEY"),
                env_var("LENCO_ACCOUNT_ID"),
                env_var("LENCO_WEBHOOK_SECRET"),
            ) {
                (Some(api_key), Some(account_id), Some(webhook_secret)) => Some(LencoConfig {
                    api_key,
                    account_id,
                    webhook_secret,
                    min_balance_ngn: parse_env("LENCO_MIN_BALANCE_NGN", 5_000),
                }),
                _ => None,
            },

            monnify: match (
                env_var("MONNIFY_API_KEY"),
                env_var("MONNIFY_CONTRACT_CODE"),
                env_var("MONNIFY_WEBHOOK_SECRET"),
            ) {
                (Some(api_key), Some(contract_code), Some(webhook_secret)) => Some(MonnifyConfig {
                    api_key,
                    contract_code,
                    webhook_secret,
                }),
                _ => None,
            },
        })
    }

    pub fn is_production(&self) -> bool {
        self.node_env.eq_ignore_ascii_case("production")
    }

    /// The indexer (C6) only runs when a deposit address and internal key
    /// are both configured, per spec §4.6.
    pub fn indexer_enabled(&self) -> bool {
        self.indexer.platform_stx_address.is_some() && self.internal_api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_env() {
        for key in [
            "DATABASE_URL",
            "PORT",
            "OFFRAMP_UNDERDELIVERY_POLICY",
            "PLATFORM_STX_ADDRESS",
            "INTERNAL_API_KEY",
            "LENCO_API_KEY",
            "LENCO_ACCOUNT_ID",
            "LENCO_WEBHOOK_SECRET",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn missing_database_url_fails_fast() {
        clear_env();
        let err = AppConfig::from_env().unwrap_err();
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn defaults_apply_when_unset() {
        clear_env();
        env::set_var("DATABASE_URL", "postgres://localhost/test");
        let cfg = AppConfig::from_env().unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.offramp.flat_fee_ngn, 100);
        assert_eq!(cfg.offramp.underdelivery_policy, UnderDeliveryPolicy::AcceptAndFlag);
        assert!(!cfg.indexer_enabled());
        env::remove_var("DATABASE_URL");
    }

    #[test]
    fn indexer_enabled_requires_both_vars() {
        clear_env();
        env::set_var("DATABASE_URL", "postgres://localhost/test");
        env::set_var("PLATFORM_STX_ADDRESS", "ST2CY5V39NHDPWSXMW9QDT3HC3GD6Q6XX4CFRK9AG");
        env::set_var("INTERNAL_API_KEY", "secret");
        let cfg = AppConfig::from_env().unwrap();
        assert!(cfg.indexer_enabled());
        clear_env();
    }
}
