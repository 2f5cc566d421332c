//! Price Oracle Cache (C1): the single source of NGN/USD/token prices.
//! Warm cache with TTL states, single-flight refresh, 429 backoff, and an
//! emergency-constant fallback so `get_current` never fails (§4.1).
//!
//! Grounded on the `get_cached_btc_naira_rate` Redis-TTL pattern in
//! `other_examples/.../fiat_service.rs`, generalized from a single BTC/NGN
//! rate to the STX+USDC composite snapshot this spec needs, and on the
//! teacher's single-writer in-memory state discipline (§5) — this is a
//! `tokio::sync::RwLock` over the cached snapshot plus a `tokio::sync::Mutex`
//! guarding the refresh path, rather than the teacher's Redis-backed rate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, warn};

use crate::config::PriceConfig;
use crate::database::{PriceSnapshotRepository, Token};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPrice {
    pub price_usd: f64,
    pub price_ngn: f64,
    pub change_24h_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSnapshotView {
    pub stx: TokenPrice,
    pub usdc: TokenPrice,
    pub usd_to_ngn: f64,
    pub from_cache: bool,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
struct CachedState {
    snapshot: PriceSnapshotView,
    last_fetched: Instant,
}

#[derive(Debug, Default)]
struct BackoffState {
    failures: u32,
    until: Option<Instant>,
}

pub struct PriceOracleCache {
    http: Client,
    config: PriceConfig,
    state: RwLock<Option<CachedState>>,
    refresh_lock: Mutex<()>,
    backoff: Mutex<BackoffState>,
    snapshots: Option<Arc<PriceSnapshotRepository>>,
}

const COINGECKO_STX_ID: &str = "blockstack";
const COINGECKO_USDC_ID: &str = "usd-coin";

impl PriceOracleCache {
    pub fn new(config: PriceConfig, snapshots: Option<Arc<PriceSnapshotRepository>>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(12))
            .build()
            .expect("failed to build oracle HTTP client");
        Self {
            http,
            config,
            state: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            backoff: Mutex::new(BackoffState::default()),
            snapshots,
        }
    }

    fn emergency_snapshot(&self) -> PriceSnapshotView {
        PriceSnapshotView {
            stx: TokenPrice {
                price_usd: self.config.emergency_stx_usd,
                price_ngn: self.config.emergency_stx_usd * self.config.emergency_usd_ngn,
                change_24h_pct: 0.0,
            },
            usdc: TokenPrice {
                price_usd: self.config.emergency_usdc_usd,
                price_ngn: self.config.emergency_usdc_usd * self.config.emergency_usd_ngn,
                change_24h_pct: 0.0,
            },
            usd_to_ngn: self.config.emergency_usd_ngn,
            from_cache: false,
            fetched_at: chrono::Utc::now(),
        }
    }

    /// `GetCurrent() -> {STX, USDC, usdToNgn, fromCache}`. Never fails
    /// (§4.1/§8 invariant 4): every path terminates in a well-formed
    /// snapshot, worst case the emergency constants.
    pub async fn get_current(&self) -> PriceSnapshotView {
        let cached = self.state.read().await.clone();

        let Some(cached) = cached else {
            return self.refresh_or_fallback(None).await;
        };

        let age = cached.last_fetched.elapsed();
        if age < self.config.cache_ttl {
            return cached.snapshot;
        }
        if age < self.config.stale_ttl {
            return self.refresh_or_fallback(Some(cached.snapshot)).await;
        }
        self.refresh_or_fallback(Some(cached.snapshot)).await
    }

    async fn refresh_or_fallback(&self, stale: Option<PriceSnapshotView>) -> PriceSnapshotView {
        if self.in_backoff().await {
            return self.stale_or_emergency(stale);
        }

        let _permit = self.refresh_lock.lock().await;

        // Re-check after acquiring the lock: a concurrent caller may have
        // already refreshed while we waited (single-flight, §4.1).
        if let Some(cached) = self.state.read().await.clone() {
            if cached.last_fetched.elapsed() < self.config.cache_ttl {
                return cached.snapshot;
            }
        }

        match self.fetch_upstream().await {
            Ok(snapshot) => {
                self.reset_backoff().await;
                self.persist_best_effort(&snapshot).await;
                *self.state.write().await = Some(CachedState {
                    snapshot: snapshot.clone(),
                    last_fetched: Instant::now(),
                });
                snapshot
            }
            Err(FetchError::TooManyRequests) => {
                self.record_backoff_failure().await;
                self.stale_or_emergency(stale)
            }
            Err(FetchError::Other) => self.stale_or_emergency(stale),
        }
    }

    fn stale_or_emergency(&self, stale: Option<PriceSnapshotView>) -> PriceSnapshotView {
        match stale {
            Some(mut snapshot) => {
                snapshot.from_cache = true;
                snapshot
            }
            None => self.emergency_snapshot(),
        }
    }

    async fn in_backoff(&self) -> bool {
        let backoff = self.backoff.lock().await;
        match backoff.until {
            Some(until) => Instant::now() < until,
            None => false,
        }
    }

    async fn record_backoff_failure(&self) {
        let mut backoff = self.backoff.lock().await;
        backoff.failures += 1;
        let delay = self.config.base_backoff * 2u32.pow(backoff.failures.saturating_sub(1).min(8));
        let delay = delay.min(Duration::from_secs(5 * 60));
        backoff.until = Some(Instant::now() + delay);
        warn!(failures = backoff.failures, delay_secs = delay.as_secs(), "oracle entering backoff after 429");
    }

    async fn reset_backoff(&self) {
        let mut backoff = self.backoff.lock().await;
        backoff.failures = 0;
        backoff.until = None;
    }

    async fn persist_best_effort(&self, snapshot: &PriceSnapshotView) {
        let Some(repo) = &self.snapshots else { return };
        for (token, price) in [(Token::Stx, &snapshot.stx), (Token::Usdc, &snapshot.usdc)] {
            if let Err(e) = repo.insert(token, price.price_usd, price.price_ngn, snapshot.usd_to_ngn).await {
                warn!(error = %e, "failed to persist price snapshot, continuing (storage is best-effort)");
            }
        }
    }

    async fn fetch_upstream(&self) -> Result<PriceSnapshotView, FetchError> {
        let url = format!(
            "{}/simple/price?ids={},{}&vs_currencies=usd,ngn&include_24hr_change=true",
            self.config.coingecko_api_url, COINGECKO_STX_ID, COINGECKO_USDC_ID
        );
        let response = self.http.get(&url).send().await.map_err(|e| {
            error!(error = %e, "oracle upstream request failed");
            FetchError::Other
        })?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::TooManyRequests);
        }
        if !response.status().is_success() {
            warn!(status = %response.status(), "oracle upstream returned non-success status");
            return Err(FetchError::Other);
        }

        let body: Value = response.json().await.map_err(|_| FetchError::Other)?;
        self.parse_body(&body).ok_or(FetchError::Other)
    }

    fn parse_body(&self, body: &Value) -> Option<PriceSnapshotView> {
        let stx = body.get(COINGECKO_STX_ID)?;
        let usdc = body.get(COINGECKO_USDC_ID)?;

        let stx_price = TokenPrice {
            price_usd: stx.get("usd")?.as_f64()?,
            price_ngn: stx.get("ngn")?.as_f64()?,
            change_24h_pct: stx.get("usd_24h_change").and_then(|v| v.as_f64()).unwrap_or(0.0),
        };
        let usdc_price = TokenPrice {
            price_usd: usdc.get("usd")?.as_f64()?,
            price_ngn: usdc.get("ngn")?.as_f64()?,
            change_24h_pct: usdc.get("usd_24h_change").and_then(|v| v.as_f64()).unwrap_or(0.0),
        };

        // Preferred source for usdToNgn: the stablecoin's NGN price; falls
        // back to USDC's own NGN price (§4.1) — since USDC *is* the
        // stablecoin here they coincide, but the fallback chain is kept
        // explicit for when a dedicated NGN stablecoin id is configured.
        let usd_to_ngn = if usdc_price.price_usd > 0.0 {
            usdc_price.price_ngn / usdc_price.price_usd
        } else {
            self.config.emergency_usd_ngn
        };

        Some(PriceSnapshotView {
            stx: stx_price,
            usdc: usdc_price,
            usd_to_ngn,
            from_cache: false,
            fetched_at: chrono::Utc::now(),
        })
    }

    /// Forces an upstream refetch regardless of cache TTL (but not the
    /// single-flight lock or backoff window — a forced refresh still backs
    /// off after a 429 like any other caller). Used by the admin-gated
    /// refresh endpoint (§6).
    pub async fn force_refresh(&self) -> PriceSnapshotView {
        let stale = self.state.read().await.clone().map(|c| c.snapshot);

        if self.in_backoff().await {
            return self.stale_or_emergency(stale);
        }

        let _permit = self.refresh_lock.lock().await;

        match self.fetch_upstream().await {
            Ok(snapshot) => {
                self.reset_backoff().await;
                self.persist_best_effort(&snapshot).await;
                *self.state.write().await = Some(CachedState {
                    snapshot: snapshot.clone(),
                    last_fetched: Instant::now(),
                });
                snapshot
            }
            Err(FetchError::TooManyRequests) => {
                self.record_backoff_failure().await;
                self.stale_or_emergency(stale)
            }
            Err(FetchError::Other) => self.stale_or_emergency(stale),
        }
    }

    /// `GetHistory(token, hours) -> [PriceSnapshot]`, capped at 7 days by the
    /// HTTP handler (§6).
    pub async fn get_history(
        &self,
        token: Token,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Vec<crate::database::PriceSnapshot> {
        match &self.snapshots {
            Some(repo) => repo.history(token, since).await.unwrap_or_else(|e| {
                debug!(error = %e, "failed to read price history");
                Vec::new()
            }),
            None => Vec::new(),
        }
    }

    /// `rate(token) -> NGN per whole token`, used by the settlement engine's
    /// quote computation (§4.8 step 3).
    pub fn rate_for(snapshot: &PriceSnapshotView, token: Token) -> f64 {
        match token {
            Token::Stx => snapshot.stx.price_ngn,
            Token::Usdc => snapshot.usdc.price_ngn,
        }
    }
}

enum FetchError {
    TooManyRequests,
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> PriceConfig {
        PriceConfig {
            coingecko_api_url: "https://example.invalid".to_string(),
            cache_ttl: Duration::from_secs(60),
            stale_ttl: Duration::from_secs(300),
            base_backoff: Duration::from_secs(1),
            emergency_usd_ngn: 1_600.0,
            emergency_stx_usd: 1.8,
            emergency_usdc_usd: 1.0,
        }
    }

    #[tokio::test]
    async fn emergency_snapshot_is_well_formed_and_positive() {
        let cache = PriceOracleCache::new(test_config(), None);
        let snapshot = cache.emergency_snapshot();
        assert!(snapshot.stx.price_ngn > 0.0);
        assert!(snapshot.usdc.price_ngn > 0.0);
        assert_eq!(snapshot.usd_to_ngn, 1_600.0);
        assert!(!snapshot.from_cache);
    }

    #[tokio::test]
    async fn parses_coingecko_shape() {
        let cache = PriceOracleCache::new(test_config(), None);
        let body = serde_json::json!({
            "blockstack": {"usd": 1.9, "ngn": 3040.0, "usd_24h_change": 2.1},
            "usd-coin": {"usd": 1.0, "ngn": 1600.0, "usd_24h_change": 0.01},
        });
        let snapshot = cache.parse_body(&body).unwrap();
        assert_eq!(snapshot.stx.price_usd, 1.9);
        assert_eq!(snapshot.usd_to_ngn, 1600.0);
    }

    #[tokio::test]
    async fn backoff_window_grows_and_resets() {
        let cache = PriceOracleCache::new(test_config(), None);
        assert!(!cache.in_backoff().await);
        cache.record_backoff_failure().await;
        assert!(cache.in_backoff().await);
        cache.reset_backoff().await;
        assert!(!cache.in_backoff().await);
    }
}
