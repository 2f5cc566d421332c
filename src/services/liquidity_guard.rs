//! Liquidity Guard (C5): gates new offramps against the platform's cached
//! NGN payout balance plus a configured minimum buffer, so a payout never
//! gets queued that the provider account can't cover.
//!
//! Grounded on the teacher's `onramp_quote.rs` liquidity-check shape (quote
//! first, then check a balance before committing) generalized from a
//! fixed-asset onramp liquidity check to a cached, invalidatable NGN balance
//! guard; the balance cache itself mirrors the `fiat_service.rs` TTL-cache
//! pattern used for price.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::warn;

use crate::payments::{PaymentError, PaymentProvider};
use crate::payments::types::AccountBalance;

const BALANCE_CACHE_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquidityCheck {
    Ok,
    Insufficient,
    Unknown,
}

struct CachedBalance {
    balance_ngn: Option<i64>,
    fetched_at: Instant,
}

pub struct LiquidityGuard {
    provider: Arc<dyn PaymentProvider>,
    min_buffer_ngn: i64,
    cache: RwLock<Option<CachedBalance>>,
}

impl LiquidityGuard {
    pub fn new(provider: Arc<dyn PaymentProvider>, min_buffer_ngn: i64) -> Self {
        Self {
            provider,
            min_buffer_ngn,
            cache: RwLock::new(None),
        }
    }

    async fn cached_balance(&self) -> Option<i64> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < BALANCE_CACHE_TTL {
                    return cached.balance_ngn;
                }
            }
        }

        let balance_ngn = match self.provider.get_account_balance().await {
            Ok(AccountBalance::Known(ngn)) => Some(ngn),
            Ok(AccountBalance::Unknown) => None,
            Err(PaymentError::Network(e)) => {
                warn!(error = %e, "liquidity guard balance fetch failed, treating as unknown");
                None
            }
            Err(e) => {
                warn!(error = %e, "liquidity guard balance fetch failed, treating as unknown");
                None
            }
        };

        *self.cache.write().await = Some(CachedBalance {
            balance_ngn,
            fetched_at: Instant::now(),
        });
        balance_ngn
    }

    /// `CheckLiquidity(requiredNGN) -> Ok | Insufficient | Unknown` (§4.5).
    pub async fn check_liquidity(&self, required_ngn: i64) -> LiquidityCheck {
        match self.cached_balance().await {
            Some(balance) if balance - self.min_buffer_ngn >= required_ngn => LiquidityCheck::Ok,
            Some(_) => LiquidityCheck::Insufficient,
            None => LiquidityCheck::Unknown,
        }
    }

    /// `GetMaxOrderNGN() -> currentBalance - minBuffer`, floored at zero,
    /// surfaced on `/api/offramp/stats` (§6).
    pub async fn get_max_order_ngn(&self) -> Option<i64> {
        self.cached_balance()
            .await
            .map(|balance| (balance - self.min_buffer_ngn).max(0))
    }

    /// Forces the next liquidity check to re-fetch from the provider rather
    /// than trust the cached figure. Called after every successful payout
    /// (§9), since a just-debited balance is the one moment staleness would
    /// actually bite.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::payments::types::{Bank, ResolvedAccount, TransferResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedBalanceProvider {
        balance: AccountBalance,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PaymentProvider for FixedBalanceProvider {
        fn name(&self) -> &'static str {
            "fixed"
        }
        async fn resolve_account(&self, _: &str, _: &str) -> Result<ResolvedAccount, PaymentError> {
            unimplemented!()
        }
        async fn list_banks(&self) -> Result<Vec<Bank>, PaymentError> {
            unimplemented!()
        }
        async fn initiate_transfer(
            &self,
            _: i64,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<TransferResult, PaymentError> {
            unimplemented!()
        }
        async fn get_account_balance(&self) -> Result<AccountBalance, PaymentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.balance)
        }
        fn verify_webhook_signature(&self, _: &[u8], _: &str) -> bool {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn ok_when_balance_covers_amount_and_buffer() {
        let provider = Arc::new(FixedBalanceProvider {
            balance: AccountBalance::Known(100_000),
            calls: AtomicUsize::new(0),
        });
        let guard = LiquidityGuard::new(provider, 5_000);
        assert_eq!(guard.check_liquidity(50_000).await, LiquidityCheck::Ok);
    }

    #[tokio::test]
    async fn insufficient_when_buffer_would_be_breached() {
        let provider = Arc::new(FixedBalanceProvider {
            balance: AccountBalance::Known(10_000),
            calls: AtomicUsize::new(0),
        });
        let guard = LiquidityGuard::new(provider, 5_000);
        assert_eq!(guard.check_liquidity(8_000).await, LiquidityCheck::Insufficient);
    }

    #[tokio::test]
    async fn unknown_balance_surfaces_as_unknown_not_insufficient() {
        let provider = Arc::new(FixedBalanceProvider {
            balance: AccountBalance::Unknown,
            calls: AtomicUsize::new(0),
        });
        let guard = LiquidityGuard::new(provider, 5_000);
        assert_eq!(guard.check_liquidity(1_000).await, LiquidityCheck::Unknown);
    }

    #[tokio::test]
    async fn balance_is_cached_until_invalidated() {
        let provider = Arc::new(FixedBalanceProvider {
            balance: AccountBalance::Known(100_000),
            calls: AtomicUsize::new(0),
        });
        let guard = LiquidityGuard::new(provider.clone(), 0);
        guard.check_liquidity(1).await;
        guard.check_liquidity(1).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        guard.invalidate().await;
        guard.check_liquidity(1).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
