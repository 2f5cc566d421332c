//! Pure application services sitting between the HTTP/worker layer and the
//! storage/provider adapters: the price oracle cache (C1) and the liquidity
//! guard (C5).

#[cfg(feature = "database")]
pub mod liquidity_guard;
#[cfg(feature = "database")]
pub mod price_oracle;

#[cfg(feature = "database")]
pub use liquidity_guard::{LiquidityCheck, LiquidityGuard};
#[cfg(feature = "database")]
pub use price_oracle::{PriceOracleCache, PriceSnapshotView, TokenPrice};
