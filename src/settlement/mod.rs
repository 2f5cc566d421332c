//! Settlement Engine (C8): coordinates the offramp status machine across
//! the three independent event sources named in the overview — the user's
//! signed chain transaction, the chain indexer, and the payout provider's
//! webhook — plus the simpler, interface-level onramp direction.

#[cfg(feature = "database")]
pub mod engine;
#[cfg(feature = "database")]
pub mod onramp;
#[cfg(feature = "database")]
pub mod types;

#[cfg(feature = "database")]
pub use engine::SettlementEngine;
#[cfg(feature = "database")]
pub use onramp::OnrampEngine;
