//! Long-lived background tasks: the chain indexer (C6, one per process) and
//! the per-transaction watcher (C7, one spawned per live offramp).

#[cfg(feature = "database")]
pub mod indexer;
#[cfg(feature = "database")]
pub mod watcher;

#[cfg(feature = "database")]
pub use indexer::ChainIndexer;
#[cfg(feature = "database")]
pub use watcher::spawn_watcher;
