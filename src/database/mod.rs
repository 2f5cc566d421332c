//! Transaction Store (C2): Postgres/sqlx repositories realizing the
//! document-store semantics of §3/§4.2, plus a migration SQL file describing
//! the schema those repositories assume.

#[cfg(feature = "database")]
pub mod error;
#[cfg(feature = "database")]
pub mod models;
#[cfg(feature = "database")]
pub mod price_snapshot_repository;
#[cfg(feature = "database")]
pub mod transaction_repository;

#[cfg(feature = "database")]
pub use error::DatabaseError;
#[cfg(feature = "database")]
pub use models::{BankDetails, Direction, PriceSnapshot, Token, Transaction, TxStatus};
#[cfg(feature = "database")]
pub use price_snapshot_repository::PriceSnapshotRepository;
#[cfg(feature = "database")]
pub use transaction_repository::{HistoryFilter, TokenStats, TransactionRepository};
