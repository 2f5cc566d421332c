//! Blockchain adapters. One module per chain; the settlement engine depends
//! only on the types re-exported here, never on a specific chain's wire
//! format.

#[cfg(feature = "database")]
pub mod stacks;
