//! Middleware modules for the stackswap backend
//!
//! Provides request/response logging and error handling middleware

#[cfg(feature = "database")]
pub mod logging;

#[cfg(feature = "database")]
pub mod error;
