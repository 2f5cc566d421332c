//! The `Cache` trait abstracts over the process-wide key/value cache used by
//! the quote store, price oracle, payout provider adapter, and status
//! endpoints. A single Redis-backed implementation (`RedisCache`) is shipped;
//! the trait boundary lets tests substitute an in-memory stand-in.
//!
//! The trait itself only deals in raw strings so that `Arc<dyn Cache>` stays
//! object-safe; `get_json`/`set_json` are free functions layered on top for
//! the common "cache a serde struct" case.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    Connection(String),
    #[error("cache serialization error: {0}")]
    Serialization(String),
}

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_raw(&self, key: &str, value: String, ttl_secs: Option<u64>) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Fetch and deserialize a JSON value from a dyn `Cache`.
pub async fn get_json<T: DeserializeOwned>(
    cache: &(dyn Cache + '_),
    key: &str,
) -> Result<Option<T>, CacheError> {
    match cache.get_raw(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| CacheError::Serialization(e.to_string())),
        None => Ok(None),
    }
}

/// Serialize and store a JSON value in a dyn `Cache`.
pub async fn set_json<T: Serialize + Sync>(
    cache: &(dyn Cache + '_),
    key: &str,
    value: &T,
    ttl_secs: Option<u64>,
) -> Result<(), CacheError> {
    let raw = serde_json::to_string(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
    cache.set_raw(key, raw, ttl_secs).await
}
