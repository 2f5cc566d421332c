//! In-process fallback `Cache` used when `REDIS_URL` is unset, so the
//! service still runs single-instance without standing up Redis. Every
//! behavior the trait promises (TTL expiry, explicit delete) holds; only the
//! "shared across processes" property that Redis backs is lost.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::cache::{Cache, CacheError};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

#[derive(Default)]
pub struct InMemoryCache {
    store: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut store = self.store.lock().await;
        match store.get(key) {
            Some(entry) if entry.expires_at.is_some_and(|at| at <= Instant::now()) => {
                store.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set_raw(&self, key: &str, value: String, ttl_secs: Option<u64>) -> Result<(), CacheError> {
        let expires_at = ttl_secs.map(|ttl| Instant::now() + Duration::from_secs(ttl));
        self.store.lock().await.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.store.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_value() {
        let cache = InMemoryCache::new();
        cache.set_raw("k", "v".to_string(), None).await.unwrap();
        assert_eq!(cache.get_raw("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn expired_entry_reads_as_absent() {
        let cache = InMemoryCache::new();
        cache.set_raw("k", "v".to_string(), Some(0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(cache.get_raw("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_removes_the_entry() {
        let cache = InMemoryCache::new();
        cache.set_raw("k", "v".to_string(), None).await.unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get_raw("k").await.unwrap(), None);
    }
}
