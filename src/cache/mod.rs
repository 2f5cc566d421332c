//! Caching layer: a `Cache` trait plus a Redis-backed implementation and
//! typed key builders.

pub mod cache;
pub mod keys;
pub mod memory_cache;
pub mod redis_cache;

pub use cache::{get_json, set_json, Cache, CacheError};
pub use memory_cache::InMemoryCache;
pub use redis_cache::RedisCache;
