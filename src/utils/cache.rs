//! Caching utilities for ytgrab

use moka::future::Cache;
use std::time::Duration;

/// Async TTL cache used for engine metadata
pub type AsyncCache<K, V> = Cache<K, V>;

/// Create a new async cache with TTL and max capacity
pub fn new_async_cache_with_capacity<K, V>(ttl: Duration, max_capacity: u64) -> AsyncCache<K, V>
where
    K: std::hash::Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    Cache::builder()
        .time_to_live(ttl)
        .max_capacity(max_capacity)
        .build()
}
