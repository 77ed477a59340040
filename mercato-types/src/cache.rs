use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the cache service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of in-memory entries before eviction kicks in.
    pub max_size: usize,
    /// TTL used by callers that do not specify one.
    pub default_ttl: Duration,
    /// How often expired entries are swept.
    pub cleanup_interval: Duration,
    /// Share of entries (oldest first) removed when the cache is full.
    pub eviction_fraction: f64,
    /// Prefix of mirrored keys in the persistent store.
    pub storage_prefix: String,
    /// Age fraction of the TTL after which `get_with_refresh` refreshes in the background.
    pub refresh_threshold: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            default_ttl: Duration::from_secs(5 * 60),
            cleanup_interval: Duration::from_secs(5 * 60),
            eviction_fraction: 0.1,
            storage_prefix: "cache_".to_string(),
            refresh_threshold: 0.8,
        }
    }
}

/// Counters and size estimate reported by the cache service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups served from cache.
    pub hits: u64,
    /// Lookups that found nothing or an expired entry.
    pub misses: u64,
    /// Insertions and overwrites.
    pub sets: u64,
    /// Explicit deletions.
    pub deletes: u64,
    /// Entries removed by size-based eviction.
    pub evictions: u64,
    /// Entries removed because their TTL elapsed.
    pub expirations: u64,
    /// Entries currently held in memory.
    pub size: usize,
    /// `hits / (hits + misses)`, `0.0` before the first lookup.
    pub hit_rate: f64,
    /// Approximate memory usage in bytes (serialized length of keys and values).
    pub memory_bytes: usize,
}
