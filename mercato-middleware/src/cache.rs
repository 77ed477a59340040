//! Read-through TTL cache with optional second-tier persistence.
//!
//! Entries live in an in-memory map. Entries stored with `persist = true` are
//! also mirrored into a [`PersistentStore`] under `"{storage_prefix}{key}"` as a
//! JSON blob `{ value, timestamp, ttl }` (epoch milliseconds / milliseconds).
//! Memory is the first tier; a memory miss falls back to the store.
//!
//! Expiry is lazy on read and active through [`CacheService::cleanup`]. When
//! the map is full, the oldest entries by insertion time are evicted from
//! memory; their persisted copies stay in the store.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use mercato_core::{PeriodicTask, PersistentStore, TaskHandle};
use mercato_types::{CacheConfig, CacheStats, MercatoError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Build a cache key from a prefix and query parameters.
///
/// Parameters are sorted by name (then value) and form-urlencoded so that the
/// same logical request always maps to the same key.
#[must_use]
pub fn cache_key(prefix: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return prefix.to_string();
    }
    let mut sorted = params.to_vec();
    sorted.sort_unstable();
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(sorted)
        .finish();
    format!("{prefix}?{query}")
}

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
    persist: bool,
    access_count: u64,
    last_access: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration, persist: bool, inserted_at: Instant) -> Self {
        Self {
            value,
            inserted_at,
            ttl,
            persist,
            access_count: 0,
            last_access: inserted_at,
        }
    }

    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.inserted_at)
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.age(now) > self.ttl
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedEntry<V> {
    value: V,
    /// Wall-clock insertion time, epoch milliseconds.
    timestamp: i64,
    /// Time to live in milliseconds.
    ttl: u64,
}

/// Read-only view of an entry's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryInfo {
    /// Successful reads since insertion.
    pub access_count: u64,
    /// Time since insertion.
    pub age: Duration,
    /// Time since the last successful read (or insertion).
    pub idle: Duration,
    /// Configured time to live.
    pub ttl: Duration,
    /// Whether the entry is mirrored to the persistent store.
    pub persist: bool,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// Removes a key from the in-flight refresh set when the refresh ends.
struct RefreshSlot {
    refreshing: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for RefreshSlot {
    fn drop(&mut self) {
        self.refreshing
            .lock()
            .expect("mutex poisoned")
            .remove(&self.key);
    }
}

/// In-memory TTL cache with optional persistence and stale-while-revalidate reads.
pub struct CacheService<V> {
    cfg: CacheConfig,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    store: Option<Arc<dyn PersistentStore>>,
    counters: Counters,
    refreshing: Arc<Mutex<HashSet<String>>>,
}

#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
fn log_storage_error(op: &'static str, key: &str, err: &MercatoError) {
    #[cfg(feature = "tracing")]
    tracing::warn!(op, key, error = %err, "cache persistence failed");
}

/// Whether an entry of `age` has passed `ttl * threshold`.
///
/// A non-finite threshold counts as `1.0`; the comparison is done in float
/// seconds so very large TTLs cannot overflow.
fn is_stale(age: Duration, ttl: Duration, threshold: f64) -> bool {
    let t = if threshold.is_finite() {
        threshold.clamp(0.0, 1.0)
    } else {
        1.0
    };
    age.as_secs_f64() > ttl.as_secs_f64() * t
}

impl<V> CacheService<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Memory-only cache.
    #[must_use]
    pub fn new(cfg: CacheConfig) -> Self {
        Self {
            cfg,
            entries: Mutex::new(HashMap::new()),
            store: None,
            counters: Counters::default(),
            refreshing: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Cache that mirrors persisted entries into `store`.
    #[must_use]
    pub fn with_store(cfg: CacheConfig, store: Arc<dyn PersistentStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::new(cfg)
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.cfg
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{key}", self.cfg.storage_prefix)
    }

    /// Insert or overwrite an entry. Always returns `true`.
    ///
    /// When the cache already holds `max_size` entries and `key` is new, the
    /// oldest `eviction_fraction` of entries (at least one) are evicted first.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration, persist: bool) -> bool {
        let key = key.into();
        let now = Instant::now();
        let blob = if persist {
            self.encode_blob(&key, &value, ttl)
        } else {
            None
        };

        {
            let mut map = self.entries.lock().expect("mutex poisoned");
            self.make_room(&mut map, &key);
            map.insert(key.clone(), CacheEntry::new(value, ttl, persist, now));
        }
        Counters::bump(&self.counters.sets, 1);

        match (&self.store, blob) {
            (Some(store), Some(blob)) => {
                if let Err(e) = store.set(&self.storage_key(&key), &blob) {
                    log_storage_error("set", &key, &e);
                }
            }
            // a replaced persisted copy must not outlive the overwrite
            (Some(_), None) => self.remove_blob(&key),
            (None, _) => {}
        }
        true
    }

    fn make_room(&self, map: &mut HashMap<String, CacheEntry<V>>, incoming: &str) {
        if map.contains_key(incoming) || map.len() < self.cfg.max_size.max(1) {
            return;
        }
        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let count = ((map.len() as f64) * self.cfg.eviction_fraction.clamp(0.0, 1.0)).ceil()
            as usize;
        let count = count.max(1);

        let mut by_age: Vec<(Instant, String)> = map
            .iter()
            .map(|(k, e)| (e.inserted_at, k.clone()))
            .collect();
        by_age.sort_unstable();
        for (_, k) in by_age.into_iter().take(count) {
            map.remove(&k);
        }
        Counters::bump(&self.counters.evictions, count as u64);
        #[cfg(feature = "tracing")]
        tracing::debug!(evicted = count, "cache full; evicted oldest entries");
    }

    fn encode_blob(&self, key: &str, value: &V, ttl: Duration) -> Option<String> {
        let blob = PersistedEntry {
            value,
            timestamp: chrono::Utc::now().timestamp_millis(),
            ttl: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
        };
        match serde_json::to_string(&blob) {
            Ok(s) => Some(s),
            Err(e) => {
                log_storage_error("encode", key, &e.into());
                None
            }
        }
    }

    /// Return the value for `key` if present and unexpired.
    ///
    /// Expired entries are removed as a side effect. On a memory miss the
    /// persistent store is consulted and a live blob is hydrated into memory.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        self.lookup(key).map(|(v, _, _)| v)
    }

    /// Returns `(value, age, persist)` and maintains hit/miss accounting.
    fn lookup(&self, key: &str) -> Option<(V, Duration, bool)> {
        let now = Instant::now();
        let expired_persisted = {
            let mut map = self.entries.lock().expect("mutex poisoned");
            match map.get_mut(key) {
                Some(entry) if !entry.is_expired(now) => {
                    entry.access_count += 1;
                    entry.last_access = now;
                    let hit = (entry.value.clone(), entry.age(now), entry.persist);
                    drop(map);
                    Counters::bump(&self.counters.hits, 1);
                    return Some(hit);
                }
                Some(_) => {
                    let entry = map.remove(key);
                    Counters::bump(&self.counters.expirations, 1);
                    Some(entry.is_some_and(|e| e.persist))
                }
                None => None,
            }
        };

        match expired_persisted {
            Some(persisted) => {
                if persisted {
                    self.remove_blob(key);
                }
            }
            None => {
                if let Some(hit) = self.hydrate(key) {
                    Counters::bump(&self.counters.hits, 1);
                    return Some(hit);
                }
            }
        }
        Counters::bump(&self.counters.misses, 1);
        None
    }

    /// Load a persisted blob into memory if it is still live.
    fn hydrate(&self, key: &str) -> Option<(V, Duration, bool)> {
        let store = self.store.as_ref()?;
        let raw = match store.get(&self.storage_key(key)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                log_storage_error("get", key, &e);
                return None;
            }
        };
        let blob: PersistedEntry<V> = match serde_json::from_str(&raw) {
            Ok(b) => b,
            Err(e) => {
                log_storage_error("decode", key, &e.into());
                self.remove_blob(key);
                return None;
            }
        };

        let age_ms = chrono::Utc::now()
            .timestamp_millis()
            .saturating_sub(blob.timestamp)
            .max(0);
        let age = Duration::from_millis(u64::try_from(age_ms).unwrap_or(0));
        let ttl = Duration::from_millis(blob.ttl);
        if age > ttl {
            self.remove_blob(key);
            Counters::bump(&self.counters.expirations, 1);
            return None;
        }

        let now = Instant::now();
        let inserted_at = now.checked_sub(age).unwrap_or(now);
        let mut entry = CacheEntry::new(blob.value.clone(), ttl, true, inserted_at);
        entry.access_count = 1;
        entry.last_access = now;
        {
            let mut map = self.entries.lock().expect("mutex poisoned");
            self.make_room(&mut map, key);
            map.insert(key.to_string(), entry);
        }
        Some((blob.value, age, true))
    }

    fn remove_blob(&self, key: &str) {
        if let Some(store) = &self.store
            && let Err(e) = store.remove(&self.storage_key(key))
        {
            log_storage_error("remove", key, &e);
        }
    }

    /// Whether a live entry exists in memory; does not touch access statistics.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .expect("mutex poisoned")
            .get(key)
            .is_some_and(|e| !e.is_expired(now))
    }

    /// Bookkeeping for a live in-memory entry.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn entry_info(&self, key: &str) -> Option<EntryInfo> {
        let now = Instant::now();
        let map = self.entries.lock().expect("mutex poisoned");
        map.get(key).filter(|e| !e.is_expired(now)).map(|e| EntryInfo {
            access_count: e.access_count,
            age: e.age(now),
            idle: now.saturating_duration_since(e.last_access),
            ttl: e.ttl,
            persist: e.persist,
        })
    }

    /// Remove `key` from memory and from the persistent store.
    ///
    /// Returns whether an in-memory entry existed.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn delete(&self, key: &str) -> bool {
        let existed = self
            .entries
            .lock()
            .expect("mutex poisoned")
            .remove(key)
            .is_some();
        self.remove_blob(key);
        if existed {
            Counters::bump(&self.counters.deletes, 1);
        }
        existed
    }

    /// Remove every entry from memory and every prefixed key from the store.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn clear(&self) {
        self.entries.lock().expect("mutex poisoned").clear();
        let Some(store) = &self.store else {
            return;
        };
        match store.keys() {
            Ok(keys) => {
                for k in keys
                    .iter()
                    .filter(|k| k.starts_with(&self.cfg.storage_prefix))
                {
                    if let Err(e) = store.remove(k) {
                        log_storage_error("clear", k, &e);
                    }
                }
            }
            Err(e) => log_storage_error("clear", "*", &e),
        }
    }

    /// Read-through helper: return the cached value or run `loader` and cache its result.
    ///
    /// Concurrent misses on the same key each run their loader.
    ///
    /// # Errors
    /// Propagates the loader's error; nothing is cached in that case.
    pub async fn cache_api_call<F, Fut, E>(
        &self,
        key: &str,
        loader: F,
        ttl: Duration,
        persist: bool,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(v) = self.get(key) {
            return Ok(v);
        }
        let value = loader().await?;
        self.set(key, value.clone(), ttl, persist);
        Ok(value)
    }

    /// Stale-while-revalidate read.
    ///
    /// A live cached value is returned immediately. If its age exceeds
    /// `ttl * refresh_threshold`, `loader` runs in the background (at most one
    /// refresh per key at a time) and replaces the value on success; failures
    /// are logged and the old value stays. On a miss this behaves like
    /// [`cache_api_call`](Self::cache_api_call).
    ///
    /// # Errors
    /// Only on a miss, when the loader fails.
    pub async fn get_with_refresh<F, Fut, E>(
        self: &Arc<Self>,
        key: &str,
        loader: F,
        ttl: Duration,
        refresh_threshold: f64,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let Some((value, age, persist)) = self.lookup(key) else {
            let fresh = loader().await?;
            self.set(key, fresh.clone(), ttl, false);
            return Ok(fresh);
        };

        if is_stale(age, ttl, refresh_threshold) && self.claim_refresh(key) {
            let slot = RefreshSlot {
                refreshing: Arc::clone(&self.refreshing),
                key: key.to_string(),
            };
            let this = Arc::clone(self);
            tokio::spawn(async move {
                let slot = slot;
                match loader().await {
                    Ok(fresh) => {
                        this.set(slot.key.clone(), fresh, ttl, persist);
                    }
                    Err(_e) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(key = %slot.key, error = %_e, "background cache refresh failed");
                    }
                }
            });
        }
        Ok(value)
    }

    fn claim_refresh(&self, key: &str) -> bool {
        self.refreshing
            .lock()
            .expect("mutex poisoned")
            .insert(key.to_string())
    }

    /// Whether a background refresh for `key` is running.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn is_refreshing(&self, key: &str) -> bool {
        self.refreshing.lock().expect("mutex poisoned").contains(key)
    }

    /// Remove every expired entry from memory (and its persisted copy).
    ///
    /// Returns the number of entries removed.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<(String, bool)> = {
            let mut map = self.entries.lock().expect("mutex poisoned");
            let keys: Vec<(String, bool)> = map
                .iter()
                .filter(|(_, e)| e.is_expired(now))
                .map(|(k, e)| (k.clone(), e.persist))
                .collect();
            for (k, _) in &keys {
                map.remove(k);
            }
            keys
        };
        for (k, persisted) in &expired {
            if *persisted {
                self.remove_blob(k);
            }
        }
        Counters::bump(&self.counters.expirations, expired.len() as u64);
        #[cfg(feature = "tracing")]
        if !expired.is_empty() {
            tracing::debug!(removed = expired.len(), "cache cleanup");
        }
        expired.len()
    }

    /// Spawn the periodic cleanup job on the current runtime.
    ///
    /// The job holds a weak reference and becomes a no-op once the cache is dropped.
    pub fn spawn_cleanup(self: &Arc<Self>) -> TaskHandle {
        let weak: Weak<Self> = Arc::downgrade(self);
        PeriodicTask::new("cache-cleanup", self.cfg.cleanup_interval).spawn(move || {
            let weak = weak.clone();
            async move {
                if let Some(cache) = weak.upgrade() {
                    cache.cleanup();
                }
            }
        })
    }

    /// Hydrate every live persisted entry into memory and drop expired blobs.
    ///
    /// Returns the number of entries loaded.
    pub fn load_persisted(&self) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };
        let keys = match store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                log_storage_error("load", "*", &e);
                return 0;
            }
        };
        keys.iter()
            .filter_map(|k| k.strip_prefix(&self.cfg.storage_prefix))
            .filter(|k| self.hydrate(k).is_some())
            .count()
    }

    /// Number of entries currently held in memory (expired ones included until swept).
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("mutex poisoned").len()
    }

    /// Whether the in-memory map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counters plus an approximate memory footprint.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let (size, memory_bytes) = {
            let map = self.entries.lock().expect("mutex poisoned");
            let bytes = map
                .iter()
                .map(|(k, e)| k.len() + serde_json::to_string(&e.value).map_or(0, |s| s.len()))
                .sum();
            (map.len(), bytes)
        };
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if hits + misses == 0 {
            0.0
        } else {
            hits as f64 / (hits + misses) as f64
        };
        CacheStats {
            hits,
            misses,
            sets: self.counters.sets.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            size,
            hit_rate,
            memory_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staleness_tolerates_extreme_inputs() {
        let age = Duration::from_secs(50);
        assert!(is_stale(age, Duration::from_secs(60), 0.8));
        assert!(!is_stale(age, Duration::from_secs(60), 0.9));
        assert!(!is_stale(age, Duration::from_secs(60), f64::NAN));
        assert!(!is_stale(age, Duration::from_secs(60), f64::INFINITY));
        assert!(is_stale(age, Duration::from_secs(60), -1.0));
        assert!(!is_stale(age, Duration::MAX, 1.0));
        assert!(!is_stale(Duration::MAX, Duration::MAX, 1.0));
    }
}
