//! Durable, size-bounded, TTL-bounded cache of translation bundles.
//!
//! Entries are keyed by `(language, namespace)` and carry the bundle version
//! they were written with. An entry is served only while it is younger than
//! the TTL and its version matches the requested one. When an insert would
//! exceed the aggregate byte budget, the oldest entries (by write time) are
//! evicted first.

use crate::error::I18nResult;
use crate::storage::KvStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Resolved mapping of translation keys to strings (nested JSON objects allowed).
pub type Bundle = serde_json::Value;

const KEY_PREFIX: &str = "bundle:";

/// Namespaces under this prefix carry their own version tag, so `cleanup`
/// only expires them by age.
pub const SELF_VERSIONED_PREFIX: &str = "dynamic/";

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub ttl: Duration,
    /// Aggregate byte budget
    pub max_size: usize,
    /// Largest single entry accepted
    pub max_entry_size: usize,
    /// Keep expired entries around so they can be served when the network fails
    pub offline_support: bool,
    /// Version considered current by `cleanup()`
    pub version: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(86_400),
            max_size: 5 * 1024 * 1024,
            max_entry_size: 1024 * 1024,
            offline_support: true,
            version: "1.0.0".to_string(),
        }
    }
}

/// Partial configuration update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct CacheConfigUpdate {
    pub ttl: Option<Duration>,
    pub max_size: Option<usize>,
    pub offline_support: Option<bool>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub language: String,
    pub namespace: String,
    pub data: Bundle,
    /// Epoch milliseconds of the write
    pub timestamp: i64,
    pub version: String,
    pub size_bytes: usize,
}

impl CacheEntry {
    fn is_fresh(&self, now_ms: i64, ttl: Duration) -> bool {
        (now_ms - self.timestamp) < ttl.as_millis() as i64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheMetrics {
    pub entries: usize,
    pub total_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub rejected: u64,
    /// Hit rate as a percentage (0-100)
    pub hit_rate: f64,
}

#[derive(Default)]
struct CacheState {
    config: CacheConfig,
    /// Storage key -> (timestamp, size)
    index: HashMap<String, (i64, usize)>,
    total_size: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    rejected: u64,
}

impl CacheState {
    fn forget(&mut self, key: &str) {
        if let Some((_, size)) = self.index.remove(key) {
            self.total_size = self.total_size.saturating_sub(size);
        }
    }
}

pub struct TranslationCache {
    store: Arc<dyn KvStore>,
    state: Mutex<CacheState>,
}

pub fn cache_key(language: &str, namespace: &str) -> String {
    format!("{}{}:{}", KEY_PREFIX, language, namespace)
}

impl TranslationCache {
    /// Open the cache over `store`, rebuilding the size index from what is
    /// already persisted. Unreadable entries are dropped.
    pub fn new(store: Arc<dyn KvStore>, config: CacheConfig) -> Self {
        let mut state = CacheState {
            config,
            ..Default::default()
        };

        match store.keys(KEY_PREFIX) {
            Ok(keys) => {
                for key in keys {
                    match read_entry(store.as_ref(), &key) {
                        Some(entry) => {
                            state.total_size += entry.size_bytes;
                            state.index.insert(key, (entry.timestamp, entry.size_bytes));
                        }
                        None => {
                            let _ = store.delete(&key);
                        }
                    }
                }
            }
            Err(e) => warn!("Translation cache unavailable, starting empty: {}", e),
        }

        debug!(
            "Translation cache opened with {} entries ({} bytes)",
            state.index.len(),
            state.total_size
        );

        Self {
            store,
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        // A panic while holding the lock leaves only counters half-updated
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached bundle if present, fresh and written with `version`.
    pub fn get(&self, language: &str, namespace: &str, version: &str) -> Option<Bundle> {
        let key = cache_key(language, namespace);
        let mut state = self.state();

        let Some(entry) = read_entry(self.store.as_ref(), &key) else {
            state.forget(&key);
            state.misses += 1;
            return None;
        };

        let now = Utc::now().timestamp_millis();
        let fresh = entry.is_fresh(now, state.config.ttl);
        let version_ok = entry.version == version;

        if fresh && version_ok {
            state.hits += 1;
            return Some(entry.data);
        }

        // Expired entries with the right version are kept for offline use
        if !version_ok || !state.config.offline_support {
            self.remove_locked(&mut state, &key);
        }
        state.misses += 1;
        None
    }

    /// Version-matching entry regardless of age, only with offline support on.
    pub fn get_stale(&self, language: &str, namespace: &str, version: &str) -> Option<Bundle> {
        if !self.state().config.offline_support {
            return None;
        }
        read_entry(self.store.as_ref(), &cache_key(language, namespace))
            .filter(|entry| entry.version == version)
            .map(|entry| entry.data)
    }

    /// Store a bundle, evicting the oldest entries if the budget requires it.
    /// Oversized bundles and storage failures are logged and dropped.
    pub fn set(&self, language: &str, namespace: &str, version: &str, bundle: &Bundle) {
        let size = match serde_json::to_string(bundle) {
            Ok(json) => json.len(),
            Err(e) => {
                warn!("Cannot cache {}/{}: {}", language, namespace, e);
                return;
            }
        };

        let key = cache_key(language, namespace);
        let mut state = self.state();

        if size > state.config.max_entry_size {
            warn!(
                "Bundle {}/{} is {} bytes, above the {} byte entry limit; not cached",
                language, namespace, size, state.config.max_entry_size
            );
            state.rejected += 1;
            return;
        }

        if size > state.config.max_size {
            warn!(
                "Bundle {}/{} is {} bytes, above the {} byte cache budget; not cached",
                language, namespace, size, state.config.max_size
            );
            state.rejected += 1;
            return;
        }

        // The entry being replaced does not count against the budget
        state.forget(&key);

        while state.total_size + size > state.config.max_size {
            let oldest = state
                .index
                .iter()
                .min_by_key(|(_, (timestamp, _))| *timestamp)
                .map(|(k, _)| k.clone());
            let Some(oldest) = oldest else { break };
            debug!("Evicting cache entry {}", oldest);
            self.remove_locked(&mut state, &oldest);
            state.evictions += 1;
        }

        let entry = CacheEntry {
            language: language.to_string(),
            namespace: namespace.to_string(),
            data: bundle.clone(),
            timestamp: Utc::now().timestamp_millis(),
            version: version.to_string(),
            size_bytes: size,
        };

        match write_entry(self.store.as_ref(), &key, &entry) {
            Ok(()) => {
                state.index.insert(key, (entry.timestamp, size));
                state.total_size += size;
            }
            Err(e) => warn!("Failed to cache {}/{}: {}", language, namespace, e),
        }
    }

    pub fn remove(&self, language: &str, namespace: &str) {
        let key = cache_key(language, namespace);
        let mut state = self.state();
        self.remove_locked(&mut state, &key);
    }

    fn remove_locked(&self, state: &mut CacheState, key: &str) {
        if let Err(e) = self.store.delete(key) {
            warn!("Failed to delete cache entry {}: {}", key, e);
        }
        state.forget(key);
    }

    /// Delete every expired or version-stale entry. Returns how many went.
    pub fn cleanup(&self) -> usize {
        let mut state = self.state();
        let now = Utc::now().timestamp_millis();
        let keys: Vec<String> = state.index.keys().cloned().collect();

        let mut removed = 0;
        for key in keys {
            let stale = match read_entry(self.store.as_ref(), &key) {
                Some(entry) => {
                    let version_stale = !entry.namespace.starts_with(SELF_VERSIONED_PREFIX)
                        && entry.version != state.config.version;
                    !entry.is_fresh(now, state.config.ttl) || version_stale
                }
                None => true,
            };
            if stale {
                self.remove_locked(&mut state, &key);
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Translation cache cleanup removed {} entries", removed);
        }
        removed
    }

    /// Drop every entry and reset counters.
    pub fn clear(&self) {
        let mut state = self.state();
        let keys: Vec<String> = state.index.keys().cloned().collect();
        for key in keys {
            self.remove_locked(&mut state, &key);
        }
        state.hits = 0;
        state.misses = 0;
        state.evictions = 0;
        state.rejected = 0;
        info!("Translation cache cleared");
    }

    /// Replace parts of the configuration. Existing entries are re-evaluated
    /// lazily on the next `get()` or `cleanup()`.
    pub fn update_config(&self, update: CacheConfigUpdate) {
        let mut state = self.state();
        if let Some(ttl) = update.ttl {
            state.config.ttl = ttl;
        }
        if let Some(max_size) = update.max_size {
            state.config.max_size = max_size;
        }
        if let Some(offline) = update.offline_support {
            state.config.offline_support = offline;
        }
        if let Some(version) = update.version {
            state.config.version = version;
        }
    }

    pub fn config(&self) -> CacheConfig {
        self.state().config.clone()
    }

    pub fn len(&self) -> usize {
        self.state().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self) -> CacheMetrics {
        let state = self.state();
        let lookups = state.hits + state.misses;
        CacheMetrics {
            entries: state.index.len(),
            total_size: state.total_size,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            rejected: state.rejected,
            hit_rate: if lookups > 0 {
                (state.hits as f64 / lookups as f64) * 100.0
            } else {
                0.0
            },
        }
    }
}

fn read_entry(store: &dyn KvStore, key: &str) -> Option<CacheEntry> {
    let raw = match store.get(key) {
        Ok(raw) => raw?,
        Err(e) => {
            warn!("Failed to read cache entry {}: {}", key, e);
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!("Discarding unreadable cache entry {}: {}", key, e);
            None
        }
    }
}

fn write_entry(store: &dyn KvStore, key: &str, entry: &CacheEntry) -> I18nResult<()> {
    let json = serde_json::to_string(entry)?;
    store.set(key, &json)
}
