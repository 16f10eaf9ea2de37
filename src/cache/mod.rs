//! Response cache: request fingerprint → previously computed [`AnalysisResult`].
//!
//! Bounded three ways: total estimated size in bytes, entry count, and a per-entry
//! TTL. Expired entries are removed lazily on access (and in bulk by
//! [`ResponseCache::cleanup`]). The entry-count bound always evicts the least recently
//! used entry. The size bound evicts by the configured policy: oldest last access (LRU)
//! or, with LRU disabled, oldest insertion.

pub mod key;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::analysis::AnalysisResult;
use crate::config::CacheConfig;
use crate::metrics::Metrics;

pub use key::generate_key;

/// Estimates the memory footprint of a cached value.
///
/// Estimates only need to be consistent, not exact: the cache uses them for its
/// size bound and its size accounting.
pub trait SizeEstimator: Send + Sync {
    fn estimate(&self, value: &AnalysisResult) -> usize;
}

/// Default estimator: length of the value's JSON encoding in bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSizeEstimator;

impl SizeEstimator for JsonSizeEstimator {
    fn estimate(&self, value: &AnalysisResult) -> usize {
        serde_json::to_vec(value)
            .map(|bytes| bytes.len())
            .unwrap_or_else(|_| value.text.len() + value.summary.len())
    }
}

/// A cached value with its expiry and access bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: AnalysisResult,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Number of hits served from this entry.
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
    /// Estimated size in bytes.
    pub size: usize,
    #[serde(skip)]
    inserted_tick: u64,
    #[serde(skip)]
    accessed_tick: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// One exported entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    pub key: String,
    pub entry: CacheEntry,
}

/// A value to preload with [`ResponseCache::warmup`].
#[derive(Debug, Clone)]
pub struct WarmupItem {
    pub key: String,
    pub value: AnalysisResult,
    pub ttl: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    /// Sum of the estimated sizes of live entries.
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses)`, or `0.0` before any lookup.
    pub hit_rate: f64,
    pub evictions: u64,
}

pub struct ResponseCache {
    config: CacheConfig,
    entries: HashMap<String, CacheEntry>,
    total_size: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    /// Logical clock ordering inserts and accesses; wall-clock ties would make LRU
    /// order ambiguous.
    tick: u64,
    estimator: Box<dyn SizeEstimator>,
    metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("config", &self.config)
            .field("entries", &self.entries.len())
            .field("total_size", &self.total_size)
            .finish_non_exhaustive()
    }
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_estimator(config, Box::new(JsonSizeEstimator))
    }

    /// Create a cache that sizes entries with a custom estimator.
    pub fn with_estimator(config: CacheConfig, estimator: Box<dyn SizeEstimator>) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            total_size: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            tick: 0,
            estimator,
            metrics: None,
        }
    }

    /// Report hits, misses, evictions and usage to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        metrics.set_cache_usage(self.entries.len(), self.total_size);
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Convenience wrapper around [`generate_key`].
    pub fn generate_key(
        text: &str,
        depth: crate::analysis::AnalysisDepth,
        options: &serde_json::Value,
    ) -> String {
        generate_key(text, depth, options)
    }

    /// Look up `key`. An expired entry is removed and reported as a miss.
    pub fn get(&mut self, key: &str) -> Option<AnalysisResult> {
        let now = Utc::now();
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                self.record_miss();
                return None;
            }
        };

        if expired {
            self.remove_entry(key);
            self.record_miss();
            debug!(key, "cache entry expired on read");
            return None;
        }

        self.tick += 1;
        self.hits += 1;
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_hit();
        }
        let tick = self.tick;
        let entry = self.entries.get_mut(key)?;
        entry.access_count += 1;
        entry.last_accessed = now;
        entry.accessed_tick = tick;
        Some(entry.value.clone())
    }

    /// Store `value` under `key`, replacing any existing entry. `ttl` defaults to
    /// the configured TTL.
    pub fn set(&mut self, key: impl Into<String>, value: AnalysisResult, ttl: Option<Duration>) {
        let now = Utc::now();
        let ttl = ttl.unwrap_or(Duration::from_secs(self.config.default_ttl_secs));
        let size = self.estimator.estimate(&value);
        let entry = CacheEntry {
            value,
            expires_at: expiry_after(now, ttl),
            created_at: now,
            access_count: 0,
            last_accessed: now,
            size,
            inserted_tick: 0,
            accessed_tick: 0,
        };
        self.insert_entry(key.into(), entry);
    }

    pub fn delete(&mut self, key: &str) -> bool {
        self.remove_entry(key).is_some()
    }

    /// `true` if `key` holds a live entry. Expired entries are removed.
    pub fn has(&mut self, key: &str) -> bool {
        let now = Utc::now();
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => return false,
        };
        if expired {
            self.remove_entry(key);
        }
        !expired
    }

    pub fn clear(&mut self) {
        let dropped = self.entries.len();
        self.entries.clear();
        self.total_size = 0;
        self.publish_usage();
        debug!(dropped, "cache cleared");
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn cleanup(&mut self) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove_entry(key);
        }
        if !expired.is_empty() {
            debug!(removed = expired.len(), "swept expired cache entries");
        }
        expired.len()
    }

    /// Live keys in insertion order.
    pub fn keys(&mut self) -> Vec<String> {
        self.cleanup();
        let mut keyed: Vec<(&String, u64)> = self
            .entries
            .iter()
            .map(|(key, entry)| (key, entry.inserted_tick))
            .collect();
        keyed.sort_by_key(|(_, tick)| *tick);
        keyed.into_iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let requests = self.hits + self.misses;
        let hit_rate = if requests > 0 {
            self.hits as f64 / requests as f64
        } else {
            0.0
        };
        CacheStats {
            entries: self.entries.len(),
            size: self.total_size,
            hits: self.hits,
            misses: self.misses,
            hit_rate,
            evictions: self.evictions,
        }
    }

    /// Snapshot of every live entry, in insertion order.
    pub fn export(&self) -> Vec<CacheRecord> {
        let now = Utc::now();
        let mut live: Vec<(&String, &CacheEntry)> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .collect();
        live.sort_by_key(|(_, entry)| entry.inserted_tick);
        live.into_iter()
            .map(|(key, entry)| CacheRecord {
                key: key.clone(),
                entry: entry.clone(),
            })
            .collect()
    }

    /// Load exported records. Records already past their expiry are skipped; the
    /// rest go through the normal bounds, so an import can evict.
    ///
    /// Records are replayed oldest access first, so recency carries over from the
    /// exporting cache. Surviving records keep their exported insertion order.
    pub fn import(&mut self, records: Vec<CacheRecord>) {
        let now = Utc::now();
        let total = records.len();
        let mut live: Vec<(usize, CacheRecord)> = records
            .into_iter()
            .enumerate()
            .filter(|(_, record)| !record.entry.is_expired(now))
            .collect();
        let skipped = total - live.len();
        live.sort_by_key(|(_, record)| (record.entry.last_accessed, record.entry.created_at));

        let mut imported: Vec<(usize, String)> = Vec::with_capacity(live.len());
        for (position, CacheRecord { key, mut entry }) in live {
            entry.size = self.estimator.estimate(&entry.value);
            imported.retain(|(_, seen)| seen != &key);
            imported.push((position, key.clone()));
            self.insert_entry(key, entry);
        }

        imported.retain(|(_, key)| self.entries.contains_key(key));
        let mut ticks: Vec<u64> = imported
            .iter()
            .filter_map(|(_, key)| self.entries.get(key).map(|entry| entry.inserted_tick))
            .collect();
        ticks.sort_unstable();
        imported.sort_by_key(|(position, _)| *position);
        for ((_, key), tick) in imported.iter().zip(ticks) {
            if let Some(entry) = self.entries.get_mut(key) {
                entry.inserted_tick = tick;
            }
        }

        if skipped > 0 {
            debug!(skipped, "skipped expired records on import");
        }
    }

    /// Bulk [`set`](Self::set).
    pub fn warmup(&mut self, items: impl IntoIterator<Item = WarmupItem>) {
        for item in items {
            self.set(item.key, item.value, item.ttl);
        }
    }

    fn insert_entry(&mut self, key: String, mut entry: CacheEntry) {
        self.remove_entry(&key);

        while !self.entries.is_empty()
            && self.total_size + entry.size > self.config.max_size_bytes
        {
            self.evict_for_size();
        }
        // the count bound is LRU regardless of the configured policy
        while !self.entries.is_empty() && self.entries.len() >= self.config.max_entries {
            self.evict_least_recently_used();
        }

        self.tick += 1;
        entry.inserted_tick = self.tick;
        entry.accessed_tick = self.tick;
        self.total_size += entry.size;
        self.entries.insert(key, entry);
        self.publish_usage();
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        debug_assert!(self.total_size >= entry.size, "cache size accounting underflow");
        self.total_size = self.total_size.saturating_sub(entry.size);
        self.publish_usage();
        Some(entry)
    }

    fn evict_for_size(&mut self) {
        let lru = self.config.lru;
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| {
                if lru {
                    entry.accessed_tick
                } else {
                    entry.inserted_tick
                }
            })
            .map(|(key, _)| key.clone());

        if let Some(key) = victim {
            self.evict(&key, if lru { "lru" } else { "fifo" });
        }
    }

    fn evict_least_recently_used(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.accessed_tick)
            .map(|(key, _)| key.clone());

        if let Some(key) = victim {
            self.evict(&key, "lru");
        }
    }

    fn evict(&mut self, key: &str, policy: &'static str) {
        if self.remove_entry(key).is_some() {
            self.evictions += 1;
            if let Some(metrics) = &self.metrics {
                metrics.record_cache_eviction();
            }
            debug!(key, policy, "evicted cache entry");
        }
    }

    fn record_miss(&mut self) {
        self.misses += 1;
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_miss();
        }
    }

    fn publish_usage(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.set_cache_usage(self.entries.len(), self.total_size);
        }
    }
}

fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
