//! # Metrics Cache
//!
//! In-process TTL cache for expensive, rarely-changing reads: the active
//! tenant list and per-period platform totals. Strictly best-effort. When the
//! cache is unavailable every get is a miss and every set a no-op, so callers
//! recompute instead of failing.
//!
//! ## Design
//!
//! - `DashMap` store, values held as `serde_json::Value` so one cache serves
//!   heterogeneous entry types
//! - Lazy expiry on read plus a scheduled `optimize()` sweep that also evicts
//!   entries inside the near-expiry window, bounding memory growth
//! - Hit/miss/set counters exposed through `stats()` for run-level logging

use crate::config::CacheConfig;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// Counter snapshot for observability
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

/// Best-effort TTL cache shared across the pipeline
pub struct MetricsCache {
    store: DashMap<String, CacheEntry>,
    near_expiry_window: Duration,
    max_entries: usize,
    available: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    evictions: AtomicU64,
}

impl MetricsCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            store: DashMap::new(),
            near_expiry_window: Duration::from_secs(config.near_expiry_window_seconds),
            max_entries: config.active_tenants.max_entries + config.platform_totals.max_entries,
            available: AtomicBool::new(config.enabled),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Fetch and decode a cached value. Expired, missing, undecodable, or
    /// unavailable all read as a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.available.load(Ordering::Relaxed) {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let entry = match self.store.get(key) {
            Some(entry) => entry,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if entry.expires_at <= Instant::now() {
            drop(entry);
            self.store.remove(key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        match serde_json::from_value(entry.value.clone()) {
            Ok(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Err(err) => {
                warn!(key, error = %err, "Cached value failed to decode, treating as miss");
                drop(entry);
                self.store.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a value with the given TTL. No-op when unavailable or when the
    /// value cannot be serialized; cache writes never fail the caller.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        if !self.available.load(Ordering::Relaxed) {
            return;
        }
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(err) => {
                warn!(key, error = %err, "Value not cacheable, skipping set");
                return;
            }
        };
        if self.store.len() >= self.max_entries && !self.store.contains_key(key) {
            self.evict_expired();
        }
        self.store.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop every entry whose key starts with `prefix`. Returns the number of
    /// entries removed.
    pub fn delete_pattern(&self, prefix: &str) -> usize {
        let prefix = prefix.trim_end_matches('*');
        let before = self.store.len();
        self.store.retain(|key, _| !key.starts_with(prefix));
        // Concurrent inserts between the snapshot and the retain can push the
        // length back up
        let removed = before.saturating_sub(self.store.len());
        if removed > 0 {
            debug!(prefix, removed, "Cache pattern invalidation");
        }
        removed
    }

    /// Proactive sweep: evict expired entries and entries inside the
    /// near-expiry window. Invoked hourly by the scheduler.
    pub fn optimize(&self) -> usize {
        let cutoff = Instant::now() + self.near_expiry_window;
        let before = self.store.len();
        self.store.retain(|_, entry| entry.expires_at > cutoff);
        let evicted = before.saturating_sub(self.store.len());
        self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        debug!(evicted, remaining = self.store.len(), "Cache optimize sweep");
        evicted
    }

    /// Toggle availability. While unavailable the cache degrades to
    /// recompute-always, never an error.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
        if !available {
            warn!("Cache marked unavailable, all reads will miss");
        }
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            entries: self.store.len(),
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }

    fn evict_expired(&self) {
        let now = Instant::now();
        let before = self.store.len();
        self.store.retain(|_, entry| entry.expires_at > now);
        self.evictions.fetch_add(
            before.saturating_sub(self.store.len()) as u64,
            Ordering::Relaxed,
        );
    }
}
