//! TTL response cache for model calls.
//!
//! Results are memoized in memory and mirrored to a JSON file mapping cache
//! key to `{result, timestamp}`. Expiry is lazy: entries are checked when
//! read, dropped when the file is loaded, and filtered out whenever the file
//! is rewritten. The map is bounded; a full cache evicts its oldest entry.
//!
//! The cache is best-effort. Disk errors are logged and ignored, so the
//! worst case is recomputing a result that could have been reused.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::storage::{read_json, write_json};

/// Default number of entries kept per cache.
pub const DEFAULT_CAPACITY: usize = 512;

/// A cached result and the time it was stored (epoch seconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub result: Value,
    pub timestamp: f64,
}

impl CacheEntry {
    fn is_fresh(&self, now: f64, ttl: Duration) -> bool {
        now < self.timestamp + ttl.as_secs_f64()
    }
}

/// Bounded, optionally file-backed TTL cache.
#[derive(Debug)]
pub struct TtlCache {
    path: Option<PathBuf>,
    entries: HashMap<String, CacheEntry>,
    capacity: usize,
}

impl TtlCache {
    /// A cache that never touches the disk.
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            path: None,
            entries: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Open a file-backed cache, keeping only entries still fresh now.
    pub fn open(path: impl Into<PathBuf>, ttl: Duration, capacity: usize) -> Self {
        Self::open_at(path, now_secs(), ttl, capacity)
    }

    /// Open a file-backed cache as of `now`.
    pub fn open_at(path: impl Into<PathBuf>, now: f64, ttl: Duration, capacity: usize) -> Self {
        let path = path.into();
        let mut entries: HashMap<String, CacheEntry> = read_json(&path).unwrap_or_default();
        let loaded = entries.len();
        entries.retain(|_, e| e.is_fresh(now, ttl));
        tracing::debug!(
            path = %path.display(),
            loaded,
            fresh = entries.len(),
            "opened response cache"
        );

        let mut cache = Self {
            path: Some(path),
            entries,
            capacity: capacity.max(1),
        };
        while cache.entries.len() > cache.capacity {
            cache.evict_oldest();
        }
        cache
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The cached result for `key` if it is still fresh at `now`.
    pub fn get_at(&self, key: &str, now: f64, ttl: Duration) -> Option<&Value> {
        self.entries
            .get(key)
            .filter(|e| e.is_fresh(now, ttl))
            .map(|e| &e.result)
    }

    /// Return the cached result for `key`, or run `compute`, store its
    /// result and persist the cache. Errors from `compute` are returned and
    /// not cached.
    pub async fn get_or_compute<T, F, Fut>(
        &mut self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.get_or_compute_at(key, now_secs(), ttl, compute).await
    }

    /// [`get_or_compute`](Self::get_or_compute) with an explicit clock.
    pub async fn get_or_compute_at<T, F, Fut>(
        &mut self,
        key: &str,
        now: f64,
        ttl: Duration,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(cached) = self.get_at(key, now, ttl) {
            match serde_json::from_value::<T>(cached.clone()) {
                Ok(value) => {
                    tracing::debug!(key, "cache hit");
                    return Ok(value);
                }
                Err(e) => tracing::debug!(key, "cached value no longer decodes: {e}"),
            }
        }

        tracing::debug!(key, "cache miss");
        let value = compute().await?;
        match serde_json::to_value(&value) {
            Ok(result) => {
                self.insert(key, result, now, ttl);
                self.persist(now, ttl);
            }
            Err(e) => tracing::warn!(key, "result not cacheable: {e}"),
        }
        Ok(value)
    }

    /// Drop every entry that has expired at `now`. Returns how many were
    /// removed.
    pub fn sweep_expired(&mut self, now: f64, ttl: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_fresh(now, ttl));
        before - self.entries.len()
    }

    fn insert(&mut self, key: &str, result: Value, now: f64, ttl: Duration) {
        if !self.entries.contains_key(key) && self.entries.len() >= self.capacity {
            self.sweep_expired(now, ttl);
            while self.entries.len() >= self.capacity {
                self.evict_oldest();
            }
        }
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                result,
                timestamp: now,
            },
        );
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by(|a, b| a.1.timestamp.total_cmp(&b.1.timestamp))
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    /// Rewrite the backing file with the entries still fresh at `now`.
    fn persist(&self, now: f64, ttl: Duration) {
        let Some(path) = &self.path else {
            return;
        };
        let fresh: BTreeMap<&str, &CacheEntry> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_fresh(now, ttl))
            .map(|(k, e)| (k.as_str(), e))
            .collect();
        if let Err(e) = write_json(path, &fresh) {
            tracing::warn!("response cache not saved: {e:#}");
        }
    }
}

/// Current time in epoch seconds.
pub fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Deterministic key for a set of call arguments: SHA-256 over their
/// canonical JSON encoding (object keys sorted at every level), so named
/// arguments hash the same in any order.
pub fn cache_key(args: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(args).as_bytes());
    hex::encode(hasher.finalize())
}

/// Key over each input truncated to its first `limit` characters.
pub fn truncated_key(parts: &[&str], limit: usize) -> String {
    let truncated: Vec<Value> = parts
        .iter()
        .map(|p| Value::String(p.chars().take(limit).collect()))
        .collect();
    cache_key(&Value::Array(truncated))
}

fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            let fields: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonical_json(v)))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        scalar => scalar.to_string(),
    }
}
