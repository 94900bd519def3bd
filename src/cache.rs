//! Result cache
//!
//! Keyed memoization of expensive, idempotent external-call outcomes,
//! consulted before the executor runs. Entries are unbounded and expire
//! only by time, checked lazily on read; this is not an LRU.
//! Concurrent misses on the same key each recompute; the cache performs
//! no in-flight deduplication (see DESIGN.md).
//!
//! A cache outage must never fail the caller's request: the
//! [`ResultCache`] facade degrades store errors to a logged miss and the
//! caller recomputes through the executor.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::warn;

use crate::error::Result;

/// Storage seam for cached results. In-process by default; an external
/// store (e.g. a shared key-value service) implements the same contract,
/// in which case its calls become suspension points.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

/// Unbounded in-memory store with lazy time-based expiry.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut entries = self.entries.lock().unwrap();
        let hit = match entries.get(key) {
            Some(entry) if Instant::now() > entry.expires_at => None,
            Some(entry) => Some(entry.value.clone()),
            None => return Ok(None),
        };
        if hit.is_none() {
            entries.remove(key);
        }
        Ok(hit)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.lock().unwrap().insert(key.to_string(), entry);
        Ok(())
    }
}

/// Cache facade consulted by services wrapping expensive computations.
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
    default_ttl: Duration,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    pub fn in_memory(default_ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryStore::new()), default_ttl)
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up a key. A store error is logged and reported as a miss.
    pub async fn get(&self, key: &str) -> Option<Value> {
        match self.store.get(key).await {
            Ok(hit) => hit,
            Err(err) => {
                warn!(key, error = %err, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store a value under `key` for `ttl`. A store error is logged and
    /// swallowed; the result is simply recomputed next time.
    pub async fn set(&self, key: &str, value: Value, ttl: Duration) {
        if let Err(err) = self.store.set(key, value, ttl).await {
            warn!(key, error = %err, "cache write failed, result will be recomputed");
        }
    }

    /// [`set`](Self::set) with the configured default TTL.
    pub async fn set_default(&self, key: &str, value: Value) {
        self.set(key, value, self.default_ttl).await;
    }
}

/// Deterministic content-derived cache key.
///
/// Hashes the semantically relevant call inputs (target service and
/// operation, provider/model parts, payload) so identical requests
/// collapse to one key. Payloads are serialized through `serde_json`,
/// whose maps are key-ordered, so incidental JSON field ordering does not
/// change the key. Request ids and other incidental context must not be
/// fed in.
pub struct CacheKey {
    hasher: Sha256,
}

impl CacheKey {
    pub fn for_operation(service: &str, operation: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(service.as_bytes());
        hasher.update(b"\0");
        hasher.update(operation.as_bytes());
        hasher.update(b"\0");
        Self { hasher }
    }

    pub fn part(mut self, name: &str, value: &str) -> Self {
        self.hasher.update(name.as_bytes());
        self.hasher.update(b"=");
        self.hasher.update(value.as_bytes());
        self.hasher.update(b"\0");
        self
    }

    pub fn payload(mut self, payload: &Value) -> Self {
        // serde_json's Map is ordered by key, so this is canonical
        let serialized = payload.to_string();
        self.hasher.update(serialized.as_bytes());
        self.hasher.update(b"\0");
        self
    }

    pub fn finish(self) -> String {
        let digest = self.hasher.finalize();
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}
