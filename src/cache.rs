//! Result cache gate.
//!
//! Successful validation results are stored under a key derived from the
//! prompt and the schema's rule set, so repeated identical calls skip the
//! provider entirely. The gate never fails a call: store errors are logged
//! and behave like a miss.

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::result::ValidationResult;
use crate::rules::RuleSet;

/// Errors raised by a [`CacheStore`]. Never surfaced to validator callers.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache serialization error: {0}")]
    Serialization(String),
}

/// Key for a (prompt, rule set) pair.
///
/// `prefix` followed by the hex SHA-256 of the prompt, a NUL separator and
/// the rule set's [`canonical_json`](RuleSet::canonical_json). Rule order and
/// whitespace do not matter; any change in prompt or rule content does.
///
/// # Example
///
/// ```
/// use llm_validator::cache::cache_key;
/// use llm_validator::rules::RuleSet;
///
/// let a = cache_key("v:", "Extract", &RuleSet::new().field("age", "integer"));
/// let b = cache_key("v:", "Extract", &RuleSet::new().field("age", "integer|min:18"));
/// assert_ne!(a, b);
/// assert!(a.starts_with("v:"));
/// ```
pub fn cache_key(prefix: &str, prompt: &str, rules: &RuleSet) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update([0u8]);
    hasher.update(rules.canonical_json().as_bytes());
    format!("{}{}", prefix, hex::encode(hasher.finalize()))
}

/// Key-value store with per-entry TTL.
///
/// Implementations must be safe for concurrent use.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;
    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Default number of entries a [`MemoryCache`] holds.
pub const DEFAULT_MEMORY_CAPACITY: usize = 1000;

type Entry = (Value, Option<Instant>);

/// In-process LRU store.
///
/// Holds at most `capacity` entries, evicting the least recently used one
/// when full. Expired entries are dropped on read and swept on every write.
/// A zero TTL stores the entry without expiry.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, Entry>>,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.lock();
        f.debug_struct("MemoryCache")
            .field("len", &entries.len())
            .field("capacity", &entries.cap())
            .finish()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store at most `capacity` entries. `0` is treated as `1`.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Entries currently held. Expired entries not yet swept are counted.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

fn is_expired(entry: &Entry, now: Instant) -> bool {
    entry.1.is_some_and(|at| now >= at)
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        match entries.get(key) {
            None => return Ok(None),
            Some(entry) if !is_expired(entry, now) => return Ok(Some(entry.0.clone())),
            Some(_) => {}
        }
        entries.pop(key);
        Ok(None)
    }

    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let expires_at = (!ttl.is_zero()).then(|| now + ttl);
        let mut entries = self.entries.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| is_expired(entry, now))
            .map(|(k, _)| k.clone())
            .collect();
        for k in expired {
            entries.pop(&k);
        }
        entries.put(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().pop(key);
        Ok(())
    }
}

/// Cache gate used by the validator: keying, (de)serialization, error
/// swallowing. Only successful results go in.
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
    prefix: String,
    ttl: Duration,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("prefix", &self.prefix)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            ttl,
        }
    }

    pub fn key(&self, prompt: &str, rules: &RuleSet) -> String {
        cache_key(&self.prefix, prompt, rules)
    }

    /// Cached successful result for this call, if any.
    pub async fn lookup(
        &self,
        prompt: &str,
        rules: &RuleSet,
    ) -> Option<ValidationResult<Map<String, Value>>> {
        let key = self.key(prompt, rules);
        let value = match self.store.get(&key).await {
            Ok(Some(v)) => v,
            Ok(None) => {
                tracing::debug!(key = %key, "validation cache miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "validation cache get error");
                return None;
            }
        };
        match serde_json::from_value::<ValidationResult<Map<String, Value>>>(value) {
            Ok(result) if result.success() => {
                tracing::debug!(key = %key, "validation cache hit");
                Some(result)
            }
            Ok(_) => {
                tracing::warn!(key = %key, "ignoring cached failure result");
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "undecodable validation cache entry");
                None
            }
        }
    }

    /// Store a successful result. Failed results are ignored.
    pub async fn store(
        &self,
        prompt: &str,
        rules: &RuleSet,
        result: &ValidationResult<Map<String, Value>>,
    ) {
        if !result.success() {
            return;
        }
        let key = self.key(prompt, rules);
        let value = match serde_json::to_value(result) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "validation cache serialization error");
                return;
            }
        };
        if let Err(e) = self.store.put(&key, value, self.ttl).await {
            tracing::warn!(key = %key, error = %e, "validation cache put error");
        }
    }
}
