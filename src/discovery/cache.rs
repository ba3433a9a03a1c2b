//! Query result caching
//!
//! Results are cached per (adapter type, method, query, scope). Both item
//! lists and errors are cached: a failing query is replayed from cache until
//! its entry expires, which keeps known-bad lookups from hammering rate
//! limited APIs. Callers that need a fresh answer pass `ignore_cache`, which
//! skips the read but still overwrites the entry with the new result.
//!
//! Expiry is lazy: entries are checked when read. There is no background
//! sweeper, but [`MemoryCache::purge_expired`] can be called periodically.
//!
//! Concurrent misses for the same key are not coalesced; both callers fetch.

use super::error::QueryError;
use super::item::{Item, QueryMethod};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Default lifetime of a cached result
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub adapter: String,
    pub method: QueryMethod,
    pub query: String,
    pub scope: String,
}

impl CacheKey {
    /// Build a key; surrounding whitespace in the query is not significant
    pub fn new(adapter: &str, method: QueryMethod, query: &str, scope: &str) -> Self {
        Self {
            adapter: adapter.to_string(),
            method,
            query: query.trim().to_string(),
            scope: scope.to_string(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.adapter, self.method, self.scope, self.query)
    }
}

/// A cached outcome
#[derive(Debug, Clone, PartialEq)]
pub enum CachedResult {
    Items(Vec<Item>),
    Error(QueryError),
}

#[async_trait]
pub trait Cache: Send + Sync {
    /// Look up an unexpired entry
    async fn get(&self, key: &CacheKey) -> Option<CachedResult>;

    /// Store a successful result
    async fn set(&self, key: CacheKey, items: Vec<Item>, ttl: Duration);

    /// Store a failure to be replayed until `ttl` passes
    async fn set_error(&self, key: CacheKey, err: QueryError, ttl: Duration);

    async fn invalidate(&self, key: &CacheKey);
}

/// Cache that never stores anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCache;

#[async_trait]
impl Cache for NoOpCache {
    async fn get(&self, _key: &CacheKey) -> Option<CachedResult> {
        None
    }

    async fn set(&self, _key: CacheKey, _items: Vec<Item>, _ttl: Duration) {}

    async fn set_error(&self, _key: CacheKey, _err: QueryError, _ttl: Duration) {}

    async fn invalidate(&self, _key: &CacheKey) {}
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedResult,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// In-process TTL cache
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<CacheKey, CacheEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn store(&self, key: CacheKey, value: CachedResult, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key, entry);
    }

    /// Drop every expired entry, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_valid());
        before - entries.len()
    }

    /// Number of stored entries, expired ones included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Option<CachedResult> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_valid() => return Some(entry.value.clone()),
                Some(_) => {},
                None => return None,
            }
        }

        // Expired; evict unless someone refreshed it in the meantime
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| !entry.is_valid()) {
            tracing::trace!("Evicting expired cache entry {}", key);
            entries.remove(key);
        }
        None
    }

    async fn set(&self, key: CacheKey, items: Vec<Item>, ttl: Duration) {
        self.store(key, CachedResult::Items(items), ttl).await;
    }

    async fn set_error(&self, key: CacheKey, err: QueryError, ttl: Duration) {
        self.store(key, CachedResult::Error(err), ttl).await;
    }

    async fn invalidate(&self, key: &CacheKey) {
        self.entries.write().await.remove(key);
    }
}

/// Per-adapter TTL overrides
#[derive(Debug, Clone, Default)]
pub struct TtlPolicy {
    overrides: HashMap<String, Duration>,
}

impl TtlPolicy {
    pub fn new(overrides: HashMap<String, Duration>) -> Self {
        Self { overrides }
    }

    pub fn with_override(mut self, adapter: &str, ttl: Duration) -> Self {
        self.overrides.insert(adapter.to_string(), ttl);
        self
    }

    /// TTL to use for `adapter`, falling back to what the caller asked for
    pub fn ttl_for(&self, adapter: &str, requested: Duration) -> Duration {
        self.overrides.get(adapter).copied().unwrap_or(requested)
    }
}

/// Cache whose TTLs are decided by configuration rather than by the adapter
///
/// Some APIs (IAM-like services) rate-limit hard enough that their results
/// must be kept for hours; the override applies regardless of the TTL the
/// adapter passes in.
#[derive(Clone)]
pub struct ConfiguredTtlCache {
    inner: Arc<dyn Cache>,
    policy: TtlPolicy,
}

impl ConfiguredTtlCache {
    pub fn new(inner: Arc<dyn Cache>, policy: TtlPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Cache for ConfiguredTtlCache {
    async fn get(&self, key: &CacheKey) -> Option<CachedResult> {
        self.inner.get(key).await
    }

    async fn set(&self, key: CacheKey, items: Vec<Item>, ttl: Duration) {
        let ttl = self.policy.ttl_for(&key.adapter, ttl);
        self.inner.set(key, items, ttl).await;
    }

    async fn set_error(&self, key: CacheKey, err: QueryError, ttl: Duration) {
        let ttl = self.policy.ttl_for(&key.adapter, ttl);
        self.inner.set_error(key, err, ttl).await;
    }

    async fn invalidate(&self, key: &CacheKey) {
        self.inner.invalidate(key).await;
    }
}
