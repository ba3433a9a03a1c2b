//! Adapter contract and the machinery shared by every strategy
//!
//! [`Adapter`] is the uniform get / list / search surface. The strategies in
//! [`super::strategy`] implement it on top of [`AdapterCore`], which owns the
//! scope check, the cache protocol and identifier resolution.

use super::cache::{Cache, CacheKey, CachedResult, DEFAULT_CACHE_TTL};
use super::error::{ProviderError, QueryError};
use super::identifier::Identifier;
use super::item::{Item, QueryMethod};
use super::registry::AdapterMetadata;
use super::scope::{format_scope, parse_scope, scope_accepts};
use super::stream::{FilterSink, QuerySink, RecordingSink};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default number of concurrent per-item calls during a list
pub const DEFAULT_MAX_PARALLEL: usize = 10;

/// Uniform query surface of one resource type
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Item type this adapter returns
    fn adapter_type(&self) -> &str;

    fn name(&self) -> &str;

    /// Scopes this adapter answers for
    fn scopes(&self) -> Vec<String>;

    fn metadata(&self) -> &AdapterMetadata;

    /// Fetch exactly one item
    async fn get(
        &self,
        cancel: &CancellationToken,
        scope: &str,
        query: &str,
        ignore_cache: bool,
    ) -> Result<Item, QueryError>;

    /// Stream every item in `scope`
    async fn list(&self, cancel: &CancellationToken, scope: &str, ignore_cache: bool, sink: &dyn QuerySink);

    /// Stream the items matching `query`
    async fn search(
        &self,
        cancel: &CancellationToken,
        scope: &str,
        query: &str,
        ignore_cache: bool,
        sink: &dyn QuerySink,
    );
}

/// Race a provider call against cancellation
pub async fn cancellable<T, F>(cancel: &CancellationToken, call: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProviderError::Cancelled),
        result = call => result,
    }
}

/// How an adapter's items are named as [`Identifier`]s
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierFormat {
    pub partition: String,
    pub service: String,
    pub resource_type: String,
    /// Account-global resources carry no region in their identifier
    pub global: bool,
}

impl IdentifierFormat {
    pub fn new(partition: &str, service: &str, resource_type: &str) -> Self {
        Self {
            partition: partition.to_string(),
            service: service.to_string(),
            resource_type: resource_type.to_string(),
            global: false,
        }
    }

    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }

    fn accepts(&self, id: &Identifier) -> bool {
        id.partition == self.partition
            && id.service == self.service
            && id.resource_type() == self.resource_type
    }
}

/// State and behaviour common to every strategy
pub struct AdapterCore {
    metadata: AdapterMetadata,
    name: String,
    account_id: String,
    region: String,
    cache: Arc<dyn Cache>,
    cache_ttl: Duration,
    max_parallel: usize,
    identifier_format: Option<IdentifierFormat>,
}

impl AdapterCore {
    pub fn new(metadata: AdapterMetadata, account_id: &str, region: &str, cache: Arc<dyn Cache>) -> Self {
        let name = format!("{}-adapter", metadata.item_type);
        Self {
            metadata,
            name,
            account_id: account_id.to_string(),
            region: region.to_string(),
            cache,
            cache_ttl: DEFAULT_CACHE_TTL,
            max_parallel: DEFAULT_MAX_PARALLEL,
            identifier_format: None,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn with_identifier_format(mut self, format: IdentifierFormat) -> Self {
        self.identifier_format = Some(format);
        self
    }

    pub fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    pub fn item_type(&self) -> &str {
        &self.metadata.item_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// The single scope this adapter serves
    pub fn scope(&self) -> String {
        format_scope(&self.account_id, &self.region)
    }

    pub fn scopes(&self) -> Vec<String> {
        vec![self.scope()]
    }

    /// Fail fast, before any provider call, for scopes this adapter does not
    /// serve
    pub fn check_scope(&self, scope: &str) -> Result<(), QueryError> {
        if scope == self.scope() {
            return Ok(());
        }
        Err(self.error(QueryError::no_scope(
            format!("requested scope {} does not match adapter scope {}", scope, self.scope()),
            scope,
        )))
    }

    /// Tag an error with this adapter's name and type
    pub fn error(&self, err: QueryError) -> QueryError {
        err.with_context(&self.name, &self.metadata.item_type)
    }

    pub fn provider_error(&self, err: ProviderError, scope: &str) -> QueryError {
        self.error(err.into_query_error(scope))
    }

    /// Fail with an "unsupported" error unless the metadata declares `method`
    pub fn check_supported(&self, method: QueryMethod, scope: &str) -> Result<(), QueryError> {
        let methods = &self.metadata.supported_query_methods;
        let supported = match method {
            QueryMethod::Get => methods.get,
            QueryMethod::List => methods.list,
            QueryMethod::Search => methods.search,
        };
        if supported {
            Ok(())
        } else {
            Err(self.error(QueryError::other(
                format!("{} does not support {}", self.metadata.item_type, method),
                scope,
            )))
        }
    }

    pub fn cache_key(&self, method: QueryMethod, query: &str, scope: &str) -> CacheKey {
        CacheKey::new(&self.metadata.item_type, method, query, scope)
    }

    async fn lookup(&self, key: &CacheKey, ignore_cache: bool) -> Option<CachedResult> {
        if ignore_cache {
            tracing::debug!("Cache bypassed for {}", key);
            return None;
        }
        let hit = self.cache.get(key).await;
        if hit.is_some() {
            tracing::debug!("Cache hit for {}", key);
        } else {
            tracing::debug!("Cache miss for {}", key);
        }
        hit
    }

    async fn store_error(&self, cancel: &CancellationToken, key: CacheKey, err: &QueryError) {
        if cancel.is_cancelled() {
            return;
        }
        self.cache.set_error(key, err.clone(), self.cache_ttl).await;
    }

    /// Run the get protocol around `fetch`
    ///
    /// `fetch` is only polled on a cache miss (or bypass). Its result, item or
    /// error, is validated and written back to the cache unless the query was
    /// cancelled.
    pub async fn cached_get<F>(
        &self,
        cancel: &CancellationToken,
        scope: &str,
        query: &str,
        ignore_cache: bool,
        fetch: F,
    ) -> Result<Item, QueryError>
    where
        F: Future<Output = Result<Item, QueryError>> + Send,
    {
        self.check_scope(scope)?;
        self.check_supported(QueryMethod::Get, scope)?;

        let key = self.cache_key(QueryMethod::Get, query, scope);
        match self.lookup(&key, ignore_cache).await {
            Some(CachedResult::Error(err)) => return Err(err),
            Some(CachedResult::Items(items)) => {
                return items.into_iter().next().ok_or_else(|| {
                    self.error(QueryError::not_found(format!("{} not found", query), scope))
                });
            },
            None => {},
        }

        let result = fetch.await.and_then(|item| item.validate().map(|_| item));
        match result {
            Ok(item) => {
                if !cancel.is_cancelled() {
                    self.cache.set(key, vec![item.clone()], self.cache_ttl).await;
                }
                Ok(item)
            },
            Err(err) => {
                let err = self.error(err);
                self.store_error(cancel, key, &err).await;
                Err(err)
            },
        }
    }

    /// Start a list or search stream: check the scope and replay a cached
    /// result. Returns the cache key to finish with, or `None` when the
    /// request was fully answered here.
    pub async fn begin_stream(
        &self,
        method: QueryMethod,
        scope: &str,
        query: &str,
        ignore_cache: bool,
        sink: &dyn QuerySink,
    ) -> Option<CacheKey> {
        if let Err(err) = self
            .check_scope(scope)
            .and_then(|_| self.check_supported(method, scope))
        {
            sink.send_error(err).await;
            return None;
        }

        let key = self.cache_key(method, query, scope);
        match self.lookup(&key, ignore_cache).await {
            Some(CachedResult::Items(items)) => {
                for item in items {
                    sink.send_item(item).await;
                }
                None
            },
            Some(CachedResult::Error(err)) => {
                sink.send_error(err).await;
                None
            },
            None => Some(key),
        }
    }

    /// Finish a stream started with [`begin_stream`](Self::begin_stream)
    ///
    /// A stream-level failure is sent and cached. A clean stream caches its
    /// items; a list also seeds the get cache for each item so a follow-up
    /// get is free. Streams that reported per-item errors are not cached, so
    /// a replay cannot hide those errors.
    pub(crate) async fn finish_stream(
        &self,
        cancel: &CancellationToken,
        key: CacheKey,
        recorder: RecordingSink<'_>,
        outcome: Result<(), QueryError>,
    ) {
        if let Err(err) = outcome {
            let err = self.error(err);
            recorder.send_error(err.clone()).await;
            self.store_error(cancel, key, &err).await;
            return;
        }
        if cancel.is_cancelled() {
            return;
        }
        if recorder.error_count() > 0 {
            tracing::debug!(
                "Not caching {}: {} item errors were streamed",
                key,
                recorder.error_count()
            );
            return;
        }

        let items = recorder.into_items();
        if key.method == QueryMethod::List {
            for item in &items {
                if item.scope != key.scope {
                    continue;
                }
                if let Some(value) = item.unique_attribute_value() {
                    let get_key = self.cache_key(QueryMethod::Get, &value, &key.scope);
                    self.cache.set(get_key, vec![item.clone()], self.cache_ttl).await;
                }
            }
        }
        self.cache.set(key, items, self.cache_ttl).await;
    }

    /// Identifier naming `item`, when this adapter has an identifier format
    pub fn item_identifier(&self, item: &Item) -> Option<Identifier> {
        let format = self.identifier_format.as_ref()?;
        let (account, region) = parse_scope(&item.scope).ok()?;
        let region = if format.global { String::new() } else { region };
        Some(Identifier::new(
            &format.partition,
            &format.service,
            &region,
            &account,
            &format.resource_type,
            &item.unique_attribute_value()?,
        ))
    }

    /// Parse a search query as an identifier for this adapter's resources
    ///
    /// Malformed identifiers and identifiers for other resource kinds are
    /// `NotFound`: there is nothing to link to, not a failure.
    pub fn parse_identifier_query(&self, scope: &str, query: &str) -> Result<Identifier, QueryError> {
        let id = Identifier::parse(query)
            .map_err(|e| self.error(QueryError::not_found(e.to_string(), scope)))?;

        if let Some(format) = &self.identifier_format {
            if !format.accepts(&id) {
                return Err(self.error(QueryError::not_found(
                    format!("identifier {} does not name a {}", id, self.metadata.item_type),
                    scope,
                )));
            }
        }

        if !id.has_wildcards() && !scope_accepts(scope, &id.scope()) {
            return Err(self.error(QueryError::no_scope(
                format!("identifier scope {} does not match requested scope {}", id.scope(), scope),
                scope,
            )));
        }

        Ok(id)
    }
}

/// Default search: treat the query as an identifier
///
/// A concrete identifier becomes a get on its resource id. An identifier with
/// wildcards lists the scope and keeps the items whose own identifier the
/// pattern matches.
pub async fn search_by_identifier<A>(
    adapter: &A,
    core: &AdapterCore,
    cancel: &CancellationToken,
    scope: &str,
    query: &str,
    ignore_cache: bool,
    sink: &dyn QuerySink,
) where
    A: Adapter + ?Sized,
{
    if let Err(err) = core
        .check_scope(scope)
        .and_then(|_| core.check_supported(QueryMethod::Search, scope))
    {
        sink.send_error(err).await;
        return;
    }
    let id = match core.parse_identifier_query(scope, query) {
        Ok(id) => id,
        Err(err) => {
            sink.send_error(err).await;
            return;
        },
    };

    if id.has_wildcards() {
        let filter = FilterSink::new(sink, |item: &Item| {
            core.item_identifier(item)
                .is_some_and(|candidate| id.wildcard_matches(&candidate.to_string()))
        });
        adapter.list(cancel, scope, ignore_cache, &filter).await;
        return;
    }

    match adapter.get(cancel, scope, id.resource_id(), ignore_cache).await {
        Ok(item) => sink.send_item(item).await,
        Err(err) => sink.send_error(err).await,
    }
}
