//! GCP adapters
//!
//! One adapter per resource type and scope, each built on the strategy that
//! fits its API:
//!
//! - [`compute_instance`] - describe-only (`instances.list` with filters)
//! - [`compute_network`] - get/list
//! - [`compute_disk`] - always-get (list returns names only)
//! - [`storage_bucket`] - get/list enriched with IAM policy and tags
//!
//! [`bootstrap`] registers every adapter's metadata and builds the
//! [`AdapterSet`] the CLI queries. Queries against the wildcard scope `*`
//! fan out over every adapter of the type.

pub mod common;
pub mod compute_disk;
pub mod compute_instance;
pub mod compute_network;
pub mod storage_bucket;

use crate::discovery::adapter::{Adapter, AdapterCore, IdentifierFormat, DEFAULT_MAX_PARALLEL};
use crate::discovery::cache::{Cache, DEFAULT_CACHE_TTL};
use crate::discovery::error::{ErrorType, QueryError};
use crate::discovery::item::Item;
use crate::discovery::registry::{AdapterMetadata, MetadataRegistry, MetadataRegistryBuilder, RegistryError};
use crate::discovery::scope::is_wildcard;
use crate::discovery::strategy::{AlwaysGetAdapter, DescribeOnlyAdapter, EnrichedAdapter, GetListAdapter};
use crate::discovery::stream::QuerySink;
use crate::gcp::client::GcpClient;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Identifier partition of GCP resources
pub const PARTITION: &str = "gcp";

/// What to build adapters for
#[derive(Clone)]
pub struct BootstrapOptions {
    pub projects: Vec<String>,
    /// Zones for the zonal adapters
    pub zones: Vec<String>,
    pub cache: Arc<dyn Cache>,
    pub cache_ttl: Duration,
    pub max_parallel: usize,
}

impl BootstrapOptions {
    pub fn new(projects: Vec<String>, zones: Vec<String>, cache: Arc<dyn Cache>) -> Self {
        Self {
            projects,
            zones,
            cache,
            cache_ttl: DEFAULT_CACHE_TTL,
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }
}

/// Every adapter built at startup, plus their frozen metadata
#[derive(Clone)]
pub struct AdapterSet {
    registry: MetadataRegistry,
    adapters: BTreeMap<String, Vec<Arc<dyn Adapter>>>,
}

impl AdapterSet {
    /// Group `adapters` by type next to their frozen metadata
    pub fn new(registry: MetadataRegistry, adapters: impl IntoIterator<Item = Arc<dyn Adapter>>) -> Self {
        let mut by_type: BTreeMap<String, Vec<Arc<dyn Adapter>>> = BTreeMap::new();
        for adapter in adapters {
            by_type.entry(adapter.adapter_type().to_string()).or_default().push(adapter);
        }
        Self {
            registry,
            adapters: by_type,
        }
    }

    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    /// Adapters of one type, one per scope
    pub fn adapters(&self, item_type: &str) -> &[Arc<dyn Adapter>] {
        self.adapters.get(item_type).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every scope some adapter of `item_type` serves
    pub fn scopes(&self, item_type: &str) -> Vec<String> {
        self.adapters(item_type).iter().flat_map(|a| a.scopes()).collect()
    }

    /// The adapter answering `item_type` queries in `scope`
    pub fn find(&self, item_type: &str, scope: &str) -> Result<Arc<dyn Adapter>, QueryError> {
        if self.registry.get(item_type).is_none() {
            return Err(QueryError::other(format!("no adapter for type {:?}", item_type), scope));
        }
        self.adapters(item_type)
            .iter()
            .find(|adapter| adapter.scopes().iter().any(|s| s == scope))
            .cloned()
            .ok_or_else(|| {
                QueryError::no_scope(format!("no {} adapter serves scope {}", item_type, scope), scope)
                    .with_context(&format!("{}-adapter", item_type), item_type)
            })
    }

    /// Adapters a query against `scope` goes to: the one serving it, or every
    /// adapter of the type for the wildcard scope
    pub fn route(&self, item_type: &str, scope: &str) -> Result<Vec<Arc<dyn Adapter>>, QueryError> {
        if !is_wildcard(scope) {
            return self.find(item_type, scope).map(|adapter| vec![adapter]);
        }
        if self.registry.get(item_type).is_none() {
            return Err(QueryError::other(format!("no adapter for type {:?}", item_type), scope));
        }
        let adapters = self.adapters(item_type).to_vec();
        if adapters.is_empty() {
            return Err(QueryError::no_scope(format!("no {} adapter was built", item_type), scope));
        }
        Ok(adapters)
    }

    /// Get one item. Under the wildcard scope every adapter is asked in turn
    /// and the first answer other than `NotFound` wins.
    pub async fn get(
        &self,
        cancel: &CancellationToken,
        item_type: &str,
        scope: &str,
        query: &str,
        ignore_cache: bool,
    ) -> Result<Item, QueryError> {
        if !is_wildcard(scope) {
            return self.find(item_type, scope)?.get(cancel, scope, query, ignore_cache).await;
        }

        for adapter in self.route(item_type, scope)? {
            for adapter_scope in adapter.scopes() {
                match adapter.get(cancel, &adapter_scope, query, ignore_cache).await {
                    Err(err) if err.error_type == ErrorType::NotFound => {
                        tracing::debug!("{} {} not in {}", item_type, query, adapter_scope);
                    },
                    result => return result,
                }
            }
        }
        Err(QueryError::not_found(format!("{} {:?} not found in any scope", item_type, query), scope))
    }

    /// Stream every item of `item_type` in `scope`
    pub async fn list(
        &self,
        cancel: &CancellationToken,
        item_type: &str,
        scope: &str,
        ignore_cache: bool,
        sink: &dyn QuerySink,
    ) {
        self.stream(cancel, item_type, scope, None, ignore_cache, sink).await;
    }

    /// Stream the items of `item_type` matching `query` in `scope`
    pub async fn search(
        &self,
        cancel: &CancellationToken,
        item_type: &str,
        scope: &str,
        query: &str,
        ignore_cache: bool,
        sink: &dyn QuerySink,
    ) {
        self.stream(cancel, item_type, scope, Some(query), ignore_cache, sink).await;
    }

    async fn stream(
        &self,
        cancel: &CancellationToken,
        item_type: &str,
        scope: &str,
        query: Option<&str>,
        ignore_cache: bool,
        sink: &dyn QuerySink,
    ) {
        let adapters = match self.route(item_type, scope) {
            Ok(adapters) => adapters,
            Err(err) => {
                sink.send_error(err).await;
                return;
            },
        };

        if !is_wildcard(scope) {
            for adapter in adapters {
                run_stream(adapter.as_ref(), cancel, scope, query, ignore_cache, sink).await;
            }
            return;
        }

        // An identifier naming one scope is out of scope for every other adapter
        let fan_out = FanOutSink { inner: sink };
        for adapter in adapters {
            for adapter_scope in adapter.scopes() {
                if cancel.is_cancelled() {
                    return;
                }
                run_stream(adapter.as_ref(), cancel, &adapter_scope, query, ignore_cache, &fan_out).await;
            }
        }
    }
}

async fn run_stream(
    adapter: &dyn Adapter,
    cancel: &CancellationToken,
    scope: &str,
    query: Option<&str>,
    ignore_cache: bool,
    sink: &dyn QuerySink,
) {
    match query {
        Some(query) => adapter.search(cancel, scope, query, ignore_cache, sink).await,
        None => adapter.list(cancel, scope, ignore_cache, sink).await,
    }
}

/// Forwards a wildcard fan-out, dropping the `NoScope` answers of adapters
/// the query does not concern
struct FanOutSink<'a> {
    inner: &'a dyn QuerySink,
}

#[async_trait]
impl QuerySink for FanOutSink<'_> {
    async fn send_item(&self, item: Item) {
        self.inner.send_item(item).await;
    }

    async fn send_error(&self, err: QueryError) {
        if err.error_type == ErrorType::NoScope {
            tracing::debug!("Skipping out of scope answer: {}", err);
            return;
        }
        self.inner.send_error(err).await;
    }
}

struct Builder<'a> {
    options: &'a BootstrapOptions,
    registry: MetadataRegistryBuilder,
    adapters: Vec<Arc<dyn Adapter>>,
}

impl Builder<'_> {
    fn core(&self, metadata: AdapterMetadata, project: &str, location: &str, format: IdentifierFormat) -> AdapterCore {
        AdapterCore::new(metadata, project, location, self.options.cache.clone())
            .with_cache_ttl(self.options.cache_ttl)
            .with_max_parallel(self.options.max_parallel)
            .with_identifier_format(format)
    }

    fn register(&mut self, metadata: AdapterMetadata) -> Result<(), RegistryError> {
        self.registry.register(metadata)
    }

    fn add(&mut self, adapter: Arc<dyn Adapter>) {
        self.adapters.push(adapter);
    }
}

/// Metadata of every adapter type, in registration order
pub fn all_metadata() -> Vec<AdapterMetadata> {
    vec![
        compute_instance::metadata(),
        compute_disk::metadata(),
        compute_network::metadata(),
        storage_bucket::metadata(),
    ]
}

/// Frozen registry of every adapter type, without building adapters
pub fn metadata_registry() -> Result<MetadataRegistry, RegistryError> {
    let mut builder = MetadataRegistry::builder();
    for metadata in all_metadata() {
        builder.register(metadata)?;
    }
    Ok(builder.build())
}

/// Register metadata and build one adapter per type and scope
///
/// A duplicate metadata registration is a programming error and aborts
/// startup.
pub fn bootstrap(client: &GcpClient, options: &BootstrapOptions) -> Result<AdapterSet, RegistryError> {
    let mut builder = Builder {
        options,
        registry: MetadataRegistry::builder(),
        adapters: Vec::new(),
    };

    for metadata in all_metadata() {
        builder.register(metadata)?;
    }

    for project in &options.projects {
        for zone in &options.zones {
            let core = builder.core(
                compute_instance::metadata(),
                project,
                zone,
                IdentifierFormat::new(PARTITION, "compute", "instance"),
            );
            builder.add(Arc::new(DescribeOnlyAdapter::new(
                core,
                compute_instance::ComputeInstanceApi,
                client.clone(),
            )));

            let core = builder.core(
                compute_disk::metadata(),
                project,
                zone,
                IdentifierFormat::new(PARTITION, "compute", "disk"),
            );
            builder.add(Arc::new(AlwaysGetAdapter::new(core, compute_disk::ComputeDiskApi, client.clone())));
        }

        let core = builder.core(
            compute_network::metadata(),
            project,
            "",
            IdentifierFormat::new(PARTITION, "compute", "network").global(),
        );
        builder.add(Arc::new(GetListAdapter::new(core, compute_network::ComputeNetworkApi, client.clone())));

        let core = builder.core(
            storage_bucket::metadata(),
            project,
            "",
            IdentifierFormat::new(PARTITION, "storage", "bucket").global(),
        );
        builder.add(Arc::new(EnrichedAdapter::new(core, storage_bucket::StorageBucketApi, client.clone())));
    }

    let registry = builder.registry.build();
    let unresolved = registry.unresolved_links();
    if !unresolved.is_empty() {
        tracing::debug!("Link targets without an adapter: {:?}", unresolved);
    }
    tracing::info!(
        "Bootstrapped {} adapters across {} types",
        builder.adapters.len(),
        registry.len()
    );

    Ok(AdapterSet::new(registry, builder.adapters))
}
