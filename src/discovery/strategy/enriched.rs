//! Get/list strategy with secondary enrichment
//!
//! The base record is fetched with get or list, then decorated by secondary
//! calls: a tag lookup and any number of named lookups (IAM policy, group
//! membership, ...). A failed secondary call never fails the item: tags are
//! left as the item mapper set them, and a failed lookup stores an
//! `{"error": "..."}` marker under its attribute name.

use crate::discovery::adapter::{cancellable, search_by_identifier, Adapter, AdapterCore};
use crate::discovery::error::{ProviderError, QueryError};
use crate::discovery::item::{Item, QueryMethod};
use crate::discovery::pagination::{Page, Paginator, TokenPaginator};
use crate::discovery::registry::AdapterMetadata;
use crate::discovery::stream::{QuerySink, RecordingSink};
use async_trait::async_trait;
use futures::stream::{FuturesOrdered, StreamExt};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait EnrichedApi: Send + Sync + 'static {
    type Client: Send + Sync;
    type Output: Send + Sync;

    async fn get(&self, client: &Self::Client, scope: &str, query: &str) -> Result<Self::Output, ProviderError>;

    async fn list(
        &self,
        _client: &Self::Client,
        _scope: &str,
        _page_token: Option<String>,
    ) -> Result<Page<Vec<Self::Output>>, ProviderError> {
        Err(ProviderError::Api("list is not implemented".to_string()))
    }

    /// Base item, before any secondary call
    fn item_mapper(&self, scope: &str, output: &Self::Output) -> Result<Item, QueryError>;

    /// Tag lookup. `None` means the base record already carries the tags.
    async fn list_tags(
        &self,
        _client: &Self::Client,
        _item: &Item,
    ) -> Option<Result<BTreeMap<String, String>, ProviderError>> {
        None
    }

    /// Attribute names of the secondary lookups, run in this order
    fn enrichments(&self) -> &'static [&'static str] {
        &[]
    }

    /// Run the secondary lookup stored under `name`
    async fn enrich(
        &self,
        _client: &Self::Client,
        _scope: &str,
        name: &str,
        _output: &Self::Output,
    ) -> Result<Value, ProviderError> {
        Err(ProviderError::Api(format!("no enrichment named {}", name)))
    }

    /// Add links derived from a successful lookup
    fn link_enrichment(&self, _scope: &str, _name: &str, _value: &Value, _item: &mut Item) {}
}

pub struct EnrichedAdapter<A: EnrichedApi> {
    core: AdapterCore,
    api: A,
    client: A::Client,
}

impl<A: EnrichedApi> EnrichedAdapter<A> {
    pub fn new(core: AdapterCore, api: A, client: A::Client) -> Self {
        Self { core, api, client }
    }

    pub fn core(&self) -> &AdapterCore {
        &self.core
    }

    /// Build the item for one record and run its secondary calls
    async fn build_item(
        &self,
        cancel: &CancellationToken,
        scope: &str,
        output: A::Output,
    ) -> Result<Item, QueryError> {
        let mut item = self.api.item_mapper(scope, &output)?;

        for name in self.api.enrichments() {
            match cancellable(cancel, self.api.enrich(&self.client, scope, name, &output)).await {
                Ok(value) => {
                    self.api.link_enrichment(scope, name, &value, &mut item);
                    item.attributes.set(*name, value);
                },
                Err(ProviderError::Cancelled) => {
                    return Err(self.core.provider_error(ProviderError::Cancelled, scope));
                },
                Err(err) => {
                    tracing::warn!(
                        "{} lookup failed for {}: {}",
                        name,
                        item.global_unique_attribute(),
                        err
                    );
                    item.attributes.set(*name, json!({ "error": err.to_string() }));
                },
            }
        }

        let tags = cancellable(cancel, async { Ok(self.api.list_tags(&self.client, &item).await) }).await;
        match tags {
            Ok(None) => {},
            Ok(Some(Ok(tags))) => item.tags.extend(tags),
            Ok(Some(Err(ProviderError::Cancelled))) | Err(_) => {
                return Err(self.core.provider_error(ProviderError::Cancelled, scope));
            },
            Ok(Some(Err(err))) => {
                tracing::warn!("Tag lookup failed for {}: {}", item.global_unique_attribute(), err);
            },
        }

        Ok(item)
    }

    async fn fetch_one(&self, cancel: &CancellationToken, scope: &str, query: &str) -> Result<Item, QueryError> {
        let output = cancellable(cancel, self.api.get(&self.client, scope, query))
            .await
            .map_err(|e| self.core.provider_error(e, scope))?;
        self.build_item(cancel, scope, output).await
    }

    async fn stream_list(&self, cancel: &CancellationToken, scope: &str, sink: &dyn QuerySink) -> Result<(), QueryError> {
        let api = &self.api;
        let client = &self.client;
        let mut pages = TokenPaginator::new(move |token| api.list(client, scope, token));

        while pages.has_more_pages() {
            let outputs = cancellable(cancel, pages.next_page())
                .await
                .map_err(|e| self.core.provider_error(e, scope))?;

            let mut pending = FuturesOrdered::new();
            let mut results = Vec::with_capacity(outputs.len());
            for output in outputs {
                if pending.len() >= self.core.max_parallel() {
                    if let Some(result) = pending.next().await {
                        results.push(result);
                    }
                }
                pending.push_back(self.build_item(cancel, scope, output));
            }
            while let Some(result) = pending.next().await {
                results.push(result);
            }

            if cancel.is_cancelled() {
                return Err(self.core.provider_error(ProviderError::Cancelled, scope));
            }
            for result in results {
                match result {
                    Ok(item) => sink.send_item(item).await,
                    Err(err) => sink.send_error(self.core.error(err)).await,
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<A: EnrichedApi> Adapter for EnrichedAdapter<A> {
    fn adapter_type(&self) -> &str {
        self.core.item_type()
    }

    fn name(&self) -> &str {
        self.core.name()
    }

    fn scopes(&self) -> Vec<String> {
        self.core.scopes()
    }

    fn metadata(&self) -> &AdapterMetadata {
        self.core.metadata()
    }

    async fn get(
        &self,
        cancel: &CancellationToken,
        scope: &str,
        query: &str,
        ignore_cache: bool,
    ) -> Result<Item, QueryError> {
        self.core
            .cached_get(cancel, scope, query, ignore_cache, self.fetch_one(cancel, scope, query))
            .await
    }

    async fn list(&self, cancel: &CancellationToken, scope: &str, ignore_cache: bool, sink: &dyn QuerySink) {
        let Some(key) = self.core.begin_stream(QueryMethod::List, scope, "", ignore_cache, sink).await else {
            return;
        };
        let recorder = RecordingSink::new(sink);
        let outcome = self.stream_list(cancel, scope, &recorder).await;
        self.core.finish_stream(cancel, key, recorder, outcome).await;
    }

    async fn search(
        &self,
        cancel: &CancellationToken,
        scope: &str,
        query: &str,
        ignore_cache: bool,
        sink: &dyn QuerySink,
    ) {
        search_by_identifier(self, &self.core, cancel, scope, query, ignore_cache, sink).await;
    }
}
