//! Describe-only strategy
//!
//! For APIs where one paginated "describe" call serves everything: get is
//! the describe call with a filter that selects one resource, list is the
//! unfiltered call and search is the same call with a search filter.

use crate::discovery::adapter::{cancellable, search_by_identifier, Adapter, AdapterCore};
use crate::discovery::error::{ProviderError, QueryError};
use crate::discovery::item::{Item, QueryMethod};
use crate::discovery::pagination::{Page, Paginator, TokenPaginator};
use crate::discovery::registry::AdapterMetadata;
use crate::discovery::stream::{CollectingSink, QuerySink, RecordingSink};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Provider calls and mappings for a describe-only adapter
#[async_trait]
pub trait DescribeApi: Send + Sync + 'static {
    type Client: Send + Sync;
    type Input: Send + Sync;
    type Output: Send;

    /// Request selecting the single resource named by `query`. Malformed
    /// queries should fail with `NotFound`.
    fn input_mapper_get(&self, scope: &str, query: &str) -> Result<Self::Input, QueryError>;

    /// Request selecting every resource in `scope`
    fn input_mapper_list(&self, scope: &str) -> Result<Self::Input, QueryError>;

    /// Request for a provider-side search. `None` means the adapter has no
    /// custom search and queries are treated as identifiers.
    async fn input_mapper_search(
        &self,
        _client: &Self::Client,
        _scope: &str,
        _query: &str,
    ) -> Option<Result<Self::Input, QueryError>> {
        None
    }

    /// Fetch one page
    async fn describe(
        &self,
        client: &Self::Client,
        input: &Self::Input,
        page_token: Option<String>,
    ) -> Result<Page<Self::Output>, ProviderError>;

    /// Turn one page into items, links included
    async fn output_mapper(
        &self,
        client: &Self::Client,
        scope: &str,
        input: &Self::Input,
        output: Self::Output,
    ) -> Result<Vec<Item>, QueryError>;

    /// Narrow the results of a provider-side search, which may over-fetch
    fn post_search_filter(&self, _query: &str, items: Vec<Item>) -> Result<Vec<Item>, QueryError> {
        Ok(items)
    }
}

pub struct DescribeOnlyAdapter<A: DescribeApi> {
    core: AdapterCore,
    api: A,
    client: A::Client,
}

impl<A: DescribeApi> DescribeOnlyAdapter<A> {
    pub fn new(core: AdapterCore, api: A, client: A::Client) -> Self {
        Self { core, api, client }
    }

    pub fn core(&self) -> &AdapterCore {
        &self.core
    }

    /// Walk every page of `input`, sending mapped items to `sink`
    async fn stream_pages(
        &self,
        cancel: &CancellationToken,
        scope: &str,
        input: &A::Input,
        search_query: Option<&str>,
        sink: &dyn QuerySink,
    ) -> Result<(), QueryError> {
        let api = &self.api;
        let client = &self.client;
        let mut pages = TokenPaginator::new(move |token| api.describe(client, input, token));

        while pages.has_more_pages() {
            let output = cancellable(cancel, pages.next_page())
                .await
                .map_err(|e| self.core.provider_error(e, scope))?;

            let mut items = self.api.output_mapper(&self.client, scope, input, output).await?;
            if let Some(query) = search_query {
                items = self.api.post_search_filter(query, items)?;
            }
            for item in items {
                sink.send_item(item).await;
            }
        }
        Ok(())
    }

    async fn fetch_one(&self, cancel: &CancellationToken, scope: &str, query: &str) -> Result<Item, QueryError> {
        let input = self.api.input_mapper_get(scope, query)?;
        let collected = CollectingSink::new();
        self.stream_pages(cancel, scope, &input, None, &collected).await?;

        let mut items = collected.items();
        match items.len() {
            0 => Err(QueryError::not_found(
                format!("{} {} not found", self.core.item_type(), query),
                scope,
            )),
            1 => Ok(items.remove(0)),
            n => Err(QueryError::other(
                format!("expected one {} for {:?}, describe returned {}", self.core.item_type(), query, n),
                scope,
            )),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn stream_input(
        &self,
        cancel: &CancellationToken,
        method: QueryMethod,
        scope: &str,
        query: &str,
        input: Result<A::Input, QueryError>,
        ignore_cache: bool,
        sink: &dyn QuerySink,
    ) {
        let Some(key) = self.core.begin_stream(method, scope, query, ignore_cache, sink).await else {
            return;
        };
        let recorder = RecordingSink::new(sink);
        let search_query = (method == QueryMethod::Search).then_some(query);
        let outcome = match input {
            Ok(input) => self.stream_pages(cancel, scope, &input, search_query, &recorder).await,
            Err(err) => Err(err),
        };
        self.core.finish_stream(cancel, key, recorder, outcome).await;
    }
}

#[async_trait]
impl<A: DescribeApi> Adapter for DescribeOnlyAdapter<A> {
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
        let input = self.api.input_mapper_list(scope);
        self.stream_input(cancel, QueryMethod::List, scope, "", input, ignore_cache, sink)
            .await;
    }

    async fn search(
        &self,
        cancel: &CancellationToken,
        scope: &str,
        query: &str,
        ignore_cache: bool,
        sink: &dyn QuerySink,
    ) {
        if let Err(err) = self.core.check_scope(scope) {
            sink.send_error(err).await;
            return;
        }
        match self.api.input_mapper_search(&self.client, scope, query).await {
            Some(input) => {
                self.stream_input(cancel, QueryMethod::Search, scope, query, input, ignore_cache, sink)
                    .await
            },
            None => search_by_identifier(self, &self.core, cancel, scope, query, ignore_cache, sink).await,
        }
    }
}
