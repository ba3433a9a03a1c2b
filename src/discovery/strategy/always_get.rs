//! Always-get strategy
//!
//! For APIs whose list call only returns identifiers, or returns records
//! missing fields needed for correct links. List enumerates identifiers and
//! every item is then fetched with the full get call.

use crate::discovery::adapter::{cancellable, search_by_identifier, Adapter, AdapterCore};
use crate::discovery::error::{ProviderError, QueryError};
use crate::discovery::item::{Item, QueryMethod};
use crate::discovery::pagination::{Page, Paginator, TokenPaginator};
use crate::discovery::registry::AdapterMetadata;
use crate::discovery::stream::{QuerySink, RecordingSink};
use async_trait::async_trait;
use futures::stream::{FuturesOrdered, StreamExt};
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait AlwaysGetApi: Send + Sync + 'static {
    type Client: Send + Sync;
    type ListInput: Send + Sync;
    type ListOutput: Send;
    type GetInput: Send;
    type GetOutput: Send;

    fn list_input(&self, scope: &str) -> Result<Self::ListInput, QueryError>;

    async fn list(
        &self,
        client: &Self::Client,
        input: &Self::ListInput,
        page_token: Option<String>,
    ) -> Result<Page<Self::ListOutput>, ProviderError>;

    /// Extract a get request for every resource on a list page
    fn list_output_mapper(&self, scope: &str, output: Self::ListOutput) -> Result<Vec<Self::GetInput>, QueryError>;

    /// Get request for a query string. Malformed queries should fail with
    /// `NotFound`.
    fn get_input(&self, scope: &str, query: &str) -> Result<Self::GetInput, QueryError>;

    async fn get(
        &self,
        client: &Self::Client,
        scope: &str,
        input: Self::GetInput,
    ) -> Result<Self::GetOutput, ProviderError>;

    fn item_mapper(&self, scope: &str, output: Self::GetOutput) -> Result<Item, QueryError>;

    /// List request for a search. `None` means queries are treated as
    /// identifiers.
    async fn search_input(
        &self,
        _client: &Self::Client,
        _scope: &str,
        _query: &str,
    ) -> Option<Result<Self::ListInput, QueryError>> {
        None
    }

    fn post_search_filter(&self, _query: &str, items: Vec<Item>) -> Result<Vec<Item>, QueryError> {
        Ok(items)
    }
}

pub struct AlwaysGetAdapter<A: AlwaysGetApi> {
    core: AdapterCore,
    api: A,
    client: A::Client,
}

impl<A: AlwaysGetApi> AlwaysGetAdapter<A> {
    pub fn new(core: AdapterCore, api: A, client: A::Client) -> Self {
        Self { core, api, client }
    }

    pub fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn get_item(&self, cancel: &CancellationToken, scope: &str, input: A::GetInput) -> Result<Item, QueryError> {
        let output = cancellable(cancel, self.api.get(&self.client, scope, input))
            .await
            .map_err(|e| self.core.provider_error(e, scope))?;
        self.api.item_mapper(scope, output)
    }

    async fn fetch_one(&self, cancel: &CancellationToken, scope: &str, query: &str) -> Result<Item, QueryError> {
        let input = self.api.get_input(scope, query)?;
        self.get_item(cancel, scope, input).await
    }

    /// Walk the list pages, fetching each listed resource. Gets within a page
    /// run concurrently up to `max_parallel` but are emitted in list order.
    async fn stream_gets(
        &self,
        cancel: &CancellationToken,
        scope: &str,
        input: &A::ListInput,
        search_query: Option<&str>,
        sink: &dyn QuerySink,
    ) -> Result<(), QueryError> {
        let api = &self.api;
        let client = &self.client;
        let mut pages = TokenPaginator::new(move |token| api.list(client, input, token));

        while pages.has_more_pages() {
            let output = cancellable(cancel, pages.next_page())
                .await
                .map_err(|e| self.core.provider_error(e, scope))?;
            let inputs = self.api.list_output_mapper(scope, output)?;

            let mut pending = FuturesOrdered::new();
            let mut results: Vec<Result<Item, QueryError>> = Vec::with_capacity(inputs.len());
            for input in inputs {
                if pending.len() >= self.core.max_parallel() {
                    if let Some(result) = pending.next().await {
                        results.push(result);
                    }
                }
                pending.push_back(self.get_item(cancel, scope, input));
            }
            while let Some(result) = pending.next().await {
                results.push(result);
            }

            if cancel.is_cancelled() {
                return Err(self.core.provider_error(ProviderError::Cancelled, scope));
            }

            let mut items = Vec::with_capacity(results.len());
            for result in results {
                match result {
                    Ok(item) => items.push(item),
                    // Deleted between the list and the get
                    Err(err) if err.is_not_found() => {
                        tracing::debug!("{} vanished during list: {}", self.core.item_type(), err.error_string);
                    },
                    Err(err) => sink.send_error(self.core.error(err)).await,
                }
            }

            if let Some(query) = search_query {
                items = self.api.post_search_filter(query, items)?;
            }
            for item in items {
                sink.send_item(item).await;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn stream_input(
        &self,
        cancel: &CancellationToken,
        method: QueryMethod,
        scope: &str,
        query: &str,
        input: Result<A::ListInput, QueryError>,
        ignore_cache: bool,
        sink: &dyn QuerySink,
    ) {
        let Some(key) = self.core.begin_stream(method, scope, query, ignore_cache, sink).await else {
            return;
        };
        let recorder = RecordingSink::new(sink);
        let search_query = (method == QueryMethod::Search).then_some(query);
        let outcome = match input {
            Ok(input) => self.stream_gets(cancel, scope, &input, search_query, &recorder).await,
            Err(err) => Err(err),
        };
        self.core.finish_stream(cancel, key, recorder, outcome).await;
    }
}

#[async_trait]
impl<A: AlwaysGetApi> Adapter for AlwaysGetAdapter<A> {
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
        let input = self.api.list_input(scope);
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
        match self.api.search_input(&self.client, scope, query).await {
            Some(input) => {
                self.stream_input(cancel, QueryMethod::Search, scope, query, input, ignore_cache, sink)
                    .await
            },
            None => search_by_identifier(self, &self.core, cancel, scope, query, ignore_cache, sink).await,
        }
    }
}
