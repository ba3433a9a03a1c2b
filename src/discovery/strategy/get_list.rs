//! Get/list strategy
//!
//! For APIs with a get-by-id call and, optionally, a paginated list call
//! that already returns full records.

use crate::discovery::adapter::{cancellable, search_by_identifier, Adapter, AdapterCore};
use crate::discovery::error::{ProviderError, QueryError};
use crate::discovery::item::{Item, QueryMethod};
use crate::discovery::pagination::{Page, Paginator, TokenPaginator};
use crate::discovery::registry::AdapterMetadata;
use crate::discovery::stream::{QuerySink, RecordingSink};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait GetListApi: Send + Sync + 'static {
    type Client: Send + Sync;
    type Output: Send;

    async fn get(&self, client: &Self::Client, scope: &str, query: &str) -> Result<Self::Output, ProviderError>;

    /// Fetch one page of full records. Only called when the metadata
    /// declares list support.
    async fn list(
        &self,
        _client: &Self::Client,
        _scope: &str,
        _page_token: Option<String>,
    ) -> Result<Page<Vec<Self::Output>>, ProviderError> {
        Err(ProviderError::Api("list is not implemented".to_string()))
    }

    /// Provider-side search. `None` means queries are treated as identifiers.
    async fn search(
        &self,
        _client: &Self::Client,
        _scope: &str,
        _query: &str,
    ) -> Option<Result<Vec<Self::Output>, ProviderError>> {
        None
    }

    /// Records to leave out of list results (provider-managed defaults etc.)
    fn list_filter(&self, _output: &Self::Output) -> bool {
        true
    }

    fn item_mapper(&self, scope: &str, output: Self::Output) -> Result<Item, QueryError>;

    fn post_search_filter(&self, _query: &str, items: Vec<Item>) -> Result<Vec<Item>, QueryError> {
        Ok(items)
    }
}

pub struct GetListAdapter<A: GetListApi> {
    core: AdapterCore,
    api: A,
    client: A::Client,
}

impl<A: GetListApi> GetListAdapter<A> {
    pub fn new(core: AdapterCore, api: A, client: A::Client) -> Self {
        Self { core, api, client }
    }

    pub fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn fetch_one(&self, cancel: &CancellationToken, scope: &str, query: &str) -> Result<Item, QueryError> {
        let output = cancellable(cancel, self.api.get(&self.client, scope, query))
            .await
            .map_err(|e| self.core.provider_error(e, scope))?;
        self.api.item_mapper(scope, output)
    }

    async fn stream_list(&self, cancel: &CancellationToken, scope: &str, sink: &dyn QuerySink) -> Result<(), QueryError> {
        let api = &self.api;
        let client = &self.client;
        let mut pages = TokenPaginator::new(move |token| api.list(client, scope, token));

        while pages.has_more_pages() {
            let outputs = cancellable(cancel, pages.next_page())
                .await
                .map_err(|e| self.core.provider_error(e, scope))?;

            for output in outputs.into_iter().filter(|o| self.api.list_filter(o)) {
                match self.api.item_mapper(scope, output) {
                    Ok(item) => sink.send_item(item).await,
                    Err(err) => sink.send_error(self.core.error(err)).await,
                }
            }
        }
        Ok(())
    }

    async fn stream_search(
        &self,
        cancel: &CancellationToken,
        scope: &str,
        query: &str,
        found: Result<Vec<A::Output>, ProviderError>,
        sink: &dyn QuerySink,
    ) -> Result<(), QueryError> {
        if cancel.is_cancelled() {
            return Err(self.core.provider_error(ProviderError::Cancelled, scope));
        }
        let outputs = found.map_err(|e| self.core.provider_error(e, scope))?;
        let items = outputs
            .into_iter()
            .map(|output| self.api.item_mapper(scope, output))
            .collect::<Result<Vec<_>, _>>()?;
        for item in self.api.post_search_filter(query, items)? {
            sink.send_item(item).await;
        }
        Ok(())
    }
}

#[async_trait]
impl<A: GetListApi> Adapter for GetListAdapter<A> {
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
        if let Err(err) = self.core.check_scope(scope) {
            sink.send_error(err).await;
            return;
        }

        let Some(key) = self.core.begin_stream(QueryMethod::Search, scope, query, ignore_cache, sink).await else {
            return;
        };
        let search = cancellable(cancel, async {
            Ok(self.api.search(&self.client, scope, query).await)
        })
        .await;

        match search {
            Ok(None) => search_by_identifier(self, &self.core, cancel, scope, query, ignore_cache, sink).await,
            Ok(Some(found)) => {
                let recorder = RecordingSink::new(sink);
                let outcome = self.stream_search(cancel, scope, query, found, &recorder).await;
                self.core.finish_stream(cancel, key, recorder, outcome).await;
            },
            Err(err) => sink.send_error(self.core.provider_error(err, scope)).await,
        }
    }
}
