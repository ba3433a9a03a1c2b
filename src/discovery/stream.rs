//! Streaming query results
//!
//! List and search push items to a [`QuerySink`] as pages arrive instead of
//! building the full result in memory.

use super::error::QueryError;
use super::item::Item;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;

/// One streamed result
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Item(Item),
    Error(QueryError),
}

/// Receiver of streamed results
#[async_trait]
pub trait QuerySink: Send + Sync {
    async fn send_item(&self, item: Item);

    async fn send_error(&self, err: QueryError);
}

/// Sink backed by a bounded channel
///
/// `send` waits for capacity, so a slow consumer holds the producer back
/// before it fetches the next page.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<QueryResult>,
}

impl ChannelSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<QueryResult>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    async fn send(&self, result: QueryResult) {
        if self.tx.send(result).await.is_err() {
            tracing::debug!("Query result receiver dropped, discarding result");
        }
    }
}

#[async_trait]
impl QuerySink for ChannelSink {
    async fn send_item(&self, item: Item) {
        self.send(QueryResult::Item(item)).await;
    }

    async fn send_error(&self, err: QueryError) {
        self.send(QueryResult::Error(err)).await;
    }
}

/// Sink that keeps everything in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    results: Mutex<Vec<QueryResult>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<QueryResult>> {
        self.results.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn items(&self) -> Vec<Item> {
        self.lock()
            .iter()
            .filter_map(|r| match r {
                QueryResult::Item(item) => Some(item.clone()),
                QueryResult::Error(_) => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<QueryError> {
        self.lock()
            .iter()
            .filter_map(|r| match r {
                QueryResult::Error(err) => Some(err.clone()),
                QueryResult::Item(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl QuerySink for CollectingSink {
    async fn send_item(&self, item: Item) {
        self.lock().push(QueryResult::Item(item));
    }

    async fn send_error(&self, err: QueryError) {
        self.lock().push(QueryResult::Error(err));
    }
}

/// Forwards to another sink while recording what went through, so a
/// finished stream can be written to the cache
pub(crate) struct RecordingSink<'a> {
    inner: &'a dyn QuerySink,
    items: Mutex<Vec<Item>>,
    errors: AtomicUsize,
}

impl<'a> RecordingSink<'a> {
    pub(crate) fn new(inner: &'a dyn QuerySink) -> Self {
        Self {
            inner,
            items: Mutex::new(Vec::new()),
            errors: AtomicUsize::new(0),
        }
    }

    pub(crate) fn error_count(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }

    pub(crate) fn into_items(self) -> Vec<Item> {
        self.items.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl QuerySink for RecordingSink<'_> {
    async fn send_item(&self, item: Item) {
        // Items that break the node invariants never leave the adapter
        if let Err(err) = item.validate() {
            self.send_error(err).await;
            return;
        }
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(item.clone());
        self.inner.send_item(item).await;
    }

    async fn send_error(&self, err: QueryError) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.inner.send_error(err).await;
    }
}

/// Forwards only the items accepted by a predicate
pub(crate) struct FilterSink<'a, F> {
    inner: &'a dyn QuerySink,
    accept: F,
}

impl<'a, F> FilterSink<'a, F>
where
    F: Fn(&Item) -> bool + Send + Sync,
{
    pub(crate) fn new(inner: &'a dyn QuerySink, accept: F) -> Self {
        Self { inner, accept }
    }
}

#[async_trait]
impl<F> QuerySink for FilterSink<'_, F>
where
    F: Fn(&Item) -> bool + Send + Sync,
{
    async fn send_item(&self, item: Item) {
        if (self.accept)(&item) {
            self.inner.send_item(item).await;
        }
    }

    async fn send_error(&self, err: QueryError) {
        self.inner.send_error(err).await;
    }
}
