//! Pagination
//!
//! Provider list calls return one page at a time plus an opaque token for
//! the next one. [`Paginator`] hides that behind `has_more_pages` /
//! `next_page`, and [`TokenPaginator`] implements it for any page-token API.

use super::error::ProviderError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashSet;

/// One page of a provider response
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub output: T,
    /// Token for the following page, `None` on the last page
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn new(output: T, next_token: Option<String>) -> Self {
        Self { output, next_token }
    }

    /// A response that is not paginated
    pub fn last(output: T) -> Self {
        Self::new(output, None)
    }
}

#[async_trait]
pub trait Paginator: Send {
    type Output: Send;

    fn has_more_pages(&self) -> bool;

    /// Fetch the next page. Must only be called while `has_more_pages` holds.
    async fn next_page(&mut self) -> Result<Self::Output, ProviderError>;
}

type FetchPage<'a, T> = Box<dyn FnMut(Option<String>) -> BoxFuture<'a, Result<Page<T>, ProviderError>> + Send + 'a>;

/// Paginator over a page-token API
///
/// Stops when the provider returns no token, an empty token, or a token it
/// already returned earlier in the same walk.
pub struct TokenPaginator<'a, T> {
    fetch: FetchPage<'a, T>,
    next_token: Option<String>,
    started: bool,
    seen_tokens: HashSet<String>,
}

impl<'a, T> TokenPaginator<'a, T> {
    pub fn new<F>(fetch: F) -> Self
    where
        F: FnMut(Option<String>) -> BoxFuture<'a, Result<Page<T>, ProviderError>> + Send + 'a,
    {
        Self {
            fetch: Box::new(fetch),
            next_token: None,
            started: false,
            seen_tokens: HashSet::new(),
        }
    }
}

#[async_trait]
impl<'a, T: Send + 'a> Paginator for TokenPaginator<'a, T> {
    type Output = T;

    fn has_more_pages(&self) -> bool {
        !self.started || self.next_token.is_some()
    }

    async fn next_page(&mut self) -> Result<T, ProviderError> {
        if !self.has_more_pages() {
            return Err(ProviderError::Api("no more pages".to_string()));
        }

        let page = (self.fetch)(self.next_token.take()).await?;
        self.started = true;

        self.next_token = match page.next_token {
            Some(token) if token.is_empty() => None,
            Some(token) if !self.seen_tokens.insert(token.clone()) => {
                tracing::warn!("Provider repeated page token {:?}, stopping pagination", token);
                None
            },
            other => other,
        };

        Ok(page.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn collect_pages<P: Paginator>(mut pages: P) -> Result<Vec<P::Output>, ProviderError> {
        let mut outputs = Vec::new();
        while pages.has_more_pages() {
            outputs.push(pages.next_page().await?);
        }
        Ok(outputs)
    }

    fn scripted(pages: Vec<(Vec<u32>, Option<&'static str>)>, calls: Arc<AtomicUsize>) -> TokenPaginator<'static, Vec<u32>> {
        TokenPaginator::new(move |token: Option<String>| {
            let idx = calls.fetch_add(1, Ordering::SeqCst);
            let (items, next) = pages[idx].clone();
            async move {
                // Every call after the first must carry the previous token
                if idx > 0 {
                    assert!(token.is_some());
                }
                Ok(Page::new(items, next.map(str::to_string)))
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_walks_all_pages_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pages = scripted(
            vec![(vec![1, 2], Some("a")), (vec![3], Some("b")), (vec![4, 5], None)],
            calls.clone(),
        );
        let outputs = collect_pages(pages).await.unwrap();
        assert_eq!(outputs, vec![vec![1, 2], vec![3], vec![4, 5]]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_token_ends_walk() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pages = scripted(vec![(vec![1], Some(""))], calls.clone());
        assert_eq!(collect_pages(pages).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_token_ends_walk() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pages = scripted(
            vec![(vec![1], Some("x")), (vec![2], Some("x")), (vec![3], None)],
            calls.clone(),
        );
        assert_eq!(collect_pages(pages).await.unwrap(), vec![vec![1], vec![2]]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_error_stops_walk() {
        let mut pages: TokenPaginator<'static, ()> =
            TokenPaginator::new(|_| async { Err(ProviderError::Api("throttled".into())) }.boxed());
        assert!(pages.has_more_pages());
        assert!(pages.next_page().await.is_err());
        assert!(pages.has_more_pages());
    }
}
