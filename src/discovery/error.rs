//! Query error taxonomy
//!
//! Every failure that leaves an adapter is a [`QueryError`]. Provider clients
//! report failures as [`ProviderError`], which the strategies classify into
//! the three query error types.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a failed query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    /// The item does not exist, or the query could never match one
    NotFound,
    /// The adapter does not serve the requested scope
    NoScope,
    /// Anything else
    Other,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorType::NotFound => "NOTFOUND",
            ErrorType::NoScope => "NOSCOPE",
            ErrorType::Other => "OTHER",
        };
        f.write_str(s)
    }
}

/// Error returned by adapter queries
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{error_type}: {error_string}")]
pub struct QueryError {
    pub error_type: ErrorType,
    pub error_string: String,
    pub scope: String,
    /// Name of the adapter that raised the error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,
    /// Item type that was being queried
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
}

impl QueryError {
    pub fn new(error_type: ErrorType, error_string: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            error_type,
            error_string: error_string.into(),
            scope: scope.into(),
            adapter: None,
            item_type: None,
        }
    }

    pub fn not_found(error_string: impl Into<String>, scope: impl Into<String>) -> Self {
        Self::new(ErrorType::NotFound, error_string, scope)
    }

    pub fn no_scope(error_string: impl Into<String>, scope: impl Into<String>) -> Self {
        Self::new(ErrorType::NoScope, error_string, scope)
    }

    pub fn other(error_string: impl Into<String>, scope: impl Into<String>) -> Self {
        Self::new(ErrorType::Other, error_string, scope)
    }

    /// Attach the adapter name and item type, keeping any already set
    pub fn with_context(mut self, adapter: &str, item_type: &str) -> Self {
        self.adapter.get_or_insert_with(|| adapter.to_string());
        self.item_type.get_or_insert_with(|| item_type.to_string());
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.error_type == ErrorType::NotFound
    }
}

/// Failure reported by a provider client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider says the resource does not exist
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Any other API failure (auth, throttling, 5xx, decode)
    #[error("API error: {0}")]
    Api(String),

    /// The call was abandoned because the query was cancelled
    #[error("query cancelled")]
    Cancelled,
}

impl ProviderError {
    pub fn api(err: impl fmt::Display) -> Self {
        ProviderError::Api(err.to_string())
    }

    /// Classify into a query error for `scope`
    pub fn into_query_error(self, scope: &str) -> QueryError {
        match self {
            ProviderError::NotFound(msg) => QueryError::not_found(msg, scope),
            other => QueryError::other(other.to_string(), scope),
        }
    }
}

impl From<anyhow::Error> for ProviderError {
    fn from(err: anyhow::Error) -> Self {
        // Provider plumbing may wrap a classified error in context layers
        match err.downcast_ref::<ProviderError>() {
            Some(inner) => inner.clone(),
            None => ProviderError::Api(format!("{:#}", err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_type_and_message() {
        let err = QueryError::not_found("no such bucket", "proj");
        assert_eq!(err.to_string(), "NOTFOUND: no such bucket");
    }

    #[test]
    fn test_provider_not_found_maps_to_not_found() {
        let err = ProviderError::NotFound("disk-1".into()).into_query_error("proj.zone");
        assert_eq!(err.error_type, ErrorType::NotFound);
        assert_eq!(err.scope, "proj.zone");
    }

    #[test]
    fn test_provider_failures_map_to_other() {
        let err = ProviderError::Api("500".into()).into_query_error("proj");
        assert_eq!(err.error_type, ErrorType::Other);

        let err = ProviderError::Cancelled.into_query_error("proj");
        assert_eq!(err.error_type, ErrorType::Other);
    }

    #[test]
    fn test_anyhow_keeps_classification() {
        let wrapped = anyhow::Error::new(ProviderError::NotFound("x".into())).context("GET failed");
        assert_eq!(ProviderError::from(wrapped), ProviderError::NotFound("x".into()));
    }

    #[test]
    fn test_with_context_does_not_overwrite() {
        let err = QueryError::other("boom", "s")
            .with_context("first", "type-a")
            .with_context("second", "type-b");
        assert_eq!(err.adapter.as_deref(), Some("first"));
        assert_eq!(err.item_type.as_deref(), Some("type-a"));
    }
}
