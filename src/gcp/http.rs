//! HTTP utilities for GCP REST API calls
//!
//! Failed responses are classified into [`ProviderError`]s (wrapped in the
//! returned `anyhow::Error`) so adapters can tell a missing resource from
//! any other failure.

use crate::discovery::error::ProviderError;
use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Pull the human readable message out of a GCP error body
///
/// GCP wraps errors as `{"error": {"code": 404, "message": "..."}}`.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .and_then(Value::as_str)
        .map(|s| s.chars().filter(|c| c.is_ascii_graphic() || *c == ' ').take(160).collect())
}

/// Map a failed status to a provider error
pub fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let message = error_message(body).unwrap_or_else(|| status.to_string());
    match status {
        StatusCode::NOT_FOUND => ProviderError::NotFound(message),
        _ => ProviderError::Api(format!("{} ({})", message, status.as_u16())),
    }
}

/// HTTP client wrapper for GCP API calls
#[derive(Clone)]
pub struct GcpHttpClient {
    client: Client,
}

impl GcpHttpClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("blastscan/{}", crate::VERSION))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Make a GET request to a GCP API
    pub async fn get(&self, url: &str, token: &str, query: &[(&str, &str)]) -> Result<Value> {
        tracing::debug!("GET {} {:?}", url, query);

        let response = self
            .client
            .get(url)
            .query(query)
            .bearer_auth(token)
            .send()
            .await
            .map_err(ProviderError::api)
            .context("Failed to send request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(ProviderError::api)
            .context("Failed to read response body")?;

        if !status.is_success() {
            if status == StatusCode::NOT_FOUND {
                tracing::debug!("GET {} returned {}", url, status);
            } else {
                // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
                tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            }
            return Err(classify_status(status, &body).into());
        }

        serde_json::from_str(&body)
            .map_err(ProviderError::api)
            .context("Failed to parse response JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.starts_with(&"x".repeat(200)));
        assert!(sanitized.contains("500 bytes total"));
        assert_eq!(sanitize_for_log("a\nb"), "ab");
    }

    #[test]
    fn test_classify_status() {
        let body = r#"{"error": {"code": 404, "message": "The resource 'vm-1' was not found"}}"#;
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND, body),
            ProviderError::NotFound("The resource 'vm-1' was not found".to_string())
        );

        match classify_status(StatusCode::FORBIDDEN, "not json") {
            ProviderError::Api(msg) => assert!(msg.contains("403")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
