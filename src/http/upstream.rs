//! Outbound calls to configured upstreams.
//!
//! # Responsibilities
//! - Resolve an upstream name to its base URL
//! - Perform one GET and classify the result
//! - Decide which failures are worth another attempt
//!
//! # Design Decisions
//! - A non-2xx status is a failure, so the breaker sees upstream errors
//! - Transport errors and 408/429/5xx are transient; other statuses are final

use std::collections::HashMap;
use axum::body::Bytes;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use url::Url;

use crate::config::UpstreamConfig;
use crate::resilience::outcome::Retryable;

/// A guarded dependency reachable under `/proxy/{name}/...`.
#[derive(Debug, Clone)]
pub struct Upstream {
    pub name: String,
    pub base_url: Url,
}

impl Upstream {
    /// Full URL for `path` (and an optional query) under this upstream.
    pub fn url_for(&self, path: &str, query: Option<&str>) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        match query {
            Some(q) if !q.is_empty() => format!("{base}/{path}?{q}"),
            _ => format!("{base}/{path}"),
        }
    }

    /// Host the upstream lives on, used for host-partitioned limits.
    pub fn host(&self) -> Option<&str> {
        self.base_url.host_str()
    }
}

/// Build the upstream table, skipping entries whose URL does not parse.
pub fn upstream_table(configs: &[UpstreamConfig]) -> HashMap<String, Upstream> {
    let mut table = HashMap::new();
    for config in configs {
        match Url::parse(&config.base_url) {
            Ok(base_url) => {
                table.insert(
                    config.name.clone(),
                    Upstream {
                        name: config.name.clone(),
                        base_url,
                    },
                );
            }
            Err(e) => tracing::error!(upstream = %config.name, error = %e, "Invalid upstream URL, skipping"),
        }
    }
    table
}

/// Successful upstream response, buffered.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Why a single upstream attempt failed.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned status {status}")]
    Status { status: u16 },
}

impl Retryable for UpstreamError {
    fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Transport(e) => !e.is_builder(),
            UpstreamError::Status { status } => matches!(status, 408 | 429 | 500..=599),
        }
    }
}

/// Perform one GET against `url`.
pub async fn fetch(client: &reqwest::Client, url: &str) -> Result<UpstreamResponse, UpstreamError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        tracing::debug!(url = %url, status = %status, "Upstream returned error status");
        return Err(UpstreamError::Status { status: status.as_u16() });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = response.bytes().await?;

    Ok(UpstreamResponse {
        status: status.as_u16(),
        content_type,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(base: &str) -> Upstream {
        Upstream {
            name: "posts".into(),
            base_url: Url::parse(base).unwrap(),
        }
    }

    #[test]
    fn test_url_join() {
        let u = upstream("https://jsonplaceholder.typicode.com");
        assert_eq!(u.url_for("posts/1", None), "https://jsonplaceholder.typicode.com/posts/1");
        assert_eq!(u.url_for("/posts", Some("userId=1")), "https://jsonplaceholder.typicode.com/posts?userId=1");

        let nested = upstream("http://127.0.0.1:9000/api/");
        assert_eq!(nested.url_for("users", Some("")), "http://127.0.0.1:9000/api/users");
        assert_eq!(nested.host(), Some("127.0.0.1"));
    }

    #[test]
    fn test_status_classification() {
        for status in [408, 429, 500, 502, 503, 504] {
            assert!(UpstreamError::Status { status }.is_retryable(), "{status} should retry");
        }
        for status in [400, 401, 403, 404, 422] {
            assert!(!UpstreamError::Status { status }.is_retryable(), "{status} should not retry");
        }
    }

    #[test]
    fn test_table_skips_bad_urls() {
        let configs = vec![
            UpstreamConfig { name: "ok".into(), base_url: "http://localhost:1".into(), policy: None },
            UpstreamConfig { name: "bad".into(), base_url: "not a url".into(), policy: None },
        ];
        let table = upstream_table(&configs);
        assert!(table.contains_key("ok"));
        assert!(!table.contains_key("bad"));
    }
}
