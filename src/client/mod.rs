// src/client/mod.rs
//! Remote data clients.
//!
//! Every client is layered the same way around one raw GET primitive:
//!
//! ```plaintext
//! cache lookup ─hit──────────────────────────────────────────► parsed response
//!      │miss
//!      ▼
//! retry policy ─► circuit breaker ─► rate limiter ─► transport ─► status check ─► parse/validate ─► cache write
//! ```
//!
//! The transport is a trait so tests can script responses without a network.

pub mod fdsn;
pub mod fetcher;
pub mod iris;
pub mod query;
pub mod usgs;
pub mod usgs_async;

#[cfg(test)]
mod tests;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::{Result, SeismicError};

pub use fdsn::{CatalogEvent, ChannelRecord, StationRecord};
pub use fetcher::{AsyncFetcher, BlockingFetcher};
pub use iris::{EventWaveformOptions, IrisClient, WaveformFetch};
pub use query::{
    BoundingBox, EventQuery, GeoArea, OrderBy, QueryParams, ResponseFormat, StationLevel, StationQuery,
    WaveformRequest, MAX_EVENT_LIMIT,
};
pub use usgs::{CatalogMetadata, Earthquake, EventCatalog, UsgsClient};
pub use usgs_async::AsyncUsgsClient;

/// Status line and body of an HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking GET primitive
pub trait HttpTransport: Send + Sync + std::fmt::Debug {
    fn get(&self, url: &str, params: &QueryParams) -> Result<HttpResponse>;
}

/// Non-blocking GET primitive
#[async_trait]
pub trait AsyncHttpTransport: Send + Sync + std::fmt::Debug {
    async fn get(&self, url: &str, params: &QueryParams) -> Result<HttpResponse>;
}

fn default_headers(user_agent: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let value = HeaderValue::from_str(user_agent)
        .map_err(|e| SeismicError::config(format!("Invalid user agent '{}': {}", user_agent, e)))?;
    headers.insert(USER_AGENT, value);
    Ok(headers)
}

/// reqwest blocking client; keeps one connection pool for its lifetime
#[derive(Debug, Clone)]
pub struct BlockingHttp {
    client: reqwest::blocking::Client,
}

impl BlockingHttp {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .default_headers(default_headers(user_agent)?)
            .build()
            .map_err(|e| SeismicError::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl HttpTransport for BlockingHttp {
    fn get(&self, url: &str, params: &QueryParams) -> Result<HttpResponse> {
        let response = self.client.get(url).query(params).send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(HttpResponse { status, body })
    }
}

/// reqwest async client; one pool shared by every call of a session
#[derive(Debug, Clone)]
pub struct AsyncHttp {
    client: reqwest::Client,
}

impl AsyncHttp {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(default_headers(user_agent)?)
            .build()
            .map_err(|e| SeismicError::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AsyncHttpTransport for AsyncHttp {
    async fn get(&self, url: &str, params: &QueryParams) -> Result<HttpResponse> {
        let response = self.client.get(url).query(params).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

const BODY_SNIPPET_LEN: usize = 200;

/// Turn a response into its body or a classified error
///
/// | status                                 | result                  |
/// |----------------------------------------|-------------------------|
/// | 204                                    | empty body (no data)    |
/// | other 2xx                              | body                    |
/// | 429, or body mentions "rate limit"     | `RateLimit`             |
/// | 408                                    | `Timeout`               |
/// | other 4xx                              | `NonRetryable`          |
/// | 5xx and anything else                  | `Network`               |
pub fn check_status(response: HttpResponse, url: &str) -> Result<String> {
    if response.status == 204 {
        return Ok(String::new());
    }
    if response.is_success() {
        return Ok(response.body);
    }

    let status = response.status;
    let snippet: String = response.body.chars().take(BODY_SNIPPET_LEN).collect();
    let error = if status == 429 || response.body.to_lowercase().contains("rate limit") {
        SeismicError::rate_limit("API rate limit exceeded")
    } else if status == 408 {
        SeismicError::timeout(format!("Server reported request timeout for {}", url))
    } else if (400..500).contains(&status) {
        SeismicError::non_retryable(format!("HTTP error {}: request rejected", status))
    } else {
        SeismicError::network(format!("HTTP error {}", status))
    };
    Err(error
        .with_code(format!("HTTP_{}", status))
        .with_detail("url", url)
        .with_detail("body", snippet))
}

/// `base/endpoint` with exactly one slash between them
pub fn join_url(base: &str, endpoint: &str) -> String {
    let endpoint = endpoint.trim_start_matches('/');
    if endpoint.is_empty() {
        return base.trim_end_matches('/').to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), endpoint)
}

/// Parameters rendered as `k=v&k=v` for logs
pub fn query_string(params: &QueryParams) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}
