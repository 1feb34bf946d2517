//! HTTP transport used by the cache
//!
//! Defines the captured `HttpResponse`, the options passed through to a fetch,
//! and the `Transport` trait with its reqwest-backed implementation.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the header rewritten on cache hits
pub const DATE_HEADER: &str = "date";

/// Errors that can occur while fetching a resource
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The URL could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Parameters passed through to the transport untouched
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Extra request headers
    pub headers: Vec<(String, String)>,
    /// Query string parameters
    pub query: Vec<(String, String)>,
    /// Per-request timeout
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Adds a request header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds a query string parameter
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Sets the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A fully captured HTTP response
///
/// Cloning produces an independent copy, so a response handed to a caller never
/// shares state with the copy held by the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    /// Numeric status code
    pub status: u16,
    /// Response headers keyed by lowercase name
    pub headers: BTreeMap<String, String>,
    /// Raw response body
    pub body: Vec<u8>,
    /// Method of the originating request
    pub method: String,
    /// Final URL of the originating request
    pub url: String,
    /// Whether this response was served from the cache
    #[serde(default)]
    pub from_cache: bool,
}

impl HttpResponse {
    /// Creates a GET response with no headers
    pub fn new(status: u16, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
            method: "GET".to_string(),
            url: url.into(),
            from_cache: false,
        }
    }

    /// Looks up a header, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Inserts or replaces a header
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }
}

/// Formats a timestamp as an RFC 1123 HTTP date (`Sun, 06 Nov 1994 08:49:37 GMT`)
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Something that can issue a GET request and capture the full response
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches `url`, passing `options` through to the underlying client
    async fn fetch(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<HttpResponse, FetchError>;
}

/// Transport backed by a reqwest client
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport with a default reqwest client
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport with a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn fetch(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<HttpResponse, FetchError> {
        let parsed =
            Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
        let mut request = self.client.get(parsed);
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
            method: "GET".to_string(),
            url: final_url,
            from_cache: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_http_date_uses_rfc1123_gmt_format() {
        let at = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
        assert_eq!(http_date(at), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut response = HttpResponse::new(200, "http://localhost/usd", "{}");
        response.set_header("Content-Type", "application/json");

        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.header("CONTENT-TYPE"), Some("application/json"));
        assert!(response.header("date").is_none());
    }

    #[test]
    fn test_set_header_replaces_existing_value() {
        let mut response = HttpResponse::new(200, "http://localhost/usd", "{}");
        response.set_header("Date", "old");
        response.set_header("date", "new");

        assert_eq!(response.headers.len(), 1);
        assert_eq!(response.header(DATE_HEADER), Some("new"));
    }

    #[test]
    fn test_clone_is_independent() {
        let original = HttpResponse::new(200, "http://localhost/eur", "body");
        let mut copy = original.clone();
        copy.set_header("date", "changed");
        copy.body.push(b'!');

        assert!(original.header("date").is_none());
        assert_eq!(original.body, b"body");
    }

    #[tokio::test]
    async fn test_fetch_rejects_unparsable_url() {
        let transport = ReqwestTransport::new();

        let err = transport
            .fetch("not a url", &RequestOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::InvalidUrl(ref msg) if msg.contains("not a url")));
    }

    #[test]
    fn test_request_options_builder() {
        let options = RequestOptions::default()
            .header("Accept", "application/json")
            .query("amount", "10")
            .timeout(Duration::from_secs(3));

        assert_eq!(options.headers, vec![("Accept".to_string(), "application/json".to_string())]);
        assert_eq!(options.query, vec![("amount".to_string(), "10".to_string())]);
        assert_eq!(options.timeout, Some(Duration::from_secs(3)));
    }
}
