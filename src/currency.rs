//! Currency rate client
//!
//! Maps currency symbols to resources on the rate server and fetches them
//! through a `CachedClient`, logging whether each answer came from the cache.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::cache::CachedClient;
use crate::http::{FetchError, HttpResponse, RequestOptions, Transport};

/// Errors that can occur when reading a currency rate
#[derive(Debug, Error)]
pub enum CurrencyError {
    /// Fetching the resource failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Failed to parse JSON response
    #[error("Failed to parse rate response: {0}")]
    Parse(#[from] serde_json::Error),

    /// The response did not contain the requested currency
    #[error("No rate for {0} in response")]
    MissingRate(String),
}

/// A parsed currency rate
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    /// Currency code as reported by the server
    pub code: String,
    /// Exchange rate
    pub rate: f64,
    /// Whether the rate was served from the cache
    pub from_cache: bool,
}

/// Client fetching currency rates through the response cache
pub struct CurrencyClient<T> {
    client: CachedClient<T>,
    base_url: String,
}

impl<T: Transport> CurrencyClient<T> {
    /// Creates a client requesting resources under `base_url`
    pub fn new(client: CachedClient<T>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// The underlying caching client
    pub fn cached_client(&self) -> &CachedClient<T> {
        &self.client
    }

    /// URL of the resource for `symbol`
    pub fn resource_url(&self, symbol: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            symbol.to_lowercase()
        )
    }

    /// Fetches the raw response for `symbol`
    pub async fn get_currency(&self, symbol: &str) -> Result<HttpResponse, FetchError> {
        let url = self.resource_url(symbol);
        let response = self.client.get(&url, &RequestOptions::default()).await?;
        if response.from_cache {
            info!("Get cached data for {}", symbol);
        } else {
            info!("{} {} - {}", response.method, response.url, response.status);
        }
        Ok(response)
    }

    /// Fetches and parses the rate for `symbol`
    pub async fn get_rate(&self, symbol: &str) -> Result<Quote, CurrencyError> {
        let response = self.get_currency(symbol).await?;
        parse_quote(symbol, &response)
    }

    /// Current expiration interval
    pub fn expiration_interval(&self) -> Duration {
        self.client.expiration_interval()
    }

    /// Changes the expiration interval, discarding cached rates
    pub fn set_interval(&self, interval: Duration) {
        info!("New expiration interval set to {}s", interval.as_secs_f64());
        self.client.set_expiration_interval(interval);
    }
}

/// Parses a `{"<CODE>": <rate>}` body, matching the code case-insensitively
pub fn parse_quote(symbol: &str, response: &HttpResponse) -> Result<Quote, CurrencyError> {
    let rates: HashMap<String, f64> = serde_json::from_slice(&response.body)?;
    rates
        .into_iter()
        .find(|(code, _)| code.eq_ignore_ascii_case(symbol))
        .map(|(code, rate)| Quote {
            code,
            rate,
            from_cache: response.from_cache,
        })
        .ok_or_else(|| CurrencyError::MissingRate(symbol.to_uppercase()))
}
