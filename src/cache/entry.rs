//! Cache entry model

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::http::HttpResponse;

/// One stored response for a request key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Identity of the cached request (the URL)
    pub key: String,
    /// When the entry was created
    pub timestamp: DateTime<Utc>,
    /// Status of the captured response
    pub status: u16,
    /// Method of the original request
    pub method: String,
    /// Independent copy of the captured response
    pub response: HttpResponse,
}

impl CacheEntry {
    /// Captures a copy of `response` under `key`
    pub fn new(key: impl Into<String>, timestamp: DateTime<Utc>, response: &HttpResponse) -> Self {
        let mut response = response.clone();
        response.from_cache = false;
        Self {
            key: key.into(),
            timestamp,
            status: response.status,
            method: response.method.clone(),
            response,
        }
    }

    /// When the entry stops being fresh under `interval`
    ///
    /// Returns `None` when the expiry lies beyond the representable range.
    pub fn expires_at(&self, interval: Duration) -> Option<DateTime<Utc>> {
        let interval = chrono::Duration::from_std(interval).ok()?;
        self.timestamp.checked_add_signed(interval)
    }

    /// Whether the entry is expired at `now`
    ///
    /// An entry exactly `interval` old is already expired.
    pub fn is_expired(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        match self.expires_at(interval) {
            Some(expires_at) => expires_at <= now,
            None => false,
        }
    }
}
