//! Get-or-refresh HTTP client
//!
//! `CachedClient` wraps a `Transport` and serves stored responses while they are
//! fresh, issuing a live fetch once the expiration interval has elapsed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use super::{CacheBackend, CacheEntry};
use crate::clock::{Clock, SystemClock};
use crate::http::{http_date, FetchError, HttpResponse, RequestOptions, Transport, DATE_HEADER};

/// Per-key lock held across the check, fetch and store of a single `get`
type Flight = Arc<AsyncMutex<()>>;

/// HTTP client with a time-bounded response cache in front of it
///
/// Concurrent `get` calls for the same URL are serialized, so an expired key is
/// fetched once and the remaining callers are served the fresh entry.
pub struct CachedClient<T> {
    transport: T,
    backend: Arc<dyn CacheBackend>,
    clock: Arc<dyn Clock>,
    flights: Mutex<HashMap<String, Flight>>,
}

impl<T: Transport> CachedClient<T> {
    /// Creates a client reading time from the system clock
    pub fn new(transport: T, backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            transport,
            backend,
            clock: Arc::new(SystemClock),
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the clock used for entry timestamps and freshness checks
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The backend holding this client's entries
    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    /// Current expiration interval
    pub fn expiration_interval(&self) -> Duration {
        self.backend.interval()
    }

    /// Changes the expiration interval, discarding every cached entry
    pub fn set_expiration_interval(&self, interval: Duration) {
        self.backend.set_interval(interval);
    }

    /// Fetches `url`, serving the cached response while it is fresh
    ///
    /// The returned response has `from_cache` set on a hit and cleared on a live
    /// fetch. Transport failures are returned unchanged and leave the cache as
    /// it was.
    pub async fn get(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<HttpResponse, FetchError> {
        let flight = self.join_flight(url);
        let _lock = flight.flight.lock().await;
        self.get_locked(url, options).await
    }

    async fn get_locked(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<HttpResponse, FetchError> {
        let now = self.clock.now();
        let interval = self.backend.interval();

        match self.backend.get(url) {
            Some(entry) if !entry.is_expired(now, interval) => {
                debug!(url, cached_at = %entry.timestamp, "serving cached response");
                Ok(serve_cached(entry, now))
            }
            Some(entry) => {
                debug!(url, cached_at = %entry.timestamp, "cached response expired");
                self.refresh(url, options, now).await
            }
            None => {
                debug!(url, "no cached response");
                self.refresh(url, options, now).await
            }
        }
    }

    /// Fetches `url` live and stores a copy stamped with `now`
    async fn refresh(
        &self,
        url: &str,
        options: &RequestOptions,
        now: DateTime<Utc>,
    ) -> Result<HttpResponse, FetchError> {
        let mut response = self.transport.fetch(url, options).await?;
        self.backend.put(CacheEntry::new(url, now, &response));
        response.from_cache = false;
        Ok(response)
    }

    fn join_flight<'a>(&'a self, url: &'a str) -> FlightGuard<'a> {
        let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
        let flight = Arc::clone(flights.entry(url.to_string()).or_default());
        FlightGuard {
            flights: &self.flights,
            url,
            flight,
        }
    }
}

/// Membership in a key's flight, released when the `get` finishes or is dropped
struct FlightGuard<'a> {
    flights: &'a Mutex<HashMap<String, Flight>>,
    url: &'a str,
    flight: Flight,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map and this guard hold it: nobody is waiting on the key.
        if Arc::strong_count(&self.flight) == 2 {
            flights.remove(self.url);
        }
    }
}

/// Turns a stored entry into a response for a cache hit
fn serve_cached(entry: CacheEntry, now: DateTime<Utc>) -> HttpResponse {
    let mut response = entry.response;
    response.set_header(DATE_HEADER, http_date(now));
    response.from_cache = true;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryBackend;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Transport answering with a body that changes on every call
    #[derive(Default)]
    struct CountingTransport {
        calls: AtomicUsize,
        delay: Option<Duration>,
        fail: bool,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn fetch(
            &self,
            url: &str,
            _options: &RequestOptions,
        ) -> Result<HttpResponse, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(FetchError::InvalidUrl(url.to_string()));
            }
            let mut response = HttpResponse::new(200, url, format!("body-{n}"));
            response.set_header("Date", "Thu, 01 Jan 2026 00:00:00 GMT");
            Ok(response)
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn client_with(
        transport: CountingTransport,
        interval: Duration,
    ) -> (CachedClient<CountingTransport>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let backend = Arc::new(MemoryBackend::new(interval));
        let client = CachedClient::new(transport, backend).with_clock(clock.clone());
        (client, clock)
    }

    const URL: &str = "http://localhost:8888/usd";

    #[tokio::test]
    async fn test_first_get_is_a_miss() {
        let (client, _clock) = client_with(CountingTransport::default(), Duration::from_secs(10));

        let response = client.get(URL, &RequestOptions::default()).await.unwrap();

        assert!(!response.from_cache);
        assert_eq!(response.body, b"body-0");
        assert_eq!(client.backend().len(), 1);
    }

    #[tokio::test]
    async fn test_get_within_interval_is_a_hit() {
        let (client, clock) = client_with(CountingTransport::default(), Duration::from_secs(10));
        let options = RequestOptions::default();

        let initial = client.get(URL, &options).await.unwrap();
        clock.advance(Duration::from_secs(5));
        let cached = client.get(URL, &options).await.unwrap();

        assert!(cached.from_cache);
        assert_eq!(cached.body, initial.body);
        assert_eq!(client.transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hit_rewrites_date_header_without_touching_entry() {
        let (client, clock) = client_with(CountingTransport::default(), Duration::from_secs(10));
        let options = RequestOptions::default();

        client.get(URL, &options).await.unwrap();
        clock.advance(Duration::from_secs(3));
        let cached = client.get(URL, &options).await.unwrap();

        assert_eq!(cached.header("date"), Some(http_date(clock.now()).as_str()));

        let stored = client.backend().get(URL).unwrap();
        assert_eq!(stored.timestamp, start());
        assert_eq!(stored.response.header("date"), Some("Thu, 01 Jan 2026 00:00:00 GMT"));
        assert!(!stored.response.from_cache);
    }

    #[tokio::test]
    async fn test_get_at_exact_interval_is_a_miss() {
        let (client, clock) = client_with(CountingTransport::default(), Duration::from_secs(10));
        let options = RequestOptions::default();

        client.get(URL, &options).await.unwrap();
        clock.advance(Duration::from_secs(10));
        let response = client.get(URL, &options).await.unwrap();

        assert!(!response.from_cache);
        assert_eq!(response.body, b"body-1");
    }

    #[tokio::test]
    async fn test_expired_fetch_replaces_entry() {
        let (client, clock) = client_with(CountingTransport::default(), Duration::from_secs(10));
        let options = RequestOptions::default();

        client.get(URL, &options).await.unwrap();
        clock.advance(Duration::from_secs(11));
        client.get(URL, &options).await.unwrap();

        let stored = client.backend().get(URL).unwrap();
        assert_eq!(stored.response.body, b"body-1");
        assert_eq!(stored.timestamp, start() + chrono::Duration::seconds(11));
        assert_eq!(client.backend().len(), 1);

        clock.advance(Duration::from_secs(1));
        let cached = client.get(URL, &options).await.unwrap();
        assert!(cached.from_cache);
        assert_eq!(cached.body, b"body-1");
    }

    #[tokio::test]
    async fn test_set_interval_invalidates_fresh_entries() {
        let (client, clock) = client_with(CountingTransport::default(), Duration::from_secs(10));
        let options = RequestOptions::default();

        client.get(URL, &options).await.unwrap();
        clock.advance(Duration::from_secs(1));
        client.set_expiration_interval(Duration::from_secs(5));
        clock.advance(Duration::from_secs(1));
        let response = client.get(URL, &options).await.unwrap();

        assert_eq!(client.expiration_interval(), Duration::from_secs(5));
        assert!(!response.from_cache);
    }

    #[tokio::test]
    async fn test_keys_are_cached_independently() {
        let (client, _clock) = client_with(CountingTransport::default(), Duration::from_secs(10));
        let options = RequestOptions::default();

        let usd = client.get(URL, &options).await.unwrap();
        let eur = client.get("http://localhost:8888/eur", &options).await.unwrap();
        let usd_again = client.get(URL, &options).await.unwrap();

        assert!(!usd.from_cache);
        assert!(!eur.from_cache);
        assert!(usd_again.from_cache);
        assert_eq!(client.backend().len(), 2);
    }

    #[tokio::test]
    async fn test_transport_failure_propagates_and_caches_nothing() {
        let transport = CountingTransport {
            fail: true,
            ..Default::default()
        };
        let (client, _clock) = client_with(transport, Duration::from_secs(10));

        let result = client.get(URL, &RequestOptions::default()).await;

        assert!(matches!(result, Err(FetchError::InvalidUrl(_))));
        assert!(client.backend().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_gets_share_one_fetch() {
        let transport = CountingTransport {
            delay: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let (client, _clock) = client_with(transport, Duration::from_secs(10));
        let options = RequestOptions::default();

        let responses =
            futures::future::join_all((0..5).map(|_| client.get(URL, &options))).await;

        assert_eq!(client.transport.calls.load(Ordering::SeqCst), 1);
        let misses = responses
            .iter()
            .filter(|r| !r.as_ref().unwrap().from_cache)
            .count();
        assert_eq!(misses, 1);
        assert!(client.flights.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_gets_release_their_flights() {
        let transport = CountingTransport {
            delay: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        let (client, _clock) = client_with(transport, Duration::from_secs(10));
        let options = RequestOptions::default();

        for i in 0..20 {
            let url = format!("http://localhost:8888/slow/{i}");
            let result =
                tokio::time::timeout(Duration::from_millis(1), client.get(&url, &options)).await;
            assert!(result.is_err(), "slow fetch should time out");
        }

        assert!(client.flights.lock().unwrap().is_empty());
        assert!(client.backend().is_empty());
    }
}
