//! Dummy currency rate server
//!
//! Serves `GET /usd` and `GET /eur` with a JSON body whose rate steps through
//! -1%, -2%, -3% and -4% of a base rate on every answered request, so repeated
//! live fetches return different bodies while cached ones do not.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::http::http_date;

/// Largest request head accepted before the connection is dropped
const MAX_REQUEST_BYTES: usize = 8 * 1024;

/// Percentage offsets applied in turn to the base rate
const RATE_OFFSETS: [i32; 4] = [-1, -2, -3, -4];

/// Errors raised by the rate server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Socket I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The request head could not be parsed
    #[error("Malformed request: {0}")]
    Parse(#[from] httparse::Error),

    /// The request head exceeded the size limit
    #[error("Request head larger than 8 KiB")]
    RequestTooLarge,
}

/// Currencies served by the rate server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Currency {
    Usd,
    Eur,
}

impl Currency {
    /// Finds the currency named anywhere in a request path, ignoring case
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.to_ascii_lowercase();
        if path.contains("usd") {
            Some(Currency::Usd)
        } else if path.contains("eur") {
            Some(Currency::Eur)
        } else {
            None
        }
    }

    /// Upper-case currency code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
        }
    }

    /// Rate before any offset is applied
    pub fn base_rate(&self) -> f64 {
        match self {
            Currency::Usd => 26.45,
            Currency::Eur => 30.25,
        }
    }
}

/// Cycle of rate offsets shared by every currency on one server
#[derive(Debug, Default)]
pub struct RateSequence {
    step: AtomicUsize,
}

impl RateSequence {
    /// Returns the next offset in percent
    pub fn next_offset(&self) -> i32 {
        let step = self.step.fetch_add(1, Ordering::Relaxed);
        RATE_OFFSETS[step % RATE_OFFSETS.len()]
    }

    /// Produces the next quote body for `currency`
    pub fn next_body(&self, currency: Currency) -> String {
        let offset = self.next_offset();
        quote_body(currency, offset)
    }
}

/// Body for `currency` with `offset_percent` applied to its base rate
pub fn quote_body(currency: Currency, offset_percent: i32) -> String {
    let rate = currency.base_rate() * (1.0 + f64::from(offset_percent) / 100.0);
    serde_json::json!({ (currency.code()): rate }).to_string()
}

/// Rate server bound to a local socket
#[derive(Debug)]
pub struct RateServer {
    listener: TcpListener,
    sequence: Arc<RateSequence>,
}

impl RateServer {
    /// Binds the server to `addr`
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            sequence: Arc::new(RateSequence::default()),
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until the listener fails
    pub async fn run(self) -> Result<(), ServerError> {
        info!("Starting rate server on {}", self.local_addr()?);
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let sequence = Arc::clone(&self.sequence);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, &sequence).await {
                    warn!(%peer, error = %e, "failed to serve request");
                }
            });
        }
    }

    /// Runs the server on a background task
    pub fn spawn(self) -> JoinHandle<Result<(), ServerError>> {
        tokio::spawn(self.run())
    }
}

/// Method and path of a parsed request head
#[derive(Debug, PartialEq, Eq)]
struct RequestHead {
    method: String,
    path: String,
}

/// Parses a request head, returning `None` while it is still incomplete
fn parse_request(buf: &[u8]) -> Result<Option<RequestHead>, ServerError> {
    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut request = httparse::Request::new(&mut headers);
    match request.parse(buf)? {
        httparse::Status::Complete(_) => Ok(Some(RequestHead {
            method: request.method.unwrap_or("GET").to_string(),
            path: request.path.unwrap_or("/").to_string(),
        })),
        httparse::Status::Partial => Ok(None),
    }
}

async fn read_request(stream: &mut TcpStream) -> Result<Option<RequestHead>, ServerError> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(head) = parse_request(&buf)? {
            return Ok(Some(head));
        }
        if buf.len() > MAX_REQUEST_BYTES {
            return Err(ServerError::RequestTooLarge);
        }
    }
}

/// Status line and body answering `head`
fn respond(head: &RequestHead, sequence: &RateSequence) -> (u16, &'static str, String) {
    if head.method != "GET" {
        return (501, "Not Implemented", String::new());
    }
    match Currency::from_path(&head.path) {
        Some(currency) => (200, "OK", sequence.next_body(currency)),
        None => (404, "Not Found", String::new()),
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    sequence: &RateSequence,
) -> Result<(), ServerError> {
    let Some(head) = read_request(&mut stream).await? else {
        return Ok(());
    };
    let (status, reason, body) = respond(&head, sequence);
    debug!(method = %head.method, path = %head.path, status, "rate request");

    let response = format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Date: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len(),
        http_date(Utc::now()),
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}
