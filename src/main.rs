//! fxcache - Fetch currency rates through a time-bounded HTTP cache
//!
//! Runs the dummy rate server, fetches rates through the configured cache
//! backend, or clears that backend.

use std::process;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fxcache::cache::CachedClient;
use fxcache::cli::{Cli, Command};
use fxcache::config::CacheConfig;
use fxcache::currency::CurrencyClient;
use fxcache::http::ReqwestTransport;
use fxcache::server::RateServer;

/// Sets up log output on stderr, leaving stdout for results.
/// `RUST_LOG` always wins; `--verbose` only raises the fallback level to debug.
fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Fetches every symbol `repeat` times, waiting `delay` between rounds
async fn run_get(
    config: &CacheConfig,
    symbols: &[String],
    repeat: u32,
    delay: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let backend = config.open_backend()?;
    let client = CurrencyClient::new(
        CachedClient::new(ReqwestTransport::new(), backend),
        config.base_url.clone(),
    );

    for round in 0..repeat {
        if round > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        for symbol in symbols {
            let quote = client.get_rate(symbol).await?;
            let source = if quote.from_cache { "cached" } else { "live" };
            println!("{} {} {}", quote.code, quote.rate, source);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match CacheConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    };

    match cli.command {
        Command::Serve { addr } => {
            let server = RateServer::bind(addr.as_str()).await?;
            server.run().await?;
        }
        Command::Get {
            symbols,
            repeat,
            delay,
        } => {
            info!(
                backend = config.backend.name(),
                interval = config.interval.as_secs(),
                "fetching rates"
            );
            run_get(&config, &symbols, repeat, Duration::from_secs(delay)).await?;
        }
        Command::Clear => {
            let backend = config.open_backend()?;
            let count = backend.len();
            backend.clear();
            println!("Cleared {} cached entries", count);
        }
    }

    Ok(())
}
