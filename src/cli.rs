//! Command-line interface parsing for fxcache
//!
//! This module handles parsing of CLI arguments using clap and turns them into
//! a `CacheConfig`. Every global option can also be set through an
//! `FXCACHE_*` environment variable.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::config::{BackendKind, CacheConfig, DEFAULT_BASE_URL, DEFAULT_INTERVAL_SECS};

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified backend name is not recognized
    #[error("Invalid backend: '{0}'. Valid backends: memory, filesystem")]
    InvalidBackend(String),
}

/// fxcache - Fetch currency rates through a time-bounded HTTP cache
#[derive(Parser, Debug)]
#[command(name = "fxcache")]
#[command(about = "Time-bounded HTTP response cache for currency rates")]
#[command(version)]
pub struct Cli {
    /// Cache backend: memory or filesystem
    #[arg(
        long,
        global = true,
        env = "FXCACHE_BACKEND",
        default_value = "memory",
        value_name = "BACKEND"
    )]
    pub backend: String,

    /// Seconds a cached response stays fresh
    #[arg(
        long,
        global = true,
        env = "FXCACHE_INTERVAL",
        default_value_t = DEFAULT_INTERVAL_SECS,
        value_name = "SECS"
    )]
    pub interval: u64,

    /// Directory for the filesystem backend
    #[arg(long, global = true, env = "FXCACHE_DIR", value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Base URL of the rate server
    #[arg(
        long,
        global = true,
        env = "FXCACHE_BASE_URL",
        default_value = DEFAULT_BASE_URL,
        value_name = "URL"
    )]
    pub base_url: String,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Run the dummy currency rate server
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8888")]
        addr: String,
    },
    /// Fetch currency rates through the cache
    ///
    /// Examples:
    ///   fxcache get usd                      # One lookup
    ///   fxcache get usd eur --repeat 3       # Second and third rounds hit the cache
    ///   fxcache get usd --repeat 2 --delay 11
    Get {
        /// Currency symbols to fetch
        #[arg(required = true, value_name = "SYMBOL")]
        symbols: Vec<String>,
        /// Number of rounds to fetch every symbol
        #[arg(long, default_value_t = 1)]
        repeat: u32,
        /// Seconds to wait between rounds
        #[arg(long, default_value_t = 0, value_name = "SECS")]
        delay: u64,
    },
    /// Remove every entry from the configured backend
    Clear,
}

/// Parses a backend string argument into a BackendKind.
///
/// # Returns
/// * `Ok(BackendKind)` if the string names a known backend
/// * `Err(CliError::InvalidBackend)` otherwise
pub fn parse_backend_arg(s: &str) -> Result<BackendKind, CliError> {
    BackendKind::from_str(s).ok_or_else(|| CliError::InvalidBackend(s.to_string()))
}

impl CacheConfig {
    /// Creates a CacheConfig from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(CacheConfig)` with the requested settings
    /// * `Err(CliError)` if an invalid backend was specified
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        Ok(CacheConfig {
            backend: parse_backend_arg(&cli.backend)?,
            interval: Duration::from_secs(cli.interval),
            cache_dir: cli.cache_dir.clone(),
            base_url: cli.base_url.clone(),
        })
    }
}
