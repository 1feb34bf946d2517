//! Cache configuration
//!
//! `CacheConfig` selects the backend variant, the expiration interval and the
//! upstream base URL. The command line builds one via `CacheConfig::from_cli`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::cache::{CacheBackend, FileBackend, MemoryBackend};

/// Default expiration interval in seconds
pub const DEFAULT_INTERVAL_SECS: u64 = 10;

/// Default location of the rate server
pub const DEFAULT_BASE_URL: &str = "http://localhost:8888";

/// Errors that can occur when opening the configured cache
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No cache directory was given and none could be derived
    #[error("No cache directory available; pass --cache-dir")]
    NoCacheDir,
}

/// Storage variant backing the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Process-local map
    #[default]
    Memory,
    /// JSON files in a cache directory
    Filesystem,
}

impl BackendKind {
    /// Parses a backend name, accepting a few aliases
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" | "dict" => Some(BackendKind::Memory),
            "filesystem" | "file" | "fs" | "disk" => Some(BackendKind::Filesystem),
            _ => None,
        }
    }

    /// Canonical name of the backend
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Filesystem => "filesystem",
        }
    }
}

/// Settings for building a cached client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Which backend stores entries
    pub backend: BackendKind,
    /// How long an entry is served before being refetched
    pub interval: Duration,
    /// Directory for the filesystem backend; the XDG cache dir when unset
    pub cache_dir: Option<PathBuf>,
    /// Base URL of the rate server
    pub base_url: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            cache_dir: None,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl CacheConfig {
    /// Opens the configured backend
    pub fn open_backend(&self) -> Result<Arc<dyn CacheBackend>, ConfigError> {
        match self.backend {
            BackendKind::Memory => Ok(Arc::new(MemoryBackend::new(self.interval))),
            BackendKind::Filesystem => {
                let backend = match &self.cache_dir {
                    Some(dir) => FileBackend::with_dir(dir.clone(), self.interval),
                    None => FileBackend::new(self.interval).ok_or(ConfigError::NoCacheDir)?,
                };
                Ok(Arc::new(backend))
            }
        }
    }
}
