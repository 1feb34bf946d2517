//! Filesystem-backed cache store
//!
//! Persists each entry as a JSON file in an XDG-compliant cache directory
//! (`~/.cache/fxcache/` on Linux). File names are the SHA-256 of the request
//! key so any URL maps to a valid name.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use sha2::{Digest, Sha256};
use tracing::warn;

use super::backend::IntervalCell;
use super::{CacheBackend, CacheEntry};

/// Extension used for entry files
const ENTRY_EXTENSION: &str = "json";

/// Backend storing entries as JSON files on disk
///
/// Unreadable or corrupt files are treated as absent entries. Write failures
/// are logged and dropped, which leaves the next lookup a cache miss.
#[derive(Debug)]
pub struct FileBackend {
    /// Directory where entry files are stored
    cache_dir: PathBuf,
    interval: IntervalCell,
}

impl FileBackend {
    /// Creates a backend in the XDG cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new(interval: Duration) -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "fxcache")?;
        Some(Self::with_dir(project_dirs.cache_dir().to_path_buf(), interval))
    }

    /// Creates a backend with a custom cache directory
    pub fn with_dir(cache_dir: PathBuf, interval: Duration) -> Self {
        Self {
            cache_dir,
            interval: IntervalCell::new(interval),
        }
    }

    /// Directory holding the entry files
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the path to the entry file for `key`
    fn cache_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.cache_dir
            .join(format!("{}.{}", hex::encode(digest), ENTRY_EXTENSION))
    }

    fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.cache_dir)
    }

    fn write(&self, entry: &CacheEntry) -> io::Result<()> {
        self.ensure_dir()?;
        let json = serde_json::to_string_pretty(entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(self.cache_path(&entry.key), json)
    }

    fn read(&self, key: &str) -> Option<CacheEntry> {
        let content = fs::read_to_string(self.cache_path(key)).ok()?;
        let entry: CacheEntry = serde_json::from_str(&content).ok()?;
        // A digest collision would hand back another key's response.
        (entry.key == key).then_some(entry)
    }

    /// Paths of every entry file currently on disk
    fn entry_files(&self) -> Vec<PathBuf> {
        let Ok(dir) = fs::read_dir(&self.cache_dir) else {
            return Vec::new();
        };
        dir.filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| is_entry_file(p))
            .collect()
    }
}

impl CacheBackend for FileBackend {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        self.read(key)
    }

    fn put(&self, entry: CacheEntry) {
        if let Err(e) = self.write(&entry) {
            warn!(key = %entry.key, error = %e, "failed to write cache entry");
        }
    }

    fn clear(&self) {
        for path in self.entry_files() {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to remove cache entry");
                }
            }
        }
    }

    fn set_interval(&self, interval: Duration) {
        self.interval.set(interval);
        self.clear();
    }

    fn interval(&self) -> Duration {
        self.interval.get()
    }

    fn len(&self) -> usize {
        self.entry_files().len()
    }
}

/// Whether `path` names a file written by `cache_path`: a SHA-256 hex digest plus extension
fn is_entry_file(path: &Path) -> bool {
    let has_extension = path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION);
    let is_digest = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| stem.len() == 64 && stem.bytes().all(|b| b.is_ascii_hexdigit()));
    has_extension && is_digest
}
