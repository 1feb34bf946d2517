//! Storage capability underneath the cache
//!
//! `CacheBackend` is implemented by the in-memory map and by the filesystem
//! store. All operations are total: a missing key is `None`, never an error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use super::CacheEntry;

/// Storage for cache entries plus the expiration interval that governs them
pub trait CacheBackend: Send + Sync {
    /// Returns the entry stored under `key`, if any
    fn get(&self, key: &str) -> Option<CacheEntry>;

    /// Stores `entry`, replacing any entry with the same key
    fn put(&self, entry: CacheEntry);

    /// Removes every entry. Calling this on an empty backend is a no-op.
    fn clear(&self);

    /// Sets the expiration interval and discards all cached entries
    ///
    /// Entries are not re-evaluated under the new interval; changing the
    /// policy always starts from an empty cache.
    fn set_interval(&self, interval: Duration);

    /// Returns the current expiration interval
    fn interval(&self) -> Duration;

    /// Number of stored entries
    fn len(&self) -> usize;

    /// Whether no entries are stored
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Expiration interval shared by the backends, stored as milliseconds
#[derive(Debug)]
pub(crate) struct IntervalCell(AtomicU64);

impl IntervalCell {
    pub(crate) fn new(interval: Duration) -> Self {
        Self(AtomicU64::new(Self::millis(interval)))
    }

    pub(crate) fn get(&self) -> Duration {
        Duration::from_millis(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, interval: Duration) {
        self.0.store(Self::millis(interval), Ordering::Release);
    }

    fn millis(interval: Duration) -> u64 {
        u64::try_from(interval.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Backend holding entries in a process-local map
#[derive(Debug)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, CacheEntry>>,
    interval: IntervalCell,
}

impl MemoryBackend {
    /// Creates an empty backend with the given expiration interval
    pub fn new(interval: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            interval: IntervalCell::new(interval),
        }
    }
}

impl CacheBackend for MemoryBackend {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn put(&self, entry: CacheEntry) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.key.clone(), entry);
    }

    fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn set_interval(&self, interval: Duration) {
        self.interval.set(interval);
        self.clear();
    }

    fn interval(&self) -> Duration {
        self.interval.get()
    }

    fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
