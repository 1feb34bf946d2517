//! Time-bounded HTTP response cache
//!
//! `CachedClient` decides between a stored response and a live fetch based on
//! the age of the entry and the backend's expiration interval. Entries live in
//! a `CacheBackend`: either the process-local `MemoryBackend` or the on-disk
//! `FileBackend`. Changing the interval clears the backend.

mod backend;
mod client;
mod entry;
mod file;

pub use backend::{CacheBackend, MemoryBackend};
pub use client::CachedClient;
pub use entry::CacheEntry;
pub use file::FileBackend;
