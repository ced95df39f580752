//! Shared cache backends.
//!
//! Currently implements:
//! - [`MemoryCacheBackend`] - process memory, shareable between contexts
//! - [`FileCacheBackend`] - one checksummed file per key

mod file;
mod memory;

use std::time::Duration;

use crate::common::Result;

pub use file::FileCacheBackend;
pub use memory::MemoryCacheBackend;

/// A key/value store reachable by every process.
///
/// Values are opaque bytes. A zero TTL means the entry never expires.
/// Implementations take `&self` because one backend serves many contexts.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Overwrite an existing, unexpired entry.
    ///
    /// Must never create a missing key: a row removed by one process must
    /// not be resurrected by another's stale write. Returns whether a value
    /// was written.
    fn replace(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool>;

    /// Returns whether a value was present.
    fn remove(&self, key: &str) -> Result<bool>;

    fn flush(&self) -> Result<()>;
}
