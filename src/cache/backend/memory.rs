//! In-memory shared cache backend.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::cache::backend::CacheBackend;
use crate::common::Result;

struct Entry {
    value: Vec<u8>,
    expires: Option<Instant>,
}

impl Entry {
    fn new(value: &[u8], ttl: Duration) -> Self {
        Self {
            value: value.to_vec(),
            expires: (!ttl.is_zero()).then(|| Instant::now() + ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires.map_or(true, |at| now < at)
    }
}

/// A [`CacheBackend`] in process memory.
///
/// Wrap it in an `Arc` and hand it to several contexts to model the tier
/// that separate processes share. Expired entries are dropped lazily on
/// access.
#[derive(Default)]
pub struct MemoryCacheBackend {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a live entry exists under the full (prefixed) key.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .get(key)
            .is_some_and(|e| e.is_live(Instant::now()))
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl CacheBackend for MemoryCacheBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(Instant::now()) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.entries
            .lock()
            .insert(key.to_string(), Entry::new(value, ttl));
        Ok(())
    }

    fn replace(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(Instant::now()) => {
                *entry = Entry::new(value, ttl);
                Ok(true)
            }
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }

    fn flush(&self) -> Result<()> {
        self.entries.lock().clear();
        Ok(())
    }
}
