//! Shared cache tier wrapper.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::backend::CacheBackend;
use crate::cache::CacheStats;
use crate::common::Result;

/// Front for an optional [`CacheBackend`].
///
/// Nothing here returns an error. A missing backend behaves like an empty
/// cache, and backend or decoding failures are logged, counted in
/// [`CacheStats::shared_errors`] and treated as misses. Every key is
/// prefixed with the configured prefix before it reaches the backend.
pub struct SharedCache {
    backend: Option<Arc<dyn CacheBackend>>,
    prefix: String,
    ttl: Duration,
    stats: Arc<CacheStats>,
}

impl SharedCache {
    pub fn new(
        backend: Option<Arc<dyn CacheBackend>>,
        prefix: impl Into<String>,
        ttl: Duration,
        stats: Arc<CacheStats>,
    ) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            ttl,
            stats,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub(crate) fn set_backend(&mut self, backend: Arc<dyn CacheBackend>) {
        self.backend = Some(backend);
    }

    /// The key as stored in the backend.
    pub fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn degrade<T>(&self, op: &str, key: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                CacheStats::bump(&self.stats.shared_errors);
                warn!(op, key, error = %e, "shared cache unavailable, treating as miss");
                None
            }
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let backend = self.backend.as_ref()?;
        let key = self.full_key(key);
        let bytes = self.degrade("get", &key, backend.get(&key)).flatten();
        let Some(bytes) = bytes else {
            CacheStats::bump(&self.stats.shared_misses);
            debug!(key = %key, "shared miss");
            return None;
        };
        let value = self.degrade("decode", &key, serde_json::from_slice(&bytes).map_err(Into::into));
        if value.is_some() {
            CacheStats::bump(&self.stats.shared_hits);
            debug!(key = %key, "shared hit");
        } else {
            CacheStats::bump(&self.stats.shared_misses);
        }
        value
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        let Some(backend) = &self.backend else {
            return;
        };
        let key = self.full_key(key);
        if let Some(bytes) = self.degrade("encode", &key, serde_json::to_vec(value).map_err(Into::into)) {
            self.degrade("set", &key, backend.set(&key, &bytes, self.ttl));
        }
    }

    /// Overwrite an existing entry; never creates one.
    pub fn replace<T: Serialize>(&self, key: &str, value: &T) -> bool {
        let Some(backend) = &self.backend else {
            return false;
        };
        let key = self.full_key(key);
        let Some(bytes) = self.degrade("encode", &key, serde_json::to_vec(value).map_err(Into::into)) else {
            return false;
        };
        self.degrade("replace", &key, backend.replace(&key, &bytes, self.ttl))
            .unwrap_or(false)
    }

    pub fn remove(&self, key: &str) {
        if let Some(backend) = &self.backend {
            let key = self.full_key(key);
            self.degrade("remove", &key, backend.remove(&key));
        }
    }

    pub fn flush(&self) {
        if let Some(backend) = &self.backend {
            self.degrade("flush", "*", backend.flush());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheBackend;
    use crate::common::{Error, Vars};
    use crate::vars;

    struct BrokenBackend;

    impl CacheBackend for BrokenBackend {
        fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Err(Error::Storage("connection refused".into()))
        }
        fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<()> {
            Err(Error::Storage("connection refused".into()))
        }
        fn replace(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<bool> {
            Err(Error::Storage("connection refused".into()))
        }
        fn remove(&self, _key: &str) -> Result<bool> {
            Err(Error::Storage("connection refused".into()))
        }
        fn flush(&self) -> Result<()> {
            Err(Error::Storage("connection refused".into()))
        }
    }

    fn shared(backend: Arc<dyn CacheBackend>) -> (SharedCache, Arc<CacheStats>) {
        let stats = Arc::new(CacheStats::new());
        let cache = SharedCache::new(Some(backend), "v1_", Duration::from_secs(60), Arc::clone(&stats));
        (cache, stats)
    }

    #[test]
    fn test_prefix_applied() {
        let backend = Arc::new(MemoryCacheBackend::new());
        let (cache, _) = shared(backend.clone());
        cache.set("users:1", &vars! { "id" => "1" });
        assert!(backend.contains("v1_users:1"));
        assert!(!backend.contains("users:1"));
    }

    #[test]
    fn test_round_trip_and_stats() {
        let (cache, stats) = shared(Arc::new(MemoryCacheBackend::new()));
        assert_eq!(cache.get::<Vars>("k"), None);

        let row = vars! { "id" => "1", "name" => None };
        cache.set("k", &row);
        assert_eq!(cache.get::<Vars>("k"), Some(row));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.shared_hits, 1);
        assert_eq!(snapshot.shared_misses, 1);
    }

    #[test]
    fn test_replace_does_not_resurrect() {
        let (cache, _) = shared(Arc::new(MemoryCacheBackend::new()));
        cache.set("k", &vars! { "v" => "1" });
        cache.remove("k");

        assert!(!cache.replace("k", &vars! { "v" => "2" }));
        assert_eq!(cache.get::<Vars>("k"), None);
    }

    #[test]
    fn test_failing_backend_degrades_to_miss() {
        let (cache, stats) = shared(Arc::new(BrokenBackend));
        cache.set("k", &vars! { "v" => "1" });
        assert_eq!(cache.get::<Vars>("k"), None);
        assert!(!cache.replace("k", &vars! { "v" => "1" }));
        cache.remove("k");
        cache.flush();

        assert_eq!(stats.snapshot().shared_errors, 5);
    }

    #[test]
    fn test_no_backend() {
        let cache = SharedCache::new(None, "", Duration::ZERO, Arc::new(CacheStats::new()));
        assert!(!cache.is_enabled());
        cache.set("k", &1u32);
        assert_eq!(cache.get::<u32>("k"), None);
    }
}
