//! Configuration constants and engine settings for rowcache.

use std::time::Duration;

/// Separator between primary key parts in a composite id.
///
/// A table keyed on `(user, group)` with values `7` and `3` has id `"7:3"`.
pub const ID_SEPARATOR: char = ':';

/// Default time-to-live for rows written to the shared cache tier.
pub const DEFAULT_SHARED_TTL: Duration = Duration::from_secs(1800);

/// Default number of rows per statement for bulk inserts and replaces.
pub const DEFAULT_BULK_CHUNK: usize = 100;

/// Actor id recorded in created-by / deleted-by columns when no user acts.
pub const SYSTEM_ACTOR: &str = "1";

/// Shared cache key under which a table's full row set is stored.
pub fn all_rows_key(table: &str) -> String {
    format!("all_{}", table)
}

/// Shared cache key of a single row.
///
/// Table names never contain the separator, so `users:12` cannot collide
/// with row `2` of a table named `users1`.
pub fn row_key(table: &str, id: &str) -> String {
    format!("{}{}{}", table, ID_SEPARATOR, id)
}

/// Runtime settings for a [`Context`](crate::Context).
///
/// The shared-cache and IPC flags guard every call site of their tier; with
/// both off the engine degrades to an identity map in front of storage.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Prefix prepended to every shared cache key.
    ///
    /// Changing it orphans all existing entries, which is how a deploy
    /// poisons the shared tier without flushing it.
    pub key_prefix: String,
    /// TTL for shared cache writes.
    pub shared_ttl: Duration,
    /// Whether cacheable tables use the process identity map.
    pub process_cache: bool,
    /// Whether the shared tier is consulted at all.
    pub shared_cache: bool,
    /// Whether invalidations are broadcast at the end of a unit of work.
    pub ipc: bool,
    /// Rows per statement for bulk writes.
    pub bulk_chunk_size: usize,
    /// Actor recorded when no user is set on the context.
    pub system_actor: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            key_prefix: String::new(),
            shared_ttl: DEFAULT_SHARED_TTL,
            process_cache: true,
            shared_cache: true,
            ipc: true,
            bulk_chunk_size: DEFAULT_BULK_CHUNK,
            system_actor: SYSTEM_ACTOR.to_string(),
        }
    }
}

impl EngineConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shared cache key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the shared cache TTL.
    pub fn with_shared_ttl(mut self, ttl: Duration) -> Self {
        self.shared_ttl = ttl;
        self
    }

    /// Enable or disable the process identity map.
    pub fn with_process_cache(mut self, enabled: bool) -> Self {
        self.process_cache = enabled;
        self
    }

    /// Enable or disable the shared cache tier.
    pub fn with_shared_cache(mut self, enabled: bool) -> Self {
        self.shared_cache = enabled;
        self
    }

    /// Enable or disable invalidation broadcasts.
    pub fn with_ipc(mut self, enabled: bool) -> Self {
        self.ipc = enabled;
        self
    }

    /// Set the bulk write chunk size. Zero is clamped to one.
    pub fn with_bulk_chunk_size(mut self, size: usize) -> Self {
        self.bulk_chunk_size = size.max(1);
        self
    }

    /// Set the fallback actor id.
    pub fn with_system_actor(mut self, actor: impl Into<String>) -> Self {
        self.system_actor = actor.into();
        self
    }
}
