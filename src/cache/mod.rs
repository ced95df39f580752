//! Cache tiers.
//!
//! # Components
//! - [`IdentityCache`] - per-table identity map, one live instance per id
//! - [`SharedCache`] - fault-tolerant front for a [`CacheBackend`]
//! - [`backend`] - shared tier implementations
//! - [`invalidation`] - end-of-unit-of-work outbox and transports
//! - [`CacheStats`] - hit/miss and traffic counters

pub mod backend;
mod identity;
pub mod invalidation;
mod shared;
mod stats;

pub use backend::{CacheBackend, FileCacheBackend, MemoryCacheBackend};
pub use identity::IdentityCache;
pub use invalidation::{BusEndpoint, Invalidation, InvalidationQueue, InvalidationTransport, LocalBus};
pub use shared::SharedCache;
pub use stats::{CacheStats, StatsSnapshot};
