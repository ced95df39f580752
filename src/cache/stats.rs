//! Cache statistics tracking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one [`Context`](crate::Context).
///
/// Fields are atomic so the shared-cache wrapper can bump them through a
/// shared reference. All operations use `Ordering::Relaxed`; the counters
/// are independent and only read for reporting.
///
/// # Example
/// ```
/// use rowcache::cache::CacheStats;
/// use std::sync::atomic::Ordering;
///
/// let stats = CacheStats::new();
/// stats.identity_hits.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(stats.snapshot().identity_hits, 1);
/// ```
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Lookups answered by the identity map.
    pub identity_hits: AtomicU64,
    /// Lookups the identity map could not answer.
    pub identity_misses: AtomicU64,
    /// Shared tier reads that returned a value.
    pub shared_hits: AtomicU64,
    /// Shared tier reads that returned nothing.
    pub shared_misses: AtomicU64,
    /// Shared tier calls that failed and were treated as misses.
    pub shared_errors: AtomicU64,
    /// SELECT statements sent to storage.
    pub storage_reads: AtomicU64,
    /// Write statements sent to storage.
    pub storage_writes: AtomicU64,
    /// Invalidation messages broadcast.
    pub invalidations_sent: AtomicU64,
    /// Invalidation messages received and applied.
    pub invalidations_applied: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Identity map hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        self.snapshot().hit_rate()
    }

    /// A non-atomic copy for display and assertions.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            identity_hits: self.identity_hits.load(Ordering::Relaxed),
            identity_misses: self.identity_misses.load(Ordering::Relaxed),
            shared_hits: self.shared_hits.load(Ordering::Relaxed),
            shared_misses: self.shared_misses.load(Ordering::Relaxed),
            shared_errors: self.shared_errors.load(Ordering::Relaxed),
            storage_reads: self.storage_reads.load(Ordering::Relaxed),
            storage_writes: self.storage_writes.load(Ordering::Relaxed),
            invalidations_sent: self.invalidations_sent.load(Ordering::Relaxed),
            invalidations_applied: self.invalidations_applied.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        for counter in [
            &self.identity_hits,
            &self.identity_misses,
            &self.shared_hits,
            &self.shared_misses,
            &self.shared_errors,
            &self.storage_reads,
            &self.storage_writes,
            &self.invalidations_sent,
            &self.invalidations_applied,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// A point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub identity_hits: u64,
    pub identity_misses: u64,
    pub shared_hits: u64,
    pub shared_misses: u64,
    pub shared_errors: u64,
    pub storage_reads: u64,
    pub storage_writes: u64,
    pub invalidations_sent: u64,
    pub invalidations_applied: u64,
}

impl StatsSnapshot {
    /// Identity map hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.identity_hits + self.identity_misses;
        if total == 0 {
            0.0
        } else {
            self.identity_hits as f64 / total as f64
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stats {{ hits: {}, misses: {}, shared: {}/{}, reads: {}, writes: {}, hit_rate: {:.2}% }}",
            self.identity_hits,
            self.identity_misses,
            self.shared_hits,
            self.shared_hits + self.shared_misses,
            self.storage_reads,
            self.storage_writes,
            self.hit_rate() * 100.0
        )
    }
}
