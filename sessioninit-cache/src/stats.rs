//! Cache statistics.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated without taking the store lock.
#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub bypasses: AtomicU64,
    pub write_backs: AtomicU64,
    pub write_backs_discarded: AtomicU64,
    pub grants_rejected: AtomicU64,
}

impl CacheCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Point-in-time statistics about the authentication cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups served from the store.
    pub hits: u64,
    /// Lookups that went through a coalesced load.
    pub misses: u64,
    /// Lookups that skipped the store entirely (disabled, uncommitted, caller behind).
    pub bypasses: u64,
    /// Loads actually started by the coalescer, across both entry kinds.
    pub loads_started: u64,
    /// Fetched values installed into the store.
    pub write_backs: u64,
    /// Fetched values dropped because a watermark moved during the fetch.
    pub write_backs_discarded: u64,
    /// Fetched values dropped because the memory budget was exhausted.
    pub grants_rejected: u64,
    /// Staleness-triggered clears.
    pub invalidations: u64,
    /// Users currently cached.
    pub auth_info_entries: u64,
    /// Settings keys currently cached.
    pub settings_entries: u64,
    /// Bytes charged to the memory budget.
    pub memory_bytes: u64,
}

impl CacheStats {
    pub(crate) fn from_counters(counters: &CacheCounters) -> Self {
        Self {
            hits: CacheCounters::get(&counters.hits),
            misses: CacheCounters::get(&counters.misses),
            bypasses: CacheCounters::get(&counters.bypasses),
            write_backs: CacheCounters::get(&counters.write_backs),
            write_backs_discarded: CacheCounters::get(&counters.write_backs_discarded),
            grants_rejected: CacheCounters::get(&counters.grants_rejected),
            ..Default::default()
        }
    }

    /// Calculate the hit rate (0.0 to 1.0) over lookups that consulted the store.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
