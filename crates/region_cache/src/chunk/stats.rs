//! Counters describing how point queries were answered.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated with relaxed atomics from queries and workers.
#[derive(Debug, Default)]
pub struct CacheStats {
    hot_column_hits: AtomicU64,
    column_hits: AtomicU64,
    store_fallbacks: AtomicU64,
    columns_loaded: AtomicU64,
    rebuilds: AtomicU64,
    tasks_cancelled: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    /// Queries answered from the hot column without a map lookup
    pub hot_column_hits: u64,
    /// Queries answered from a loaded column found in the map
    pub column_hits: u64,
    /// Queries delegated to the authoritative store
    pub store_fallbacks: u64,
    /// Columns published by background enumeration
    pub columns_loaded: u64,
    /// Full invalidations caused by mutations
    pub rebuilds: u64,
    /// Enumeration tasks that stopped early on cancellation
    pub tasks_cancelled: u64,
}

impl CacheStatsSnapshot {
    /// Share of queries that did not have to touch the store.
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hot_column_hits + self.column_hits;
        let total = hits + self.store_fallbacks;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl CacheStats {
    pub(crate) fn hot_column_hit(&self) {
        bump(&self.hot_column_hits);
    }

    pub(crate) fn column_hit(&self) {
        bump(&self.column_hits);
    }

    pub(crate) fn store_fallback(&self) {
        bump(&self.store_fallbacks);
    }

    pub(crate) fn column_loaded(&self) {
        bump(&self.columns_loaded);
    }

    pub(crate) fn rebuilt(&self) {
        bump(&self.rebuilds);
    }

    pub(crate) fn task_cancelled(&self) {
        bump(&self.tasks_cancelled);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hot_column_hits: self.hot_column_hits.load(Ordering::Relaxed),
            column_hits: self.column_hits.load(Ordering::Relaxed),
            store_fallbacks: self.store_fallbacks.load(Ordering::Relaxed),
            columns_loaded: self.columns_loaded.load(Ordering::Relaxed),
            rebuilds: self.rebuilds.load(Ordering::Relaxed),
            tasks_cancelled: self.tasks_cancelled.load(Ordering::Relaxed),
        }
    }
}
