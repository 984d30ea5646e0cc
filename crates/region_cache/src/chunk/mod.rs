//! # Chunk Cache
//!
//! Per-column caching of region lookups.
//!
//! ## Key Types
//!
//! - [`ChunkRegionCache`] - region store wrapper answering point queries
//!   from loaded columns, falling back to the wrapped store
//! - [`ColumnMap`] - sparse map keyed by column coordinates
//! - [`ColumnEntry`] - write-once contents of one column
//! - [`WorkerPool`] - bounded background pool that fills entries
//! - [`CacheStatsSnapshot`] - counters describing how queries were answered

mod cache;
mod column_map;
mod entry;
mod pool;
mod stats;

pub use cache::ChunkRegionCache;
pub use column_map::ColumnMap;
pub use entry::ColumnEntry;
pub use pool::{CancelToken, Job, PoolSettings, WorkerPool};
pub use stats::{CacheStats, CacheStatsSnapshot};
