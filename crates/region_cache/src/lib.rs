//! # Region Cache
//!
//! Chunk-partitioned spatial cache for "which regions contain this point?"
//! queries over a large, mutable set of protected regions.
//!
//! ## Core Features
//!
//! - **Authoritative stores**: [`HashMapIndex`] and [`RTreeIndex`] behind the
//!   [`RegionIndex`] trait
//! - **Column cache**: [`ChunkRegionCache`] pre-filters regions per 16x16
//!   column on a background pool and answers point queries from them
//! - **Always answerable**: columns that are not warm fall back to the store,
//!   and every mutation invalidates the cache before it returns
//! - **Lifecycle glue**: [`ChunkLifecycle`] and [`RegionContainer`] map host
//!   world and chunk events onto cache hints
//!
//! ## Quick Start Example
//!
//! ```rust
//! use region_cache::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let store = Arc::new(HashMapIndex::new());
//! let cache = ChunkRegionCache::with_defaults(store);
//!
//! let spawn = ProtectedRegion::cuboid(
//!     "spawn",
//!     BlockPosition::new(0, 0, 0),
//!     BlockPosition::new(15, 255, 15),
//! )
//! .unwrap();
//! cache.add(Arc::new(spawn));
//!
//! cache.bias(ColumnCoord::new(0, 0));
//! assert!(cache.await_completion(Duration::from_secs(5)));
//!
//! let found = cache.regions_at(BlockPosition::new(3, 64, 3));
//! assert_eq!(found[0].id(), "spawn");
//! ```
//!
//! The crate never installs a tracing subscriber; binaries decide how logs
//! are rendered.

pub mod chunk;
pub mod config;
pub mod error;
pub mod index;
pub mod lifecycle;
pub mod region;
pub mod types;

pub use chunk::{
    CacheStatsSnapshot, CancelToken, ChunkRegionCache, ColumnEntry, ColumnMap, PoolSettings, WorkerPool,
};
pub use config::CacheConfig;
pub use error::{ConfigError, RegionError};
pub use index::{HashMapIndex, RTreeIndex, RegionDifference, RegionIndex, RegionVisitor, RemovalStrategy};
pub use lifecycle::{ChunkLifecycle, RegionContainer};
pub use region::{normalize_id, ProtectedRegion, RegionShape};
pub use types::{BlockPosition, BoundingBox, ColumnCoord, COLUMN_SHIFT, COLUMN_SIZE};
