//! # World Lifecycle
//!
//! Glue between a host's world and chunk events and the per-world caches.
//!
//! The host owns event dispatch. It calls into a [`ChunkLifecycle`] when
//! chunks load or unload, and keeps one cache per world in a
//! [`RegionContainer`].

use crate::chunk::ChunkRegionCache;
use crate::config::CacheConfig;
use crate::error::ConfigError;
use crate::index::RegionIndex;
use crate::types::{BoundingBox, ColumnCoord};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Forwards chunk events of one world to any region index.
///
/// Plain stores ignore the hints; a [`ChunkRegionCache`] warms and drops
/// columns accordingly.
pub struct ChunkLifecycle<I: RegionIndex + ?Sized> {
    index: Arc<I>,
}

impl<I: RegionIndex + ?Sized> Clone for ChunkLifecycle<I> {
    fn clone(&self) -> Self {
        Self {
            index: self.index.clone(),
        }
    }
}

impl<I: RegionIndex + ?Sized> ChunkLifecycle<I> {
    pub fn new(index: Arc<I>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &Arc<I> {
        &self.index
    }

    /// World became available with these chunks already loaded.
    pub fn world_loaded(&self, loaded_chunks: &[ColumnCoord]) {
        debug!("World loaded with {} chunk(s)", loaded_chunks.len());
        self.index.bias_all(loaded_chunks);
    }

    /// A block area became loaded at once, e.g. the view distance around a
    /// joining player. Warms every column the area touches.
    pub fn area_loaded(&self, area: &BoundingBox) {
        let columns: Vec<ColumnCoord> = area.columns().collect();
        self.index.bias_all(&columns);
    }

    pub fn chunk_loaded(&self, coord: ColumnCoord) {
        self.index.bias(coord);
    }

    pub fn chunk_unloaded(&self, coord: ColumnCoord) {
        self.index.forget(coord);
    }

    pub fn world_unloaded(&self) {
        self.index.forget_all();
    }
}

/// Per-world registry of chunk caches.
pub struct RegionContainer<I: RegionIndex + ?Sized + 'static> {
    worlds: DashMap<String, Arc<ChunkRegionCache<I>>>,
}

impl<I: RegionIndex + ?Sized + 'static> Default for RegionContainer<I> {
    fn default() -> Self {
        Self {
            worlds: DashMap::new(),
        }
    }
}

impl<I: RegionIndex + ?Sized + 'static> RegionContainer<I> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps the world's store in a cache and registers it, replacing any
    /// cache previously registered under the same name.
    #[instrument(skip(self, index, config))]
    pub fn load_world(
        &self,
        name: &str,
        index: Arc<I>,
        config: CacheConfig,
    ) -> Result<Arc<ChunkRegionCache<I>>, ConfigError> {
        let cache = Arc::new(ChunkRegionCache::new(index, config)?);
        if let Some(previous) = self.worlds.insert(name.to_string(), cache.clone()) {
            warn!("World '{}' was already loaded, replacing its cache", name);
            previous.forget_all();
        }
        info!("🌍 Loaded regions for world '{}' ({} region(s))", name, cache.size());
        Ok(cache)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ChunkRegionCache<I>>> {
        self.worlds.get(name).map(|entry| entry.value().clone())
    }

    /// Lifecycle adapter for a loaded world.
    pub fn lifecycle(&self, name: &str) -> Option<ChunkLifecycle<ChunkRegionCache<I>>> {
        self.get(name).map(ChunkLifecycle::new)
    }

    /// Unregisters a world, drops its columns and waits up to `timeout` for
    /// running enumeration to leave the world's store. Returns `false` if the
    /// world was unknown or a task was still running when the timeout expired.
    #[instrument(skip(self))]
    pub fn unload_world(&self, name: &str, timeout: Duration) -> bool {
        let Some((_, cache)) = self.worlds.remove(name) else {
            debug!("World '{}' is not loaded", name);
            return false;
        };
        let drained = cache.forget_all_and_wait(timeout);
        if drained {
            info!("🌙 Unloaded regions for world '{}'", name);
        } else {
            warn!("World '{}' unloaded but enumeration is still running after {:?}", name, timeout);
        }
        drained
    }

    /// Names of the loaded worlds in no particular order.
    pub fn worlds(&self) -> Vec<String> {
        self.worlds.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.worlds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.worlds.is_empty()
    }

    /// Unloads every world. Returns whether all of them drained in time.
    #[instrument(skip(self))]
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let mut all_drained = true;
        for name in self.worlds() {
            all_drained &= self.unload_world(&name, timeout);
        }
        info!("🛑 Region container shut down");
        all_drained
    }
}
