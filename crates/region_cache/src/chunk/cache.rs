//! # Chunk-Partitioned Region Cache
//!
//! Wraps an authoritative [`RegionIndex`] and caches, per 16x16 column, the
//! regions that may contain a point of that column.
//!
//! Point queries are answered from, in order:
//!
//! 1. the hot column, when the previous resolved query hit the same column
//! 2. a loaded entry in the column map
//! 3. the wrapped store, when the column is unknown or not loaded yet
//!
//! Queries never wait for the cache to warm. Columns are warmed only by
//! [`RegionIndex::bias`] and by rebuilds, on a background [`WorkerPool`].
//!
//! The column map, the pool and the hot column form one generation guarded
//! by a single lock. Every write through the cache rebuilds: the pool is
//! shut down immediately, and a fresh map re-enumerates the previously known
//! columns on a fresh pool. Tasks remember the generation they were
//! scheduled for and never look up entries in a newer one.

use super::column_map::ColumnMap;
use super::entry::ColumnEntry;
use super::pool::{CancelToken, PoolSettings, WorkerPool};
use super::stats::{CacheStats, CacheStatsSnapshot};
use crate::config::CacheConfig;
use crate::error::ConfigError;
use crate::index::{RegionDifference, RegionIndex, RegionVisitor, RemovalStrategy};
use crate::region::ProtectedRegion;
use crate::types::{BlockPosition, ColumnCoord};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

type ColumnRegions = Arc<[Arc<ProtectedRegion>]>;

struct CacheState {
    generation: u64,
    columns: ColumnMap<Arc<ColumnEntry>>,
    pool: WorkerPool,
    hot: Option<Arc<ColumnEntry>>,
    /// Cancelled pools of earlier generations whose workers may still be
    /// inside the store
    retired: Vec<WorkerPool>,
}

impl CacheState {
    fn new(pool: WorkerPool) -> Self {
        Self {
            generation: 0,
            columns: ColumnMap::new(),
            pool,
            hot: None,
            retired: Vec::new(),
        }
    }

    /// Cancels the current pool and swaps in `fresh`, starting a new
    /// generation with an empty column map. Returns the number of discarded
    /// jobs.
    fn retire(&mut self, fresh: WorkerPool) -> usize {
        let mut stale = std::mem::replace(&mut self.pool, fresh);
        let dropped = stale.cancel();
        self.retired.retain(|pool| pool.live_workers() > 0);
        if stale.live_workers() > 0 {
            self.retired.push(stale);
        }
        self.generation += 1;
        self.columns = ColumnMap::new();
        self.hot = None;
        dropped
    }

    /// Adds an unloaded entry for the column, returning whether it was new.
    fn insert_missing(&mut self, coord: ColumnCoord) -> bool {
        if self.columns.contains(coord) {
            return false;
        }
        self.columns.insert(coord, Arc::new(ColumnEntry::new(coord)));
        true
    }
}

/// Region store wrapper answering point queries from per-column caches.
///
/// The cache implements [`RegionIndex`] itself: reads pass through to the
/// wrapped store, writes pass through and then rebuild the cache.
pub struct ChunkRegionCache<I: RegionIndex + ?Sized> {
    index: Arc<I>,
    config: CacheConfig,
    state: Arc<Mutex<CacheState>>,
    stats: Arc<CacheStats>,
}

impl<I: RegionIndex + ?Sized + 'static> ChunkRegionCache<I> {
    /// Wraps a store, validating the configuration.
    pub fn new(index: Arc<I>, config: CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let pool = WorkerPool::new(PoolSettings::from(&config));
        Ok(Self {
            index,
            config,
            state: Arc::new(Mutex::new(CacheState::new(pool))),
            stats: Arc::new(CacheStats::default()),
        })
    }

    /// Wraps a store with the default configuration.
    pub fn with_defaults(index: Arc<I>) -> Self {
        let config = CacheConfig::default();
        let pool = WorkerPool::new(PoolSettings::from(&config));
        Self {
            index,
            config,
            state: Arc::new(Mutex::new(CacheState::new(pool))),
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// The wrapped authoritative store.
    pub fn index(&self) -> &Arc<I> {
        &self.index
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Whether the column has a loaded entry in the current generation.
    pub fn is_loaded(&self, coord: ColumnCoord) -> bool {
        self.state
            .lock()
            .columns
            .get(coord)
            .is_some_and(|entry| entry.is_loaded())
    }

    /// Number of columns known to the cache, loaded or not.
    pub fn cached_columns(&self) -> usize {
        self.state.lock().columns.len()
    }

    /// Regions containing the point, in layer order.
    pub fn regions_at(&self, position: BlockPosition) -> Vec<Arc<ProtectedRegion>> {
        let mut regions = Vec::new();
        self.apply_containing(position, &mut |region| {
            regions.push(region.clone());
            true
        });
        regions.sort_by(|a, b| a.layer_order(b));
        regions
    }

    /// Invalidates every cached column while keeping the set of known
    /// columns, which are re-enumerated on a fresh pool.
    #[instrument(skip(self))]
    pub fn rebuild(&self) {
        let mut state = self.state.lock();
        let coords: Vec<ColumnCoord> = state.columns.keys().collect();

        let dropped = state.retire(self.new_pool());
        for &coord in &coords {
            state.insert_missing(coord);
        }
        self.schedule(&state, coords);
        self.stats.rebuilt();

        debug!(
            "Rebuilt generation {} with {} column(s), {} stale job(s) dropped",
            state.generation,
            state.columns.len(),
            dropped
        );
    }

    /// Lets all work scheduled so far finish, waiting at most `timeout`.
    ///
    /// New work goes to a fresh pool straight away so other callers are not
    /// blocked. Returns `false` if the previous pool was still busy when the
    /// timeout expired; that work keeps running.
    pub fn await_completion(&self, timeout: Duration) -> bool {
        let previous = {
            let mut state = self.state.lock();
            std::mem::replace(&mut state.pool, self.new_pool())
        };
        let drained = previous.shutdown(timeout);
        if !drained {
            debug!("Chunk cache pool still draining after {:?}", timeout);
        }
        drained
    }

    /// Forgets every column like [`RegionIndex::forget_all`], then waits up
    /// to `timeout` for enumeration of this or any earlier generation that
    /// was already running to stop.
    ///
    /// Returns `false` if a task was still inside the store when the timeout
    /// expired. Used when the store is about to go away.
    pub fn forget_all_and_wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let retired = {
            let mut state = self.state.lock();
            state.retire(self.new_pool());
            std::mem::take(&mut state.retired)
        };

        let mut stopped = true;
        for pool in &retired {
            stopped &= pool.wait(deadline.saturating_duration_since(Instant::now()));
        }
        if !stopped {
            debug!("Cancelled enumeration still running after {:?}", timeout);
            // keep tracking them so a later call can wait again
            let running = retired.into_iter().filter(|pool| pool.live_workers() > 0);
            self.state.lock().retired.extend(running);
        }
        stopped
    }

    fn new_pool(&self) -> WorkerPool {
        WorkerPool::new(PoolSettings::from(&self.config))
    }

    /// Resolves the loaded contents of a column, if any, updating the hot
    /// column on a map hit.
    fn resolve(&self, coord: ColumnCoord) -> Option<ColumnRegions> {
        let mut state = self.state.lock();

        if self.config.hot_column {
            if let Some(hot) = state.hot.as_ref().filter(|hot| hot.coord() == coord) {
                if let Some(regions) = hot.regions() {
                    self.stats.hot_column_hit();
                    return Some(regions.clone());
                }
            }
        }

        let entry = state.columns.get(coord)?.clone();
        let regions = entry.regions()?.clone();
        self.stats.column_hit();
        if self.config.hot_column {
            state.hot = Some(entry);
        }
        Some(regions)
    }

    /// Submits enumeration of the given columns for the current generation.
    fn schedule(&self, state: &CacheState, coords: Vec<ColumnCoord>) {
        for batch in coords.chunks(self.config.rebuild_batch_size) {
            let task = Enumeration {
                state: Arc::downgrade(&self.state),
                generation: state.generation,
                index: self.index.clone(),
                stats: self.stats.clone(),
                coords: batch.to_vec(),
            };
            state.pool.submit(Box::new(move |token| task.run(token)));
        }
    }
}

impl<I: RegionIndex + ?Sized + 'static> RegionIndex for ChunkRegionCache<I> {
    fn add(&self, region: Arc<ProtectedRegion>) {
        self.index.add(region);
        self.rebuild();
    }

    fn add_all(&self, regions: Vec<Arc<ProtectedRegion>>) {
        self.index.add_all(regions);
        self.rebuild();
    }

    fn remove(&self, id: &str, strategy: RemovalStrategy) -> Vec<Arc<ProtectedRegion>> {
        let removed = self.index.remove(id, strategy);
        self.rebuild();
        removed
    }

    fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    fn get(&self, id: &str) -> Option<Arc<ProtectedRegion>> {
        self.index.get(id)
    }

    fn apply(&self, visitor: &mut RegionVisitor<'_>) {
        self.index.apply(visitor)
    }

    fn apply_containing(&self, position: BlockPosition, visitor: &mut RegionVisitor<'_>) {
        match self.resolve(position.column()) {
            Some(regions) => {
                for region in regions.iter() {
                    if region.contains(position) && !visitor(region) {
                        break;
                    }
                }
            }
            None => {
                self.stats.store_fallback();
                self.index.apply_containing(position, visitor);
            }
        }
    }

    fn apply_intersecting(&self, region: &ProtectedRegion, visitor: &mut RegionVisitor<'_>) {
        self.index.apply_intersecting(region, visitor)
    }

    fn size(&self) -> usize {
        self.index.size()
    }

    fn values(&self) -> Vec<Arc<ProtectedRegion>> {
        self.index.values()
    }

    fn is_dirty(&self) -> bool {
        self.index.is_dirty()
    }

    fn set_dirty(&self, dirty: bool) {
        self.index.set_dirty(dirty)
    }

    fn take_difference(&self) -> RegionDifference {
        self.index.take_difference()
    }

    fn restore_difference(&self, difference: RegionDifference) {
        self.index.restore_difference(difference)
    }

    fn bias(&self, column: ColumnCoord) {
        let mut state = self.state.lock();
        if state.insert_missing(column) {
            self.schedule(&state, vec![column]);
        }
    }

    fn bias_all(&self, columns: &[ColumnCoord]) {
        let mut state = self.state.lock();
        let created: Vec<ColumnCoord> = columns
            .iter()
            .copied()
            .filter(|&coord| state.insert_missing(coord))
            .collect();
        if !created.is_empty() {
            self.schedule(&state, created);
        }
    }

    fn forget(&self, column: ColumnCoord) {
        let mut state = self.state.lock();
        state.columns.remove(column);
        if state.hot.as_ref().is_some_and(|hot| hot.coord() == column) {
            state.hot = None;
        }
    }

    fn forget_all(&self) {
        let dropped = self.state.lock().retire(self.new_pool());
        debug!("Forgot all columns, {} stale job(s) dropped", dropped);
    }
}

/// Background job filling the entries of a batch of columns.
struct Enumeration<I: RegionIndex + ?Sized> {
    state: Weak<Mutex<CacheState>>,
    generation: u64,
    index: Arc<I>,
    stats: Arc<CacheStats>,
    coords: Vec<ColumnCoord>,
}

impl<I: RegionIndex + ?Sized> Enumeration<I> {
    fn run(self, token: &CancelToken) {
        for (done, &coord) in self.coords.iter().enumerate() {
            if token.is_cancelled() {
                self.stats.task_cancelled();
                debug!(
                    "Enumeration for generation {} cancelled with {} column(s) left",
                    self.generation,
                    self.coords.len() - done
                );
                return;
            }

            let Some(entry) = self.current_entry(coord) else {
                continue;
            };
            if entry.is_loaded() {
                continue;
            }

            let column = ProtectedRegion::column(coord);
            let mut regions = Vec::new();
            self.index.apply_intersecting(&column, &mut |region| {
                regions.push(region.clone());
                true
            });
            regions.sort_by(|a, b| a.layer_order(b));

            let count = regions.len();
            if entry.publish(regions) {
                self.stats.column_loaded();
                debug!("Column {} loaded with {} region(s)", coord, count);
            }
        }
    }

    /// Entry for the column in this task's generation, without creating one.
    /// `None` if the cache is gone, the generation moved on, or the column
    /// was forgotten.
    fn current_entry(&self, coord: ColumnCoord) -> Option<Arc<ColumnEntry>> {
        let state = self.state.upgrade()?;
        let state = state.lock();
        if state.generation != self.generation {
            return None;
        }
        state.columns.get(coord).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::HashMapIndex;

    const WAIT: Duration = Duration::from_secs(5);

    fn cuboid(id: &str, min: (i32, i32), max: (i32, i32)) -> Arc<ProtectedRegion> {
        Arc::new(
            ProtectedRegion::cuboid(
                id,
                BlockPosition::new(min.0, 0, min.1),
                BlockPosition::new(max.0, 255, max.1),
            )
            .unwrap(),
        )
    }

    fn cache_with(regions: Vec<Arc<ProtectedRegion>>) -> ChunkRegionCache<HashMapIndex> {
        ChunkRegionCache::with_defaults(Arc::new(HashMapIndex::with_regions(regions)))
    }

    fn ids(regions: &[Arc<ProtectedRegion>]) -> Vec<&str> {
        regions.iter().map(|r| r.id()).collect()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = CacheConfig {
            max_threads: 0,
            ..CacheConfig::default()
        };
        assert!(ChunkRegionCache::new(Arc::new(HashMapIndex::new()), config).is_err());
    }

    #[test]
    fn test_bias_loads_column_in_layer_order() {
        let cache = cache_with(vec![
            cuboid("low", (0, 0), (31, 31)),
            Arc::new(
                ProtectedRegion::cuboid("high", BlockPosition::new(0, 0, 0), BlockPosition::new(5, 5, 5))
                    .unwrap()
                    .with_priority(10),
            ),
            cuboid("elsewhere", (100, 100), (120, 120)),
        ]);
        let coord = ColumnCoord::new(0, 0);
        assert!(!cache.is_loaded(coord));

        cache.bias(coord);
        cache.bias(coord);
        assert_eq!(cache.cached_columns(), 1);
        assert!(cache.await_completion(WAIT));
        assert!(cache.is_loaded(coord));

        let regions = cache.regions_at(BlockPosition::new(1, 1, 1));
        assert_eq!(ids(&regions), vec!["high", "low"]);
        assert_eq!(ids(&cache.regions_at(BlockPosition::new(1, 100, 1))), vec!["low"]);
        assert!(cache.stats().column_hits + cache.stats().hot_column_hits >= 2);
        assert_eq!(cache.stats().columns_loaded, 1);
    }

    #[test]
    fn test_unloaded_column_falls_back() {
        let cache = cache_with(vec![cuboid("a", (0, 0), (15, 15))]);
        assert_eq!(ids(&cache.regions_at(BlockPosition::new(3, 3, 3))), vec!["a"]);
        assert_eq!(cache.stats().store_fallbacks, 1);
        // queries never populate the cache
        assert_eq!(cache.cached_columns(), 0);
    }

    #[test]
    fn test_hot_column_is_used_and_cleared_by_forget() {
        let cache = cache_with(vec![cuboid("a", (0, 0), (15, 15))]);
        let coord = ColumnCoord::new(0, 0);
        cache.bias(coord);
        assert!(cache.await_completion(WAIT));

        cache.regions_at(BlockPosition::new(1, 1, 1));
        cache.regions_at(BlockPosition::new(2, 1, 2));
        let stats = cache.stats();
        assert_eq!(stats.column_hits, 1);
        assert_eq!(stats.hot_column_hits, 1);

        cache.forget(coord);
        assert!(cache.state.lock().hot.is_none());
        assert_eq!(ids(&cache.regions_at(BlockPosition::new(1, 1, 1))), vec!["a"]);
        assert_eq!(cache.stats().store_fallbacks, 1);

        // forgetting an unknown column is a no-op
        cache.forget(ColumnCoord::new(40, 40));
        assert_eq!(cache.cached_columns(), 0);
    }

    #[test]
    fn test_hot_column_can_be_disabled() {
        let index = Arc::new(HashMapIndex::with_regions(vec![cuboid("a", (0, 0), (15, 15))]));
        let config = CacheConfig {
            hot_column: false,
            ..CacheConfig::default()
        };
        let cache = ChunkRegionCache::new(index, config).unwrap();
        cache.bias(ColumnCoord::new(0, 0));
        assert!(cache.await_completion(WAIT));

        for _ in 0..3 {
            assert_eq!(ids(&cache.regions_at(BlockPosition::new(1, 1, 1))), vec!["a"]);
        }
        assert_eq!(cache.stats().hot_column_hits, 0);
        assert_eq!(cache.stats().column_hits, 3);
    }

    #[test]
    fn test_rebuild_keeps_known_columns() {
        let cache = cache_with(vec![cuboid("a", (0, 0), (15, 15))]);
        let columns = [ColumnCoord::new(0, 0), ColumnCoord::new(-1, 3), ColumnCoord::new(7, -7)];
        cache.bias_all(&columns);
        assert!(cache.await_completion(WAIT));

        cache.add(cuboid("b", (-16, 48), (-1, 63)));
        assert_eq!(cache.cached_columns(), 3);
        assert_eq!(cache.state.lock().generation, 1);
        assert!(cache.state.lock().hot.is_none());

        assert!(cache.await_completion(WAIT));
        for coord in columns {
            assert!(cache.is_loaded(coord), "column {} should be reloaded", coord);
        }
        assert_eq!(ids(&cache.regions_at(BlockPosition::new(-5, 0, 50))), vec!["b"]);
        assert_eq!(cache.stats().rebuilds, 1);
    }

    #[test]
    fn test_forget_all_goes_cold() {
        let cache = cache_with(vec![cuboid("a", (0, 0), (15, 15))]);
        cache.bias_all(&[ColumnCoord::new(0, 0), ColumnCoord::new(1, 1)]);
        assert!(cache.await_completion(WAIT));

        cache.forget_all();
        assert_eq!(cache.cached_columns(), 0);
        assert!(!cache.is_loaded(ColumnCoord::new(0, 0)));
        assert_eq!(ids(&cache.regions_at(BlockPosition::new(0, 0, 0))), vec!["a"]);
    }

    #[test]
    fn test_stale_task_skips_newer_generation() {
        let cache = cache_with(vec![cuboid("a", (0, 0), (15, 15))]);
        let coord = ColumnCoord::new(0, 0);
        {
            let mut state = cache.state.lock();
            state.insert_missing(coord);
        }
        let stale = Enumeration {
            state: Arc::downgrade(&cache.state),
            generation: 0,
            index: cache.index.clone(),
            stats: cache.stats.clone(),
            coords: vec![coord],
        };

        cache.forget_all();
        cache.bias(coord);
        assert!(cache.await_completion(WAIT));
        let fresh = cache.state.lock().columns.get(coord).cloned().unwrap();

        stale.run(&CancelToken::new());
        assert!(Arc::ptr_eq(
            &fresh,
            &cache.state.lock().columns.get(coord).cloned().unwrap()
        ));
        assert_eq!(cache.stats().columns_loaded, 1);
    }

    #[test]
    fn test_cancelled_task_stops_before_next_column() {
        let cache = cache_with(vec![cuboid("a", (0, 0), (15, 15))]);
        let coord = ColumnCoord::new(0, 0);
        cache.state.lock().insert_missing(coord);

        let token = CancelToken::new();
        token.cancel();
        let task = Enumeration {
            state: Arc::downgrade(&cache.state),
            generation: 0,
            index: cache.index.clone(),
            stats: cache.stats.clone(),
            coords: vec![coord],
        };
        task.run(&token);
        assert!(!cache.is_loaded(coord));
        assert_eq!(cache.stats().tasks_cancelled, 1);
    }
}
