//! # Authoritative Region Stores
//!
//! [`RegionIndex`] is the boundary between the chunk cache and whatever owns
//! the canonical set of regions. Two in-memory stores are provided:
//!
//! - [`HashMapIndex`] - id-keyed map, linear spatial scans
//! - [`RTreeIndex`] - the same storage with a lazily rebuilt R-tree for
//!   spatial queries
//!
//! The chunk cache in [`crate::chunk`] also implements the trait, so callers
//! can swap a plain store for a cached one without changing their code.

mod hash_map;
mod rtree;

pub use hash_map::HashMapIndex;
pub use rtree::RTreeIndex;

use crate::region::ProtectedRegion;
use crate::types::{BlockPosition, ColumnCoord};
use std::collections::HashMap;
use std::sync::Arc;

/// Callback invoked for each visited region. Returning `false` stops the
/// visitation early.
pub type RegionVisitor<'a> = dyn FnMut(&Arc<ProtectedRegion>) -> bool + 'a;

/// What happens to the children of a removed region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemovalStrategy {
    /// Keep the children and clear their parent link.
    #[default]
    UnsetParentInChildren,
    /// Remove every descendant along with the region.
    RemoveChildren,
}

/// Regions changed or removed since the last time the difference was taken.
///
/// Persistence layers use this to write incremental saves.
#[derive(Debug, Clone, Default)]
pub struct RegionDifference {
    pub changed: HashMap<String, Arc<ProtectedRegion>>,
    pub removed: HashMap<String, Arc<ProtectedRegion>>,
}

impl RegionDifference {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }

    pub(crate) fn record_change(&mut self, region: &Arc<ProtectedRegion>) {
        self.removed.remove(region.id());
        self.changed.insert(region.id().to_string(), region.clone());
    }

    pub(crate) fn record_removal(&mut self, region: &Arc<ProtectedRegion>) {
        self.changed.remove(region.id());
        self.removed.insert(region.id().to_string(), region.clone());
    }

    /// Folds a newer difference into this one.
    pub(crate) fn merge(&mut self, newer: RegionDifference) {
        for region in newer.removed.values() {
            self.record_removal(region);
        }
        for region in newer.changed.values() {
            self.record_change(region);
        }
    }
}

/// Canonical store of regions.
///
/// Implementations use interior mutability and are shared between threads.
/// Visitors are never called while an internal lock is held, so a visitor
/// may call back into the index.
pub trait RegionIndex: Send + Sync {
    /// Adds a region, replacing any region with the same id.
    fn add(&self, region: Arc<ProtectedRegion>);

    fn add_all(&self, regions: Vec<Arc<ProtectedRegion>>);

    /// Removes a region by id and returns every region removed by the
    /// operation (the region itself plus any children the strategy removes).
    fn remove(&self, id: &str, strategy: RemovalStrategy) -> Vec<Arc<ProtectedRegion>>;

    fn contains(&self, id: &str) -> bool;

    fn get(&self, id: &str) -> Option<Arc<ProtectedRegion>>;

    /// Visits every region.
    fn apply(&self, visitor: &mut RegionVisitor<'_>);

    /// Visits every region containing the point.
    fn apply_containing(&self, position: BlockPosition, visitor: &mut RegionVisitor<'_>);

    /// Visits every region intersecting the given region.
    fn apply_intersecting(&self, region: &ProtectedRegion, visitor: &mut RegionVisitor<'_>);

    fn size(&self) -> usize;

    fn values(&self) -> Vec<Arc<ProtectedRegion>>;

    fn is_dirty(&self) -> bool;

    fn set_dirty(&self, dirty: bool);

    /// Returns the accumulated difference and clears it.
    fn take_difference(&self) -> RegionDifference;

    /// Puts a previously taken difference back, e.g. after a failed save.
    fn restore_difference(&self, difference: RegionDifference);

    /// Hint that queries in this column are likely soon.
    fn bias(&self, _column: ColumnCoord) {}

    fn bias_all(&self, _columns: &[ColumnCoord]) {}

    /// Hint that the column is no longer interesting.
    fn forget(&self, _column: ColumnCoord) {}

    fn forget_all(&self) {}
}

impl<T: RegionIndex + ?Sized> RegionIndex for Arc<T> {
    fn add(&self, region: Arc<ProtectedRegion>) {
        (**self).add(region)
    }

    fn add_all(&self, regions: Vec<Arc<ProtectedRegion>>) {
        (**self).add_all(regions)
    }

    fn remove(&self, id: &str, strategy: RemovalStrategy) -> Vec<Arc<ProtectedRegion>> {
        (**self).remove(id, strategy)
    }

    fn contains(&self, id: &str) -> bool {
        (**self).contains(id)
    }

    fn get(&self, id: &str) -> Option<Arc<ProtectedRegion>> {
        (**self).get(id)
    }

    fn apply(&self, visitor: &mut RegionVisitor<'_>) {
        (**self).apply(visitor)
    }

    fn apply_containing(&self, position: BlockPosition, visitor: &mut RegionVisitor<'_>) {
        (**self).apply_containing(position, visitor)
    }

    fn apply_intersecting(&self, region: &ProtectedRegion, visitor: &mut RegionVisitor<'_>) {
        (**self).apply_intersecting(region, visitor)
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn values(&self) -> Vec<Arc<ProtectedRegion>> {
        (**self).values()
    }

    fn is_dirty(&self) -> bool {
        (**self).is_dirty()
    }

    fn set_dirty(&self, dirty: bool) {
        (**self).set_dirty(dirty)
    }

    fn take_difference(&self) -> RegionDifference {
        (**self).take_difference()
    }

    fn restore_difference(&self, difference: RegionDifference) {
        (**self).restore_difference(difference)
    }

    fn bias(&self, column: ColumnCoord) {
        (**self).bias(column)
    }

    fn bias_all(&self, columns: &[ColumnCoord]) {
        (**self).bias_all(columns)
    }

    fn forget(&self, column: ColumnCoord) {
        (**self).forget(column)
    }

    fn forget_all(&self) {
        (**self).forget_all()
    }
}

/// Runs the visitor over collected regions until it asks to stop.
pub(crate) fn visit_all(regions: &[Arc<ProtectedRegion>], visitor: &mut RegionVisitor<'_>) {
    for region in regions {
        if !visitor(region) {
            break;
        }
    }
}
