//! R-tree accelerated region store
//!
//! Storage, removal strategies and dirty tracking are delegated to a
//! [`HashMapIndex`]; this wrapper only answers spatial queries from an
//! `rstar` tree. The tree is dropped on every mutation and bulk-loaded again
//! by the next spatial query, which suits stores that are read far more
//! often than they are written.

use super::{visit_all, HashMapIndex, RegionDifference, RegionIndex, RegionVisitor, RemovalStrategy};
use crate::region::ProtectedRegion;
use crate::types::{BlockPosition, BoundingBox};
use parking_lot::Mutex;
use rstar::{RTree, RTreeObject, AABB};
use std::sync::Arc;
use tracing::debug;

/// Region wrapper for R-tree indexing
#[derive(Debug, Clone)]
struct SpatialRegion(Arc<ProtectedRegion>);

impl RTreeObject for SpatialRegion {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        envelope_of(self.0.bounding_box())
    }
}

fn envelope_of(bounds: &BoundingBox) -> AABB<[f64; 3]> {
    AABB::from_corners(
        [bounds.min.x as f64, bounds.min.y as f64, bounds.min.z as f64],
        [bounds.max.x as f64, bounds.max.y as f64, bounds.max.z as f64],
    )
}

/// Region store answering spatial queries from an R-tree.
#[derive(Default)]
pub struct RTreeIndex {
    regions: HashMapIndex,
    tree: Mutex<Option<Arc<RTree<SpatialRegion>>>>,
}

impl RTreeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an index holding the given regions, marked clean.
    pub fn with_regions(regions: impl IntoIterator<Item = Arc<ProtectedRegion>>) -> Self {
        Self {
            regions: HashMapIndex::with_regions(regions),
            tree: Mutex::new(None),
        }
    }

    fn invalidate(&self) {
        *self.tree.lock() = None;
    }

    /// Current tree, bulk-loading it if a mutation dropped it.
    ///
    /// The slot lock is held while reading the regions so a concurrent
    /// mutation either lands before the snapshot or invalidates the result.
    fn tree(&self) -> Arc<RTree<SpatialRegion>> {
        let mut slot = self.tree.lock();
        if let Some(tree) = slot.as_ref() {
            return tree.clone();
        }
        let entries: Vec<_> = self.regions.values().into_iter().map(SpatialRegion).collect();
        debug!("Bulk loading region R-tree with {} entries", entries.len());
        let tree = Arc::new(RTree::bulk_load(entries));
        *slot = Some(tree.clone());
        tree
    }

    fn collect(
        &self,
        envelope: &AABB<[f64; 3]>,
        mut filter: impl FnMut(&ProtectedRegion) -> bool,
    ) -> Vec<Arc<ProtectedRegion>> {
        self.tree()
            .locate_in_envelope_intersecting(envelope)
            .filter(|entry| filter(entry.0.as_ref()))
            .map(|entry| entry.0.clone())
            .collect()
    }
}

impl RegionIndex for RTreeIndex {
    fn add(&self, region: Arc<ProtectedRegion>) {
        self.regions.add(region);
        self.invalidate();
    }

    fn add_all(&self, regions: Vec<Arc<ProtectedRegion>>) {
        self.regions.add_all(regions);
        self.invalidate();
    }

    fn remove(&self, id: &str, strategy: RemovalStrategy) -> Vec<Arc<ProtectedRegion>> {
        let removed = self.regions.remove(id, strategy);
        if !removed.is_empty() {
            self.invalidate();
        }
        removed
    }

    fn contains(&self, id: &str) -> bool {
        self.regions.contains(id)
    }

    fn get(&self, id: &str) -> Option<Arc<ProtectedRegion>> {
        self.regions.get(id)
    }

    fn apply(&self, visitor: &mut RegionVisitor<'_>) {
        self.regions.apply(visitor)
    }

    fn apply_containing(&self, position: BlockPosition, visitor: &mut RegionVisitor<'_>) {
        let point = AABB::from_point([position.x as f64, position.y as f64, position.z as f64]);
        let regions = self.collect(&point, |region| region.contains(position));
        visit_all(&regions, visitor);
    }

    fn apply_intersecting(&self, region: &ProtectedRegion, visitor: &mut RegionVisitor<'_>) {
        let envelope = envelope_of(region.bounding_box());
        let regions = self.collect(&envelope, |candidate| candidate.intersects(region));
        visit_all(&regions, visitor);
    }

    fn size(&self) -> usize {
        self.regions.size()
    }

    fn values(&self) -> Vec<Arc<ProtectedRegion>> {
        self.regions.values()
    }

    fn is_dirty(&self) -> bool {
        self.regions.is_dirty()
    }

    fn set_dirty(&self, dirty: bool) {
        self.regions.set_dirty(dirty)
    }

    fn take_difference(&self) -> RegionDifference {
        self.regions.take_difference()
    }

    fn restore_difference(&self, difference: RegionDifference) {
        self.regions.restore_difference(difference)
    }
}
