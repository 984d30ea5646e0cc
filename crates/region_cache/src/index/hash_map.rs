//! Id-keyed in-memory region store

use super::{visit_all, RegionDifference, RegionIndex, RegionVisitor, RemovalStrategy};
use crate::region::ProtectedRegion;
use crate::types::BlockPosition;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// Region store backed by a hash map from id to region.
///
/// Spatial queries scan every region, which is fine for small sets and is
/// exactly what the chunk cache exists to avoid for large ones.
#[derive(Debug, Default)]
pub struct HashMapIndex {
    state: RwLock<IndexState>,
}

#[derive(Debug, Default)]
struct IndexState {
    regions: HashMap<String, Arc<ProtectedRegion>>,
    difference: RegionDifference,
    dirty: bool,
}

impl IndexState {
    fn insert(&mut self, region: Arc<ProtectedRegion>) {
        self.difference.record_change(&region);
        self.regions.insert(region.id().to_string(), region);
        self.dirty = true;
    }

    fn take(&mut self, id: &str) -> Option<Arc<ProtectedRegion>> {
        let region = self.regions.remove(id)?;
        self.difference.record_removal(&region);
        self.dirty = true;
        Some(region)
    }

    fn children_of(&self, id: &str) -> Vec<Arc<ProtectedRegion>> {
        self.regions
            .values()
            .filter(|region| region.parent() == Some(id))
            .cloned()
            .collect()
    }
}

impl HashMapIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an index holding the given regions, marked clean.
    pub fn with_regions(regions: impl IntoIterator<Item = Arc<ProtectedRegion>>) -> Self {
        let index = Self::new();
        index.add_all(regions.into_iter().collect());
        index.set_dirty(false);
        index
    }

    fn collect(&self, mut filter: impl FnMut(&ProtectedRegion) -> bool) -> Vec<Arc<ProtectedRegion>> {
        let state = self.state.read();
        state
            .regions
            .values()
            .filter(|region| filter(region.as_ref()))
            .cloned()
            .collect()
    }
}

impl RegionIndex for HashMapIndex {
    fn add(&self, region: Arc<ProtectedRegion>) {
        self.state.write().insert(region);
    }

    fn add_all(&self, regions: Vec<Arc<ProtectedRegion>>) {
        let mut state = self.state.write();
        for region in regions {
            state.insert(region);
        }
    }

    fn remove(&self, id: &str, strategy: RemovalStrategy) -> Vec<Arc<ProtectedRegion>> {
        let id = id.to_lowercase();
        let mut state = self.state.write();
        let mut removed = Vec::new();

        let Some(region) = state.take(&id) else {
            return removed;
        };
        removed.push(region);

        match strategy {
            RemovalStrategy::UnsetParentInChildren => {
                for child in state.children_of(&id) {
                    state.insert(Arc::new(child.without_parent()));
                }
            }
            RemovalStrategy::RemoveChildren => {
                let mut pending = VecDeque::from([id.clone()]);
                while let Some(parent) = pending.pop_front() {
                    for child in state.children_of(&parent) {
                        if let Some(child) = state.take(child.id()) {
                            pending.push_back(child.id().to_string());
                            removed.push(child);
                        }
                    }
                }
            }
        }

        debug!("Removed {} region(s) starting from '{}'", removed.len(), id);
        removed
    }

    fn contains(&self, id: &str) -> bool {
        self.state.read().regions.contains_key(&id.to_lowercase())
    }

    fn get(&self, id: &str) -> Option<Arc<ProtectedRegion>> {
        self.state.read().regions.get(&id.to_lowercase()).cloned()
    }

    fn apply(&self, visitor: &mut RegionVisitor<'_>) {
        let regions = self.values();
        visit_all(&regions, visitor);
    }

    fn apply_containing(&self, position: BlockPosition, visitor: &mut RegionVisitor<'_>) {
        let regions = self.collect(|region| region.contains(position));
        visit_all(&regions, visitor);
    }

    fn apply_intersecting(&self, region: &ProtectedRegion, visitor: &mut RegionVisitor<'_>) {
        let regions = self.collect(|candidate| candidate.intersects(region));
        visit_all(&regions, visitor);
    }

    fn size(&self) -> usize {
        self.state.read().regions.len()
    }

    fn values(&self) -> Vec<Arc<ProtectedRegion>> {
        self.state.read().regions.values().cloned().collect()
    }

    fn is_dirty(&self) -> bool {
        self.state.read().dirty
    }

    fn set_dirty(&self, dirty: bool) {
        let mut state = self.state.write();
        if dirty {
            let all: Vec<_> = state.regions.values().cloned().collect();
            for region in &all {
                state.difference.record_change(region);
            }
        } else {
            state.difference = RegionDifference::default();
        }
        state.dirty = dirty;
    }

    fn take_difference(&self) -> RegionDifference {
        let mut state = self.state.write();
        state.dirty = false;
        std::mem::take(&mut state.difference)
    }

    fn restore_difference(&self, difference: RegionDifference) {
        let mut state = self.state.write();
        let newer = std::mem::replace(&mut state.difference, difference);
        state.difference.merge(newer);
        state.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn cuboid(id: &str, min: i32, max: i32) -> ProtectedRegion {
        ProtectedRegion::cuboid(
            id,
            BlockPosition::new(min, 0, min),
            BlockPosition::new(max, 255, max),
        )
        .unwrap()
    }

    fn ids(regions: &[Arc<ProtectedRegion>]) -> HashSet<String> {
        regions.iter().map(|r| r.id().to_string()).collect()
    }

    fn family() -> HashMapIndex {
        HashMapIndex::with_regions([
            Arc::new(cuboid("root", 0, 100)),
            Arc::new(cuboid("child", 0, 50).with_parent("root")),
            Arc::new(cuboid("grandchild", 0, 25).with_parent("child")),
            Arc::new(cuboid("other", 200, 300)),
        ])
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let index = HashMapIndex::new();
        index.add(Arc::new(cuboid("Town", 0, 10)));
        assert!(index.contains("town"));
        assert!(index.contains("TOWN"));
        assert_eq!(index.get("ToWn").unwrap().id(), "town");
        assert_eq!(index.size(), 1);
    }

    #[test]
    fn test_add_replaces_same_id() {
        let index = HashMapIndex::new();
        index.add(Arc::new(cuboid("town", 0, 10)));
        index.add(Arc::new(cuboid("town", 0, 10).with_priority(5)));
        assert_eq!(index.size(), 1);
        assert_eq!(index.get("town").unwrap().priority(), 5);
    }

    #[test]
    fn test_remove_unsets_parent_in_children() {
        let index = family();
        let removed = index.remove("root", RemovalStrategy::UnsetParentInChildren);
        assert_eq!(ids(&removed), HashSet::from(["root".to_string()]));
        assert_eq!(index.get("child").unwrap().parent(), None);
        assert_eq!(index.get("grandchild").unwrap().parent(), Some("child"));
        assert_eq!(index.size(), 3);
    }

    #[test]
    fn test_remove_children_removes_descendants() {
        let index = family();
        let removed = index.remove("ROOT", RemovalStrategy::RemoveChildren);
        assert_eq!(
            ids(&removed),
            HashSet::from(["root".to_string(), "child".to_string(), "grandchild".to_string()])
        );
        assert_eq!(index.size(), 1);
        assert!(index.contains("other"));
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let index = family();
        assert!(index.remove("missing", RemovalStrategy::RemoveChildren).is_empty());
        assert_eq!(index.size(), 4);
        assert!(!index.is_dirty());
    }

    #[test]
    fn test_spatial_queries() {
        let index = family();
        let mut found = Vec::new();
        index.apply_containing(BlockPosition::new(30, 10, 30), &mut |region| {
            found.push(region.clone());
            true
        });
        assert_eq!(ids(&found), HashSet::from(["root".to_string(), "child".to_string()]));

        let query = cuboid("query", 150, 250);
        let mut hits = Vec::new();
        index.apply_intersecting(&query, &mut |region| {
            hits.push(region.clone());
            true
        });
        assert_eq!(ids(&hits), HashSet::from(["other".to_string()]));
    }

    #[test]
    fn test_visitor_can_stop_and_reenter() {
        let index = family();
        let mut visited = 0;
        index.apply(&mut |_| {
            visited += 1;
            // the store must not hold its lock while visiting
            assert_eq!(index.size(), 4);
            false
        });
        assert_eq!(visited, 1);
    }

    #[test]
    fn test_difference_tracking() {
        let index = family();
        assert!(!index.is_dirty());

        index.add(Arc::new(cuboid("new", 0, 1)));
        index.remove("other", RemovalStrategy::default());
        assert!(index.is_dirty());

        let difference = index.take_difference();
        assert!(!index.is_dirty());
        assert_eq!(difference.changed.keys().collect::<Vec<_>>(), vec!["new"]);
        assert_eq!(difference.removed.keys().collect::<Vec<_>>(), vec!["other"]);
        assert!(index.take_difference().is_empty());

        // a failed save puts the difference back
        index.add(Arc::new(cuboid("other", 200, 300)));
        index.restore_difference(difference);
        assert!(index.is_dirty());
        let merged = index.take_difference();
        assert!(merged.changed.contains_key("new"));
        assert!(merged.changed.contains_key("other"));
        assert!(merged.removed.is_empty());
    }

    #[test]
    fn test_set_dirty_marks_everything() {
        let index = family();
        index.set_dirty(true);
        assert_eq!(index.take_difference().changed.len(), 4);

        index.add(Arc::new(cuboid("x", 0, 1)));
        index.set_dirty(false);
        assert!(!index.is_dirty());
        assert!(index.take_difference().is_empty());
    }
}
