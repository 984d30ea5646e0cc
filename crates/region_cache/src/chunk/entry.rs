//! Cached contents of a single column.

use crate::region::ProtectedRegion;
use crate::types::ColumnCoord;
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Regions intersecting one column, in layer order.
///
/// An entry starts out unloaded and is published exactly once by a
/// background task. Published contents are never mutated; a rebuild replaces
/// the whole entry instead. Readers therefore either see no contents or the
/// complete sequence.
#[derive(Debug)]
pub struct ColumnEntry {
    coord: ColumnCoord,
    regions: OnceCell<Arc<[Arc<ProtectedRegion>]>>,
}

impl ColumnEntry {
    pub fn new(coord: ColumnCoord) -> Self {
        Self {
            coord,
            regions: OnceCell::new(),
        }
    }

    pub fn coord(&self) -> ColumnCoord {
        self.coord
    }

    pub fn is_loaded(&self) -> bool {
        self.regions.get().is_some()
    }

    /// Published contents, `None` until loaded.
    pub fn regions(&self) -> Option<&Arc<[Arc<ProtectedRegion>]>> {
        self.regions.get()
    }

    /// Publishes the contents. Returns `false` if the entry was already
    /// loaded, in which case the new contents are discarded.
    pub(crate) fn publish(&self, regions: Vec<Arc<ProtectedRegion>>) -> bool {
        self.regions.set(regions.into()).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockPosition;

    #[test]
    fn test_publish_once() {
        let entry = ColumnEntry::new(ColumnCoord::new(1, 2));
        assert!(!entry.is_loaded());
        assert!(entry.regions().is_none());

        let region = Arc::new(
            ProtectedRegion::cuboid("a", BlockPosition::new(16, 0, 32), BlockPosition::new(20, 10, 40)).unwrap(),
        );
        assert!(entry.publish(vec![region.clone()]));
        assert!(entry.is_loaded());
        assert_eq!(entry.regions().unwrap().len(), 1);

        assert!(!entry.publish(Vec::new()));
        assert_eq!(entry.regions().unwrap().len(), 1);
        assert_eq!(entry.coord(), ColumnCoord::new(1, 2));
    }
}
