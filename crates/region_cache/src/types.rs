//! # Core Type Definitions
//!
//! Positions, column coordinates and bounding boxes shared by the region
//! model, the authoritative stores and the chunk cache.
//!
//! ## Key Types
//!
//! - [`BlockPosition`] - Integer point in the world, the unit of every query
//! - [`ColumnCoord`] - Horizontal 16x16 column ("chunk") a position falls in
//! - [`BoundingBox`] - Inclusive axis-aligned box used for pre-filtering

use serde::{Deserialize, Serialize};

/// Number of bits a horizontal block coordinate is shifted to get its column.
pub const COLUMN_SHIFT: u32 = 4;

/// Width of a column in blocks along both horizontal axes.
pub const COLUMN_SIZE: i32 = 1 << COLUMN_SHIFT;

// ============================================================================
// Positions
// ============================================================================

/// An integer point in the game world.
///
/// `y` is the vertical axis; `x` and `z` span the horizontal plane that is
/// partitioned into columns.
///
/// # Examples
///
/// ```rust
/// use region_cache::{BlockPosition, ColumnCoord};
///
/// let pos = BlockPosition::new(-1, 64, 17);
/// assert_eq!(pos.column(), ColumnCoord::new(-1, 1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockPosition {
    /// X coordinate (east-west axis)
    pub x: i32,
    /// Y coordinate (vertical axis)
    pub y: i32,
    /// Z coordinate (north-south axis)
    pub z: i32,
}

impl BlockPosition {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns the column containing this position.
    ///
    /// Uses an arithmetic shift so negative coordinates round toward negative
    /// infinity: block `-1` lives in column `-1`, not column `0`.
    pub const fn column(&self) -> ColumnCoord {
        ColumnCoord {
            x: self.x >> COLUMN_SHIFT,
            z: self.z >> COLUMN_SHIFT,
        }
    }

    /// Component-wise minimum of two positions.
    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    /// Component-wise maximum of two positions.
    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }
}

impl std::fmt::Display for BlockPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

// ============================================================================
// Columns
// ============================================================================

/// Coordinate of a 16x16 column of the world, unbounded vertically.
///
/// This is the key of the chunk cache. It carries no ownership and is freely
/// copied around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ColumnCoord {
    pub x: i32,
    pub z: i32,
}

impl ColumnCoord {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Lowest block of the column at the given height.
    pub const fn min_block(&self, y: i32) -> BlockPosition {
        BlockPosition::new(self.x << COLUMN_SHIFT, y, self.z << COLUMN_SHIFT)
    }

    /// Highest block of the column at the given height (inclusive).
    pub const fn max_block(&self, y: i32) -> BlockPosition {
        BlockPosition::new(
            (self.x << COLUMN_SHIFT) + (COLUMN_SIZE - 1),
            y,
            (self.z << COLUMN_SHIFT) + (COLUMN_SIZE - 1),
        )
    }

    /// The full column as a box spanning every representable height.
    pub const fn bounds(&self) -> BoundingBox {
        BoundingBox {
            min: self.min_block(i32::MIN),
            max: self.max_block(i32::MAX),
        }
    }
}

impl std::fmt::Display for ColumnCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.x, self.z)
    }
}

// ============================================================================
// Bounding Boxes
// ============================================================================

/// Inclusive axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: BlockPosition,
    pub max: BlockPosition,
}

impl BoundingBox {
    /// Builds a box from two arbitrary corners.
    pub fn from_corners(a: BlockPosition, b: BlockPosition) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn contains(&self, point: BlockPosition) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Whether the two boxes share at least one block.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Every column the horizontal footprint of this box touches.
    pub fn columns(&self) -> impl Iterator<Item = ColumnCoord> {
        let (min, max) = (self.min.column(), self.max.column());
        (min.x..=max.x).flat_map(move |x| (min.z..=max.z).map(move |z| ColumnCoord::new(x, z)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_of_negative_positions() {
        assert_eq!(BlockPosition::new(0, 0, 0).column(), ColumnCoord::new(0, 0));
        assert_eq!(BlockPosition::new(15, 0, 15).column(), ColumnCoord::new(0, 0));
        assert_eq!(BlockPosition::new(16, 0, -1).column(), ColumnCoord::new(1, -1));
        assert_eq!(BlockPosition::new(-16, 0, -17).column(), ColumnCoord::new(-1, -2));
        assert_eq!(
            BlockPosition::new(i32::MIN, 0, i32::MAX).column(),
            ColumnCoord::new(i32::MIN >> 4, i32::MAX >> 4)
        );
    }

    #[test]
    fn test_column_bounds_cover_sixteen_blocks() {
        let bounds = ColumnCoord::new(-1, 2).bounds();
        assert_eq!(bounds.min, BlockPosition::new(-16, i32::MIN, 32));
        assert_eq!(bounds.max, BlockPosition::new(-1, i32::MAX, 47));
        assert!(bounds.contains(BlockPosition::new(-16, 0, 47)));
        assert!(!bounds.contains(BlockPosition::new(0, 0, 40)));
    }

    #[test]
    fn test_box_intersection_is_inclusive() {
        let a = BoundingBox::from_corners(BlockPosition::new(0, 0, 0), BlockPosition::new(15, 10, 15));
        let b = BoundingBox::from_corners(BlockPosition::new(15, 10, 15), BlockPosition::new(20, 20, 20));
        let c = BoundingBox::from_corners(BlockPosition::new(16, 0, 0), BlockPosition::new(20, 20, 20));
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_box_columns() {
        let bounds = BoundingBox::from_corners(BlockPosition::new(-1, 0, 0), BlockPosition::new(16, 0, 15));
        let columns: Vec<_> = bounds.columns().collect();
        assert_eq!(
            columns,
            vec![ColumnCoord::new(-1, 0), ColumnCoord::new(0, 0), ColumnCoord::new(1, 0)]
        );
    }
}
