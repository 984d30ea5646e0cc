//! # Region Model
//!
//! A [`ProtectedRegion`] is an immutable, uniquely identified volume with an
//! exact containment test and a priority. What a region *means* (flags,
//! members, rules) lives above this crate; here it is only geometry and an
//! ordering used to layer overlapping regions deterministically.

use crate::error::RegionError;
use crate::types::{BlockPosition, BoundingBox, ColumnCoord};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ============================================================================
// Shapes
// ============================================================================

/// Geometry of a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionShape {
    /// Inclusive axis-aligned box.
    Cuboid {
        min: BlockPosition,
        max: BlockPosition,
    },
    /// Polygon in the x/z plane extruded over `min_y..=max_y`.
    Polygon {
        points: Vec<(i32, i32)>,
        min_y: i32,
        max_y: i32,
    },
}

impl RegionShape {
    fn bounding_box(&self) -> BoundingBox {
        match self {
            RegionShape::Cuboid { min, max } => BoundingBox { min: *min, max: *max },
            RegionShape::Polygon { points, min_y, max_y } => {
                let (mut min_x, mut min_z) = (i32::MAX, i32::MAX);
                let (mut max_x, mut max_z) = (i32::MIN, i32::MIN);
                for &(x, z) in points {
                    min_x = min_x.min(x);
                    min_z = min_z.min(z);
                    max_x = max_x.max(x);
                    max_z = max_z.max(z);
                }
                BoundingBox {
                    min: BlockPosition::new(min_x, *min_y, min_z),
                    max: BlockPosition::new(max_x, *max_y, max_z),
                }
            }
        }
    }

    /// Outline of the shape in the x/z plane.
    fn footprint(&self) -> Vec<(i32, i32)> {
        match self {
            RegionShape::Cuboid { min, max } => vec![
                (min.x, min.z),
                (max.x, min.z),
                (max.x, max.z),
                (min.x, max.z),
            ],
            RegionShape::Polygon { points, .. } => points.clone(),
        }
    }
}

// ============================================================================
// Protected Region
// ============================================================================

/// An immutable spatial region.
///
/// Ids are case-insensitive and stored lower case. Regions are shared as
/// `Arc<ProtectedRegion>`; "modifying" one means building a replacement and
/// adding it to the store under the same id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedRegion {
    id: String,
    priority: i32,
    parent: Option<String>,
    shape: RegionShape,
    bounds: BoundingBox,
}

impl ProtectedRegion {
    /// Creates a cuboid region from two arbitrary corners.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use region_cache::{BlockPosition, ProtectedRegion};
    ///
    /// let spawn = ProtectedRegion::cuboid(
    ///     "Spawn",
    ///     BlockPosition::new(-32, 0, -32),
    ///     BlockPosition::new(31, 255, 31),
    /// )?;
    /// assert_eq!(spawn.id(), "spawn");
    /// assert!(spawn.contains(BlockPosition::new(0, 64, 0)));
    /// # Ok::<(), region_cache::RegionError>(())
    /// ```
    pub fn cuboid(id: &str, a: BlockPosition, b: BlockPosition) -> Result<Self, RegionError> {
        let id = normalize_id(id)?;
        let corners = BoundingBox::from_corners(a, b);
        Ok(Self::from_shape(
            id,
            RegionShape::Cuboid {
                min: corners.min,
                max: corners.max,
            },
        ))
    }

    /// Creates a polygonal region from its x/z outline and vertical span.
    pub fn polygon(
        id: &str,
        points: Vec<(i32, i32)>,
        min_y: i32,
        max_y: i32,
    ) -> Result<Self, RegionError> {
        let id = normalize_id(id)?;
        if points.len() < 3 {
            return Err(RegionError::TooFewPoints {
                id,
                count: points.len(),
            });
        }
        Ok(Self::from_shape(
            id,
            RegionShape::Polygon {
                points,
                min_y: min_y.min(max_y),
                max_y: min_y.max(max_y),
            },
        ))
    }

    /// Throwaway region covering a whole column, used to gather the regions
    /// that may contain any point of it.
    pub(crate) fn column(coord: ColumnCoord) -> Self {
        let bounds = coord.bounds();
        Self::from_shape(
            format!("__column_{}_{}", coord.x, coord.z),
            RegionShape::Cuboid {
                min: bounds.min,
                max: bounds.max,
            },
        )
    }

    fn from_shape(id: String, shape: RegionShape) -> Self {
        let bounds = shape.bounding_box();
        Self {
            id,
            priority: 0,
            parent: None,
            shape,
            bounds,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_lowercase());
        self
    }

    /// Copy of this region with its parent link removed.
    pub fn without_parent(&self) -> Self {
        Self {
            parent: None,
            ..self.clone()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn shape(&self) -> &RegionShape {
        &self.shape
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounds
    }

    /// Exact containment test.
    pub fn contains(&self, point: BlockPosition) -> bool {
        if !self.bounds.contains(point) {
            return false;
        }
        match &self.shape {
            RegionShape::Cuboid { .. } => true,
            RegionShape::Polygon { points, .. } => polygon_contains(points, point.x, point.z),
        }
    }

    /// Whether the two regions share at least one block.
    ///
    /// Never reports `false` for regions that overlap; the cache relies on
    /// that to pre-filter columns without losing results.
    pub fn intersects(&self, other: &ProtectedRegion) -> bool {
        if !self.bounds.intersects(&other.bounds) {
            return false;
        }
        if matches!(self.shape, RegionShape::Cuboid { .. })
            && matches!(other.shape, RegionShape::Cuboid { .. })
        {
            return true;
        }

        let ours = self.shape.footprint();
        let theirs = other.shape.footprint();
        if ours.iter().any(|&(x, z)| other.footprint_contains(x, z))
            || theirs.iter().any(|&(x, z)| self.footprint_contains(x, z))
        {
            return true;
        }
        // bound first so the edge iterators drop before the footprints
        let crossed = edges(&ours).any(|(a1, a2)| edges(&theirs).any(|(b1, b2)| segments_cross(a1, a2, b1, b2)));
        crossed
    }

    fn footprint_contains(&self, x: i32, z: i32) -> bool {
        match &self.shape {
            RegionShape::Cuboid { min, max } => {
                x >= min.x && x <= max.x && z >= min.z && z <= max.z
            }
            RegionShape::Polygon { points, .. } => polygon_contains(points, x, z),
        }
    }

    /// Ordering used to layer overlapping regions: higher priority first,
    /// ties broken by id.
    pub fn layer_order(&self, other: &ProtectedRegion) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Checks an id against the allowed character set and lower-cases it.
pub fn normalize_id(id: &str) -> Result<String, RegionError> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ',' | '\'' | '-' | '+' | '/'));
    if valid {
        Ok(id.to_lowercase())
    } else {
        Err(RegionError::InvalidId(id.to_string()))
    }
}

// ============================================================================
// Planar geometry helpers
// ============================================================================

/// Point-in-polygon on the x/z plane. Points on an edge or vertex count as
/// inside.
///
/// Coordinate differences span up to 2^32, so products are taken in `i128`.
fn polygon_contains(points: &[(i32, i32)], tx: i32, tz: i32) -> bool {
    let (tx, tz) = (tx as i128, tz as i128);
    let mut inside = false;
    let mut prev = match points.last() {
        Some(&(x, z)) => (x as i128, z as i128),
        None => return false,
    };

    for &(x, z) in points {
        let cur = (x as i128, z as i128);
        if cur == (tx, tz) {
            return true;
        }
        let ((x1, z1), (x2, z2)) = if cur.0 > prev.0 { (prev, cur) } else { (cur, prev) };
        if x1 <= tx && tx <= x2 {
            let cross = (tz - z1) * (x2 - x1) - (z2 - z1) * (tx - x1);
            if cross == 0 {
                if (z1 <= tz) == (tz <= z2) {
                    return true;
                }
            } else if cross < 0 && x1 != tx {
                inside = !inside;
            }
        }
        prev = cur;
    }
    inside
}

fn edges(points: &[(i32, i32)]) -> impl Iterator<Item = ((i32, i32), (i32, i32))> + '_ {
    points
        .iter()
        .enumerate()
        .map(move |(i, &p)| (p, points[(i + 1) % points.len()]))
}

fn orientation(p: (i32, i32), q: (i32, i32), r: (i32, i32)) -> i128 {
    let (px, pz) = (p.0 as i128, p.1 as i128);
    ((q.0 as i128 - px) * (r.1 as i128 - pz) - (q.1 as i128 - pz) * (r.0 as i128 - px)).signum()
}

fn within_span(p: (i32, i32), q: (i32, i32), r: (i32, i32)) -> bool {
    q.0 >= p.0.min(r.0) && q.0 <= p.0.max(r.0) && q.1 >= p.1.min(r.1) && q.1 <= p.1.max(r.1)
}

/// Closed segment intersection, collinear overlaps included.
fn segments_cross(a1: (i32, i32), a2: (i32, i32), b1: (i32, i32), b2: (i32, i32)) -> bool {
    let o1 = orientation(a1, a2, b1);
    let o2 = orientation(a1, a2, b2);
    let o3 = orientation(b1, b2, a1);
    let o4 = orientation(b1, b2, a2);

    if o1 != o2 && o3 != o4 {
        return true;
    }
    (o1 == 0 && within_span(a1, b1, a2))
        || (o2 == 0 && within_span(a1, b2, a2))
        || (o3 == 0 && within_span(b1, a1, b2))
        || (o4 == 0 && within_span(b1, a2, b2))
}
