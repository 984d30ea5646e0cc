//! Deterministic region layouts and query sets for probing a cache.

use rayon::prelude::*;
use region_cache::{BlockPosition, ChunkRegionCache, ColumnCoord, ProtectedRegion, RegionError, RegionIndex};
use serde::Serialize;
use std::sync::Arc;

/// Small linear congruential generator, so every run probes the same layout.
#[derive(Debug, Clone)]
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next_u32(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 33) as u32
    }

    /// Uniform value in `min..=max`.
    pub fn range(&mut self, min: i32, max: i32) -> i32 {
        let span = (max as i64 - min as i64 + 1) as u64;
        (min as i64 + (self.next_u32() as u64 % span) as i64) as i32
    }
}

/// Lays out `count` overlapping regions around the origin, spread over a
/// square of `radius` columns in every direction. Every fourth region is a
/// polygon, the rest are cuboids.
pub fn region_grid(count: usize, radius: i32, rng: &mut Lcg) -> Result<Vec<Arc<ProtectedRegion>>, RegionError> {
    let extent = (radius + 1) * 16;
    let mut regions = Vec::with_capacity(count);

    for i in 0..count {
        let x = rng.range(-extent, extent);
        let z = rng.range(-extent, extent);
        let y = rng.range(0, 200);
        let height = rng.range(8, 120);
        let priority = rng.range(-3, 3);

        let region = if i % 4 == 3 {
            let r = rng.range(4, 40);
            let points = vec![(x, z - r), (x + r, z), (x, z + r), (x - r, z)];
            ProtectedRegion::polygon(&format!("diamond_{}", i), points, y, y + height)?
        } else {
            let w = rng.range(0, 48);
            let d = rng.range(0, 48);
            ProtectedRegion::cuboid(
                &format!("plot_{}", i),
                BlockPosition::new(x, y, z),
                BlockPosition::new(x + w, y + height, z + d),
            )?
        };
        regions.push(Arc::new(region.with_priority(priority)));
    }
    Ok(regions)
}

/// Every column within `radius` of the origin column.
pub fn column_square(radius: i32) -> Vec<ColumnCoord> {
    (-radius..=radius)
        .flat_map(|x| (-radius..=radius).map(move |z| ColumnCoord::new(x, z)))
        .collect()
}

/// Random query points inside the square of columns.
pub fn query_points(count: usize, radius: i32, rng: &mut Lcg) -> Vec<BlockPosition> {
    let min = -radius * 16;
    let max = (radius + 1) * 16 - 1;
    (0..count)
        .map(|_| BlockPosition::new(rng.range(min, max), rng.range(-16, 336), rng.range(min, max)))
        .collect()
}

/// Outcome of comparing cached answers against the store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrossCheck {
    pub queries: usize,
    pub matches_found: usize,
    pub mismatches: usize,
    /// First few disagreeing positions, for the log
    pub samples: Vec<BlockPosition>,
}

impl CrossCheck {
    pub fn passed(&self) -> bool {
        self.mismatches == 0
    }
}

fn store_ids<I: RegionIndex + ?Sized>(index: &I, position: BlockPosition) -> Vec<String> {
    let mut regions = Vec::new();
    index.apply_containing(position, &mut |region| {
        regions.push(region.clone());
        true
    });
    regions.sort_by(|a, b| a.layer_order(b));
    regions.iter().map(|r| r.id().to_string()).collect()
}

/// Runs every query through the cache in parallel and checks it against the
/// wrapped store.
pub fn cross_check<I: RegionIndex + ?Sized + 'static>(
    cache: &ChunkRegionCache<I>,
    points: &[BlockPosition],
) -> CrossCheck {
    let outcomes: Vec<(usize, Option<BlockPosition>)> = points
        .par_iter()
        .map(|&point| {
            let cached: Vec<String> = cache.regions_at(point).iter().map(|r| r.id().to_string()).collect();
            let expected = store_ids(cache.index().as_ref(), point);
            let mismatch = (cached != expected).then_some(point);
            (cached.len(), mismatch)
        })
        .collect();

    let mut check = CrossCheck {
        queries: points.len(),
        ..CrossCheck::default()
    };
    for (found, mismatch) in outcomes {
        check.matches_found += found;
        if let Some(point) = mismatch {
            check.mismatches += 1;
            if check.samples.len() < 10 {
                check.samples.push(point);
            }
        }
    }
    check
}
