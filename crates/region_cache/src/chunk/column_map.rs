//! Sparse map keyed by column coordinates.
//!
//! Both signed 32-bit components are packed into a single `u64`, so lookups
//! hash one integer with the Fx hasher instead of a tuple with SipHash. The
//! key space is the whole `i32 x i32` plane; only occupied columns cost
//! memory.

use crate::types::ColumnCoord;
use rustc_hash::FxHashMap;

#[inline]
fn pack(coord: ColumnCoord) -> u64 {
    ((coord.x as u32 as u64) << 32) | (coord.z as u32 as u64)
}

#[inline]
fn unpack(key: u64) -> ColumnCoord {
    ColumnCoord::new((key >> 32) as u32 as i32, key as u32 as i32)
}

/// Map from column coordinate to value. Not synchronized.
#[derive(Debug, Clone)]
pub struct ColumnMap<V> {
    entries: FxHashMap<u64, V>,
}

impl<V> Default for ColumnMap<V> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }
}

impl<V> ColumnMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, coord: ColumnCoord) -> Option<&V> {
        self.entries.get(&pack(coord))
    }

    /// Inserts a value, returning the one it replaced.
    pub fn insert(&mut self, coord: ColumnCoord, value: V) -> Option<V> {
        self.entries.insert(pack(coord), value)
    }

    pub fn remove(&mut self, coord: ColumnCoord) -> Option<V> {
        self.entries.remove(&pack(coord))
    }

    pub fn contains(&self, coord: ColumnCoord) -> bool {
        self.entries.contains_key(&pack(coord))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored values in no particular order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values()
    }

    /// Occupied coordinates in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = ColumnCoord> + '_ {
        self.entries.keys().map(|&key| unpack(key))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
