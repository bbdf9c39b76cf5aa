//! Pad geometry map (C1): pad-id -> (x, y, ring, scale) lookup.

use crate::constants::INVALID_PAD_ID;
use std::collections::HashMap;

/// Static per-pad geometry entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PadGeometry {
    pub x: f64,
    pub y: f64,
    pub ring: i32,
    pub scale: f64,
}

/// Read-only lookup from pad id to geometry, shared by reference across
/// worker threads once built (§5: "read-only after construction").
#[derive(Debug, Clone, Default)]
pub struct PadGeometryMap {
    pads: HashMap<i32, PadGeometry>,
}

impl PadGeometryMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pad_id: i32, geometry: PadGeometry) {
        self.pads.insert(pad_id, geometry);
    }

    /// Builds a map from parsed `(pad_id, x_mm, y_mm, ring, scale)` rows,
    /// mirroring the pad map CSV schema (§6).
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (i32, f64, f64, i32, f64)>,
    {
        let mut map = Self::new();
        for (pad_id, x, y, ring, scale) in rows {
            map.insert(
                pad_id,
                PadGeometry {
                    x,
                    y,
                    ring,
                    scale,
                },
            );
        }
        map
    }

    /// Looks up a pad's geometry. Returns `None` for the invalid pad
    /// sentinel or any unmapped id; callers should skip the pad rather
    /// than treating this as fatal.
    pub fn get(&self, pad_id: i32) -> Option<&PadGeometry> {
        if pad_id == INVALID_PAD_ID {
            return None;
        }
        self.pads.get(&pad_id)
    }

    pub fn len(&self) -> usize {
        self.pads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pads.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_pad_id_returns_none() {
        let map = PadGeometryMap::from_rows([(1, 0.0, 0.0, 0, 1.0)]);
        assert!(map.get(INVALID_PAD_ID).is_none());
    }

    #[test]
    fn known_pad_round_trips() {
        let map = PadGeometryMap::from_rows([(42, 1.5, -2.5, 3, 0.95)]);
        let geom = map.get(42).expect("pad should be present");
        assert_eq!(geom.x, 1.5);
        assert_eq!(geom.y, -2.5);
        assert_eq!(geom.ring, 3);
        assert_eq!(geom.scale, 0.95);
    }

    #[test]
    fn unmapped_pad_returns_none() {
        let map = PadGeometryMap::from_rows([(1, 0.0, 0.0, 0, 1.0)]);
        assert!(map.get(999).is_none());
    }
}
