//! Shared geometric primitives that flow between pipeline phases: the
//! spatial point, the per-event point cloud, and the labelled cluster.

mod circle;

pub use circle::{generate_circle_points, least_squares_circle, CircleFit};

use crate::constants::INVALID_PAD_ID;

/// A single reconstructed 3-D point with charge, produced by the
/// point-cloud builder (C4).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// mm
    pub x: f64,
    /// mm
    pub y: f64,
    /// mm
    pub z: f64,
    /// detector ADC units
    pub charge: f64,
    pub pad_id: i32,
    pub time_bucket: i32,
    /// per-pad gain correction
    pub scale: f64,
}

impl Point {
    pub fn rho(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn is_valid_pad(&self) -> bool {
        self.pad_id != INVALID_PAD_ID
    }
}

/// An unordered bag of points for a single event.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    pub event_id: i64,
    pub points: Vec<Point>,
}

impl PointCloud {
    pub fn new(event_id: i64) -> Self {
        Self {
            event_id,
            points: Vec::new(),
        }
    }

    pub fn push(&mut self, point: Point) {
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// An ordered candidate trajectory: a labelled subset of a [`PointCloud`]'s
/// points, in travel order along the track. Carries only the owning
/// event's id, not a back-reference to the cloud itself, to avoid a
/// cyclic ownership relationship between `Cluster` and its source event.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub event_id: i64,
    pub cluster_index: usize,
    pub label: i32,
    pub data: Vec<Point>,
}

impl Cluster {
    pub fn new(event_id: i64, cluster_index: usize, label: i32, data: Vec<Point>) -> Self {
        Self {
            event_id,
            cluster_index,
            label,
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Reverses point order in place. Used by the estimator (C7) when the
    /// inferred travel direction is backward, so downstream code can
    /// always assume `data[0]` is nearest the reaction vertex.
    pub fn reverse(&mut self) {
        self.data.reverse();
    }
}
