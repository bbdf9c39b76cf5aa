//! Clusterer (C5): deterministic, charge-weighted density clustering of a
//! [`PointCloud`] into trajectory-candidate [`Cluster`]s.
//!
//! The specification treats the clustering algorithm as a replaceable
//! density-based black box (§4.5); no DBSCAN/k-d-tree crate is part of
//! this codebase's dependency stack, so this is a hand-rolled grid-based
//! density clusterer: points are bucketed into a uniform spatial grid
//! sized by `neighbor_radius`, then grown into connected components via
//! a breadth-first walk over occupied neighboring cells, mirroring the
//! cell-list acceleration structure standard DBSCAN implementations use
//! for their neighbor queries.

use crate::geometry::{Cluster, Point, PointCloud};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Parameters controlling the density clusterer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterParameters {
    /// Points within this Euclidean distance (mm) are neighbors.
    pub neighbor_radius: f64,
    /// A point needs at least this many neighbors (itself excluded) to
    /// seed a cluster.
    pub min_neighbors: usize,
    /// Clusters with fewer points than this are dropped as noise.
    pub min_points: usize,
    /// Weight applied to charge difference when computing the
    /// charge-weighted neighbor distance.
    pub charge_weight: f64,
}

impl Default for ClusterParameters {
    fn default() -> Self {
        Self {
            neighbor_radius: 15.0,
            min_neighbors: 3,
            min_points: 10,
            charge_weight: 0.0,
        }
    }
}

const NOISE_LABEL: i32 = -1;

fn cell_key(point: &Point, cell_size: f64) -> (i64, i64, i64) {
    (
        (point.x / cell_size).floor() as i64,
        (point.y / cell_size).floor() as i64,
        (point.z / cell_size).floor() as i64,
    )
}

/// Charge-weighted distance between two points: ordinary Euclidean
/// distance in (x, y, z) plus `charge_weight` times the normalized
/// charge difference, so trajectories with sharply differing charge
/// deposition are less likely to merge.
fn weighted_distance(a: &Point, b: &Point, params: &ClusterParameters) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    let dz = a.z - b.z;
    let spatial = (dx * dx + dy * dy + dz * dz).sqrt();
    if params.charge_weight == 0.0 {
        return spatial;
    }
    let max_charge = a.charge.abs().max(b.charge.abs()).max(1.0);
    let charge_term = ((a.charge - b.charge) / max_charge).abs() * params.charge_weight;
    spatial + charge_term
}

/// Runs the clusterer over a point cloud. Labels are assigned
/// deterministically by iterating `cloud.points` in order (no RNG, no
/// seed needed beyond that fixed iteration order, matching §5's
/// "no hidden RNG in the core"). Clusters below `params.min_points` are
/// dropped; their points are not emitted. Noise points (those that never
/// join a cluster) are excluded from the returned clusters.
pub fn cluster_point_cloud(cloud: &PointCloud, params: &ClusterParameters) -> Vec<Cluster> {
    let n = cloud.points.len();
    let mut labels = vec![NOISE_LABEL; n];
    if n == 0 {
        return Vec::new();
    }

    let cell_size = params.neighbor_radius.max(1e-6);
    let mut grid: HashMap<(i64, i64, i64), Vec<usize>> = HashMap::new();
    for (idx, point) in cloud.points.iter().enumerate() {
        grid.entry(cell_key(point, cell_size)).or_default().push(idx);
    }

    let neighbors_of = |idx: usize| -> Vec<usize> {
        let point = &cloud.points[idx];
        let (cx, cy, cz) = cell_key(point, cell_size);
        let mut result = Vec::new();
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    if let Some(bucket) = grid.get(&(cx + dx, cy + dy, cz + dz)) {
                        for &other in bucket {
                            if other != idx
                                && weighted_distance(point, &cloud.points[other], params)
                                    <= params.neighbor_radius
                            {
                                result.push(other);
                            }
                        }
                    }
                }
            }
        }
        result
    };

    let mut next_label: i32 = 0;
    let mut visited = vec![false; n];

    for seed in 0..n {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        let seed_neighbors = neighbors_of(seed);
        if seed_neighbors.len() < params.min_neighbors {
            continue;
        }

        let label = next_label;
        next_label += 1;
        labels[seed] = label;

        let mut queue: VecDeque<usize> = seed_neighbors.into_iter().collect();
        while let Some(idx) = queue.pop_front() {
            if labels[idx] == NOISE_LABEL {
                labels[idx] = label;
            }
            if visited[idx] {
                continue;
            }
            visited[idx] = true;
            let idx_neighbors = neighbors_of(idx);
            if idx_neighbors.len() >= params.min_neighbors {
                for candidate in idx_neighbors {
                    if labels[candidate] == NOISE_LABEL {
                        queue.push_back(candidate);
                    }
                }
            }
        }
    }

    let mut by_label: HashMap<i32, Vec<Point>> = HashMap::new();
    for (idx, &label) in labels.iter().enumerate() {
        if label != NOISE_LABEL {
            by_label.entry(label).or_default().push(cloud.points[idx]);
        }
    }

    let mut labels_sorted: Vec<i32> = by_label.keys().copied().collect();
    labels_sorted.sort_unstable();

    let mut clusters = Vec::new();
    let mut cluster_index = 0;
    for label in labels_sorted {
        let data = by_label.remove(&label).unwrap();
        if data.len() < params.min_points {
            continue;
        }
        clusters.push(Cluster::new(cloud.event_id, cluster_index, label, data));
        cluster_index += 1;
    }

    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f64, y: f64, z: f64) -> Point {
        Point {
            x,
            y,
            z,
            charge: 100.0,
            pad_id: 1,
            time_bucket: 0,
            scale: 1.0,
        }
    }

    #[test]
    fn dense_line_forms_one_cluster() {
        let mut cloud = PointCloud::new(0);
        for i in 0..20 {
            cloud.push(point(i as f64, 0.0, 0.0));
        }
        let params = ClusterParameters {
            neighbor_radius: 2.0,
            min_neighbors: 1,
            min_points: 5,
            charge_weight: 0.0,
        };
        let clusters = cluster_point_cloud(&cloud, &params);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 20);
    }

    #[test]
    fn small_cluster_below_threshold_is_dropped() {
        let mut cloud = PointCloud::new(0);
        for i in 0..3 {
            cloud.push(point(i as f64, 0.0, 0.0));
        }
        let params = ClusterParameters {
            neighbor_radius: 2.0,
            min_neighbors: 1,
            min_points: 10,
            charge_weight: 0.0,
        };
        let clusters = cluster_point_cloud(&cloud, &params);
        assert!(clusters.is_empty());
    }

    #[test]
    fn two_well_separated_groups_form_two_clusters() {
        let mut cloud = PointCloud::new(0);
        for i in 0..10 {
            cloud.push(point(i as f64, 0.0, 0.0));
        }
        for i in 0..10 {
            cloud.push(point(1000.0 + i as f64, 0.0, 0.0));
        }
        let params = ClusterParameters {
            neighbor_radius: 2.0,
            min_neighbors: 1,
            min_points: 5,
            charge_weight: 0.0,
        };
        let clusters = cluster_point_cloud(&cloud, &params);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn isolated_point_is_noise_and_excluded() {
        let mut cloud = PointCloud::new(0);
        for i in 0..10 {
            cloud.push(point(i as f64, 0.0, 0.0));
        }
        cloud.push(point(10_000.0, 10_000.0, 10_000.0));
        let params = ClusterParameters {
            neighbor_radius: 2.0,
            min_neighbors: 1,
            min_points: 5,
            charge_weight: 0.0,
        };
        let clusters = cluster_point_cloud(&cloud, &params);
        let total_points: usize = clusters.iter().map(Cluster::len).sum();
        assert_eq!(total_points, 10);
    }
}
