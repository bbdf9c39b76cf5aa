//! External-collaborator interfaces (spec.md Out of scope / §6).
//!
//! The raw event store, the persisted intermediate stores, and
//! parameter-file parsing are all named external collaborators; this
//! module only fixes the *shape* of that boundary as traits so the run
//! driver can be exercised against an in-memory fake without pulling in
//! a real file format.

use anyhow::Result;
use attpc_core::geometry::{Cluster, PointCloud};

/// One event's raw detector data, as handed over by the raw event store.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// `(pad_id, samples)` pairs for the pad-plane frame. A pad absent
    /// from this list contributes no points.
    pub pad_traces: Vec<(i32, Vec<f64>)>,
    /// Fast-digitizer matrix, column-major: `columns[channel][sample]`.
    /// Empty when the event has no auxiliary FRIB data.
    pub frib_columns: Vec<Vec<f64>>,
}

/// The raw event store (§6): random access by event id.
pub trait EventSource: Sync {
    fn event_ids(&self, run_min: i64, run_max: i64) -> Result<Vec<i64>>;
    fn load_frame(&self, event_id: i64) -> Result<RawFrame>;
}

/// One phase-3/4 output row, keyed by `(event_id, cluster_index)` per
/// §5's ordering guarantee: consumers treat this as a relation, not a
/// sequence.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ResultRow {
    pub event_id: i64,
    pub cluster_index: i64,
    pub vertex: [f64; 3],
    pub brho: f64,
    pub polar: f64,
    pub azimuthal: f64,
    pub direction: attpc_core::estimator::Direction,
    pub dedx: f64,
    pub objective: f64,
    pub converged: bool,
}

/// The persisted-intermediates collaborator (§6): one sink per run,
/// capable of receiving output from any phase. A real implementation
/// backs this with a columnar store; tests use an in-memory fake.
pub trait ResultSink: Sync {
    fn write_point_cloud(&self, event_id: i64, cloud: &PointCloud) -> Result<()>;
    fn write_clusters(&self, event_id: i64, clusters: &[Cluster]) -> Result<()>;
    fn write_result_row(&self, row: ResultRow) -> Result<()>;
}
