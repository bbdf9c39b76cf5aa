//! The run driver (C10): composes C4 -> C5 -> C7 -> (C9 gate) -> C8 over
//! a bounded worker pool, per spec §2's control-flow diagram and §5's
//! concurrency model.
//!
//! `RunConfig.do_phase` selects a *prefix* of that chain to execute for
//! this call: phase N may only run if phase N-1 also runs. Resuming a
//! later phase from a previous run's persisted intermediates is an
//! external-store concern (§1's "out of scope... on-disk file readers
//! and writers") this library does not model, since `ResultSink` is
//! write-only by design (§6 names the store's *shape*, not a read API).

use crate::io::{EventSource, RawFrame, ResultRow, ResultSink};
use crate::progress::{Phase, ProgressReporter, ProgressUpdate};
use crate::worker::{run_events, CancellationToken};
use anyhow::{bail, Context, Result};
use attpc_core::cluster::cluster_point_cloud;
use attpc_core::config::RunConfig;
use attpc_core::drift::DriftCorrectionGrid;
use attpc_core::error::ReconstructionError;
use attpc_core::estimator::estimate_physics;
use attpc_core::geometry::Cluster;
use attpc_core::pad_map::PadGeometryMap;
use attpc_core::particle_id::ParticleID;
use attpc_core::pointcloud_builder::{build_point_cloud, PadFrame, ZCalibration};
use attpc_core::solver::solve_physics;
use attpc_core::target::Target;
use std::time::Instant;

/// Read-only, worker-shared context (§5: "read-only after construction
/// and shared by reference across workers. ... No locks on the hot
/// path."). Built once per run, borrowed by every event.
pub struct RunContext<'a> {
    pub pad_map: &'a PadGeometryMap,
    pub drift_grid: &'a DriftCorrectionGrid,
    pub calibration: ZCalibration,
    pub target: &'a Target,
    /// Required when `do_phase.phase4` is set: the gate (C9) and the
    /// solver's nucleus both come from here.
    pub particle_id: Option<&'a ParticleID>,
}

/// Aggregate counters for one `run()` invocation, suitable for a final
/// `info!` summary per §"Logging & diagnostics".
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOutcome {
    pub events_processed: usize,
    pub clusters_emitted: usize,
    pub clusters_rejected: usize,
    pub gate_rejected: usize,
    pub solver_non_convergent: usize,
}

impl RunOutcome {
    fn merge(&mut self, other: EventOutcome) {
        self.events_processed += 1;
        self.clusters_emitted += other.clusters_emitted;
        self.clusters_rejected += other.clusters_rejected;
        self.gate_rejected += other.gate_rejected;
        self.solver_non_convergent += other.solver_non_convergent;
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct EventOutcome {
    clusters_emitted: usize,
    clusters_rejected: usize,
    gate_rejected: usize,
    solver_non_convergent: usize,
}

fn validate_phase_chain(do_phase: attpc_core::config::PhaseSelection) -> Result<()> {
    if do_phase.phase2 && !do_phase.phase1 {
        bail!(ReconstructionError::Config(
            "phase2 requires phase1 in the same run".into()
        ));
    }
    if do_phase.phase3 && !do_phase.phase2 {
        bail!(ReconstructionError::Config(
            "phase3 requires phase2 in the same run".into()
        ));
    }
    if do_phase.phase4 && !do_phase.phase3 {
        bail!(ReconstructionError::Config(
            "phase4 requires phase3 in the same run".into()
        ));
    }
    Ok(())
}

fn raw_frame_to_pad_frames(frame: &RawFrame) -> Vec<PadFrame<'_>> {
    frame
        .pad_traces
        .iter()
        .map(|(pad_id, samples)| PadFrame {
            pad_id: *pad_id,
            samples,
        })
        .collect()
}

fn process_event(
    event_id: i64,
    total: usize,
    config: &RunConfig,
    ctx: &RunContext<'_>,
    source: &dyn EventSource,
    sink: &dyn ResultSink,
    progress: &ProgressReporter,
) -> Result<EventOutcome> {
    let mut outcome = EventOutcome::default();
    let frame = source
        .load_frame(event_id)
        .with_context(|| format!("loading raw frame for event {event_id}"))?;

    if !config.do_phase.phase1 {
        return Ok(outcome);
    }
    let pad_frames = raw_frame_to_pad_frames(&frame);
    let cloud = build_point_cloud(
        event_id,
        &pad_frames,
        ctx.pad_map,
        ctx.drift_grid,
        &ctx.calibration,
        &config.trace_params,
    );
    sink.write_point_cloud(event_id, &cloud)
        .with_context(|| format!("writing point cloud for event {event_id}"))?;
    progress.report(ProgressUpdate {
        phase: Phase::PointCloud,
        event_id,
        completed: 1,
        total,
    });

    if !config.do_phase.phase2 {
        return Ok(outcome);
    }
    let clusters = cluster_point_cloud(&cloud, &config.cluster_params);
    sink.write_clusters(event_id, &clusters)
        .with_context(|| format!("writing clusters for event {event_id}"))?;
    progress.report(ProgressUpdate {
        phase: Phase::Cluster,
        event_id,
        completed: 1,
        total,
    });

    if !config.do_phase.phase3 {
        return Ok(outcome);
    }
    for mut cluster in clusters {
        match run_cluster_phases(&mut cluster, config, ctx) {
            ClusterRunOutcome::Estimated(result_row) => {
                sink.write_result_row(result_row)
                    .with_context(|| format!("writing result row for event {event_id}"))?;
                outcome.clusters_emitted += 1;
            }
            ClusterRunOutcome::SoftRejected(reason) => {
                tracing::debug!(event_id, cluster_index = cluster.cluster_index, reason = %reason, "cluster rejected");
                outcome.clusters_rejected += 1;
            }
            ClusterRunOutcome::GateRejected => {
                outcome.gate_rejected += 1;
            }
            ClusterRunOutcome::NonConvergent(result_row, objective) => {
                tracing::warn!(event_id, cluster_index = cluster.cluster_index, objective, "solver did not converge");
                sink.write_result_row(result_row)
                    .with_context(|| format!("writing result row for event {event_id}"))?;
                outcome.clusters_emitted += 1;
                outcome.solver_non_convergent += 1;
            }
        }
    }
    progress.report(ProgressUpdate {
        phase: Phase::Estimate,
        event_id,
        completed: 1,
        total,
    });

    Ok(outcome)
}

enum ClusterRunOutcome {
    Estimated(ResultRow),
    SoftRejected(String),
    GateRejected,
    NonConvergent(ResultRow, f64),
}

fn run_cluster_phases(
    cluster: &mut Cluster,
    config: &RunConfig,
    ctx: &RunContext<'_>,
) -> ClusterRunOutcome {
    let estimate = match estimate_physics(cluster, &config.estimate_params, &config.detector_params) {
        Ok(estimate) => estimate,
        Err(err) => return ClusterRunOutcome::SoftRejected(err.to_string()),
    };

    if !config.do_phase.phase4 {
        let row = result_row(cluster, &estimate.initial_value, estimate.diagnostics.dedx, 0.0, true);
        return ClusterRunOutcome::Estimated(row);
    }

    let particle_id = ctx
        .particle_id
        .expect("validated at run() start: phase4 requires a particle id");
    if !particle_id
        .cut
        .is_point_inside(estimate.diagnostics.dedx, estimate.initial_value.brho)
    {
        return ClusterRunOutcome::GateRejected;
    }

    let solved = solve_physics(
        cluster,
        &estimate.initial_value,
        &config.detector_params,
        ctx.target,
        &particle_id.nucleus,
    );
    let row = result_row(
        cluster,
        &solved.refined,
        estimate.diagnostics.dedx,
        solved.objective,
        solved.converged,
    );
    if solved.converged {
        ClusterRunOutcome::Estimated(row)
    } else {
        ClusterRunOutcome::NonConvergent(row, solved.objective)
    }
}

fn result_row(
    cluster: &Cluster,
    initial: &attpc_core::estimator::InitialValue,
    dedx: f64,
    objective: f64,
    converged: bool,
) -> ResultRow {
    ResultRow {
        event_id: cluster.event_id,
        cluster_index: cluster.cluster_index as i64,
        vertex: [initial.vertex_x, initial.vertex_y, initial.vertex_z],
        brho: initial.brho,
        polar: initial.polar,
        azimuthal: initial.azimuthal,
        direction: initial.direction,
        dedx,
        objective,
        converged,
    }
}

/// Runs the selected phase chain over `[config.run_min, config.run_max]`.
pub fn run(
    config: &RunConfig,
    ctx: &RunContext<'_>,
    source: &dyn EventSource,
    sink: &dyn ResultSink,
    progress: ProgressReporter,
    cancel: &CancellationToken,
) -> Result<RunOutcome> {
    validate_phase_chain(config.do_phase)?;
    if config.do_phase.phase4 && ctx.particle_id.is_none() {
        bail!(ReconstructionError::Config(
            "phase4 requires a particle id for the C9 gate and the solver nucleus".into()
        ));
    }

    let event_ids = source
        .event_ids(config.run_min, config.run_max)
        .context("listing event ids")?;
    let total = event_ids.len();
    let span = tracing::info_span!("run", run_min = config.run_min, run_max = config.run_max, events = total);
    let _guard = span.enter();
    let started = Instant::now();

    let results = run_events(&event_ids, cancel, |event_id| {
        process_event(*event_id, total, config, ctx, source, sink, &progress)
    });

    let mut outcome = RunOutcome::default();
    for result in results {
        match result {
            Ok(event_outcome) => outcome.merge(event_outcome),
            Err(err) => return Err(err),
        }
    }

    tracing::info!(
        events_processed = outcome.events_processed,
        clusters_emitted = outcome.clusters_emitted,
        clusters_rejected = outcome.clusters_rejected,
        gate_rejected = outcome.gate_rejected,
        solver_non_convergent = outcome.solver_non_convergent,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "run complete"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use attpc_core::config::{DetectorParameters, PhaseSelection};
    use attpc_core::drift::{parse_garfield_table, DriftCorrectionGrid};
    use attpc_core::geometry::PointCloud;
    use std::sync::Mutex;

    struct FakeSource {
        frames: std::collections::HashMap<i64, RawFrame>,
    }

    impl EventSource for FakeSource {
        fn event_ids(&self, run_min: i64, run_max: i64) -> Result<Vec<i64>> {
            Ok((run_min..=run_max).collect())
        }
        fn load_frame(&self, event_id: i64) -> Result<RawFrame> {
            self.frames
                .get(&event_id)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no frame for event {event_id}"))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        clouds: Mutex<Vec<(i64, PointCloud)>>,
        clusters: Mutex<Vec<(i64, Vec<Cluster>)>>,
        rows: Mutex<Vec<ResultRow>>,
    }

    impl ResultSink for RecordingSink {
        fn write_point_cloud(&self, event_id: i64, cloud: &PointCloud) -> Result<()> {
            self.clouds.lock().unwrap().push((event_id, cloud.clone()));
            Ok(())
        }
        fn write_clusters(&self, event_id: i64, clusters: &[Cluster]) -> Result<()> {
            self.clusters
                .lock()
                .unwrap()
                .push((event_id, clusters.to_vec()));
            Ok(())
        }
        fn write_result_row(&self, row: ResultRow) -> Result<()> {
            self.rows.lock().unwrap().push(row);
            Ok(())
        }
    }

    fn identity_grid() -> DriftCorrectionGrid {
        let mut text = String::new();
        for _zc in 0..4 {
            for i in 0..55 {
                let rho = -270.0 + 540.0 * (i as f64) / 54.0;
                text.push_str(&format!("0.0 0.0 0.0 {rho} 0.0 0.0\n"));
            }
        }
        let table = parse_garfield_table(&text).unwrap();
        DriftCorrectionGrid::build(&table, 1000.0)
    }

    #[test]
    fn phase2_without_phase1_is_rejected() {
        let do_phase = PhaseSelection {
            phase1: false,
            phase2: true,
            phase3: false,
            phase4: false,
        };
        assert!(validate_phase_chain(do_phase).is_err());
    }

    #[test]
    fn phase4_without_particle_id_is_rejected() {
        let pad_map = PadGeometryMap::new();
        let grid = identity_grid();
        let target = Target::from_rows(vec![0.0, 10.0], vec![1.0, 1.0]);
        let mut config_do_phase = PhaseSelection::default();
        config_do_phase.phase1 = true;
        config_do_phase.phase2 = true;
        config_do_phase.phase3 = true;
        config_do_phase.phase4 = true;
        let config = RunConfig {
            workspace_path: "/tmp".into(),
            run_min: 0,
            run_max: 0,
            do_phase: config_do_phase,
            trace_params: Default::default(),
            cluster_params: Default::default(),
            estimate_params: Default::default(),
            solver_params: Default::default(),
            detector_params: DetectorParameters::default(),
            frib_params: Default::default(),
        };
        let ctx = RunContext {
            pad_map: &pad_map,
            drift_grid: &grid,
            calibration: ZCalibration::from_detector_params(&DetectorParameters::default()),
            target: &target,
            particle_id: None,
        };
        let source = FakeSource {
            frames: std::collections::HashMap::new(),
        };
        let sink = RecordingSink::default();
        let (reporter, _receiver) = crate::progress::channel();
        let cancel = CancellationToken::new();
        let result = run(&config, &ctx, &source, &sink, reporter, &cancel);
        assert!(result.is_err());
    }

    #[test]
    fn phase1_only_writes_point_clouds_and_stops() {
        let pad_map = PadGeometryMap::from_rows([(1, 10.0, 0.0, 0, 1.0)]);
        let grid = identity_grid();
        let target = Target::from_rows(vec![0.0, 10.0], vec![1.0, 1.0]);
        let mut samples = vec![0.0; 512];
        samples[100] = 200.0;
        let frame = RawFrame {
            pad_traces: vec![(1, samples)],
            frib_columns: Vec::new(),
        };
        let mut frames = std::collections::HashMap::new();
        frames.insert(0, frame);
        let source = FakeSource { frames };
        let sink = RecordingSink::default();

        let mut do_phase = PhaseSelection::default();
        do_phase.phase1 = true;
        let config = RunConfig {
            workspace_path: "/tmp".into(),
            run_min: 0,
            run_max: 0,
            do_phase,
            trace_params: Default::default(),
            cluster_params: Default::default(),
            estimate_params: Default::default(),
            solver_params: Default::default(),
            detector_params: DetectorParameters::default(),
            frib_params: Default::default(),
        };
        let ctx = RunContext {
            pad_map: &pad_map,
            drift_grid: &grid,
            calibration: ZCalibration::from_detector_params(&DetectorParameters::default()),
            target: &target,
            particle_id: None,
        };
        let (reporter, _receiver) = crate::progress::channel();
        let cancel = CancellationToken::new();
        let outcome = run(&config, &ctx, &source, &sink, reporter, &cancel).unwrap();
        assert_eq!(outcome.events_processed, 1);
        assert_eq!(sink.clouds.lock().unwrap().len(), 1);
        assert!(sink.clusters.lock().unwrap().is_empty());
    }
}
