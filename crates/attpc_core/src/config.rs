//! Parameter aggregates shared across phases, plus the run driver's
//! top-level configuration object (§6's CLI surface).
//!
//! Individual phase parameter structs (`TraceAnalysisParams`,
//! `ClusterParameters`) live alongside the module they configure; this
//! module holds the cross-cutting ones (`DetectorParameters`,
//! `EstimateParameters`, `SolverParameters`, `FribParameters`) and the
//! `RunConfig` aggregate that wires everything together for C10.
//! `Default` values throughout are the reference constants from the
//! original Python test harness (tilt = 0, B = 2.991 T, gas density
//! 1.3136e-4 g/cm^3, micromegas/window time buckets, detector length).

use crate::cluster::ClusterParameters;
use crate::trace::TraceAnalysisParams;
use serde::{Deserialize, Serialize};

/// Physical detector geometry and field configuration. Field components
/// are stored explicitly (not derived from a magnitude + tilt angle) so
/// this type is the authoritative source named in spec §9 open question
/// (b), sidestepping the reference test harness's duplicated
/// `B_y = B_z = -B*sin(tilt)` assignment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorParameters {
    /// V/m
    pub electric_field: [f64; 3],
    /// T
    pub magnetic_field: [f64; 3],
    /// g/cm^3
    pub gas_density: f64,
    /// mm
    pub micromegas_time_bucket: f64,
    /// mm
    pub window_time_bucket: f64,
    /// mm
    pub detector_length: f64,
    /// mm; beam-contamination radius for estimator rejection
    pub beam_region_radius: f64,
    /// GET electronics sampling frequency, MHz -- the clock the drift
    /// grid's nanosecond-domain `delta_t` must be converted through to
    /// land in the same time-bucket domain as `micromegas_time_bucket`/
    /// `window_time_bucket` before it can be turned into a z-shift.
    pub get_sampling_frequency_mhz: f64,
}

impl Default for DetectorParameters {
    fn default() -> Self {
        Self {
            electric_field: [0.0, 0.0, -60_000.0],
            magnetic_field: [0.0, 0.0, -2.991],
            gas_density: 1.3136e-4,
            micromegas_time_bucket: 66.0045,
            window_time_bucket: 399.455,
            detector_length: 1000.0,
            beam_region_radius: 20.0,
            get_sampling_frequency_mhz: 6.25,
        }
    }
}

impl DetectorParameters {
    /// Scalar magnitude of `magnetic_field`, the `B` used in the
    /// estimator's `Brho = B * R * 1e-3 / sin(theta)` formula (§4.7).
    pub fn magnetic_field_magnitude(&self) -> f64 {
        let [bx, by, bz] = self.magnetic_field;
        (bx * bx + by * by + bz * bz).sqrt()
    }
}

/// Estimator (C7) control parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimateParameters {
    pub min_total_trajectory_points: usize,
    /// mm
    pub max_distance_from_beam_axis: f64,
}

impl Default for EstimateParameters {
    fn default() -> Self {
        Self {
            min_total_trajectory_points: 50,
            max_distance_from_beam_axis: 30.0,
        }
    }
}

/// Physics solver (C8) control parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverParameters {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for SolverParameters {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            tolerance: 1e-3,
        }
    }
}

/// FRIBDAQ ion-chamber analysis parameters (SPEC_FULL.md item 1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FribParameters {
    pub baseline_window_scale: f64,
    pub height: f64,
    pub prominence: f64,
    pub separation: usize,
    /// Maximum number of IC peaks not in silicon coincidence allowed for
    /// a "good" event.
    pub ic_multiplicity: usize,
    /// GET electronics sampling frequency, MHz.
    pub get_sampling_frequency_mhz: f64,
}

impl Default for FribParameters {
    fn default() -> Self {
        Self {
            baseline_window_scale: 20.0,
            height: 20.0,
            prominence: 10.0,
            separation: 10,
            ic_multiplicity: 1,
            get_sampling_frequency_mhz: 6.25,
        }
    }
}

/// Which phases a run should execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PhaseSelection {
    pub phase1: bool,
    pub phase2: bool,
    pub phase3: bool,
    pub phase4: bool,
}

/// The run driver's top-level configuration aggregate (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub workspace_path: String,
    pub run_min: i64,
    pub run_max: i64,
    pub do_phase: PhaseSelection,
    pub trace_params: TraceAnalysisParams,
    pub cluster_params: ClusterParameters,
    pub estimate_params: EstimateParameters,
    pub solver_params: SolverParameters,
    pub detector_params: DetectorParameters,
    pub frib_params: FribParameters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_run_config_is_internally_consistent() {
        let config = RunConfig {
            workspace_path: "/tmp/workspace".into(),
            run_min: 0,
            run_max: 0,
            do_phase: PhaseSelection {
                phase1: true,
                phase2: true,
                phase3: true,
                phase4: true,
            },
            trace_params: TraceAnalysisParams::default(),
            cluster_params: ClusterParameters::default(),
            estimate_params: EstimateParameters::default(),
            solver_params: SolverParameters::default(),
            detector_params: DetectorParameters::default(),
            frib_params: FribParameters::default(),
        };
        assert!(config.run_max >= config.run_min);
        assert!((config.detector_params.magnetic_field_magnitude() - 2.991).abs() < 1e-9);
    }

    #[test]
    fn run_config_round_trips_through_json() {
        let detector = DetectorParameters::default();
        let json = serde_json::to_string(&detector).unwrap();
        let reloaded: DetectorParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(detector, reloaded);
    }
}
