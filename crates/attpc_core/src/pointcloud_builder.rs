//! Point-cloud builder (C4): turns a pad-plane event frame into a
//! [`PointCloud`], applying the pad geometry (C1), trace analyzer (C2),
//! and drift-correction grid (C3).

use crate::config::DetectorParameters;
use crate::drift::DriftCorrectionGrid;
use crate::geometry::{Point, PointCloud};
use crate::pad_map::PadGeometryMap;
use crate::trace::{analyze_trace, TraceAnalysisParams};

/// Detector geometry needed for the z-calibration (§4.4).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZCalibration {
    /// Detector drift length, mm.
    pub length_mm: f64,
    /// Micromegas reference time bucket.
    pub tb_micromegas: f64,
    /// Window reference time bucket.
    pub tb_window: f64,
    /// GET electronics sampling frequency, MHz (`DetectorParameters`'s
    /// field of the same name): converts the drift grid's nanosecond
    /// `delta_t` into the time-bucket domain `tb_micromegas`/`tb_window`
    /// are expressed in.
    pub get_sampling_frequency_mhz: f64,
}

impl ZCalibration {
    /// Builds the calibration from the detector parameters that own
    /// these values, so `get_sampling_frequency_mhz` cannot drift out
    /// of sync with the rest of the z-calibration.
    pub fn from_detector_params(params: &DetectorParameters) -> Self {
        Self {
            length_mm: params.detector_length,
            tb_micromegas: params.micromegas_time_bucket,
            tb_window: params.window_time_bucket,
            get_sampling_frequency_mhz: params.get_sampling_frequency_mhz,
        }
    }

    /// `z = L * (tb - tb_micromegas) / (tb_window - tb_micromegas)`.
    pub fn z_of(&self, time_bucket: f64) -> f64 {
        self.length_mm * (time_bucket - self.tb_micromegas) / (self.tb_window - self.tb_micromegas)
    }

    /// Time-bucket-domain slope, mm per time bucket.
    fn mm_per_time_bucket(&self) -> f64 {
        self.length_mm / (self.tb_window - self.tb_micromegas)
    }

    /// Converts a drift-grid `delta_t` (ns) into the matching z-shift
    /// (mm): first to time buckets via the GET clock, then to mm via
    /// the same linear calibration slope used for z itself.
    fn z_shift_from_delta_t_ns(&self, delta_t_ns: f64) -> f64 {
        let delta_time_buckets = delta_t_ns * self.get_sampling_frequency_mhz * 1e-3;
        delta_time_buckets * self.mm_per_time_bucket()
    }
}

/// One pad's raw digitized trace plus its sample index.
pub struct PadFrame<'a> {
    pub pad_id: i32,
    pub samples: &'a [f64],
}

/// Builds a [`PointCloud`] for one event from its pad-plane frame.
///
/// For each pad with a valid id and known geometry, runs the trace
/// analyzer (C2) to find peaks, computes each peak's z via the linear
/// time-bucket calibration, applies the drift correction (C3) looked up
/// at that peak's `(rho, z)`, and emits a [`Point`] whose charge is the
/// (gain-scaled) peak integral. Pads with an invalid id, unmapped pads,
/// or pads with no detected peaks contribute no points.
pub fn build_point_cloud(
    event_id: i64,
    frames: &[PadFrame<'_>],
    pad_map: &PadGeometryMap,
    drift_grid: &DriftCorrectionGrid,
    calibration: &ZCalibration,
    trace_params: &TraceAnalysisParams,
) -> PointCloud {
    let mut cloud = PointCloud::new(event_id);

    for frame in frames {
        let Some(geom) = pad_map.get(frame.pad_id) else {
            continue;
        };
        let trace = analyze_trace(frame.samples, trace_params);
        for peak in &trace.peaks {
            let z_raw = calibration.z_of(peak.centroid);
            let rho = (geom.x * geom.x + geom.y * geom.y).sqrt();
            let (delta_rho, _delta_transverse, delta_t) = drift_grid.interpolate(rho, z_raw);

            let (x, y) = if rho > 1e-9 {
                let scale = (rho + delta_rho) / rho;
                (geom.x * scale, geom.y * scale)
            } else {
                (geom.x, geom.y)
            };
            let z = z_raw + calibration.z_shift_from_delta_t_ns(delta_t);

            cloud.push(Point {
                x,
                y,
                z,
                charge: peak.integral * geom.scale,
                pad_id: frame.pad_id,
                time_bucket: peak.centroid.round() as i32,
                scale: geom.scale,
            });
        }
    }

    cloud
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drift::{parse_garfield_table, DriftCorrectionGrid};
    use crate::pad_map::PadGeometryMap;

    fn identity_grid() -> DriftCorrectionGrid {
        // Chunk-major (z-step, rho-step) layout: 4 z-steps x 55 rho-steps.
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
    fn invalid_pad_id_contributes_no_points() {
        let pad_map = PadGeometryMap::new();
        let grid = identity_grid();
        let calibration = ZCalibration::from_detector_params(&crate::config::DetectorParameters::default());
        let samples = vec![0.0; 20];
        let frames = [PadFrame {
            pad_id: -1,
            samples: &samples,
        }];
        let cloud = build_point_cloud(0, &frames, &pad_map, &grid, &calibration, &TraceAnalysisParams::default());
        assert!(cloud.is_empty());
    }

    #[test]
    fn pad_with_peak_emits_point_with_expected_z() {
        let pad_map = PadGeometryMap::from_rows([(1, 10.0, 0.0, 0, 1.0)]);
        let grid = identity_grid();
        let calibration = ZCalibration {
            length_mm: 1000.0,
            tb_micromegas: 0.0,
            tb_window: 500.0,
            get_sampling_frequency_mhz: 6.25,
        };
        let mut samples = vec![0.0; 40];
        samples[20] = 100.0;
        let params = TraceAnalysisParams {
            height: 50.0,
            prominence: 0.0,
            separation: 1,
            baseline_window_scale: 20.0,
        };
        let frames = [PadFrame {
            pad_id: 1,
            samples: &samples,
        }];
        let cloud = build_point_cloud(0, &frames, &pad_map, &grid, &calibration, &params);
        assert_eq!(cloud.len(), 1);
        let point = cloud.points[0];
        assert!((point.z - 40.0).abs() < 1.0, "z={}", point.z);
        assert_eq!(point.pad_id, 1);
    }
}
