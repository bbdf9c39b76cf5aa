//! Drift-correction grid (C3): precomputed (rho, z) -> (delta_rho,
//! transverse shift, delta_t) lookup, built from a Garfield electron-drift
//! simulation table and queried via clamped bilinear interpolation.

use crate::error::{ReconstructionError, Result};

const GARFIELD_CHUNK_SIZE: usize = 55;
const GARFIELD_CHUNK_MIDPOINT: usize = 27;
const GARFIELD_RHO_MIN_CM: f64 = -270.0;
const GARFIELD_RHO_MAX_CM: f64 = 270.0;
const GARFIELD_Z_MIN_CM: f64 = 30.0;
const GARFIELD_Z_MAX_CM: f64 = 1000.0;

pub const CORRECTION_RHO_BINS: usize = 276;
pub const CORRECTION_Z_BINS: usize = 1001;
pub const CORRECTION_RHO_MAX_MM: f64 = 275.0;
pub const CORRECTION_Z_MAX_MM: f64 = 1000.0;

fn linspace(min: f64, max: f64, n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![min];
    }
    let step = (max - min) / (n as f64 - 1.0);
    (0..n).map(|i| min + step * i as f64).collect()
}

/// Parsed, regridded Garfield simulation table: electron final-position
/// data indexed by (z-step, initial-rho-step).
#[derive(Debug, Clone)]
pub struct GarfieldTable {
    z_axis_cm: Vec<f64>,
    rho_axis_cm: Vec<f64>,
    /// `rho_final_mm[z_idx][rho_idx]`
    rho_final_mm: Vec<Vec<f64>>,
    /// `transverse_mm[z_idx][rho_idx]`
    transverse_mm: Vec<Vec<f64>>,
    /// `time_ns[z_idx][rho_idx]`, centered per chunk so `time == 0` at
    /// `rho_idx == GARFIELD_CHUNK_MIDPOINT` (initial rho == 0).
    time_ns: Vec<Vec<f64>>,
}

/// Parses a whitespace-separated Garfield-format file: rows of
/// `[x_i, y_i, x_f, y_f, z_f, t]` in cm, grouped into chunks of 55 rows
/// (steps in initial rho) across `n_chunks` z-steps.
pub fn parse_garfield_table(text: &str) -> Result<GarfieldTable> {
    let mut rows: Vec<[f64; 6]> = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut row = [0.0; 6];
        let mut count = 0;
        for (i, tok) in trimmed.split_whitespace().enumerate() {
            if i >= 6 {
                break;
            }
            row[i] = tok.parse::<f64>().map_err(|_| {
                ReconstructionError::DataShape(format!(
                    "garfield file line {line_no} has a non-numeric field"
                ))
            })?;
            count += 1;
        }
        if count != 6 {
            return Err(ReconstructionError::DataShape(format!(
                "garfield file line {line_no} has {count} fields, expected 6"
            )));
        }
        rows.push(row);
    }

    if rows.len() < GARFIELD_CHUNK_SIZE || rows.len() % GARFIELD_CHUNK_SIZE != 0 {
        return Err(ReconstructionError::DataShape(format!(
            "garfield file has {} rows, not a multiple of the {} row chunk size",
            rows.len(),
            GARFIELD_CHUNK_SIZE
        )));
    }
    let n_chunks = rows.len() / GARFIELD_CHUNK_SIZE;

    let z_axis_cm = linspace(GARFIELD_Z_MIN_CM, GARFIELD_Z_MAX_CM, n_chunks);
    let rho_axis_cm = linspace(GARFIELD_RHO_MIN_CM, GARFIELD_RHO_MAX_CM, GARFIELD_CHUNK_SIZE);

    let mut rho_final_mm = vec![vec![0.0; GARFIELD_CHUNK_SIZE]; n_chunks];
    let mut transverse_mm = vec![vec![0.0; GARFIELD_CHUNK_SIZE]; n_chunks];
    let mut time_ns = vec![vec![0.0; GARFIELD_CHUNK_SIZE]; n_chunks];

    for chunk in 0..n_chunks {
        for row_idx in 0..GARFIELD_CHUNK_SIZE {
            let row = rows[chunk * GARFIELD_CHUNK_SIZE + row_idx];
            rho_final_mm[chunk][row_idx] = row[3] * 10.0;
            transverse_mm[chunk][row_idx] = row[4] * 10.0;
            time_ns[chunk][row_idx] = row[5];
        }
        let mid = time_ns[chunk][GARFIELD_CHUNK_MIDPOINT];
        for value in time_ns[chunk].iter_mut() {
            *value -= mid;
        }
    }

    Ok(GarfieldTable {
        z_axis_cm,
        rho_axis_cm,
        rho_final_mm,
        transverse_mm,
        time_ns,
    })
}

impl GarfieldTable {
    /// For a continuous garfield-space `(z, rho_initial)`, bilinearly
    /// interpolates `(rho_final, transverse, time)` from the regular
    /// simulation grid, clamping out-of-range coordinates to the grid
    /// boundary.
    fn interpolate_raw(&self, z_cm: f64, rho_initial_cm: f64) -> (f64, f64, f64) {
        let (zi0, zi1, zt) = bracket(&self.z_axis_cm, z_cm);
        let (ri0, ri1, rt) = bracket(&self.rho_axis_cm, rho_initial_cm);

        let sample = |grid: &Vec<Vec<f64>>| -> f64 {
            let v00 = grid[zi0][ri0];
            let v01 = grid[zi0][ri1];
            let v10 = grid[zi1][ri0];
            let v11 = grid[zi1][ri1];
            let v0 = v00 * (1.0 - rt) + v01 * rt;
            let v1 = v10 * (1.0 - rt) + v11 * rt;
            v0 * (1.0 - zt) + v1 * zt
        };

        (
            sample(&self.rho_final_mm),
            sample(&self.transverse_mm),
            sample(&self.time_ns),
        )
    }

    /// Inverts `rho_final(z, rho_initial) = target_rho_final_mm` for
    /// `rho_initial`, at fixed garfield-space `z_cm`, by bisecting along
    /// the (assumed monotone) rho-initial axis of the bilinearly
    /// interpolated surface. Equivalent in effect to tracing the
    /// `rho_final == target` contour of the (z, rho_initial) plane and
    /// reading off its `rho_initial` value at `z_cm`.
    fn invert_initial_rho(&self, z_cm: f64, target_rho_final_mm: f64) -> f64 {
        let mut lo = self.rho_axis_cm[0];
        let mut hi = *self.rho_axis_cm.last().unwrap();
        let f = |rho: f64| self.interpolate_raw(z_cm, rho).0;

        let f_lo = f(lo);
        let f_hi = f(hi);
        if (f_hi - f_lo).abs() < 1e-12 {
            return 0.0;
        }
        let increasing = f_hi > f_lo;

        for _ in 0..60 {
            let mid = 0.5 * (lo + hi);
            let f_mid = f(mid);
            let below_target = if increasing {
                f_mid < target_rho_final_mm
            } else {
                f_mid > target_rho_final_mm
            };
            if below_target {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        0.5 * (lo + hi)
    }
}

/// Finds the grid cell bracketing `value` in a monotone increasing axis,
/// clamping out-of-range values to the boundary cell, and returns the
/// interpolation fraction within that cell.
fn bracket(axis: &[f64], value: f64) -> (usize, usize, f64) {
    let n = axis.len();
    if value <= axis[0] {
        return (0, 0.min(n - 1), 0.0);
    }
    if value >= axis[n - 1] {
        return (n - 1, n - 1, 0.0);
    }
    let mut i = 0;
    while i + 1 < n && axis[i + 1] < value {
        i += 1;
    }
    let (a, b) = (axis[i], axis[i + 1]);
    let t = if (b - a).abs() < 1e-15 {
        0.0
    } else {
        (value - a) / (b - a)
    };
    (i, i + 1, t)
}

/// Dense `(276, 1001, 3)` persisted correction grid over physical
/// rho in `[0, 275]` mm and z in `[0, 1000]` mm.
#[derive(Debug, Clone)]
pub struct DriftCorrectionGrid {
    rho_bins: usize,
    z_bins: usize,
    /// `cells[rho_idx * z_bins + z_idx] = (delta_rho_mm, transverse_mm, delta_t_ns)`
    cells: Vec<(f64, f64, f64)>,
}

impl DriftCorrectionGrid {
    /// Builds the correction grid from a parsed Garfield table, following
    /// §4.3: for each physical `(rho, z)` cell, invert the contour to
    /// find the corresponding initial rho, take `delta_rho = rho_initial
    /// - rho`, and look up the transverse/time shift at that
    /// `(z, rho_initial)` point in the raw Garfield grid.
    pub fn build(table: &GarfieldTable, detector_length_mm: f64) -> Self {
        let rho_points = linspace(0.0, CORRECTION_RHO_MAX_MM, CORRECTION_RHO_BINS);
        let z_points = linspace(0.0, CORRECTION_Z_MAX_MM, CORRECTION_Z_BINS);

        let mut cells = vec![(0.0, 0.0, 0.0); CORRECTION_RHO_BINS * CORRECTION_Z_BINS];

        for (ridx, &rho) in rho_points.iter().enumerate() {
            for (zidx, &z) in z_points.iter().enumerate() {
                // Rescale the physical z axis onto the Garfield z axis;
                // the detector's drift direction runs opposite the
                // Garfield simulation's z convention.
                let zg = (1.0 - z / detector_length_mm) * (GARFIELD_Z_MAX_CM - GARFIELD_Z_MIN_CM)
                    + GARFIELD_Z_MIN_CM;
                let rho_initial = table.invert_initial_rho(zg, rho);
                let delta_rho = rho_initial - rho;
                let (_, transverse, time) = table.interpolate_raw(zg, rho_initial);
                cells[ridx * CORRECTION_Z_BINS + zidx] = (delta_rho, transverse, time);
            }
        }

        Self {
            rho_bins: CORRECTION_RHO_BINS,
            z_bins: CORRECTION_Z_BINS,
            cells,
        }
    }

    /// Bilinear interpolation with clamped boundary on the persisted
    /// grid; returns `(delta_rho, delta_transverse, delta_t)` in mm/ns.
    pub fn interpolate(&self, rho_mm: f64, z_mm: f64) -> (f64, f64, f64) {
        let rho_axis_step = CORRECTION_RHO_MAX_MM / (self.rho_bins as f64 - 1.0);
        let z_axis_step = CORRECTION_Z_MAX_MM / (self.z_bins as f64 - 1.0);

        let rho_clamped = rho_mm.clamp(0.0, CORRECTION_RHO_MAX_MM);
        let z_clamped = z_mm.clamp(0.0, CORRECTION_Z_MAX_MM);

        let rf = rho_clamped / rho_axis_step;
        let zf = z_clamped / z_axis_step;
        let ri0 = (rf.floor() as usize).min(self.rho_bins - 1);
        let zi0 = (zf.floor() as usize).min(self.z_bins - 1);
        let ri1 = (ri0 + 1).min(self.rho_bins - 1);
        let zi1 = (zi0 + 1).min(self.z_bins - 1);
        let rt = rf - ri0 as f64;
        let zt = zf - zi0 as f64;

        let get = |ri: usize, zi: usize| self.cells[ri * self.z_bins + zi];
        let (r00d, r00t, r00ti) = get(ri0, zi0);
        let (r01d, r01t, r01ti) = get(ri0, zi1);
        let (r10d, r10t, r10ti) = get(ri1, zi0);
        let (r11d, r11t, r11ti) = get(ri1, zi1);

        let blend = |a: f64, b: f64, c: f64, d: f64| {
            let top = a * (1.0 - zt) + b * zt;
            let bot = c * (1.0 - zt) + d * zt;
            top * (1.0 - rt) + bot * rt
        };

        (
            blend(r00d, r01d, r10d, r11d),
            blend(r00t, r01t, r10t, r11t),
            blend(r00ti, r01ti, r10ti, r11ti),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a synthetic Garfield table with no distortion at all:
    /// `rho_final == rho_initial`, zero transverse shift, zero time
    /// shift everywhere.
    fn identity_table() -> GarfieldTable {
        let mut text = String::new();
        let z_steps = linspace(GARFIELD_Z_MIN_CM, GARFIELD_Z_MAX_CM, 4);
        let rho_steps = linspace(GARFIELD_RHO_MIN_CM, GARFIELD_RHO_MAX_CM, GARFIELD_CHUNK_SIZE);
        for _z in &z_steps {
            for rho in &rho_steps {
                // x_i y_i x_f y_f z_f t ; only columns 3,4,5 matter here.
                text.push_str(&format!("0.0 0.0 0.0 {rho} 0.0 0.0\n"));
            }
        }
        parse_garfield_table(&text).expect("synthetic table should parse")
    }

    #[test]
    fn identity_table_produces_near_zero_correction() {
        let table = identity_table();
        let grid = DriftCorrectionGrid::build(&table, 1000.0);
        for &(rho, z) in &[(0.0, 0.0), (100.0, 500.0), (275.0, 1000.0)] {
            let (d_rho, transverse, dt) = grid.interpolate(rho, z);
            assert!(d_rho.abs() < 1e-6, "rho={rho} z={z} d_rho={d_rho}");
            assert!(transverse.abs() < 1e-9);
            assert!(dt.abs() < 1e-9);
        }
    }

    #[test]
    fn out_of_range_query_is_clamped_not_panicking() {
        let table = identity_table();
        let grid = DriftCorrectionGrid::build(&table, 1000.0);
        let _ = grid.interpolate(-50.0, -50.0);
        let _ = grid.interpolate(10_000.0, 10_000.0);
    }

    #[test]
    fn malformed_garfield_rows_are_rejected() {
        let text = "0.0 0.0 0.0\n";
        assert!(parse_garfield_table(text).is_err());
    }
}
