//! Estimator (C7): turns a labelled [`Cluster`] into an [`InitialValue`]
//! physics guess plus fit diagnostics, for seeding the C8 solver.

use crate::config::{DetectorParameters, EstimateParameters};
use crate::error::{ReconstructionError, Result, SoftRejection};
use crate::geometry::{generate_circle_points, least_squares_circle, Cluster};
use std::f64::consts::PI;

/// Direction a trajectory travels through the detector, relative to the
/// beam axis. A tagged three-state variant rather than an open enum
/// (§9's "polymorphism over direction" design note).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    None,
    Forward,
    Backward,
}

/// The estimator's primary output: a physics parameter guess to seed the
/// solver (C8).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InitialValue {
    /// radians
    pub polar: f64,
    /// radians
    pub azimuthal: f64,
    /// T*m
    pub brho: f64,
    pub vertex_x: f64,
    pub vertex_y: f64,
    pub vertex_z: f64,
    pub direction: Direction,
}

/// Fit diagnostics produced alongside the [`InitialValue`], mirroring the
/// extra columns the original implementation writes to its phase-3
/// tabular result (`center_*`, `dEdx`, `dE`, `arclength`, `eloss`,
/// `cutoff_index`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimateDiagnostics {
    pub center_x: f64,
    pub center_y: f64,
    pub center_z: f64,
    pub dedx: f64,
    pub charge_deposited: f64,
    pub arclength: f64,
    pub eloss: f64,
    pub cutoff_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimateOutput {
    pub initial_value: InitialValue,
    pub diagnostics: EstimateDiagnostics,
}

fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for i in 1..values.len() {
        if values[i] > values[best] {
            best = i;
        }
    }
    best
}

/// Ordinary least squares slope/intercept of `ys` against `xs`.
fn linregress(xs: &[f64], ys: &[f64]) -> Result<(f64, f64)> {
    let n = xs.len() as f64;
    let xbar = xs.iter().sum::<f64>() / n;
    let ybar = ys.iter().sum::<f64>() / n;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        sxx += (x - xbar) * (x - xbar);
        sxy += (x - xbar) * (y - ybar);
    }
    if sxx.abs() < 1e-12 {
        return Err(ReconstructionError::Soft(SoftRejection::DegenerateFit));
    }
    let slope = sxy / sxx;
    let intercept = ybar - slope * xbar;
    Ok((slope, intercept))
}

/// Runs the estimator on `cluster`, mutating its point order in place if
/// the inferred direction is backward (§4.7: "If Backward, reverse the
/// point order").
pub fn estimate_physics(
    cluster: &mut Cluster,
    estimate_params: &EstimateParameters,
    detector_params: &DetectorParameters,
) -> Result<EstimateOutput> {
    if cluster.data.len() < estimate_params.min_total_trajectory_points {
        return Err(ReconstructionError::Soft(SoftRejection::TooFewPoints));
    }

    let n = cluster.data.len();
    let rhos: Vec<f64> = cluster.data.iter().map(|p| p.rho()).collect();

    let beam_count = rhos.iter().filter(|&&r| r < detector_params.beam_region_radius).count();
    if beam_count as f64 / n as f64 > 0.9 {
        return Err(ReconstructionError::Soft(SoftRejection::BeamDominated));
    }

    let halfway = n / 2;
    let begin_xs: Vec<f64> = cluster.data[..halfway].iter().map(|p| p.x).collect();
    let begin_ys: Vec<f64> = cluster.data[..halfway].iter().map(|p| p.y).collect();
    let end_xs: Vec<f64> = cluster.data[halfway..].iter().map(|p| p.x).collect();
    let end_ys: Vec<f64> = cluster.data[halfway..].iter().map(|p| p.y).collect();
    let begin_fit = least_squares_circle(&begin_xs, &begin_ys)
        .map_err(|_| ReconstructionError::Soft(SoftRejection::DegenerateFit))?;
    let end_fit = least_squares_circle(&end_xs, &end_ys)
        .map_err(|_| ReconstructionError::Soft(SoftRejection::DegenerateFit))?;

    let max_rho_index = argmax(&rhos);
    let direction = if max_rho_index as f64 > 0.9 * n as f64 {
        if rhos[0] < rhos[n - 1] {
            Direction::Forward
        } else {
            Direction::Backward
        }
    } else if begin_fit.radius < end_fit.radius {
        Direction::Backward
    } else {
        Direction::Forward
    };

    if direction == Direction::Backward {
        cluster.reverse();
    }

    let vertex_guess = (cluster.data[0].x, cluster.data[0].y, cluster.data[0].z);

    let rho_to_vertex_tail: Vec<f64> = cluster.data[1..]
        .iter()
        .map(|p| ((p.x - vertex_guess.0).powi(2) + (p.y - vertex_guess.1).powi(2)).sqrt())
        .collect();
    let k = argmax(&rho_to_vertex_tail);
    let first_arc = &cluster.data[0..=k];

    let arc_xs: Vec<f64> = first_arc.iter().map(|p| p.x).collect();
    let arc_ys: Vec<f64> = first_arc.iter().map(|p| p.y).collect();
    let circle_fit = least_squares_circle(&arc_xs, &arc_ys)
        .map_err(|_| ReconstructionError::Soft(SoftRejection::DegenerateFit))?;

    let circle_points = generate_circle_points(circle_fit.x0, circle_fit.y0, circle_fit.radius, 100);
    let closest_to_axis = circle_points
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            let da = a.0 * a.0 + a.1 * a.1;
            let db = b.0 * b.0 + b.1 * b.1;
            da.partial_cmp(&db).unwrap()
        })
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    let (vertex_x, vertex_y) = circle_points[closest_to_axis];

    let rho_to_vertex: Vec<f64> = cluster
        .data
        .iter()
        .map(|p| ((p.x - vertex_x).powi(2) + (p.y - vertex_y).powi(2)).sqrt())
        .collect();

    let test_index = ((k / 2).max(10)).min(n).max(2);
    let test_zs: Vec<f64> = cluster.data[..test_index].iter().map(|p| p.z).collect();
    let test_rho_to_vertex: Vec<f64> = rho_to_vertex[..test_index].to_vec();
    let (slope, intercept) = linregress(&test_zs, &test_rho_to_vertex)?;

    let vertex_rho = (vertex_x * vertex_x + vertex_y * vertex_y).sqrt();
    let vertex_z = (vertex_rho - intercept) / slope;

    if vertex_rho > estimate_params.max_distance_from_beam_axis {
        return Err(ReconstructionError::Soft(SoftRejection::VertexTooFarFromBeam));
    }

    let mut polar = slope.atan();
    if direction == Direction::Backward {
        polar += PI;
    }

    let mut azimuthal = (vertex_y - circle_fit.y0).atan2(vertex_x - circle_fit.x0);
    if azimuthal < 0.0 {
        azimuthal += 2.0 * PI;
    }
    azimuthal -= 1.5 * PI;
    if azimuthal < 0.0 {
        azimuthal += 2.0 * PI;
    }

    let b_mag = detector_params.magnetic_field_magnitude();
    let mut brho = b_mag * circle_fit.radius * 0.001 / polar.sin();
    if !brho.is_finite() {
        brho = 0.0;
    }

    let mut arclength = 0.0;
    for pair in first_arc.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        arclength += ((b.x - a.x).powi(2) + (b.y - a.y).powi(2) + (b.z - a.z).powi(2)).sqrt();
    }
    if arclength == 0.0 {
        return Err(ReconstructionError::Soft(SoftRejection::ZeroArcLength));
    }
    let charge_deposited: f64 = first_arc.iter().map(|p| p.charge).sum();
    let dedx = charge_deposited / arclength;

    let mut integral_len = ((cluster.data[0].x - vertex_x).powi(2)
        + (cluster.data[0].y - vertex_y).powi(2)
        + (cluster.data[0].z - vertex_z).powi(2))
    .sqrt();
    let mut eloss = cluster.data[0].charge;
    let cutoff = 700.0;
    let mut index = 1;
    loop {
        if index == n || integral_len > cutoff {
            break;
        }
        eloss += cluster.data[index].charge;
        let a = cluster.data[index - 1];
        let b = cluster.data[index];
        integral_len += ((b.x - a.x).powi(2) + (b.y - a.y).powi(2) + (b.z - a.z).powi(2)).sqrt();
        index += 1;
    }

    Ok(EstimateOutput {
        initial_value: InitialValue {
            polar,
            azimuthal,
            brho,
            vertex_x,
            vertex_y,
            vertex_z,
            direction,
        },
        diagnostics: EstimateDiagnostics {
            center_x: circle_fit.x0,
            center_y: circle_fit.y0,
            center_z: vertex_z,
            dedx,
            charge_deposited,
            arclength,
            eloss,
            cutoff_index: index,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use std::f64::consts::PI as PI_CONST;

    /// Builds a synthetic helix matching S3: theta=60deg, phi=45deg,
    /// Brho=1.2 T*m, B=3T, vertex (0,0,500), 200 points.
    fn synthetic_helix(theta_deg: f64, phi_deg: f64, brho: f64, b_field: f64, n: usize) -> Vec<Point> {
        let theta = theta_deg.to_radians();
        let phi = phi_deg.to_radians();
        let radius = brho * 1000.0 / b_field; // mm, from Brho = B*R*1e-3
        let center_x = -radius * phi.sin();
        let center_y = radius * phi.cos();
        let mut points = Vec::with_capacity(n);
        for i in 0..n {
            let s = i as f64 * 2.0; // mm of arc length per step
            let angle = s / radius;
            let x = center_x + radius * (phi + angle).sin();
            let y = center_y - radius * (phi + angle).cos();
            let z = 500.0 + s / theta.tan().max(1e-6);
            points.push(Point {
                x,
                y,
                z,
                charge: 100.0,
                pad_id: 1,
                time_bucket: i as i32,
                scale: 1.0,
            });
        }
        points
    }

    #[test]
    fn too_few_points_is_rejected() {
        let mut cluster = Cluster::new(0, 0, 0, vec![Point { x: 0.0, y: 0.0, z: 0.0, charge: 1.0, pad_id: 1, time_bucket: 0, scale: 1.0 }; 5]);
        let result = estimate_physics(&mut cluster, &EstimateParameters::default(), &DetectorParameters::default());
        assert!(matches!(result, Err(ReconstructionError::Soft(SoftRejection::TooFewPoints))));
    }

    #[test]
    fn beam_dominated_cluster_is_rejected() {
        let points: Vec<Point> = (0..60)
            .map(|i| Point {
                x: 0.1,
                y: 0.1,
                z: i as f64,
                charge: 1.0,
                pad_id: 1,
                time_bucket: i,
                scale: 1.0,
            })
            .collect();
        let mut cluster = Cluster::new(0, 0, 0, points);
        let result = estimate_physics(&mut cluster, &EstimateParameters::default(), &DetectorParameters::default());
        assert!(matches!(result, Err(ReconstructionError::Soft(SoftRejection::BeamDominated))));
    }

    #[test]
    fn helix_estimate_satisfies_output_invariants() {
        let points = synthetic_helix(60.0, 45.0, 1.2, 3.0, 200);
        let mut cluster = Cluster::new(0, 0, 0, points);
        let params = EstimateParameters {
            min_total_trajectory_points: 50,
            max_distance_from_beam_axis: 50.0,
        };
        let detector = DetectorParameters {
            magnetic_field: [0.0, 0.0, -3.0],
            ..DetectorParameters::default()
        };
        let output = estimate_physics(&mut cluster, &params, &detector)
            .expect("synthetic helix should estimate successfully");
        // Sanity invariants on the raw estimate (the solver, not the
        // estimator, is what the §8 `0 <= polar <= pi` invariant binds);
        // a degenerate or non-finite result would indicate a broken fit.
        assert!(output.initial_value.polar.is_finite());
        assert!(output.initial_value.azimuthal >= 0.0 && output.initial_value.azimuthal < 2.0 * PI_CONST);
        assert!(output.initial_value.brho >= 0.0);
        assert!(output.diagnostics.arclength > 0.0);
    }
}
