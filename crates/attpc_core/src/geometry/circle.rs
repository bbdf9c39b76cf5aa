//! Algebraic least-squares circle fitting (C6).

use crate::error::{ReconstructionError, Result};
use nalgebra::{Matrix2, Vector2};

/// Result of fitting a circle through a set of 2-D points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleFit {
    pub x0: f64,
    pub y0: f64,
    pub radius: f64,
    /// Mean squared deviation of each point's distance-to-center from
    /// `radius`.
    pub residual: f64,
}

/// Fits a circle to `(xs[i], ys[i])` via the Kasa algebraic least-squares
/// method: minimise sum_i (|p_i - c|^2 - r^2)^2 by solving the 2x2 normal
/// equations in centered coordinates.
///
/// Returns an error if fewer than 3 points are given or if the points are
/// (numerically) collinear, in which case the normal-equations matrix is
/// singular.
pub fn least_squares_circle(xs: &[f64], ys: &[f64]) -> Result<CircleFit> {
    if xs.len() != ys.len() {
        return Err(ReconstructionError::DataShape(
            "circle fit x/y slices have different lengths".into(),
        ));
    }
    let n = xs.len();
    if n < 3 {
        return Err(ReconstructionError::DataShape(
            "circle fit requires at least 3 points".into(),
        ));
    }

    let n_f = n as f64;
    let mean_x: f64 = xs.iter().sum::<f64>() / n_f;
    let mean_y: f64 = ys.iter().sum::<f64>() / n_f;

    let mut suu = 0.0;
    let mut svv = 0.0;
    let mut suv = 0.0;
    let mut suuu = 0.0;
    let mut svvv = 0.0;
    let mut suvv = 0.0;
    let mut suuv = 0.0;

    for i in 0..n {
        let u = xs[i] - mean_x;
        let v = ys[i] - mean_y;
        suu += u * u;
        svv += v * v;
        suv += u * v;
        suuu += u * u * u;
        svvv += v * v * v;
        suvv += u * v * v;
        suuv += u * u * v;
    }

    let a = Matrix2::new(suu, suv, suv, svv);
    let rhs = Vector2::new(0.5 * (suuu + suvv), 0.5 * (svvv + suuv));

    let det = a.determinant();
    // A degenerate (collinear) point set drives the centered second
    // moments singular: all points lie on a line through the centroid, so
    // the quadratic form `a` loses rank.
    const SINGULAR_EPS: f64 = 1e-12;
    if det.abs() < SINGULAR_EPS * (suu.abs() + svv.abs() + 1.0).powi(2) {
        return Err(ReconstructionError::Numerical(
            "circle fit is degenerate: points are collinear".into(),
        ));
    }

    let solution = a
        .lu()
        .solve(&rhs)
        .ok_or_else(|| ReconstructionError::Numerical("circle fit normal equations singular".into()))?;
    let uc = solution[0];
    let vc = solution[1];

    let x0 = uc + mean_x;
    let y0 = vc + mean_y;
    let radius_sq = uc * uc + vc * vc + (suu + svv) / n_f;
    let radius = radius_sq.max(0.0).sqrt();

    let mut residual = 0.0;
    for i in 0..n {
        let dx = xs[i] - x0;
        let dy = ys[i] - y0;
        let d = (dx * dx + dy * dy).sqrt() - radius;
        residual += d * d;
    }
    residual /= n_f;

    Ok(CircleFit {
        x0,
        y0,
        radius,
        residual,
    })
}

/// Generates `samples` evenly spaced points on the circle described by
/// `fit`, used by the estimator to re-locate the vertex as the point on
/// the fitted circle closest to the z-axis.
pub fn generate_circle_points(x0: f64, y0: f64, radius: f64, samples: usize) -> Vec<(f64, f64)> {
    let mut points = Vec::with_capacity(samples);
    for i in 0..samples {
        let theta = 2.0 * std::f64::consts::PI * (i as f64) / (samples as f64);
        points.push((x0 + radius * theta.cos(), y0 + radius * theta.sin()));
    }
    points
}
