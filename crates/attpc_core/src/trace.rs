//! Trace analyzer (C2): baseline removal and peak finding on a 1-D
//! digitized signal.

use crate::constants::INVALID_PEAK;
use rustfft::{num_complex::Complex64, FftPlanner};
use serde::{Deserialize, Serialize};

/// One detected pulse in a 1-D trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub centroid: f64,
    pub amplitude: f64,
    pub positive_inflection: i32,
    pub negative_inflection: i32,
    pub integral: f64,
}

impl Default for Peak {
    fn default() -> Self {
        Self {
            centroid: INVALID_PEAK,
            amplitude: 0.0,
            positive_inflection: -1,
            negative_inflection: -1,
            integral: 0.0,
        }
    }
}

/// Parameters controlling baseline removal and peak finding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceAnalysisParams {
    /// Scale `w` of the Fourier low-pass baseline filter.
    pub baseline_window_scale: f64,
    pub height: f64,
    pub prominence: f64,
    pub separation: usize,
}

impl Default for TraceAnalysisParams {
    fn default() -> Self {
        Self {
            baseline_window_scale: 20.0,
            height: 20.0,
            prominence: 10.0,
            separation: 10,
        }
    }
}

/// A single digitized trace: its baseline-removed samples plus the
/// [`Peak`]s detected on it. Immutable after construction.
#[derive(Debug, Clone)]
pub struct Trace {
    pub samples: Vec<f64>,
    pub peaks: Vec<Peak>,
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        let px = std::f64::consts::PI * x;
        px.sin() / px
    }
}

/// Builds the windowed sinc low-pass filter of length `n`, shifted so its
/// peak sits at index 0 (the Rust analogue of `np.fft.ifftshift`).
fn sinc_filter(n: usize, window_scale: f64) -> Vec<f64> {
    let half = n as f64 / 2.0;
    let mut unshifted = vec![0.0; n];
    for (k, value) in unshifted.iter_mut().enumerate() {
        let idx = k as f64 - half;
        *value = sinc(idx / window_scale);
    }
    let mut shifted = vec![0.0; n];
    for k in 0..n {
        shifted[k] = unshifted[(k + n / 2) % n];
    }
    shifted
}

/// Removes the estimated baseline from `raw` via the Fourier low-pass
/// method (§4.2 steps 1-4): edge-smooth, mask peaks out of a baseline
/// estimate, low-pass filter that estimate, then subtract it from the
/// (edge-smoothed) original.
pub fn remove_baseline(raw: &[f64], window_scale: f64) -> Vec<f64> {
    let n = raw.len();
    if n < 4 {
        return raw.to_vec();
    }

    let mut smoothed = raw.to_vec();
    smoothed[0] = smoothed[1];
    smoothed[n - 1] = smoothed[n - 2];

    let mean = smoothed.iter().sum::<f64>() / n as f64;
    let variance = smoothed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    let sigma = variance.sqrt();

    let mut masked: Vec<bool> = vec![false; n];
    for i in 0..n {
        masked[i] = smoothed[i] - mean > sigma * 1.5;
    }
    let unmasked_mean = {
        let (sum, count) = smoothed
            .iter()
            .zip(masked.iter())
            .filter(|(_, m)| !**m)
            .fold((0.0, 0usize), |(s, c), (v, _)| (s + v, c + 1));
        if count == 0 {
            mean
        } else {
            sum / count as f64
        }
    };

    let mut baseline_estimate: Vec<f64> = smoothed.clone();
    for i in 0..n {
        if masked[i] {
            baseline_estimate[i] = unmasked_mean;
        }
    }

    let filter = sinc_filter(n, window_scale);

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let ifft = planner.plan_fft_inverse(n);

    let mut buffer: Vec<Complex64> = baseline_estimate
        .iter()
        .map(|v| Complex64::new(*v, 0.0))
        .collect();
    fft.process(&mut buffer);

    for (value, &f) in buffer.iter_mut().zip(filter.iter()) {
        *value *= f;
    }

    ifft.process(&mut buffer);
    let n_f = n as f64;
    let baseline: Vec<f64> = buffer.iter().map(|c| c.re / n_f).collect();

    smoothed
        .iter()
        .zip(baseline.iter())
        .map(|(s, b)| s - b)
        .collect()
}

/// Finds local maxima above `params.height`, enforcing a minimum
/// `separation` between accepted peaks and a minimum `prominence`, and
/// computes each peak's flanking inflection points, trapezoidal integral,
/// and sub-sample interpolated centroid.
pub fn find_peaks(samples: &[f64], params: &TraceAnalysisParams) -> Vec<Peak> {
    let n = samples.len();
    if n < 3 {
        return Vec::new();
    }

    let mut candidates: Vec<usize> = Vec::new();
    for i in 1..n - 1 {
        if samples[i] >= params.height && samples[i] > samples[i - 1] && samples[i] >= samples[i + 1]
        {
            candidates.push(i);
        }
    }

    // Greedy separation enforcement: accept candidates from highest
    // amplitude to lowest, skipping any within `separation` samples of an
    // already-accepted peak.
    let mut order = candidates.clone();
    order.sort_by(|&a, &b| samples[b].partial_cmp(&samples[a]).unwrap());
    let mut accepted: Vec<usize> = Vec::new();
    for idx in order {
        if accepted
            .iter()
            .all(|&a| (a as i64 - idx as i64).unsigned_abs() as usize >= params.separation)
        {
            accepted.push(idx);
        }
    }
    accepted.sort_unstable();

    let mut peaks = Vec::new();
    for idx in accepted {
        let (left_min, right_min) = local_bounding_minima(samples, idx);
        let base = left_min.max(right_min);
        let prominence = samples[idx] - base;
        if prominence < params.prominence {
            continue;
        }

        let positive_inflection = find_inflection_left(samples, idx);
        let negative_inflection = find_inflection_right(samples, idx);
        let integral = trapezoidal_integral(samples, positive_inflection, negative_inflection);
        let centroid = parabolic_centroid(samples, idx);

        peaks.push(Peak {
            centroid,
            amplitude: samples[idx],
            positive_inflection: positive_inflection as i32,
            negative_inflection: negative_inflection as i32,
            integral,
        });
    }

    peaks
}

/// Scans outward from `peak_idx` in both directions until a sample
/// exceeds the peak (or a boundary is hit), tracking the lowest value
/// seen along the way -- the standard topographic-prominence base.
fn local_bounding_minima(samples: &[f64], peak_idx: usize) -> (f64, f64) {
    let peak_val = samples[peak_idx];

    let mut left_min = peak_val;
    let mut i = peak_idx;
    while i > 0 {
        i -= 1;
        left_min = left_min.min(samples[i]);
        if samples[i] > peak_val {
            break;
        }
    }

    let mut right_min = peak_val;
    let mut j = peak_idx;
    while j + 1 < samples.len() {
        j += 1;
        right_min = right_min.min(samples[j]);
        if samples[j] > peak_val {
            break;
        }
    }

    (left_min, right_min)
}

/// First local minimum to the left of the peak (the rising-edge
/// inflection bound).
fn find_inflection_left(samples: &[f64], peak_idx: usize) -> usize {
    let mut i = peak_idx;
    while i > 0 && samples[i - 1] <= samples[i] {
        i -= 1;
    }
    i
}

/// First local minimum to the right of the peak (the falling-edge
/// inflection bound).
fn find_inflection_right(samples: &[f64], peak_idx: usize) -> usize {
    let mut i = peak_idx;
    while i + 1 < samples.len() && samples[i + 1] <= samples[i] {
        i += 1;
    }
    i
}

fn trapezoidal_integral(samples: &[f64], start: usize, end: usize) -> f64 {
    if end <= start {
        return 0.0;
    }
    let mut total = 0.0;
    for i in start..end {
        total += 0.5 * (samples[i] + samples[i + 1]);
    }
    total
}

/// Quadratic (parabolic) interpolation of the true peak location using
/// the peak sample and its two neighbours.
fn parabolic_centroid(samples: &[f64], idx: usize) -> f64 {
    if idx == 0 || idx + 1 >= samples.len() {
        return idx as f64;
    }
    let left = samples[idx - 1];
    let center = samples[idx];
    let right = samples[idx + 1];
    let denom = left - 2.0 * center + right;
    if denom.abs() < 1e-12 {
        return idx as f64;
    }
    let offset = 0.5 * (left - right) / denom;
    idx as f64 + offset
}

/// Runs the full baseline-removal + peak-finding pipeline on a single
/// trace. Pure function: identical inputs always yield identical output.
pub fn analyze_trace(raw: &[f64], params: &TraceAnalysisParams) -> Trace {
    let samples = remove_baseline(raw, params.baseline_window_scale);
    let peaks = find_peaks(&samples, params);
    Trace { samples, peaks }
}

/// Batch variant: analyzes each column of a `(T, N)` matrix independently.
/// Guaranteed equivalent to calling [`analyze_trace`] once per column.
pub fn analyze_batch(columns: &[Vec<f64>], params: &TraceAnalysisParams) -> Vec<Trace> {
    columns.iter().map(|col| analyze_trace(col, params)).collect()
}
