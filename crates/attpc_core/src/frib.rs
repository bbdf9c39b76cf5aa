//! Ion-chamber (FRIBDAQ) auxiliary event analysis (SPEC_FULL.md item 1):
//! reuses the C2 trace analyzer on the fast-digitizer channels, then
//! applies a silicon-coincidence veto to pick the "good" ion-chamber
//! peak and derive a GET time-bucket correction.

use crate::config::FribParameters;
use crate::trace::{analyze_trace, Peak};

pub const IC_COLUMN: usize = 0;
pub const MESH_COLUMN: usize = 1;
pub const SI_COLUMN: usize = 2;

/// SIS3300 module sampling frequency, MHz.
pub const SAMPLING_FREQUENCY_MHZ: f64 = 12.5;

/// Silicon-coincidence window, ns (time-bucket units of the FRIB clock).
const COINCIDENCE_WINDOW: f64 = 50.0;

/// One FRIBDAQ channel's analyzed trace.
#[derive(Debug, Clone)]
pub struct FribTrace {
    pub peaks: Vec<Peak>,
}

/// An event from the FRIBDAQ system: ion chamber, silicon, and mesh
/// traces, baseline-removed and peak-found with the same C2 pipeline
/// used for pad-plane traces.
#[derive(Debug, Clone)]
pub struct FribEvent {
    pub traces: Vec<FribTrace>,
}

impl FribEvent {
    /// Builds a `FribEvent` from the raw `(2048, n_channels)` matrix,
    /// given column-major channel data.
    pub fn from_columns(columns: &[Vec<f64>], params: &FribParameters) -> Self {
        let trace_params = crate::trace::TraceAnalysisParams {
            baseline_window_scale: params.baseline_window_scale,
            height: params.height,
            prominence: params.prominence,
            separation: params.separation,
        };
        let traces = columns
            .iter()
            .map(|col| FribTrace {
                peaks: analyze_trace(col, &trace_params).peaks,
            })
            .collect();
        Self { traces }
    }

    pub fn ic_trace(&self) -> &FribTrace {
        &self.traces[IC_COLUMN]
    }

    pub fn si_trace(&self) -> &FribTrace {
        &self.traces[SI_COLUMN]
    }

    pub fn mesh_trace(&self) -> &FribTrace {
        &self.traces[MESH_COLUMN]
    }

    /// Finds the "good" ion-chamber peak: one that is not in time
    /// coincidence with any silicon peak (vetoing un-reacted beam
    /// triggers), subject to an overall multiplicity gate. Returns
    /// `None` if no ion-chamber peaks exist, or the good-peak count
    /// exceeds `params.ic_multiplicity`.
    pub fn good_ic_peak(&self, params: &FribParameters) -> Option<(usize, Peak)> {
        let ic_peaks = &self.ic_trace().peaks;
        let si_peaks = &self.si_trace().peaks;

        if ic_peaks.is_empty() {
            return None;
        }
        if si_peaks.is_empty() {
            return if ic_peaks.len() == 1 {
                Some((1, ic_peaks[0]))
            } else {
                None
            };
        }

        let mut good_count = 0;
        let mut good_index = None;
        for (idx, ic) in ic_peaks.iter().enumerate() {
            let coincident = si_peaks
                .iter()
                .any(|si| (ic.centroid - si.centroid).abs() < COINCIDENCE_WINDOW);
            if !coincident {
                good_count += 1;
                good_index = Some(idx);
            }
        }

        if good_count == 0 || good_count > params.ic_multiplicity {
            None
        } else {
            good_index.map(|idx| (good_count, ic_peaks[idx]))
        }
    }

    /// GET time-bucket correction derived from the good ion-chamber
    /// peak's centroid vs. the earliest ion-chamber peak, scaled by the
    /// ratio of GET-to-FRIB sampling frequency.
    pub fn correct_ic_time(&self, good_peak: &Peak, get_frequency_mhz: f64) -> f64 {
        let earliest = self
            .ic_trace()
            .peaks
            .iter()
            .min_by(|a, b| a.centroid.partial_cmp(&b.centroid).unwrap())
            .copied()
            .unwrap_or_default();
        (good_peak.centroid - earliest.centroid) * get_frequency_mhz / SAMPLING_FREQUENCY_MHZ
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column_with_peak(centroid: usize, amplitude: f64) -> Vec<f64> {
        let mut samples = vec![0.0; 2048];
        samples[centroid] = amplitude;
        samples
    }

    #[test]
    fn single_ic_peak_with_no_si_is_good() {
        let columns = vec![
            column_with_peak(500, 100.0),
            vec![0.0; 2048],
            vec![0.0; 2048],
        ];
        let params = FribParameters {
            height: 50.0,
            prominence: 0.0,
            separation: 1,
            ..FribParameters::default()
        };
        let event = FribEvent::from_columns(&columns, &params);
        let good = event.good_ic_peak(&params);
        assert!(good.is_some());
        assert_eq!(good.unwrap().0, 1);
    }

    #[test]
    fn ic_peak_coincident_with_si_is_vetoed() {
        let columns = vec![
            column_with_peak(500, 100.0),
            vec![0.0; 2048],
            column_with_peak(510, 80.0),
        ];
        let params = FribParameters {
            height: 50.0,
            prominence: 0.0,
            separation: 1,
            ic_multiplicity: 1,
            ..FribParameters::default()
        };
        let event = FribEvent::from_columns(&columns, &params);
        assert!(event.good_ic_peak(&params).is_none());
    }

    #[test]
    fn no_ic_peaks_returns_none() {
        let columns = vec![vec![0.0; 2048], vec![0.0; 2048], vec![0.0; 2048]];
        let params = FribParameters::default();
        let event = FribEvent::from_columns(&columns, &params);
        assert!(event.good_ic_peak(&params).is_none());
    }
}
