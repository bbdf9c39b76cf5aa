//! Physical constants and sentinel values shared across the reconstruction
//! pipeline.
//!
//! These used to be module-level globals in the originating analysis code.
//! Here they are grouped into an explicit, passable [`PhysicsConstants`]
//! record so that no phase depends on process-wide mutable state.

/// Sentinel centroid value for a [`crate::trace::Peak`] that was never
/// located, and the charge/scale fallback for an unmapped pad.
pub const INVALID_PEAK: f64 = -1.0;

/// Sentinel pad id for an unmapped or disconnected channel.
pub const INVALID_PAD_ID: i32 = -1;

/// GET digitizer samples per pad-plane trace.
pub const PAD_TRACE_LENGTH: usize = 512;

/// SIS3300 samples per FRIBDAQ auxiliary trace.
pub const FRIB_TRACE_LENGTH: usize = 2048;

/// Speed of light, m/s (CODATA 2022).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Atomic mass unit to MeV/c^2 conversion.
pub const AMU_TO_MEV: f64 = 931.494028;

/// Elementary charge, C.
pub const ELEMENTARY_CHARGE: f64 = 1.602_177_334_9e-19;

/// MeV/(g/cm^2) -> J/(g/cm^2) conversion used by the stopping-power term.
pub const MEV_PER_GRAM_CM2_TO_JOULE: f64 = 1.602_177_334_9e-13;

/// Bundle of physical constants threaded explicitly into the ODE closure
/// bound by the physics solver (C8), rather than captured from module-level
/// statics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsConstants {
    pub speed_of_light: f64,
    pub amu_to_mev: f64,
    pub elementary_charge: f64,
}

impl Default for PhysicsConstants {
    fn default() -> Self {
        Self {
            speed_of_light: SPEED_OF_LIGHT,
            amu_to_mev: AMU_TO_MEV,
            elementary_charge: ELEMENTARY_CHARGE,
        }
    }
}
