use thiserror::Error;

/// Reasons a cluster is rejected by the estimator (C7) without being a bug:
/// the trajectory genuinely does not admit a usable first-order estimate.
///
/// Per the error handling design, a soft failure means "skip the cluster,
/// emit nothing, increment a counter, continue" -- never a panic, never a
/// propagated fatal error.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SoftRejection {
    #[error("cluster has fewer than the minimum required trajectory points")]
    TooFewPoints,
    #[error("more than 90% of cluster points lie within the beam region")]
    BeamDominated,
    #[error("circle fit is degenerate (points are collinear)")]
    DegenerateFit,
    #[error("estimate produced a non-finite value")]
    NonFiniteResult,
    #[error("first arc has zero arc length")]
    ZeroArcLength,
    #[error("reconstructed vertex lies too far from the beam axis")]
    VertexTooFarFromBeam,
}

/// Top-level error type for `attpc_core`.
///
/// Fatal kinds (`Config`, `DataShape`) are meant to abort the run they
/// occur in; `Soft` is meant to be caught at the phase boundary and turned
/// into a counter increment plus a `tracing::debug!` event.
#[derive(Debug, Error)]
pub enum ReconstructionError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unexpected data shape: {0}")]
    DataShape(String),

    #[error("cluster rejected: {0}")]
    Soft(#[from] SoftRejection),

    #[error("numerical error: {0}")]
    Numerical(String),
}

pub type Result<T> = std::result::Result<T, ReconstructionError>;
