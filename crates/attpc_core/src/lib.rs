/// `attpc_core` provides the domain algorithms for the AT-TPC
/// charged-particle trajectory reconstruction pipeline: signal
/// extraction, clustering, physics estimation, and ODE-based solving.
/// It is a pure library with no I/O or concurrency of its own; the run
/// driver (`attpc_pipeline`) composes these phases and owns worker
/// scheduling.
///
/// Key components:
/// - **Traits**: `Scalar`, `DynamicalSystem`, `Steppable` -- the same
///   numerical abstractions used for any Runge-Kutta-integrated system.
/// - **Solvers**: `Tsit5` fixed-step Runge-Kutta plus `AdaptiveIntegrator`,
///   the step-size-controlled integrator the physics solver (C8) drives.
/// - **Geometry**: shared spatial primitives (`Point`, `PointCloud`,
///   `Cluster`) and the closed-form circle fitter (C6).
pub mod cluster;
pub mod config;
pub mod constants;
pub mod drift;
pub mod error;
pub mod estimator;
pub mod frib;
pub mod geometry;
pub mod nuclear;
pub mod pad_map;
pub mod particle_id;
pub mod pointcloud_builder;
pub mod solver;
pub mod solvers;
pub mod target;
pub mod trace;
pub mod traits;
