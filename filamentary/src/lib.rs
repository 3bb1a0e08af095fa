// SPDX-License-Identifier: AGPL-3.0-only

// Clippy pedantic/nursery + numerics-specific allows are in [workspace.lints.clippy]
// in Cargo.toml. Library code must propagate errors, not panic:
#![deny(clippy::expect_used, clippy::unwrap_used)]
#![warn(missing_docs)]

//! filamentary — quantized vortex filament dynamics in superfluids
//!
//! Integrates the Biot–Savart law for a set of discretized vortex filaments
//! in a triply-periodic (or open) domain, using Ewald-style long/short-range
//! splitting, adaptive filament discretization, and topology-changing
//! reconnections.
//!
//! # Architecture
//!
//! - **`padded`** — ghost-padded sequence container backing all per-node data
//! - **`quadrature`** — Gauss–Legendre rules on [0, 1] for segment integrals
//! - **`cells`** — cell-list / naive neighbor finders over filament segments
//! - **`filament`** — closed curves: finite-difference/Hermite and periodic
//!   B-spline backends, refinement, surgery primitives
//! - **`biotsavart`** — Ewald-split evaluator: desingularized short range via
//!   neighbor lists, long range via Gaussian-gridding NUFFT on a periodic grid
//! - **`reconnection`** — candidate detection and cut/merge surgery engine
//! - **`timestepping`** — explicit RK, IMEX and multirate MRI-GARK schemes
//!   with adaptive timestep, forcing hooks and callbacks
//! - **`forcing`** — external fields, stretching, mutual-friction coupling
//! - **`diagnostics`** — energy, helicity, line length, impulse, spectra
//! - **`snapshot`** — self-describing persisted state (serde JSON)
//! - **`error`** — typed errors for configuration and runtime failure modes
//! - **`tolerances`** — centralized, justified numerical thresholds
//!
//! # Control flow
//!
//! ```text
//! Problem { filaments, params, tspan }
//!   └─ VortexFilamentSolver::new
//!        └─ step(): velocities → advect → fold → reconnect → refine
//!                   → recompute fields → adapt dt → callbacks
//! ```
//!
//! # License
//!
//! AGPL-3.0-only (SPDX identifier at the top of every source file).

/// Ewald-split Biot–Savart evaluator (short range + NUFFT long range + LIA).
pub mod biotsavart;
/// Cell-list and naive neighbor finders over filament segments.
pub mod cells;
/// Observables: kinetic energy, helicity, line length, impulse, spectra.
pub mod diagnostics;
/// Typed errors for configuration, degeneracy and I/O failure modes.
pub mod error;
/// Discretized closed curves and their interpolation backends.
pub mod filament;
/// External velocity/streamfunction fields, stretching, mutual friction.
pub mod forcing;
/// Ghost-padded sequence container for per-node quantities.
pub mod padded;
/// Gauss–Legendre quadrature on the unit interval.
pub mod quadrature;
/// Reconnection candidate detection and cut/merge surgery.
pub mod reconnection;
/// Persisted simulation state (self-describing JSON container).
pub mod snapshot;
/// Explicit RK / IMEX / multirate MRI-GARK time integration.
pub mod timestepping;
/// Centralized, justified numerical thresholds.
pub mod tolerances;

/// Spatial 3-vector used for all positions, velocities and streamfunctions.
pub type Vec3 = nalgebra::Vector3<f64>;

/// Euler–Mascheroni constant γ, entering the LIA logarithm and the
/// Kelvin-wave period.
pub const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

pub use biotsavart::{BiotSavartCache, LongRangeBackend, ParamsBiotSavart, ShortRangeBackend};
pub use error::FilamentaryError;
pub use filament::{DiscretizationMethod, Filament};
pub use timestepping::{Problem, Scheme, SolverOptions, StepStatus, VortexFilamentSolver};
