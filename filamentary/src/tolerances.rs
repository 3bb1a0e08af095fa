// SPDX-License-Identifier: AGPL-3.0-only

//! Centralized, justified numerical thresholds.
//!
//! Every tolerance used by library guards or by the integration tests lives
//! here with its justification, so a change to a threshold is a reviewable,
//! one-line diff rather than a magic number scattered across call sites.

// ═══════════════════════════════════════════════════════════════════
// Ewald evaluator
// ═══════════════════════════════════════════════════════════════════

/// Agreement of `full` node velocities between two admissible Ewald α values.
///
/// The splitting is exact up to short-range truncation exp(−(α·rcut)²) and
/// NUFFT tolerance. For α·rcut ≥ 4 both are below 1e-7; 1e-4 relative leaves
/// two orders of margin for node-level cancellation.
pub const EWALD_ALPHA_INVARIANCE_REL: f64 = 1e-4;

/// Cell-list vs naive backend: relative node-velocity difference.
///
/// Both enumerate the same pairs; only summation order differs, so the
/// residual is O(Nseg · eps · v). 1e-7 is conservative at test sizes.
pub const BACKEND_VELOCITY_REL: f64 = 1e-7;

/// NUFFT vs exact Fourier sum: relative node-streamfunction difference.
///
/// The streamfunction kernel decays as 1/k² (velocity as 1/k), so spectral
/// truncation noise is relatively larger; 1e-5 matches the spreading-width
/// defaults below.
pub const BACKEND_STREAMFUNCTION_REL: f64 = 1e-5;

/// Default NUFFT requested tolerance.
pub const NUFFT_TOLERANCE: f64 = 1e-8;

/// Relative radius below which two quadrature points are treated as
/// coincident and their pair contribution skipped. Guards the 1/r³ kernel
/// against a target node lying exactly on a source quadrature point.
pub const KERNEL_RADIUS_GUARD: f64 = 1e-12;

// ═══════════════════════════════════════════════════════════════════
// Filament geometry
// ═══════════════════════════════════════════════════════════════════

/// Curvature below this is treated as a straight segment: the LIA velocity
/// κ·(ln(2/aκ) + …) → 0 smoothly, so zeroing it below 1e-12 changes nothing
/// at f64 precision while avoiding ln(∞).
pub const CURVATURE_FLOOR: f64 = 1e-12;

/// Minimum admissible knot increment. Chord-length parametrization keeps
/// increments at physical segment lengths; an increment this small means two
/// nodes have collapsed and the filament needs refinement or removal.
pub const KNOT_INCREMENT_FLOOR: f64 = 1e-14;

/// Interpolation must reproduce node values at segment endpoints to
/// round-off: both Hermite and de Boor evaluation at a knot reduce to the
/// collocation identity, so 1e-10 absolute (on O(1) coordinates) is ample.
pub const INTERPOLATION_NODE_ABS: f64 = 1e-10;

/// Generic guard against division by a vanishing denominator.
pub const DIVISION_GUARD: f64 = 1e-300;

// ═══════════════════════════════════════════════════════════════════
// Dynamics scenarios (integration tests)
// ═══════════════════════════════════════════════════════════════════

/// Vortex-ring velocity vs the thin-core formula
/// v = Γ/(4πR)·(ln(8R/a) − Δ − 1/2).
///
/// The formula holds in open space; in a 2π-periodic box with R = L/6 the
/// nearest image rings shift the translation velocity by O(ΓR²/L³) ≈ 1%.
/// 2e-2 covers the image correction plus discretization (N=32, cubic).
pub const RING_VELOCITY_REL: f64 = 2e-2;

/// Ring translation over a short RK4 integration vs the evaluator's own
/// initial velocity times elapsed time. Self-consistency of the stepper:
/// the ring velocity is constant to O(image corrections), so 1e-3 bounds
/// the integration error comfortably.
pub const RING_TRANSLATION_REL: f64 = 1e-3;

/// Hopf-link helicity H/(2Γ²) vs the linking number. Node-quadrature
/// helicity converges with the discretization; 5e-2 at N = 48 per ring.
pub const HELICITY_REL: f64 = 5e-2;

/// Axial momentum drift for leapfrogging ring pairs, relative to the
/// initial impulse, over hundreds of steps. The schemes conserve impulse to
/// discretization error; 1e-5 is the acceptance bound from the scenario.
pub const MOMENTUM_DRIFT_REL: f64 = 1e-5;

/// Reconnection length accounting: |L_before − L_after − L_lost| relative
/// to L_before. Surgery only removes the two rewired chords, both measured
/// by the same quadrature, so this closes to quadrature error.
pub const RECONNECTION_LENGTH_REL: f64 = 1e-10;
