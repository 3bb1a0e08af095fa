// SPDX-License-Identifier: AGPL-3.0-only

//! Time-integration schemes and their coefficient tables.
//!
//! Explicit Runge–Kutta schemes carry classic Butcher tableaus. The
//! multirate MRI-GARK schemes advance the fast component (LIA or full
//! short-range) through each outer stage with inner substeps, forcing the
//! fast ODE with an affine-in-τ combination of the slow stage velocities
//! with coefficients `Γ⁰[i][k] + τ·Γ¹[i][k]`; the tables satisfy the
//! consistency conditions Σ_k Γ⁰[i][k] = Δc[i] and Σ_k Γ¹[i][k] = 0.

/// Time-integration scheme selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheme {
    /// Forward Euler (1 stage).
    Euler,
    /// Explicit midpoint (2 stages).
    Midpoint,
    /// Classic fourth-order Runge–Kutta (4 stages).
    RK4,
    /// Semi-implicit Euler split: the fast term is iterated to a fixed
    /// point within the stage, the slow term is explicit.
    IMEXEuler {
        /// Fixed-point sweeps on the fast term.
        sweeps: usize,
    },
    /// Third-order multirate MRI-GARK with `substeps` fast steps per outer
    /// stage.
    MriGark33 {
        /// Fast substeps per outer stage.
        substeps: usize,
    },
    /// Fourth-order five-stage multirate MRI-GARK.
    MriGark45 {
        /// Fast substeps per outer stage.
        substeps: usize,
    },
}

impl Scheme {
    /// Whether the scheme needs the fast/slow velocity split.
    #[must_use]
    pub fn uses_fast_slow_split(&self) -> bool {
        matches!(
            self,
            Self::IMEXEuler { .. } | Self::MriGark33 { .. } | Self::MriGark45 { .. }
        )
    }

    /// Whether the scheme subcycles an inner fast integrator.
    #[must_use]
    pub fn is_multirate(&self) -> bool {
        matches!(self, Self::MriGark33 { .. } | Self::MriGark45 { .. })
    }
}

/// Explicit Butcher tableau (lower-triangular `a`).
pub(crate) struct ButcherTableau {
    pub a: &'static [&'static [f64]],
    pub b: &'static [f64],
    pub c: &'static [f64],
}

pub(crate) const EULER: ButcherTableau = ButcherTableau {
    a: &[&[]],
    b: &[1.0],
    c: &[0.0],
};

pub(crate) const MIDPOINT: ButcherTableau = ButcherTableau {
    a: &[&[], &[0.5]],
    b: &[0.0, 1.0],
    c: &[0.0, 0.5],
};

pub(crate) const RK4: ButcherTableau = ButcherTableau {
    a: &[&[], &[0.5], &[0.0, 0.5], &[0.0, 0.0, 1.0]],
    b: &[1.0 / 6.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 6.0],
    c: &[0.0, 0.5, 0.5, 1.0],
};

/// Multirate coupling tables.
pub(crate) struct MriTableau {
    /// Outer stage widths Δc[i] (sum to 1).
    pub dc: &'static [f64],
    /// Constant coupling coefficients.
    pub gamma0: &'static [&'static [f64]],
    /// Linear-in-τ coupling coefficients.
    pub gamma1: &'static [&'static [f64]],
}

/// Third-order three-stage table (δ = −1/2 member of the MRI-GARK-ERK
/// family).
pub(crate) const MRI_GARK_33: MriTableau = MriTableau {
    dc: &[1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0],
    gamma0: &[
        &[1.0 / 3.0, 0.0, 0.0],
        &[-1.0 / 3.0, 2.0 / 3.0, 0.0],
        &[0.0, -2.0 / 3.0, 1.0],
    ],
    gamma1: &[
        &[0.0, 0.0, 0.0],
        &[0.0, 0.0, 0.0],
        &[0.5, -0.5, 0.0],
    ],
};

/// Fourth-order five-stage table.
pub(crate) const MRI_GARK_45: MriTableau = MriTableau {
    dc: &[0.2, 0.2, 0.2, 0.2, 0.2],
    gamma0: &[
        &[0.2, 0.0, 0.0, 0.0, 0.0],
        &[-0.2, 0.4, 0.0, 0.0, 0.0],
        &[0.0, -0.2, 0.4, 0.0, 0.0],
        &[0.0, 0.0, -0.2, 0.4, 0.0],
        &[0.1, 0.0, 0.0, -0.3, 0.4],
    ],
    gamma1: &[
        &[0.0, 0.0, 0.0, 0.0, 0.0],
        &[0.4, -0.4, 0.0, 0.0, 0.0],
        &[0.0, 0.4, -0.4, 0.0, 0.0],
        &[0.0, 0.0, 0.4, -0.4, 0.0],
        &[-0.1, 0.0, 0.0, 0.5, -0.4],
    ],
};
