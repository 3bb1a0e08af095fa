// SPDX-License-Identifier: AGPL-3.0-only

//! Discretized closed vortex filaments.
//!
//! A [`Filament`] owns its node positions, chord-length parametric knots,
//! periodic offset and interpolation coefficients. Two interpolation
//! backends are supported behind [`DiscretizationMethod`]: finite-difference
//! derivative estimates paired with Hermite segment polynomials, and
//! periodic B-splines (cubic or quintic) with control points from a cyclic
//! banded collocation solve.
//!
//! Invariants maintained here:
//! - knots are strictly increasing over the visible range and satisfy
//!   `t[i+N] = t[i] + T` in the ghost slots;
//! - positions satisfy `X[i+N] = X[i] + Δ` with the filament's offset `Δ`;
//! - after any mutation of positions or node count,
//!   [`Filament::update_coefficients`] must run before evaluating between
//!   nodes or querying derivatives.

pub mod finitediff;
pub mod refinement;
pub mod spline;

pub use refinement::{RefinementCriterion, RefinementOutcome};

use crate::error::FilamentaryError;
use crate::padded::PaddedVec;
use crate::tolerances::KNOT_INCREMENT_FLOOR;
use crate::Vec3;

/// Interpolation/discretization backend of a filament.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscretizationMethod {
    /// Finite-difference derivative estimates on a 2m+1 stencil, paired
    /// with Hermite interpolation of order `m` ∈ {0, 1, 2}.
    FiniteDifference(usize),
    /// Periodic cubic B-spline (order 4).
    CubicSpline,
    /// Periodic quintic B-spline (order 6).
    QuinticSpline,
}

impl DiscretizationMethod {
    /// Ghost-pad width required by stencils and spline windows.
    #[must_use]
    pub fn pad(&self) -> usize {
        match self {
            Self::FiniteDifference(m) => (*m).max(1),
            Self::CubicSpline => 3,
            Self::QuinticSpline => 5,
        }
    }

    /// Minimum node count below which a filament is degenerate.
    #[must_use]
    pub fn min_nodes(&self) -> usize {
        match self {
            Self::FiniteDifference(m) => (2 * m + 1).max(3),
            Self::CubicSpline => 3,
            Self::QuinticSpline => 5,
        }
    }

    fn spline_order(&self) -> Option<usize> {
        match self {
            Self::CubicSpline => Some(4),
            Self::QuinticSpline => Some(6),
            Self::FiniteDifference(_) => None,
        }
    }
}

#[derive(Clone, Debug)]
enum Coefficients {
    /// Piecewise-linear (finite differences of order 0): no derived data.
    Linear,
    /// Per-node parametric derivative estimates.
    Hermite {
        d1: PaddedVec<Vec3>,
        d2: PaddedVec<Vec3>,
    },
    /// Spline control points in the shifted de Boor labelling.
    Spline { cps: PaddedVec<Vec3> },
}

/// A closed curve discretized by nodes, with periodic offset `Δ` such that
/// `X[i+N] − X[i] = Δ` (zero for an isolated loop, non-zero for an infinite
/// line threading a periodic box).
#[derive(Clone, Debug)]
pub struct Filament {
    xs: PaddedVec<Vec3>,
    ts: PaddedVec<f64>,
    offset: Vec3,
    period: f64,
    method: DiscretizationMethod,
    coefs: Coefficients,
}

impl Filament {
    /// Construct from node positions; computes knots and interpolation
    /// coefficients so that all invariants hold on return.
    ///
    /// # Errors
    /// [`FilamentaryError::DegenerateFilament`] if too few nodes for the
    /// method; [`FilamentaryError::SplineSolve`] if the collocation system
    /// is singular.
    pub fn new(
        points: Vec<Vec3>,
        method: DiscretizationMethod,
        offset: Vec3,
    ) -> Result<Self, FilamentaryError> {
        if let DiscretizationMethod::FiniteDifference(m) = method {
            if m > 2 {
                return Err(FilamentaryError::InvalidParameter {
                    name: "hermite_order",
                    value: m as f64,
                });
            }
        }
        let required = method.min_nodes();
        if points.len() < required {
            return Err(FilamentaryError::DegenerateFilament {
                nodes: points.len(),
                required,
            });
        }
        let pad = method.pad();
        let n = points.len();
        let mut f = Self {
            xs: PaddedVec::from_vec(points, pad),
            ts: PaddedVec::from_vec(vec![0.0; n], pad),
            offset,
            period: 0.0,
            method,
            coefs: Coefficients::Linear,
        };
        f.recompute_knots();
        f.update_coefficients()?;
        Ok(f)
    }

    /// Sample a closed parametric curve at `n` equispaced parameters in
    /// [0, 1) and build a filament from the samples. For curves threading a
    /// periodic box, `offset` is the displacement over one parametric period.
    ///
    /// # Errors
    /// Same failure modes as [`Filament::new`].
    pub fn from_curve<F: Fn(f64) -> Vec3>(
        n: usize,
        method: DiscretizationMethod,
        offset: Vec3,
        curve: F,
    ) -> Result<Self, FilamentaryError> {
        let points = (0..n).map(|i| curve(i as f64 / n as f64)).collect();
        Self::new(points, method, offset)
    }

    /// Number of nodes (equals the number of segments of a closed curve).
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.xs.len()
    }

    /// Number of segments.
    #[must_use]
    pub fn num_segments(&self) -> usize {
        self.xs.len()
    }

    /// Discretization backend.
    #[must_use]
    pub fn method(&self) -> DiscretizationMethod {
        self.method
    }

    /// Periodic offset `Δ`.
    #[must_use]
    pub fn offset(&self) -> Vec3 {
        self.offset
    }

    /// Total parametric period `T = t[N] − t[0]`.
    #[must_use]
    pub fn parametric_period(&self) -> f64 {
        self.period
    }

    /// Visible node positions.
    #[must_use]
    pub fn nodes(&self) -> &[Vec3] {
        self.xs.as_slice()
    }

    /// Node position at a (possibly ghost) logical index.
    #[must_use]
    pub fn node(&self, i: isize) -> Vec3 {
        self.xs[i]
    }

    /// Node position at an arbitrary wrapped index `q ≥ 0`, applying the
    /// periodic offset once per full turn. Unlike [`Filament::node`] this is
    /// not limited to the ghost-pad width.
    #[must_use]
    pub fn node_wrapped(&self, q: usize) -> Vec3 {
        let n = self.num_nodes();
        let turns = (q / n) as f64;
        self.xs[(q % n) as isize] + turns * self.offset
    }

    /// Parametric knot at a (possibly ghost) logical index.
    #[must_use]
    pub fn knot(&self, i: isize) -> f64 {
        self.ts[i]
    }

    /// Overwrite the position of visible node `i`. Ghosts, knots and
    /// coefficients are stale afterwards; call
    /// [`Filament::commit_geometry`] before evaluating.
    pub fn set_node(&mut self, i: usize, value: Vec3) {
        self.xs[i as isize] = value;
    }

    /// Insert a node after node `seg` (i.e. inside segment `seg`).
    /// Stale afterwards; call [`Filament::commit_geometry`].
    pub fn insert_node(&mut self, seg: usize, value: Vec3) {
        self.xs.insert(seg + 1, value);
    }

    /// Remove visible node `i`.
    /// Stale afterwards; call [`Filament::commit_geometry`].
    pub fn remove_node(&mut self, i: usize) {
        let _ = self.xs.remove(i);
    }

    /// Recompute knots and coefficients after node mutations.
    ///
    /// # Errors
    /// [`FilamentaryError::DegenerateFilament`] if the node count dropped
    /// below the method minimum; [`FilamentaryError::SplineSolve`] on a
    /// singular collocation system.
    pub fn commit_geometry(&mut self) -> Result<(), FilamentaryError> {
        if !self.check_nodes() {
            return Err(FilamentaryError::DegenerateFilament {
                nodes: self.num_nodes(),
                required: self.method.min_nodes(),
            });
        }
        self.recompute_knots();
        self.update_coefficients()
    }

    /// Non-degeneracy predicate: enough nodes for the method.
    #[must_use]
    pub fn check_nodes(&self) -> bool {
        self.num_nodes() >= self.method.min_nodes()
    }

    /// Chord-length (arc-length-proportional) knot recomputation.
    ///
    /// Collapsed chords are floored at a tiny increment so the knots remain
    /// strictly increasing; such segments are targets for node removal.
    fn recompute_knots(&mut self) {
        let n = self.num_nodes();
        let pad = self.method.pad();
        self.xs.pad_periodic(self.offset);
        if self.ts.len() != n {
            self.ts = PaddedVec::from_vec(vec![0.0; n], pad);
        }
        let mut acc = 0.0;
        for i in 0..n {
            self.ts[i as isize] = acc;
            let chord = (self.xs[i as isize + 1] - self.xs[i as isize]).norm();
            acc += chord.max(KNOT_INCREMENT_FLOOR);
        }
        self.period = acc;
        self.ts.pad_periodic(acc);
    }

    /// Recompute interpolation coefficients from current nodes and knots.
    ///
    /// # Errors
    /// [`FilamentaryError::SplineSolve`] if the collocation solve fails.
    pub fn update_coefficients(&mut self) -> Result<(), FilamentaryError> {
        self.xs.pad_periodic(self.offset);
        self.coefs = match self.method {
            DiscretizationMethod::FiniteDifference(0) => Coefficients::Linear,
            DiscretizationMethod::FiniteDifference(m) => {
                let (d1, d2) = finitediff::derivative_estimates(&self.xs, &self.ts, m);
                Coefficients::Hermite { d1, d2 }
            }
            DiscretizationMethod::CubicSpline | DiscretizationMethod::QuinticSpline => {
                let order = match self.method.spline_order() {
                    Some(k) => k,
                    None => unreachable!(),
                };
                let cps = spline::solve_control_points(&self.xs, &self.ts, self.offset, order)?;
                Coefficients::Spline { cps }
            }
        };
        Ok(())
    }

    /// Curve position (`deriv == 0`) or `deriv`-th parametric derivative at
    /// normalized coordinate `zeta ∈ [0, 1]` inside segment `seg`.
    #[must_use]
    pub fn evaluate(&self, seg: usize, zeta: f64, deriv: usize) -> Vec3 {
        let i = seg as isize;
        let t0 = self.ts[i];
        let h = self.ts[i + 1] - t0;
        match &self.coefs {
            Coefficients::Linear => {
                let z = Vec3::zeros();
                finitediff::hermite_evaluate(
                    0,
                    self.xs[i],
                    self.xs[i + 1],
                    z,
                    z,
                    z,
                    z,
                    h,
                    zeta,
                    deriv,
                )
            }
            Coefficients::Hermite { d1, d2 } => {
                // endpoints reproduce stored node data exactly
                if deriv <= 2 && zeta == 0.0 {
                    return match deriv {
                        0 => self.xs[i],
                        1 => d1[i],
                        _ => d2[i],
                    };
                }
                if deriv <= 2 && zeta == 1.0 {
                    return match deriv {
                        0 => self.xs[i + 1],
                        1 => d1[i + 1],
                        _ => d2[i + 1],
                    };
                }
                let m = match self.method {
                    DiscretizationMethod::FiniteDifference(m) => m,
                    _ => unreachable!(),
                };
                finitediff::hermite_evaluate(
                    m,
                    self.xs[i],
                    self.xs[i + 1],
                    d1[i],
                    d1[i + 1],
                    d2[i],
                    d2[i + 1],
                    h,
                    zeta,
                    deriv,
                )
            }
            Coefficients::Spline { cps } => {
                let order = match self.method.spline_order() {
                    Some(k) => k,
                    None => unreachable!(),
                };
                spline::de_boor(order, cps, &self.ts, seg, zeta.mul_add(h, t0), deriv)
            }
        }
    }

    /// Evaluate at an open parameter `t` spanning multiple segments: the
    /// bracketing segment is located after reducing `t` by whole periods.
    #[must_use]
    pub fn evaluate_global(&self, t: f64, deriv: usize) -> Vec3 {
        let n = self.num_nodes();
        let t0 = self.ts[0];
        let turns = ((t - t0) / self.period).floor();
        let tr = t - turns * self.period;
        // partition point over the visible knots
        let mut lo = 0usize;
        let mut hi = n;
        while hi - lo > 1 {
            let mid = usize::midpoint(lo, hi);
            if self.ts[mid as isize] <= tr {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let h = self.ts[lo as isize + 1] - self.ts[lo as isize];
        let zeta = (tr - self.ts[lo as isize]) / h;
        let inner = self.evaluate(lo, zeta, deriv);
        if deriv == 0 {
            inner + turns * self.offset
        } else {
            inner
        }
    }

    /// Unit tangent t̂ = X′/|X′| at `zeta` inside segment `seg`.
    #[must_use]
    pub fn unit_tangent(&self, seg: usize, zeta: f64) -> Vec3 {
        let d1 = self.evaluate(seg, zeta, 1);
        d1 / d1.norm()
    }

    /// Curvature vector (X″ − (X″·t̂)t̂)/|X′|², pointing toward the centre
    /// of curvature.
    #[must_use]
    pub fn curvature_vector(&self, seg: usize, zeta: f64) -> Vec3 {
        let d1 = self.evaluate(seg, zeta, 1);
        let d2 = self.evaluate(seg, zeta, 2);
        let n2 = d1.norm_squared();
        let that = d1 / n2.sqrt();
        (d2 - d2.dot(&that) * that) / n2
    }

    /// Scalar curvature κ = |curvature vector|.
    #[must_use]
    pub fn curvature_scalar(&self, seg: usize, zeta: f64) -> f64 {
        self.curvature_vector(seg, zeta).norm()
    }

    /// Smallest inter-node chord length.
    #[must_use]
    pub fn minimum_node_distance(&self) -> f64 {
        (0..self.num_nodes() as isize)
            .map(|i| (self.xs[i + 1] - self.xs[i]).norm())
            .fold(f64::INFINITY, f64::min)
    }

    /// Smallest knot increment.
    #[must_use]
    pub fn minimum_knot_increment(&self) -> f64 {
        (0..self.num_nodes() as isize)
            .map(|i| self.ts[i + 1] - self.ts[i])
            .fold(f64::INFINITY, f64::min)
    }

    /// Arc length by per-segment Gauss–Legendre quadrature.
    #[must_use]
    pub fn filament_length(&self, quad: &crate::quadrature::GaussLegendre) -> f64 {
        (0..self.num_segments())
            .map(|seg| {
                let h = self.ts[seg as isize + 1] - self.ts[seg as isize];
                h * quad.integrate(|zeta| self.evaluate(seg, zeta, 1).norm())
            })
            .sum()
    }

    /// Recentre the filament into the fundamental cell `[0, L)` of the
    /// periodic axes by one rigid integer-period translation (chosen from
    /// the barycentre), preserving the offset `Δ` and the curve geometry.
    /// Returns whether any node moved; if so, coefficients have been
    /// translated consistently and remain valid.
    pub fn fold_periodic(&mut self, periods: [f64; 3]) -> bool {
        let n = self.num_nodes();
        let mut bary = Vec3::zeros();
        for x in self.xs.iter() {
            bary += *x;
        }
        bary /= n as f64;
        let mut shift = Vec3::zeros();
        for axis in 0..3 {
            let period = periods[axis];
            if period.is_finite() {
                shift[axis] = -period * (bary[axis] / period).floor();
            }
        }
        if shift.norm_squared() == 0.0 {
            return false;
        }
        for i in 0..n {
            let moved = self.xs[i as isize] + shift;
            self.xs[i as isize] = moved;
        }
        self.xs.pad_periodic(self.offset);
        // knots are translation-invariant; control points translate rigidly
        if let Coefficients::Spline { cps } = &mut self.coefs {
            for i in 0..cps.len() {
                let moved = cps[i as isize] + shift;
                cps[i as isize] = moved;
            }
            cps.pad_periodic(self.offset);
        }
        true
    }

    // ═══════════════════════════════════════════════════════════════
    // Surgery primitives
    // ═══════════════════════════════════════════════════════════════

    /// Node lists of the two children of a self-reconnection between
    /// segments `i < j`: child A keeps nodes `i+1..=j`, child B keeps
    /// `j+1..=i+N` (wrapped through the periodic offset).
    #[must_use]
    pub fn split_node_lists(&self, i: usize, j: usize) -> (Vec<Vec3>, Vec<Vec3>) {
        debug_assert!(i < j && j < self.num_nodes());
        let n = self.num_nodes();
        let a: Vec<Vec3> = (i + 1..=j).map(|q| self.node_wrapped(q)).collect();
        let b: Vec<Vec3> = (j + 1..=i + n).map(|q| self.node_wrapped(q)).collect();
        (a, b)
    }

    /// Self-reconnection surgery between segments `i < j`, producing two
    /// filaments. `shift` is the periodic displacement chosen by the
    /// criterion; the children's offsets sum to `Δ + shift`.
    ///
    /// # Errors
    /// [`FilamentaryError::DegenerateFilament`] if either child has too few
    /// nodes for the method.
    pub fn split(
        &self,
        i: usize,
        j: usize,
        shift: Vec3,
    ) -> Result<(Self, Self), FilamentaryError> {
        let (a, b) = self.split_node_lists(i, j);
        let fa = Self::new(a, self.method, shift)?;
        let fb = Self::new(b, self.method, self.offset)?;
        Ok((fa, fb))
    }

    /// Node list and offset of the merge of `self` (cut after node `i`)
    /// with `other` (entered at node `j+1`, traversed one full turn,
    /// shifted by `shift`).
    #[must_use]
    pub fn merge_node_list(
        &self,
        other: &Self,
        i: usize,
        j: usize,
        shift: Vec3,
    ) -> (Vec<Vec3>, Vec3) {
        let na = self.num_nodes();
        let nb = other.num_nodes();
        let mut nodes = Vec::with_capacity(na + nb);
        for q in 0..=i {
            nodes.push(self.node_wrapped(q));
        }
        for q in j + 1..=j + nb {
            nodes.push(other.node_wrapped(q) + shift);
        }
        for q in i + 1..na {
            nodes.push(self.node_wrapped(q));
        }
        (nodes, self.offset + other.offset)
    }

    /// Other-reconnection surgery: rewires `self` and `other` into a single
    /// filament whose offset is the sum of the parents' offsets.
    ///
    /// # Errors
    /// [`FilamentaryError::DegenerateFilament`] if the merged node count is
    /// below the method minimum (cannot happen for valid parents).
    pub fn merge(
        &self,
        other: &Self,
        i: usize,
        j: usize,
        shift: Vec3,
    ) -> Result<Self, FilamentaryError> {
        let (nodes, offset) = self.merge_node_list(other, i, j, shift);
        Self::new(nodes, self.method, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quadrature::GaussLegendre;
    use std::f64::consts::PI;

    fn ring(n: usize, radius: f64, method: DiscretizationMethod) -> Filament {
        match Filament::from_curve(n, method, Vec3::zeros(), |u| {
            let th = 2.0 * PI * u;
            Vec3::new(radius * th.cos(), radius * th.sin(), 0.0)
        }) {
            Ok(f) => f,
            Err(e) => panic!("ring construction failed: {e}"),
        }
    }

    const METHODS: [DiscretizationMethod; 4] = [
        DiscretizationMethod::FiniteDifference(1),
        DiscretizationMethod::FiniteDifference(2),
        DiscretizationMethod::CubicSpline,
        DiscretizationMethod::QuinticSpline,
    ];

    #[test]
    fn interpolation_reproduces_node_values() {
        for method in METHODS {
            let f = ring(16, 1.0, method);
            for i in 0..16 {
                let at0 = f.evaluate(i, 0.0, 0);
                let at1 = f.evaluate(i, 1.0, 0);
                let next = f.node(i as isize + 1);
                assert!(
                    (at0 - f.node(i as isize)).norm() < 1e-10,
                    "{method:?} seg {i}: f(i,0) != X[i]"
                );
                assert!(
                    (at1 - next).norm() < 1e-10,
                    "{method:?} seg {i}: f(i,1) != X[i+1]"
                );
            }
        }
    }

    #[test]
    fn knots_strictly_increasing_and_periodic() {
        let f = ring(20, 0.8, DiscretizationMethod::CubicSpline);
        for i in 0..20 {
            assert!(f.knot(i + 1) > f.knot(i));
        }
        let period = f.parametric_period();
        assert!(period > 0.0);
        for i in -3isize..3 {
            let wrapped = f.knot(i + 20) - f.knot(i);
            assert!(
                (wrapped - period).abs() < 1e-12,
                "t[i+N] - t[i] must equal the period"
            );
        }
    }

    #[test]
    fn tangent_sum_of_closed_curve_vanishes() {
        // arc-length-weighted tangent sum telescopes to the offset (zero)
        let quad = GaussLegendre::new(4);
        let f = ring(24, 1.3, DiscretizationMethod::CubicSpline);
        let mut sum = Vec3::zeros();
        for seg in 0..f.num_segments() {
            let h = f.knot(seg as isize + 1) - f.knot(seg as isize);
            for (&zeta, &w) in quad.nodes().iter().zip(quad.weights()) {
                sum += w * h * f.evaluate(seg, zeta, 1);
            }
        }
        assert!(sum.norm() < 1e-10, "closed-curve tangent sum {sum:?}");
    }

    #[test]
    fn ring_tangent_and_curvature() {
        let radius = 2.5;
        for method in [
            DiscretizationMethod::FiniteDifference(2),
            DiscretizationMethod::CubicSpline,
            DiscretizationMethod::QuinticSpline,
        ] {
            let f = ring(64, radius, method);
            let that = f.unit_tangent(0, 0.0);
            // tangent at angle 0 points along +y
            assert!(
                (that - Vec3::new(0.0, 1.0, 0.0)).norm() < 1e-2,
                "{method:?}: tangent {that:?}"
            );
            let kappa = f.curvature_scalar(0, 0.0);
            assert!(
                (kappa - 1.0 / radius).abs() < 1e-2 / radius,
                "{method:?}: curvature {kappa} vs {}",
                1.0 / radius
            );
            // curvature vector points toward the axis
            let cv = f.curvature_vector(0, 0.0);
            assert!(cv.x < 0.0, "{method:?}: curvature vector {cv:?}");
        }
    }

    #[test]
    fn filament_length_of_ring() {
        let quad = GaussLegendre::new(4);
        let f = ring(64, 1.0, DiscretizationMethod::CubicSpline);
        let len = f.filament_length(&quad);
        assert!(
            (len - 2.0 * PI).abs() < 1e-3,
            "ring circumference {len} vs {}",
            2.0 * PI
        );
    }

    #[test]
    fn evaluate_global_wraps_periods() {
        let f = ring(16, 1.0, DiscretizationMethod::CubicSpline);
        let period = f.parametric_period();
        let a = f.evaluate_global(0.3, 0);
        let b = f.evaluate_global(0.3 + period, 0);
        assert!((a - b).norm() < 1e-10, "closed ring: {a:?} vs {b:?}");
    }

    #[test]
    fn offset_line_ghost_nodes() {
        let offset = Vec3::new(0.0, 0.0, 2.0 * PI);
        let f = match Filament::from_curve(
            12,
            DiscretizationMethod::CubicSpline,
            offset,
            |u| Vec3::new(0.1 * (2.0 * PI * u).cos(), 0.1 * (2.0 * PI * u).sin(), 2.0 * PI * u),
        ) {
            Ok(f) => f,
            Err(e) => panic!("line construction failed: {e}"),
        };
        let ghost = f.node(12);
        assert!(
            (ghost - (f.node(0) + offset)).norm() < 1e-12,
            "X[N] must equal X[0] + Δ"
        );
        assert!((f.node_wrapped(25) - (f.node(1) + 2.0 * offset)).norm() < 1e-12);
    }

    #[test]
    fn fold_periodic_recentres_and_preserves_offset() {
        let period = 2.0 * PI;
        let mut f = match Filament::from_curve(
            16,
            DiscretizationMethod::CubicSpline,
            Vec3::zeros(),
            |u| {
                let th = 2.0 * PI * u;
                Vec3::new(
                    th.cos().mul_add(1.0, 9.0),
                    th.sin().mul_add(1.0, 3.0),
                    -8.0,
                )
            },
        ) {
            Ok(f) => f,
            Err(e) => panic!("{e}"),
        };
        let before = f.evaluate(3, 0.4, 1);
        let moved = f.fold_periodic([period; 3]);
        assert!(moved);
        for x in f.nodes() {
            for axis in 0..3 {
                assert!(
                    x[axis] >= 0.0 && x[axis] < period,
                    "node {x:?} outside the fundamental cell"
                );
            }
        }
        assert!((f.offset() - Vec3::zeros()).norm() < 1e-15);
        // derivatives are translation-invariant and still valid
        let after = f.evaluate(3, 0.4, 1);
        assert!((before - after).norm() < 1e-12);
        assert!(!f.fold_periodic([period; 3]), "second fold is a no-op");
    }

    #[test]
    fn split_preserves_offsets_and_counts() {
        let f = ring(20, 1.0, DiscretizationMethod::CubicSpline);
        let shift = Vec3::new(0.0, 0.0, 2.0 * PI);
        let (a, b) = match f.split(3, 13, shift) {
            Ok(pair) => pair,
            Err(e) => panic!("split failed: {e}"),
        };
        assert_eq!(a.num_nodes() + b.num_nodes(), 20);
        assert_eq!(a.num_nodes(), 10);
        let total = a.offset() + b.offset();
        assert!(
            (total - (f.offset() + shift)).norm() < 1e-15,
            "children offsets must sum to parent + shift"
        );
    }

    #[test]
    fn split_degenerate_child_is_an_error() {
        let f = ring(12, 1.0, DiscretizationMethod::QuinticSpline);
        // child A would have 2 nodes, below the quintic minimum of 5
        match f.split(3, 5, Vec3::zeros()) {
            Err(FilamentaryError::DegenerateFilament { nodes, required }) => {
                assert_eq!(nodes, 2);
                assert_eq!(required, 5);
            }
            other => panic!("expected degenerate error, got {other:?}"),
        }
    }

    #[test]
    fn merge_concatenates_and_sums_offsets() {
        let fa = ring(12, 1.0, DiscretizationMethod::CubicSpline);
        let fb = ring(10, 0.7, DiscretizationMethod::CubicSpline);
        let shift = Vec3::new(1.0, 0.0, 0.0);
        let merged = match fa.merge(&fb, 4, 7, shift) {
            Ok(m) => m,
            Err(e) => panic!("merge failed: {e}"),
        };
        assert_eq!(merged.num_nodes(), 22);
        assert!((merged.offset() - (fa.offset() + fb.offset())).norm() < 1e-15);
        // traversal order: fa up to node 4, then fb starting at node 8
        assert!((merged.node(0) - fa.node(0)).norm() < 1e-15);
        assert!((merged.node(4) - fa.node(4)).norm() < 1e-15);
        assert!((merged.node(5) - (fb.node(8) + shift)).norm() < 1e-15);
        assert!((merged.node(14) - (fb.node_wrapped(17) + shift)).norm() < 1e-15);
        assert!((merged.node(15) - fa.node(5)).norm() < 1e-15);
    }

    #[test]
    fn insert_and_remove_roundtrip() {
        let mut f = ring(16, 1.0, DiscretizationMethod::CubicSpline);
        let mid = f.evaluate(4, 0.5, 0);
        f.insert_node(4, mid);
        assert!(f.commit_geometry().is_ok());
        assert_eq!(f.num_nodes(), 17);
        assert!((f.node(5) - mid).norm() < 1e-15);
        f.remove_node(5);
        assert!(f.commit_geometry().is_ok());
        assert_eq!(f.num_nodes(), 16);
    }

    #[test]
    fn too_few_nodes_rejected() {
        let points = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        match Filament::new(points, DiscretizationMethod::QuinticSpline, Vec3::zeros()) {
            Err(FilamentaryError::DegenerateFilament { required: 5, .. }) => {}
            other => panic!("expected degeneracy, got {other:?}"),
        }
    }
}
