// SPDX-License-Identifier: AGPL-3.0-only

//! Short-range (screened) part of the Ewald-split Biot–Savart evaluator,
//! plus the desingularized local (LIA) term.
//!
//! For a target node x, nearby non-adjacent segments contribute the
//! screened kernels integrated by per-segment Gauss–Legendre quadrature:
//!
//! ```text
//! velocity:        (erfc(αr) + 2αr/√π · e^(−α²r²)) / r³ · (s − x) × ds
//! streamfunction:   erfc(αr) / r · ds
//! ```
//!
//! The two segments adjacent to x are handled analytically by the local
//! induction approximation; their smooth long-range images (already counted
//! by the Fourier path) are subtracted here with the complementary kernels.
//! In open domains there is no Fourier path and the unscreened kernels are
//! integrated over every non-adjacent segment.
//!
//! Parallelization is over target nodes with serial inner accumulation, so
//! reductions are ordered and bitwise reproducible.

use rayon::prelude::*;
use tracing::info_span;

use crate::cells::{minimum_image, SegmentFinder, SegmentId};
use crate::filament::Filament;
use crate::tolerances::{CURVATURE_FLOOR, KERNEL_RADIUS_GUARD};
use crate::Vec3;

use super::ParamsBiotSavart;
use super::VelocityFlags;

const TWO_OVER_SQRT_PI: f64 = 1.128_379_167_095_512_6;

/// Screened short-range velocity kernel multiplier g(αr) with
/// g/r³ the kernel; the unscreened limit is g ≡ 1.
fn velocity_screen(alpha_r: f64) -> f64 {
    libm::erfc(alpha_r) + TWO_OVER_SQRT_PI * alpha_r * (-alpha_r * alpha_r).exp()
}

/// Smooth complement subtracted on adjacent segments.
fn velocity_smooth(alpha_r: f64) -> f64 {
    libm::erf(alpha_r) - TWO_OVER_SQRT_PI * alpha_r * (-alpha_r * alpha_r).exp()
}

/// Per-node accumulation of the short-range and local contributions.
pub(crate) fn accumulate(
    params: &ParamsBiotSavart,
    filaments: &[Filament],
    finder: &SegmentFinder,
    flags: VelocityFlags,
    mut velocities: Option<&mut [Vec<Vec3>]>,
    mut streamfunctions: Option<&mut [Vec<Vec3>]>,
) {
    let _span = info_span!("shortrange::accumulate").entered();
    let prefactor = params.circulation / (4.0 * std::f64::consts::PI);

    for (fi, f) in filaments.iter().enumerate() {
        let results: Vec<(Vec3, Vec3)> = (0..f.num_nodes())
            .into_par_iter()
            .map(|i| node_contribution(params, filaments, finder, flags, fi, f, i))
            .collect();
        if let Some(out) = velocities.as_mut() {
            for (slot, (v, _)) in out[fi].iter_mut().zip(&results) {
                *slot += prefactor * v;
            }
        }
        if let Some(out) = streamfunctions.as_mut() {
            for (slot, (_, psi)) in out[fi].iter_mut().zip(&results) {
                *slot += prefactor * psi;
            }
        }
    }
}

/// Short-range + local (velocity, streamfunction) sums at node `i` of
/// filament `fi`, without the Γ/4π prefactor.
fn node_contribution(
    params: &ParamsBiotSavart,
    filaments: &[Filament],
    finder: &SegmentFinder,
    flags: VelocityFlags,
    fi: usize,
    f: &Filament,
    i: usize,
) -> (Vec3, Vec3) {
    let x = f.node(i as isize);
    let n = f.num_nodes();
    let periodic = params.is_periodic();
    let alpha = params.alpha;
    let rcut = params.rcut;
    let quad = &params.quad_short;

    let mut vel = Vec3::zeros();
    let mut psi = Vec3::zeros();

    if flags.shortrange {
        finder.for_each_segment_near(x, |SegmentId { filament, segment }| {
            let g = &filaments[filament];
            let adjacent =
                filament == fi && (segment == i || segment == (i + n - 1) % n);
            let h = g.knot(segment as isize + 1) - g.knot(segment as isize);
            if adjacent {
                if !periodic {
                    return;
                }
                // remove the smooth image of the local segments, which the
                // Fourier path counts but the LIA term replaces
                for (&zeta, &w) in quad.nodes().iter().zip(quad.weights()) {
                    let s = g.evaluate(segment, zeta, 0);
                    let sp = g.evaluate(segment, zeta, 1);
                    let r = minimum_image(s - x, params.periods);
                    let rn = r.norm();
                    if rn < KERNEL_RADIUS_GUARD {
                        continue;
                    }
                    let wv = w * h;
                    vel -= wv * velocity_smooth(alpha * rn) / (rn * rn * rn) * r.cross(&sp);
                    psi -= wv * libm::erf(alpha * rn) / rn * sp;
                }
            } else {
                for (&zeta, &w) in quad.nodes().iter().zip(quad.weights()) {
                    let s = g.evaluate(segment, zeta, 0);
                    let sp = g.evaluate(segment, zeta, 1);
                    let r = minimum_image(s - x, params.periods);
                    let rn = r.norm();
                    if rn < KERNEL_RADIUS_GUARD {
                        continue;
                    }
                    if periodic && rn > rcut {
                        continue;
                    }
                    let wv = w * h;
                    let (kv, kpsi) = if periodic {
                        (
                            velocity_screen(alpha * rn) / (rn * rn * rn),
                            libm::erfc(alpha * rn) / rn,
                        )
                    } else {
                        (1.0 / (rn * rn * rn), 1.0 / rn)
                    };
                    vel += wv * kv * r.cross(&sp);
                    psi += wv * kpsi * sp;
                }
            }
        });
    }

    if flags.local {
        let (lv, lpsi) = local_terms(params, f, i);
        vel += lv;
        psi += lpsi;
    }

    (vel, psi)
}

/// Local induction approximation at node `i`, without the Γ/4π prefactor.
///
/// The excluded region of the line integral is the two adjacent segments,
/// so the LIA logarithm uses their geometric-mean length:
///
/// ```text
/// v_local = (ln(2√(ℓ₋ℓ₊)/a) − Δ − 1/2) · (s′ × s″)/|s′|³
/// ψ_local = 2·(ln(2√(ℓ₋ℓ₊)/a) + 1/2 − Δ) · t̂
/// ```
///
/// With this variant the segment-length dependence cancels against the
/// non-adjacent sums and the composed velocity converges to the thin-core
/// ring result Γ/(4πR)·(ln(8R/a) − Δ − 1/2).
fn local_terms(params: &ParamsBiotSavart, f: &Filament, i: usize) -> (Vec3, Vec3) {
    let d1 = f.evaluate(i, 0.0, 1);
    let d2 = f.evaluate(i, 0.0, 2);
    let n1 = d1.norm();
    let binormal = d1.cross(&d2) / (n1 * n1 * n1);
    let kappa = binormal.norm();

    let ell_minus = (f.node(i as isize) - f.node(i as isize - 1)).norm();
    let ell_plus = (f.node(i as isize + 1) - f.node(i as isize)).norm();
    let log_term = (2.0 * (ell_minus * ell_plus).sqrt() / params.core_radius).ln();

    let mut vel = Vec3::zeros();
    if kappa > CURVATURE_FLOOR {
        let beta = log_term - params.core_parameter - 0.5;
        vel = beta * binormal;
    }

    let coeff = 2.0 * (log_term + 0.5 - params.core_parameter);
    let psi = coeff * (d1 / n1);

    (vel, psi)
}
