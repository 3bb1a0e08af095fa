// SPDX-License-Identifier: AGPL-3.0-only

//! Flow observables computed from filament geometry and per-node fields.
//!
//! Node sums use the trapezoidal arc-length weight
//! δℓ\[i\] = (ℓ\[i−1\] + ℓ\[i\])/2, consistent with the chord-length knot
//! parametrization; line integrals that need sub-segment resolution
//! (total length, impulse) use the caller's Gauss–Legendre rule.

use rustfft::num_complex::Complex;

use crate::biotsavart::{BiotSavartCache, ParamsBiotSavart};
use crate::filament::Filament;
use crate::quadrature::GaussLegendre;
use crate::Vec3;

/// Trapezoidal arc-length weight at node `i`.
fn node_weight(f: &Filament, i: usize) -> f64 {
    let prev = (f.node(i as isize) - f.node(i as isize - 1)).norm();
    let next = (f.node(i as isize + 1) - f.node(i as isize)).norm();
    0.5 * (prev + next)
}

/// Total line length of the filament set.
#[must_use]
pub fn total_length(filaments: &[Filament], quad: &GaussLegendre) -> f64 {
    filaments.iter().map(|f| f.filament_length(quad)).sum()
}

/// Hydrodynamic impulse p = (Γ/2) Σ ∮ s × ds.
#[must_use]
pub fn impulse(filaments: &[Filament], quad: &GaussLegendre, circulation: f64) -> Vec3 {
    let mut acc = Vec3::zeros();
    for f in filaments {
        for seg in 0..f.num_segments() {
            let h = f.knot(seg as isize + 1) - f.knot(seg as isize);
            for (&zeta, &w) in quad.nodes().iter().zip(quad.weights()) {
                let s = f.evaluate(seg, zeta, 0);
                let sp = f.evaluate(seg, zeta, 1);
                acc += w * h * s.cross(&sp);
            }
        }
    }
    0.5 * circulation * acc
}

/// Helicity H = Γ Σ ∮ v · ds from the node velocities.
///
/// For a Hopf link of two rings, H/(2Γ²) evaluates to the (signed) linking
/// number.
#[must_use]
pub fn helicity(filaments: &[Filament], velocities: &[Vec<Vec3>], circulation: f64) -> f64 {
    let mut acc = 0.0;
    for (f, vs) in filaments.iter().zip(velocities) {
        for (i, v) in vs.iter().enumerate() {
            let tangent = f.unit_tangent(i, 0.0);
            acc += v.dot(&tangent) * node_weight(f, i);
        }
    }
    circulation * acc
}

/// Kinetic energy of the filament-induced flow.
///
/// Periodic domains use the streamfunction half-sum identity
/// E = Γ/(2V) Σ ∮ ψ · ds; open domains use E = Γ Σ ∮ v · (s × ds).
#[must_use]
pub fn kinetic_energy(
    filaments: &[Filament],
    velocities: &[Vec<Vec3>],
    streamfunctions: &[Vec<Vec3>],
    params: &ParamsBiotSavart,
) -> f64 {
    if let Some(volume) = params.volume() {
        let mut acc = 0.0;
        for (f, psis) in filaments.iter().zip(streamfunctions) {
            for (i, psi) in psis.iter().enumerate() {
                let tangent = f.unit_tangent(i, 0.0);
                acc += psi.dot(&tangent) * node_weight(f, i);
            }
        }
        params.circulation * acc / (2.0 * volume)
    } else {
        let mut acc = 0.0;
        for (f, vs) in filaments.iter().zip(velocities) {
            for (i, v) in vs.iter().enumerate() {
                let s = f.node(i as isize);
                let tangent = f.unit_tangent(i, 0.0);
                acc += v.dot(&s.cross(&tangent)) * node_weight(f, i);
            }
        }
        params.circulation * acc
    }
}

/// Shell-binned energy spectrum from the long-range velocity coefficients
/// of the last evaluation. Returns `(k_centres, E(k))`, or `None` when the
/// domain is open or the long-range field has not been computed.
#[must_use]
pub fn energy_spectrum(cache: &BiotSavartCache) -> Option<(Vec<f64>, Vec<f64>)> {
    let ((vx, vy, vz), grid, periods) = cache.velocity_spectrum()?;
    let dk = 2.0 * std::f64::consts::PI
        / periods.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let kmax_sq: f64 = {
        let mut acc = 0.0;
        for axis in 0..3 {
            let k = (grid[axis] / 2) as f64 * 2.0 * std::f64::consts::PI / periods[axis];
            acc += k * k;
        }
        acc
    };
    let nbins = (kmax_sq.sqrt() / dk).ceil() as usize + 1;
    let mut energy = vec![0.0_f64; nbins];

    let [nx, ny, _] = grid;
    let signed = |g: usize, n: usize| {
        if g < n / 2 {
            g as i64
        } else {
            g as i64 - n as i64
        }
    };
    let half = |v: &Complex<f64>| 0.5 * v.norm_sqr();
    for (idx, ((cx, cy), cz)) in vx.iter().zip(vy).zip(vz).enumerate() {
        let m = [
            signed(idx % nx, nx),
            signed((idx / nx) % ny, ny),
            signed(idx / (nx * ny), grid[2]),
        ];
        let mut k2 = 0.0;
        for axis in 0..3 {
            let k = 2.0 * std::f64::consts::PI * m[axis] as f64 / periods[axis];
            k2 += k * k;
        }
        let bin = (k2.sqrt() / dk).round() as usize;
        if bin < nbins {
            energy[bin] += half(cx) + half(cy) + half(cz);
        }
    }
    let centres = (0..nbins).map(|b| b as f64 * dk).collect();
    Some((centres, energy))
}
