// SPDX-License-Identifier: AGPL-3.0-only

//! Finite-difference derivative estimates and Hermite segment interpolation.
//!
//! Nodes carry first and second parametric derivatives estimated on a
//! nonuniform 2m+1 stencil (Fornberg weights). Segments interpolate with a
//! Hermite polynomial of degree 2m+1 that reproduces node values and
//! derivatives up to order m at both endpoints.

use crate::padded::PaddedVec;
use crate::Vec3;

/// Finite-difference weights at `x0` on the stencil `xs` for all derivative
/// orders `0..=maxorder` (Fornberg's recurrence).
///
/// Returns `weights[k][j]`: weight of the value at `xs[j]` in the k-th
/// derivative estimate.
#[must_use]
pub fn fd_weights(x0: f64, xs: &[f64], maxorder: usize) -> Vec<Vec<f64>> {
    let n = xs.len();
    let mut c = vec![vec![0.0_f64; n]; maxorder + 1];
    let mut c1 = 1.0;
    let mut c4 = xs[0] - x0;
    c[0][0] = 1.0;
    for i in 1..n {
        let mn = i.min(maxorder);
        let mut c2 = 1.0;
        let c5 = c4;
        c4 = xs[i] - x0;
        for j in 0..i {
            let c3 = xs[i] - xs[j];
            c2 *= c3;
            if j == i - 1 {
                for k in (1..=mn).rev() {
                    c[k][i] = c1 * (k as f64 * c[k - 1][i - 1] - c5 * c[k][i - 1]) / c2;
                }
                c[0][i] = -c1 * c5 * c[0][i - 1] / c2;
            }
            for k in (1..=mn).rev() {
                c[k][j] = (c4 * c[k][j] - k as f64 * c[k - 1][j]) / c3;
            }
            c[0][j] = c4 * c[0][j] / c3;
        }
        c1 = c2;
    }
    c
}

/// First and second parametric derivative estimates at every node from the
/// 2m+1 stencil centred there. Both outputs are padded periodically with
/// zero offset (derivatives are strictly periodic along the curve).
#[must_use]
pub fn derivative_estimates(
    xs: &PaddedVec<Vec3>,
    ts: &PaddedVec<f64>,
    m: usize,
) -> (PaddedVec<Vec3>, PaddedVec<Vec3>) {
    let n = xs.len();
    let pad = xs.pad();
    let mut d1 = PaddedVec::from_vec(vec![Vec3::zeros(); n], pad);
    let mut d2 = PaddedVec::from_vec(vec![Vec3::zeros(); n], pad);
    let mut stencil_t = vec![0.0_f64; 2 * m + 1];
    for i in 0..n as isize {
        for (slot, off) in stencil_t.iter_mut().zip(-(m as isize)..=m as isize) {
            *slot = ts[i + off];
        }
        let w = fd_weights(ts[i], &stencil_t, 2);
        let mut acc1 = Vec3::zeros();
        let mut acc2 = Vec3::zeros();
        for (j, off) in (-(m as isize)..=m as isize).enumerate() {
            let x = xs[i + off];
            acc1 += w[1][j] * x;
            acc2 += w[2][j] * x;
        }
        d1[i] = acc1;
        d2[i] = acc2;
    }
    d1.pad_periodic(Vec3::zeros());
    d2.pad_periodic(Vec3::zeros());
    (d1, d2)
}

/// Hermite interpolation of order `m` on one segment.
///
/// `h` is the parametric segment width, `tau` the normalized coordinate in
/// [0, 1]; `deriv` is the parametric derivative order (0, 1 or 2). End data
/// beyond order `m` is ignored; derivatives beyond the polynomial degree
/// return zero.
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn hermite_evaluate(
    m: usize,
    x0: Vec3,
    x1: Vec3,
    d0: Vec3,
    d1: Vec3,
    dd0: Vec3,
    dd1: Vec3,
    h: f64,
    tau: f64,
    deriv: usize,
) -> Vec3 {
    debug_assert!(deriv <= 2, "derivatives beyond second are not used");
    match m {
        0 => match deriv {
            0 => (1.0 - tau) * x0 + tau * x1,
            1 => (x1 - x0) / h,
            _ => Vec3::zeros(),
        },
        1 => cubic_hermite(x0, x1, d0, d1, h, tau, deriv),
        2 => quintic_hermite(x0, x1, d0, d1, dd0, dd1, h, tau, deriv),
        _ => unreachable!("Hermite order is validated at construction"),
    }
}

fn cubic_hermite(x0: Vec3, x1: Vec3, d0: Vec3, d1: Vec3, h: f64, t: f64, deriv: usize) -> Vec3 {
    let (h00, h10, h01, h11) = match deriv {
        0 => (
            1.0 + t * t * (2.0 * t - 3.0),
            t * (1.0 + t * (t - 2.0)),
            t * t * (3.0 - 2.0 * t),
            t * t * (t - 1.0),
        ),
        1 => (
            6.0 * t * (t - 1.0),
            1.0 + t * (3.0 * t - 4.0),
            6.0 * t * (1.0 - t),
            t * (3.0 * t - 2.0),
        ),
        _ => (
            12.0 * t - 6.0,
            6.0 * t - 4.0,
            6.0 - 12.0 * t,
            6.0 * t - 2.0,
        ),
    };
    let scale = h.powi(-(deriv as i32));
    scale * (h00 * x0 + h01 * x1 + h * (h10 * d0 + h11 * d1))
}

#[allow(clippy::similar_names)]
fn quintic_hermite(
    x0: Vec3,
    x1: Vec3,
    d0: Vec3,
    d1: Vec3,
    dd0: Vec3,
    dd1: Vec3,
    h: f64,
    t: f64,
    deriv: usize,
) -> Vec3 {
    let t2 = t * t;
    let t3 = t2 * t;
    let t4 = t3 * t;
    let t5 = t4 * t;
    let (h0, h1, h2, k0, k1, k2) = match deriv {
        0 => (
            1.0 - 10.0 * t3 + 15.0 * t4 - 6.0 * t5,
            t - 6.0 * t3 + 8.0 * t4 - 3.0 * t5,
            0.5 * t2 - 1.5 * t3 + 1.5 * t4 - 0.5 * t5,
            10.0 * t3 - 15.0 * t4 + 6.0 * t5,
            -4.0 * t3 + 7.0 * t4 - 3.0 * t5,
            0.5 * t3 - t4 + 0.5 * t5,
        ),
        1 => (
            -30.0 * t2 + 60.0 * t3 - 30.0 * t4,
            1.0 - 18.0 * t2 + 32.0 * t3 - 15.0 * t4,
            t - 4.5 * t2 + 6.0 * t3 - 2.5 * t4,
            30.0 * t2 - 60.0 * t3 + 30.0 * t4,
            -12.0 * t2 + 28.0 * t3 - 15.0 * t4,
            1.5 * t2 - 4.0 * t3 + 2.5 * t4,
        ),
        _ => (
            -60.0 * t + 180.0 * t2 - 120.0 * t3,
            -36.0 * t + 96.0 * t2 - 60.0 * t3,
            1.0 - 9.0 * t + 18.0 * t2 - 10.0 * t3,
            60.0 * t - 180.0 * t2 + 120.0 * t3,
            -24.0 * t + 84.0 * t2 - 60.0 * t3,
            3.0 * t - 12.0 * t2 + 10.0 * t3,
        ),
    };
    let scale = h.powi(-(deriv as i32));
    scale
        * (h0 * x0
            + k0 * x1
            + h * (h1 * d0 + k1 * d1)
            + h * h * (h2 * dd0 + k2 * dd1))
}
