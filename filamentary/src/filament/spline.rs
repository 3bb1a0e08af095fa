// SPDX-License-Identifier: AGPL-3.0-only

//! Periodic B-spline interpolation of closed curves.
//!
//! Node positions are interpolated by a periodic B-spline of order `k`
//! (k = 4 cubic, k = 6 quintic) over the chord-length knots. Control points
//! are obtained once per mutation from the cyclic banded collocation system
//! (bandwidth (k−2)/2, solved by a banded LU plus a Woodbury correction for
//! the wrap-around corners). Evaluation runs de Boor's algorithm; parametric
//! derivatives use the spline derivative recurrence.

use crate::error::FilamentaryError;
use crate::padded::PaddedVec;
use crate::Vec3;

/// Largest supported spline order (quintic).
pub const MAX_ORDER: usize = 6;

const PIVOT_FLOOR: f64 = 1e-300;

/// All `k` B-spline basis values of order `k` at `x` in span `span`
/// (NURBS-book `BasisFuns`). `out[r]` is `N_{span−k+1+r, k}(x)`.
fn basis_funs(k: usize, span: isize, x: f64, ts: &PaddedVec<f64>, out: &mut [f64]) {
    let pdeg = k - 1;
    let mut left = [0.0_f64; MAX_ORDER];
    let mut right = [0.0_f64; MAX_ORDER];
    out[0] = 1.0;
    for j in 1..=pdeg {
        left[j] = x - ts[span + 1 - j as isize];
        right[j] = ts[span + j as isize] - x;
        let mut saved = 0.0;
        for r in 0..j {
            let temp = out[r] / (right[r + 1] + left[j - r]);
            out[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        out[j] = saved;
    }
}

/// Value or `deriv`-th parametric derivative of the spline at `x` inside
/// segment `seg` (de Boor, with the derivative recurrence applied first).
pub(crate) fn de_boor(
    k: usize,
    cps: &PaddedVec<Vec3>,
    ts: &PaddedVec<f64>,
    seg: usize,
    x: f64,
    deriv: usize,
) -> Vec3 {
    if deriv >= k {
        return Vec3::zeros();
    }
    let s = seg as isize;
    let ki = k as isize;
    let mshift = ki / 2;
    let mut d: Vec<Vec3> = (0..k)
        .map(|r| cps[s - ki + 1 + r as isize + mshift])
        .collect();

    let mut ord = k;
    let mut lo = 0usize;
    for _ in 0..deriv {
        let degree = (ord - 1) as f64;
        for r in ((lo + 1)..k).rev() {
            let j = s - ki + 1 + r as isize;
            let denom = ts[j + ord as isize - 1] - ts[j];
            d[r] = degree * (d[r] - d[r - 1]) / denom;
        }
        lo += 1;
        ord -= 1;
    }

    for level in 1..ord {
        for r in ((lo + level)..k).rev() {
            let j = s - ki + 1 + r as isize;
            let denom = ts[j + (ord - level) as isize] - ts[j];
            let alpha = (x - ts[j]) / denom;
            d[r] = (1.0 - alpha) * d[r - 1] + alpha * d[r];
        }
    }
    d[k - 1]
}

/// Control points of the periodic interpolating spline of order `k`.
///
/// Returned in the shifted labelling used by [`de_boor`], padded with the
/// filament's geometric offset.
///
/// # Errors
/// [`FilamentaryError::SplineSolve`] if the collocation matrix is
/// numerically singular (collapsed knots).
pub(crate) fn solve_control_points(
    xs: &PaddedVec<Vec3>,
    ts: &PaddedVec<f64>,
    offset: Vec3,
    k: usize,
) -> Result<PaddedVec<Vec3>, FilamentaryError> {
    let n = xs.len();
    let pdeg = k - 1;
    let p = (k - 2) / 2;
    let mshift = k / 2;
    let width = 2 * p + 1;

    let mut band = vec![0.0_f64; n * width];
    let mut wraps: Vec<(usize, usize, f64)> = Vec::new();
    let mut rhs_adjust = vec![Vec3::zeros(); n];
    let mut basis = [0.0_f64; MAX_ORDER];

    for i in 0..n {
        basis_funs(k, i as isize, ts[i as isize], ts, &mut basis[..k]);
        // r = pdeg has exactly zero weight at a knot; skip it so the band
        // offsets stay within ±p
        for (r, &val) in basis.iter().enumerate().take(pdeg) {
            let q = i as isize - pdeg as isize + r as isize + mshift as isize;
            if q >= 0 && (q as usize) < n {
                let d = q - i as isize;
                band[i * width + (p as isize + d) as usize] = val;
            } else if q < 0 {
                let col = (q + n as isize) as usize;
                wraps.push((i, col, val));
                rhs_adjust[i] += val * offset;
            } else {
                let col = (q - n as isize) as usize;
                wraps.push((i, col, val));
                rhs_adjust[i] -= val * offset;
            }
        }
    }

    let solver = PeriodicBandSolver::new(n, p, band, &wraps)?;
    let mut components = [vec![0.0; n], vec![0.0; n], vec![0.0; n]];
    for axis in 0..3 {
        let rhs: Vec<f64> = (0..n)
            .map(|i| xs[i as isize][axis] + rhs_adjust[i][axis])
            .collect();
        components[axis] = solver.solve(&rhs);
    }

    let values: Vec<Vec3> = (0..n)
        .map(|i| Vec3::new(components[0][i], components[1][i], components[2][i]))
        .collect();
    let mut cps = PaddedVec::from_vec(values, pdeg);
    cps.pad_periodic(offset);
    Ok(cps)
}

// ═══════════════════════════════════════════════════════════════════
// Cyclic banded solver: banded LU + Woodbury corner correction
// ═══════════════════════════════════════════════════════════════════

struct BandedLu {
    n: usize,
    p: usize,
    band: Vec<f64>,
}

impl BandedLu {
    fn width(&self) -> usize {
        2 * self.p + 1
    }

    fn at(&self, row: usize, col: usize) -> f64 {
        let d = col as isize - row as isize + self.p as isize;
        self.band[row * self.width() + d as usize]
    }

    fn at_mut(&mut self, row: usize, col: usize) -> &mut f64 {
        let w = self.width();
        let d = col as isize - row as isize + self.p as isize;
        &mut self.band[row * w + d as usize]
    }

    fn factor(n: usize, p: usize, band: Vec<f64>) -> Result<Self, FilamentaryError> {
        let mut lu = Self { n, p, band };
        for k in 0..n {
            let pivot = lu.at(k, k);
            if pivot.abs() < PIVOT_FLOOR {
                return Err(FilamentaryError::SplineSolve);
            }
            for r in k + 1..=(k + p).min(n - 1) {
                let l = lu.at(r, k) / pivot;
                *lu.at_mut(r, k) = l;
                for c in k + 1..=(k + p).min(n - 1) {
                    let update = l * lu.at(k, c);
                    *lu.at_mut(r, c) -= update;
                }
            }
        }
        Ok(lu)
    }

    fn solve_in_place(&self, rhs: &mut [f64]) {
        let (n, p) = (self.n, self.p);
        for k in 0..n {
            for r in k + 1..=(k + p).min(n - 1) {
                rhs[r] -= self.at(r, k) * rhs[k];
            }
        }
        for k in (0..n).rev() {
            let mut s = rhs[k];
            for c in k + 1..=(k + p).min(n - 1) {
                s -= self.at(k, c) * rhs[c];
            }
            rhs[k] = s / self.at(k, k);
        }
    }
}

/// Tiny dense LU with partial pivoting for the Woodbury capacitance matrix
/// (dimension at most 2p = 4).
struct DenseLu {
    dim: usize,
    a: Vec<f64>,
    piv: Vec<usize>,
}

impl DenseLu {
    fn factor(dim: usize, mut a: Vec<f64>) -> Result<Self, FilamentaryError> {
        let mut piv = vec![0usize; dim];
        for k in 0..dim {
            let mut best = k;
            for r in k + 1..dim {
                if a[r * dim + k].abs() > a[best * dim + k].abs() {
                    best = r;
                }
            }
            piv[k] = best;
            if best != k {
                for c in 0..dim {
                    a.swap(k * dim + c, best * dim + c);
                }
            }
            let pivot = a[k * dim + k];
            if pivot.abs() < PIVOT_FLOOR {
                return Err(FilamentaryError::SplineSolve);
            }
            for r in k + 1..dim {
                let l = a[r * dim + k] / pivot;
                a[r * dim + k] = l;
                for c in k + 1..dim {
                    let update = l * a[k * dim + c];
                    a[r * dim + c] -= update;
                }
            }
        }
        Ok(Self { dim, a, piv })
    }

    fn solve_in_place(&self, rhs: &mut [f64]) {
        let dim = self.dim;
        for k in 0..dim {
            rhs.swap(k, self.piv[k]);
            for r in k + 1..dim {
                rhs[r] -= self.a[r * dim + k] * rhs[k];
            }
        }
        for k in (0..dim).rev() {
            let mut s = rhs[k];
            for c in k + 1..dim {
                s -= self.a[k * dim + c] * rhs[c];
            }
            rhs[k] = s / self.a[k * dim + k];
        }
    }
}

struct PeriodicBandSolver {
    lu: BandedLu,
    corner_rows: Vec<usize>,
    corner_vals: Vec<Vec<(usize, f64)>>,
    z: Vec<Vec<f64>>,
    cap: DenseLu,
}

impl PeriodicBandSolver {
    fn new(
        n: usize,
        p: usize,
        band: Vec<f64>,
        wraps: &[(usize, usize, f64)],
    ) -> Result<Self, FilamentaryError> {
        let lu = BandedLu::factor(n, p, band)?;

        let mut corner_rows: Vec<usize> = wraps.iter().map(|w| w.0).collect();
        corner_rows.sort_unstable();
        corner_rows.dedup();
        let corner_vals: Vec<Vec<(usize, f64)>> = corner_rows
            .iter()
            .map(|&row| {
                wraps
                    .iter()
                    .filter(|w| w.0 == row)
                    .map(|w| (w.1, w.2))
                    .collect()
            })
            .collect();

        let q = corner_rows.len();
        let mut z = Vec::with_capacity(q);
        for &row in &corner_rows {
            let mut col = vec![0.0; n];
            col[row] = 1.0;
            lu.solve_in_place(&mut col);
            z.push(col);
        }

        // capacitance C = I + Vᵀ Z
        let mut cap = vec![0.0; q * q];
        for (alpha, vals) in corner_vals.iter().enumerate() {
            for beta in 0..q {
                let dot: f64 = vals.iter().map(|&(c, v)| v * z[beta][c]).sum();
                cap[alpha * q + beta] = if alpha == beta { dot + 1.0 } else { dot };
            }
        }
        let cap = DenseLu::factor(q, cap)?;

        Ok(Self {
            lu,
            corner_rows,
            corner_vals,
            z,
            cap,
        })
    }

    fn solve(&self, rhs: &[f64]) -> Vec<f64> {
        let mut y = rhs.to_vec();
        self.lu.solve_in_place(&mut y);
        let q = self.corner_rows.len();
        if q == 0 {
            return y;
        }
        let mut s: Vec<f64> = self
            .corner_vals
            .iter()
            .map(|vals| vals.iter().map(|&(c, v)| v * y[c]).sum())
            .collect();
        self.cap.solve_in_place(&mut s);
        for (beta, w) in s.iter().enumerate() {
            for (yi, zi) in y.iter_mut().zip(&self.z[beta]) {
                *yi -= w * zi;
            }
        }
        y
    }
}
