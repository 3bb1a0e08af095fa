// SPDX-License-Identifier: AGPL-3.0-only

//! Long-range (smooth) part of the Ewald-split Biot–Savart evaluator.
//!
//! Filament vorticity w(x) = Γ ∮ δ(x − s) s′ dζ is deposited in Fourier
//! space on a periodic grid, either by a Gaussian-gridding NUFFT (type 1:
//! spread onto an oversampled grid, FFT, deconvolve) or by an exact direct
//! sum over modes. The spectrum is multiplied by the Ewald-smoothed
//! Biot–Savart kernels
//!
//! ```text
//! ψ̂(k) = ŵ(k) · exp(−k²/4α²) / k²        (zero mean mode)
//! v̂(k) = i k × ψ̂(k)
//! ```
//!
//! and transformed back to the filament nodes (type 2). The velocity
//! spectrum of the last evaluation is retained for the energy-spectrum
//! diagnostic.

use rayon::prelude::*;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;
use tracing::{info_span, warn};

use crate::error::FilamentaryError;
use crate::filament::Filament;
use crate::quadrature::GaussLegendre;
use crate::Vec3;

/// Long-range deposition/interpolation backend.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LongRangeBackend {
    /// Direct O(Nk · Nq) Fourier sums. Reference backend for tests.
    ExactSum,
    /// Gaussian-gridding nonuniform FFT.
    Nufft {
        /// Requested relative accuracy (drives the convergence warning).
        tolerance: f64,
        /// Spreading half-width in grid points per side.
        support: usize,
        /// Oversampling factor σ of the spreading grid.
        oversampling: usize,
    },
}

/// One source sample on a filament: position folded into the box, and the
/// vector-valued quadrature weight Γ · w · Δt · X′.
struct Source {
    theta: [f64; 3],
    weight: Vec3,
}

struct AxisPlan {
    /// Physical mode count (grid size along the axis).
    n: usize,
    /// Oversampled grid size.
    ng: usize,
    /// Gaussian spreading variance parameter in θ-space.
    tau: f64,
}

/// Cached state of the long-range evaluator.
pub(crate) struct LongRangeCache {
    grid: [usize; 3],
    periods: [f64; 3],
    alpha: f64,
    backend: LongRangeBackend,
    axes: [AxisPlan; 3],
    fft_fw: [Arc<dyn Fft<f64>>; 3],
    fft_inv: [Arc<dyn Fft<f64>>; 3],
    /// Vorticity spectrum ŵ(k), one vector per mode, layout kx-fastest.
    wk: [Vec<Complex<f64>>; 3],
    /// Velocity spectrum of the last evaluation (for diagnostics).
    vk: [Vec<Complex<f64>>; 3],
}

impl LongRangeCache {
    pub(crate) fn new(
        grid: [usize; 3],
        periods: [f64; 3],
        alpha: f64,
        backend: LongRangeBackend,
    ) -> Result<Self, FilamentaryError> {
        for (axis, &size) in grid.iter().enumerate() {
            if size == 0 || size % 2 != 0 {
                return Err(FilamentaryError::InvalidGridSize { axis, size });
            }
        }
        let (support, oversampling, tolerance) = match backend {
            LongRangeBackend::ExactSum => (0, 2, 0.0),
            LongRangeBackend::Nufft {
                tolerance,
                support,
                oversampling,
            } => (support, oversampling.max(2), tolerance),
        };
        if let LongRangeBackend::Nufft { .. } = backend {
            // Gaussian-gridding accuracy ≈ exp(−π·m_sp·(1 − 1/(2σ−1)))
            let sigma = oversampling as f64;
            let reach = (-std::f64::consts::PI * support as f64 * (1.0 - 1.0 / (2.0 * sigma - 1.0)))
                .exp();
            if reach > tolerance {
                warn!(
                    support,
                    oversampling,
                    tolerance,
                    estimated = reach,
                    "NUFFT spreading support too small for requested tolerance"
                );
            }
        }
        let mut planner = FftPlanner::new();
        let sigma = oversampling.max(2);
        let mk_axis = |n: usize| {
            let ng = sigma * n;
            AxisPlan {
                n,
                ng,
                tau: std::f64::consts::PI * (support.max(1)) as f64
                    / (n as f64 * n as f64 * (sigma as f64) * (sigma as f64 - 0.5)),
            }
        };
        let axes = [mk_axis(grid[0]), mk_axis(grid[1]), mk_axis(grid[2])];
        let fft_fw = [
            planner.plan_fft_forward(axes[0].ng),
            planner.plan_fft_forward(axes[1].ng),
            planner.plan_fft_forward(axes[2].ng),
        ];
        let fft_inv = [
            planner.plan_fft_inverse(axes[0].ng),
            planner.plan_fft_inverse(axes[1].ng),
            planner.plan_fft_inverse(axes[2].ng),
        ];
        let nk = grid[0] * grid[1] * grid[2];
        let zero = vec![Complex::new(0.0, 0.0); nk];
        Ok(Self {
            grid,
            periods,
            alpha,
            backend,
            axes,
            fft_fw,
            fft_inv,
            wk: [zero.clone(), zero.clone(), zero.clone()],
            vk: [zero.clone(), zero.clone(), zero],
        })
    }

    fn num_modes(&self) -> usize {
        self.grid[0] * self.grid[1] * self.grid[2]
    }

    /// Signed mode numbers (mx, my, mz) of a linear mode index.
    fn mode_of(&self, idx: usize) -> [i64; 3] {
        let [nx, ny, _] = self.grid;
        let gx = idx % nx;
        let gy = (idx / nx) % ny;
        let gz = idx / (nx * ny);
        let signed = |g: usize, n: usize| {
            if g < n / 2 {
                g as i64
            } else {
                g as i64 - n as i64
            }
        };
        [
            signed(gx, nx),
            signed(gy, ny),
            signed(gz, self.grid[2]),
        ]
    }

    fn wavevector(&self, m: [i64; 3]) -> Vec3 {
        Vec3::new(
            2.0 * std::f64::consts::PI * m[0] as f64 / self.periods[0],
            2.0 * std::f64::consts::PI * m[1] as f64 / self.periods[1],
            2.0 * std::f64::consts::PI * m[2] as f64 / self.periods[2],
        )
    }

    /// Velocity spectrum of the last evaluation (kx-fastest layout), with
    /// the signed mode numbers recoverable via the grid dimensions.
    pub(crate) fn velocity_spectrum(&self) -> (&[Complex<f64>], &[Complex<f64>], &[Complex<f64>]) {
        (&self.vk[0], &self.vk[1], &self.vk[2])
    }

    pub(crate) fn grid(&self) -> [usize; 3] {
        self.grid
    }

    pub(crate) fn periods(&self) -> [f64; 3] {
        self.periods
    }

    /// Deposit vorticity, apply the smoothed kernels, and add the
    /// long-range velocity/streamfunction to the node outputs.
    pub(crate) fn accumulate(
        &mut self,
        filaments: &[Filament],
        circulation: f64,
        quad: &GaussLegendre,
        mut velocities: Option<&mut [Vec<Vec3>]>,
        mut streamfunctions: Option<&mut [Vec<Vec3>]>,
    ) {
        let _span = info_span!("longrange::accumulate").entered();
        let sources = gather_sources(filaments, circulation, quad, self.periods);
        self.deposit(&sources);

        // smoothed Biot-Savart kernels in k-space
        let inv_4a2 = 1.0 / (4.0 * self.alpha * self.alpha);
        let nk = self.num_modes();
        let mut psik = [
            vec![Complex::new(0.0, 0.0); nk],
            vec![Complex::new(0.0, 0.0); nk],
            vec![Complex::new(0.0, 0.0); nk],
        ];
        let modes: Vec<usize> = (0..nk).collect();
        let psi_rows: Vec<([Complex<f64>; 3], [Complex<f64>; 3])> = modes
            .par_iter()
            .map(|&idx| {
                let m = self.mode_of(idx);
                let k = self.wavevector(m);
                let k2 = k.norm_squared();
                if k2 == 0.0 {
                    return ([Complex::new(0.0, 0.0); 3], [Complex::new(0.0, 0.0); 3]);
                }
                let filter = (-k2 * inv_4a2).exp() / k2;
                let w = [self.wk[0][idx], self.wk[1][idx], self.wk[2][idx]];
                let psi = [w[0] * filter, w[1] * filter, w[2] * filter];
                // v = i k × ψ
                let i = Complex::new(0.0, 1.0);
                let v = [
                    i * (k.y * psi[2] - k.z * psi[1]),
                    i * (k.z * psi[0] - k.x * psi[2]),
                    i * (k.x * psi[1] - k.y * psi[0]),
                ];
                (psi, v)
            })
            .collect();
        for (idx, (psi, v)) in psi_rows.into_iter().enumerate() {
            for c in 0..3 {
                psik[c][idx] = psi[c];
                self.vk[c][idx] = v[c];
            }
        }

        if let Some(out) = velocities.take() {
            let vk = self.vk.clone();
            self.interpolate_to_nodes(filaments, &vk, out);
        }
        if let Some(out) = streamfunctions.take() {
            self.interpolate_to_nodes(filaments, &psik, out);
        }
    }

    /// Type-1 transform: source samples → vorticity spectrum `wk`.
    fn deposit(&mut self, sources: &[Source]) {
        match self.backend {
            LongRangeBackend::ExactSum => {
                let volume: f64 = self.periods.iter().product();
                let nk = self.num_modes();
                for c in 0..3 {
                    let column: Vec<Complex<f64>> = (0..nk)
                        .into_par_iter()
                        .map(|idx| {
                            let k = self.wavevector(self.mode_of(idx));
                            let mut acc = Complex::new(0.0, 0.0);
                            for s in sources {
                                let x = Vec3::new(
                                    s.theta[0] * self.periods[0]
                                        / (2.0 * std::f64::consts::PI),
                                    s.theta[1] * self.periods[1]
                                        / (2.0 * std::f64::consts::PI),
                                    s.theta[2] * self.periods[2]
                                        / (2.0 * std::f64::consts::PI),
                                );
                                let phase = -k.dot(&x);
                                acc += s.weight[c] * Complex::new(phase.cos(), phase.sin());
                            }
                            acc / volume
                        })
                        .collect();
                    self.wk[c] = column;
                }
            }
            LongRangeBackend::Nufft { support, .. } => {
                let volume: f64 = self.periods.iter().product();
                for c in 0..3 {
                    let mut grid = self.spread(sources, c, support);
                    self.fft3(&mut grid, true);
                    self.truncate_and_deconvolve(&grid, c, volume);
                }
            }
        }
    }

    /// Gaussian spreading of one weight component onto the oversampled grid.
    fn spread(&self, sources: &[Source], component: usize, support: usize) -> Vec<Complex<f64>> {
        let _span = info_span!("longrange::spread", n = sources.len()).entered();
        let [nx, ny, nz] = [self.axes[0].ng, self.axes[1].ng, self.axes[2].ng];
        let mut grid = vec![Complex::new(0.0, 0.0); nx * ny * nz];
        let m = support as isize;
        let mut wx = vec![0.0_f64; 2 * support + 1];
        let mut wy = vec![0.0_f64; 2 * support + 1];
        let mut wz = vec![0.0_f64; 2 * support + 1];
        for s in sources {
            let mut g0 = [0isize; 3];
            for axis in 0..3 {
                let ax = &self.axes[axis];
                let dtheta = 2.0 * std::f64::consts::PI / ax.ng as f64;
                let nearest = (s.theta[axis] / dtheta).round() as isize;
                g0[axis] = nearest;
                let weights = match axis {
                    0 => &mut wx,
                    1 => &mut wy,
                    _ => &mut wz,
                };
                for (slot, off) in weights.iter_mut().zip(-m..=m) {
                    let theta_g = (nearest + off) as f64 * dtheta;
                    let d = s.theta[axis] - theta_g;
                    *slot = (-d * d / (4.0 * ax.tau)).exp();
                }
            }
            for (iz, &vz) in wz.iter().enumerate() {
                let gz = (g0[2] + iz as isize - m).rem_euclid(nz as isize) as usize;
                for (iy, &vy) in wy.iter().enumerate() {
                    let gy = (g0[1] + iy as isize - m).rem_euclid(ny as isize) as usize;
                    let row = nx * (gy + ny * gz);
                    let vzy = vz * vy * s.weight[component];
                    for (ix, &vx) in wx.iter().enumerate() {
                        let gx = (g0[0] + ix as isize - m).rem_euclid(nx as isize) as usize;
                        grid[row + gx] += vx * vzy;
                    }
                }
            }
        }
        grid
    }

    /// Keep the physical modes of the oversampled spectrum and divide out
    /// the Gaussian window transform.
    fn truncate_and_deconvolve(&mut self, grid: &[Complex<f64>], component: usize, volume: f64) {
        let nk = self.num_modes();
        let wk = &mut self.wk[component];
        for idx in 0..nk {
            let m = mode_of_grid(idx, self.grid);
            let mut value = grid[oversampled_index(m, &self.axes)];
            let mut factor = 1.0 / volume;
            for axis in 0..3 {
                let ax = &self.axes[axis];
                factor *= 2.0 * std::f64::consts::PI
                    / (ax.ng as f64 * (4.0 * std::f64::consts::PI * ax.tau).sqrt())
                    * ((m[axis] * m[axis]) as f64 * ax.tau).exp();
            }
            value *= factor;
            wk[idx] = value;
        }
    }

    /// Type-2 transform: spectrum → values at every filament node, added
    /// into `out`.
    fn interpolate_to_nodes(
        &self,
        filaments: &[Filament],
        spectrum: &[Vec<Complex<f64>>; 3],
        out: &mut [Vec<Vec3>],
    ) {
        match self.backend {
            LongRangeBackend::ExactSum => {
                let nk = self.num_modes();
                for (f, slots) in filaments.iter().zip(out.iter_mut()) {
                    let values: Vec<Vec3> = (0..f.num_nodes())
                        .into_par_iter()
                        .map(|i| {
                            let x = f.node(i as isize);
                            let mut acc = Vec3::zeros();
                            for idx in 0..nk {
                                let k = self.wavevector(self.mode_of(idx));
                                let phase = k.dot(&x);
                                let e = Complex::new(phase.cos(), phase.sin());
                                for c in 0..3 {
                                    acc[c] += (spectrum[c][idx] * e).re;
                                }
                            }
                            acc
                        })
                        .collect();
                    for (slot, v) in slots.iter_mut().zip(values) {
                        *slot += v;
                    }
                }
            }
            LongRangeBackend::Nufft { support, .. } => {
                for c in 0..3 {
                    let ng_total =
                        self.axes[0].ng * self.axes[1].ng * self.axes[2].ng;
                    let mut grid = vec![Complex::new(0.0, 0.0); ng_total];
                    // pre-deconvolved padding of the physical modes
                    for idx in 0..self.num_modes() {
                        let m = mode_of_grid(idx, self.grid);
                        let mut factor = 1.0;
                        for axis in 0..3 {
                            let ax = &self.axes[axis];
                            factor *= 2.0 * std::f64::consts::PI
                                / (ax.ng as f64
                                    * (4.0 * std::f64::consts::PI * ax.tau).sqrt())
                                * ((m[axis] * m[axis]) as f64 * ax.tau).exp();
                        }
                        grid[oversampled_index(m, &self.axes)] = spectrum[c][idx] * factor;
                    }
                    self.fft3(&mut grid, false);
                    self.gather(filaments, &grid, c, support, out);
                }
            }
        }
    }

    /// Gaussian interpolation from the oversampled grid at every node.
    fn gather(
        &self,
        filaments: &[Filament],
        grid: &[Complex<f64>],
        component: usize,
        support: usize,
        out: &mut [Vec<Vec3>],
    ) {
        let [nx, ny, nz] = [self.axes[0].ng, self.axes[1].ng, self.axes[2].ng];
        let m = support as isize;
        for (f, slots) in filaments.iter().zip(out.iter_mut()) {
            let values: Vec<f64> = (0..f.num_nodes())
                .into_par_iter()
                .map(|i| {
                    let x = f.node(i as isize);
                    let mut theta = [0.0_f64; 3];
                    for axis in 0..3 {
                        theta[axis] = (2.0 * std::f64::consts::PI * x[axis]
                            / self.periods[axis])
                            .rem_euclid(2.0 * std::f64::consts::PI);
                    }
                    let mut acc = 0.0;
                    let mut wx = vec![0.0_f64; 2 * support + 1];
                    let mut wy = vec![0.0_f64; 2 * support + 1];
                    let mut wz = vec![0.0_f64; 2 * support + 1];
                    let mut g0 = [0isize; 3];
                    for axis in 0..3 {
                        let ax = &self.axes[axis];
                        let dtheta = 2.0 * std::f64::consts::PI / ax.ng as f64;
                        let nearest = (theta[axis] / dtheta).round() as isize;
                        g0[axis] = nearest;
                        let weights = match axis {
                            0 => &mut wx,
                            1 => &mut wy,
                            _ => &mut wz,
                        };
                        for (slot, off) in weights.iter_mut().zip(-m..=m) {
                            let theta_g = (nearest + off) as f64 * dtheta;
                            let d = theta[axis] - theta_g;
                            *slot = (-d * d / (4.0 * ax.tau)).exp();
                        }
                    }
                    for (iz, &vz) in wz.iter().enumerate() {
                        let gz = (g0[2] + iz as isize - m).rem_euclid(nz as isize) as usize;
                        for (iy, &vy) in wy.iter().enumerate() {
                            let gy =
                                (g0[1] + iy as isize - m).rem_euclid(ny as isize) as usize;
                            let row = nx * (gy + ny * gz);
                            let vzy = vz * vy;
                            for (ix, &vx) in wx.iter().enumerate() {
                                let gx = (g0[0] + ix as isize - m)
                                    .rem_euclid(nx as isize)
                                    as usize;
                                acc += vzy * vx * grid[row + gx].re;
                            }
                        }
                    }
                    acc
                })
                .collect();
            for (slot, v) in slots.iter_mut().zip(values) {
                slot[component] += v;
            }
        }
    }

    /// In-place 3D FFT (forward or inverse) over the oversampled grid,
    /// axis by axis.
    fn fft3(&self, data: &mut [Complex<f64>], forward: bool) {
        let _span = info_span!("longrange::fft3", forward).entered();
        let [nx, ny, nz] = [self.axes[0].ng, self.axes[1].ng, self.axes[2].ng];
        let plans = if forward { &self.fft_fw } else { &self.fft_inv };
        // x: rows are contiguous
        plans[0].process(data);
        // y: strided gather/scatter
        let mut column = vec![Complex::new(0.0, 0.0); ny];
        for z in 0..nz {
            for x in 0..nx {
                for (y, slot) in column.iter_mut().enumerate() {
                    *slot = data[x + nx * (y + ny * z)];
                }
                plans[1].process(&mut column);
                for (y, &value) in column.iter().enumerate() {
                    data[x + nx * (y + ny * z)] = value;
                }
            }
        }
        // z
        let mut column = vec![Complex::new(0.0, 0.0); nz];
        for y in 0..ny {
            for x in 0..nx {
                for (z, slot) in column.iter_mut().enumerate() {
                    *slot = data[x + nx * (y + ny * z)];
                }
                plans[2].process(&mut column);
                for (z, &value) in column.iter().enumerate() {
                    data[x + nx * (y + ny * z)] = value;
                }
            }
        }
    }
}

/// Signed mode numbers of a linear index over `grid` (kx fastest).
fn mode_of_grid(idx: usize, grid: [usize; 3]) -> [i64; 3] {
    let [nx, ny, _] = grid;
    let signed = |g: usize, n: usize| {
        if g < n / 2 {
            g as i64
        } else {
            g as i64 - n as i64
        }
    };
    [
        signed(idx % nx, nx),
        signed((idx / nx) % ny, ny),
        signed(idx / (nx * ny), grid[2]),
    ]
}

/// Linear index of signed mode `m` on the oversampled grids.
fn oversampled_index(m: [i64; 3], axes: &[AxisPlan; 3]) -> usize {
    let wrap = |mi: i64, ng: usize| mi.rem_euclid(ng as i64) as usize;
    wrap(m[0], axes[0].ng)
        + axes[0].ng * (wrap(m[1], axes[1].ng) + axes[1].ng * wrap(m[2], axes[2].ng))
}

/// Quadrature samples of Γ X′ along every segment, positions mapped to
/// θ ∈ [0, 2π)³.
fn gather_sources(
    filaments: &[Filament],
    circulation: f64,
    quad: &GaussLegendre,
    periods: [f64; 3],
) -> Vec<Source> {
    let mut sources = Vec::new();
    for f in filaments {
        for seg in 0..f.num_segments() {
            let h = f.knot(seg as isize + 1) - f.knot(seg as isize);
            for (&zeta, &w) in quad.nodes().iter().zip(quad.weights()) {
                let pos = f.evaluate(seg, zeta, 0);
                let deriv = f.evaluate(seg, zeta, 1);
                let mut theta = [0.0_f64; 3];
                for axis in 0..3 {
                    theta[axis] = (2.0 * std::f64::consts::PI * pos[axis] / periods[axis])
                        .rem_euclid(2.0 * std::f64::consts::PI);
                }
                sources.push(Source {
                    theta,
                    weight: circulation * w * h * deriv,
                });
            }
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filament::DiscretizationMethod;
    use std::f64::consts::PI;

    fn test_ring(center: Vec3) -> Filament {
        match Filament::from_curve(
            24,
            DiscretizationMethod::CubicSpline,
            Vec3::zeros(),
            |u| {
                let th = 2.0 * PI * u;
                center + Vec3::new(th.cos(), th.sin(), 0.0)
            },
        ) {
            Ok(f) => f,
            Err(e) => panic!("{e}"),
        }
    }

    #[test]
    fn odd_grid_rejected() {
        match LongRangeCache::new([15, 16, 16], [1.0; 3], 1.0, LongRangeBackend::ExactSum) {
            Err(FilamentaryError::InvalidGridSize { axis: 0, size: 15 }) => {}
            other => panic!("expected grid error, got {:?}", other.err()),
        }
    }

    #[test]
    fn mode_numbering_round_trip() {
        let grid = [8usize, 8, 8];
        for idx in [0usize, 1, 7, 8, 63, 200, 511] {
            let m = mode_of_grid(idx, grid);
            assert!(m.iter().all(|&mi| (-4..4).contains(&mi)), "mode {m:?}");
        }
        assert_eq!(mode_of_grid(0, grid), [0, 0, 0]);
        assert_eq!(mode_of_grid(7, grid), [-1, 0, 0]);
    }

    #[test]
    fn nufft_matches_exact_sum() {
        let period = 2.0 * PI;
        let periods = [period; 3];
        let grid = [16usize, 16, 16];
        let alpha = 2.0;
        let quad = GaussLegendre::new(3);
        let f = test_ring(Vec3::new(PI, PI, PI));
        let filaments = vec![f];

        let mut exact =
            match LongRangeCache::new(grid, periods, alpha, LongRangeBackend::ExactSum) {
                Ok(c) => c,
                Err(e) => panic!("{e}"),
            };
        let mut fast = match LongRangeCache::new(
            grid,
            periods,
            alpha,
            LongRangeBackend::Nufft {
                tolerance: 1e-8,
                support: 12,
                oversampling: 2,
            },
        ) {
            Ok(c) => c,
            Err(e) => panic!("{e}"),
        };

        let mut v_exact = vec![vec![Vec3::zeros(); 24]];
        let mut v_fast = vec![vec![Vec3::zeros(); 24]];
        let mut psi_exact = vec![vec![Vec3::zeros(); 24]];
        let mut psi_fast = vec![vec![Vec3::zeros(); 24]];
        exact.accumulate(
            &filaments,
            1.0,
            &quad,
            Some(&mut v_exact[..]),
            Some(&mut psi_exact[..]),
        );
        fast.accumulate(
            &filaments,
            1.0,
            &quad,
            Some(&mut v_fast[..]),
            Some(&mut psi_fast[..]),
        );

        let vmax = v_exact[0]
            .iter()
            .map(nalgebra::Vector3::norm)
            .fold(0.0, f64::max);
        assert!(vmax > 0.0, "ring must induce a long-range field");
        for i in 0..24 {
            assert!(
                (v_exact[0][i] - v_fast[0][i]).norm() <= 1e-6 * vmax.max(1.0),
                "velocity node {i}: exact {:?} vs nufft {:?}",
                v_exact[0][i],
                v_fast[0][i]
            );
            assert!(
                (psi_exact[0][i] - psi_fast[0][i]).norm() <= 1e-6,
                "streamfunction node {i}"
            );
        }
    }

    #[test]
    fn ring_long_range_velocity_points_forward() {
        // the smoothed field of a ring advects its own nodes along +z
        let period = 2.0 * PI;
        let grid = [16usize, 16, 16];
        let quad = GaussLegendre::new(3);
        let f = test_ring(Vec3::new(PI, PI, PI));
        let filaments = vec![f];
        let mut cache =
            match LongRangeCache::new(grid, [period; 3], 1.5, LongRangeBackend::ExactSum) {
                Ok(c) => c,
                Err(e) => panic!("{e}"),
            };
        let mut v = vec![vec![Vec3::zeros(); 24]];
        cache.accumulate(&filaments, 1.0, &quad, Some(&mut v[..]), None);
        let mean_vz: f64 = v[0].iter().map(|u| u.z).sum::<f64>() / 24.0;
        assert!(
            mean_vz > 0.0,
            "counter-clockwise ring should drift toward +z, got {mean_vz}"
        );
    }

    #[test]
    fn zero_mode_is_removed() {
        let grid = [8usize, 8, 8];
        let quad = GaussLegendre::new(2);
        let f = test_ring(Vec3::new(PI, PI, PI));
        let filaments = vec![f];
        let mut cache =
            match LongRangeCache::new(grid, [2.0 * PI; 3], 1.0, LongRangeBackend::ExactSum) {
                Ok(c) => c,
                Err(e) => panic!("{e}"),
            };
        let mut v = vec![vec![Vec3::zeros(); 24]];
        cache.accumulate(&filaments, 1.0, &quad, Some(&mut v[..]), None);
        let (vx, vy, vz) = cache.velocity_spectrum();
        assert_eq!(vx[0].norm(), 0.0);
        assert_eq!(vy[0].norm(), 0.0);
        assert_eq!(vz[0].norm(), 0.0);
    }
}
