// SPDX-License-Identifier: AGPL-3.0-only

//! Ewald-split Biot–Savart evaluator.
//!
//! The induced velocity of the filament set is decomposed with the Ewald
//! parameter α into a screened short-range sum over nearby segment pairs
//! (cell lists + Gauss–Legendre quadrature, desingularized by the local
//! induction approximation) and a smooth long-range field evaluated on a
//! periodic Fourier grid (Gaussian-gridding NUFFT or exact mode sums).
//! For admissible α the `full` result is α-independent up to the NUFFT
//! tolerance and the truncation error exp(−(α·rcut)²).
//!
//! Open domains (all periods infinite) disable the long-range path and
//! integrate the unscreened kernels over all segment pairs.

pub mod longrange;
pub mod shortrange;

pub use crate::cells::ShortRangeBackend;
pub use longrange::LongRangeBackend;

use crate::cells::SegmentFinder;
use crate::error::FilamentaryError;
use crate::filament::Filament;
use crate::quadrature::GaussLegendre;
use crate::Vec3;

/// Immutable Biot–Savart configuration: the physical system plus the
/// numerical backends.
#[derive(Clone, Debug)]
pub struct ParamsBiotSavart {
    /// Circulation Γ of every filament.
    pub circulation: f64,
    /// Vortex core radius a.
    pub core_radius: f64,
    /// Core model parameter Δ (1/4 solid-body, 1/2 hollow).
    pub core_parameter: f64,
    /// Domain periods; all finite (triply periodic) or all infinite (open).
    pub periods: [f64; 3],
    /// Long-range grid sizes (even; ignored when open).
    pub grid_size: [usize; 3],
    /// Ewald splitting parameter α.
    pub alpha: f64,
    /// Short-range cutoff radius, below half the smallest period.
    pub rcut: f64,
    /// Quadrature rule for short-range segment integrals.
    pub quad_short: GaussLegendre,
    /// Quadrature rule for long-range vorticity deposition.
    pub quad_long: GaussLegendre,
    /// Short-range pair enumeration backend.
    pub backend_short: ShortRangeBackend,
    /// Long-range deposition/interpolation backend.
    pub backend_long: LongRangeBackend,
}

impl ParamsBiotSavart {
    /// Validate the configuration; all failures here are fatal at
    /// construction time.
    ///
    /// # Errors
    /// [`FilamentaryError::InvalidParameter`], [`FilamentaryError::MixedPeriodicity`],
    /// [`FilamentaryError::InvalidCutoff`] or [`FilamentaryError::InvalidGridSize`]
    /// on an inadmissible combination.
    pub fn validated(self) -> Result<Self, FilamentaryError> {
        if !(self.circulation > 0.0) {
            return Err(FilamentaryError::InvalidParameter {
                name: "circulation",
                value: self.circulation,
            });
        }
        if !(self.core_radius > 0.0) {
            return Err(FilamentaryError::InvalidParameter {
                name: "core_radius",
                value: self.core_radius,
            });
        }
        if !(0.0..=1.0).contains(&self.core_parameter) {
            return Err(FilamentaryError::InvalidParameter {
                name: "core_parameter",
                value: self.core_parameter,
            });
        }
        let finite = self.periods.iter().filter(|p| p.is_finite()).count();
        if finite != 0 && finite != 3 {
            return Err(FilamentaryError::MixedPeriodicity);
        }
        for &p in &self.periods {
            if !(p > 0.0) {
                return Err(FilamentaryError::InvalidParameter {
                    name: "periods",
                    value: p,
                });
            }
        }
        if finite == 3 {
            if !(self.alpha > 0.0) {
                return Err(FilamentaryError::InvalidParameter {
                    name: "ewald_alpha",
                    value: self.alpha,
                });
            }
            let lmin = self.periods.iter().copied().fold(f64::INFINITY, f64::min);
            if !(self.rcut > 0.0) || self.rcut >= 0.5 * lmin {
                return Err(FilamentaryError::InvalidCutoff {
                    rcut: self.rcut,
                    period: lmin,
                });
            }
            for (axis, &size) in self.grid_size.iter().enumerate() {
                if size == 0 || size % 2 != 0 {
                    return Err(FilamentaryError::InvalidGridSize { axis, size });
                }
            }
        }
        Ok(self)
    }

    /// Whether the domain is triply periodic.
    #[must_use]
    pub fn is_periodic(&self) -> bool {
        self.periods.iter().all(|p| p.is_finite())
    }

    /// Domain volume (periodic domains only).
    #[must_use]
    pub fn volume(&self) -> Option<f64> {
        self.is_periodic().then(|| self.periods.iter().product())
    }

    /// Largest resolved wavenumber per axis: (N/2)·2π/L.
    #[must_use]
    pub fn kmax(&self) -> [f64; 3] {
        let mut out = [0.0; 3];
        for axis in 0..3 {
            out[axis] = (self.grid_size[axis] / 2) as f64 * 2.0 * std::f64::consts::PI
                / self.periods[axis];
        }
        out
    }
}

/// Selection of evaluator terms, used by split time-stepping schemes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VelocityFlags {
    /// Screened short-range pair sums.
    pub shortrange: bool,
    /// Smooth Fourier-space field.
    pub longrange: bool,
    /// Desingularized local (LIA) term.
    pub local: bool,
}

impl VelocityFlags {
    /// Short + long + local (the physical velocity).
    #[must_use]
    pub fn full() -> Self {
        Self {
            shortrange: true,
            longrange: true,
            local: true,
        }
    }

    /// Long-range field only.
    #[must_use]
    pub fn longrange_only() -> Self {
        Self {
            shortrange: false,
            longrange: true,
            local: false,
        }
    }

    /// Short-range sums including the local term.
    #[must_use]
    pub fn shortrange_only() -> Self {
        Self {
            shortrange: true,
            longrange: false,
            local: true,
        }
    }

    /// Local induction approximation only.
    #[must_use]
    pub fn local_only() -> Self {
        Self {
            shortrange: false,
            longrange: false,
            local: true,
        }
    }

    /// Short-range sums without the local term.
    #[must_use]
    pub fn shortrange_without_local() -> Self {
        Self {
            shortrange: true,
            longrange: false,
            local: false,
        }
    }

    /// Complement within the full velocity (used for fast/slow splits).
    #[must_use]
    pub fn complement(self) -> Self {
        Self {
            shortrange: !self.shortrange,
            longrange: !self.longrange,
            local: !self.local,
        }
    }
}

/// Owns the short- and long-range evaluation state.
pub struct BiotSavartCache {
    params: ParamsBiotSavart,
    long: Option<longrange::LongRangeCache>,
}

impl BiotSavartCache {
    /// Validate the parameters and build the caches.
    ///
    /// # Errors
    /// Propagates validation failures from
    /// [`ParamsBiotSavart::validated`].
    pub fn new(params: ParamsBiotSavart) -> Result<Self, FilamentaryError> {
        let params = params.validated()?;
        let long = if params.is_periodic() {
            Some(longrange::LongRangeCache::new(
                params.grid_size,
                params.periods,
                params.alpha,
                params.backend_long,
            )?)
        } else {
            None
        };
        Ok(Self { params, long })
    }

    /// Evaluator configuration.
    #[must_use]
    pub fn params(&self) -> &ParamsBiotSavart {
        &self.params
    }

    /// Velocity spectrum of the last long-range evaluation, with the grid
    /// dimensions and periods (for the energy-spectrum diagnostic).
    #[must_use]
    #[allow(clippy::type_complexity)]
    pub fn velocity_spectrum(
        &self,
    ) -> Option<(
        (
            &[rustfft::num_complex::Complex<f64>],
            &[rustfft::num_complex::Complex<f64>],
            &[rustfft::num_complex::Complex<f64>],
        ),
        [usize; 3],
        [f64; 3],
    )> {
        self.long
            .as_ref()
            .map(|l| (l.velocity_spectrum(), l.grid(), l.periods()))
    }

    /// Fill the requested subset of {velocity, streamfunction} at every
    /// node of every filament. Output arrays are resized in lockstep with
    /// the filament list and overwritten.
    pub fn compute_on_nodes(
        &mut self,
        filaments: &[Filament],
        mut velocities: Option<&mut Vec<Vec<Vec3>>>,
        mut streamfunctions: Option<&mut Vec<Vec<Vec3>>>,
        flags: VelocityFlags,
    ) {
        if let Some(out) = velocities.as_mut() {
            resize_node_arrays(out, filaments);
        }
        if let Some(out) = streamfunctions.as_mut() {
            resize_node_arrays(out, filaments);
        }

        if flags.longrange && self.params.is_periodic() {
            if let Some(long) = self.long.as_mut() {
                long.accumulate(
                    filaments,
                    self.params.circulation,
                    &self.params.quad_long,
                    velocities.as_deref_mut().map(Vec::as_mut_slice),
                    streamfunctions.as_deref_mut().map(Vec::as_mut_slice),
                );
            }
        }

        if flags.shortrange || flags.local {
            let backend = if self.params.is_periodic() {
                self.params.backend_short
            } else {
                // open domains integrate over all pairs
                ShortRangeBackend::Naive
            };
            let finder =
                SegmentFinder::build(filaments, self.params.periods, self.params.rcut, backend);
            shortrange::accumulate(
                &self.params,
                filaments,
                &finder,
                flags,
                velocities.as_deref_mut().map(Vec::as_mut_slice),
                streamfunctions.as_deref_mut().map(Vec::as_mut_slice),
            );
        }
    }
}

/// Resize per-node output arrays in lockstep with the filament list,
/// zero-filling every slot.
pub fn resize_node_arrays(out: &mut Vec<Vec<Vec3>>, filaments: &[Filament]) {
    out.resize(filaments.len(), Vec::new());
    for (slots, f) in out.iter_mut().zip(filaments) {
        slots.clear();
        slots.resize(f.num_nodes(), Vec3::zeros());
    }
}
