// SPDX-License-Identifier: AGPL-3.0-only

//! External forcing and dissipation hooks.
//!
//! All hooks are optional and invoked by the time stepper at well-defined
//! points: external velocity and stretching velocity add to the advecting
//! velocity at node positions; the external streamfunction adds (with a
//! factor 2, so the half-sum energy identity stays exact) to the sampled
//! streamfunction; mutual friction converts the self-induced velocity into
//! the actual line velocity using the HVBK law.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use crate::Vec3;

/// A user-supplied field of position and time.
pub type FieldFn = Box<dyn Fn(Vec3, f64) -> Vec3 + Send + Sync>;

/// Normal-fluid coupling parameters.
pub struct MutualFriction {
    /// Mutual-friction coefficient α.
    pub alpha: f64,
    /// Transverse coefficient α′.
    pub alpha_prime: f64,
    /// Normal-fluid velocity field v_n(x, t).
    pub normal_velocity: FieldFn,
}

/// Optional forcing/dissipation hooks of a simulation.
#[derive(Default)]
pub struct Forcing {
    /// Additive external superfluid velocity.
    pub external_velocity: Option<FieldFn>,
    /// External streamfunction matching `external_velocity`.
    pub external_streamfunction: Option<FieldFn>,
    /// Stretching velocity magnitude as a function of curvature; applied
    /// along −n̂ (against the curvature vector).
    pub stretching_velocity: Option<Box<dyn Fn(f64) -> f64 + Send + Sync>>,
    /// Normal-fluid mutual friction.
    pub mutual_friction: Option<MutualFriction>,
    consistency_checked: AtomicBool,
}

impl Forcing {
    /// Add an external superfluid velocity field.
    #[must_use]
    pub fn with_external_velocity(mut self, field: FieldFn) -> Self {
        self.external_velocity = Some(field);
        self
    }

    /// Add the streamfunction matching the external velocity.
    #[must_use]
    pub fn with_external_streamfunction(mut self, field: FieldFn) -> Self {
        self.external_streamfunction = Some(field);
        self
    }

    /// Add a stretching velocity magnitude as a function of curvature.
    #[must_use]
    pub fn with_stretching_velocity(
        mut self,
        magnitude: Box<dyn Fn(f64) -> f64 + Send + Sync>,
    ) -> Self {
        self.stretching_velocity = Some(magnitude);
        self
    }

    /// Couple to a normal fluid through mutual friction.
    #[must_use]
    pub fn with_mutual_friction(mut self, friction: MutualFriction) -> Self {
        self.mutual_friction = Some(friction);
        self
    }

    /// Whether any hook modifies the advecting velocity.
    #[must_use]
    pub fn affects_velocity(&self) -> bool {
        self.external_velocity.is_some()
            || self.stretching_velocity.is_some()
            || self.mutual_friction.is_some()
    }

    /// Add the external velocity at a node.
    pub fn add_external_velocity(&self, position: Vec3, time: f64, velocity: &mut Vec3) {
        if let Some(field) = &self.external_velocity {
            *velocity += field(position, time);
        }
    }

    /// Add the stretching velocity −v(κ)·n̂ at a node. The curvature vector
    /// is produced lazily so callers pay for it only when the hook is set.
    pub fn add_stretching_velocity<F: FnOnce() -> Vec3>(&self, curvature: F, velocity: &mut Vec3) {
        if let Some(stretch) = &self.stretching_velocity {
            let cv = curvature();
            let kappa = cv.norm();
            if kappa > crate::tolerances::CURVATURE_FLOOR {
                *velocity -= stretch(kappa) * (cv / kappa);
            }
        }
    }

    /// Add the external streamfunction (factor 2, see module docs).
    pub fn add_streamfunction(&self, position: Vec3, time: f64, psi: &mut Vec3) {
        if let Some(field) = &self.external_streamfunction {
            *psi += 2.0 * field(position, time);
        }
    }

    /// Line velocity from the self-induced velocity via the HVBK law
    /// v_L = v_s + α (v_n − v_s) × t̂ − α′ t̂ × ((v_n − v_s) × t̂).
    #[must_use]
    pub fn line_velocity(&self, vs: Vec3, tangent: Vec3, position: Vec3, time: f64) -> Vec3 {
        let Some(mf) = &self.mutual_friction else {
            return vs;
        };
        let vn = (mf.normal_velocity)(position, time);
        let slip = vn - vs;
        let cross = slip.cross(&tangent);
        vs + mf.alpha * cross - mf.alpha_prime * tangent.cross(&cross)
    }

    /// One-shot check that the external velocity is the curl of the
    /// external streamfunction at a sample point (central differences);
    /// inconsistency is surfaced as a warning, never an error.
    pub fn check_consistency(&self, sample: Vec3, time: f64) {
        let (Some(vel), Some(psi)) = (&self.external_velocity, &self.external_streamfunction)
        else {
            return;
        };
        if self.consistency_checked.swap(true, Ordering::Relaxed) {
            return;
        }
        let h = 1e-4;
        let mut curl = Vec3::zeros();
        // curl ψ; the stored field carries the factor-2 convention, so the
        // physical streamfunction is ψ_ext itself
        let d = |axis: usize, f: &dyn Fn(Vec3, f64) -> Vec3| {
            let mut hi = sample;
            let mut lo = sample;
            hi[axis] += h;
            lo[axis] -= h;
            (f(hi, time) - f(lo, time)) / (2.0 * h)
        };
        let dpsi_dx = d(0, psi.as_ref());
        let dpsi_dy = d(1, psi.as_ref());
        let dpsi_dz = d(2, psi.as_ref());
        curl.x = dpsi_dy.z - dpsi_dz.y;
        curl.y = dpsi_dz.x - dpsi_dx.z;
        curl.z = dpsi_dx.y - dpsi_dy.x;
        let v = vel(sample, time);
        let scale = v.norm().max(1.0);
        if (curl - v).norm() > 1e-3 * scale {
            warn!(
                ?curl,
                velocity = ?v,
                "external streamfunction is not consistent with external velocity"
            );
        }
    }
}
