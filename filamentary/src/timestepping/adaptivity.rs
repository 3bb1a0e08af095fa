// SPDX-License-Identifier: AGPL-3.0-only

//! Adaptive timestep criteria.
//!
//! The natural timestep scale of vortex filament dynamics is the period of
//! the shortest resolved Kelvin wave, set by the minimum inter-node
//! distance. Criteria either track that scale, bound the per-step nodal
//! displacement by the velocity, or combine several rules by taking the
//! minimum.

use crate::biotsavart::ParamsBiotSavart;
use crate::EULER_GAMMA;

/// Kelvin wave period at wavelength λ:
/// `T_KW(λ) = (2λ²/Γ) / (ln(λ/(πa)) + 1/2 − (Δ + γ))`.
#[must_use]
pub fn kelvin_wave_period(lambda: f64, params: &ParamsBiotSavart) -> f64 {
    let denom = (lambda / (std::f64::consts::PI * params.core_radius)).ln() + 0.5
        - (params.core_parameter + EULER_GAMMA);
    2.0 * lambda * lambda / (params.circulation * denom)
}

/// Timestep adaptation rule.
#[derive(Clone, Debug, PartialEq)]
pub enum AdaptivityCriterion {
    /// Keep dt unchanged.
    Fixed,
    /// dt = factor · `T_KW`(δ) with δ the minimum node distance.
    BasedOnSegmentLength {
        /// Safety factor γ on the Kelvin-wave period.
        factor: f64,
    },
    /// dt = δ / max|v|: bound the nodal displacement per step by δ.
    BasedOnVelocity {
        /// Maximum allowed displacement per step.
        delta: f64,
    },
    /// Minimum over several rules.
    Combined(Vec<AdaptivityCriterion>),
}

impl AdaptivityCriterion {
    /// Whether this criterion ever changes dt.
    #[must_use]
    pub fn is_adaptive(&self) -> bool {
        match self {
            Self::Fixed => false,
            Self::BasedOnSegmentLength { .. } | Self::BasedOnVelocity { .. } => true,
            Self::Combined(members) => members.iter().any(Self::is_adaptive),
        }
    }

    /// Suggested dt for the current state, `None` when fixed.
    #[must_use]
    pub fn suggested_dt(
        &self,
        min_node_distance: f64,
        max_velocity: f64,
        params: &ParamsBiotSavart,
    ) -> Option<f64> {
        match self {
            Self::Fixed => None,
            Self::BasedOnSegmentLength { factor } => {
                Some(factor * kelvin_wave_period(min_node_distance, params))
            }
            Self::BasedOnVelocity { delta } => {
                (max_velocity > 0.0).then(|| delta / max_velocity)
            }
            Self::Combined(members) => members
                .iter()
                .filter_map(|m| m.suggested_dt(min_node_distance, max_velocity, params))
                .fold(None, |acc, dt| Some(acc.map_or(dt, |a: f64| a.min(dt)))),
        }
    }

    /// Ceiling on the per-step nodal displacement; exceeding it rejects the
    /// step. `None` when fixed.
    #[must_use]
    pub fn displacement_ceiling(&self, min_node_distance: f64) -> Option<f64> {
        match self {
            Self::Fixed => None,
            // a node moving a full segment length invalidates the
            // Kelvin-wave estimate the dt was based on
            Self::BasedOnSegmentLength { .. } => Some(min_node_distance),
            Self::BasedOnVelocity { delta } => Some(*delta),
            Self::Combined(members) => members
                .iter()
                .filter_map(|m| m.displacement_ceiling(min_node_distance))
                .fold(None, |acc, c| Some(acc.map_or(c, |a: f64| a.min(c)))),
        }
    }
}
