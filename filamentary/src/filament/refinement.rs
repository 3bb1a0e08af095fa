// SPDX-License-Identifier: AGPL-3.0-only

//! Adaptive refinement of filament discretizations.
//!
//! One pass over the segments of the *unmodified* filament collects a plan
//! of midpoint insertions and node removals; the plan is applied in a single
//! sweep (highest index first, so earlier indices stay valid), then knots
//! and coefficients are recomputed. Two adjacent removals are never planned
//! in the same pass, and a removal is skipped whenever the coalesced
//! segment would exceed the maximum length.

use super::Filament;
use crate::error::FilamentaryError;
use crate::Vec3;

/// Per-segment refinement decision rule.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RefinementCriterion {
    /// Leave the filament unchanged.
    NoRefinement,
    /// Insert when a segment is longer than `lmax`; remove a node when its
    /// segment is shorter than `lmin` (if coalescing stays below `lmax`).
    BasedOnSegmentLength {
        /// Segment length below which the trailing node is removed.
        lmin: f64,
        /// Segment length above which a midpoint is inserted.
        lmax: f64,
    },
    /// Gate decisions on the product of the segment-averaged curvature
    /// ρ = (κ\[i\] + κ\[i+1\])/2 with the segment length, with `lmin`/`lmax`
    /// as absolute backstops.
    BasedOnCurvature {
        /// ρ·ℓ above which a midpoint is inserted.
        rho_l_max: f64,
        /// ρ·ℓ below which the trailing node becomes removable.
        rho_l_min: f64,
        /// Hard lower bound on segment length (forces removal below it).
        lmin: f64,
        /// Hard upper bound on segment length (forces insertion above it).
        lmax: f64,
    },
}

/// Counts of applied refinement operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefinementOutcome {
    /// Midpoints inserted.
    pub inserted: usize,
    /// Nodes removed.
    pub removed: usize,
}

#[derive(Clone, Copy, Debug)]
enum PlanEntry {
    /// Insert `position` inside segment `seg` (after node `seg`).
    Insert { seg: usize, position: Vec3 },
    /// Remove node `node`.
    Remove { node: usize },
}

/// Refine `filament` in place according to `criterion`.
///
/// Returns the operation counts; a criterion that is already satisfied
/// performs zero operations (idempotency).
///
/// # Errors
/// [`FilamentaryError::DegenerateFilament`] if removals push the node count
/// below the method minimum — the caller is expected to drop the filament.
pub fn refine(
    filament: &mut Filament,
    criterion: RefinementCriterion,
) -> Result<RefinementOutcome, FilamentaryError> {
    if criterion == RefinementCriterion::NoRefinement {
        return Ok(RefinementOutcome::default());
    }
    let n = filament.num_segments();
    let mut plan: Vec<PlanEntry> = Vec::new();
    let mut last_removed: Option<usize> = None;

    for seg in 0..n {
        let x0 = filament.node(seg as isize);
        let x1 = filament.node(seg as isize + 1);
        let length = (x1 - x0).norm();
        let (insert_here, remove_here, lmax) = match criterion {
            RefinementCriterion::NoRefinement => (false, false, f64::INFINITY),
            RefinementCriterion::BasedOnSegmentLength { lmin, lmax } => {
                (length > lmax, length < lmin, lmax)
            }
            RefinementCriterion::BasedOnCurvature {
                rho_l_max,
                rho_l_min,
                lmin,
                lmax,
            } => {
                let rho = 0.5
                    * (filament.curvature_scalar(seg, 0.0)
                        + filament.curvature_scalar(seg, 1.0));
                let product = rho * length;
                (
                    length > lmax || (product > rho_l_max && length > 2.0 * lmin),
                    product < rho_l_min || length < lmin,
                    lmax,
                )
            }
        };

        if insert_here {
            plan.push(PlanEntry::Insert {
                seg,
                position: filament.evaluate(seg, 0.5, 0),
            });
            continue;
        }
        if remove_here {
            // removing the trailing node coalesces segments seg and seg+1;
            // forbid adjacent removals and over-long coalesced chords
            let node = seg;
            let prev = filament.node(seg as isize - 1);
            let coalesced = (x1 - prev).norm();
            let adjacent = node > 0 && last_removed == Some(node - 1);
            if !adjacent && coalesced <= lmax {
                plan.push(PlanEntry::Remove { node });
                last_removed = Some(node);
            }
        }
    }

    // the visible range wraps: nodes 0 and n-1 are adjacent too
    if last_removed == Some(n - 1)
        && plan
            .iter()
            .any(|e| matches!(e, PlanEntry::Remove { node: 0 }))
    {
        plan.retain(|e| !matches!(e, PlanEntry::Remove { node } if *node == n - 1));
    }

    let mut outcome = RefinementOutcome::default();
    if plan.is_empty() {
        return Ok(outcome);
    }

    // apply highest-index first so pending indices stay valid
    for entry in plan.iter().rev() {
        match *entry {
            PlanEntry::Insert { seg, position } => {
                filament.insert_node(seg, position);
                outcome.inserted += 1;
            }
            PlanEntry::Remove { node } => {
                filament.remove_node(node);
                outcome.removed += 1;
            }
        }
    }
    filament.commit_geometry()?;
    Ok(outcome)
}
