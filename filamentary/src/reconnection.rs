// SPDX-License-Identifier: AGPL-3.0-only

//! Reconnection detection and topology surgery.
//!
//! Candidate segment pairs come from the neighbor finder refreshed at twice
//! the critical distance. A pair reconnects when the minimum distance
//! between the segments (straight chords, optionally refined on the
//! interpolated curves) is below `d_crit` and the tangents are
//! antiparallel, which filters grazing parallel approaches. The periodic
//! image displacement under which the pair is closest is carried into the
//! surgery so offsets stay consistent.
//!
//! One reconnection is allowed per unordered pair and per filament per
//! step; remaining near-misses are deferred to the next step. Degenerate
//! children are dropped with their length accounted in the statistics.

use tracing::{debug, info_span};

use crate::cells::{minimum_image, SegmentFinder, SegmentId, ShortRangeBackend};
use crate::filament::Filament;
use crate::quadrature::GaussLegendre;
use crate::Vec3;

/// Reconnection acceptance rule.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ReconnectionCriterion {
    /// Reconnect segment pairs closer than `d_crit`.
    BasedOnDistance {
        /// Critical distance.
        d_crit: f64,
        /// Refine the chord distance by sampling the interpolated curves.
        use_curved_segments: bool,
    },
}

impl ReconnectionCriterion {
    /// Critical distance of the rule.
    #[must_use]
    pub fn distance(&self) -> f64 {
        match self {
            Self::BasedOnDistance { d_crit, .. } => *d_crit,
        }
    }
}

/// Verified candidate pair, with the image displacement to apply to the
/// `b` side during surgery.
#[derive(Clone, Copy, Debug)]
pub struct ReconnectionCandidate {
    /// First segment.
    pub a: SegmentId,
    /// Second segment.
    pub b: SegmentId,
    /// Periodic displacement applied to `b`.
    pub shift: Vec3,
    /// Verified minimum distance.
    pub distance: f64,
}

/// How the engine touched a filament, reported through the callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconnectionEvent {
    /// The filament at this index was rewired in place.
    Modified,
    /// A new filament was appended to the list.
    Appended,
    /// The filament was removed (merged away or degenerate).
    Removed,
}

/// Totals of one reconnection pass.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ReconnectionStats {
    /// Surgeries performed.
    pub reconnections: usize,
    /// Total line length lost to the surgeries.
    pub length_loss: f64,
    /// Degenerate or merged-away filaments dropped.
    pub filaments_removed: usize,
    /// Total length of the dropped filaments.
    pub filaments_removed_length: f64,
}

/// Minimum distance between two straight segments (clamped closest-point).
#[must_use]
pub fn segment_distance(p1: Vec3, q1: Vec3, p2: Vec3, q2: Vec3) -> f64 {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.norm_squared();
    let e = d2.norm_squared();
    let f = d2.dot(&r);
    let (mut s, mut t);
    if a <= f64::EPSILON && e <= f64::EPSILON {
        return r.norm();
    }
    if a <= f64::EPSILON {
        s = 0.0;
        t = (f / e).clamp(0.0, 1.0);
    } else {
        let c = d1.dot(&r);
        if e <= f64::EPSILON {
            t = 0.0;
            s = (-c / a).clamp(0.0, 1.0);
        } else {
            let b = d1.dot(&d2);
            let denom = a * e - b * b;
            s = if denom > 0.0 {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
        }
    }
    ((p1 + s * d1) - (p2 + t * d2)).norm()
}

/// Sampled minimum distance between two interpolated curve segments, with
/// the `shift` applied to the second.
fn curved_distance(fa: &Filament, i: usize, fb: &Filament, j: usize, shift: Vec3) -> f64 {
    const SAMPLES: usize = 5;
    let mut best = f64::INFINITY;
    for si in 0..SAMPLES {
        let za = si as f64 / (SAMPLES - 1) as f64;
        let pa = fa.evaluate(i, za, 0);
        for sj in 0..SAMPLES {
            let zb = sj as f64 / (SAMPLES - 1) as f64;
            let pb = fb.evaluate(j, zb, 0) + shift;
            best = best.min((pb - pa).norm());
        }
    }
    best
}

/// Evaluate the criterion for segments `(fa, i)` and `(fb, j)`.
///
/// `same` marks a self-pair (`fa` and `fb` are the same filament); adjacent
/// segments of a self-pair never reconnect.
#[must_use]
pub fn should_reconnect(
    criterion: &ReconnectionCriterion,
    fa: &Filament,
    fb: &Filament,
    i: usize,
    j: usize,
    same: bool,
    periods: [f64; 3],
) -> Option<ReconnectionCandidate> {
    let ReconnectionCriterion::BasedOnDistance {
        d_crit,
        use_curved_segments,
    } = criterion;

    if same {
        let n = fa.num_segments();
        let gap = (i + n - j) % n;
        if gap <= 1 || gap >= n - 1 {
            return None;
        }
    }

    // periodic image under which the pair is closest
    let ma = 0.5 * (fa.node(i as isize) + fa.node(i as isize + 1));
    let mb = 0.5 * (fb.node(j as isize) + fb.node(j as isize + 1));
    let raw = mb - ma;
    let shift = minimum_image(raw, periods) - raw;

    let mut distance = segment_distance(
        fa.node(i as isize),
        fa.node(i as isize + 1),
        fb.node(j as isize) + shift,
        fb.node(j as isize + 1) + shift,
    );
    if *use_curved_segments {
        distance = distance.min(curved_distance(fa, i, fb, j, shift));
    }
    if distance >= *d_crit {
        return None;
    }

    // antiparallel filter
    let ta = fa.evaluate(i, 0.5, 1);
    let tb = fb.evaluate(j, 0.5, 1);
    if ta.dot(&tb) >= 0.0 {
        return None;
    }

    Some(ReconnectionCandidate {
        a: SegmentId {
            filament: 0,
            segment: i,
        },
        b: SegmentId {
            filament: 0,
            segment: j,
        },
        shift,
        distance,
    })
}

/// Chord length of a raw node list (open polyline), for accounting of
/// pieces too degenerate to build a filament from.
fn chord_length(nodes: &[Vec3]) -> f64 {
    nodes.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
}

/// Event recorded during surgery and reported once the final list layout
/// is known (slot indices shift when merged-away filaments are removed).
enum PendingEvent {
    /// The filament in this pre-pass slot was rewired in place.
    Modified { slot: usize },
    /// A new filament sits at this position of the appended tail.
    Appended { position: usize },
    /// This filament was removed; `slot` is its index at pass entry.
    Removed { slot: usize, filament: Filament },
}

/// One reconnection pass over the filament set.
///
/// `callback` receives `(index, filament, event)` for every affected
/// filament, fired in surgery order after all surgeries are done. For
/// `Modified` and `Appended` the index refers to the filament list as the
/// pass leaves it; a `Removed` filament is no longer in the list, so its
/// index refers to the list as the pass found it.
pub fn reconnect_pass<F>(
    filaments: &mut Vec<Filament>,
    criterion: &ReconnectionCriterion,
    periods: [f64; 3],
    backend: ShortRangeBackend,
    quad: &GaussLegendre,
    mut callback: F,
) -> ReconnectionStats
where
    F: FnMut(usize, &Filament, ReconnectionEvent),
{
    let _span = info_span!("reconnect_pass", filaments = filaments.len()).entered();
    let mut stats = ReconnectionStats::default();
    if filaments.is_empty() {
        return stats;
    }

    let d_crit = criterion.distance();
    let finder = SegmentFinder::build(filaments, periods, 2.0 * d_crit, backend);

    let mut candidates: Vec<ReconnectionCandidate> = Vec::new();
    for pair in finder.pairs() {
        let same = pair.a.filament == pair.b.filament;
        let fa = &filaments[pair.a.filament];
        let fb = &filaments[pair.b.filament];
        if let Some(mut c) = should_reconnect(
            criterion,
            fa,
            fb,
            pair.a.segment,
            pair.b.segment,
            same,
            periods,
        ) {
            c.a.filament = pair.a.filament;
            c.b.filament = pair.b.filament;
            candidates.push(c);
        }
    }
    candidates.sort_by(|x, y| {
        x.distance
            .total_cmp(&y.distance)
            .then_with(|| (x.a, x.b).cmp(&(y.a, y.b)))
    });

    let mut slots: Vec<Option<Filament>> = filaments.drain(..).map(Some).collect();
    let mut appended: Vec<Filament> = Vec::new();
    let mut touched = vec![false; slots.len()];
    let mut events: Vec<PendingEvent> = Vec::new();

    for cand in candidates {
        let ia = cand.a.filament;
        let ib = cand.b.filament;
        if touched[ia] || touched[ib] {
            continue;
        }
        debug!(
            fa = ia,
            fb = ib,
            sa = cand.a.segment,
            sb = cand.b.segment,
            distance = cand.distance,
            "reconnecting"
        );

        if ia == ib {
            let Some(parent) = slots[ia].take() else {
                continue;
            };
            let before = parent.filament_length(quad);
            let (mut i, mut j) = (cand.a.segment, cand.b.segment);
            let mut shift = cand.shift;
            if i > j {
                std::mem::swap(&mut i, &mut j);
                shift = -shift;
            }
            let (nodes_a, nodes_b) = parent.split_node_lists(i, j);
            let mut after = 0.0;
            let mut first = true;
            for (nodes, offset) in [(nodes_a, shift), (nodes_b, parent.offset())] {
                match Filament::new(nodes.clone(), parent.method(), offset) {
                    Ok(child) => {
                        after += child.filament_length(quad);
                        if first {
                            events.push(PendingEvent::Modified { slot: ia });
                            slots[ia] = Some(child);
                            first = false;
                        } else {
                            events.push(PendingEvent::Appended {
                                position: appended.len(),
                            });
                            appended.push(child);
                        }
                    }
                    Err(_) => {
                        let lost = chord_length(&nodes);
                        stats.filaments_removed += 1;
                        stats.filaments_removed_length += lost;
                    }
                }
            }
            if slots[ia].is_none() {
                // both children degenerate: the parent is simply gone
                events.push(PendingEvent::Removed {
                    slot: ia,
                    filament: parent,
                });
            }
            stats.reconnections += 1;
            stats.length_loss += before - after;
            touched[ia] = true;
        } else {
            let (Some(fa), Some(fb)) = (slots[ia].take(), slots[ib].take()) else {
                continue;
            };
            let before = fa.filament_length(quad) + fb.filament_length(quad);
            match fa.merge(&fb, cand.a.segment, cand.b.segment, cand.shift) {
                Ok(merged) => {
                    let after = merged.filament_length(quad);
                    events.push(PendingEvent::Modified { slot: ia });
                    events.push(PendingEvent::Removed {
                        slot: ib,
                        filament: fb,
                    });
                    slots[ia] = Some(merged);
                    stats.reconnections += 1;
                    stats.length_loss += before - after;
                }
                Err(_) => {
                    // merged curve unusable: restore the parents untouched
                    slots[ia] = Some(fa);
                    slots[ib] = Some(fb);
                    continue;
                }
            }
            touched[ia] = true;
            touched[ib] = true;
        }
    }

    // merged-away slots are gone from the final list, so every surviving
    // slot's index shifts down by the number of holes before it
    let mut final_index = vec![usize::MAX; slots.len()];
    let mut survivors = 0;
    for (slot, entry) in slots.iter().enumerate() {
        if entry.is_some() {
            final_index[slot] = survivors;
            survivors += 1;
        }
    }
    for event in &events {
        match event {
            PendingEvent::Modified { slot } => {
                if let Some(f) = &slots[*slot] {
                    callback(final_index[*slot], f, ReconnectionEvent::Modified);
                }
            }
            PendingEvent::Appended { position } => {
                callback(
                    survivors + position,
                    &appended[*position],
                    ReconnectionEvent::Appended,
                );
            }
            PendingEvent::Removed { slot, filament } => {
                callback(*slot, filament, ReconnectionEvent::Removed);
            }
        }
    }

    filaments.extend(slots.into_iter().flatten());
    filaments.extend(appended);
    stats
}
