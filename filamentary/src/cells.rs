// SPDX-License-Identifier: AGPL-3.0-only

//! Neighbor finders over filament segments.
//!
//! Partitions segments into a regular 3D grid of cells (side at least the
//! pair cutoff, inflated by the longest segment chord so that midpoint
//! binning never misses a close pair) and enumerates candidate pairs or the
//! segments near a query point by scanning the one-cell neighborhood ring.
//! Periodic images are handled by wrapping the cell index ring in each
//! periodic direction.
//!
//! Layout follows the classic bin → prefix-sum → scatter build:
//! `cell_start`/`cell_count` index a `sorted` permutation of the segment
//! array, so iteration order is deterministic given fixed inputs. A naive
//! O(Nseg²) enumerator backs the same interface for validation.

use crate::filament::Filament;
use crate::Vec3;
use tracing::info_span;

/// Identifies one segment of one filament.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SegmentId {
    /// Index of the filament in the caller's list.
    pub filament: usize,
    /// Segment index: segment `i` joins nodes `i` and `i + 1` (wrapped).
    pub segment: usize,
}

/// Candidate pair of segments within the pair cutoff.
#[derive(Clone, Copy, Debug)]
pub struct SegmentPair {
    /// First segment (smaller global enumeration index).
    pub a: SegmentId,
    /// Second segment.
    pub b: SegmentId,
    /// Periodic shift to add to `b`'s coordinates so that the pair is
    /// closest under the minimum image; zero in open domains.
    pub shift: Vec3,
}

/// Short-range pair-enumeration backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShortRangeBackend {
    /// All-pairs enumeration, O(Nseg²). Reference backend for tests.
    Naive,
    /// Cell lists with at most `ncells_max` cells per dimension.
    CellLists {
        /// Upper bound on cells per dimension (grid memory control).
        ncells_max: usize,
    },
}

/// Fold `r` to its minimum image under the (possibly partially open) periods.
#[must_use]
pub fn minimum_image(mut r: Vec3, periods: [f64; 3]) -> Vec3 {
    for axis in 0..3 {
        let period = periods[axis];
        if period.is_finite() {
            r[axis] -= period * (r[axis] / period).round();
        }
    }
    r
}

#[derive(Clone, Copy, Debug)]
struct SegEntry {
    id: SegmentId,
    mid: Vec3,
}

/// Segment neighbor finder with naive and cell-list backends.
#[derive(Debug)]
pub struct SegmentFinder {
    entries: Vec<SegEntry>,
    periods: [f64; 3],
    cutoff: f64,
    grid: Option<Grid>,
}

#[derive(Debug)]
struct Grid {
    ncells: [usize; 3],
    cell_size: [f64; 3],
    origin: Vec3,
    periodic: [bool; 3],
    cell_start: Vec<u32>,
    cell_count: Vec<u32>,
    sorted: Vec<u32>,
}

impl SegmentFinder {
    /// Build a finder over all segments of `filaments`.
    ///
    /// `cutoff` is the maximum midpoint separation of interest; the cell
    /// side is inflated by the longest segment chord so that segment
    /// proximity (not just midpoint proximity) is covered by the ring scan.
    #[must_use]
    pub fn build(
        filaments: &[Filament],
        periods: [f64; 3],
        cutoff: f64,
        backend: ShortRangeBackend,
    ) -> Self {
        let _span = info_span!("SegmentFinder::build", cutoff).entered();
        let mut entries = Vec::new();
        let mut max_chord = 0.0_f64;
        for (fi, f) in filaments.iter().enumerate() {
            for seg in 0..f.num_segments() {
                let a = f.node(seg as isize);
                let b = f.node(seg as isize + 1);
                max_chord = max_chord.max((b - a).norm());
                entries.push(SegEntry {
                    id: SegmentId {
                        filament: fi,
                        segment: seg,
                    },
                    mid: 0.5 * (a + b),
                });
            }
        }
        let grid = match backend {
            ShortRangeBackend::Naive => None,
            ShortRangeBackend::CellLists { ncells_max } => Some(Grid::build(
                &entries,
                periods,
                cutoff + max_chord,
                ncells_max,
            )),
        };
        Self {
            entries,
            periods,
            cutoff,
            grid,
        }
    }

    /// Number of segments indexed.
    #[must_use]
    pub fn num_segments(&self) -> usize {
        self.entries.len()
    }

    /// Enumerate unordered candidate pairs whose midpoints are within the
    /// cutoff under the minimum image. Deterministic order.
    #[must_use]
    pub fn pairs(&self) -> Vec<SegmentPair> {
        let _span = info_span!("SegmentFinder::pairs", n = self.entries.len()).entered();
        let mut out = Vec::new();
        match &self.grid {
            None => {
                for ia in 0..self.entries.len() {
                    for ib in ia + 1..self.entries.len() {
                        self.try_pair(ia, ib, &mut out);
                    }
                }
            }
            Some(grid) => {
                let mut neighbor_cells = Vec::with_capacity(27);
                for cell in 0..grid.num_cells() {
                    grid.neighbor_cells(grid.cell_coords(cell), &mut neighbor_cells);
                    for &other in &neighbor_cells {
                        for &ia in grid.cell_slice(cell) {
                            for &ib in grid.cell_slice(other) {
                                if (ia as usize) < ib as usize {
                                    self.try_pair(ia as usize, ib as usize, &mut out);
                                }
                            }
                        }
                    }
                }
            }
        }
        out
    }

    fn try_pair(&self, ia: usize, ib: usize, out: &mut Vec<SegmentPair>) {
        let a = &self.entries[ia];
        let b = &self.entries[ib];
        let raw = b.mid - a.mid;
        let wrapped = minimum_image(raw, self.periods);
        if wrapped.norm() <= self.cutoff {
            out.push(SegmentPair {
                a: a.id,
                b: b.id,
                shift: wrapped - raw,
            });
        }
    }

    /// Invoke `f` for every segment whose midpoint could lie within the
    /// cutoff of `x` (ring scan; callers apply their own exact truncation).
    /// Deterministic visit order.
    pub fn for_each_segment_near<F: FnMut(SegmentId)>(&self, x: Vec3, mut f: F) {
        match &self.grid {
            None => {
                for e in &self.entries {
                    f(e.id);
                }
            }
            Some(grid) => {
                let mut neighbor_cells = Vec::with_capacity(27);
                grid.neighbor_cells(grid.point_coords(x), &mut neighbor_cells);
                for &cell in &neighbor_cells {
                    for &i in grid.cell_slice(cell) {
                        f(self.entries[i as usize].id);
                    }
                }
            }
        }
    }
}

impl Grid {
    fn build(entries: &[SegEntry], periods: [f64; 3], side_min: f64, ncells_max: usize) -> Self {
        let mut origin = Vec3::zeros();
        let mut extent = [0.0_f64; 3];
        let mut periodic = [false; 3];
        for axis in 0..3 {
            if periods[axis].is_finite() {
                periodic[axis] = true;
                extent[axis] = periods[axis];
            }
        }
        if periodic.iter().any(|p| !p) {
            // open directions: bounding box of the midpoints, with a margin
            // so boundary points never land outside the grid
            let mut lo = [f64::INFINITY; 3];
            let mut hi = [f64::NEG_INFINITY; 3];
            for e in entries {
                for axis in 0..3 {
                    lo[axis] = lo[axis].min(e.mid[axis]);
                    hi[axis] = hi[axis].max(e.mid[axis]);
                }
            }
            for axis in 0..3 {
                if !periodic[axis] {
                    let span = (hi[axis] - lo[axis]).max(side_min);
                    origin[axis] = lo[axis] - 0.5 * side_min;
                    extent[axis] = span + side_min;
                }
            }
        }

        let mut ncells = [1usize; 3];
        let mut cell_size = [0.0_f64; 3];
        for axis in 0..3 {
            let n = ((extent[axis] / side_min).floor() as usize)
                .clamp(1, ncells_max.max(1));
            ncells[axis] = n;
            cell_size[axis] = extent[axis] / n as f64;
        }

        let total = ncells[0] * ncells[1] * ncells[2];
        let mut cell_ids = Vec::with_capacity(entries.len());
        for e in entries {
            cell_ids.push(cell_index_of(e.mid, origin, cell_size, ncells, periodic));
        }

        // bin → prefix sum → scatter
        let mut cell_count = vec![0u32; total];
        for &c in &cell_ids {
            cell_count[c] += 1;
        }
        let mut cell_start = vec![0u32; total];
        let mut offset = 0u32;
        for c in 0..total {
            cell_start[c] = offset;
            offset += cell_count[c];
        }
        let mut cursor = cell_start.clone();
        let mut sorted = vec![0u32; entries.len()];
        for (i, &c) in cell_ids.iter().enumerate() {
            sorted[cursor[c] as usize] = i as u32;
            cursor[c] += 1;
        }

        Self {
            ncells,
            cell_size,
            origin,
            periodic,
            cell_start,
            cell_count,
            sorted,
        }
    }

    fn num_cells(&self) -> usize {
        self.ncells[0] * self.ncells[1] * self.ncells[2]
    }

    fn cell_coords(&self, cell: usize) -> [isize; 3] {
        let nx = self.ncells[0];
        let ny = self.ncells[1];
        [
            (cell % nx) as isize,
            ((cell / nx) % ny) as isize,
            (cell / (nx * ny)) as isize,
        ]
    }

    fn point_coords(&self, x: Vec3) -> [isize; 3] {
        let mut coords = [0isize; 3];
        for axis in 0..3 {
            let rel = (x[axis] - self.origin[axis]) / self.cell_size[axis];
            let n = self.ncells[axis] as isize;
            let mut c = rel.floor() as isize;
            if self.periodic[axis] {
                c = c.rem_euclid(n);
            } else {
                c = c.clamp(0, n - 1);
            }
            coords[axis] = c;
        }
        coords
    }

    fn cell_slice(&self, cell: usize) -> &[u32] {
        let start = self.cell_start[cell] as usize;
        let count = self.cell_count[cell] as usize;
        &self.sorted[start..start + count]
    }

    /// Collect the (deduplicated) linear indices of the 27-neighborhood of
    /// `coords`, wrapping periodic axes and clipping open ones.
    fn neighbor_cells(&self, coords: [isize; 3], out: &mut Vec<usize>) {
        out.clear();
        for dz in -1isize..=1 {
            for dy in -1isize..=1 {
                for dx in -1isize..=1 {
                    let mut c = [0usize; 3];
                    let delta = [dx, dy, dz];
                    let mut valid = true;
                    for axis in 0..3 {
                        let n = self.ncells[axis] as isize;
                        let raw = coords[axis] + delta[axis];
                        if self.periodic[axis] {
                            c[axis] = raw.rem_euclid(n) as usize;
                        } else if raw < 0 || raw >= n {
                            valid = false;
                            break;
                        } else {
                            c[axis] = raw as usize;
                        }
                    }
                    if valid {
                        let idx = c[0]
                            + self.ncells[0] * (c[1] + self.ncells[1] * c[2]);
                        if !out.contains(&idx) {
                            out.push(idx);
                        }
                    }
                }
            }
        }
    }
}

fn cell_index_of(
    x: Vec3,
    origin: Vec3,
    cell_size: [f64; 3],
    ncells: [usize; 3],
    periodic: [bool; 3],
) -> usize {
    let mut c = [0usize; 3];
    for axis in 0..3 {
        let rel = (x[axis] - origin[axis]) / cell_size[axis];
        let n = ncells[axis] as isize;
        let raw = rel.floor() as isize;
        c[axis] = if periodic[axis] {
            raw.rem_euclid(n) as usize
        } else {
            raw.clamp(0, n - 1) as usize
        };
    }
    c[0] + ncells[0] * (c[1] + ncells[1] * c[2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filament::DiscretizationMethod;

    fn ring(n: usize, radius: f64, center: Vec3) -> Filament {
        let points: Vec<Vec3> = (0..n)
            .map(|i| {
                let theta = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
                center + Vec3::new(radius * theta.cos(), radius * theta.sin(), 0.0)
            })
            .collect();
        match Filament::new(points, DiscretizationMethod::CubicSpline, Vec3::zeros()) {
            Ok(f) => f,
            Err(e) => panic!("ring construction failed: {e}"),
        }
    }

    #[test]
    fn minimum_image_wraps_periodic_axes() {
        let periods = [10.0, 10.0, f64::INFINITY];
        let r = minimum_image(Vec3::new(7.0, -6.0, 12.0), periods);
        assert!((r.x - (-3.0)).abs() < 1e-14);
        assert!((r.y - 4.0).abs() < 1e-14);
        assert!((r.z - 12.0).abs() < 1e-14);
    }

    #[test]
    fn naive_and_cells_agree_on_pairs() {
        let period = 2.0 * std::f64::consts::PI;
        let periods = [period; 3];
        let f1 = ring(16, 1.0, Vec3::new(3.0, 3.0, 3.0));
        let f2 = ring(16, 1.0, Vec3::new(3.0, 3.0, 3.8));
        let filaments = vec![f1, f2];
        let cutoff = 1.2;

        let naive = SegmentFinder::build(&filaments, periods, cutoff, ShortRangeBackend::Naive);
        let cells = SegmentFinder::build(
            &filaments,
            periods,
            cutoff,
            ShortRangeBackend::CellLists { ncells_max: 64 },
        );

        let mut pn: Vec<(SegmentId, SegmentId)> =
            naive.pairs().iter().map(|p| (p.a, p.b)).collect();
        let mut pc: Vec<(SegmentId, SegmentId)> =
            cells.pairs().iter().map(|p| (p.a, p.b)).collect();
        pn.sort();
        pc.sort();
        assert_eq!(pn, pc, "cell-list pairs must match naive enumeration");
        assert!(!pn.is_empty(), "close rings must produce candidates");
    }

    #[test]
    fn pairs_are_deterministic() {
        let periods = [10.0; 3];
        let filaments = vec![ring(12, 1.5, Vec3::new(5.0, 5.0, 5.0))];
        let build = || {
            SegmentFinder::build(
                &filaments,
                periods,
                1.0,
                ShortRangeBackend::CellLists { ncells_max: 32 },
            )
            .pairs()
            .iter()
            .map(|p| (p.a, p.b))
            .collect::<Vec<_>>()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn periodic_image_pair_detected() {
        // two rings close only through the periodic boundary
        let period = 10.0;
        let periods = [period; 3];
        let f1 = ring(12, 1.0, Vec3::new(5.0, 5.0, 0.4));
        let f2 = ring(12, 1.0, Vec3::new(5.0, 5.0, 9.6));
        let filaments = vec![f1, f2];
        let finder = SegmentFinder::build(
            &filaments,
            periods,
            1.0,
            ShortRangeBackend::CellLists { ncells_max: 16 },
        );
        let cross: Vec<_> = finder
            .pairs()
            .into_iter()
            .filter(|p| p.a.filament != p.b.filament)
            .collect();
        assert!(!cross.is_empty(), "image pair must be found");
        for p in cross {
            assert!(
                p.shift.norm() > 1.0,
                "cross pair must carry a periodic shift, got {:?}",
                p.shift
            );
        }
    }

    #[test]
    fn segments_near_covers_local_segments() {
        let periods = [10.0; 3];
        let f = ring(16, 1.0, Vec3::new(5.0, 5.0, 5.0));
        let query = f.node(0);
        let filaments = vec![f];
        let finder = SegmentFinder::build(
            &filaments,
            periods,
            1.0,
            ShortRangeBackend::CellLists { ncells_max: 16 },
        );
        let mut seen = Vec::new();
        finder.for_each_segment_near(query, |id| seen.push(id));
        assert!(seen.contains(&SegmentId {
            filament: 0,
            segment: 0
        }));
        assert!(seen.contains(&SegmentId {
            filament: 0,
            segment: 15
        }));
    }

    #[test]
    fn open_domain_uses_bounding_box() {
        let periods = [f64::INFINITY; 3];
        let filaments = vec![ring(16, 1.0, Vec3::new(100.0, -50.0, 3.0))];
        let finder = SegmentFinder::build(
            &filaments,
            periods,
            0.5,
            ShortRangeBackend::CellLists { ncells_max: 64 },
        );
        // neighboring segments of the ring are within the cutoff
        assert!(!finder.pairs().is_empty());
    }
}
