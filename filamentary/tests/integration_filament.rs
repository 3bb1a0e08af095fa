// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: filament discretization invariants across the public
//! API (interpolation contracts, knot periodicity, refinement round-trip,
//! periodic folding, surgery bookkeeping).

use filamentary::filament::refinement::{refine, RefinementCriterion};
use filamentary::filament::{DiscretizationMethod, Filament};
use filamentary::quadrature::GaussLegendre;
use filamentary::tolerances;
use filamentary::Vec3;
use std::f64::consts::PI;

fn ring(n: usize, radius: f64, method: DiscretizationMethod) -> Filament {
    match Filament::from_curve(n, method, Vec3::zeros(), |u| {
        let th = 2.0 * PI * u;
        Vec3::new(radius * th.cos(), radius * th.sin(), 0.0)
    }) {
        Ok(f) => f,
        Err(e) => panic!("ring construction failed: {e}"),
    }
}

const METHODS: [DiscretizationMethod; 4] = [
    DiscretizationMethod::FiniteDifference(1),
    DiscretizationMethod::FiniteDifference(2),
    DiscretizationMethod::CubicSpline,
    DiscretizationMethod::QuinticSpline,
];

#[test]
fn interpolation_reproduces_nodes_for_all_methods() {
    for method in METHODS {
        let f = ring(20, 1.1, method);
        for i in 0..f.num_segments() {
            let start = f.evaluate(i, 0.0, 0);
            let end = f.evaluate(i, 1.0, 0);
            assert!(
                (start - f.node(i as isize)).norm() < tolerances::INTERPOLATION_NODE_ABS,
                "{method:?}: f(i, 0) must equal X[i]"
            );
            assert!(
                (end - f.node(i as isize + 1)).norm() < tolerances::INTERPOLATION_NODE_ABS,
                "{method:?}: f(i, 1) must equal X[i+1]"
            );
        }
    }
}

#[test]
fn knot_and_position_periodicity() {
    let offset = Vec3::new(0.0, 0.0, 2.0 * PI);
    let f = match Filament::from_curve(
        24,
        DiscretizationMethod::CubicSpline,
        offset,
        |u| Vec3::new(0.2 * (2.0 * PI * u).cos(), 0.2 * (2.0 * PI * u).sin(), 2.0 * PI * u),
    ) {
        Ok(f) => f,
        Err(e) => panic!("{e}"),
    };
    let n = f.num_nodes() as isize;
    let period = f.parametric_period();
    assert!(period > 0.0);
    for i in -2..2 {
        assert!(
            (f.knot(i + n) - f.knot(i) - period).abs() < 1e-12,
            "t[i+N] − t[i] must equal the parametric period"
        );
        assert!(
            (f.node(i + n) - f.node(i) - offset).norm() < 1e-12,
            "X[i+N] − X[i] must equal the offset"
        );
    }
}

#[test]
fn closed_curve_tangent_integral_vanishes() {
    let quad = GaussLegendre::new(4);
    for method in METHODS {
        let f = ring(24, 0.9, method);
        let mut sum = Vec3::zeros();
        for seg in 0..f.num_segments() {
            let h = f.knot(seg as isize + 1) - f.knot(seg as isize);
            for (&zeta, &w) in quad.nodes().iter().zip(quad.weights()) {
                sum += w * h * f.evaluate(seg, zeta, 1);
            }
        }
        assert!(
            sum.norm() < 1e-9,
            "{method:?}: arc-weighted tangent sum {sum:?}"
        );
    }
}

#[test]
fn refinement_round_trip_is_idempotent() {
    // 16 nodes on a unit ring: segments ≈ 0.39 exceed lmax = 0.3, so the
    // first pass bisects every segment; the second pass must be a no-op
    let mut f = ring(16, 1.0, DiscretizationMethod::CubicSpline);
    let criterion = RefinementCriterion::BasedOnSegmentLength {
        lmin: 0.1,
        lmax: 0.3,
    };
    let first = match refine(&mut f, criterion) {
        Ok(o) => o,
        Err(e) => panic!("{e}"),
    };
    assert!(first.inserted > 0, "first pass must insert");
    assert_eq!(first.removed, 0);

    let knots: Vec<f64> = (0..f.num_nodes()).map(|i| f.knot(i as isize)).collect();
    let second = match refine(&mut f, criterion) {
        Ok(o) => o,
        Err(e) => panic!("{e}"),
    };
    assert_eq!(second.inserted, 0, "second pass must be a no-op");
    assert_eq!(second.removed, 0);
    for (i, (&a, b)) in knots
        .iter()
        .zip((0..f.num_nodes()).map(|i| f.knot(i as isize)))
        .enumerate()
    {
        assert!((a - b).abs() < 1e-12, "knot {i} changed on a no-op pass");
    }
}

#[test]
fn fold_periodic_brings_nodes_into_cell() {
    let period = 2.0 * PI;
    let mut f = match Filament::from_curve(
        20,
        DiscretizationMethod::QuinticSpline,
        Vec3::zeros(),
        |u| {
            let th = 2.0 * PI * u;
            Vec3::new(
                th.cos().mul_add(0.8, -7.0),
                th.sin().mul_add(0.8, 15.0),
                2.5,
            )
        },
    ) {
        Ok(f) => f,
        Err(e) => panic!("{e}"),
    };
    let offset_before = f.offset();
    let moved = f.fold_periodic([period; 3]);
    assert!(moved, "off-cell ring must be recentred");
    for x in f.nodes() {
        for axis in 0..3 {
            assert!(
                x[axis] >= 0.0 && x[axis] < period,
                "node component {} outside [0, {period})",
                x[axis]
            );
        }
    }
    assert!(
        (f.offset() - offset_before).norm() < 1e-15,
        "folding must not change the offset"
    );
}

#[test]
fn split_and_merge_conserve_offsets() {
    let f = ring(24, 1.0, DiscretizationMethod::CubicSpline);
    let shift = Vec3::new(2.0 * PI, 0.0, 0.0);
    let (a, b) = match f.split(5, 17, shift) {
        Ok(pair) => pair,
        Err(e) => panic!("{e}"),
    };
    assert_eq!(a.num_nodes() + b.num_nodes(), f.num_nodes());
    assert!(
        ((a.offset() + b.offset()) - (f.offset() + shift)).norm() < 1e-14,
        "split children offsets must sum to parent + shift"
    );

    let other = ring(16, 0.5, DiscretizationMethod::CubicSpline);
    let merged = match f.merge(&other, 3, 8, Vec3::zeros()) {
        Ok(m) => m,
        Err(e) => panic!("{e}"),
    };
    assert_eq!(merged.num_nodes(), 40);
    assert!(
        (merged.offset() - (f.offset() + other.offset())).norm() < 1e-14,
        "merged offset must be the signed sum of the parents'"
    );
}

#[test]
fn length_of_refined_ring_converges() {
    let quad = GaussLegendre::new(4);
    let coarse = ring(12, 1.0, DiscretizationMethod::CubicSpline);
    let fine = ring(96, 1.0, DiscretizationMethod::CubicSpline);
    let lc = coarse.filament_length(&quad);
    let lf = fine.filament_length(&quad);
    let exact = 2.0 * PI;
    assert!(
        (lf - exact).abs() < (lc - exact).abs(),
        "refinement must reduce the length error"
    );
    assert!((lf - exact).abs() < 1e-5);
}
