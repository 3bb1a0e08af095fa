// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: end-to-end dynamics scenarios.
//!
//! A translating vortex ring against the thin-core formula, momentum
//! conservation for a coaxial ring pair, the helicity of a Hopf link, a
//! reconnection inside the stepping loop, and the snapshot round-trip.

use filamentary::biotsavart::{
    LongRangeBackend, ParamsBiotSavart, ShortRangeBackend, VelocityFlags,
};
use filamentary::diagnostics;
use filamentary::filament::{DiscretizationMethod, Filament};
use filamentary::quadrature::GaussLegendre;
use filamentary::reconnection::ReconnectionCriterion;
use filamentary::snapshot::Snapshot;
use filamentary::timestepping::{Problem, Scheme, SolverOptions, StepStatus, VortexFilamentSolver};
use filamentary::tolerances;
use filamentary::{BiotSavartCache, Vec3};
use std::f64::consts::PI;

fn ring(n: usize, radius: f64, center: Vec3, method: DiscretizationMethod) -> Filament {
    match Filament::from_curve(n, method, Vec3::zeros(), |u| {
        let th = 2.0 * PI * u;
        center + Vec3::new(radius * th.cos(), radius * th.sin(), 0.0)
    }) {
        Ok(f) => f,
        Err(e) => panic!("ring construction failed: {e}"),
    }
}

fn open_params(circulation: f64, core_radius: f64) -> ParamsBiotSavart {
    ParamsBiotSavart {
        circulation,
        core_radius,
        core_parameter: 0.5,
        periods: [f64::INFINITY; 3],
        grid_size: [16; 3],
        alpha: 1.0,
        rcut: 1.0,
        quad_short: GaussLegendre::new(4),
        quad_long: GaussLegendre::new(4),
        backend_short: ShortRangeBackend::Naive,
        backend_long: LongRangeBackend::ExactSum,
    }
}

#[test]
fn periodic_ring_translates_at_thin_core_velocity() {
    // box 2π³, grid 32³ (kmax = 16), α = kmax/5, rcut = 4√2/α
    let period = 2.0 * PI;
    let radius = PI / 3.0;
    let circulation = 1.2;
    let core_radius = 1e-6;
    let core_parameter = 0.5;
    let alpha = 16.0 / 5.0;
    let params = ParamsBiotSavart {
        circulation,
        core_radius,
        core_parameter,
        periods: [period; 3],
        grid_size: [32; 3],
        alpha,
        rcut: 4.0 * 2.0_f64.sqrt() / alpha,
        quad_short: GaussLegendre::new(4),
        quad_long: GaussLegendre::new(3),
        backend_short: ShortRangeBackend::CellLists { ncells_max: 16 },
        backend_long: LongRangeBackend::Nufft {
            tolerance: 1e-6,
            support: 6,
            oversampling: 2,
        },
    };
    let center = Vec3::new(PI, PI, PI);
    let problem = Problem {
        filaments: vec![ring(32, radius, center, DiscretizationMethod::CubicSpline)],
        params,
        tspan: (0.0, 0.01),
    };
    let options = SolverOptions {
        scheme: Scheme::RK4,
        dt: 1e-3,
        ..Default::default()
    };
    let mut solver = match VortexFilamentSolver::new(problem, options) {
        Ok(s) => s,
        Err(e) => panic!("{e}"),
    };

    // the evaluator's initial velocity against the thin-core formula
    let v_formula = circulation / (4.0 * PI * radius)
        * ((8.0 * radius / core_radius).ln() - core_parameter - 0.5);
    let v0: f64 = solver.state().velocities[0]
        .iter()
        .map(|v| v.z)
        .sum::<f64>()
        / 32.0;
    assert!(
        ((v0 - v_formula) / v_formula).abs() < tolerances::RING_VELOCITY_REL,
        "ring velocity {v0} vs formula {v_formula}"
    );

    let z0: f64 = solver.state().filaments[0].nodes().iter().map(|x| x.z).sum::<f64>() / 32.0;
    match solver.run() {
        Ok(StepStatus::Finished) => {}
        other => panic!("unexpected outcome: {other:?}"),
    }
    let z1: f64 = solver.state().filaments[0].nodes().iter().map(|x| x.z).sum::<f64>() / 32.0;

    // translation is self-consistent with the measured initial velocity
    let expected = v0 * 0.01;
    assert!(
        ((z1 - z0 - expected) / expected).abs() < tolerances::RING_TRANSLATION_REL,
        "translation {} vs v0·t {expected}",
        z1 - z0
    );
    // the ring stays planar and round
    let radius_now: f64 = solver.state().filaments[0]
        .nodes()
        .iter()
        .map(|x| ((x.x - PI).powi(2) + (x.y - PI).powi(2)).sqrt())
        .sum::<f64>()
        / 32.0;
    assert!(
        (radius_now - radius).abs() < 1e-4 * radius,
        "radius {radius_now} vs initial {radius}"
    );
}

#[test]
fn coaxial_ring_pair_conserves_axial_impulse() {
    let circulation = 1.0;
    let params = open_params(circulation, 1e-7);
    let quad = GaussLegendre::new(4);
    let method = DiscretizationMethod::CubicSpline;
    let filaments = vec![
        ring(32, 1.0, Vec3::zeros(), method),
        ring(32, 1.0, Vec3::new(0.0, 0.0, 0.5), method),
    ];
    let p0 = diagnostics::impulse(&filaments, &quad, circulation);
    assert!((p0.z - 2.0 * PI).abs() < 1e-3, "initial impulse {}", p0.z);

    let problem = Problem {
        filaments,
        params,
        tspan: (0.0, 0.05),
    };
    let options = SolverOptions {
        scheme: Scheme::RK4,
        dt: 1e-3,
        ..Default::default()
    };
    let mut solver = match VortexFilamentSolver::new(problem, options) {
        Ok(s) => s,
        Err(e) => panic!("{e}"),
    };
    let mut worst_drift = 0.0_f64;
    loop {
        let status = match solver.step() {
            Ok(s) => s,
            Err(e) => panic!("{e}"),
        };
        let p = diagnostics::impulse(&solver.state().filaments, &quad, circulation);
        worst_drift = worst_drift.max((p.z - p0.z).abs());
        if status != StepStatus::Running {
            break;
        }
    }
    assert!(
        worst_drift < tolerances::MOMENTUM_DRIFT_REL * p0.z,
        "axial impulse drift {worst_drift} over {} steps",
        solver.state().stats.total_steps
    );
    // the trailing ring must have started catching up (leapfrog exchange)
    let z_lead: f64 = solver.state().filaments[0].nodes().iter().map(|x| x.z).sum::<f64>() / 32.0;
    assert!(z_lead > 0.0, "rings must translate forward");
}

#[test]
fn hopf_link_helicity_equals_linking_number() {
    // ring A in the xy-plane at the origin, ring B in the xz-plane through
    // A's centre: linking number ±1, |H| = 2Γ²
    let circulation = 1.0;
    let radius = 1.2;
    let params = open_params(circulation, 1e-6);
    let a = ring(48, radius, Vec3::zeros(), DiscretizationMethod::QuinticSpline);
    let b = match Filament::from_curve(
        48,
        DiscretizationMethod::QuinticSpline,
        Vec3::zeros(),
        |u| {
            let th = 2.0 * PI * u;
            Vec3::new(radius.mul_add(th.cos(), radius), 0.0, radius * th.sin())
        },
    ) {
        Ok(f) => f,
        Err(e) => panic!("{e}"),
    };
    let filaments = vec![a, b];
    let mut cache = match BiotSavartCache::new(params) {
        Ok(c) => c,
        Err(e) => panic!("{e}"),
    };
    let mut velocities = Vec::new();
    cache.compute_on_nodes(&filaments, Some(&mut velocities), None, VelocityFlags::full());
    let h = diagnostics::helicity(&filaments, &velocities, circulation);
    let normalized = h / (2.0 * circulation * circulation);
    assert!(
        (normalized.abs() - 1.0).abs() < tolerances::HELICITY_REL,
        "H/2Γ² = {normalized}, expected ±1"
    );
}

#[test]
fn reconnection_fires_inside_the_stepping_loop() {
    // hairpin with two antiparallel strands 0.05 apart
    let gap = 0.05;
    let half = 14usize;
    let mut nodes = Vec::new();
    for i in 0..half {
        let x = -2.0 + 4.0 * i as f64 / (half - 1) as f64;
        nodes.push(Vec3::new(x, -0.5 * gap, 0.0));
    }
    nodes.push(Vec3::new(2.3, 0.0, 0.0));
    for i in 0..half {
        let x = 2.0 - 4.0 * i as f64 / (half - 1) as f64;
        nodes.push(Vec3::new(x, 0.5 * gap, 0.0));
    }
    nodes.push(Vec3::new(-2.3, 0.0, 0.0));
    let hairpin = match Filament::new(nodes, DiscretizationMethod::CubicSpline, Vec3::zeros()) {
        Ok(f) => f,
        Err(e) => panic!("{e}"),
    };

    let problem = Problem {
        filaments: vec![hairpin],
        params: open_params(1.0, 1e-8),
        tspan: (0.0, 1e-6),
    };
    let options = SolverOptions {
        scheme: Scheme::Euler,
        dt: 1e-6,
        lia_only: true,
        reconnection: Some(ReconnectionCriterion::BasedOnDistance {
            d_crit: 0.15,
            use_curved_segments: false,
        }),
        ..Default::default()
    };
    let mut solver = match VortexFilamentSolver::new(problem, options) {
        Ok(s) => s,
        Err(e) => panic!("{e}"),
    };
    match solver.step() {
        Ok(_) => {}
        Err(e) => panic!("{e}"),
    }
    assert_eq!(solver.state().stats.reconnections, 1);
    assert_eq!(solver.state().filaments.len(), 2);
    assert!(solver.state().stats.reconnection_length_loss > 0.0);
    // per-node arrays resized in lockstep with the new filament list
    assert_eq!(solver.state().velocities.len(), 2);
    assert_eq!(solver.state().streamfunctions.len(), 2);
    for (f, v) in solver
        .state()
        .filaments
        .iter()
        .zip(&solver.state().velocities)
    {
        assert_eq!(f.num_nodes(), v.len());
    }
}

#[test]
fn snapshot_round_trips_solver_state() {
    let problem = Problem {
        filaments: vec![ring(
            24,
            1.0,
            Vec3::zeros(),
            DiscretizationMethod::CubicSpline,
        )],
        params: open_params(1.0, 1e-8),
        tspan: (0.0, 1.0),
    };
    let options = SolverOptions {
        scheme: Scheme::RK4,
        dt: 1e-4,
        lia_only: true,
        ..Default::default()
    };
    let mut solver = match VortexFilamentSolver::new(problem, options) {
        Ok(s) => s,
        Err(e) => panic!("{e}"),
    };
    for _ in 0..2 {
        if let Err(e) = solver.step() {
            panic!("{e}");
        }
    }

    let snap = Snapshot::from_state(solver.state());
    let path = std::env::temp_dir().join("filamentary_integration_snapshot.json");
    if let Err(e) = snap.write(&path) {
        panic!("{e}");
    }
    let back = match Snapshot::read(&path) {
        Ok(s) => s,
        Err(e) => panic!("{e}"),
    };
    let _ = std::fs::remove_file(&path);

    assert_eq!(snap, back, "snapshot must round-trip bitwise");
    let rebuilt = match back.rebuild_filaments(DiscretizationMethod::CubicSpline) {
        Ok(f) => f,
        Err(e) => panic!("{e}"),
    };
    assert_eq!(rebuilt.len(), 1);
    for (a, b) in rebuilt[0]
        .nodes()
        .iter()
        .zip(solver.state().filaments[0].nodes())
    {
        assert_eq!(a.x.to_bits(), b.x.to_bits());
        assert_eq!(a.y.to_bits(), b.y.to_bits());
        assert_eq!(a.z.to_bits(), b.z.to_bits());
    }
    assert_eq!(back.step, 2);
    assert!((back.time - 2e-4).abs() < 1e-15);
}
