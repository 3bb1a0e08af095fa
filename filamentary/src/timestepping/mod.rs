// SPDX-License-Identifier: AGPL-3.0-only

//! Time integration of the filament dynamics.
//!
//! A [`VortexFilamentSolver`] advances a [`Problem`] step by step:
//!
//! 1. record the previous step's velocities as the initial slope;
//! 2. run the scheme's stages, each evaluating the Biot–Savart velocity
//!    with the appropriate term subset plus forcing hooks;
//! 3. reject the step (halve dt, restore state) if the maximum nodal
//!    displacement exceeds the adaptivity ceiling;
//! 4. advect the nodes;
//! 5. fold periodic positions into the fundamental cell;
//! 6. run the reconnection engine;
//! 7. refine, dropping filaments that become degenerate;
//! 8. recompute the full velocity and streamfunction at the new positions;
//! 9. estimate the next dt;
//! 10. fire the user callback.
//!
//! The loop ends at the end of the time span, when dt underflows `dtmin`
//! (a hard error), or when no vortices remain.

pub mod adaptivity;
pub mod schemes;

pub use adaptivity::AdaptivityCriterion;
pub use schemes::Scheme;

use tracing::{debug, info_span};

use crate::biotsavart::{BiotSavartCache, ParamsBiotSavart, VelocityFlags};
use crate::error::FilamentaryError;
use crate::filament::refinement::{refine, RefinementCriterion};
use crate::filament::Filament;
use crate::forcing::Forcing;
use crate::reconnection::{reconnect_pass, ReconnectionCriterion};
use crate::Vec3;

/// Which part of the velocity is treated as "fast" by split schemes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FastTerm {
    /// The local induction approximation term.
    LocalInduction,
    /// The whole short-range part (including the local term).
    ShortRange,
}

/// Initial condition, physics parameters and time span.
pub struct Problem {
    /// Initial filaments.
    pub filaments: Vec<Filament>,
    /// Biot–Savart configuration.
    pub params: ParamsBiotSavart,
    /// Simulation time span (start, end).
    pub tspan: (f64, f64),
}

/// Callback invoked before each step; may inject filaments.
pub type BeforeCallback = Box<dyn FnMut(&mut SolverState)>;
/// Callback invoked after each step with a consistent state.
pub type AfterCallback = Box<dyn FnMut(&SolverState)>;

/// Solver configuration.
pub struct SolverOptions {
    /// Time-integration scheme.
    pub scheme: Scheme,
    /// Initial timestep.
    pub dt: f64,
    /// Hard lower bound on the timestep.
    pub dtmin: f64,
    /// Timestep adaptation rule.
    pub adaptivity: AdaptivityCriterion,
    /// Spatial refinement rule, applied every step.
    pub refinement: RefinementCriterion,
    /// Reconnection rule; `None` disables topology changes.
    pub reconnection: Option<ReconnectionCriterion>,
    /// Fast-term selection for split schemes.
    pub fast_term: FastTerm,
    /// Restrict the dynamics to the local induction approximation.
    pub lia_only: bool,
    /// Fold filaments into the fundamental cell after advection.
    pub fold_periodic: bool,
    /// Forcing and dissipation hooks.
    pub forcing: Forcing,
    /// Pre-step callback (may inject filaments).
    pub affect_before: Option<BeforeCallback>,
    /// Post-step callback (read-only state access).
    pub callback_after: Option<AfterCallback>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            scheme: Scheme::RK4,
            dt: 1e-3,
            dtmin: 1e-10,
            adaptivity: AdaptivityCriterion::Fixed,
            refinement: RefinementCriterion::NoRefinement,
            reconnection: None,
            fast_term: FastTerm::LocalInduction,
            lia_only: false,
            fold_periodic: true,
            forcing: Forcing::default(),
            affect_before: None,
            callback_after: None,
        }
    }
}

/// Outcome of one step (or of [`VortexFilamentSolver::run`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepStatus {
    /// Simulation continues.
    Running,
    /// End of the time span reached (or stop flag raised).
    Finished,
    /// Every filament was removed.
    NoVorticesLeft,
}

/// Cumulative counters over the solver lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SolverStats {
    /// Accepted steps.
    pub total_steps: usize,
    /// Rejected (halved) step attempts.
    pub rejected_steps: usize,
    /// Reconnections performed.
    pub reconnections: usize,
    /// Length lost to reconnection surgery.
    pub reconnection_length_loss: f64,
    /// Filaments dropped (degenerate or merged away).
    pub filaments_removed: usize,
    /// Length of dropped filaments.
    pub filaments_removed_length: f64,
}

/// Mutable simulation state exposed to callbacks.
pub struct SolverState {
    /// Current filaments.
    pub filaments: Vec<Filament>,
    /// Line velocities v_L (what the stepper advects by).
    pub velocities: Vec<Vec<Vec3>>,
    /// Self-induced superfluid velocities v_s (preserved for diagnostics
    /// when mutual friction rotates them into v_L).
    pub superfluid_velocities: Vec<Vec<Vec3>>,
    /// Streamfunction values at the nodes.
    pub streamfunctions: Vec<Vec<Vec3>>,
    /// Unit tangents at the nodes.
    pub tangents: Vec<Vec<Vec3>>,
    /// Current simulation time.
    pub time: f64,
    /// Current timestep.
    pub dt: f64,
    /// Accepted step count.
    pub step: usize,
    /// Cumulative statistics.
    pub stats: SolverStats,
    /// Cooperative stop flag, checked at step boundaries.
    pub stop: bool,
    injected: Vec<Filament>,
}

impl SolverState {
    /// Queue a filament for injection at the next step boundary
    /// (the supported mutation from `affect_before`).
    pub fn inject_filament(&mut self, filament: Filament) {
        self.injected.push(filament);
    }

    /// Maximum nodal line-velocity magnitude.
    #[must_use]
    pub fn max_velocity(&self) -> f64 {
        self.velocities
            .iter()
            .flatten()
            .map(nalgebra::Vector3::norm)
            .fold(0.0, f64::max)
    }

    /// Minimum inter-node distance over all filaments.
    #[must_use]
    pub fn min_node_distance(&self) -> f64 {
        self.filaments
            .iter()
            .map(Filament::minimum_node_distance)
            .fold(f64::INFINITY, f64::min)
    }
}

/// Advances filaments under the Ewald-split Biot–Savart dynamics.
pub struct VortexFilamentSolver {
    state: SolverState,
    cache: BiotSavartCache,
    scheme: Scheme,
    adaptivity: AdaptivityCriterion,
    refinement: RefinementCriterion,
    reconnection: Option<ReconnectionCriterion>,
    fast_term: FastTerm,
    lia_only: bool,
    fold: bool,
    forcing: Forcing,
    dtmin: f64,
    tspan: (f64, f64),
    affect_before: Option<BeforeCallback>,
    callback_after: Option<AfterCallback>,
}

impl VortexFilamentSolver {
    /// Build a solver; inadmissible configurations fail here, before any
    /// stepping.
    ///
    /// # Errors
    /// [`FilamentaryError::IncompatibleScheme`] on a bad scheme/option
    /// combination, [`FilamentaryError::InvalidParameter`] on a bad dt or
    /// time span, plus everything [`BiotSavartCache::new`] can raise.
    pub fn new(problem: Problem, options: SolverOptions) -> Result<Self, FilamentaryError> {
        let SolverOptions {
            scheme,
            dt,
            dtmin,
            adaptivity,
            refinement,
            reconnection,
            fast_term,
            lia_only,
            fold_periodic,
            forcing,
            affect_before,
            callback_after,
        } = options;

        if !(dt > 0.0) {
            return Err(FilamentaryError::InvalidParameter {
                name: "dt",
                value: dt,
            });
        }
        if problem.tspan.1 <= problem.tspan.0 {
            return Err(FilamentaryError::InvalidParameter {
                name: "tspan",
                value: problem.tspan.1 - problem.tspan.0,
            });
        }
        if lia_only && fast_term == FastTerm::ShortRange && scheme.uses_fast_slow_split() {
            return Err(FilamentaryError::IncompatibleScheme(
                "LIA-only dynamics cannot use a non-local fast term",
            ));
        }
        if scheme.is_multirate() && adaptivity.is_adaptive() {
            return Err(FilamentaryError::IncompatibleScheme(
                "multirate schemes require a fixed timestep",
            ));
        }

        let cache = BiotSavartCache::new(problem.params)?;
        if let Some(f) = problem.filaments.first() {
            forcing.check_consistency(f.node(0), problem.tspan.0);
        }

        let state = SolverState {
            filaments: problem.filaments,
            velocities: Vec::new(),
            superfluid_velocities: Vec::new(),
            streamfunctions: Vec::new(),
            tangents: Vec::new(),
            time: problem.tspan.0,
            dt,
            step: 0,
            stats: SolverStats::default(),
            stop: false,
            injected: Vec::new(),
        };
        let mut solver = Self {
            state,
            cache,
            scheme,
            adaptivity,
            refinement,
            reconnection,
            fast_term,
            lia_only,
            fold: fold_periodic,
            forcing,
            dtmin,
            tspan: problem.tspan,
            affect_before,
            callback_after,
        };
        solver.recompute_full();
        Ok(solver)
    }

    /// Current state (filaments, per-node fields, time, statistics).
    #[must_use]
    pub fn state(&self) -> &SolverState {
        &self.state
    }

    /// Evaluator parameters.
    #[must_use]
    pub fn params(&self) -> &ParamsBiotSavart {
        self.cache.params()
    }

    /// Biot–Savart cache (for spectra diagnostics).
    #[must_use]
    pub fn cache(&self) -> &BiotSavartCache {
        &self.cache
    }

    /// Raise the cooperative stop flag.
    pub fn request_stop(&mut self) {
        self.state.stop = true;
    }

    fn full_flags(&self) -> VelocityFlags {
        if self.lia_only {
            VelocityFlags::local_only()
        } else {
            VelocityFlags::full()
        }
    }

    fn fast_flags(&self) -> VelocityFlags {
        match self.fast_term {
            FastTerm::LocalInduction => VelocityFlags::local_only(),
            FastTerm::ShortRange => VelocityFlags::shortrange_only(),
        }
    }

    fn slow_flags(&self) -> VelocityFlags {
        if self.lia_only {
            // the full velocity is the local term; nothing is slow
            VelocityFlags {
                shortrange: false,
                longrange: false,
                local: false,
            }
        } else {
            self.fast_flags().complement()
        }
    }

    /// Advance the simulation by one step.
    ///
    /// # Errors
    /// [`FilamentaryError::TimestepUnderflow`] when rejection pushes dt
    /// below `dtmin` before the end of the span; spline-solve failures
    /// propagate unchanged.
    pub fn step(&mut self) -> Result<StepStatus, FilamentaryError> {
        if self.state.stop || self.state.time >= self.tspan.1 {
            return Ok(StepStatus::Finished);
        }
        if self.state.filaments.is_empty() {
            return Ok(StepStatus::NoVorticesLeft);
        }
        let _span = info_span!("solver::step", step = self.state.step).entered();

        if let Some(cb) = self.affect_before.as_mut() {
            cb(&mut self.state);
        }
        if !self.state.injected.is_empty() {
            let mut injected = std::mem::take(&mut self.state.injected);
            self.state.filaments.append(&mut injected);
            self.recompute_full();
        }

        // stage loop with displacement-based rejection
        let x0 = self.state.filaments.clone();
        let ceiling = self
            .adaptivity
            .displacement_ceiling(self.state.min_node_distance());
        let mut dt = self.state.dt.min(self.tspan.1 - self.state.time);
        loop {
            let max_disp = self.advance(dt)?;
            match ceiling {
                Some(c) if max_disp > c => {
                    self.state.stats.rejected_steps += 1;
                    self.state.filaments = x0.clone();
                    dt *= 0.5;
                    debug!(dt, max_disp, ceiling = c, "step rejected");
                    if dt < self.dtmin {
                        return Err(FilamentaryError::TimestepUnderflow {
                            dt,
                            dtmin: self.dtmin,
                        });
                    }
                }
                _ => break,
            }
        }

        // fold into the fundamental cell
        let periods = self.cache.params().periods;
        if self.fold && self.cache.params().is_periodic() {
            for f in &mut self.state.filaments {
                let _ = f.fold_periodic(periods);
            }
        }

        // reconnections on the new positions
        if let Some(criterion) = self.reconnection {
            let quad = self.cache.params().quad_short.clone();
            let backend = self.cache.params().backend_short;
            let rs = reconnect_pass(
                &mut self.state.filaments,
                &criterion,
                periods,
                backend,
                &quad,
                |_, _, _| {},
            );
            self.state.stats.reconnections += rs.reconnections;
            self.state.stats.reconnection_length_loss += rs.length_loss;
            self.state.stats.filaments_removed += rs.filaments_removed;
            self.state.stats.filaments_removed_length += rs.filaments_removed_length;
        }

        // refinement; degenerate filaments are dropped
        let quad = self.cache.params().quad_short.clone();
        let mut fi = 0;
        while fi < self.state.filaments.len() {
            match refine(&mut self.state.filaments[fi], self.refinement) {
                Ok(_) => fi += 1,
                Err(FilamentaryError::DegenerateFilament { .. }) => {
                    let f = self.state.filaments.remove(fi);
                    self.state.stats.filaments_removed += 1;
                    self.state.stats.filaments_removed_length += f.filament_length(&quad);
                }
                Err(e) => return Err(e),
            }
        }

        self.state.time += dt;
        self.state.dt = dt;
        self.state.step += 1;
        self.state.stats.total_steps += 1;

        if self.state.filaments.is_empty() {
            return Ok(StepStatus::NoVorticesLeft);
        }

        // consistent fields at the new positions (next initial slope,
        // diagnostics, callbacks)
        self.recompute_full();

        if let Some(next) = self.adaptivity.suggested_dt(
            self.state.min_node_distance(),
            self.state.max_velocity(),
            self.cache.params(),
        ) {
            self.state.dt = next.max(self.dtmin);
        }

        if let Some(cb) = self.callback_after.as_mut() {
            cb(&self.state);
        }

        Ok(if self.state.time >= self.tspan.1 {
            StepStatus::Finished
        } else {
            StepStatus::Running
        })
    }

    /// Step until the simulation terminates.
    ///
    /// # Errors
    /// Propagates the first step failure.
    pub fn run(&mut self) -> Result<StepStatus, FilamentaryError> {
        loop {
            match self.step()? {
                StepStatus::Running => {}
                status => return Ok(status),
            }
        }
    }

    /// Run the configured scheme for one tentative step of size `dt` and
    /// return the maximum nodal displacement.
    fn advance(&mut self, dt: f64) -> Result<f64, FilamentaryError> {
        match self.scheme {
            Scheme::Euler => self.advance_explicit(&schemes::EULER, dt),
            Scheme::Midpoint => self.advance_explicit(&schemes::MIDPOINT, dt),
            Scheme::RK4 => self.advance_explicit(&schemes::RK4, dt),
            Scheme::IMEXEuler { sweeps } => self.advance_imex(sweeps.max(1), dt),
            Scheme::MriGark33 { substeps } => {
                self.advance_mri(&schemes::MRI_GARK_33, substeps.max(1), dt)
            }
            Scheme::MriGark45 { substeps } => {
                self.advance_mri(&schemes::MRI_GARK_45, substeps.max(1), dt)
            }
        }
    }

    fn advance_explicit(
        &mut self,
        tableau: &schemes::ButcherTableau,
        dt: f64,
    ) -> Result<f64, FilamentaryError> {
        let t0 = self.state.time;
        let x0 = snapshot_positions(&self.state.filaments);
        let stages = tableau.b.len();
        let flags = self.full_flags();

        let mut k: Vec<Vec<Vec<Vec3>>> = Vec::with_capacity(stages);
        k.push(self.state.velocities.clone());
        for stage in 1..stages {
            let combo: Vec<(f64, &Vec<Vec<Vec3>>)> = tableau.a[stage]
                .iter()
                .zip(&k)
                .filter(|(&coef, _)| coef != 0.0)
                .map(|(&coef, ks)| (coef, ks))
                .collect();
            apply_positions(&mut self.state.filaments, &x0, &combo, dt)?;
            let mut ks = zero_like(&x0);
            eval_rhs(
                &mut self.cache,
                &self.forcing,
                true,
                &self.state.filaments,
                t0 + tableau.c[stage] * dt,
                flags,
                &mut ks,
            );
            k.push(ks);
        }

        let combo: Vec<(f64, &Vec<Vec<Vec3>>)> = tableau
            .b
            .iter()
            .zip(&k)
            .filter(|(&coef, _)| coef != 0.0)
            .map(|(&coef, ks)| (coef, ks))
            .collect();
        let max_disp = max_combined_displacement(&x0, &combo, dt);
        apply_positions(&mut self.state.filaments, &x0, &combo, dt)?;
        Ok(max_disp)
    }

    fn advance_imex(&mut self, sweeps: usize, dt: f64) -> Result<f64, FilamentaryError> {
        let t0 = self.state.time;
        let x0 = snapshot_positions(&self.state.filaments);

        let mut slow = zero_like(&x0);
        let slow_flags = self.slow_flags();
        eval_rhs(
            &mut self.cache,
            &self.forcing,
            true,
            &self.state.filaments,
            t0,
            slow_flags,
            &mut slow,
        );

        let mut fast = zero_like(&x0);
        let mut max_disp = 0.0;
        for _ in 0..sweeps {
            let fast_flags = self.fast_flags();
            eval_rhs(
                &mut self.cache,
                &self.forcing,
                false,
                &self.state.filaments,
                t0,
                fast_flags,
                &mut fast,
            );
            let total = add_fields(&slow, &fast);
            let combo = [(1.0, &total)];
            max_disp = max_combined_displacement(&x0, &combo, dt);
            apply_positions(&mut self.state.filaments, &x0, &combo, dt)?;
        }
        Ok(max_disp)
    }

    fn advance_mri(
        &mut self,
        tableau: &schemes::MriTableau,
        substeps: usize,
        dt: f64,
    ) -> Result<f64, FilamentaryError> {
        let t0 = self.state.time;
        let x_start = snapshot_positions(&self.state.filaments);
        let stages = tableau.dc.len();

        let mut slow_stages: Vec<Vec<Vec<Vec3>>> = Vec::with_capacity(stages);
        let mut first_slow = zero_like(&x_start);
        let slow_flags = self.slow_flags();
        eval_rhs(
            &mut self.cache,
            &self.forcing,
            true,
            &self.state.filaments,
            t0,
            slow_flags,
            &mut first_slow,
        );
        slow_stages.push(first_slow);

        let mut c_acc = 0.0;
        for i in 0..stages {
            let h_stage = tableau.dc[i] * dt;
            let h_fast = h_stage / substeps as f64;
            for m in 0..substeps {
                self.inner_fast_rk4(tableau, &slow_stages, i, m, substeps, h_fast, t0)?;
            }
            c_acc += tableau.dc[i];
            if i + 1 < stages {
                let mut slow = zero_like(&x_start);
                let slow_flags = self.slow_flags();
                eval_rhs(
                    &mut self.cache,
                    &self.forcing,
                    true,
                    &self.state.filaments,
                    t0 + c_acc * dt,
                    slow_flags,
                    &mut slow,
                );
                slow_stages.push(slow);
            }
        }

        let x_end = snapshot_positions(&self.state.filaments);
        Ok(max_point_displacement(&x_start, &x_end))
    }

    /// One RK4 substep of the fast ODE
    /// `dX/dθ = v_fast(X) + Σ_k (Γ⁰[i][k] + τ·Γ¹[i][k]) / Δc[i] · F_k`
    /// with τ the normalized time within outer stage `i`.
    #[allow(clippy::too_many_arguments)]
    fn inner_fast_rk4(
        &mut self,
        tableau: &schemes::MriTableau,
        slow_stages: &[Vec<Vec<Vec3>>],
        stage: usize,
        substep: usize,
        substeps: usize,
        h: f64,
        t0: f64,
    ) -> Result<(), FilamentaryError> {
        let xs = snapshot_positions(&self.state.filaments);
        let fast_flags = self.fast_flags();
        let tau_at = |frac: f64| (substep as f64 + frac) / substeps as f64;

        let mut eval_fast = |solver: &mut Self, tau: f64| -> Vec<Vec<Vec3>> {
            let mut out = zero_like(&xs);
            eval_rhs(
                &mut solver.cache,
                &solver.forcing,
                false,
                &solver.state.filaments,
                t0,
                fast_flags,
                &mut out,
            );
            // slow forcing, affine in τ
            for (k, slow) in slow_stages.iter().enumerate().take(stage + 1) {
                let coef =
                    (tableau.gamma0[stage][k] + tau * tableau.gamma1[stage][k]) / tableau.dc[stage];
                if coef != 0.0 {
                    for (of, sf) in out.iter_mut().zip(slow) {
                        for (o, s) in of.iter_mut().zip(sf) {
                            *o += coef * s;
                        }
                    }
                }
            }
            out
        };

        let k1 = eval_fast(self, tau_at(0.0));
        apply_positions(&mut self.state.filaments, &xs, &[(0.5, &k1)], h)?;
        let k2 = eval_fast(self, tau_at(0.5));
        apply_positions(&mut self.state.filaments, &xs, &[(0.5, &k2)], h)?;
        let k3 = eval_fast(self, tau_at(0.5));
        apply_positions(&mut self.state.filaments, &xs, &[(1.0, &k3)], h)?;
        let k4 = eval_fast(self, tau_at(1.0));
        apply_positions(
            &mut self.state.filaments,
            &xs,
            &[
                (1.0 / 6.0, &k1),
                (1.0 / 3.0, &k2),
                (1.0 / 3.0, &k3),
                (1.0 / 6.0, &k4),
            ],
            h,
        )?;
        Ok(())
    }

    /// Recompute the full velocity, streamfunction and tangents at the
    /// current positions, applying all forcing hooks.
    fn recompute_full(&mut self) {
        let flags = self.full_flags();
        let time = self.state.time;
        self.cache.compute_on_nodes(
            &self.state.filaments,
            Some(&mut self.state.superfluid_velocities),
            Some(&mut self.state.streamfunctions),
            flags,
        );
        crate::biotsavart::resize_node_arrays(&mut self.state.tangents, &self.state.filaments);
        for (f, tans) in self.state.filaments.iter().zip(&mut self.state.tangents) {
            for (i, t) in tans.iter_mut().enumerate() {
                *t = f.unit_tangent(i, 0.0);
            }
        }
        for (f, psis) in self
            .state
            .filaments
            .iter()
            .zip(&mut self.state.streamfunctions)
        {
            for (i, psi) in psis.iter_mut().enumerate() {
                self.forcing.add_streamfunction(f.node(i as isize), time, psi);
            }
        }
        self.state.velocities = self.state.superfluid_velocities.clone();
        apply_velocity_forcing(
            &self.forcing,
            &self.state.filaments,
            time,
            &mut self.state.velocities,
        );
    }
}

/// Evaluate the Biot–Savart terms selected by `flags` into `out`, with the
/// forcing hooks applied when `with_forcing` (slow/full evaluations).
fn eval_rhs(
    cache: &mut BiotSavartCache,
    forcing: &Forcing,
    with_forcing: bool,
    filaments: &[Filament],
    time: f64,
    flags: VelocityFlags,
    out: &mut Vec<Vec<Vec3>>,
) {
    cache.compute_on_nodes(filaments, Some(&mut *out), None, flags);
    if with_forcing && forcing.affects_velocity() {
        apply_velocity_forcing(forcing, filaments, time, out);
    }
}

/// External velocity, mutual friction, then stretching, in that order.
fn apply_velocity_forcing(
    forcing: &Forcing,
    filaments: &[Filament],
    time: f64,
    out: &mut [Vec<Vec3>],
) {
    if !forcing.affects_velocity() {
        return;
    }
    for (f, slots) in filaments.iter().zip(out.iter_mut()) {
        for (i, slot) in slots.iter_mut().enumerate() {
            let x = f.node(i as isize);
            let mut v = *slot;
            forcing.add_external_velocity(x, time, &mut v);
            if forcing.mutual_friction.is_some() {
                let tangent = f.unit_tangent(i, 0.0);
                v = forcing.line_velocity(v, tangent, x, time);
            }
            forcing.add_stretching_velocity(|| f.curvature_vector(i, 0.0), &mut v);
            *slot = v;
        }
    }
}

fn snapshot_positions(filaments: &[Filament]) -> Vec<Vec<Vec3>> {
    filaments.iter().map(|f| f.nodes().to_vec()).collect()
}

fn zero_like(x0: &[Vec<Vec3>]) -> Vec<Vec<Vec3>> {
    x0.iter().map(|f| vec![Vec3::zeros(); f.len()]).collect()
}

fn add_fields(a: &[Vec<Vec3>], b: &[Vec<Vec3>]) -> Vec<Vec<Vec3>> {
    a.iter()
        .zip(b)
        .map(|(af, bf)| af.iter().zip(bf).map(|(x, y)| x + y).collect())
        .collect()
}

/// Set node positions to `x0 + dt · Σ coef·k` and refresh geometry.
fn apply_positions(
    filaments: &mut [Filament],
    x0: &[Vec<Vec3>],
    combo: &[(f64, &Vec<Vec<Vec3>>)],
    dt: f64,
) -> Result<(), FilamentaryError> {
    for (fi, f) in filaments.iter_mut().enumerate() {
        for i in 0..f.num_nodes() {
            let mut x = x0[fi][i];
            for (coef, k) in combo {
                x += dt * *coef * k[fi][i];
            }
            f.set_node(i, x);
        }
        f.commit_geometry()?;
    }
    Ok(())
}

fn max_combined_displacement(
    x0: &[Vec<Vec3>],
    combo: &[(f64, &Vec<Vec<Vec3>>)],
    dt: f64,
) -> f64 {
    let mut best = 0.0_f64;
    for (fi, nodes) in x0.iter().enumerate() {
        for i in 0..nodes.len() {
            let mut d = Vec3::zeros();
            for (coef, k) in combo {
                d += *coef * k[fi][i];
            }
            best = best.max(dt * d.norm());
        }
    }
    best
}

fn max_point_displacement(a: &[Vec<Vec3>], b: &[Vec<Vec3>]) -> f64 {
    let mut best = 0.0_f64;
    for (af, bf) in a.iter().zip(b) {
        for (x, y) in af.iter().zip(bf) {
            best = best.max((y - x).norm());
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biotsavart::{LongRangeBackend, ShortRangeBackend};
    use crate::filament::DiscretizationMethod;
    use crate::quadrature::GaussLegendre;
    use std::f64::consts::PI;

    fn open_params() -> ParamsBiotSavart {
        ParamsBiotSavart {
            circulation: 1.0,
            core_radius: 1e-8,
            core_parameter: 0.25,
            periods: [f64::INFINITY; 3],
            grid_size: [16; 3],
            alpha: 1.0,
            rcut: 1.0,
            quad_short: GaussLegendre::new(3),
            quad_long: GaussLegendre::new(3),
            backend_short: ShortRangeBackend::Naive,
            backend_long: LongRangeBackend::ExactSum,
        }
    }

    fn ring(radius: f64) -> Filament {
        match Filament::from_curve(
            32,
            DiscretizationMethod::CubicSpline,
            Vec3::zeros(),
            |u| {
                let th = 2.0 * PI * u;
                Vec3::new(radius * th.cos(), radius * th.sin(), 0.0)
            },
        ) {
            Ok(f) => f,
            Err(e) => panic!("{e}"),
        }
    }

    fn lia_ring_speed(radius: f64, params: &ParamsBiotSavart, ell: f64) -> f64 {
        params.circulation / (4.0 * PI * radius)
            * ((2.0 * ell / params.core_radius).ln() - params.core_parameter - 0.5)
    }

    #[test]
    fn lia_ring_translates_along_z() {
        let params = open_params();
        let radius = 1.0;
        let n = 32.0;
        let problem = Problem {
            filaments: vec![ring(radius)],
            params: params.clone(),
            tspan: (0.0, 1e-3),
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
        let z0 = solver.state().filaments[0].node(0).z;
        match solver.run() {
            Ok(StepStatus::Finished) => {}
            other => panic!("unexpected outcome {other:?}"),
        }
        let z1 = solver.state().filaments[0].node(0).z;
        let ell = 2.0 * radius * (PI / n).sin();
        let expected = lia_ring_speed(radius, &params, ell) * 1e-3;
        let moved = z1 - z0;
        assert!(
            (moved - expected).abs() < 0.05 * expected,
            "ring moved {moved}, expected {expected}"
        );
    }

    #[test]
    fn schemes_agree_on_short_integration() {
        let params = open_params();
        let mut results = Vec::new();
        for scheme in [
            Scheme::RK4,
            Scheme::Midpoint,
            Scheme::IMEXEuler { sweeps: 2 },
            Scheme::MriGark33 { substeps: 2 },
            Scheme::MriGark45 { substeps: 2 },
        ] {
            let problem = Problem {
                filaments: vec![ring(1.0)],
                params: params.clone(),
                tspan: (0.0, 4e-4),
            };
            let options = SolverOptions {
                scheme,
                dt: 1e-4,
                lia_only: true,
                fast_term: FastTerm::LocalInduction,
                ..Default::default()
            };
            let mut solver = match VortexFilamentSolver::new(problem, options) {
                Ok(s) => s,
                Err(e) => panic!("{scheme:?}: {e}"),
            };
            if let Err(e) = solver.run() {
                panic!("{scheme:?}: {e}");
            }
            results.push((scheme, solver.state().filaments[0].node(0).z));
        }
        let reference = results[0].1;
        assert!(reference > 0.0, "LIA ring must move forward");
        for (scheme, z) in &results {
            assert!(
                (z - reference).abs() < 0.02 * reference,
                "{scheme:?}: z {z} vs RK4 {reference}"
            );
        }
    }

    #[test]
    fn velocity_adaptivity_sets_dt() {
        let params = open_params();
        let problem = Problem {
            filaments: vec![ring(1.0)],
            params,
            tspan: (0.0, 1.0),
        };
        let delta = 1e-4;
        let options = SolverOptions {
            scheme: Scheme::Euler,
            dt: 1e-5,
            adaptivity: AdaptivityCriterion::BasedOnVelocity { delta },
            lia_only: true,
            ..Default::default()
        };
        let mut solver = match VortexFilamentSolver::new(problem, options) {
            Ok(s) => s,
            Err(e) => panic!("{e}"),
        };
        match solver.step() {
            Ok(StepStatus::Running) => {}
            other => panic!("unexpected {other:?}"),
        }
        let vmax = solver.state().max_velocity();
        let expected = delta / vmax;
        let dt = solver.state().dt;
        assert!(
            (dt - expected).abs() < 1e-9 * expected.max(1.0),
            "dt {dt} vs δ/|v| {expected}"
        );
    }

    #[test]
    fn incompatible_configurations_rejected() {
        let params = open_params();
        let mk_problem = || Problem {
            filaments: vec![ring(1.0)],
            params: params.clone(),
            tspan: (0.0, 1.0),
        };
        let r = VortexFilamentSolver::new(
            mk_problem(),
            SolverOptions {
                scheme: Scheme::MriGark33 { substeps: 4 },
                adaptivity: AdaptivityCriterion::BasedOnVelocity { delta: 0.1 },
                ..Default::default()
            },
        );
        assert!(matches!(r.err(), Some(FilamentaryError::IncompatibleScheme(_))));

        let r = VortexFilamentSolver::new(
            mk_problem(),
            SolverOptions {
                scheme: Scheme::IMEXEuler { sweeps: 2 },
                lia_only: true,
                fast_term: FastTerm::ShortRange,
                ..Default::default()
            },
        );
        assert!(matches!(r.err(), Some(FilamentaryError::IncompatibleScheme(_))));

        let r = VortexFilamentSolver::new(
            mk_problem(),
            SolverOptions {
                dt: 0.0,
                ..Default::default()
            },
        );
        assert!(matches!(
            r.err(),
            Some(FilamentaryError::InvalidParameter { name: "dt", .. })
        ));
    }

    #[test]
    fn injection_and_stop_flag() {
        let params = open_params();
        let problem = Problem {
            filaments: vec![ring(1.0)],
            params,
            tspan: (0.0, 1.0),
        };
        let options = SolverOptions {
            scheme: Scheme::Euler,
            dt: 1e-5,
            lia_only: true,
            affect_before: Some(Box::new(|state: &mut SolverState| {
                if state.step == 1 {
                    if let Ok(f) = Filament::from_curve(
                        16,
                        DiscretizationMethod::CubicSpline,
                        Vec3::zeros(),
                        |u| {
                            let th = 2.0 * PI * u;
                            Vec3::new(
                                0.5 * th.cos(),
                                0.5 * th.sin(),
                                3.0,
                            )
                        },
                    ) {
                        state.inject_filament(f);
                    }
                }
            })),
            ..Default::default()
        };
        let mut solver = match VortexFilamentSolver::new(problem, options) {
            Ok(s) => s,
            Err(e) => panic!("{e}"),
        };
        assert_eq!(solver.state().filaments.len(), 1);
        let _ = solver.step(); // step 0
        let _ = solver.step(); // step 1: injection happens at entry
        assert_eq!(solver.state().filaments.len(), 2);
        assert_eq!(solver.state().velocities.len(), 2);

        solver.request_stop();
        match solver.step() {
            Ok(StepStatus::Finished) => {}
            other => panic!("stop flag ignored: {other:?}"),
        }
    }

    #[test]
    fn finishes_at_end_of_span() {
        let params = open_params();
        let problem = Problem {
            filaments: vec![ring(1.0)],
            params,
            tspan: (0.0, 5e-4),
        };
        let options = SolverOptions {
            scheme: Scheme::Midpoint,
            dt: 2e-4,
            lia_only: true,
            ..Default::default()
        };
        let mut solver = match VortexFilamentSolver::new(problem, options) {
            Ok(s) => s,
            Err(e) => panic!("{e}"),
        };
        match solver.run() {
            Ok(StepStatus::Finished) => {}
            other => panic!("unexpected {other:?}"),
        }
        // the last step is clamped so the final time lands on the span end
        assert!((solver.state().time - 5e-4).abs() < 1e-15);
        assert_eq!(solver.state().stats.total_steps, 3);
    }
}
