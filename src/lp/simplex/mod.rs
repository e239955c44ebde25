//! Revised simplex driver.
//!
//! Orchestrates a solve: slack crash (or warm-start basis), perturbation and
//! initial factorization, the phase-one/phase-two iteration loop
//! (pricing -> FTRAN -> ratio test -> pivot -> refactorization schedule),
//! and finally refinement and extraction of the solution.
//!
//! Numerical recovery is an explicit branch, not an unwinding path: a pivot
//! rejected by the pivot tolerance triggers one refactorize-and-retry per
//! iteration; a second rejection aborts with
//! [`Status::NumericalSingular`].

pub(crate) mod context;
pub(crate) mod perturb;
pub(crate) mod pricing;
pub(crate) mod ratio;

use log::{debug, trace};

use crate::linalg::FactorError;
use crate::linalg::factor::RefactorSignal;
use crate::lp::{Basis, LinearProgram, ModelError, Solution, is_infinite_with};
use crate::options::SolverOptions;
use crate::{E, IterationState, Phase, SolverHooks, Status};

use context::SolverContext;
use pricing::{Pricer, PricingRule, PivotInfo};
use ratio::RatioOutcome;

/// Revised simplex solver over a [`LinearProgram`].
pub struct RevisedSimplex<'a> {
    lp: &'a LinearProgram,
    options: SolverOptions,
    initial_basis: Option<Basis>,
}

/// Solves `lp` with the given options and hooks.
pub fn solve(
    lp: &LinearProgram,
    options: &SolverOptions,
    hooks: &mut SolverHooks,
) -> Result<Solution, ModelError> {
    RevisedSimplex::new(lp, options).solve(hooks)
}

impl<'a> RevisedSimplex<'a> {
    /// Creates a new solver instance for the given linear program and options.
    pub fn new(lp: &'a LinearProgram, options: &SolverOptions) -> Self {
        Self {
            lp,
            options: options.clone(),
            initial_basis: None,
        }
    }

    /// Warm-starts the next solve from a previously extracted basis.
    pub fn set_initial_basis(&mut self, basis: Basis) {
        self.initial_basis = Some(basis);
    }

    /// Runs the solve to a terminal status.
    pub fn solve(&mut self, hooks: &mut SolverHooks) -> Result<Solution, ModelError> {
        self.options.validate()?;

        let mut ctx = match SolverContext::new(self.lp, &self.options) {
            Ok(ctx) => ctx,
            Err(_) => return Ok(out_of_memory()),
        };

        // Crash.
        match &self.initial_basis {
            Some(basis) => ctx.install_basis(basis)?,
            None => ctx.crash_slack(),
        }

        // Setup: perturb, factorize, derive duals for the starting phase.
        if self.options.perturbation {
            perturb::apply(&mut ctx);
        }
        ctx.snap_nonbasic();
        if let Err(err) = ctx.refactorize() {
            let message = Some(format!("initial basis factorization failed: {err}"));
            return Ok(finish(ctx, status_of(&err), message));
        }
        ctx.phase = if ctx.total_infeasibility() > ctx.feas_tol {
            Phase::One
        } else {
            Phase::Two
        };
        ctx.recompute_duals();
        debug!(
            "solve start: {} vars, {} rows, phase {:?}, infeasibility {:.3e}",
            ctx.n,
            ctx.m,
            ctx.phase,
            ctx.total_infeasibility()
        );

        let mut pricer = Pricer::from_options(&self.options, ctx.total);
        pricer.reset(&ctx);
        hooks.terminator.initialize();

        let mut status = Status::InProgress;
        let mut message = None;
        // One refactorize-and-retry is allowed per iteration.
        let mut recovered = false;

        while status == Status::InProgress {
            if let Some(s) = hooks.terminator.terminate() {
                status = s;
                break;
            }
            if ctx.iteration >= self.options.max_iterations {
                status = Status::IterationLimit;
                break;
            }
            if ctx.phase == Phase::One {
                // The violation set moves with the iterate; refresh the
                // artificial objective and its reduced costs.
                ctx.recompute_duals();
            }

            let Some(candidate) = pricer.select(&ctx) else {
                if ctx.phase == Phase::One {
                    let infeasibility = ctx.total_infeasibility();
                    if infeasibility > ctx.feas_tol {
                        status = Status::Infeasible;
                        message = Some(format!(
                            "phase one finished with residual infeasibility {infeasibility:.3e}"
                        ));
                        break;
                    }
                    ctx.phase = Phase::Two;
                    ctx.recompute_duals();
                    ctx.recompute_objective();
                    pricer.reset(&ctx);
                    debug!("feasible after {} iterations; entering phase two", ctx.iteration);
                    continue;
                }
                if ctx.total_infeasibility() > ctx.feas_tol {
                    // Feasibility drifted during phase two; recover it before
                    // declaring optimality.
                    ctx.phase = Phase::One;
                    ctx.recompute_duals();
                    pricer.reset(&ctx);
                    continue;
                }
                status = Status::Optimal;
                break;
            };

            let q = candidate.index;
            let dir = ctx.entering_direction(q);
            let mut delta = vec![0.; ctx.m];
            ctx.load_column(q, &mut delta);
            ctx.factor.ftran(&mut delta);

            match ratio::harris(&ctx, q, dir, &delta) {
                RatioOutcome::Unbounded => {
                    if ctx.phase == Phase::Two {
                        status = Status::Unbounded;
                        break;
                    }
                    // An improving phase-one direction always has a
                    // breakpoint in exact arithmetic; treat the miss as
                    // numerical trouble.
                    if recovered {
                        status = Status::NumericalSingular;
                        message = Some(format!(
                            "no phase-one breakpoint for entering {q} at iteration {}",
                            ctx.iteration
                        ));
                        break;
                    }
                    recovered = true;
                    if let Err(err) = ctx.refactorize() {
                        status = status_of(&err);
                        message = Some(err.to_string());
                        break;
                    }
                    pricer.reset(&ctx);
                    continue;
                }
                RatioOutcome::BoundFlip { step } => {
                    trace!("iteration {}: bound flip of {q} by {step:.6e}", ctx.iteration);
                    ctx.apply_bound_flip(q, dir, step, &delta);
                    recovered = false;
                }
                RatioOutcome::Pivot {
                    row,
                    step,
                    leaving_bound,
                } => {
                    let pivot = delta[row];
                    if pivot.abs() < ctx.pivot_tol {
                        if recovered {
                            status = Status::NumericalSingular;
                            message = Some(format!(
                                "pivot element {pivot:.3e} below tolerance at iteration {} (row {row})",
                                ctx.iteration
                            ));
                            break;
                        }
                        debug!(
                            "rejected pivot {pivot:.3e} on row {row}; refactorizing and retrying"
                        );
                        recovered = true;
                        if let Err(err) = ctx.refactorize() {
                            status = status_of(&err);
                            message = Some(err.to_string());
                            break;
                        }
                        pricer.reset(&ctx);
                        continue;
                    }

                    let alpha = ctx.pivotal_row(row);
                    let tau = if pricer.wants_tau() {
                        Some(ctx.tau_vector(&delta))
                    } else {
                        None
                    };
                    let leaving = ctx.basis[row];
                    let dq = ctx.d[q];

                    if let Err(err) =
                        ctx.apply_pivot(q, dir, row, step, leaving_bound, &delta)
                    {
                        status = status_of(&err);
                        message = Some(err.to_string());
                        break;
                    }
                    if ctx.phase == Phase::Two {
                        ctx.update_reduced_costs(q, leaving, dq, pivot, &alpha);
                    }
                    pricer.on_pivot(
                        &ctx,
                        &PivotInfo {
                            entering: q,
                            leaving,
                            pivot,
                            alpha: &alpha,
                            tau: tau.as_deref(),
                        },
                    );
                    recovered = false;
                    trace!(
                        "iteration {}: {q} in, {leaving} out on row {row}, step {step:.6e}",
                        ctx.iteration
                    );
                }
            }

            // Post-iterate: consult the refactorization schedule.
            if ctx.factor.refactor_signal() != RefactorSignal::None {
                debug!(
                    "scheduled refactorization at iteration {} ({} etas)",
                    ctx.iteration,
                    ctx.factor.eta_count()
                );
                if let Err(err) = ctx.refactorize() {
                    status = status_of(&err);
                    message = Some(err.to_string());
                    break;
                }
                if ctx.phase == Phase::Two && ctx.total_infeasibility() > ctx.feas_tol {
                    debug!("feasibility drifted; returning to phase one");
                    ctx.phase = Phase::One;
                    ctx.recompute_duals();
                }
                pricer.reset(&ctx);
            }

            #[cfg(debug_assertions)]
            ctx.assert_basis_integrity();

            hooks.callback.call(&IterationState {
                iteration: ctx.iteration,
                phase: ctx.phase,
                objective: match ctx.phase {
                    Phase::One => ctx.total_infeasibility(),
                    Phase::Two => ctx.objective,
                },
                infeasibility: ctx.total_infeasibility(),
                eta_count: ctx.factor.eta_count(),
            });
        }

        debug!("solve finished: {status:?} after {} iterations", ctx.iteration);
        Ok(finish(ctx, status, message))
    }
}

fn status_of(err: &FactorError) -> Status {
    match err {
        FactorError::Memory => Status::OutOfMemory,
        FactorError::Singular { .. } => Status::NumericalSingular,
    }
}

/// Refinement and extraction. Orderly statuses get the full refine pass;
/// a singular abort extracts whatever state exists.
fn finish(mut ctx: SolverContext, status: Status, message: Option<String>) -> Solution {
    let refine = matches!(
        status,
        Status::Optimal
            | Status::Infeasible
            | Status::Unbounded
            | Status::IterationLimit
            | Status::TimeLimit
            | Status::Interrupted
    );
    if refine {
        perturb::remove(&mut ctx);
        ctx.snap_nonbasic();
        ctx.recompute_primal();
        ctx.phase = Phase::Two;

        // Snap basic values sitting within tolerance of a bound.
        for k in 0..ctx.m {
            let j = ctx.basis[k];
            let x = ctx.x[j];
            if !ctx.is_unbounded_value(ctx.lb[j]) && (x - ctx.lb[j]).abs() <= ctx.feas_tol {
                ctx.x[j] = ctx.lb[j];
            } else if !ctx.is_unbounded_value(ctx.ub[j]) && (x - ctx.ub[j]).abs() <= ctx.feas_tol {
                ctx.x[j] = ctx.ub[j];
            }
        }
        for v in ctx.x.iter_mut() {
            if v.abs() < 1e-12 {
                *v = 0.;
            }
        }
        ctx.recompute_duals();
        for v in ctx.pi.iter_mut().chain(ctx.d.iter_mut()) {
            if v.abs() < 1e-12 {
                *v = 0.;
            }
        }
        ctx.recompute_objective();
    }
    extract(ctx, status, message)
}

/// Writes the context out as a caller-facing [`Solution`], clamping
/// near-sentinel magnitudes and undoing the maximization negation.
fn extract(ctx: SolverContext, status: Status, message: Option<String>) -> Solution {
    let n = ctx.n;
    let m = ctx.m;
    let sign = if ctx.lp.is_maximize() { -1. } else { 1. };
    let inf = ctx.inf;
    let clamp = |v: E| {
        if is_infinite_with(v, inf) {
            inf.copysign(v)
        } else {
            v
        }
    };

    let primal_residual = ctx.primal_residual_inf();
    let dual_residual = ctx.dual_residual_inf();

    Solution {
        status,
        x: ctx.x[..n].iter().map(|&v| clamp(v)).collect(),
        duals: ctx.pi.iter().map(|&v| clamp(sign * v)).collect(),
        reduced_costs: ctx.d[..n].iter().map(|&v| clamp(sign * v)).collect(),
        row_slacks: (0..m).map(|i| clamp(ctx.x[n + i])).collect(),
        row_activity: (0..m).map(|i| ctx.lp.rhs()[i] - ctx.x[n + i]).collect(),
        objective_value: sign * ctx.objective + ctx.lp.objective_offset(),
        iterations: ctx.iteration,
        primal_residual,
        dual_residual,
        basis: Basis {
            header: ctx.basis.clone(),
            statuses: ctx.status.clone(),
        },
        message,
    }
}

/// The no-solution result for an allocation failure during setup.
fn out_of_memory() -> Solution {
    Solution {
        status: Status::OutOfMemory,
        x: Vec::new(),
        duals: Vec::new(),
        reduced_costs: Vec::new(),
        row_slacks: Vec::new(),
        row_activity: Vec::new(),
        objective_value: 0.,
        iterations: 0,
        primal_residual: 0.,
        dual_residual: 0.,
        basis: Basis {
            header: Vec::new(),
            statuses: Vec::new(),
        },
        message: Some("allocation failure during solver setup".to_string()),
    }
}
