//! Harris two-pass ratio test.
//!
//! The first pass computes the minimum blocking ratio with bounds relaxed by
//! ten times the feasibility tolerance; the second pass picks, among rows
//! whose relaxed ratio stays within tolerance of that minimum, the one with
//! the largest pivot magnitude. The committed step is the chosen row's
//! unrelaxed ratio clamped at zero, so the trade stays within the
//! feasibility tolerance.
//!
//! Basic variables outside their bounds (phase one) contribute a breakpoint
//! where they re-enter the violated bound; inside phase two these branches
//! are inert because the iterate is feasible.

use crate::lp::VarStatus;
use crate::{E, I};

use super::context::SolverContext;

/// Decision of the ratio test.
#[derive(Debug, PartialEq)]
pub(crate) enum RatioOutcome {
    /// Exchange the basic variable on `row`; it leaves at `leaving_bound`.
    Pivot {
        row: I,
        step: E,
        leaving_bound: VarStatus,
    },
    /// The entering variable reaches its opposite bound first; no exchange.
    BoundFlip { step: E },
    /// No blocking constraint in the movement direction.
    Unbounded,
}

/// Blocking information for one basic row.
struct Block {
    /// Relaxed ratio (first pass).
    relaxed: E,
    /// Unrelaxed ratio (committed step if chosen).
    exact: E,
    /// Where the leaving variable lands.
    bound: VarStatus,
}

/// Ratio for row `i` given the movement rate of its basic variable, or
/// `None` if the row does not block.
fn block(ctx: &SolverContext, i: I, rate: E, relax: E) -> Option<Block> {
    let bj = ctx.basis[i];
    let xi = ctx.x[bj];
    let (lb, ub) = (ctx.lb[bj], ctx.ub[bj]);
    let fixed = lb == ub;

    if rate > relax {
        // The basic variable decreases.
        if xi > ub + ctx.feas_tol && !ctx.is_unbounded_value(ub) {
            // Above its upper bound: blocked where it becomes feasible.
            Some(Block {
                relaxed: (xi - ub + relax) / rate,
                exact: (xi - ub) / rate,
                bound: if fixed { VarStatus::Fixed } else { VarStatus::AtUpper },
            })
        } else if xi >= lb - ctx.feas_tol && !ctx.is_unbounded_value(lb) {
            Some(Block {
                relaxed: (xi - lb + relax) / rate,
                exact: (xi - lb) / rate,
                bound: if fixed { VarStatus::Fixed } else { VarStatus::AtLower },
            })
        } else {
            // Already below its lower bound and moving away: the phase-one
            // objective accounts for the growing violation instead.
            None
        }
    } else if rate < -relax {
        // The basic variable increases.
        if xi < lb - ctx.feas_tol && !ctx.is_unbounded_value(lb) {
            Some(Block {
                relaxed: (xi - lb - relax) / rate,
                exact: (xi - lb) / rate,
                bound: if fixed { VarStatus::Fixed } else { VarStatus::AtLower },
            })
        } else if xi <= ub + ctx.feas_tol && !ctx.is_unbounded_value(ub) {
            Some(Block {
                relaxed: (xi - ub - relax) / rate,
                exact: (xi - ub) / rate,
                bound: if fixed { VarStatus::Fixed } else { VarStatus::AtUpper },
            })
        } else {
            None
        }
    } else {
        None
    }
}

/// Selects the leaving row and step for entering variable `q` moving in
/// direction `dir` along the FTRAN'd column `delta`.
pub(crate) fn harris(ctx: &SolverContext, q: I, dir: E, delta: &[E]) -> RatioOutcome {
    let relax = 10. * ctx.feas_tol;

    // Range available to the entering variable itself.
    let flip_range = if !ctx.is_unbounded_value(ctx.lb[q]) && !ctx.is_unbounded_value(ctx.ub[q]) {
        Some(ctx.ub[q] - ctx.lb[q])
    } else {
        None
    };

    // First pass: minimum relaxed ratio.
    let mut rho_min = E::INFINITY;
    for i in 0..ctx.m {
        if let Some(b) = block(ctx, i, dir * delta[i], relax) {
            rho_min = rho_min.min(b.relaxed);
        }
    }

    if rho_min == E::INFINITY {
        return match flip_range {
            Some(range) => RatioOutcome::BoundFlip { step: range },
            None => RatioOutcome::Unbounded,
        };
    }
    if let Some(range) = flip_range
        && range < rho_min
    {
        return RatioOutcome::BoundFlip { step: range };
    }

    // Second pass: largest pivot magnitude within tolerance of the minimum.
    let cutoff = rho_min + ctx.feas_tol;
    let mut best: Option<(E, I, E, VarStatus)> = None;
    for i in 0..ctx.m {
        if let Some(b) = block(ctx, i, dir * delta[i], relax) {
            if b.relaxed <= cutoff {
                let magnitude = delta[i].abs();
                if best.as_ref().is_none_or(|&(m, ..)| magnitude > m) {
                    best = Some((magnitude, i, b.exact.max(0.), b.bound));
                }
            }
        }
    }

    let Some((_, row, step, leaving_bound)) = best else {
        // The first pass found a blocking row, so the second must as well.
        return RatioOutcome::Unbounded;
    };
    if let Some(range) = flip_range
        && range < step
    {
        return RatioOutcome::BoundFlip { step: range };
    }
    RatioOutcome::Pivot {
        row,
        step,
        leaving_bound,
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use crate::SolverOptions;
    use crate::lp::{INF, LinearProgram, RowSense};

    use super::*;

    fn context_with_bounds(ub: [E; 2]) -> (LinearProgram, SolverOptions) {
        // Two <= rows so the slack basis is feasible: x + y <= ub0,
        // 2x + y <= ub1; entering column tests drive the slacks.
        let lp = LinearProgram::new(
            vec![-1., -1.],
            &[(0, 0, 1.), (0, 1, 1.), (1, 0, 2.), (1, 1, 1.)],
            vec![RowSense::Le, RowSense::Le],
            vec![ub[0], ub[1]],
            vec![0., 0.],
            vec![INF, INF],
        )
        .unwrap();
        (lp, SolverOptions::default())
    }

    fn setup<'a>(
        lp: &'a LinearProgram,
        options: &SolverOptions,
    ) -> super::super::context::SolverContext<'a> {
        let mut ctx = super::super::context::SolverContext::new(lp, options).unwrap();
        ctx.crash_slack();
        ctx.snap_nonbasic();
        ctx.refactorize().unwrap();
        ctx
    }

    #[test]
    fn picks_min_ratio_row() {
        let (lp, options) = context_with_bounds([4., 6.]);
        let ctx = setup(&lp, &options);
        // Entering x: delta = column [1, 2]; slacks at 4 and 6.
        // Ratios 4/1 = 4 and 6/2 = 3: row 1 blocks first.
        let mut delta = vec![0.; 2];
        ctx.load_column(0, &mut delta);
        let outcome = harris(&ctx, 0, 1., &delta);
        match outcome {
            RatioOutcome::Pivot {
                row,
                step,
                leaving_bound,
            } => {
                assert_eq!(row, 1);
                assert_relative_eq!(step, 3., epsilon = 1e-9);
                assert_eq!(leaving_bound, VarStatus::AtLower);
            }
            other => panic!("expected pivot, got {other:?}"),
        }
    }

    #[test]
    fn near_ties_prefer_larger_pivot() {
        // Relaxed ratios: row 0 at 4.00001, row 1 at 4.0000105 — within the
        // feasibility tolerance of each other, so the larger |delta| on
        // row 1 wins even though its ratio is marginally worse.
        let (lp, options) = context_with_bounds([4., 8.000011]);
        let ctx = setup(&lp, &options);
        let mut delta = vec![0.; 2];
        ctx.load_column(0, &mut delta);
        match harris(&ctx, 0, 1., &delta) {
            RatioOutcome::Pivot { row, step, .. } => {
                assert_eq!(row, 1);
                assert_relative_eq!(step, 4.0000055, epsilon = 1e-6);
            }
            other => panic!("expected pivot, got {other:?}"),
        }
    }

    #[test]
    fn unblocked_free_entering_is_unbounded() {
        let (lp, options) = context_with_bounds([4., 6.]);
        let mut ctx = setup(&lp, &options);
        // Entering y moving down: slacks increase without bound above.
        ctx.d[1] = 1.;
        let mut delta = vec![0.; 2];
        ctx.load_column(1, &mut delta);
        assert_eq!(harris(&ctx, 1, -1., &delta), RatioOutcome::Unbounded);
    }

    #[test]
    fn boxed_entering_flips_before_blocking() {
        let lp = LinearProgram::new(
            vec![-1.],
            &[(0, 0, 1.)],
            vec![RowSense::Le],
            vec![10.],
            vec![0.],
            vec![2.],
        )
        .unwrap();
        let options = SolverOptions::default();
        let ctx = setup(&lp, &options);
        // Blocking ratio is 10 but the variable's range is 2.
        let mut delta = vec![0.; 1];
        ctx.load_column(0, &mut delta);
        assert_eq!(
            harris(&ctx, 0, 1., &delta),
            RatioOutcome::BoundFlip { step: 2. }
        );
    }

    #[test]
    fn violated_basic_blocks_at_violated_bound() {
        // Infeasible start: equality row with slack fixed at zero but
        // holding value 5. Entering x reduces the violation and must stop
        // where the slack reaches its bound.
        let lp = LinearProgram::new(
            vec![0.],
            &[(0, 0, 1.)],
            vec![RowSense::Eq],
            vec![5.],
            vec![0.],
            vec![INF],
        )
        .unwrap();
        let options = SolverOptions::default();
        let ctx = setup(&lp, &options);
        assert_relative_eq!(ctx.x[1], 5.);
        let mut delta = vec![0.; 1];
        ctx.load_column(0, &mut delta);
        match harris(&ctx, 0, 1., &delta) {
            RatioOutcome::Pivot {
                row,
                step,
                leaving_bound,
            } => {
                assert_eq!(row, 0);
                assert_relative_eq!(step, 5., epsilon = 1e-9);
                // The slack is fixed at zero.
                assert_eq!(leaving_bound, VarStatus::Fixed);
            }
            other => panic!("expected pivot, got {other:?}"),
        }
    }

    #[test]
    fn degenerate_step_clamps_at_zero() {
        // Slack starts exactly on its bound: the exact ratio is zero.
        let (lp, options) = context_with_bounds([0., 6.]);
        let ctx = setup(&lp, &options);
        let mut delta = vec![0.; 2];
        ctx.load_column(0, &mut delta);
        match harris(&ctx, 0, 1., &delta) {
            RatioOutcome::Pivot { row, step, .. } => {
                assert_eq!(row, 0);
                assert_relative_eq!(step, 0.);
            }
            other => panic!("expected pivot, got {other:?}"),
        }
    }
}
