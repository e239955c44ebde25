//! Anti-cycling bound perturbation.
//!
//! Each structural variable with a finite bound gets a tiny asymmetric
//! inward shift of its working bounds, drawn from a generator seeded by a
//! deterministic problem fingerprint: the same model perturbs the same way
//! on every solve. Under the perturbed bounds no two basic feasible
//! solutions share an objective value, so degenerate ties cannot cycle.
//! The shifts are removed before refinement and extraction.

use std::hash::{DefaultHasher, Hash, Hasher};

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::E;
use crate::lp::LinearProgram;

use super::context::SolverContext;

/// Deterministic fingerprint of the model driving the perturbation seed.
fn fingerprint(lp: &LinearProgram) -> u64 {
    let mut hasher = DefaultHasher::new();
    lp.dims().hash(&mut hasher);
    lp.matrix().nnz().hash(&mut hasher);
    for &c in lp.objective() {
        c.to_bits().hash(&mut hasher);
    }
    for &b in lp.rhs() {
        b.to_bits().hash(&mut hasher);
    }
    hasher.finish()
}

/// Shrinks the working bounds of the structural variables by seeded random
/// amounts. Idempotent per solve via `perturbation_active`.
pub(crate) fn apply(ctx: &mut SolverContext) {
    if ctx.perturbation_active {
        return;
    }

    let base = ctx.feas_tol * 1e-6;
    let clip = ctx.feas_tol * 1e-3;
    let mut rng = StdRng::seed_from_u64(fingerprint(ctx.lp));

    for j in 0..ctx.n {
        // Draw unconditionally so the stream stays aligned with the column
        // order regardless of which variables qualify.
        let u1: E = rng.random();
        let u2: E = rng.random();

        let lb = ctx.orig_lb[j];
        let ub = ctx.orig_ub[j];
        let lb_finite = !ctx.is_unbounded_value(lb);
        let ub_finite = !ctx.is_unbounded_value(ub);
        if (!lb_finite && !ub_finite) || lb == ub {
            // Free variables have nothing to perturb; fixed ones stay fixed.
            continue;
        }

        let cj = ctx.cost[j].abs();
        let scale = if cj > 1e-8 {
            (base * cj.min(1.)).min(clip)
        } else {
            base.min(clip)
        };
        let e1 = scale * u1;
        let e2 = scale * u2;

        if lb_finite {
            ctx.lb[j] = lb + e1;
        }
        if ub_finite {
            ctx.ub[j] = ub - e2;
        }
        if ctx.lb[j] > ctx.ub[j] {
            // Narrow box crossed over: collapse around the original
            // midpoint, keeping the half-perturbation width.
            let mid = 0.5 * (lb + ub);
            let half = 0.25 * (e1 + e2);
            ctx.lb[j] = mid - half;
            ctx.ub[j] = mid + half;
        }
    }

    ctx.perturbation_active = true;
    debug!("applied bound perturbation with base scale {base:.3e}");
}

/// Restores the working bounds from the originals.
pub(crate) fn remove(ctx: &mut SolverContext) {
    if !ctx.perturbation_active {
        return;
    }
    ctx.lb.copy_from_slice(&ctx.orig_lb);
    ctx.ub.copy_from_slice(&ctx.orig_ub);
    ctx.perturbation_active = false;
    debug!("removed bound perturbation");
}
