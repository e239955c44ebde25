//! Entering-variable selection.
//!
//! Two rules behind one enum-dispatched trait: Dantzig (largest reduced-cost
//! magnitude) and steepest edge (largest `d^2 / gamma` under Goldfarb-Reid
//! reference weights). Both run multilevel partial pricing: the variables are
//! split into sections, one section is scanned per call, and a full scan is
//! the fallback when the section comes up empty. A bounded cache keeps
//! recently seen attractive candidates warm between scans.

use enum_dispatch::enum_dispatch;

use crate::lp::VarStatus;
use crate::options::{PricingStrategy, SolverOptions};
use crate::{E, I};

use super::context::SolverContext;

/// Floor on steepest-edge reference weights.
pub(crate) const MIN_WEIGHT: E = 1e-4;

/// Capacity of the recent-candidate cache.
const CACHE_LIMIT: usize = 16;

/// A selected entering variable and its reduced cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Candidate {
    pub index: I,
    pub reduced_cost: E,
}

/// Data handed to the pricing rule after a committed pivot.
pub(crate) struct PivotInfo<'a> {
    pub entering: I,
    pub leaving: I,
    /// Pivot element `delta[row]`.
    pub pivot: E,
    /// Pivotal row of `B^-1 A` over all variables.
    pub alpha: &'a [E],
    /// Steepest-edge companion products, present when requested.
    pub tau: Option<&'a [E]>,
}

/// Whether a nonbasic variable is worth entering at reduced cost `d`.
pub(crate) fn is_attractive(status: VarStatus, d: E, tol: E) -> bool {
    match status {
        VarStatus::AtLower => d < -tol,
        VarStatus::AtUpper => d > tol,
        VarStatus::Free => d.abs() > tol,
        VarStatus::Basic | VarStatus::Fixed => false,
    }
}

#[enum_dispatch]
pub(crate) trait PricingRule {
    /// Returns the entering candidate, or `None` when no nonbasic variable
    /// is attractive (dual feasibility).
    fn select(&mut self, ctx: &SolverContext) -> Option<Candidate>;

    /// Whether [`PivotInfo::tau`] must be supplied.
    fn wants_tau(&self) -> bool;

    /// Observes a committed pivot.
    fn on_pivot(&mut self, ctx: &SolverContext, info: &PivotInfo);

    /// Reinitializes rule state after a refactorization.
    fn reset(&mut self, ctx: &SolverContext);
}

#[enum_dispatch(PricingRule)]
pub(crate) enum Pricer {
    Dantzig(Dantzig),
    SteepestEdge(SteepestEdge),
}

impl Pricer {
    pub fn from_options(options: &SolverOptions, total: I) -> Self {
        match options.pricing {
            PricingStrategy::Dantzig => Pricer::Dantzig(Dantzig {
                sections: Sections::new(options.section_size),
            }),
            PricingStrategy::SteepestEdge => Pricer::SteepestEdge(SteepestEdge {
                sections: Sections::new(options.section_size),
                gamma: vec![1.; total],
            }),
        }
    }
}

/// Multilevel partial-pricing state shared by the rules.
struct Sections {
    size: I,
    current: I,
    cache: Vec<I>,
}

impl Sections {
    fn new(size: I) -> Self {
        Self {
            size,
            current: 0,
            cache: Vec::with_capacity(CACHE_LIMIT),
        }
    }

    fn count(&self, total: I) -> I {
        total.div_ceil(self.size).max(1)
    }

    /// Generic scan driver: cached candidates first, then the current
    /// section, then a full sweep.
    fn select<S: Fn(I, E) -> E>(&mut self, ctx: &SolverContext, score: S) -> Option<Candidate> {
        let total = ctx.total;
        if total == 0 {
            return None;
        }

        // Candidates cached from earlier scans, re-verified against the
        // current reduced costs.
        self.cache
            .retain(|&j| is_attractive(ctx.status[j], ctx.d[j], ctx.opt_tol));
        if let Some(best) = self.best_of(ctx, self.cache.iter().copied(), &score) {
            return Some(best);
        }

        let count = self.count(total);
        let section = self.current;
        self.current = (self.current + 1) % count;

        let start = section * self.size;
        let end = ((section + 1) * self.size).min(total);
        if let Some(best) = self.scan(ctx, start..end, &score) {
            return Some(best);
        }
        self.scan(ctx, 0..total, &score)
    }

    fn scan<S: Fn(I, E) -> E>(
        &mut self,
        ctx: &SolverContext,
        range: std::ops::Range<I>,
        score: &S,
    ) -> Option<Candidate> {
        let mut best: Option<(E, Candidate)> = None;
        for j in range {
            let d = ctx.d[j];
            if !is_attractive(ctx.status[j], d, ctx.opt_tol) {
                continue;
            }
            let s = score(j, d);
            match &mut best {
                Some((bs, bc)) if s > *bs => {
                    // Demote the previous best into the cache.
                    if self.cache.len() < CACHE_LIMIT {
                        self.cache.push(bc.index);
                    }
                    *bs = s;
                    *bc = Candidate {
                        index: j,
                        reduced_cost: d,
                    };
                }
                Some(_) => {
                    if self.cache.len() < CACHE_LIMIT && !self.cache.contains(&j) {
                        self.cache.push(j);
                    }
                }
                None => {
                    best = Some((
                        s,
                        Candidate {
                            index: j,
                            reduced_cost: d,
                        },
                    ));
                }
            }
        }
        best.map(|(_, c)| c)
    }

    fn best_of<S: Fn(I, E) -> E>(
        &self,
        ctx: &SolverContext,
        candidates: impl Iterator<Item = I>,
        score: &S,
    ) -> Option<Candidate> {
        let mut best: Option<(E, Candidate)> = None;
        for j in candidates {
            let d = ctx.d[j];
            let s = score(j, d);
            // Strict improvement keeps the smallest index on ties because
            // the cache preserves ascending discovery order.
            if best.as_ref().is_none_or(|(bs, _)| s > *bs) {
                best = Some((
                    s,
                    Candidate {
                        index: j,
                        reduced_cost: d,
                    },
                ));
            }
        }
        best.map(|(_, c)| c)
    }

    fn reset(&mut self) {
        self.cache.clear();
    }
}

/// Largest-magnitude reduced cost.
pub(crate) struct Dantzig {
    sections: Sections,
}

impl PricingRule for Dantzig {
    fn select(&mut self, ctx: &SolverContext) -> Option<Candidate> {
        self.sections.select(ctx, |_, d| d.abs())
    }

    fn wants_tau(&self) -> bool {
        false
    }

    fn on_pivot(&mut self, _ctx: &SolverContext, _info: &PivotInfo) {}

    fn reset(&mut self, _ctx: &SolverContext) {
        self.sections.reset();
    }
}

/// Reduced cost normalized by Goldfarb-Reid reference weights.
pub(crate) struct SteepestEdge {
    sections: Sections,
    gamma: Vec<E>,
}

impl PricingRule for SteepestEdge {
    fn select(&mut self, ctx: &SolverContext) -> Option<Candidate> {
        let gamma = &self.gamma;
        self.sections
            .select(ctx, |j, d| d * d / gamma[j].max(MIN_WEIGHT))
    }

    fn wants_tau(&self) -> bool {
        true
    }

    fn on_pivot(&mut self, ctx: &SolverContext, info: &PivotInfo) {
        let pivot = info.pivot;
        let gamma_q = self.gamma[info.entering].max(MIN_WEIGHT);

        if let Some(tau) = info.tau {
            for j in 0..ctx.total {
                if ctx.status[j].is_basic() || j == info.leaving {
                    continue;
                }
                let eta = info.alpha[j] / pivot;
                if eta != 0. {
                    let g = self.gamma[j] - 2. * eta * tau[j] + eta * eta * gamma_q;
                    self.gamma[j] = if g.is_finite() && g >= MIN_WEIGHT { g } else { 1. };
                }
            }
        }

        let g = gamma_q / (pivot * pivot);
        self.gamma[info.leaving] = if g.is_finite() && g >= MIN_WEIGHT { g } else { 1. };
    }

    fn reset(&mut self, _ctx: &SolverContext) {
        self.sections.reset();
        self.gamma.fill(1.);
    }
}

#[cfg(test)]
mod tests {
    use crate::SolverOptions;
    use crate::lp::{INF, LinearProgram, RowSense};

    use super::*;

    #[test]
    fn attractiveness_rules() {
        let tol = 1e-6;
        assert!(is_attractive(VarStatus::AtLower, -1e-3, tol));
        assert!(!is_attractive(VarStatus::AtLower, 1e-3, tol));
        assert!(!is_attractive(VarStatus::AtLower, -1e-9, tol));
        assert!(is_attractive(VarStatus::AtUpper, 1e-3, tol));
        assert!(!is_attractive(VarStatus::AtUpper, -1e-3, tol));
        assert!(is_attractive(VarStatus::Free, 1e-3, tol));
        assert!(is_attractive(VarStatus::Free, -1e-3, tol));
        assert!(!is_attractive(VarStatus::Fixed, 1., tol));
        assert!(!is_attractive(VarStatus::Basic, 1., tol));
    }

    fn priced_context(lp: &LinearProgram) -> super::super::context::SolverContext<'_> {
        let options = SolverOptions::default();
        let mut ctx = super::super::context::SolverContext::new(lp, &options).unwrap();
        ctx.crash_slack();
        ctx.snap_nonbasic();
        ctx.refactorize().unwrap();
        ctx.recompute_duals();
        ctx
    }

    fn three_var_lp() -> LinearProgram {
        LinearProgram::new(
            vec![-1., -3., -2.],
            &[(0, 0, 1.), (0, 1, 1.), (0, 2, 1.)],
            vec![RowSense::Le],
            vec![10.],
            vec![0., 0., 0.],
            vec![INF, INF, INF],
        )
        .unwrap()
    }

    #[test]
    fn dantzig_picks_largest_magnitude() {
        let lp = three_var_lp();
        let ctx = priced_context(&lp);
        let mut pricer = Dantzig {
            sections: Sections::new(200),
        };
        let c = pricer.select(&ctx).unwrap();
        assert_eq!(c.index, 1);
        assert_eq!(c.reduced_cost, -3.);
    }

    #[test]
    fn dantzig_ties_break_to_smaller_index() {
        let lp = LinearProgram::new(
            vec![-2., -2.],
            &[(0, 0, 1.), (0, 1, 1.)],
            vec![RowSense::Le],
            vec![1.],
            vec![0., 0.],
            vec![INF, INF],
        )
        .unwrap();
        let ctx = priced_context(&lp);
        let mut pricer = Dantzig {
            sections: Sections::new(200),
        };
        assert_eq!(pricer.select(&ctx).unwrap().index, 0);
    }

    #[test]
    fn steepest_weights_change_the_order() {
        let lp = three_var_lp();
        let ctx = priced_context(&lp);
        let mut pricer = SteepestEdge {
            sections: Sections::new(200),
            gamma: vec![1.; ctx.total],
        };
        // With unit weights the rule agrees with Dantzig.
        assert_eq!(pricer.select(&ctx).unwrap().index, 1);

        // A heavy weight on variable 1 demotes it: 9/100 < 4/1.
        pricer.sections.reset();
        pricer.gamma[1] = 100.;
        assert_eq!(pricer.select(&ctx).unwrap().index, 2);
    }

    #[test]
    fn optimal_when_nothing_attractive() {
        // Minimize with nonnegative costs from the slack basis: d = c >= 0.
        let lp = LinearProgram::new(
            vec![1., 2.],
            &[(0, 0, 1.), (0, 1, 1.)],
            vec![RowSense::Le],
            vec![4.],
            vec![0., 0.],
            vec![INF, INF],
        )
        .unwrap();
        let ctx = priced_context(&lp);
        let mut pricer = Dantzig {
            sections: Sections::new(200),
        };
        assert!(pricer.select(&ctx).is_none());
    }

    #[test]
    fn section_scan_falls_back_to_full_sweep() {
        let lp = three_var_lp();
        let mut ctx = priced_context(&lp);
        // Make the first section (size 2) unattractive; only variable 2
        // stays attractive, found by the fallback sweep.
        ctx.d[0] = 1.;
        ctx.d[1] = 1.;
        let mut pricer = Dantzig {
            sections: Sections::new(2),
        };
        let c = pricer.select(&ctx).unwrap();
        assert_eq!(c.index, 2);
    }

    #[test]
    fn cache_serves_reverified_candidates() {
        let lp = three_var_lp();
        let ctx = priced_context(&lp);
        let mut pricer = Dantzig {
            sections: Sections::new(200),
        };
        // First scan caches the runners-up (0 and 2).
        assert_eq!(pricer.select(&ctx).unwrap().index, 1);
        assert!(!pricer.sections.cache.is_empty());
        // Cached entries answer the next call without a section scan.
        let section_before = pricer.sections.current;
        assert_eq!(pricer.select(&ctx).unwrap().index, 2);
        assert_eq!(pricer.sections.current, section_before);
    }
}
