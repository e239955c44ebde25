//! Mutable per-solve state.
//!
//! [`SolverContext`] owns everything the iteration loop mutates: working
//! bounds and costs over the `n + m` normalized variables (structurals first,
//! then one slack per row), primal and dual vectors, the basis header and
//! status vector, the factorized basis, and the counters. The driver is the
//! single owner; nothing here is shared between solves.

use crate::linalg::factor::BasisFactor;
use crate::linalg::{FactorError, vector_ops};
use crate::lp::{Basis, LinearProgram, ModelError, VarStatus, bound_class, BoundClass, is_infinite_with};
use crate::options::SolverOptions;
use crate::{E, I, Phase};

pub(crate) struct SolverContext<'a> {
    pub lp: &'a LinearProgram,
    pub n: I,
    pub m: I,
    /// `n + m`: structurals plus slacks.
    pub total: I,

    pub inf: E,
    pub feas_tol: E,
    pub opt_tol: E,
    pub pivot_tol: E,

    /// Unperturbed working bounds, slacks included.
    pub orig_lb: Vec<E>,
    pub orig_ub: Vec<E>,
    /// Working bounds; perturbation may shrink them.
    pub lb: Vec<E>,
    pub ub: Vec<E>,
    /// Working costs; zero on slacks.
    pub cost: Vec<E>,

    /// Primal values; nonbasic entries sit exactly on their status bound.
    pub x: Vec<E>,
    /// Reduced costs for the active (phase-dependent) objective.
    pub d: Vec<E>,
    /// Duals of the active objective, one per row.
    pub pi: Vec<E>,
    pub status: Vec<VarStatus>,
    /// Basis header: row position -> basic variable.
    pub basis: Vec<I>,

    pub factor: BasisFactor,
    pub phase: Phase,
    pub iteration: I,
    /// Working objective `cost . x`; tracked incrementally in phase two.
    pub objective: E,
    pub perturbation_active: bool,
}

impl<'a> SolverContext<'a> {
    pub fn new(lp: &'a LinearProgram, options: &SolverOptions) -> Result<Self, FactorError> {
        let (n, m) = lp.dims();
        let total = n + m;

        fn try_vec<T: Clone>(value: T, len: I) -> Result<Vec<T>, FactorError> {
            let mut v = Vec::new();
            v.try_reserve_exact(len).map_err(|_| FactorError::Memory)?;
            v.resize(len, value);
            Ok(v)
        }

        let mut orig_lb = try_vec(0., total)?;
        let mut orig_ub = try_vec(0., total)?;
        let mut cost = try_vec(0., total)?;
        orig_lb[..n].copy_from_slice(lp.lower_bounds());
        orig_ub[..n].copy_from_slice(lp.upper_bounds());
        cost[..n].copy_from_slice(lp.objective());
        for i in 0..m {
            let (slb, sub) = lp.slack_bounds(i);
            orig_lb[n + i] = slb;
            orig_ub[n + i] = sub;
        }

        Ok(Self {
            lp,
            n,
            m,
            total,
            inf: options.infinity,
            feas_tol: options.feasibility_tol,
            opt_tol: options.optimality_tol,
            pivot_tol: options.pivot_tol,
            lb: orig_lb.clone(),
            ub: orig_ub.clone(),
            orig_lb,
            orig_ub,
            cost,
            x: try_vec(0., total)?,
            d: try_vec(0., total)?,
            pi: try_vec(0., m)?,
            status: try_vec(VarStatus::AtLower, total)?,
            basis: try_vec(0, m)?,
            factor: BasisFactor::new(
                m,
                options.refactor_interval,
                options.max_eta_count,
                options.eta_memory_budget,
            ),
            phase: Phase::Two,
            iteration: 0,
            objective: 0.,
            perturbation_active: false,
        })
    }

    /// Slack crash: every slack basic, structurals nonbasic at their natural
    /// bound. The basis matrix is the identity.
    pub fn crash_slack(&mut self) {
        for j in 0..self.n {
            self.status[j] = self.nonbasic_status_for(j);
        }
        for i in 0..self.m {
            self.status[self.n + i] = VarStatus::Basic;
            self.basis[i] = self.n + i;
        }
    }

    /// Natural nonbasic status for variable `j` given its bound class.
    fn nonbasic_status_for(&self, j: I) -> VarStatus {
        match bound_class(self.lb[j], self.ub[j], self.inf) {
            BoundClass::Free => VarStatus::Free,
            BoundClass::UpperOnly => VarStatus::AtUpper,
            BoundClass::Fixed => VarStatus::Fixed,
            BoundClass::LowerOnly | BoundClass::Boxed => VarStatus::AtLower,
        }
    }

    /// Installs a caller-supplied basis after validating its shape.
    pub fn install_basis(&mut self, basis: &Basis) -> Result<(), ModelError> {
        if basis.header.len() != self.m {
            return Err(ModelError::InvalidBasis {
                reason: format!("header length {} != {}", basis.header.len(), self.m),
            });
        }
        if basis.statuses.len() != self.total {
            return Err(ModelError::InvalidBasis {
                reason: format!("status length {} != {}", basis.statuses.len(), self.total),
            });
        }
        let mut seen = vec![false; self.total];
        for &j in &basis.header {
            if j >= self.total {
                return Err(ModelError::InvalidBasis {
                    reason: format!("basic variable {j} out of range"),
                });
            }
            if seen[j] {
                return Err(ModelError::InvalidBasis {
                    reason: format!("variable {j} occupies two basis positions"),
                });
            }
            seen[j] = true;
            if basis.statuses[j] != VarStatus::Basic {
                return Err(ModelError::InvalidBasis {
                    reason: format!("header lists {j} but its status is not basic"),
                });
            }
        }
        let basic_count = basis
            .statuses
            .iter()
            .filter(|s| s.is_basic())
            .count();
        if basic_count != self.m {
            return Err(ModelError::InvalidBasis {
                reason: format!("{basic_count} basic statuses for {} rows", self.m),
            });
        }

        self.basis.copy_from_slice(&basis.header);
        self.status.copy_from_slice(&basis.statuses);
        Ok(())
    }

    /// Pins every nonbasic variable exactly on its status bound.
    pub fn snap_nonbasic(&mut self) {
        for j in 0..self.total {
            self.x[j] = match self.status[j] {
                VarStatus::Basic => continue,
                VarStatus::AtLower | VarStatus::Fixed => self.lb[j],
                VarStatus::AtUpper => self.ub[j],
                VarStatus::Free => 0.,
            };
        }
    }

    /// Sparse columns of the current basis matrix.
    pub fn basis_columns(&self) -> Vec<Vec<(I, E)>> {
        self.basis
            .iter()
            .map(|&j| {
                if j < self.n {
                    self.lp.matrix().column_vec(j)
                } else {
                    vec![(j - self.n, 1.)]
                }
            })
            .collect()
    }

    /// Rebuilds the factorization and restores the derived quantities
    /// (basic primal values, duals, reduced costs, objective).
    pub fn refactorize(&mut self) -> Result<(), FactorError> {
        let cols = self.basis_columns();
        self.factor.refactorize(&cols, self.pivot_tol)?;
        self.recompute_primal();
        self.recompute_duals();
        self.recompute_objective();
        Ok(())
    }

    /// Recomputes basic primal values as `B^-1 (b - N x_N)`.
    pub fn recompute_primal(&mut self) {
        let mut rhs = self.lp.rhs().to_vec();
        for j in 0..self.total {
            if !self.status[j].is_basic() && self.x[j] != 0. {
                self.subtract_column(j, self.x[j], &mut rhs);
            }
        }
        self.factor.ftran(&mut rhs);
        for (k, &bj) in self.basis.iter().enumerate() {
            self.x[bj] = rhs[k];
        }
    }

    /// Recomputes duals and reduced costs for the active objective.
    pub fn recompute_duals(&mut self) {
        let mut work = vec![0.; self.m];
        for (k, &bj) in self.basis.iter().enumerate() {
            work[k] = self.active_cost(bj);
        }
        self.factor.btran(&mut work);
        self.pi = work;
        for j in 0..self.total {
            self.d[j] = if self.status[j].is_basic() {
                0.
            } else {
                self.active_cost(j) - self.dot_column_pi(j)
            };
        }
    }

    pub fn recompute_objective(&mut self) {
        self.objective = vector_ops::dot(&self.cost, &self.x);
    }

    /// Cost of variable `j` under the active objective. In phase one this is
    /// the signed bound-violation indicator of basic variables.
    pub fn active_cost(&self, j: I) -> E {
        match self.phase {
            Phase::Two => self.cost[j],
            Phase::One => {
                if self.status[j].is_basic() {
                    let v = self.x[j];
                    if v < self.lb[j] - self.feas_tol {
                        -1.
                    } else if v > self.ub[j] + self.feas_tol {
                        1.
                    } else {
                        0.
                    }
                } else {
                    0.
                }
            }
        }
    }

    /// Sum of basic bound violations, ignoring sub-tolerance noise.
    pub fn total_infeasibility(&self) -> E {
        self.basis
            .iter()
            .map(|&j| {
                let v = (self.lb[j] - self.x[j]).max(self.x[j] - self.ub[j]).max(0.);
                if v > self.feas_tol { v } else { 0. }
            })
            .sum()
    }

    /// `rhs -= a_j * scale` for the normalized column `j`.
    fn subtract_column(&self, j: I, scale: E, rhs: &mut [E]) {
        if j < self.n {
            let (rows, values) = self.lp.matrix().column(j);
            vector_ops::scatter_add(rows, values, -scale, rhs);
        } else {
            rhs[j - self.n] -= scale;
        }
    }

    /// `pi . a_j` for the normalized column `j`.
    fn dot_column_pi(&self, j: I) -> E {
        if j < self.n {
            let (rows, values) = self.lp.matrix().column(j);
            vector_ops::sparse_dot(rows, values, &self.pi)
        } else {
            self.pi[j - self.n]
        }
    }

    /// Dense copy of the normalized column `j` in original-row space.
    pub fn load_column(&self, j: I, out: &mut [E]) {
        out.fill(0.);
        if j < self.n {
            let (rows, values) = self.lp.matrix().column(j);
            for (&i, &v) in rows.iter().zip(values) {
                out[i] = v;
            }
        } else {
            out[j - self.n] = 1.;
        }
    }

    /// Row `row` of `B^-1 A` over all `n + m` variables, via BTRAN of the
    /// unit vector and the row-major mirror of `A`.
    pub fn pivotal_row(&mut self, row: I) -> Vec<E> {
        let mut rho = vec![0.; self.m];
        rho[row] = 1.;
        self.factor.btran(&mut rho);

        let mut alpha = vec![0.; self.total];
        let by_rows = self.lp.matrix_by_rows();
        for (i, &r) in rho.iter().enumerate() {
            if r != 0. {
                let (cols, values) = by_rows.column(i);
                vector_ops::scatter_add(cols, values, r, &mut alpha[..self.n]);
                alpha[self.n + i] = r;
            }
        }
        alpha
    }

    /// `A^T B^-T delta` over all variables: the steepest-edge companion
    /// products `tau_j = a_j . (B^-T delta)`.
    pub fn tau_vector(&mut self, delta: &[E]) -> Vec<E> {
        let mut w = delta.to_vec();
        self.factor.btran(&mut w);

        let mut tau = vec![0.; self.total];
        for j in 0..self.n {
            let (rows, values) = self.lp.matrix().column(j);
            tau[j] = vector_ops::sparse_dot(rows, values, &w);
        }
        tau[self.n..].copy_from_slice(&w);
        tau
    }

    /// Direction the entering variable moves: `+1` up from a lower bound,
    /// `-1` down from an upper bound; a free variable follows the descent
    /// direction of its reduced cost.
    pub fn entering_direction(&self, q: I) -> E {
        match self.status[q] {
            VarStatus::AtLower => 1.,
            VarStatus::AtUpper => -1.,
            VarStatus::Free => {
                if self.d[q] > 0. {
                    -1.
                } else {
                    1.
                }
            }
            VarStatus::Basic | VarStatus::Fixed => {
                debug_assert!(false, "variable {q} cannot enter");
                1.
            }
        }
    }

    /// Commits the basis exchange: updates primal values and statuses,
    /// rewrites the header, extends the eta chain, and advances the
    /// counters. `delta` is the FTRAN'd entering column; the caller has
    /// validated `delta[row]` against the pivot tolerance.
    pub fn apply_pivot(
        &mut self,
        q: I,
        dir: E,
        row: I,
        step: E,
        leaving_bound: VarStatus,
        delta: &[E],
    ) -> Result<(), FactorError> {
        let movement = dir * step;
        for (i, &di) in delta.iter().enumerate() {
            if di != 0. {
                let bj = self.basis[i];
                self.x[bj] -= movement * di;
            }
        }
        self.x[q] += movement;

        let leaving = self.basis[row];
        self.status[leaving] = leaving_bound;
        self.x[leaving] = match leaving_bound {
            VarStatus::AtLower | VarStatus::Fixed => self.lb[leaving],
            VarStatus::AtUpper => self.ub[leaving],
            VarStatus::Free => 0.,
            VarStatus::Basic => unreachable!("leaving variable must go nonbasic"),
        };

        self.status[q] = VarStatus::Basic;
        self.basis[row] = q;
        self.factor.append_eta(row, delta)?;

        if self.phase == Phase::Two {
            self.objective += self.d[q] * movement;
        }
        self.iteration += 1;
        Ok(())
    }

    /// Commits a bound flip of the entering variable: the basis is
    /// unchanged, every basic value shifts by the flip range.
    pub fn apply_bound_flip(&mut self, q: I, dir: E, step: E, delta: &[E]) {
        let movement = dir * step;
        for (i, &di) in delta.iter().enumerate() {
            if di != 0. {
                let bj = self.basis[i];
                self.x[bj] -= movement * di;
            }
        }
        match self.status[q] {
            VarStatus::AtLower => {
                self.status[q] = VarStatus::AtUpper;
                self.x[q] = self.ub[q];
            }
            VarStatus::AtUpper => {
                self.status[q] = VarStatus::AtLower;
                self.x[q] = self.lb[q];
            }
            _ => unreachable!("only bounded nonbasic variables flip"),
        }
        if self.phase == Phase::Two {
            self.objective += self.d[q] * movement;
        }
        self.iteration += 1;
    }

    /// Incremental reduced-cost update after a pivot, using the pivotal row
    /// `alpha`. `dq` and `pivot` are the entering reduced cost and pivot
    /// element captured before the exchange.
    pub fn update_reduced_costs(&mut self, q: I, leaving: I, dq: E, pivot: E, alpha: &[E]) {
        let ratio = dq / pivot;
        if ratio != 0. {
            for j in 0..self.total {
                if !self.status[j].is_basic() && j != leaving {
                    self.d[j] -= ratio * alpha[j];
                }
            }
        }
        self.d[leaving] = -ratio;
        self.d[q] = 0.;
    }

    /// Max violation of `A x = b` over the normalized problem.
    pub fn primal_residual_inf(&self) -> E {
        let mut r = self.lp.rhs().to_vec();
        for j in 0..self.total {
            if self.x[j] != 0. {
                self.subtract_column(j, self.x[j], &mut r);
            }
        }
        vector_ops::norm_inf(&r)
    }

    /// Max attractiveness of any nonbasic reduced cost (dual infeasibility).
    pub fn dual_residual_inf(&self) -> E {
        let mut worst: E = 0.;
        for j in 0..self.total {
            let v = match self.status[j] {
                VarStatus::AtLower => (-self.d[j]).max(0.),
                VarStatus::AtUpper => self.d[j].max(0.),
                VarStatus::Free => self.d[j].abs(),
                VarStatus::Basic | VarStatus::Fixed => 0.,
            };
            worst = worst.max(v);
        }
        worst
    }

    /// Whether a bound value is infinite under the configured sentinel.
    pub fn is_unbounded_value(&self, v: E) -> bool {
        is_infinite_with(v, self.inf)
    }

    #[cfg(debug_assertions)]
    pub fn assert_basis_integrity(&self) {
        let mut seen = vec![false; self.total];
        for &j in &self.basis {
            assert!(j < self.total, "basis header out of range");
            assert!(!seen[j], "variable {j} occupies two basis positions");
            assert!(self.status[j].is_basic());
            seen[j] = true;
        }
        let basic = self.status.iter().filter(|s| s.is_basic()).count();
        assert_eq!(basic, self.m, "basic status count must equal row count");
    }
}
