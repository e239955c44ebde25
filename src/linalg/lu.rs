//! Sparse LU factorization of the simplex basis.
//!
//! Gaussian elimination with Markowitz pivoting: at each elimination step,
//! among entries passing the relative pivot-tolerance threshold, the pivot
//! minimizing `(row_count - 1) * (col_count - 1)` is chosen, with ties broken
//! by smaller row count, then smaller column index, then smaller row index.
//! The selection is order-independent, so the factorization is deterministic.
//!
//! The factors are stored as elementary operations (a multiplier column per
//! step for `L`, a permuted row per step for `U`) so that the triangular
//! solves compose directly with the eta chain maintained in
//! [`factor`](super::factor).

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use crate::linalg::{DROP_TOL, FactorError};
use crate::{E, I};

/// LU factors of a basis matrix `B` with row permutation `P` and column
/// permutation `Q` such that `P B Q = L U`.
#[derive(Debug, Clone)]
pub struct LuFactors {
    dim: I,
    /// Column `k` of `L` (unit diagonal implied): `(original row, multiplier)`
    /// pairs over rows eliminated at later steps.
    lower_cols: Vec<Vec<(I, E)>>,
    /// Off-diagonal of row `k` of `U`: `(step index, value)` pairs with step
    /// indices greater than `k`.
    upper_rows: Vec<Vec<(I, E)>>,
    /// Diagonal of `U` in step order.
    upper_diag: Vec<E>,
    /// Step -> original row eliminated at that step.
    pivot_rows: Vec<I>,
    /// Step -> basis column eliminated at that step.
    pivot_cols: Vec<I>,
}

impl LuFactors {
    /// Factors of the 0x0 basis.
    pub fn empty() -> Self {
        Self {
            dim: 0,
            lower_cols: Vec::new(),
            upper_rows: Vec::new(),
            upper_diag: Vec::new(),
            pivot_rows: Vec::new(),
            pivot_cols: Vec::new(),
        }
    }

    pub fn dim(&self) -> I {
        self.dim
    }

    /// Stored off-diagonal entries across both factors.
    pub fn nnz(&self) -> I {
        self.lower_cols.iter().map(Vec::len).sum::<I>()
            + self.upper_rows.iter().map(Vec::len).sum::<I>()
    }

    /// Factorizes the `dim` sparse basis columns.
    pub fn factorize(dim: I, cols: &[Vec<(I, E)>], pivot_tol: E) -> Result<Self, FactorError> {
        debug_assert_eq!(cols.len(), dim);

        // Active submatrix: per-column entries keyed by row, plus the set of
        // active columns touching each row (for Markowitz row counts).
        let mut acols: Vec<BTreeMap<I, E>> = Vec::new();
        let mut row_cols: Vec<BTreeSet<I>> = Vec::new();
        acols.try_reserve_exact(dim).map_err(|_| FactorError::Memory)?;
        row_cols
            .try_reserve_exact(dim)
            .map_err(|_| FactorError::Memory)?;
        row_cols.resize_with(dim, BTreeSet::new);
        for (j, col) in cols.iter().enumerate() {
            let mut map = BTreeMap::new();
            for &(i, v) in col {
                if v.abs() >= DROP_TOL {
                    map.insert(i, v);
                    row_cols[i].insert(j);
                }
            }
            acols.push(map);
        }

        let mut col_active = vec![true; dim];
        let mut lower_cols = Vec::with_capacity(dim);
        let mut upper_rows = Vec::with_capacity(dim);
        let mut upper_diag = Vec::with_capacity(dim);
        let mut pivot_rows = Vec::with_capacity(dim);
        let mut pivot_cols = Vec::with_capacity(dim);

        for step in 0..dim {
            // Minimize (markowitz, row_count, col, row) over admissible pivots.
            let mut best: Option<((I, I, I, I), E)> = None;
            for (j, col) in acols.iter().enumerate() {
                if !col_active[j] || col.is_empty() {
                    continue;
                }
                let col_max = col.values().fold(0., |acc: E, v| acc.max(v.abs()));
                let threshold = (pivot_tol * col_max).max(pivot_tol);
                let col_count = col.len();
                for (&i, &v) in col {
                    if v.abs() < threshold {
                        continue;
                    }
                    let row_count = row_cols[i].len();
                    let key = ((row_count - 1) * (col_count - 1), row_count, j, i);
                    if best.as_ref().is_none_or(|(k, _)| key < *k) {
                        best = Some((key, v));
                    }
                }
            }

            let Some(((_, _, pj, pi), pv)) = best else {
                return Err(FactorError::Singular { step, dim });
            };

            let lcol: Vec<(I, E)> = acols[pj]
                .iter()
                .filter(|&(&i, _)| i != pi)
                .map(|(&i, &v)| (i, v / pv))
                .collect();
            let urow: Vec<(I, E)> = row_cols[pi]
                .iter()
                .filter(|&&j| j != pj)
                .map(|&j| (j, acols[j][&pi]))
                .collect();

            // Rank-one update of the remaining active submatrix.
            for &(j2, u) in &urow {
                acols[j2].remove(&pi);
                for &(i2, l) in &lcol {
                    let delta = l * u;
                    match acols[j2].entry(i2) {
                        Entry::Occupied(mut e) => {
                            let updated = *e.get() - delta;
                            if updated.abs() < DROP_TOL {
                                e.remove();
                                row_cols[i2].remove(&j2);
                            } else {
                                *e.get_mut() = updated;
                            }
                        }
                        Entry::Vacant(e) => {
                            if delta.abs() >= DROP_TOL {
                                e.insert(-delta);
                                row_cols[i2].insert(j2);
                            }
                        }
                    }
                }
            }

            for &(i2, _) in &lcol {
                row_cols[i2].remove(&pj);
            }
            acols[pj].clear();
            row_cols[pi].clear();
            col_active[pj] = false;

            lower_cols.push(lcol);
            upper_rows.push(urow);
            upper_diag.push(pv);
            pivot_rows.push(pi);
            pivot_cols.push(pj);
        }

        // Remap U row entries from basis-column indices to step indices now
        // that the full column permutation is known.
        let mut step_of_col = vec![0; dim];
        for (step, &j) in pivot_cols.iter().enumerate() {
            step_of_col[j] = step;
        }
        for row in &mut upper_rows {
            for entry in row.iter_mut() {
                entry.0 = step_of_col[entry.0];
            }
            row.sort_unstable_by_key(|&(s, _)| s);
        }

        Ok(Self {
            dim,
            lower_cols,
            upper_rows,
            upper_diag,
            pivot_rows,
            pivot_cols,
        })
    }

    /// Solves `B y = a`. On entry `work` holds `a` indexed by original row;
    /// on exit it holds `y` indexed by basis column. `tmp` is scratch of
    /// length `dim`.
    pub fn solve_b(&self, work: &mut [E], tmp: &mut [E]) {
        // Forward: z = L^-1 P a, kept in original-row indexing.
        for (k, lcol) in self.lower_cols.iter().enumerate() {
            let zp = work[self.pivot_rows[k]];
            if zp != 0. {
                for &(i, l) in lcol {
                    work[i] -= l * zp;
                }
            }
        }
        // Backward: U w = z in step indexing.
        for k in (0..self.dim).rev() {
            let mut s = work[self.pivot_rows[k]];
            for &(j, u) in &self.upper_rows[k] {
                s -= u * tmp[j];
            }
            tmp[k] = s / self.upper_diag[k];
        }
        // Scatter back through the column permutation.
        for k in 0..self.dim {
            work[self.pivot_cols[k]] = tmp[k];
        }
    }

    /// Solves `B^T y = g`. On entry `work` holds `g` indexed by basis column;
    /// on exit it holds `y` indexed by original row. `tmp` is scratch of
    /// length `dim`.
    pub fn solve_bt(&self, work: &mut [E], tmp: &mut [E]) {
        for k in 0..self.dim {
            tmp[k] = work[self.pivot_cols[k]];
        }
        // Forward: U^T v = g, columns of U^T are the stored rows of U.
        for k in 0..self.dim {
            tmp[k] /= self.upper_diag[k];
            let vk = tmp[k];
            if vk != 0. {
                for &(j, u) in &self.upper_rows[k] {
                    tmp[j] -= u * vk;
                }
            }
        }
        // Backward: L^T (P y) = v; every row referenced by column k of L is
        // the pivot row of a later step, so it is already resolved.
        for k in (0..self.dim).rev() {
            let mut z = tmp[k];
            for &(i, l) in &self.lower_cols[k] {
                z -= l * work[i];
            }
            work[self.pivot_rows[k]] = z;
        }
    }
}
