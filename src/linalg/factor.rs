//! Product-form representation of the basis inverse.
//!
//! [`BasisFactor`] holds the LU factorization of the basis as of the last
//! refactorization together with an arena-backed chain of eta vectors, one
//! per subsequent pivot. `B^-1` is `E_k^-1 ... E_1^-1 (L U)^-1` up to
//! permutations; [`BasisFactor::ftran`] and [`BasisFactor::btran`] apply it
//! from the two sides.
//!
//! The factor also owns the refactorization scheduler: eta-chain length,
//! eta memory, pivot count, and FTRAN-time degradation each contribute a
//! [`RefactorSignal`].

use std::time::{Duration, Instant};

use crate::linalg::lu::LuFactors;
use crate::linalg::{DROP_TOL, FactorError};
use crate::{E, I};

/// Outcome of consulting the refactorization scheduler.
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
pub enum RefactorSignal {
    /// Keep going.
    None,
    /// Refactorize after the current pivot completes.
    Recommended,
    /// Refactorize immediately.
    Required,
}

/// One recorded pivot: the elementary matrix updating `B^-1`.
#[derive(Debug, Clone, Copy)]
struct Eta {
    /// Basis position of the pivot.
    pivot_row: I,
    /// Reciprocal of the pivot element.
    pivot_value: E,
    /// Range of off-diagonal entries in the arena.
    start: I,
    end: I,
}

/// Window of recent FTRAN timings used by the degradation criterion.
const FTRAN_WINDOW: usize = 8;

pub struct BasisFactor {
    dim: I,
    lu: LuFactors,
    etas: Vec<Eta>,
    eta_entries: Vec<(I, E)>,
    scratch: Vec<E>,

    // Scheduler configuration and state.
    refactor_interval: I,
    max_eta_count: I,
    eta_memory_budget: I,
    pivots_since_refactor: I,
    baseline_ftran: Option<Duration>,
    recent_ftran: [Duration; FTRAN_WINDOW],
    recent_count: usize,
}

impl BasisFactor {
    pub fn new(dim: I, refactor_interval: I, max_eta_count: I, eta_memory_budget: I) -> Self {
        Self {
            dim,
            lu: LuFactors::empty(),
            etas: Vec::new(),
            eta_entries: Vec::new(),
            scratch: vec![0.; dim],
            refactor_interval,
            max_eta_count,
            eta_memory_budget,
            pivots_since_refactor: 0,
            baseline_ftran: None,
            recent_ftran: [Duration::ZERO; FTRAN_WINDOW],
            recent_count: 0,
        }
    }

    pub fn eta_count(&self) -> I {
        self.etas.len()
    }

    pub fn eta_nonzeros(&self) -> I {
        self.eta_entries.len()
    }

    pub fn pivots_since_refactor(&self) -> I {
        self.pivots_since_refactor
    }

    /// Rebuilds the LU factors from the given basis columns, discarding the
    /// eta chain and resetting the scheduler baseline.
    pub fn refactorize(&mut self, cols: &[Vec<(I, E)>], pivot_tol: E) -> Result<(), FactorError> {
        self.lu = LuFactors::factorize(self.dim, cols, pivot_tol)?;
        self.etas.clear();
        self.eta_entries.clear();
        self.pivots_since_refactor = 0;
        self.baseline_ftran = None;
        self.recent_count = 0;
        Ok(())
    }

    /// Solves `B y = a` in place: `work` holds `a` by original row on entry
    /// and `y` by basis position on exit.
    pub fn ftran(&mut self, work: &mut [E]) {
        let started = Instant::now();

        self.lu.solve_b(work, &mut self.scratch);
        for eta in &self.etas {
            let wp = work[eta.pivot_row] * eta.pivot_value;
            work[eta.pivot_row] = wp;
            if wp != 0. {
                for &(i, v) in &self.eta_entries[eta.start..eta.end] {
                    work[i] -= v * wp;
                }
            }
        }

        self.record_ftran_time(started.elapsed());
    }

    /// Solves `B^T y = g` in place: `work` holds `g` by basis position on
    /// entry and `y` by original row on exit.
    pub fn btran(&mut self, work: &mut [E]) {
        for eta in self.etas.iter().rev() {
            let mut t = 0.;
            for &(i, v) in &self.eta_entries[eta.start..eta.end] {
                t += v * work[i];
            }
            work[eta.pivot_row] = (work[eta.pivot_row] - t) * eta.pivot_value;
        }
        self.lu.solve_bt(work, &mut self.scratch);
    }

    /// Appends the eta vector recording a pivot on basis position
    /// `pivot_row` with FTRAN'd entering column `column`. The caller must
    /// have validated the pivot element against the pivot tolerance.
    pub fn append_eta(&mut self, pivot_row: I, column: &[E]) -> Result<(), FactorError> {
        let pivot = column[pivot_row];
        debug_assert!(pivot != 0. && pivot.is_finite());

        let start = self.eta_entries.len();
        self.eta_entries
            .try_reserve(self.dim)
            .map_err(|_| FactorError::Memory)?;
        for (i, &v) in column.iter().enumerate() {
            if i != pivot_row && v.abs() >= DROP_TOL {
                self.eta_entries.push((i, v));
            }
        }
        self.etas.push(Eta {
            pivot_row,
            pivot_value: 1. / pivot,
            start,
            end: self.eta_entries.len(),
        });
        self.pivots_since_refactor += 1;
        Ok(())
    }

    /// Evaluates the four refactorization criteria and returns the strongest
    /// signal.
    pub fn refactor_signal(&self) -> RefactorSignal {
        let mut signal = RefactorSignal::None;
        if self.etas.len() >= self.max_eta_count {
            signal = signal.max(RefactorSignal::Required);
        }
        if self.eta_entries.len() >= self.eta_memory_budget / 2 {
            signal = signal.max(RefactorSignal::Required);
        }
        if self.pivots_since_refactor >= self.refactor_interval {
            signal = signal.max(RefactorSignal::Recommended);
        }
        if let Some(baseline) = self.baseline_ftran {
            let window = self.recent_count.min(FTRAN_WINDOW);
            if window > 0 && !baseline.is_zero() {
                let sum: Duration = self.recent_ftran[..window].iter().sum();
                if sum > baseline * (3 * window as u32) {
                    signal = signal.max(RefactorSignal::Recommended);
                }
            }
        }
        signal
    }

    fn record_ftran_time(&mut self, elapsed: Duration) {
        if self.baseline_ftran.is_none() {
            self.baseline_ftran = Some(elapsed);
            return;
        }
        self.recent_ftran[self.recent_count % FTRAN_WINDOW] = elapsed;
        self.recent_count += 1;
    }
}
