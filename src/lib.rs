//! # rsplex
//!
//! A sparse revised-simplex solver for linear programs in standard form:
//!
//! ```text
//! min  c^T x
//! s.t. A x {<=, =, >=} b
//!      l <= x <= u
//! ```
//!
//! Inequality rows are normalized internally by one slack variable per row;
//! the engine then runs a bounded-variable revised simplex with a product-form
//! basis inverse (Markowitz LU plus an eta chain), Harris ratio tests, and
//! Dantzig or steepest-edge pricing.
//!
//! The primary entry point is [`lp::simplex::RevisedSimplex`]; see
//! [`lp::LinearProgram`] for assembling a model.

use serde::{Deserialize, Serialize};

pub type E = f64;
pub type I = usize;

pub mod callback;
pub mod linalg;
pub mod lp;
pub mod options;
pub mod terminators;

#[cfg(test)]
pub mod tests;

pub use options::{PricingStrategy, SolverOptions};

/// Status codes for the solver.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
pub enum Status {
    #[default]
    /// The solver is still running.
    InProgress,
    /// An optimal solution was found.
    Optimal,
    /// The problem is infeasible.
    Infeasible,
    /// The problem is unbounded.
    Unbounded,
    /// The solver stopped due to an iteration limit.
    IterationLimit,
    /// The solver stopped due to a time limit.
    TimeLimit,
    /// The solver was interrupted (e.g., by user or signal).
    Interrupted,
    /// The basis became numerically singular and could not be recovered.
    NumericalSingular,
    /// An allocation failed while setting up or extending solver state.
    OutOfMemory,
}

impl Status {
    /// Whether the run ended in a state with a meaningful (if possibly
    /// suboptimal) solution attached.
    pub fn has_solution(self) -> bool {
        !matches!(self, Status::InProgress | Status::OutOfMemory)
    }
}

/// Simplex phase indicator.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum Phase {
    /// Feasibility recovery under the artificial (infeasibility) objective.
    One,
    /// Optimization of the original objective.
    Two,
}

/// Per-iteration snapshot handed to [`callback::Callback`] implementations.
#[derive(Debug, Clone, Copy)]
pub struct IterationState {
    pub iteration: I,
    pub phase: Phase,
    /// Working objective value (total infeasibility while in phase one).
    pub objective: E,
    /// Sum of bound violations over the basic variables.
    pub infeasibility: E,
    /// Length of the eta chain since the last refactorization.
    pub eta_count: I,
}

/// Hooks threaded through a solve: a per-iteration callback and a
/// cooperative terminator polled at iteration boundaries.
pub struct SolverHooks {
    pub callback: Box<dyn callback::Callback>,
    pub terminator: Box<dyn terminators::Terminator>,
}

impl Default for SolverHooks {
    fn default() -> Self {
        Self {
            callback: Box::new(callback::NoOpCallback {}),
            terminator: Box::new(terminators::MultipleTerminators::new(Vec::new())),
        }
    }
}
