//! Solver parameter bundle.
//!
//! All tolerances and limits recognized by the engine live here. Options are
//! read once at solve start; changing them afterwards has no effect on a
//! running solve.

use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};

use crate::{E, I};

/// Entering-variable selection rule.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
pub enum PricingStrategy {
    /// Largest-magnitude reduced cost.
    Dantzig,
    #[default]
    /// Reduced cost normalized by approximate steepest-edge weights.
    SteepestEdge,
}

/// A parameter was set to a value outside its accepted range.
#[derive(Debug, Display, Error, PartialEq)]
#[display("invalid value for option '{name}': {reason}")]
pub struct InvalidOption {
    pub name: &'static str,
    pub reason: String,
}

/// Solver options with their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverOptions {
    /// Primal feasibility tolerance.
    pub feasibility_tol: E,
    /// Dual feasibility (optimality) tolerance.
    pub optimality_tol: E,
    /// Smallest pivot element magnitude accepted by factorization and basis
    /// exchanges.
    pub pivot_tol: E,
    /// Hard cap on simplex iterations.
    pub max_iterations: I,
    /// Pivots between scheduled refactorizations.
    pub refactor_interval: I,
    /// Eta-chain length that forces an immediate refactorization.
    pub max_eta_count: I,
    /// Budget on stored eta nonzeros; a refactorization is forced once half
    /// of it is consumed.
    pub eta_memory_budget: I,
    /// Entering-variable selection rule.
    pub pricing: PricingStrategy,
    /// Number of variables per partial-pricing section.
    pub section_size: I,
    /// Anti-cycling bound perturbation.
    pub perturbation: bool,
    /// Magnitude treated as infinite in bounds and clamped to in results.
    pub infinity: E,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            feasibility_tol: 1e-6,
            optimality_tol: 1e-6,
            pivot_tol: 1e-7,
            max_iterations: 1_000_000,
            refactor_interval: 100,
            max_eta_count: 100,
            eta_memory_budget: 1_000_000,
            pricing: PricingStrategy::SteepestEdge,
            section_size: 200,
            perturbation: true,
            infinity: 1e100,
        }
    }
}

impl SolverOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks every option against its accepted range.
    pub fn validate(&self) -> Result<(), InvalidOption> {
        fn positive(name: &'static str, v: E) -> Result<(), InvalidOption> {
            if !(v.is_finite() && v > 0.) {
                return Err(InvalidOption {
                    name,
                    reason: format!("expected a positive finite value, got {v}"),
                });
            }
            Ok(())
        }

        positive("feasibility_tol", self.feasibility_tol)?;
        positive("optimality_tol", self.optimality_tol)?;
        positive("pivot_tol", self.pivot_tol)?;
        positive("infinity", self.infinity)?;

        if self.pivot_tol >= self.infinity {
            return Err(InvalidOption {
                name: "pivot_tol",
                reason: "must be smaller than the infinity sentinel".to_string(),
            });
        }
        if self.refactor_interval == 0 {
            return Err(InvalidOption {
                name: "refactor_interval",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_eta_count == 0 {
            return Err(InvalidOption {
                name: "max_eta_count",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.section_size == 0 {
            return Err(InvalidOption {
                name: "section_size",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
