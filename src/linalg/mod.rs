pub mod factor;
pub mod lu;
pub mod sparse;
pub mod vector_ops;

use derive_more::{Display, Error};

use crate::E;

/// Entries with magnitude below this threshold are treated as explicit zeros
/// in sparse storage, eliminated fill, and eta vectors.
pub const DROP_TOL: E = 1e-12;

/// Failures raised by basis factorization and the triangular solves.
#[derive(Debug, Display, Error, PartialEq)]
pub enum FactorError {
    #[display("basis is singular: no admissible pivot at elimination step {step} of {dim}")]
    Singular { step: usize, dim: usize },

    #[display("memory reservation failed")]
    Memory,
}
