//! Linear program model and solution types.

use std::sync::OnceLock;

use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};

use crate::linalg::sparse::{SparseError, SparseMatrix, Triplet};
use crate::options::InvalidOption;
use crate::{E, I, Status};

pub mod simplex;

/// Finite stand-in for IEEE infinity; bound arithmetic never produces NaN.
pub const INF: E = 1e100;

/// Whether a bound magnitude is treated as infinite under sentinel `inf`.
pub fn is_infinite_with(x: E, inf: E) -> bool {
    x.abs() >= 0.5 * inf
}

/// Whether a bound magnitude is treated as infinite under the default
/// sentinel [`INF`].
pub fn is_infinite(x: E) -> bool {
    is_infinite_with(x, INF)
}

/// Constraint row sense.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum RowSense {
    /// `a^T x <= b`
    Le,
    /// `a^T x = b`
    Eq,
    /// `a^T x >= b`
    Ge,
}

/// Status of a variable relative to the current basis.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum VarStatus {
    /// In the basis.
    Basic,
    /// Nonbasic at its lower bound.
    AtLower,
    /// Nonbasic at its upper bound.
    AtUpper,
    /// Nonbasic free variable, held at zero.
    Free,
    /// Nonbasic with equal bounds.
    Fixed,
}

impl VarStatus {
    pub fn is_basic(self) -> bool {
        self == VarStatus::Basic
    }
}

/// Classification of a variable's bound pair.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BoundClass {
    Free,
    LowerOnly,
    UpperOnly,
    Boxed,
    Fixed,
}

/// Classifies `(lb, ub)` under the sentinel `inf`.
pub fn bound_class(lb: E, ub: E, inf: E) -> BoundClass {
    match (is_infinite_with(lb, inf), is_infinite_with(ub, inf)) {
        (true, true) => BoundClass::Free,
        (false, true) => BoundClass::LowerOnly,
        (true, false) => BoundClass::UpperOnly,
        (false, false) if lb == ub => BoundClass::Fixed,
        (false, false) => BoundClass::Boxed,
    }
}

/// Model assembly and validation failures.
#[derive(Debug, Display, Error, PartialEq)]
pub enum ModelError {
    #[display("{what}: expected length {expected}, got {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: I,
        found: I,
    },

    #[display("{what}[{index}] is not finite")]
    NonFinite { what: &'static str, index: I },

    #[display("variable {col} has crossing bounds [{lower}, {upper}]")]
    InvalidBound { col: I, lower: E, upper: E },

    #[display("initial basis is malformed: {reason}")]
    InvalidBasis { reason: String },

    #[display("{_0}")]
    Option(InvalidOption),

    #[display("{_0}")]
    Matrix(SparseError),
}

impl From<InvalidOption> for ModelError {
    fn from(err: InvalidOption) -> Self {
        ModelError::Option(err)
    }
}

impl From<SparseError> for ModelError {
    fn from(err: SparseError) -> Self {
        ModelError::Matrix(err)
    }
}

/// A linear program over continuous variables:
///
/// ```text
/// min  c^T x + offset
/// s.t. A x {<=, =, >=} b
///      l <= x <= u
/// ```
///
/// Inequality rows are normalized to equalities inside the solver by one
/// slack variable per row; the model itself stays in the caller's form.
#[derive(Debug)]
#[allow(non_snake_case)]
pub struct LinearProgram {
    c: Vec<E>,
    A: SparseMatrix,
    b: Vec<E>,
    senses: Vec<RowSense>,
    lb: Vec<E>,
    ub: Vec<E>,
    offset: E,
    maximize: bool,
    csr: OnceLock<SparseMatrix>,
}

#[allow(non_snake_case)]
impl LinearProgram {
    /// Assembles and validates a minimization model. `triplets` are the
    /// entries of the m-by-n constraint matrix.
    pub fn new(
        c: Vec<E>,
        triplets: &[Triplet],
        senses: Vec<RowSense>,
        b: Vec<E>,
        lb: Vec<E>,
        ub: Vec<E>,
    ) -> Result<Self, ModelError> {
        let n = c.len();
        let m = b.len();

        if senses.len() != m {
            return Err(ModelError::DimensionMismatch {
                what: "senses",
                expected: m,
                found: senses.len(),
            });
        }
        if lb.len() != n {
            return Err(ModelError::DimensionMismatch {
                what: "lb",
                expected: n,
                found: lb.len(),
            });
        }
        if ub.len() != n {
            return Err(ModelError::DimensionMismatch {
                what: "ub",
                expected: n,
                found: ub.len(),
            });
        }
        for (j, &cj) in c.iter().enumerate() {
            if !cj.is_finite() || is_infinite(cj) {
                return Err(ModelError::NonFinite { what: "c", index: j });
            }
        }
        for (i, &bi) in b.iter().enumerate() {
            if !bi.is_finite() || is_infinite(bi) {
                return Err(ModelError::NonFinite { what: "b", index: i });
            }
        }
        for j in 0..n {
            if lb[j].is_nan() || ub[j].is_nan() {
                return Err(ModelError::NonFinite { what: "bounds", index: j });
            }
            if lb[j] > ub[j] {
                return Err(ModelError::InvalidBound {
                    col: j,
                    lower: lb[j],
                    upper: ub[j],
                });
            }
        }

        let A = SparseMatrix::from_triplets(m, n, triplets)?;

        Ok(Self {
            c,
            A,
            b,
            senses,
            lb,
            ub,
            offset: 0.,
            maximize: false,
            csr: OnceLock::new(),
        })
    }

    /// Turns the model into a maximization of the supplied objective. The
    /// engine still minimizes; costs are negated here and the reported
    /// objective, duals, and reduced costs are negated back on extraction.
    pub fn maximize(mut self) -> Self {
        if !self.maximize {
            self.maximize = true;
            for cj in &mut self.c {
                *cj = -*cj;
            }
        }
        self
    }

    /// Adds a constant to the reported objective value.
    pub fn with_offset(mut self, offset: E) -> Self {
        self.offset = offset;
        self
    }

    /// Number of structural variables (columns of `A`).
    pub fn num_vars(&self) -> I {
        self.c.len()
    }

    /// Number of constraints (rows of `A`).
    pub fn num_cons(&self) -> I {
        self.b.len()
    }

    /// Returns `(num_vars, num_cons)`.
    pub fn dims(&self) -> (I, I) {
        (self.num_vars(), self.num_cons())
    }

    pub fn matrix(&self) -> &SparseMatrix {
        &self.A
    }

    /// Row-major mirror of the constraint matrix, built on first use.
    pub fn matrix_by_rows(&self) -> &SparseMatrix {
        self.csr.get_or_init(|| self.A.transpose())
    }

    pub fn objective(&self) -> &[E] {
        &self.c
    }

    pub fn rhs(&self) -> &[E] {
        &self.b
    }

    pub fn senses(&self) -> &[RowSense] {
        &self.senses
    }

    pub fn lower_bounds(&self) -> &[E] {
        &self.lb
    }

    pub fn upper_bounds(&self) -> &[E] {
        &self.ub
    }

    pub fn objective_offset(&self) -> E {
        self.offset
    }

    pub fn is_maximize(&self) -> bool {
        self.maximize
    }

    /// Bounds of the slack variable normalizing row `i`; the sense is
    /// encoded in the sign restriction.
    pub fn slack_bounds(&self, i: I) -> (E, E) {
        match self.senses[i] {
            RowSense::Le => (0., INF),
            RowSense::Eq => (0., 0.),
            RowSense::Ge => (-INF, 0.),
        }
    }
}

/// A basis snapshot: header plus variable statuses over the `n + m`
/// normalized variables. Extracted from a [`Solution`] and accepted back by
/// [`simplex::RevisedSimplex::set_initial_basis`] for warm starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Basis {
    /// Row position -> index of the basic variable occupying it.
    pub header: Vec<I>,
    /// Status per variable, structurals first, then one slack per row.
    pub statuses: Vec<VarStatus>,
}

/// A fully-populated solve result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub status: Status,
    /// Primal values of the structural variables.
    pub x: Vec<E>,
    /// Dual values, one per row.
    pub duals: Vec<E>,
    /// Reduced costs of the structural variables.
    pub reduced_costs: Vec<E>,
    /// Slack values `b_i - a_i^T x`, one per row.
    pub row_slacks: Vec<E>,
    /// Row activities `a_i^T x`, one per row.
    pub row_activity: Vec<E>,
    pub objective_value: E,
    pub iterations: I,
    /// Max violation of `A x = b` over the normalized problem at extraction.
    pub primal_residual: E,
    /// Max attractiveness of any nonbasic reduced cost at extraction.
    pub dual_residual: E,
    pub basis: Basis,
    /// Diagnostic detail for non-success statuses.
    pub message: Option<String>,
}
