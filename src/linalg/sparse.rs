//! Compressed sparse column matrix storage.
//!
//! [`SparseMatrix`] is the constraint-matrix representation consumed by the
//! simplex engine: an offsets/rows/values triple with strictly sorted row
//! indices within each column, finite values only, and no stored entries
//! below [`DROP_TOL`](super::DROP_TOL). A row-major mirror with the same
//! guarantees is produced by [`SparseMatrix::transpose`].

use derive_more::{Display, Error};

use crate::linalg::DROP_TOL;
use crate::{E, I};

/// A matrix entry supplied to [`SparseMatrix::from_triplets`].
pub type Triplet = (I, I, E);

#[derive(Debug, Display, Error, PartialEq)]
pub enum SparseError {
    #[display("entry ({row}, {col}) is outside a {nrows}x{ncols} matrix")]
    IndexOutOfBounds {
        row: I,
        col: I,
        nrows: I,
        ncols: I,
    },

    #[display("entry ({row}, {col}) is not finite")]
    NonFinite { row: I, col: I },
}

/// Column-major (CSC) sparse matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    nrows: I,
    ncols: I,
    col_ptr: Vec<I>,
    row_idx: Vec<I>,
    values: Vec<E>,
}

impl SparseMatrix {
    /// An empty matrix of the given dimensions.
    pub fn zeros(nrows: I, ncols: I) -> Self {
        Self {
            nrows,
            ncols,
            col_ptr: vec![0; ncols + 1],
            row_idx: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Builds a matrix from unordered triplets. Duplicate entries are summed,
    /// magnitudes below the drop threshold are discarded, and each column
    /// ends up with strictly increasing row indices.
    pub fn from_triplets(nrows: I, ncols: I, triplets: &[Triplet]) -> Result<Self, SparseError> {
        for &(row, col, value) in triplets {
            if row >= nrows || col >= ncols {
                return Err(SparseError::IndexOutOfBounds {
                    row,
                    col,
                    nrows,
                    ncols,
                });
            }
            if !value.is_finite() {
                return Err(SparseError::NonFinite { row, col });
            }
        }

        let mut sorted: Vec<Triplet> = triplets.to_vec();
        sorted.sort_by(|a, b| (a.1, a.0).cmp(&(b.1, b.0)));

        let mut col_ptr = vec![0; ncols + 1];
        let mut row_idx = Vec::with_capacity(sorted.len());
        let mut values = Vec::with_capacity(sorted.len());

        let mut it = sorted.into_iter().peekable();
        while let Some((row, col, mut value)) = it.next() {
            while let Some(&(r2, c2, v2)) = it.peek() {
                if r2 == row && c2 == col {
                    value += v2;
                    it.next();
                } else {
                    break;
                }
            }
            if value.abs() >= DROP_TOL {
                col_ptr[col + 1] += 1;
                row_idx.push(row);
                values.push(value);
            }
        }
        for c in 0..ncols {
            col_ptr[c + 1] += col_ptr[c];
        }

        Ok(Self {
            nrows,
            ncols,
            col_ptr,
            row_idx,
            values,
        })
    }

    pub fn nrows(&self) -> I {
        self.nrows
    }

    pub fn ncols(&self) -> I {
        self.ncols
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> I {
        self.row_idx.len()
    }

    /// Row indices and values of column `j`.
    pub fn column(&self, j: I) -> (&[I], &[E]) {
        let range = self.col_ptr[j]..self.col_ptr[j + 1];
        (&self.row_idx[range.clone()], &self.values[range])
    }

    /// Copies column `j` into an owned sparse vector.
    pub fn column_vec(&self, j: I) -> Vec<(I, E)> {
        let (rows, values) = self.column(j);
        rows.iter().copied().zip(values.iter().copied()).collect()
    }

    /// Two-pass transpose. The result is the row-major mirror: column `i` of
    /// the transpose holds row `i` of `self`, sorted by original column.
    pub fn transpose(&self) -> SparseMatrix {
        let mut col_ptr = vec![0; self.nrows + 1];
        for &i in &self.row_idx {
            col_ptr[i + 1] += 1;
        }
        for i in 0..self.nrows {
            col_ptr[i + 1] += col_ptr[i];
        }

        let mut cursor = col_ptr.clone();
        let mut row_idx = vec![0; self.nnz()];
        let mut values = vec![0.; self.nnz()];
        for j in 0..self.ncols {
            let (rows, vals) = self.column(j);
            for (&i, &v) in rows.iter().zip(vals) {
                let at = cursor[i];
                row_idx[at] = j;
                values[at] = v;
                cursor[i] += 1;
            }
        }

        SparseMatrix {
            nrows: self.ncols,
            ncols: self.nrows,
            col_ptr,
            row_idx,
            values,
        }
    }

    /// Structural invariant check: monotone offsets, strictly sorted in-range
    /// rows, finite values above the drop threshold.
    pub fn is_valid(&self) -> bool {
        if self.col_ptr.len() != self.ncols + 1 || self.col_ptr[0] != 0 {
            return false;
        }
        if *self.col_ptr.last().unwrap() != self.row_idx.len()
            || self.row_idx.len() != self.values.len()
        {
            return false;
        }
        for j in 0..self.ncols {
            if self.col_ptr[j] > self.col_ptr[j + 1] {
                return false;
            }
            let (rows, values) = self.column(j);
            for (k, (&i, &v)) in rows.iter().zip(values).enumerate() {
                if i >= self.nrows || !v.is_finite() || v.abs() < DROP_TOL {
                    return false;
                }
                if k > 0 && rows[k - 1] >= i {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> SparseMatrix {
        // [ 1  .  2 ]
        // [ .  3  . ]
        SparseMatrix::from_triplets(2, 3, &[(0, 2, 2.), (1, 1, 3.), (0, 0, 1.)]).unwrap()
    }

    #[test]
    fn builds_sorted_columns() {
        let m = small();
        assert!(m.is_valid());
        assert_eq!(m.nnz(), 3);
        assert_eq!(m.column(0), (&[0][..], &[1.][..]));
        assert_eq!(m.column(1), (&[1][..], &[3.][..]));
        assert_eq!(m.column(2), (&[0][..], &[2.][..]));
    }

    #[test]
    fn merges_duplicates_and_drops_zeros() {
        let m = SparseMatrix::from_triplets(2, 2, &[(0, 0, 1.), (0, 0, 2.), (1, 1, 1.), (1, 1, -1.)])
            .unwrap();
        assert!(m.is_valid());
        assert_eq!(m.nnz(), 1);
        assert_eq!(m.column(0), (&[0][..], &[3.][..]));
        assert_eq!(m.column(1), (&[][..], &[][..]));
    }

    #[test]
    fn rejects_bad_entries() {
        assert_eq!(
            SparseMatrix::from_triplets(2, 2, &[(2, 0, 1.)]),
            Err(SparseError::IndexOutOfBounds {
                row: 2,
                col: 0,
                nrows: 2,
                ncols: 2
            })
        );
        assert_eq!(
            SparseMatrix::from_triplets(2, 2, &[(0, 1, E::NAN)]),
            Err(SparseError::NonFinite { row: 0, col: 1 })
        );
    }

    #[test]
    fn transpose_mirrors_content() {
        let m = small();
        let t = m.transpose();
        assert!(t.is_valid());
        assert_eq!(t.nrows(), 3);
        assert_eq!(t.ncols(), 2);
        // Row 0 of m was [1, 0, 2].
        assert_eq!(t.column(0), (&[0, 2][..], &[1., 2.][..]));
        assert_eq!(t.column(1), (&[1][..], &[3.][..]));
        assert_eq!(t.transpose(), m);
    }

    #[test]
    fn empty_matrix() {
        let m = SparseMatrix::zeros(0, 0);
        assert!(m.is_valid());
        assert_eq!(m.transpose().nnz(), 0);
    }
}
