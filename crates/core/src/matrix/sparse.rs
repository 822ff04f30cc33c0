use nalgebra::DMatrix;
use sprs::{CsMat, TriMat};

use crate::error::{LmmError, Result};

/// Coordinate-format accumulator for sparse cross products.
///
/// Repeated `(row, col)` contributions are summed on conversion to CSC,
/// which is how cross products accumulate one contribution per observation.
#[derive(Debug)]
pub struct TripletBuilder {
    triplet: TriMat<f64>,
}

impl TripletBuilder {
    /// Empty `nrow × ncol` accumulator.
    pub fn new(nrow: usize, ncol: usize) -> Self {
        Self {
            triplet: TriMat::new((nrow, ncol)),
        }
    }

    /// Create a builder with room for `nnz` triplets.
    pub fn with_capacity(nrow: usize, ncol: usize, nnz: usize) -> Self {
        Self {
            triplet: TriMat::with_capacity((nrow, ncol), nnz),
        }
    }

    /// Record one contribution at `(row, col)`.
    pub fn add(&mut self, row: usize, col: usize, val: f64) {
        self.triplet.add_triplet(row, col, val);
    }

    /// Column-compressed matrix with repeated positions summed.
    pub fn to_csc(&self) -> CsMat<f64> {
        self.triplet.to_csc()
    }
}

/// Ensure CSC storage, converting a CSR matrix if needed.
pub fn ensure_csc(a: CsMat<f64>) -> CsMat<f64> {
    if a.is_csc() {
        a
    } else {
        a.to_csc()
    }
}

/// `result := A x` into a caller buffer of length `a.rows()`.
pub fn spmv_into(a: &CsMat<f64>, x: &[f64], result: &mut [f64]) {
    assert_eq!(a.cols(), x.len());
    assert_eq!(a.rows(), result.len());

    result.fill(0.0);
    for (val, (row, col)) in a.iter() {
        result[row] += val * x[col];
    }
}

/// Accumulate the transposed product: result += A' * x.
pub fn spmv_transpose_acc(a: &CsMat<f64>, x: &[f64], result: &mut [f64]) {
    assert_eq!(a.rows(), x.len());
    assert_eq!(a.cols(), result.len());

    for (val, (row, col)) in a.iter() {
        result[col] += val * x[row];
    }
}

/// Materialize a sparse matrix as a dense one.
pub fn to_dense(a: &CsMat<f64>) -> DMatrix<f64> {
    let mut out = DMatrix::zeros(a.rows(), a.cols());
    for (&val, (row, col)) in a.iter() {
        out[(row, col)] += val;
    }
    out
}

/// Fraction of stored entries relative to the full `rows × cols` extent.
pub fn fill_ratio(a: &CsMat<f64>) -> f64 {
    let total = a.rows() * a.cols();
    if total == 0 {
        0.0
    } else {
        a.nnz() as f64 / total as f64
    }
}

/// Position in the value array of entry `(row, col)` of a CSC matrix, or
/// `None` if the entry is not part of the stored structure.
pub fn csc_position(a: &CsMat<f64>, row: usize, col: usize) -> Option<usize> {
    let range = a.indptr().outer_inds(col);
    let start = range.start;
    a.indices()[range]
        .binary_search(&row)
        .ok()
        .map(|offset| start + offset)
}

/// Reject row-compressed storage where the column layout is assumed.
pub fn require_csc(a: &CsMat<f64>, what: &str) -> Result<()> {
    if !a.is_csc() {
        return Err(LmmError::InvalidSparsityPattern(format!(
            "{} must be stored column-compressed",
            what
        )));
    }
    Ok(())
}

/// Check that every column's stored rows come in complete runs of `s`
/// consecutive rows starting at a multiple of `s`.
pub fn check_row_runs(a: &CsMat<f64>, s: usize) -> Result<()> {
    require_csc(a, "sparse target of a row-block update")?;
    let indptr = a.indptr();
    let indices = a.indices();
    for col in 0..a.cols() {
        let rows = &indices[indptr.outer_inds(col)];
        if rows.len() % s != 0 {
            return Err(LmmError::InvalidSparsityPattern(format!(
                "column {} holds {} entries, not a multiple of block size {}",
                col,
                rows.len(),
                s
            )));
        }
        for run in rows.chunks_exact(s) {
            let base = run[0];
            if base % s != 0 || run.iter().enumerate().any(|(k, &r)| r != base + k) {
                return Err(LmmError::InvalidSparsityPattern(format!(
                    "column {} has a partial row block starting at row {}",
                    col, base
                )));
            }
        }
    }
    Ok(())
}

/// Check that the `p` columns of every column block share one row pattern.
pub fn check_column_blocks(a: &CsMat<f64>, p: usize) -> Result<()> {
    require_csc(a, "sparse target of a column-block update")?;
    if a.cols() % p != 0 {
        return Err(LmmError::dim(
            a.cols().div_ceil(p) * p,
            a.cols(),
            "column count of sparse block must be a multiple of the block size",
        ));
    }
    let indptr = a.indptr();
    let indices = a.indices();
    for blk in 0..a.cols() / p {
        let first = blk * p;
        let pattern = &indices[indptr.outer_inds(first)];
        for col in first + 1..first + p {
            if &indices[indptr.outer_inds(col)] != pattern {
                return Err(LmmError::InvalidSparsityPattern(format!(
                    "column {} does not share the row pattern of column block {}",
                    col, blk
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triplet_duplicate_summing() {
        let mut builder = TripletBuilder::new(2, 2);
        builder.add(0, 0, 1.5);
        builder.add(0, 0, 2.5);
        let mat = builder.to_csc();
        assert_eq!(mat.nnz(), 1);
        assert_eq!(to_dense(&mat)[(0, 0)], 4.0);
    }

    #[test]
    fn test_spmv_and_transpose() {
        // 2x3 matrix: [[1, 0, 2], [0, 3, 0]]
        let mut builder = TripletBuilder::new(2, 3);
        builder.add(0, 0, 1.0);
        builder.add(0, 2, 2.0);
        builder.add(1, 1, 3.0);
        let mat = builder.to_csc();

        let mut out = vec![0.0; 2];
        spmv_into(&mat, &[1.0, 2.0, 3.0], &mut out);
        assert_eq!(out, vec![7.0, 6.0]);

        let mut acc = vec![1.0; 3];
        spmv_transpose_acc(&mat, &[1.0, 2.0], &mut acc);
        assert_eq!(acc, vec![2.0, 7.0, 3.0]);
    }

    #[test]
    fn test_csc_position_and_fill() {
        let mut builder = TripletBuilder::new(3, 2);
        builder.add(0, 0, 1.0);
        builder.add(2, 0, 2.0);
        builder.add(1, 1, 3.0);
        let mat = builder.to_csc();
        assert_eq!(csc_position(&mat, 2, 0), Some(1));
        assert_eq!(csc_position(&mat, 1, 1), Some(2));
        assert_eq!(csc_position(&mat, 1, 0), None);
        assert!((fill_ratio(&mat) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_check_row_runs() {
        let mut ok = TripletBuilder::new(4, 1);
        ok.add(2, 0, 1.0);
        ok.add(3, 0, 1.0);
        assert!(check_row_runs(&ok.to_csc(), 2).is_ok());
        assert!(matches!(
            check_row_runs(&ok.to_csc().to_csr(), 2),
            Err(LmmError::InvalidSparsityPattern(_))
        ));

        let mut bad = TripletBuilder::new(4, 1);
        bad.add(1, 0, 1.0);
        bad.add(2, 0, 1.0);
        assert!(matches!(
            check_row_runs(&bad.to_csc(), 2),
            Err(LmmError::InvalidSparsityPattern(_))
        ));
    }

    #[test]
    fn test_check_column_blocks() {
        let mut b = TripletBuilder::new(2, 2);
        b.add(0, 0, 1.0);
        b.add(0, 1, 1.0);
        assert!(check_column_blocks(&b.to_csc(), 2).is_ok());
        b.add(1, 1, 1.0);
        assert!(check_column_blocks(&b.to_csc(), 2).is_err());
        assert!(matches!(
            check_column_blocks(&b.to_csc(), 3),
            Err(LmmError::DimensionMismatch { .. })
        ));
    }
}
