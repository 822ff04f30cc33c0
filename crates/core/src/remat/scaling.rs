//! In-place multiplication by a block's covariance factor.
//!
//! `Λ` is the block-diagonal matrix with one copy of λ per level (for
//! flexible blocks `Λ = λ`). Left multiplication by `Λ'` acts on `S`-row
//! panels of the target, right multiplication by `Λ` on `S`-column panels.
//! Sparse targets are scaled through their value arrays; the stored
//! structure is never changed, so a target whose structure cannot hold the
//! product is rejected.

use crate::error::{LmmError, Result};
use crate::matrix::sparse::{check_column_blocks, check_row_runs};
use crate::matrix::BlockMatrix;

use super::{BlockKind, Lambda, ReMat};

fn only(lambda: &Lambda) -> f64 {
    lambda.get(0, 0)
}

fn scale_values(values: &mut [f64], c: f64) {
    values.iter_mut().for_each(|v| *v *= c);
}

fn pattern_error(op: &str, target: &BlockMatrix, re: &ReMat) -> LmmError {
    LmmError::InvalidSparsityPattern(format!(
        "{} by the covariance factor of '{}' cannot be stored in {} storage",
        op,
        re.fname(),
        target.kind_name()
    ))
}

/// `B := Λ' B` in place.
pub fn lmul_lambda_t(re: &ReMat, b: &mut BlockMatrix) -> Result<()> {
    let q = re.ncols();
    if b.nrows() != q {
        return Err(LmmError::dim(q, b.nrows(), format!("rows of target scaled by Λ' of '{}'", re.fname())));
    }
    let lambda = re.lambda();
    let s = re.vsize();

    match (re.kind(), b) {
        (BlockKind::Scalar, BlockMatrix::Dense(m)) => scale_values(m.as_mut_slice(), only(lambda)),
        (BlockKind::Scalar, BlockMatrix::Diagonal(d)) => scale_values(d.as_mut_slice(), only(lambda)),
        (BlockKind::Scalar, BlockMatrix::Sparse(sp)) => scale_values(sp.data_mut(), only(lambda)),
        (BlockKind::Scalar, BlockMatrix::BlockedSparse(bs)) => {
            scale_values(bs.values_mut(), only(lambda))
        }
        (BlockKind::Scalar, BlockMatrix::UniformBlockDiagonal(u)) => {
            scale_values(u.data_mut(), only(lambda))
        }

        (BlockKind::Vector(_), BlockMatrix::Dense(m)) => {
            m.as_mut_slice()
                .chunks_exact_mut(s)
                .for_each(|panel| lambda.lmul_t_vec(panel));
        }
        (BlockKind::Vector(_), BlockMatrix::UniformBlockDiagonal(u)) => {
            if u.block_size() != s {
                return Err(LmmError::dim(s, u.block_size(), "block size of UniformBlockDiagonal"));
            }
            u.data_mut()
                .chunks_exact_mut(s)
                .for_each(|panel| lambda.lmul_t_vec(panel));
        }
        (BlockKind::Vector(_), BlockMatrix::Sparse(sp)) => {
            check_row_runs(sp, s)?;
            sp.data_mut()
                .chunks_exact_mut(s)
                .for_each(|panel| lambda.lmul_t_vec(panel));
        }
        (BlockKind::Vector(_), BlockMatrix::BlockedSparse(bs)) => {
            if bs.row_block_size() != s {
                return Err(LmmError::dim(s, bs.row_block_size(), "row block size of BlockedSparse"));
            }
            bs.values_mut()
                .chunks_exact_mut(s)
                .for_each(|panel| lambda.lmul_t_vec(panel));
        }
        (BlockKind::Vector(_), BlockMatrix::Diagonal(d)) if lambda.is_diagonal() => {
            for (i, v) in d.iter_mut().enumerate() {
                *v *= lambda.get(i % s, i % s);
            }
        }

        (BlockKind::Flexible, BlockMatrix::Dense(m)) => {
            let rows = m.nrows();
            if rows > 0 {
                m.as_mut_slice()
                    .chunks_exact_mut(rows)
                    .for_each(|col| lambda.lmul_t_vec(col));
            }
        }
        (BlockKind::Flexible, BlockMatrix::Diagonal(d)) if lambda.is_diagonal() => {
            for (i, v) in d.iter_mut().enumerate() {
                *v *= lambda.get(i, i);
            }
        }

        (_, target) => return Err(pattern_error("left multiplication", target, re)),
    }
    Ok(())
}

/// `A := A Λ` in place.
pub fn rmul_lambda(a: &mut BlockMatrix, re: &ReMat) -> Result<()> {
    let q = re.ncols();
    if a.ncols() != q {
        return Err(LmmError::dim(q, a.ncols(), format!("columns of target scaled by Λ of '{}'", re.fname())));
    }
    let lambda = re.lambda();
    let s = re.vsize();

    match (re.kind(), a) {
        (BlockKind::Scalar, BlockMatrix::Dense(m)) => scale_values(m.as_mut_slice(), only(lambda)),
        (BlockKind::Scalar, BlockMatrix::Diagonal(d)) => scale_values(d.as_mut_slice(), only(lambda)),
        (BlockKind::Scalar, BlockMatrix::Sparse(sp)) => scale_values(sp.data_mut(), only(lambda)),
        (BlockKind::Scalar, BlockMatrix::BlockedSparse(bs)) => {
            scale_values(bs.values_mut(), only(lambda))
        }
        (BlockKind::Scalar, BlockMatrix::UniformBlockDiagonal(u)) => {
            scale_values(u.data_mut(), only(lambda))
        }

        (BlockKind::Vector(_), BlockMatrix::Dense(m)) => {
            let rows = m.nrows();
            if rows > 0 {
                m.as_mut_slice()
                    .chunks_exact_mut(rows * s)
                    .for_each(|panel| lambda.rmul_panel(panel, rows));
            }
        }
        (BlockKind::Vector(_), BlockMatrix::UniformBlockDiagonal(u)) => {
            if u.block_size() != s {
                return Err(LmmError::dim(s, u.block_size(), "block size of UniformBlockDiagonal"));
            }
            u.blocks_mut().for_each(|blk| lambda.rmul_panel(blk, s));
        }
        (BlockKind::Vector(_), BlockMatrix::Sparse(sp)) => {
            check_column_blocks(sp, s)?;
            for blk in 0..sp.cols() / s {
                let start = sp.indptr().outer_inds(blk * s).start;
                let end = sp.indptr().outer_inds(blk * s + s - 1).end;
                let m = (end - start) / s;
                lambda.rmul_panel(&mut sp.data_mut()[start..end], m);
            }
        }
        (BlockKind::Vector(_), BlockMatrix::BlockedSparse(bs)) => {
            if bs.col_block_size() != s {
                return Err(LmmError::dim(s, bs.col_block_size(), "column block size of BlockedSparse"));
            }
            for blk in 0..bs.colblkptr().len().saturating_sub(1) {
                let start = bs.colblkptr()[blk];
                let end = bs.colblkptr()[blk + 1];
                let m = (end - start) / s;
                lambda.rmul_panel(&mut bs.values_mut()[start..end], m);
            }
        }
        (BlockKind::Vector(_), BlockMatrix::Diagonal(d)) if lambda.is_diagonal() => {
            for (i, v) in d.iter_mut().enumerate() {
                *v *= lambda.get(i % s, i % s);
            }
        }

        (BlockKind::Flexible, BlockMatrix::Dense(m)) => {
            let rows = m.nrows();
            lambda.rmul_panel(m.as_mut_slice(), rows);
        }
        (BlockKind::Flexible, BlockMatrix::Diagonal(d)) if lambda.is_diagonal() => {
            for (i, v) in d.iter_mut().enumerate() {
                *v *= lambda.get(i, i);
            }
        }

        (_, target) => return Err(pattern_error("right multiplication", target, re)),
    }
    Ok(())
}

/// `u := Λ u`: maps spherical random effects to the natural scale.
pub fn lmul_lambda(re: &ReMat, u: &mut [f64]) -> Result<()> {
    if u.len() != re.ncols() {
        return Err(LmmError::dim(re.ncols(), u.len(), "random-effects vector"));
    }
    match re.kind() {
        BlockKind::Flexible => re.lambda().lmul_vec(u),
        BlockKind::Scalar | BlockKind::Vector(_) => u
            .chunks_exact_mut(re.vsize())
            .for_each(|panel| re.lambda().lmul_vec(panel)),
    }
    Ok(())
}
