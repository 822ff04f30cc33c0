//! Preparation of normal-equation blocks for factorization.
//!
//! The diagonal block of a grouping factor becomes `Λ'·A·Λ + I` and an
//! off-diagonal block becomes `Λi'·A·Λj`. Both are written into a caller
//! owned target whose storage kind is kept, so a diagonal cross product
//! stays diagonal for the downstream factorization.

use crate::error::{LmmError, Result};
use crate::matrix::dense::inflate_diagonal;
use crate::matrix::sparse::{check_column_blocks, check_row_runs};
use crate::matrix::BlockMatrix;
use crate::types::SparseMat;

use super::scaling::{lmul_lambda_t, rmul_lambda};
use super::{BlockKind, ReMat};

/// Which side of the target a block's factor multiplies.
#[derive(Clone, Copy, PartialEq)]
enum Side {
    Left,
    Right,
}

/// Reject targets the scaling kernels cannot write without changing their
/// structure, before anything is copied into them.
fn check_scalable(target: &BlockMatrix, re: &ReMat, side: Side) -> Result<()> {
    let ok = match (re.kind(), target) {
        (BlockKind::Scalar, _) | (_, BlockMatrix::Dense(_)) => true,
        (_, BlockMatrix::Diagonal(_)) => re.lambda().is_diagonal(),
        (BlockKind::Vector(s), BlockMatrix::UniformBlockDiagonal(u)) => u.block_size() == s,
        (BlockKind::Vector(s), BlockMatrix::BlockedSparse(bs)) => match side {
            Side::Left => bs.row_block_size() == s,
            Side::Right => bs.col_block_size() == s,
        },
        (BlockKind::Vector(s), BlockMatrix::Sparse(sp)) => {
            match side {
                Side::Left => check_row_runs(sp, s)?,
                Side::Right => check_column_blocks(sp, s)?,
            }
            true
        }
        (BlockKind::Flexible, _) => false,
    };
    if ok {
        Ok(())
    } else {
        Err(LmmError::InvalidSparsityPattern(format!(
            "covariance factor of '{}' cannot be applied to {} storage",
            re.fname(),
            target.kind_name()
        )))
    }
}

fn same_structure(a: &SparseMat, b: &SparseMat) -> bool {
    a.is_csc() == b.is_csc()
        && a.shape() == b.shape()
        && a.indptr().raw_storage() == b.indptr().raw_storage()
        && a.indices() == b.indices()
}

/// Overwrite `dst` with the values of `src`, keeping the storage of `dst`.
fn copy_into(dst: &mut BlockMatrix, src: &BlockMatrix) -> Result<()> {
    match (dst, src) {
        (BlockMatrix::Dense(l), BlockMatrix::Dense(a)) => l.copy_from(a),
        (BlockMatrix::Dense(l), BlockMatrix::Diagonal(a)) => {
            l.fill(0.0);
            l.set_diagonal(a);
        }
        (BlockMatrix::Dense(l), BlockMatrix::UniformBlockDiagonal(a)) => {
            let s = a.block_size();
            l.fill(0.0);
            for k in 0..a.n_blocks() {
                let blk = a.block(k);
                for j in 0..s {
                    for i in 0..s {
                        l[(k * s + i, k * s + j)] = blk[i + j * s];
                    }
                }
            }
        }
        (BlockMatrix::Dense(l), BlockMatrix::Sparse(a)) => {
            l.fill(0.0);
            for (&v, (i, j)) in a.iter() {
                l[(i, j)] += v;
            }
        }
        (BlockMatrix::Dense(l), BlockMatrix::BlockedSparse(a)) => {
            l.fill(0.0);
            for (&v, (i, j)) in a.cscmat().iter() {
                l[(i, j)] += v;
            }
        }
        (BlockMatrix::Diagonal(l), BlockMatrix::Diagonal(a)) => l.copy_from(a),
        (BlockMatrix::UniformBlockDiagonal(l), BlockMatrix::UniformBlockDiagonal(a))
            if l.block_size() == a.block_size() =>
        {
            l.data_mut().copy_from_slice(a.data());
        }
        (BlockMatrix::Sparse(l), BlockMatrix::Sparse(a)) if same_structure(l, a) => {
            l.data_mut().copy_from_slice(a.data());
        }
        (BlockMatrix::BlockedSparse(l), BlockMatrix::BlockedSparse(a))
            if same_structure(l.cscmat(), a.cscmat()) =>
        {
            l.values_mut().copy_from_slice(a.values());
        }
        (dst, src) => {
            return Err(LmmError::InvalidSparsityPattern(format!(
                "cannot copy {} storage into {} storage",
                src.kind_name(),
                dst.kind_name()
            )))
        }
    }
    Ok(())
}

/// `Ljj := Λ'·Ajj·Λ + I`.
///
/// Supported (target ← source) pairs are Diagonal ← Diagonal,
/// Dense ← Diagonal, UniformBlockDiagonal ← UniformBlockDiagonal,
/// Dense ← UniformBlockDiagonal and Dense ← Dense. `Ajj` is only read, so
/// repeated calls with the same `Ajj` give the same `Ljj`.
pub fn copy_scale_inflate(ljj: &mut BlockMatrix, ajj: &BlockMatrix, re: &ReMat) -> Result<()> {
    let q = re.ncols();
    if ajj.shape() != (q, q) {
        return Err(LmmError::shape((q, q), ajj.shape(), "diagonal block of the normal equations"));
    }
    if ljj.shape() != (q, q) {
        return Err(LmmError::shape((q, q), ljj.shape(), "prepared diagonal block"));
    }
    let supported = matches!(
        (&*ljj, ajj),
        (BlockMatrix::Diagonal(_), BlockMatrix::Diagonal(_))
            | (BlockMatrix::Dense(_), BlockMatrix::Diagonal(_))
            | (BlockMatrix::UniformBlockDiagonal(_), BlockMatrix::UniformBlockDiagonal(_))
            | (BlockMatrix::Dense(_), BlockMatrix::UniformBlockDiagonal(_))
            | (BlockMatrix::Dense(_), BlockMatrix::Dense(_))
    );
    if !supported {
        return Err(LmmError::InvalidSparsityPattern(format!(
            "cannot prepare a {} block from a {} cross product",
            ljj.kind_name(),
            ajj.kind_name()
        )));
    }
    check_scalable(ljj, re, Side::Left)?;

    copy_into(ljj, ajj)?;
    rmul_lambda(ljj, re)?;
    lmul_lambda_t(re, ljj)?;

    match ljj {
        BlockMatrix::Diagonal(d) => d.iter_mut().for_each(|v| *v += 1.0),
        BlockMatrix::Dense(m) => {
            for i in 0..q {
                m[(i, i)] += 1.0;
            }
        }
        BlockMatrix::UniformBlockDiagonal(u) => {
            let s = u.block_size();
            u.blocks_mut().for_each(|blk| inflate_diagonal(blk, s));
        }
        BlockMatrix::Sparse(_) | BlockMatrix::BlockedSparse(_) => {}
    }
    Ok(())
}

/// `Lij := Λi'·Aij·Λj` for an off-diagonal block.
///
/// Sparse targets must share the stored structure of `Aij`; a dense target
/// accepts any source.
pub fn copy_scale(
    lij: &mut BlockMatrix,
    aij: &BlockMatrix,
    re_i: &ReMat,
    re_j: &ReMat,
) -> Result<()> {
    let expected = (re_i.ncols(), re_j.ncols());
    if aij.shape() != expected {
        return Err(LmmError::shape(expected, aij.shape(), "off-diagonal block of the normal equations"));
    }
    if lij.shape() != expected {
        return Err(LmmError::shape(expected, lij.shape(), "prepared off-diagonal block"));
    }
    check_scalable(lij, re_i, Side::Left)?;
    check_scalable(lij, re_j, Side::Right)?;

    copy_into(lij, aij)?;
    rmul_lambda(lij, re_j)?;
    lmul_lambda_t(re_i, lij)
}
