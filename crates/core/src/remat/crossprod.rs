//! Cross products `A'B` of random-effects blocks.
//!
//! The storage of the result depends on the pair of block kinds:
//!
//! | A           | B           | same block | result                          |
//! |-------------|-------------|------------|---------------------------------|
//! | scalar      | scalar      | yes        | `Diagonal`                      |
//! | scalar      | scalar      | no         | `Sparse`                        |
//! | vector(S)   | vector(S)   | yes        | `UniformBlockDiagonal`          |
//! | scalar/vec  | scalar/vec  | no         | `BlockedSparse`, or `Dense` when more than a quarter full |
//! | any         | flexible    | -          | `Dense`                         |
//!
//! "Same block" means the same object, detected by address: the self
//! products only touch each observation's own level and are both cheaper
//! and exact.

use nalgebra::{DMatrix, DVector};

use crate::error::{LmmError, Result};
use crate::matrix::sparse::{csc_position, fill_ratio, require_csc, to_dense, TripletBuilder};
use crate::matrix::{BlockMatrix, BlockedSparse, UniformBlockDiagonal};
use crate::model::FeMat;
use crate::types::SparseMat;

use super::adjacency::adjacency_product;
use super::{scale_in_place, BlockKind, ReMat};

/// Fill ratio above which a two-block cross product is stored densely.
pub const DENSE_FILL_THRESHOLD: f64 = 0.25;

fn check_nobs(a: usize, b: usize) -> Result<()> {
    if a != b {
        return Err(LmmError::dim(a, b, "observations of cross-product operands"));
    }
    Ok(())
}

/// `A'B` with the storage chosen from the block kinds.
pub fn crossprod(a: &ReMat, b: &ReMat) -> Result<BlockMatrix> {
    check_nobs(a.nobs(), b.nobs())?;
    let same = std::ptr::eq(a, b);

    let out = match (a.kind(), b.kind()) {
        (BlockKind::Flexible, _) | (_, BlockKind::Flexible) => {
            BlockMatrix::Dense(to_dense(&adjacency_product(a.adj_a(), b.adj_a())?))
        }
        (BlockKind::Scalar, BlockKind::Scalar) if same => BlockMatrix::Diagonal(self_diagonal(a)),
        (BlockKind::Scalar, BlockKind::Scalar) => BlockMatrix::Sparse(scalar_pair(a, b)),
        (BlockKind::Vector(s), BlockKind::Vector(_)) if same => {
            let mut ubd = UniformBlockDiagonal::zeros(s, a.nlevs());
            accumulate_self_blocks(&mut ubd, 1.0, a);
            BlockMatrix::UniformBlockDiagonal(ubd)
        }
        _ => blocked_pair(a, b)?,
    };
    Ok(out)
}

/// Σ wtz² per level of a scalar block.
fn self_diagonal(a: &ReMat) -> DVector<f64> {
    let mut d = DVector::zeros(a.nlevs());
    for (&code, &w) in a.codes().iter().zip(a.wtz().iter()) {
        d[code] += w * w;
    }
    d
}

/// Level-by-level products of two different scalar blocks.
fn scalar_pair(a: &ReMat, b: &ReMat) -> SparseMat {
    let mut tri = TripletBuilder::with_capacity(a.nlevs(), b.nlevs(), a.nobs());
    let (wa, wb) = (a.wtz(), b.wtz());
    for (i, (&ca, &cb)) in a.codes().iter().zip(b.codes()).enumerate() {
        tri.add(ca, cb, wa[i] * wb[i]);
    }
    tri.to_csc()
}

/// `C[:, :, r] += α · w_j w_j'` for every observation `j` on level `r`.
fn accumulate_self_blocks(c: &mut UniformBlockDiagonal, alpha: f64, a: &ReMat) {
    let s = a.vsize();
    let ss = s * s;
    let data = c.data_mut();
    for (&r, w) in a.codes().iter().zip(a.wtz().column_iter()) {
        let blk = &mut data[r * ss..(r + 1) * ss];
        for i in 0..s {
            let zi = alpha * w[i];
            for k in 0..s {
                blk[k + i * s] += zi * w[k];
            }
        }
    }
}

fn blocked_pair(a: &ReMat, b: &ReMat) -> Result<BlockMatrix> {
    let cscmat = adjacency_product(a.adj_a(), b.adj_a())?;
    let fill = fill_ratio(&cscmat);
    if fill > DENSE_FILL_THRESHOLD {
        log::debug!(
            "cross product of '{}' and '{}' is {:.1}% full, storing dense",
            a.fname(),
            b.fname(),
            100.0 * fill
        );
        return Ok(BlockMatrix::Dense(to_dense(&cscmat)));
    }
    Ok(BlockMatrix::BlockedSparse(BlockedSparse::new(
        cscmat,
        a.vsize(),
        b.vsize(),
    )?))
}

/// `C := α·A'B + β·C` into an existing buffer.
///
/// `Diagonal` and `UniformBlockDiagonal` targets require `A` and `B` to be
/// the same block; sparse targets only accept contributions that land on
/// stored entries. The buffer is never resized.
pub fn crossprod_into(
    c: &mut BlockMatrix,
    alpha: f64,
    a: &ReMat,
    b: &ReMat,
    beta: f64,
) -> Result<()> {
    check_nobs(a.nobs(), b.nobs())?;
    let expected = (a.ncols(), b.ncols());
    if c.shape() != expected {
        return Err(LmmError::shape(expected, c.shape(), "cross-product output"));
    }
    let same = std::ptr::eq(a, b);

    match c {
        BlockMatrix::Diagonal(d) => {
            if !same || a.vsize() != 1 {
                return Err(LmmError::InvalidSparsityPattern(format!(
                    "cross product of '{}' and '{}' is not diagonal",
                    a.fname(),
                    b.fname()
                )));
            }
            scale_in_place(d.as_mut_slice(), beta);
            for (&code, &w) in a.codes().iter().zip(a.wtz().iter()) {
                d[code] += alpha * w * w;
            }
        }
        BlockMatrix::UniformBlockDiagonal(u) => {
            if !same || a.kind() == BlockKind::Flexible || u.block_size() != a.vsize() {
                return Err(LmmError::InvalidSparsityPattern(format!(
                    "cross product of '{}' and '{}' is not block diagonal with block size {}",
                    a.fname(),
                    b.fname(),
                    u.block_size()
                )));
            }
            scale_in_place(u.data_mut(), beta);
            accumulate_self_blocks(u, alpha, a);
        }
        BlockMatrix::Dense(m) => {
            scale_in_place(m.as_mut_slice(), beta);
            scatter_dense(m, alpha, a, b);
        }
        BlockMatrix::Sparse(sp) => scatter_sparse(sp, alpha, a, b, beta)?,
        BlockMatrix::BlockedSparse(bs) => {
            check_sparse_pattern(bs.cscmat(), a, b)?;
            scale_in_place(bs.values_mut(), beta);
            let (sa, sb) = (a.vsize(), b.vsize());
            let (wa, wb) = (a.wtz(), b.wtz());
            for (j, (&ca, &cb)) in a.codes().iter().zip(b.codes()).enumerate() {
                for l in 0..sb {
                    for k in 0..sa {
                        if let Some(pos) = csc_position(bs.cscmat(), ca * sa + k, cb * sb + l) {
                            bs.values_mut()[pos] += alpha * wa[(k, j)] * wb[(l, j)];
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn scatter_dense(c: &mut DMatrix<f64>, alpha: f64, a: &ReMat, b: &ReMat) {
    let (sa, sb) = (a.vsize(), b.vsize());
    let (wa, wb) = (a.wtz(), b.wtz());
    for (j, (&ca, &cb)) in a.codes().iter().zip(b.codes()).enumerate() {
        for l in 0..sb {
            let bl = alpha * wb[(l, j)];
            let col = cb * sb + l;
            for k in 0..sa {
                c[(ca * sa + k, col)] += bl * wa[(k, j)];
            }
        }
    }
}

/// Every contribution of `A'B` must have a stored slot in `c`.
fn check_sparse_pattern(c: &SparseMat, a: &ReMat, b: &ReMat) -> Result<()> {
    let (sa, sb) = (a.vsize(), b.vsize());
    for (&ca, &cb) in a.codes().iter().zip(b.codes()) {
        for l in 0..sb {
            for k in 0..sa {
                let (row, col) = (ca * sa + k, cb * sb + l);
                if csc_position(c, row, col).is_none() {
                    return Err(LmmError::InvalidSparsityPattern(format!(
                        "entry ({}, {}) of the cross product of '{}' and '{}' is not stored",
                        row,
                        col,
                        a.fname(),
                        b.fname()
                    )));
                }
            }
        }
    }
    Ok(())
}

fn scatter_sparse(c: &mut SparseMat, alpha: f64, a: &ReMat, b: &ReMat, beta: f64) -> Result<()> {
    require_csc(c, "cross-product output")?;
    check_sparse_pattern(c, a, b)?;
    scale_in_place(c.data_mut(), beta);
    let (sa, sb) = (a.vsize(), b.vsize());
    let (wa, wb) = (a.wtz(), b.wtz());
    for (j, (&ca, &cb)) in a.codes().iter().zip(b.codes()).enumerate() {
        for l in 0..sb {
            for k in 0..sa {
                if let Some(pos) = csc_position(c, ca * sa + k, cb * sb + l) {
                    c.data_mut()[pos] += alpha * wa[(k, j)] * wb[(l, j)];
                }
            }
        }
    }
    Ok(())
}

/// `C := α·X'Z + β·C` for a fixed-effects block `X` and a random-effects
/// block `Z`, with `C` of shape `p × S·L`.
///
/// Vector blocks accumulate one row of `C` at a time in the block's scratch
/// (`S × L`), so the scatter by level stays inside a small buffer.
pub fn fe_crossprod_into(
    c: &mut DMatrix<f64>,
    alpha: f64,
    x: &FeMat,
    re: &mut ReMat,
    beta: f64,
) -> Result<()> {
    check_nobs(x.nobs(), re.nobs())?;
    let expected = (x.ncols(), re.ncols());
    if c.shape() != expected {
        return Err(LmmError::shape(expected, c.shape(), "fixed-by-random cross-product output"));
    }
    scale_in_place(c.as_mut_slice(), beta);

    let xw = x.wtx();
    let p = x.ncols();
    let kind = re.kind();
    let ReMat {
        factor,
        z,
        wtz,
        scratch,
        ..
    } = re;
    let codes = factor.codes();
    let zw = wtz.resolve(z);

    match kind {
        BlockKind::Scalar | BlockKind::Flexible => {
            for (j, &r) in codes.iter().enumerate() {
                let azj = alpha * zw[j];
                for i in 0..p {
                    c[(i, r)] += azj * xw[(j, i)];
                }
            }
        }
        BlockKind::Vector(s) => {
            for i in 0..p {
                scratch.fill(0.0);
                for (k, &r) in codes.iter().enumerate() {
                    let aki = alpha * xw[(k, i)];
                    for ii in 0..s {
                        scratch[(ii, r)] += aki * zw[(ii, k)];
                    }
                }
                for (jj, &v) in scratch.as_slice().iter().enumerate() {
                    c[(i, jj)] += v;
                }
            }
        }
    }
    Ok(())
}
