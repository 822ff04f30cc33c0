//! The sparse "adjoint design" of a random-effects block.
//!
//! For a block with `s` columns per level and `nlevels` levels, the adjoint
//! design is the `s*nlevels × n` CSC matrix whose column `i` holds the `s`
//! weighted design values of observation `i` at rows
//! `code_i*s .. code_i*s + s`. Every column has exactly `s` stored entries,
//! so the value array is the column-major weighted design itself.

use nalgebra::DMatrix;
use sprs::CsMat;

use crate::error::{LmmError, Result};
use crate::matrix::sparse::TripletBuilder;
use crate::types::SparseMat;

/// Build the adjoint design from level codes (0-based) and the `s × n`
/// weighted design.
pub fn adjacency(codes: &[usize], wtz: &DMatrix<f64>, nlevels: usize) -> Result<SparseMat> {
    let s = wtz.nrows();
    let n = wtz.ncols();
    if codes.len() != n {
        return Err(LmmError::dim(n, codes.len(), "level references vs design columns"));
    }
    if let Some((index, &code)) = codes.iter().enumerate().find(|(_, &c)| c >= nlevels) {
        return Err(LmmError::InvalidLevelRef {
            index,
            value: code + 1,
            nlevels,
        });
    }

    let indptr: Vec<usize> = (0..=n).map(|i| i * s).collect();
    let mut indices = Vec::with_capacity(n * s);
    for &code in codes {
        indices.extend(code * s..code * s + s);
    }
    let data = wtz.as_slice().to_vec();

    Ok(CsMat::new_csc((s * nlevels, n), indptr, indices, data))
}

/// `A · B'` for two adjoint designs over the same observations: the
/// cross product `Z_A' Z_B` of the underlying random-effects matrices.
///
/// Column `i` of each operand contributes the outer product of its stored
/// entries; duplicates are summed. Entries are structural: a level pair
/// that co-occurs is stored even if its value cancels to zero.
pub fn adjacency_product(a: &SparseMat, b: &SparseMat) -> Result<SparseMat> {
    if a.cols() != b.cols() {
        return Err(LmmError::dim(a.cols(), b.cols(), "observation count of cross product"));
    }
    let per_col_a = if a.cols() == 0 { 0 } else { a.nnz() / a.cols() };
    let per_col_b = if b.cols() == 0 { 0 } else { b.nnz() / b.cols() };
    let mut tri = TripletBuilder::with_capacity(a.rows(), b.rows(), a.cols() * per_col_a * per_col_b);

    for (col_a, col_b) in a.outer_iterator().zip(b.outer_iterator()) {
        for (ra, &va) in col_a.iter() {
            for (rb, &vb) in col_b.iter() {
                tri.add(ra, rb, va * vb);
            }
        }
    }
    Ok(tri.to_csc())
}
