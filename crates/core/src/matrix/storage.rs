use nalgebra::{DMatrix, DVector};

use crate::types::SparseMat;

use super::blocked::{BlockedSparse, UniformBlockDiagonal};
use super::sparse::to_dense;

/// A block of the normal equations, in whichever storage kind the cross
/// product or factor preparation selected for it.
#[derive(Debug, Clone)]
pub enum BlockMatrix {
    Dense(DMatrix<f64>),
    Diagonal(DVector<f64>),
    UniformBlockDiagonal(UniformBlockDiagonal),
    Sparse(SparseMat),
    BlockedSparse(BlockedSparse),
}

impl BlockMatrix {
    pub fn nrows(&self) -> usize {
        match self {
            BlockMatrix::Dense(m) => m.nrows(),
            BlockMatrix::Diagonal(d) => d.len(),
            BlockMatrix::UniformBlockDiagonal(b) => b.dim(),
            BlockMatrix::Sparse(s) => s.rows(),
            BlockMatrix::BlockedSparse(b) => b.rows(),
        }
    }

    pub fn ncols(&self) -> usize {
        match self {
            BlockMatrix::Dense(m) => m.ncols(),
            BlockMatrix::Diagonal(d) => d.len(),
            BlockMatrix::UniformBlockDiagonal(b) => b.dim(),
            BlockMatrix::Sparse(s) => s.cols(),
            BlockMatrix::BlockedSparse(b) => b.cols(),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows(), self.ncols())
    }

    /// Short name of the storage kind, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            BlockMatrix::Dense(_) => "Dense",
            BlockMatrix::Diagonal(_) => "Diagonal",
            BlockMatrix::UniformBlockDiagonal(_) => "UniformBlockDiagonal",
            BlockMatrix::Sparse(_) => "Sparse",
            BlockMatrix::BlockedSparse(_) => "BlockedSparse",
        }
    }

    pub fn to_dense(&self) -> DMatrix<f64> {
        match self {
            BlockMatrix::Dense(m) => m.clone(),
            BlockMatrix::Diagonal(d) => DMatrix::from_diagonal(d),
            BlockMatrix::UniformBlockDiagonal(b) => b.to_dense(),
            BlockMatrix::Sparse(s) => to_dense(s),
            BlockMatrix::BlockedSparse(b) => b.to_dense(),
        }
    }
}
