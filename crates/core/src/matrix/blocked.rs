use nalgebra::DMatrix;

use crate::error::{LmmError, Result};
use crate::types::SparseMat;

use super::sparse::{check_column_blocks, check_row_runs, ensure_csc, to_dense};

/// `L` square blocks of identical size `s × s` along the diagonal.
///
/// Storage is one contiguous column-major array; block `k` occupies
/// `data[k*s*s .. (k+1)*s*s]`.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformBlockDiagonal {
    s: usize,
    nblocks: usize,
    data: Vec<f64>,
}

impl UniformBlockDiagonal {
    /// All-zero block-diagonal matrix with `nblocks` blocks of size `s × s`.
    pub fn zeros(s: usize, nblocks: usize) -> Self {
        Self {
            s,
            nblocks,
            data: vec![0.0; s * s * nblocks],
        }
    }

    /// Build from a column-major block array of length `s*s*nblocks`.
    pub fn from_data(s: usize, nblocks: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != s * s * nblocks {
            return Err(LmmError::dim(
                s * s * nblocks,
                data.len(),
                "UniformBlockDiagonal data",
            ));
        }
        Ok(Self { s, nblocks, data })
    }

    pub fn block_size(&self) -> usize {
        self.s
    }

    pub fn n_blocks(&self) -> usize {
        self.nblocks
    }

    /// Order of the full (square) matrix.
    pub fn dim(&self) -> usize {
        self.s * self.nblocks
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Column-major slice of block `k`.
    pub fn block(&self, k: usize) -> &[f64] {
        let ss = self.s * self.s;
        &self.data[k * ss..(k + 1) * ss]
    }

    pub fn blocks_mut(&mut self) -> std::slice::ChunksExactMut<'_, f64> {
        let ss = (self.s * self.s).max(1);
        self.data.chunks_exact_mut(ss)
    }

    pub fn to_dense(&self) -> DMatrix<f64> {
        let s = self.s;
        let mut out = DMatrix::zeros(self.dim(), self.dim());
        for k in 0..self.nblocks {
            let blk = self.block(k);
            let off = k * s;
            for j in 0..s {
                for i in 0..s {
                    out[(off + i, off + j)] = blk[i + j * s];
                }
            }
        }
        out
    }
}

/// A CSC matrix whose rows come in aligned runs of `s` and whose columns come
/// in blocks of `p` sharing one row pattern.
///
/// The value array can therefore be viewed two ways without touching the
/// structure: as `s`-long row panels (for left scaling) and, per column
/// block, as an `m × p` column-major panel starting at `colblkptr[j]` (for
/// right scaling).
#[derive(Debug, Clone)]
pub struct BlockedSparse {
    cscmat: SparseMat,
    s: usize,
    p: usize,
    colblkptr: Vec<usize>,
}

impl BlockedSparse {
    /// Wrap a sparse matrix, converted to CSC if needed, checking that its
    /// structure is blocked by `s` rows and `p` columns.
    pub fn new(cscmat: SparseMat, s: usize, p: usize) -> Result<Self> {
        let cscmat = ensure_csc(cscmat);
        if s == 0 || p == 0 || cscmat.rows() % s != 0 {
            return Err(LmmError::dim(
                cscmat.rows().div_ceil(s.max(1)) * s.max(1),
                cscmat.rows(),
                "row count of BlockedSparse must be a multiple of the row block size",
            ));
        }
        check_row_runs(&cscmat, s)?;
        check_column_blocks(&cscmat, p)?;
        let indptr = cscmat.indptr();
        let colblkptr = (0..=cscmat.cols() / p)
            .map(|j| {
                if j * p == cscmat.cols() {
                    cscmat.nnz()
                } else {
                    indptr.outer_inds(j * p).start
                }
            })
            .collect();
        Ok(Self {
            cscmat,
            s,
            p,
            colblkptr,
        })
    }

    pub fn rows(&self) -> usize {
        self.cscmat.rows()
    }

    pub fn cols(&self) -> usize {
        self.cscmat.cols()
    }

    pub fn nnz(&self) -> usize {
        self.cscmat.nnz()
    }

    pub fn row_block_size(&self) -> usize {
        self.s
    }

    pub fn col_block_size(&self) -> usize {
        self.p
    }

    /// Offsets into the value array where each column block starts, with a
    /// final entry equal to `nnz`.
    pub fn colblkptr(&self) -> &[usize] {
        &self.colblkptr
    }

    pub fn cscmat(&self) -> &SparseMat {
        &self.cscmat
    }

    pub fn values(&self) -> &[f64] {
        self.cscmat.data()
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        self.cscmat.data_mut()
    }

    pub fn into_cscmat(self) -> SparseMat {
        self.cscmat
    }

    pub fn to_dense(&self) -> DMatrix<f64> {
        to_dense(&self.cscmat)
    }
}
