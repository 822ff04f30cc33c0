//! In-place triangular kernels on column-major slices.
//!
//! These are the per-panel building blocks of the λ scaling operators. They
//! never allocate: a panel is a contiguous column-major window of a larger
//! value array (a dense matrix, a block of a block-diagonal matrix, or a run
//! of stored nonzeros of a sparse matrix).

use nalgebra::DMatrix;

/// `x := L' x` for lower-triangular `L` (k×k) and `x` of length k.
///
/// Row `i` of `L'x` only reads `x[i..]`, so rows are overwritten in
/// ascending order.
pub fn lower_t_mul_vec(l: &DMatrix<f64>, x: &mut [f64]) {
    let k = l.nrows();
    debug_assert_eq!(x.len(), k);
    for i in 0..k {
        let mut sum = 0.0;
        for m in i..k {
            sum += l[(m, i)] * x[m];
        }
        x[i] = sum;
    }
}

/// `x := L x` for lower-triangular `L`. Rows are overwritten in descending
/// order since row `i` reads `x[..=i]`.
pub fn lower_mul_vec(l: &DMatrix<f64>, x: &mut [f64]) {
    let k = l.nrows();
    debug_assert_eq!(x.len(), k);
    for i in (0..k).rev() {
        let mut sum = 0.0;
        for m in 0..=i {
            sum += l[(i, m)] * x[m];
        }
        x[i] = sum;
    }
}

/// `P := P L` where `P` is an `m × k` column-major panel and `L` is k×k
/// lower-triangular.
pub fn panel_mul_lower(panel: &mut [f64], m: usize, l: &DMatrix<f64>) {
    let k = l.nrows();
    debug_assert_eq!(panel.len(), m * k);
    for r in 0..m {
        for j in 0..k {
            let mut sum = 0.0;
            for c in j..k {
                sum += panel[r + c * m] * l[(c, j)];
            }
            panel[r + j * m] = sum;
        }
    }
}

/// `P := P D` for a diagonal `D` given by its entries.
pub fn panel_mul_diag(panel: &mut [f64], m: usize, d: &[f64]) {
    debug_assert_eq!(panel.len(), m * d.len());
    for (col, &dj) in panel.chunks_exact_mut(m).zip(d) {
        col.iter_mut().for_each(|v| *v *= dj);
    }
}

/// `x := D x` elementwise.
pub fn diag_mul_vec(d: &[f64], x: &mut [f64]) {
    debug_assert_eq!(x.len(), d.len());
    x.iter_mut().zip(d).for_each(|(v, &dj)| *v *= dj);
}

/// Add 1 to each diagonal entry of a k×k column-major block.
pub fn inflate_diagonal(block: &mut [f64], k: usize) {
    debug_assert_eq!(block.len(), k * k);
    for i in 0..k {
        block[i * (k + 1)] += 1.0;
    }
}
