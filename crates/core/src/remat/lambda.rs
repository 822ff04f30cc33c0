use nalgebra::{DMatrix, DVector};

use crate::matrix::dense::{
    diag_mul_vec, lower_mul_vec, lower_t_mul_vec, panel_mul_diag, panel_mul_lower,
};

/// Relative covariance factor λ of a random-effects term.
///
/// `λ λ'` times the residual variance is the covariance of one group's
/// random effects. Fixed-shape blocks carry a `Diagonal` or
/// `LowerTriangular` S×S factor; flexible blocks carry a `Full` L×L factor
/// acting across levels.
#[derive(Debug, Clone, PartialEq)]
pub enum Lambda {
    Diagonal(DVector<f64>),
    LowerTriangular(DMatrix<f64>),
    Full(DMatrix<f64>),
}

impl Lambda {
    pub fn identity_diagonal(k: usize) -> Self {
        Lambda::Diagonal(DVector::from_element(k, 1.0))
    }

    pub fn identity_lower(k: usize) -> Self {
        Lambda::LowerTriangular(DMatrix::identity(k, k))
    }

    /// Order of the (square) factor.
    pub fn dim(&self) -> usize {
        match self {
            Lambda::Diagonal(d) => d.len(),
            Lambda::LowerTriangular(m) | Lambda::Full(m) => m.nrows(),
        }
    }

    pub fn is_diagonal(&self) -> bool {
        matches!(self, Lambda::Diagonal(_))
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        match self {
            Lambda::Diagonal(d) => {
                if i == j {
                    d[i]
                } else {
                    0.0
                }
            }
            Lambda::LowerTriangular(m) | Lambda::Full(m) => m[(i, j)],
        }
    }

    /// Entry at a column-major linear index.
    pub fn get_linear(&self, k: usize) -> f64 {
        let n = self.dim();
        self.get(k % n, k / n)
    }

    /// Overwrite the entry at a column-major linear index. The index must be
    /// a structurally free position (diagonal for `Diagonal`, lower triangle
    /// for `LowerTriangular`).
    pub(crate) fn set_linear(&mut self, k: usize, value: f64) {
        let n = self.dim();
        let (i, j) = (k % n, k / n);
        match self {
            Lambda::Diagonal(d) => {
                debug_assert_eq!(i, j);
                d[i] = value;
            }
            Lambda::LowerTriangular(m) => {
                debug_assert!(i >= j);
                m[(i, j)] = value;
            }
            Lambda::Full(m) => m[(i, j)] = value,
        }
    }

    /// Whether the column-major position `k` can hold a nonzero in this
    /// storage kind.
    pub fn is_structural(&self, k: usize) -> bool {
        let n = self.dim();
        let (i, j) = (k % n, k / n);
        match self {
            Lambda::Diagonal(_) => i == j,
            Lambda::LowerTriangular(_) => i >= j,
            Lambda::Full(_) => true,
        }
    }

    /// `x := λ' x`. Allocates only for `Full`.
    pub fn lmul_t_vec(&self, x: &mut [f64]) {
        match self {
            Lambda::Diagonal(d) => diag_mul_vec(d.as_slice(), x),
            Lambda::LowerTriangular(m) => lower_t_mul_vec(m, x),
            Lambda::Full(m) => {
                let y = m.tr_mul(&DVector::from_column_slice(x));
                x.copy_from_slice(y.as_slice());
            }
        }
    }

    /// `x := λ x`. Allocates only for `Full`.
    pub fn lmul_vec(&self, x: &mut [f64]) {
        match self {
            Lambda::Diagonal(d) => diag_mul_vec(d.as_slice(), x),
            Lambda::LowerTriangular(m) => lower_mul_vec(m, x),
            Lambda::Full(m) => {
                let y = m * DVector::from_column_slice(x);
                x.copy_from_slice(y.as_slice());
            }
        }
    }

    /// `P := P λ` for an `m × k` column-major panel. Allocates only for `Full`.
    pub fn rmul_panel(&self, panel: &mut [f64], m: usize) {
        match self {
            Lambda::Diagonal(d) => panel_mul_diag(panel, m, d.as_slice()),
            Lambda::LowerTriangular(l) => panel_mul_lower(panel, m, l),
            Lambda::Full(l) => {
                let p = DMatrix::from_column_slice(m, l.nrows(), panel) * l;
                panel.copy_from_slice(p.as_slice());
            }
        }
    }

    /// Dense copy of the factor.
    pub fn to_dense(&self) -> DMatrix<f64> {
        match self {
            Lambda::Diagonal(d) => DMatrix::from_diagonal(d),
            Lambda::LowerTriangular(m) | Lambda::Full(m) => m.clone(),
        }
    }

    /// Diagonal projection: keep the diagonal, drop everything else.
    pub fn diagonal_projection(&self) -> Lambda {
        match self {
            Lambda::Diagonal(d) => Lambda::Diagonal(d.clone()),
            Lambda::LowerTriangular(m) | Lambda::Full(m) => Lambda::Diagonal(m.diagonal()),
        }
    }

    /// Euclidean norm of row `i` restricted to the structural part.
    pub fn row_norm(&self, i: usize) -> f64 {
        match self {
            Lambda::Diagonal(d) => d[i].abs(),
            Lambda::LowerTriangular(m) => (0..=i).map(|j| m[(i, j)].powi(2)).sum::<f64>().sqrt(),
            Lambda::Full(m) => m.row(i).norm(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_indexing_is_column_major() {
        let l = Lambda::LowerTriangular(DMatrix::from_row_slice(
            2,
            2,
            &[1.0, 0.0, 0.5, 2.0],
        ));
        assert_eq!(l.get_linear(0), 1.0);
        assert_eq!(l.get_linear(1), 0.5);
        assert_eq!(l.get_linear(2), 0.0);
        assert_eq!(l.get_linear(3), 2.0);
        assert!(l.is_structural(1));
        assert!(!l.is_structural(2));
    }

    #[test]
    fn test_set_linear_diagonal() {
        let mut l = Lambda::identity_diagonal(3);
        l.set_linear(4, 7.0);
        assert_eq!(l.get(1, 1), 7.0);
        assert!(!l.is_structural(1));
    }

    #[test]
    fn test_vector_ops_agree_across_kinds() {
        let m = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 1.0, 3.0]);
        let lower = Lambda::LowerTriangular(m.clone());
        let full = Lambda::Full(m);

        let mut a = vec![1.0, -1.0];
        let mut b = a.clone();
        lower.lmul_t_vec(&mut a);
        full.lmul_t_vec(&mut b);
        assert_eq!(a, b);
        assert_eq!(a, vec![1.0, -3.0]);

        let mut a = vec![1.0, -1.0];
        let mut b = a.clone();
        lower.lmul_vec(&mut a);
        full.lmul_vec(&mut b);
        assert_eq!(a, b);
        assert_eq!(a, vec![2.0, -2.0]);

        let mut p = vec![1.0, 2.0, 3.0, 4.0];
        let mut q = p.clone();
        lower.rmul_panel(&mut p, 2);
        full.rmul_panel(&mut q, 2);
        for (x, y) in p.iter().zip(&q) {
            assert_relative_eq!(*x, *y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_row_norm_and_projection() {
        let l = Lambda::LowerTriangular(DMatrix::from_row_slice(
            2,
            2,
            &[1.0, 0.0, 3.0, 4.0],
        ));
        assert_relative_eq!(l.row_norm(1), 5.0, epsilon = 1e-12);
        let d = l.diagonal_projection();
        assert!(d.is_diagonal());
        assert_eq!(d.get(1, 1), 4.0);
        assert_eq!(d.get(1, 0), 0.0);
    }
}
