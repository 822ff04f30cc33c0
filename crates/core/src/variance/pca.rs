use nalgebra::DMatrix;
use serde::Serialize;

use crate::error::{LmmError, Result};
use crate::remat::ReMat;

use super::components::reported_rows;

/// Principal components of a block's random-effects covariance `λλ'`.
///
/// Computed from the singular value decomposition of λ itself, which avoids
/// forming `λλ'`: the squared singular values are the component variances
/// and the left singular vectors the loadings.
#[derive(Debug, Clone, Serialize)]
pub struct Pca {
    pub group: String,
    /// Names of the random effects (rows of the loadings).
    pub names: Vec<String>,
    /// Component variances in decreasing order.
    pub variances: Vec<f64>,
    /// One column per component, in the order of `variances`.
    pub loadings: DMatrix<f64>,
    /// Whether the rows of λ were normalized first (correlation scale).
    pub corr: bool,
}

impl Pca {
    pub fn from_remat(re: &ReMat, corr: bool) -> Result<Self> {
        let (rows, names): (Vec<usize>, Vec<String>) = reported_rows(re).into_iter().unzip();
        let mut lam = re.lambda().to_dense().select_rows(rows.iter());
        if corr {
            for (mut row, &i) in lam.row_iter_mut().zip(&rows) {
                let norm = re.lambda().row_norm(i);
                if norm > 0.0 {
                    row /= norm;
                }
            }
        }

        let svd = lam.svd(true, false);
        let u = svd.u.ok_or_else(|| {
            LmmError::InvalidParameter(format!(
                "singular value decomposition of the covariance factor of '{}' failed",
                re.fname()
            ))
        })?;

        let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
        order.sort_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]));

        let variances = order.iter().map(|&k| svd.singular_values[k].powi(2)).collect();
        let loadings = DMatrix::from_fn(u.nrows(), order.len(), |i, j| u[(i, order[j])]);

        Ok(Self {
            group: re.fname().to_string(),
            names,
            variances,
            loadings,
            corr,
        })
    }

    /// Share of the total variance carried by each component.
    pub fn proportion_variance(&self) -> Vec<f64> {
        let total: f64 = self.variances.iter().sum();
        self.variances.iter().map(|v| v / total).collect()
    }

    /// Running sum of [`Self::proportion_variance`].
    pub fn cumulative_variance(&self) -> Vec<f64> {
        self.proportion_variance()
            .into_iter()
            .scan(0.0, |acc, p| {
                *acc += p;
                Some(*acc)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::GroupingFactor;
    use crate::remat::ReMatBuilder;
    use approx::assert_relative_eq;

    #[test]
    fn test_scalar_block_is_trivial() {
        let mut re = ReMatBuilder::new()
            .factor(GroupingFactor::new("g", &["a", "b"]))
            .intercept()
            .build()
            .unwrap();
        re.set_theta(&[3.0]).unwrap();
        let pca = Pca::from_remat(&re, false).unwrap();
        assert_eq!(pca.variances.len(), 1);
        assert_relative_eq!(pca.variances[0], 9.0, epsilon = 1e-12);
        assert_relative_eq!(pca.loadings[(0, 0)].abs(), 1.0, epsilon = 1e-12);
        assert_eq!(pca.cumulative_variance(), vec![1.0]);
    }

    #[test]
    fn test_variances_sum_to_trace_and_sort() {
        let mut re = ReMatBuilder::new()
            .factor(GroupingFactor::new("subj", &["a", "b", "c"]))
            .intercept()
            .covariate("days", &[0.0, 1.0, 2.0])
            .build()
            .unwrap();
        re.set_theta(&[0.5, 1.0, 2.0]).unwrap();
        let pca = Pca::from_remat(&re, false).unwrap();

        let lam = re.lambda().to_dense();
        let trace = (&lam * lam.transpose()).trace();
        assert_relative_eq!(pca.variances.iter().sum::<f64>(), trace, epsilon = 1e-10);
        assert!(pca.variances[0] >= pca.variances[1]);
        assert_eq!(pca.names, vec!["(Intercept)".to_string(), "days".to_string()]);

        let cum = pca.cumulative_variance();
        assert_relative_eq!(cum[1], 1.0, epsilon = 1e-12);

        let corr = Pca::from_remat(&re, true).unwrap();
        assert_relative_eq!(corr.variances.iter().sum::<f64>(), 2.0, epsilon = 1e-10);
    }

    #[test]
    fn test_flexible_skips_unused_levels() {
        let levels = vec!["x".to_string(), "y".to_string(), "z".to_string()];
        let g = GroupingFactor::from_refs("g", levels, &[1, 3, 3]).unwrap();
        let start = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![2.0, 1.0, 3.0]));
        let re = ReMatBuilder::new()
            .factor(g)
            .intercept()
            .flexible(start)
            .build()
            .unwrap();
        let pca = Pca::from_remat(&re, false).unwrap();
        assert_eq!(pca.names, vec!["x".to_string(), "z".to_string()]);
        assert_eq!(pca.loadings.nrows(), 2);
        assert_eq!(pca.variances.len(), 2);
        assert_relative_eq!(pca.variances[0], 9.0, epsilon = 1e-12);
        assert_relative_eq!(pca.variances[1], 4.0, epsilon = 1e-12);
    }
}
