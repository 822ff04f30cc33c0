use nalgebra::DMatrix;
use serde::Serialize;

use crate::remat::{BlockShape, ReMat};

/// Rows of a block's covariance factor that are reported, with their
/// names: every column of a fixed-shape block, and the levels of a flexible
/// block that at least one observation refers to.
pub(crate) fn reported_rows(re: &ReMat) -> Vec<(usize, String)> {
    match re.shape() {
        BlockShape::Fixed => re.cnames().iter().cloned().enumerate().collect(),
        BlockShape::Flexible => re
            .factor()
            .used_codes()
            .into_iter()
            .map(|i| (i, re.factor().level_name(i).unwrap_or_default().to_string()))
            .collect(),
    }
}

/// Standard deviations of the random effects of a block.
///
/// Each is the norm of the structural part of a row of λ, multiplied by the
/// residual scale of the fit.
pub fn std_devs(re: &ReMat, scale: f64) -> Vec<(String, f64)> {
    let lambda = re.lambda();
    reported_rows(re)
        .into_iter()
        .map(|(i, name)| (name, scale * lambda.row_norm(i)))
        .collect()
}

/// Correlation matrix of the random effects of a block.
///
/// Rows of λ are normalized and their inner products taken. Pairs whose
/// rows share no free column of λ are structurally uncorrelated and are
/// reported as `-0.0`; a row of norm zero yields `NaN` correlations.
pub fn correlations(re: &ReMat) -> DMatrix<f64> {
    let mut lam = re.lambda().to_dense();
    let k = lam.nrows();
    for (i, mut row) in lam.row_iter_mut().enumerate() {
        let norm = re.lambda().row_norm(i);
        row /= norm;
    }

    let ind = re.indicator_matrix();
    let shares_column = |i: usize, j: usize| (0..k).any(|c| ind[(i, c)] && ind[(j, c)]);
    let rows: Vec<usize> = reported_rows(re).into_iter().map(|(i, _)| i).collect();

    DMatrix::from_fn(rows.len(), rows.len(), |a, b| {
        let (i, j) = (rows[a], rows[b]);
        if i == j {
            if lam[(i, i)].is_nan() {
                f64::NAN
            } else {
                1.0
            }
        } else if shares_column(i, j) {
            lam.row(i).dot(&lam.row(j))
        } else {
            -0.0
        }
    })
}

/// Reporting summary of one block's covariance.
#[derive(Debug, Clone, Serialize)]
pub struct VarianceComponents {
    /// Grouping factor name.
    pub group: String,
    /// `(name, σ)` for each random effect.
    pub sigmas: Vec<(String, f64)>,
    pub correlations: DMatrix<f64>,
}

impl VarianceComponents {
    pub fn from_remat(re: &ReMat, scale: f64) -> Self {
        Self {
            group: re.fname().to_string(),
            sigmas: std_devs(re, scale),
            correlations: correlations(re),
        }
    }

    /// Variances `σ²`, in the order of [`Self::sigmas`].
    pub fn variances(&self) -> Vec<f64> {
        self.sigmas.iter().map(|(_, s)| s * s).collect()
    }
}
