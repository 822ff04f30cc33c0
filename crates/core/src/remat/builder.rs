use nalgebra::DMatrix;

use crate::data::GroupingFactor;
use crate::error::{LmmError, Result};

use super::{Lambda, ReMat};

/// Builder for a [`ReMat`] from a grouping factor and per-observation
/// covariates.
///
/// ```
/// use remat_core::data::GroupingFactor;
/// use remat_core::remat::ReMatBuilder;
///
/// let subj = GroupingFactor::new("subj", &["a", "a", "b", "b"]);
/// let re = ReMatBuilder::new()
///     .factor(subj)
///     .intercept()
///     .covariate("days", &[0.0, 1.0, 0.0, 1.0])
///     .build()
///     .unwrap();
/// assert_eq!(re.vsize(), 2);
/// assert_eq!(re.n_theta(), 3);
/// ```
pub struct ReMatBuilder {
    factor: Option<GroupingFactor>,
    columns: Vec<(String, Option<Vec<f64>>)>,
    zero_correlation: bool,
    lambda: Option<Lambda>,
    flexible: Option<DMatrix<f64>>,
    design: Option<(Vec<String>, DMatrix<f64>)>,
}

impl Default for ReMatBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReMatBuilder {
    pub fn new() -> Self {
        Self {
            factor: None,
            columns: Vec::new(),
            zero_correlation: false,
            lambda: None,
            flexible: None,
            design: None,
        }
    }

    /// Set the grouping factor.
    pub fn factor(mut self, factor: GroupingFactor) -> Self {
        self.factor = Some(factor);
        self
    }

    /// Add a random intercept column.
    pub fn intercept(mut self) -> Self {
        self.columns.push(("(Intercept)".to_string(), None));
        self
    }

    /// Add a random slope on a per-observation covariate.
    pub fn covariate(mut self, name: &str, values: &[f64]) -> Self {
        self.columns.push((name.to_string(), Some(values.to_vec())));
        self
    }

    /// Use an explicit `S × n` design with one named row per random effect,
    /// replacing any intercept or covariates added so far.
    pub fn design(mut self, cnames: &[&str], z: DMatrix<f64>) -> Self {
        self.columns.clear();
        self.design = Some((cnames.iter().map(|c| c.to_string()).collect(), z));
        self
    }

    /// Estimate variances only: λ is diagonal.
    pub fn zero_correlation(mut self, on: bool) -> Self {
        self.zero_correlation = on;
        self
    }

    /// Starting value of λ (identity if not given).
    pub fn lambda(mut self, lambda: Lambda) -> Self {
        self.lambda = Some(lambda);
        self
    }

    /// Make this a flexible block whose L×L factor starts at `lambda`; the
    /// nonzero entries of `lambda` (and its diagonal) become the free
    /// parameters. Cannot be combined with [`Self::zero_correlation`].
    pub fn flexible(mut self, lambda: DMatrix<f64>) -> Self {
        self.flexible = Some(lambda);
        self
    }

    /// Validate and build the block.
    pub fn build(self) -> Result<ReMat> {
        let factor = self
            .factor
            .ok_or_else(|| LmmError::ModelSpec("grouping factor not specified".into()))?;
        let n = factor.len();
        let (mut cnames, z) = match self.design {
            Some((cnames, z)) if self.columns.is_empty() => {
                if cnames.len() != z.nrows() {
                    return Err(LmmError::dim(z.nrows(), cnames.len(), "names of design rows"));
                }
                (cnames, z)
            }
            _ => stack_columns(self.columns, n)?,
        };
        if cnames.is_empty() {
            return Err(LmmError::ModelSpec(format!(
                "random-effects term for '{}' has no columns",
                factor.name()
            )));
        }
        let s = cnames.len();

        if let Some(lambda) = self.flexible {
            if self.zero_correlation {
                return Err(LmmError::ModelSpec(format!(
                    "flexible block on '{}' cannot be restricted to zero correlation",
                    factor.name()
                )));
            }
            if s != 1 {
                return Err(LmmError::ModelSpec(
                    "a flexible block has exactly one design column".into(),
                ));
            }
            let k = lambda.nrows();
            let inds = (0..k * k)
                .filter(|&i| i % k == i / k || lambda[(i % k, i / k)] != 0.0)
                .collect();
            return ReMat::flexible(factor, cnames.remove(0), z, Lambda::Full(lambda), inds);
        }

        let lambda = match (self.lambda, self.zero_correlation) {
            (Some(l), false) => l,
            (Some(l), true) => l.diagonal_projection(),
            (None, false) => Lambda::identity_lower(s),
            (None, true) => Lambda::identity_diagonal(s),
        };
        let inds = (0..s * s).filter(|&i| lambda.is_structural(i)).collect();
        ReMat::new(factor, cnames, z, lambda, inds)
    }
}

/// Stack intercept and covariate columns into an `S × n` design.
fn stack_columns(
    columns: Vec<(String, Option<Vec<f64>>)>,
    n: usize,
) -> Result<(Vec<String>, DMatrix<f64>)> {
    let mut z = DMatrix::from_element(columns.len(), n, 1.0);
    let mut cnames = Vec::with_capacity(columns.len());
    for (row, (name, values)) in columns.into_iter().enumerate() {
        if let Some(values) = values {
            if values.len() != n {
                return Err(LmmError::dim(n, values.len(), format!("covariate '{}'", name)));
            }
            for (i, v) in values.into_iter().enumerate() {
                z[(row, i)] = v;
            }
        }
        cnames.push(name);
    }
    Ok((cnames, z))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remat::BlockKind;

    fn subj() -> GroupingFactor {
        GroupingFactor::new("subj", &["a", "a", "b", "b", "c"])
    }

    #[test]
    fn test_build_intercept() {
        let re = ReMatBuilder::new().factor(subj()).intercept().build().unwrap();
        assert_eq!(re.kind(), BlockKind::Scalar);
        assert_eq!(re.cnames(), &["(Intercept)".to_string()]);
        assert_eq!(re.theta(), vec![1.0]);
    }

    #[test]
    fn test_build_slope_zero_correlation() {
        let re = ReMatBuilder::new()
            .factor(subj())
            .intercept()
            .covariate("days", &[0.0, 1.0, 0.0, 1.0, 2.0])
            .zero_correlation(true)
            .build()
            .unwrap();
        assert_eq!(re.kind(), BlockKind::Vector(2));
        assert!(re.lambda().is_diagonal());
        assert_eq!(re.inds(), &[0, 3]);
        assert_eq!(re.z()[(1, 4)], 2.0);
    }

    #[test]
    fn test_build_flexible_pattern_from_start() {
        let mut lambda = DMatrix::identity(3, 3);
        lambda[(1, 0)] = 0.5;
        let re = ReMatBuilder::new()
            .factor(subj())
            .intercept()
            .flexible(lambda)
            .build()
            .unwrap();
        assert_eq!(re.kind(), BlockKind::Flexible);
        assert_eq!(re.inds(), &[0, 1, 4, 8]);
        assert_eq!(re.lower_bounds()[1], f64::NEG_INFINITY);
    }

    #[test]
    fn test_build_from_explicit_design() {
        let z = DMatrix::from_row_slice(2, 5, &[1.0, 1.0, 1.0, 1.0, 1.0, 0.5, 1.5, 0.5, 1.5, 2.5]);
        let re = ReMatBuilder::new()
            .factor(subj())
            .intercept()
            .design(&["(Intercept)", "dose"], z.clone())
            .build()
            .unwrap();
        assert_eq!(re.z(), &z);
        assert_eq!(re.cnames()[1], "dose");
        assert_eq!(re.n_theta(), 3);

        let err = ReMatBuilder::new()
            .factor(subj())
            .design(&["dose"], z)
            .build()
            .unwrap_err();
        assert!(matches!(err, LmmError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_build_errors() {
        assert!(matches!(
            ReMatBuilder::new().intercept().build(),
            Err(LmmError::ModelSpec(_))
        ));
        assert!(matches!(
            ReMatBuilder::new().factor(subj()).build(),
            Err(LmmError::ModelSpec(_))
        ));
        assert!(matches!(
            ReMatBuilder::new()
                .factor(subj())
                .covariate("x", &[1.0])
                .build(),
            Err(LmmError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            ReMatBuilder::new()
                .factor(subj())
                .intercept()
                .zero_correlation(true)
                .flexible(DMatrix::identity(3, 3))
                .build(),
            Err(LmmError::ModelSpec(_))
        ));
    }
}
