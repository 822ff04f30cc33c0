use nalgebra::DMatrix;

use crate::error::{LmmError, Result};
use crate::remat::weights::check_sqrt_weights;
use crate::remat::Weighted;

/// Fixed-effects design block `X` (n × p) as seen by the cross-product
/// kernels: its shape, column names and weighted values.
#[derive(Debug, Clone)]
pub struct FeMat {
    x: DMatrix<f64>,
    wtx: Weighted,
    cnames: Vec<String>,
}

impl FeMat {
    pub fn new(x: DMatrix<f64>, cnames: Vec<String>) -> Result<Self> {
        if cnames.len() != x.ncols() {
            return Err(LmmError::dim(x.ncols(), cnames.len(), "fixed-effects column names"));
        }
        Ok(Self {
            x,
            wtx: Weighted::Shared,
            cnames,
        })
    }

    /// Number of observations.
    pub fn nobs(&self) -> usize {
        self.x.nrows()
    }

    /// Number of fixed-effects columns.
    pub fn ncols(&self) -> usize {
        self.x.ncols()
    }

    pub fn cnames(&self) -> &[String] {
        &self.cnames
    }

    pub fn x(&self) -> &DMatrix<f64> {
        &self.x
    }

    /// Weighted design; the raw design until weights are applied.
    pub fn wtx(&self) -> &DMatrix<f64> {
        self.wtx.resolve(&self.x)
    }

    /// Scale row `i` of the design by `sqrtwts[i]`. An empty slice is a no-op.
    pub fn reweight(&mut self, sqrtwts: &[f64]) -> Result<()> {
        if sqrtwts.is_empty() {
            return Ok(());
        }
        check_sqrt_weights(sqrtwts, self.nobs())?;
        let wtx = self.wtx.make_owned(&self.x);
        wtx.copy_from(&self.x);
        for (mut row, &w) in wtx.row_iter_mut().zip(sqrtwts) {
            row *= w;
        }
        Ok(())
    }
}
