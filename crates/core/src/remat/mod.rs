//! Random-effects matrices (ReMat): one block per grouping factor.
//!
//! A `ReMat` stores the `n × (S·L)` random-effects design of a term in compact
//! form, the level code of each observation and the `S` design values per
//! observation, together with the term's relative covariance factor λ and the
//! workspace reused by the cross-product kernels.

pub mod adjacency;
mod amalgamate;
mod builder;
pub mod crossprod;
pub mod inflate;
mod lambda;
pub mod scaling;
pub mod theta;
pub mod weights;

pub use amalgamate::amalgamate;
pub use builder::ReMatBuilder;
pub use crossprod::{crossprod, crossprod_into, fe_crossprod_into, DENSE_FILL_THRESHOLD};
pub use inflate::{copy_scale, copy_scale_inflate};
pub use lambda::Lambda;
pub use scaling::{lmul_lambda, lmul_lambda_t, rmul_lambda};
pub use weights::Weighted;

use nalgebra::DMatrix;

use crate::data::GroupingFactor;
use crate::error::{LmmError, Result};
use crate::matrix::sparse::{spmv_into, spmv_transpose_acc};
use crate::types::SparseMat;

use self::adjacency::adjacency;
use self::weights::check_sqrt_weights;

/// How the covariance factor of a block relates to its design columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockShape {
    /// λ is S×S and applies within each level.
    Fixed,
    /// S = 1 and λ is an unconstrained L×L factor across levels.
    Flexible,
}

/// Dispatch tag used to pick cross-product, scaling and inflation kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Fixed shape with a single column per level (random intercept).
    Scalar,
    /// Fixed shape with `S > 1` columns per level.
    Vector(usize),
    Flexible,
}

/// One grouping factor's contribution to the random-effects design.
#[derive(Debug, Clone)]
pub struct ReMat {
    factor: GroupingFactor,
    cnames: Vec<String>,
    z: DMatrix<f64>,
    wtz: Weighted,
    lambda: Lambda,
    inds: Vec<usize>,
    adj_a: SparseMat,
    scratch: DMatrix<f64>,
    shape: BlockShape,
}

impl ReMat {
    /// Create a fixed-shape block.
    ///
    /// `z` is `S × n` with column `i` holding the `S` covariate values of
    /// observation `i`; `cnames` names the `S` rows. `inds` are the
    /// column-major linear indices of the free entries of `lambda`.
    pub fn new(
        factor: GroupingFactor,
        cnames: Vec<String>,
        z: DMatrix<f64>,
        lambda: Lambda,
        inds: Vec<usize>,
    ) -> Result<Self> {
        let s = z.nrows();
        if s == 0 {
            return Err(LmmError::ModelSpec(format!(
                "random-effects term for '{}' has no columns",
                factor.name()
            )));
        }
        if cnames.len() != s {
            return Err(LmmError::dim(s, cnames.len(), "column names vs design rows"));
        }
        if matches!(lambda, Lambda::Full(_)) {
            return Err(LmmError::ModelSpec(
                "a full covariance factor is only valid for flexible blocks".into(),
            ));
        }
        if lambda.dim() != s {
            return Err(LmmError::shape((s, s), (lambda.dim(), lambda.dim()), "covariance factor"));
        }
        Self::assemble(factor, cnames, z, lambda, inds, BlockShape::Fixed)
    }

    /// Create a flexible block: a single design column whose L×L covariance
    /// factor couples the levels of the grouping factor.
    pub fn flexible(
        factor: GroupingFactor,
        cname: String,
        z: DMatrix<f64>,
        lambda: Lambda,
        inds: Vec<usize>,
    ) -> Result<Self> {
        if z.nrows() != 1 {
            return Err(LmmError::dim(1, z.nrows(), "flexible block design rows"));
        }
        let l = factor.n_levels();
        if lambda.dim() != l {
            return Err(LmmError::shape((l, l), (lambda.dim(), lambda.dim()), "flexible covariance factor"));
        }
        Self::assemble(factor, vec![cname], z, lambda, inds, BlockShape::Flexible)
    }

    fn assemble(
        factor: GroupingFactor,
        cnames: Vec<String>,
        z: DMatrix<f64>,
        lambda: Lambda,
        inds: Vec<usize>,
        shape: BlockShape,
    ) -> Result<Self> {
        if factor.len() != z.ncols() {
            return Err(LmmError::dim(
                factor.len(),
                z.ncols(),
                "observations in grouping factor vs design columns",
            ));
        }
        let k = lambda.dim();
        if inds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(LmmError::InvalidParameter(
                "free-parameter indices must be strictly increasing".into(),
            ));
        }
        if let Some(&bad) = inds.iter().find(|&&i| i >= k * k || !lambda.is_structural(i)) {
            return Err(LmmError::InvalidParameter(format!(
                "free-parameter index {} is not a structural position of a {}x{} factor",
                bad, k, k
            )));
        }

        let adj_a = adjacency(factor.codes(), &z, factor.n_levels())?;
        let scratch = DMatrix::zeros(z.nrows(), factor.n_levels());
        Ok(Self {
            factor,
            cnames,
            z,
            wtz: Weighted::Shared,
            lambda,
            inds,
            adj_a,
            scratch,
            shape,
        })
    }

    pub fn factor(&self) -> &GroupingFactor {
        &self.factor
    }

    /// Name of the grouping factor.
    pub fn fname(&self) -> &str {
        self.factor.name()
    }

    pub fn cnames(&self) -> &[String] {
        &self.cnames
    }

    /// 0-based level code of each observation.
    pub fn codes(&self) -> &[usize] {
        self.factor.codes()
    }

    /// Number of levels of the grouping factor.
    pub fn nlevs(&self) -> usize {
        self.factor.n_levels()
    }

    /// Number of design columns per level (`S`).
    pub fn vsize(&self) -> usize {
        self.z.nrows()
    }

    /// Number of observations.
    pub fn nobs(&self) -> usize {
        self.z.ncols()
    }

    /// Number of columns of the full random-effects design.
    pub fn ncols(&self) -> usize {
        self.vsize() * self.nlevs()
    }

    pub fn shape(&self) -> BlockShape {
        self.shape
    }

    pub fn kind(&self) -> BlockKind {
        match (self.shape, self.vsize()) {
            (BlockShape::Flexible, _) => BlockKind::Flexible,
            (BlockShape::Fixed, 1) => BlockKind::Scalar,
            (BlockShape::Fixed, s) => BlockKind::Vector(s),
        }
    }

    /// Raw design, `S × n`.
    pub fn z(&self) -> &DMatrix<f64> {
        &self.z
    }

    /// Weighted design, `S × n`; the raw design until weights are applied.
    pub fn wtz(&self) -> &DMatrix<f64> {
        self.wtz.resolve(&self.z)
    }

    pub fn weighted(&self) -> &Weighted {
        &self.wtz
    }

    pub fn lambda(&self) -> &Lambda {
        &self.lambda
    }

    /// Column-major linear indices of the free entries of λ.
    pub fn inds(&self) -> &[usize] {
        &self.inds
    }

    /// The `S·L × n` adjoint design.
    pub fn adj_a(&self) -> &SparseMat {
        &self.adj_a
    }

    /// Indicator pattern of the free entries of λ, `k × k` column-major.
    pub fn indicator_matrix(&self) -> DMatrix<bool> {
        let k = self.lambda.dim();
        let mut m = DMatrix::from_element(k, k, false);
        for &i in &self.inds {
            m[(i % k, i / k)] = true;
        }
        m
    }

    pub(crate) fn into_parts(
        self,
    ) -> (GroupingFactor, Vec<String>, DMatrix<f64>, Weighted, DMatrix<bool>) {
        let ind = self.indicator_matrix();
        (self.factor, self.cnames, self.z, self.wtz, ind)
    }

    /// Install an already weighted design and refresh the adjoint values
    /// from it.
    pub(crate) fn with_weighted(mut self, wtz: DMatrix<f64>) -> Result<Self> {
        if wtz.shape() != self.z.shape() {
            return Err(LmmError::shape(self.z.shape(), wtz.shape(), "weighted design"));
        }
        self.adj_a.data_mut().copy_from_slice(wtz.as_slice());
        self.wtz = Weighted::Owned(wtz);
        Ok(self)
    }

    /// Apply square-root case weights: `wtz[:, i] = z[:, i] * sqrtwts[i]`.
    ///
    /// An empty slice leaves the block untouched. The first non-empty call
    /// gives the block its own weighted buffer; the sparsity structure of
    /// the adjoint design never changes, only its values are refreshed.
    pub fn reweight(&mut self, sqrtwts: &[f64]) -> Result<()> {
        if sqrtwts.is_empty() {
            return Ok(());
        }
        check_sqrt_weights(sqrtwts, self.nobs())?;
        let wtz = self.wtz.make_owned(&self.z);
        for (i, (mut col, raw)) in wtz.column_iter_mut().zip(self.z.column_iter()).enumerate() {
            col.copy_from(&raw);
            col *= sqrtwts[i];
        }
        self.adj_a.data_mut().copy_from_slice(wtz.as_slice());
        Ok(())
    }

    /// Dense `n × S·L` weighted design. Intended for inspection and tests.
    pub fn to_dense(&self) -> DMatrix<f64> {
        let s = self.vsize();
        let wtz = self.wtz();
        let mut out = DMatrix::zeros(self.nobs(), self.ncols());
        for (i, &code) in self.codes().iter().enumerate() {
            for k in 0..s {
                out[(i, code * s + k)] = wtz[(k, i)];
            }
        }
        out
    }

    /// `y := α·Z·b + β·y` with `Z` the weighted design and `b` of length
    /// `S·L`.
    pub fn mul_vec_into(&self, y: &mut [f64], alpha: f64, b: &[f64], beta: f64) -> Result<()> {
        if b.len() != self.ncols() {
            return Err(LmmError::dim(self.ncols(), b.len(), "random-effects vector"));
        }
        if y.len() != self.nobs() {
            return Err(LmmError::dim(self.nobs(), y.len(), "linear predictor"));
        }
        scale_in_place(y, beta);
        let s = self.vsize();
        let wtz = self.wtz();
        for (i, (&code, col)) in self.codes().iter().zip(wtz.column_iter()).enumerate() {
            let bk = &b[code * s..code * s + s];
            let dot: f64 = col.iter().zip(bk).map(|(z, b)| z * b).sum();
            y[i] += alpha * dot;
        }
        Ok(())
    }

    /// `Z' r` for a vector of length `n`.
    pub fn adjoint_mul_vec(&self, r: &[f64]) -> Result<Vec<f64>> {
        if r.len() != self.nobs() {
            return Err(LmmError::dim(self.nobs(), r.len(), "response vector"));
        }
        let mut out = vec![0.0; self.ncols()];
        spmv_into(&self.adj_a, r, &mut out);
        Ok(out)
    }

    /// `y += Z b`, using the adjoint design.
    pub fn mul_vec_acc(&self, b: &[f64], y: &mut [f64]) -> Result<()> {
        if b.len() != self.ncols() {
            return Err(LmmError::dim(self.ncols(), b.len(), "random-effects vector"));
        }
        if y.len() != self.nobs() {
            return Err(LmmError::dim(self.nobs(), y.len(), "linear predictor"));
        }
        spmv_transpose_acc(&self.adj_a, b, y);
        Ok(())
    }

    /// Number of free covariance parameters.
    pub fn n_theta(&self) -> usize {
        self.inds.len()
    }

    /// Current values of the free covariance parameters.
    pub fn theta(&self) -> Vec<f64> {
        self.inds.iter().map(|&k| self.lambda.get_linear(k)).collect()
    }

    /// Write the free covariance parameters into `out`.
    pub fn theta_into(&self, out: &mut [f64]) -> Result<()> {
        if out.len() != self.n_theta() {
            return Err(LmmError::ParameterLength {
                expected: self.n_theta(),
                got: out.len(),
            });
        }
        for (o, &k) in out.iter_mut().zip(&self.inds) {
            *o = self.lambda.get_linear(k);
        }
        Ok(())
    }

    /// Overwrite the free entries of λ.
    pub fn set_theta(&mut self, theta: &[f64]) -> Result<()> {
        if theta.len() != self.n_theta() {
            return Err(LmmError::ParameterLength {
                expected: self.n_theta(),
                got: theta.len(),
            });
        }
        let k = self.lambda.dim();
        for (&i, &v) in self.inds.iter().zip(theta) {
            if v < 0.0 && i % k == i / k {
                log::warn!("negative diagonal {} in covariance factor of '{}'", v, self.fname());
            }
            self.lambda.set_linear(i, v);
        }
        Ok(())
    }

    /// Lower bounds of the free parameters: 0 on the diagonal of λ, −∞ off it.
    pub fn lower_bounds(&self) -> Vec<f64> {
        let k = self.lambda.dim();
        self.inds
            .iter()
            .map(|&i| if i % k == i / k { 0.0 } else { f64::NEG_INFINITY })
            .collect()
    }

    /// Restrict the block to uncorrelated random effects: λ becomes its
    /// diagonal projection and only diagonal entries remain free.
    pub fn into_zero_correlation(self) -> ReMat {
        let k = self.lambda.dim();
        let inds = self
            .inds
            .iter()
            .copied()
            .filter(|&i| i % k == i / k)
            .collect();
        ReMat {
            lambda: self.lambda.diagonal_projection(),
            inds,
            ..self
        }
    }
}

/// `x := β x`, with `β = 1` a no-op and `β = 0` a clear.
pub(crate) fn scale_in_place(x: &mut [f64], beta: f64) {
    if beta == 0.0 {
        x.fill(0.0);
    } else if beta != 1.0 {
        x.iter_mut().for_each(|v| *v *= beta);
    }
}

/// Whether every level of `a` co-occurs with exactly one level of `b`.
pub fn is_nested(a: &ReMat, b: &ReMat) -> Result<bool> {
    if a.nobs() != b.nobs() {
        return Err(LmmError::dim(a.nobs(), b.nobs(), "observations of nested factors"));
    }
    let mut bins: Vec<Option<usize>> = vec![None; a.nlevs()];
    for (&ca, &cb) in a.codes().iter().zip(b.codes()) {
        match bins[ca] {
            None => bins[ca] = Some(cb),
            Some(prev) if prev != cb => return Ok(false),
            Some(_) => {}
        }
    }
    Ok(true)
}
