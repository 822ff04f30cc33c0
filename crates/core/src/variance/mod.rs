//! Post-fit reporting on random-effects covariance: standard deviations,
//! correlations and principal components derived from λ.

mod components;
mod pca;

pub use components::{correlations, std_devs, VarianceComponents};
pub use pca::Pca;
