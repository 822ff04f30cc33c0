//! Random-effects matrix algebra for linear mixed models.
//!
//! Each grouping factor of a model contributes one [`remat::ReMat`]: a
//! compact design block with its relative covariance factor λ. This crate
//! provides the per-iteration algebra an outer optimizer needs on those
//! blocks (cross products, λ scaling, `Λ'AΛ + I` preparation and θ
//! plumbing) plus post-fit variance reporting. Factorization and the
//! objective itself live elsewhere.

pub mod data;
pub mod error;
pub mod matrix;
pub mod model;
pub mod remat;
pub mod types;
pub mod variance;

pub use error::{LmmError, Result};
