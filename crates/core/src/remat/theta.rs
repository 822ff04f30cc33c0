//! The optimizer's view of a model's random-effects blocks: one flat θ
//! vector formed by concatenating each block's free parameters in order.

use crate::error::{LmmError, Result};

use super::ReMat;

/// Total number of free covariance parameters.
pub fn n_theta(blocks: &[ReMat]) -> usize {
    blocks.iter().map(ReMat::n_theta).sum()
}

/// Concatenated free parameters of all blocks.
pub fn gather_theta(blocks: &[ReMat]) -> Vec<f64> {
    blocks.iter().flat_map(ReMat::theta).collect()
}

/// Distribute a flat θ vector over the blocks.
///
/// The length is checked before any block is touched.
pub fn scatter_theta(blocks: &mut [ReMat], theta: &[f64]) -> Result<()> {
    let expected = n_theta(blocks);
    if theta.len() != expected {
        return Err(LmmError::ParameterLength {
            expected,
            got: theta.len(),
        });
    }
    let mut offset = 0;
    for re in blocks.iter_mut() {
        let k = re.n_theta();
        re.set_theta(&theta[offset..offset + k])?;
        offset += k;
    }
    log::trace!("set {} covariance parameters over {} blocks", expected, blocks.len());
    Ok(())
}

/// Concatenated lower bounds matching [`gather_theta`].
pub fn lower_bounds(blocks: &[ReMat]) -> Vec<f64> {
    blocks.iter().flat_map(|re| re.lower_bounds()).collect()
}
