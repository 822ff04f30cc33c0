use nalgebra::DMatrix;

use crate::error::{LmmError, Result};

/// Weighted copy of a design matrix.
///
/// Until weights are first applied the weighted design is the raw design
/// itself (`Shared`); the first non-empty reweight allocates a separate
/// buffer (`Owned`) which later reweights overwrite in place.
#[derive(Debug, Clone, PartialEq)]
pub enum Weighted {
    Shared,
    Owned(DMatrix<f64>),
}

impl Weighted {
    /// Resolve to the weighted matrix, given the raw one it may alias.
    pub fn resolve<'a>(&'a self, raw: &'a DMatrix<f64>) -> &'a DMatrix<f64> {
        match self {
            Weighted::Shared => raw,
            Weighted::Owned(m) => m,
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, Weighted::Shared)
    }

    /// Mutable access to an owned buffer shaped like `raw`, allocating it on
    /// first use.
    pub(crate) fn make_owned(&mut self, raw: &DMatrix<f64>) -> &mut DMatrix<f64> {
        if self.is_shared() {
            log::debug!(
                "allocating weighted design buffer ({}x{})",
                raw.nrows(),
                raw.ncols()
            );
            *self = Weighted::Owned(raw.clone());
        }
        match self {
            Weighted::Owned(m) => m,
            Weighted::Shared => unreachable!("weighted buffer was just allocated"),
        }
    }
}

/// Validate square-root weights against the observation count.
pub(crate) fn check_sqrt_weights(sqrtwts: &[f64], nobs: usize) -> Result<()> {
    if sqrtwts.len() != nobs {
        return Err(LmmError::dim(nobs, sqrtwts.len(), "square-root weights"));
    }
    if let Some((index, &value)) = sqrtwts
        .iter()
        .enumerate()
        .find(|(_, w)| !w.is_finite() || **w < 0.0)
    {
        return Err(LmmError::InvalidWeight { index, value });
    }
    let zeros = sqrtwts.iter().filter(|w| **w == 0.0).count();
    if zeros > 0 {
        log::warn!("{} of {} observations have zero weight", zeros, nobs);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_resolves_to_raw() {
        let raw = DMatrix::from_element(1, 3, 2.0);
        let w = Weighted::Shared;
        assert!(std::ptr::eq(w.resolve(&raw), &raw));
    }

    #[test]
    fn test_make_owned_copies_once() {
        let raw = DMatrix::from_element(1, 2, 1.0);
        let mut w = Weighted::Shared;
        w.make_owned(&raw)[(0, 0)] = 5.0;
        assert!(!w.is_shared());
        assert_eq!(w.resolve(&raw)[(0, 0)], 5.0);
        assert_eq!(raw[(0, 0)], 1.0);
        // a second call keeps the existing buffer
        assert_eq!(w.make_owned(&raw)[(0, 0)], 5.0);
    }

    #[test]
    fn test_check_sqrt_weights() {
        assert!(check_sqrt_weights(&[1.0, 0.5], 2).is_ok());
        assert!(matches!(
            check_sqrt_weights(&[1.0], 2),
            Err(LmmError::DimensionMismatch { .. })
        ));
        assert_eq!(
            check_sqrt_weights(&[1.0, -0.5], 2),
            Err(LmmError::InvalidWeight {
                index: 1,
                value: -0.5
            })
        );
    }
}
