//! Per-feature standardisation.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::errors::{ContractViolation, DataContractError};

/// Centres each column on its mean and divides by its population standard
/// deviation. Columns with zero spread are only centred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    /// Column means seen during fit.
    pub mean: Vec<f64>,
    /// Column divisors (standard deviation, or 1 when it is zero).
    pub scale: Vec<f64>,
    /// Rows seen during fit.
    pub n_samples_seen: usize,
}

impl StandardScaler {
    /// Learns column statistics from `x`.
    ///
    /// # Errors
    ///
    /// Returns an error if `x` has no rows.
    pub fn fit(x: &Array2<f64>) -> Result<Self, DataContractError> {
        let mean = x.mean_axis(Axis(0)).ok_or_else(|| {
            DataContractError::new(
                ContractViolation::InsufficientData,
                "Cannot fit a scaler on zero rows",
            )
        })?;
        let std = x.std_axis(Axis(0), 0.0);
        Ok(Self {
            mean: mean.to_vec(),
            scale: std.iter().map(|&s| if s == 0.0 { 1.0 } else { s }).collect(),
            n_samples_seen: x.nrows(),
        })
    }

    /// Number of columns the scaler was fit on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Applies the fitted statistics to `x`. The scaler itself is unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if `x` has a different number of columns.
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>, DataContractError> {
        if x.ncols() != self.n_features() {
            return Err(DataContractError::new(
                ContractViolation::MalformedArtifact,
                format!(
                    "Scaler was fit on {} features but input has {}",
                    self.n_features(),
                    x.ncols()
                ),
            ));
        }
        let mut out = x.clone();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (mean, scale) = (self.mean[j], self.scale[j]);
            column.mapv_inplace(|v| (v - mean) / scale);
        }
        Ok(out)
    }

    /// Fits on `x` and returns the transformed copy.
    ///
    /// # Errors
    ///
    /// Returns an error if `x` has no rows.
    pub fn fit_transform(x: &Array2<f64>) -> Result<(Self, Array2<f64>), DataContractError> {
        let scaler = Self::fit(x)?;
        let transformed = scaler.transform(x)?;
        Ok((scaler, transformed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_train_is_standardised() {
        let x = array![[1.0, 10.0, 5.0], [2.0, 20.0, 5.0], [3.0, 30.0, 5.0], [6.0, 0.0, 5.0]];
        let (scaler, z) = StandardScaler::fit_transform(&x).unwrap();

        for j in 0..2 {
            let col = z.column(j);
            assert!(col.mean().unwrap().abs() < 1e-12);
            assert!((col.std(0.0) - 1.0).abs() < 1e-12);
        }
        assert_eq!(scaler.scale[2], 1.0);
        assert!(z.column(2).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_transform_does_not_refit() {
        let train = array![[0.0], [2.0]];
        let scaler = StandardScaler::fit(&train).unwrap();
        let before = scaler.clone();

        let other = scaler.transform(&array![[4.0], [100.0]]).unwrap();
        assert_eq!(scaler, before);
        assert_eq!(other, array![[3.0], [99.0]]);
    }

    #[test]
    fn test_width_mismatch() {
        let scaler = StandardScaler::fit(&array![[0.0, 1.0]]).unwrap();
        assert!(scaler.transform(&array![[0.0]]).is_err());
    }

    #[test]
    fn test_empty_fit() {
        assert!(StandardScaler::fit(&Array2::zeros((0, 2))).is_err());
    }
}
