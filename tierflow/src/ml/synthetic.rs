//! Synthetic classification data.
//!
//! Each class is a Gaussian cluster centred on a distinct vertex of a
//! hypercube in the informative subspace. Redundant features are random linear
//! combinations of the informative ones and the remaining features are noise.

use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::errors::ConfigError;

/// Parameters for [`make_classification`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationSpec {
    /// Rows to generate.
    pub n_samples: usize,
    /// Total columns.
    pub n_features: usize,
    /// Columns carrying class signal.
    pub n_informative: usize,
    /// Linear combinations of informative columns.
    pub n_redundant: usize,
    /// Number of classes.
    pub n_classes: usize,
    /// Half the hypercube edge length.
    pub class_sep: f64,
    /// Fraction of labels replaced at random.
    pub flip_y: f64,
    /// RNG seed.
    pub seed: u64,
}

impl ClassificationSpec {
    /// Eight informative and two redundant columns out of ten, scaled to
    /// other widths.
    #[must_use]
    pub fn new(n_samples: usize, n_features: usize, n_classes: usize, seed: u64) -> Self {
        let n_informative = (n_features * 4 / 5).max(1).min(n_features);
        let n_redundant = (n_features - n_informative).min(2);
        Self {
            n_samples,
            n_features,
            n_informative,
            n_redundant,
            n_classes,
            class_sep: 0.8,
            flip_y: 0.01,
            seed,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.n_informative + self.n_redundant > self.n_features {
            return Err(ConfigError::Invariant(format!(
                "{} informative + {} redundant features exceed {} features",
                self.n_informative, self.n_redundant, self.n_features
            )));
        }
        let vertices = 1u128 << self.n_informative.min(64);
        if (self.n_classes as u128) > vertices {
            return Err(ConfigError::Invariant(format!(
                "{} classes need more than {} informative features",
                self.n_classes, self.n_informative
            )));
        }
        if self.n_classes < 2 || self.n_samples < self.n_classes {
            return Err(ConfigError::Invariant(format!(
                "cannot generate {} samples over {} classes",
                self.n_samples, self.n_classes
            )));
        }
        Ok(())
    }
}

/// Generates a feature matrix and balanced class labels.
///
/// # Errors
///
/// Returns an error if the shape cannot be realised.
pub fn make_classification(spec: &ClassificationSpec) -> Result<(Array2<f64>, Vec<usize>), ConfigError> {
    spec.validate()?;
    let mut rng = ChaCha8Rng::seed_from_u64(spec.seed);
    let n_inf = spec.n_informative;

    let mut labels: Vec<usize> = (0..spec.n_samples).map(|i| i % spec.n_classes).collect();
    labels.sort_unstable();

    let mut x = Array2::<f64>::zeros((spec.n_samples, spec.n_features));
    for (i, &label) in labels.iter().enumerate() {
        for j in 0..n_inf {
            let bit = (label >> (j % usize::BITS as usize)) & 1;
            let centre = if bit == 1 { spec.class_sep } else { -spec.class_sep };
            x[[i, j]] = centre + rng.sample::<f64, _>(StandardNormal);
        }
    }

    let mixing: Vec<f64> = (0..n_inf * spec.n_redundant)
        .map(|_| rng.gen_range(-1.0..1.0))
        .collect();
    for i in 0..spec.n_samples {
        for r in 0..spec.n_redundant {
            x[[i, n_inf + r]] = (0..n_inf).map(|j| x[[i, j]] * mixing[j * spec.n_redundant + r]).sum();
        }
        for j in (n_inf + spec.n_redundant)..spec.n_features {
            x[[i, j]] = rng.sample::<f64, _>(StandardNormal);
        }
    }

    for label in &mut labels {
        if rng.gen::<f64>() < spec.flip_y {
            *label = rng.gen_range(0..spec.n_classes);
        }
    }

    let mut order: Vec<usize> = (0..spec.n_samples).collect();
    order.shuffle(&mut rng);
    let shuffled = x.select(ndarray::Axis(0), &order);
    let shuffled_labels = order.iter().map(|&i| labels[i]).collect();

    Ok((shuffled, shuffled_labels))
}

/// Linearly rescales column `j` of `x` into `[low, high]`.
pub fn rescale_column(x: &mut Array2<f64>, j: usize, low: f64, high: f64) {
    let mut column = x.column_mut(j);
    let min = column.iter().copied().fold(f64::INFINITY, f64::min);
    let max = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    column.mapv_inplace(|v| {
        if span > 0.0 {
            low + (v - min) / span * (high - low)
        } else {
            low
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_and_balance() {
        let spec = ClassificationSpec::new(300, 10, 3, 7);
        assert_eq!((spec.n_informative, spec.n_redundant), (8, 2));

        let (x, y) = make_classification(&spec).unwrap();
        assert_eq!(x.dim(), (300, 10));
        assert_eq!(y.len(), 300);
        for class in 0..3 {
            let count = y.iter().filter(|&&c| c == class).count();
            assert!((90..=110).contains(&count), "class {class} has {count} rows");
        }
    }

    #[test]
    fn test_same_seed_same_data() {
        let spec = ClassificationSpec::new(50, 6, 2, 42);
        assert_eq!(make_classification(&spec).unwrap(), make_classification(&spec).unwrap());
    }

    #[test]
    fn test_rejects_too_many_classes() {
        let spec = ClassificationSpec::new(50, 1, 3, 42);
        assert!(make_classification(&spec).is_err());
    }

    #[test]
    fn test_rescale_column() {
        let mut x = ndarray::array![[1.0, 5.0], [3.0, 5.0], [2.0, 5.0]];
        rescale_column(&mut x, 0, 60.0, 200.0);
        rescale_column(&mut x, 1, 0.0, 1.0);
        assert_eq!(x.column(0).to_vec(), vec![60.0, 200.0, 130.0]);
        assert_eq!(x.column(1).to_vec(), vec![0.0, 0.0, 0.0]);
    }
}
