//! Stratified train / validation / test splitting.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

use crate::errors::{ContractViolation, DataContractError};

/// Row indices of the three splits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    /// Rows used for fitting.
    pub train: Vec<usize>,
    /// Rows used for model selection.
    pub validation: Vec<usize>,
    /// Rows held out for evaluation.
    pub test: Vec<usize>,
}

impl SplitIndices {
    /// Sizes as `(train, validation, test)`.
    #[must_use]
    pub fn sizes(&self) -> (usize, usize, usize) {
        (self.train.len(), self.validation.len(), self.test.len())
    }
}

/// Splits rows by class so each split keeps the label proportions.
///
/// The test split is taken first with `ceil(test_size * n)` rows; validation
/// is then taken from the remainder with fraction
/// `validation_size / (1 - test_size)`.
///
/// # Errors
///
/// Returns an error if there are too few rows to populate every split.
pub fn stratified_split(
    labels: &[usize],
    test_size: f64,
    validation_size: f64,
    seed: u64,
) -> Result<SplitIndices, DataContractError> {
    if labels.len() < 3 {
        return Err(DataContractError::new(
            ContractViolation::InsufficientData,
            format!("Need at least 3 rows to split, found {}", labels.len()),
        ));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let all: Vec<usize> = (0..labels.len()).collect();
    let (rest, test) = holdout(&all, labels, test_size, &mut rng)?;
    let (train, validation) = holdout(&rest, labels, validation_size / (1.0 - test_size), &mut rng)?;

    Ok(SplitIndices {
        train,
        validation,
        test,
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn holdout(
    rows: &[usize],
    labels: &[usize],
    fraction: f64,
    rng: &mut ChaCha8Rng,
) -> Result<(Vec<usize>, Vec<usize>), DataContractError> {
    let n = rows.len();
    let n_holdout = ((fraction * n as f64) - 1e-9).ceil().max(0.0) as usize;
    if n_holdout == 0 || n_holdout >= n {
        return Err(DataContractError::new(
            ContractViolation::InsufficientData,
            format!("Cannot hold out {fraction:.3} of {n} rows"),
        ));
    }

    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &row in rows {
        by_class.entry(labels[row]).or_default().push(row);
    }

    // Floor of the proportional share, then largest remainders.
    let mut quotas: Vec<(usize, usize, f64)> = by_class
        .iter()
        .map(|(&class, members)| {
            let exact = n_holdout as f64 * members.len() as f64 / n as f64;
            (class, exact.floor() as usize, exact - exact.floor())
        })
        .collect();
    let assigned: usize = quotas.iter().map(|q| q.1).sum();
    let mut order: Vec<usize> = (0..quotas.len()).collect();
    order.sort_by(|&a, &b| quotas[b].2.total_cmp(&quotas[a].2).then(a.cmp(&b)));
    for &i in order.iter().take(n_holdout - assigned) {
        quotas[i].1 += 1;
    }

    let mut keep = Vec::with_capacity(n - n_holdout);
    let mut held = Vec::with_capacity(n_holdout);
    for (class, quota, _) in quotas {
        let Some(members) = by_class.get_mut(&class) else {
            continue;
        };
        members.shuffle(rng);
        held.extend_from_slice(&members[..quota]);
        keep.extend_from_slice(&members[quota..]);
    }
    keep.shuffle(rng);
    held.shuffle(rng);
    Ok((keep, held))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn labels(n: usize, classes: usize) -> Vec<usize> {
        (0..n).map(|i| i % classes).collect()
    }

    #[test]
    fn test_default_fractions_on_1000_rows() {
        let split = stratified_split(&labels(1000, 3), 0.2, 0.1, 42).unwrap();
        assert_eq!(split.sizes(), (700, 100, 200));
    }

    #[test]
    fn test_splits_partition_rows() {
        for n in [10, 97, 250, 1001] {
            let split = stratified_split(&labels(n, 3), 0.2, 0.1, 1).unwrap();
            let (tr, va, te) = split.sizes();
            assert_eq!(tr + va + te, n);

            let all: BTreeSet<usize> = split
                .train
                .iter()
                .chain(&split.validation)
                .chain(&split.test)
                .copied()
                .collect();
            assert_eq!(all.len(), n);
            assert_eq!(te, (0.2 * n as f64 - 1e-9).ceil() as usize);
        }
    }

    #[test]
    fn test_class_proportions_preserved() {
        let y = labels(1000, 2);
        let split = stratified_split(&y, 0.2, 0.1, 3).unwrap();
        let positives = split.test.iter().filter(|&&i| y[i] == 1).count();
        assert_eq!(positives, 100);
    }

    #[test]
    fn test_seed_is_deterministic() {
        let y = labels(300, 3);
        assert_eq!(
            stratified_split(&y, 0.2, 0.1, 9).unwrap(),
            stratified_split(&y, 0.2, 0.1, 9).unwrap()
        );
    }

    #[test]
    fn test_too_few_rows() {
        let err = stratified_split(&[0, 1], 0.2, 0.1, 0).unwrap_err();
        assert_eq!(err.kind, ContractViolation::InsufficientData);
    }
}
