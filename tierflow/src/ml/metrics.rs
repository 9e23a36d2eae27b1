//! Classification metrics.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Precision, recall and F1 for one class or one average.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    /// Correct predictions over all predictions of the class.
    pub precision: f64,
    /// Correct predictions over all true members of the class.
    pub recall: f64,
    /// Harmonic mean of precision and recall.
    #[serde(rename = "f1-score")]
    pub f1_score: f64,
    /// True members of the class.
    pub support: usize,
}

/// Per-class metrics plus overall accuracy and averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// Metrics keyed by class label.
    #[serde(flatten)]
    pub classes: BTreeMap<String, ClassMetrics>,
    /// Fraction of correct predictions.
    pub accuracy: f64,
    /// Unweighted mean over classes.
    #[serde(rename = "macro avg")]
    pub macro_avg: ClassMetrics,
    /// Support-weighted mean over classes.
    #[serde(rename = "weighted avg")]
    pub weighted_avg: ClassMetrics,
}

/// Fraction of positions where `y_true` and `y_pred` agree. Zero when empty.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

/// Support-weighted precision over every label present in either slice.
#[must_use]
pub fn weighted_precision(y_true: &[usize], y_pred: &[usize]) -> f64 {
    classification_report(y_true, y_pred).weighted_avg.precision
}

/// Builds a report over the union of true and predicted labels. Undefined
/// ratios are reported as zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn classification_report(y_true: &[usize], y_pred: &[usize]) -> ClassificationReport {
    let labels: BTreeSet<usize> = y_true.iter().chain(y_pred).copied().collect();

    let mut classes = BTreeMap::new();
    let mut per_class = Vec::with_capacity(labels.len());
    for &label in &labels {
        let tp = y_true
            .iter()
            .zip(y_pred)
            .filter(|(&t, &p)| t == label && p == label)
            .count();
        let predicted = y_pred.iter().filter(|&&p| p == label).count();
        let support = y_true.iter().filter(|&&t| t == label).count();

        let precision = ratio(tp, predicted);
        let recall = ratio(tp, support);
        let metrics = ClassMetrics {
            precision,
            recall,
            f1_score: harmonic(precision, recall),
            support,
        };
        per_class.push(metrics);
        classes.insert(label.to_string(), metrics);
    }

    let total: usize = per_class.iter().map(|m| m.support).sum();
    let k = per_class.len().max(1) as f64;
    let macro_avg = ClassMetrics {
        precision: per_class.iter().map(|m| m.precision).sum::<f64>() / k,
        recall: per_class.iter().map(|m| m.recall).sum::<f64>() / k,
        f1_score: per_class.iter().map(|m| m.f1_score).sum::<f64>() / k,
        support: total,
    };
    let weight = |f: fn(&ClassMetrics) -> f64| {
        if total == 0 {
            0.0
        } else {
            per_class.iter().map(|m| f(m) * m.support as f64).sum::<f64>() / total as f64
        }
    };
    let weighted_avg = ClassMetrics {
        precision: weight(|m: &ClassMetrics| m.precision),
        recall: weight(|m: &ClassMetrics| m.recall),
        f1_score: weight(|m: &ClassMetrics| m.f1_score),
        support: total,
    };

    ClassificationReport {
        classes,
        accuracy: accuracy(y_true, y_pred),
        macro_avg,
        weighted_avg,
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn harmonic(a: f64, b: f64) -> f64 {
    if a + b == 0.0 {
        0.0
    } else {
        2.0 * a * b / (a + b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_accuracy() {
        assert_eq!(accuracy(&[0, 1, 2, 2], &[0, 1, 1, 2]), 0.75);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn test_report_values() {
        let y_true = [0, 0, 1, 1, 2, 2];
        let y_pred = [0, 1, 1, 1, 2, 0];
        let report = classification_report(&y_true, &y_pred);

        assert_eq!(report.classes.len(), 3);
        let c0 = report.classes["0"];
        assert_eq!((c0.precision, c0.recall, c0.support), (0.5, 0.5, 2));
        let c1 = report.classes["1"];
        assert!((c1.precision - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(c1.recall, 1.0);

        let expected_weighted = (0.5 + 2.0 / 3.0 + 1.0) / 3.0;
        assert!((report.weighted_avg.precision - expected_weighted).abs() < 1e-12);
        assert!((weighted_precision(&y_true, &y_pred) - expected_weighted).abs() < 1e-12);
    }

    #[test]
    fn test_predicted_only_label_is_reported() {
        let report = classification_report(&[0, 0], &[0, 1]);
        assert_eq!(report.classes["1"].support, 0);
        assert_eq!(report.classes["1"].precision, 0.0);
    }

    #[test]
    fn test_serialized_keys() {
        let value = serde_json::to_value(classification_report(&[0, 1], &[0, 1])).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert!(keys.contains(&&"macro avg".to_string()));
        assert!(keys.contains(&&"0".to_string()));
        assert_eq!(value["0"]["f1-score"], 1.0);
    }
}
