//! Random-forest classifier.
//!
//! Trees are CART-style with Gini impurity. Nodes live in a flat arena per
//! tree; children are referenced by index.

use ndarray::{Array2, ArrayView1};
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::{MaxFeatures, ModelConfig};
use crate::errors::{ContractViolation, DataContractError};

/// Hyper-parameters for [`RandomForest::fit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    /// Number of trees.
    pub n_estimators: usize,
    /// Maximum depth of any tree.
    pub max_depth: usize,
    /// Minimum rows in a node for it to be split.
    pub min_samples_split: usize,
    /// Minimum rows on each side of a split.
    pub min_samples_leaf: usize,
    /// Features sampled per split.
    pub max_features: MaxFeatures,
    /// Whether each tree sees a bootstrap resample.
    pub bootstrap: bool,
    /// Base seed; tree `i` uses `seed + i`.
    pub seed: u64,
}

impl From<&ModelConfig> for ForestParams {
    fn from(config: &ModelConfig) -> Self {
        Self {
            n_estimators: config.n_estimators,
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            max_features: config.max_features,
            bootstrap: config.bootstrap,
            seed: config.random_state,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TreeNode {
    Leaf {
        distribution: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DecisionTree {
    nodes: Vec<TreeNode>,
}

impl DecisionTree {
    fn leaf_for(&self, row: ArrayView1<'_, f64>) -> &[f64] {
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                TreeNode::Leaf { distribution } => return distribution,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => at = if row[*feature] <= *threshold { *left } else { *right },
            }
        }
    }
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    y: &'a [usize],
    n_classes: usize,
    params: &'a ForestParams,
    n_candidates: usize,
    nodes: Vec<TreeNode>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl TreeBuilder<'_> {
    fn build(&mut self, rows: &mut [usize], depth: usize, rng: &mut ChaCha8Rng) -> usize {
        let counts = self.class_counts(rows);
        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;

        let split = if pure
            || depth >= self.params.max_depth
            || rows.len() < self.params.min_samples_split
            || rows.len() < 2 * self.params.min_samples_leaf
        {
            None
        } else {
            self.best_split(rows, &counts, rng)
        };

        let Some(best) = split else {
            return self.push_leaf(&counts, rows.len());
        };

        let at = self.nodes.len();
        self.nodes.push(TreeNode::Leaf {
            distribution: Vec::new(),
        });

        let (feature, threshold) = (best.feature, best.threshold);
        let mid = partition(rows, |&r| self.x[[r, feature]] <= threshold);
        let (left_rows, right_rows) = rows.split_at_mut(mid);
        let left = self.build(left_rows, depth + 1, rng);
        let right = self.build(right_rows, depth + 1, rng);

        self.nodes[at] = TreeNode::Split {
            feature,
            threshold,
            left,
            right,
        };
        at
    }

    #[allow(clippy::cast_precision_loss)]
    fn push_leaf(&mut self, counts: &[usize], n: usize) -> usize {
        let total = n.max(1) as f64;
        self.nodes.push(TreeNode::Leaf {
            distribution: counts.iter().map(|&c| c as f64 / total).collect(),
        });
        self.nodes.len() - 1
    }

    fn class_counts(&self, rows: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for &r in rows {
            counts[self.y[r]] += 1;
        }
        counts
    }

    #[allow(clippy::cast_precision_loss)]
    fn best_split(&self, rows: &[usize], counts: &[usize], rng: &mut ChaCha8Rng) -> Option<BestSplit> {
        let n = rows.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let parent = gini(counts, n);
        let mut best: Option<BestSplit> = None;
        let mut sorted = rows.to_vec();

        for feature in index::sample(rng, self.x.ncols(), self.n_candidates) {
            sorted.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));

            let mut left = vec![0usize; self.n_classes];
            let mut right = counts.to_vec();
            for i in 0..n - 1 {
                let class = self.y[sorted[i]];
                left[class] += 1;
                right[class] -= 1;

                let n_left = i + 1;
                let n_right = n - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }
                let here = self.x[[sorted[i], feature]];
                let next = self.x[[sorted[i + 1], feature]];
                if here >= next {
                    continue;
                }

                let impurity = (n_left as f64 * gini(&left, n_left)
                    + n_right as f64 * gini(&right, n_right))
                    / n as f64;
                if impurity < parent - 1e-12 && best.as_ref().map_or(true, |b| impurity < b.impurity) {
                    best = Some(BestSplit {
                        feature,
                        threshold: here + (next - here) / 2.0,
                        impurity,
                    });
                }
            }
        }
        best
    }
}

#[allow(clippy::cast_precision_loss)]
fn gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>()
}

/// Moves rows matching `pred` to the front; returns how many matched.
fn partition<F: Fn(&usize) -> bool>(rows: &mut [usize], pred: F) -> usize {
    let mut mid = 0;
    for i in 0..rows.len() {
        if pred(&rows[i]) {
            rows.swap(i, mid);
            mid += 1;
        }
    }
    mid
}

/// An ensemble of decision trees voting by averaged class probabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    n_features: usize,
    n_classes: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fits a forest on `x` with labels `y` in `0..n_classes`.
    ///
    /// # Errors
    ///
    /// Returns an error if `x` and `y` disagree in length, `x` is empty, or a
    /// label is out of range.
    pub fn fit(
        x: &Array2<f64>,
        y: &[usize],
        n_classes: usize,
        params: ForestParams,
    ) -> Result<Self, DataContractError> {
        if x.nrows() != y.len() {
            return Err(DataContractError::new(
                ContractViolation::MalformedArtifact,
                format!("{} feature rows but {} labels", x.nrows(), y.len()),
            ));
        }
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(DataContractError::new(
                ContractViolation::InsufficientData,
                "Cannot fit a model on an empty dataset",
            ));
        }
        if let Some(bad) = y.iter().find(|&&c| c >= n_classes) {
            return Err(DataContractError::new(
                ContractViolation::MalformedArtifact,
                format!("Label {bad} outside 0..{n_classes}"),
            ));
        }

        let n = x.nrows();
        let n_candidates = params.max_features.resolve(x.ncols());
        let trees = (0..params.n_estimators.max(1))
            .map(|i| {
                let mut rng = ChaCha8Rng::seed_from_u64(params.seed.wrapping_add(i as u64));
                let mut rows: Vec<usize> = if params.bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                let mut builder = TreeBuilder {
                    x,
                    y,
                    n_classes,
                    params: &params,
                    n_candidates,
                    nodes: Vec::new(),
                };
                builder.build(&mut rows, 0, &mut rng);
                DecisionTree {
                    nodes: builder.nodes,
                }
            })
            .collect();

        Ok(Self {
            n_features: x.ncols(),
            n_classes,
            trees,
            params,
        })
    }

    /// Number of input features.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Parameters the forest was fit with.
    #[must_use]
    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Mean class probabilities across trees, one row per input row.
    ///
    /// # Errors
    ///
    /// Returns an error if `x` has the wrong number of columns.
    #[allow(clippy::cast_precision_loss)]
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>, DataContractError> {
        if x.ncols() != self.n_features {
            return Err(DataContractError::new(
                ContractViolation::MalformedArtifact,
                format!(
                    "Model expects {} features but input has {}",
                    self.n_features,
                    x.ncols()
                ),
            ));
        }
        let mut proba = Array2::<f64>::zeros((x.nrows(), self.n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            for tree in &self.trees {
                for (c, p) in tree.leaf_for(row).iter().enumerate() {
                    proba[[i, c]] += p;
                }
            }
        }
        proba.mapv_inplace(|p| p / self.trees.len() as f64);
        Ok(proba)
    }

    /// Most probable class per row. Ties go to the lower label.
    ///
    /// # Errors
    ///
    /// Returns an error if `x` has the wrong number of columns.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>, DataContractError> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (c, &p)| if p > best.1 { (c, p) } else { best })
                    .0
            })
            .collect())
    }
}
