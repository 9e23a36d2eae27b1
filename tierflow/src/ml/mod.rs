//! Numeric and learning engines used by the full tier.

mod forest;
mod metrics;
mod scaler;
mod split;
mod synthetic;

pub use forest::{ForestParams, RandomForest};
pub use metrics::{accuracy, classification_report, weighted_precision, ClassMetrics, ClassificationReport};
pub use scaler::StandardScaler;
pub use split::{stratified_split, SplitIndices};
pub use synthetic::{make_classification, rescale_column, ClassificationSpec};
