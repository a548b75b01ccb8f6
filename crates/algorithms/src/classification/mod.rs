//! Supervised land-cover classification
//!
//! - **Sampling**: labeled feature vectors from polygons over a feature image
//! - **Split**: seeded random train/test partition
//! - **Random forest**: bagged Gini trees with per-split feature subsets
//! - **Accuracy**: confusion matrix, overall accuracy, Cohen's kappa

mod accuracy;
mod decision_tree;
mod random_forest;
mod sampling;
mod split;

pub use accuracy::{assess, AccuracyReport, ConfusionMatrix};
pub use decision_tree::{DecisionTree, Node, TreeParams};
pub use random_forest::{Classifier, MaxFeatures, RandomForest, RandomForestParams, CLASS_NODATA};
pub use sampling::{
    default_feature_bands, extract_samples, OverlapPolicy, SampleLocation, SampleRecord, SampleSet,
    SamplingParams,
};
pub use split::{assign_split_keys, split_samples, SplitParams, TrainTestSplit};
