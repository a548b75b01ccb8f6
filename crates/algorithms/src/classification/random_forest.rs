//! Random forest classifier
//!
//! Bagged CART trees with a random feature subset at every split.
//! Per-tree seeds are drawn in order from one master generator before
//! any tree is grown, so the fitted forest does not depend on how many
//! threads grow it.

use super::decision_tree::{majority, DecisionTree, TreeParams};
use super::sampling::SampleSet;
use crate::maybe_rayon::*;
use lulc_core::raster::{Raster, RasterImage};
use lulc_core::{Error, Result};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// No-data value of classified rasters
pub const CLASS_NODATA: u8 = 255;

/// Number of features tried at each split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// Square root of the feature count
    Sqrt,
    /// Log base 2 of the feature count
    Log2,
    /// Fraction of the feature count, in (0, 1]
    Fraction(f64),
    Fixed(usize),
    All,
}

impl MaxFeatures {
    /// Resolve against a concrete feature count; never below 1
    pub fn resolve(self, n_features: usize) -> usize {
        let n = n_features as f64;
        let k = match self {
            MaxFeatures::Sqrt => n.sqrt().floor() as usize,
            MaxFeatures::Log2 => n.log2().floor() as usize,
            MaxFeatures::Fraction(f) => (n * f).ceil() as usize,
            MaxFeatures::Fixed(k) => k,
            MaxFeatures::All => n_features,
        };
        k.clamp(1, n_features.max(1))
    }
}

/// Training configuration of [`RandomForest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestParams {
    pub num_trees: usize,
    pub max_features: MaxFeatures,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Draw a bootstrap resample per tree; otherwise every tree sees all records
    pub bootstrap: bool,
    pub seed: u64,
    /// Class ids are `0..num_classes`; each must have training samples
    pub num_classes: usize,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            num_trees: 200,
            max_features: MaxFeatures::Sqrt,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            bootstrap: true,
            seed: 0,
            num_classes: 4,
        }
    }
}

impl RandomForestParams {
    pub fn validate(&self) -> Result<()> {
        if self.num_trees == 0 {
            return Err(Error::InvalidParameter {
                name: "num_trees",
                value: "0".into(),
                reason: "a forest needs at least one tree".into(),
            });
        }
        if self.num_classes == 0 || self.num_classes > usize::from(CLASS_NODATA) {
            return Err(Error::InvalidParameter {
                name: "num_classes",
                value: self.num_classes.to_string(),
                reason: format!("must be in 1..={}", CLASS_NODATA),
            });
        }
        if let MaxFeatures::Fraction(f) = self.max_features {
            if !(f > 0.0 && f <= 1.0) {
                return Err(Error::InvalidParameter {
                    name: "max_features",
                    value: f.to_string(),
                    reason: "fraction must lie in (0, 1]".into(),
                });
            }
        }
        if self.max_depth == Some(0) {
            return Err(Error::InvalidParameter {
                name: "max_depth",
                value: "0".into(),
                reason: "use null for unlimited depth".into(),
            });
        }
        Ok(())
    }
}

/// Something that maps a feature vector in a fixed schema to a class id
pub trait Classifier: Sync {
    /// Band names, in the order features must be supplied
    fn schema(&self) -> &[String];

    fn num_classes(&self) -> usize;

    /// Class of one feature vector in schema order.
    ///
    /// `features` must hold one value per schema band.
    fn predict_features(&self, features: &[f64]) -> u8;

    /// Classes of every record of `samples`.
    ///
    /// The sample schema must equal the classifier schema.
    fn predict_samples(&self, samples: &SampleSet) -> Result<Vec<u8>> {
        check_schema(self.schema(), samples.schema(), "sample set")?;
        check_record_lengths(samples, "sample set")?;
        Ok(samples
            .records()
            .par_iter()
            .map(|r| self.predict_features(&r.features))
            .collect())
    }

    /// Classify every pixel of `image`.
    ///
    /// Bands are read by schema name, so extra bands are ignored and band
    /// order in the image does not matter. Pixels with no-data in any
    /// schema band come out as [`CLASS_NODATA`].
    fn predict_image(&self, image: &RasterImage) -> Result<Raster<u8>> {
        let selected = image.select(self.schema()).map_err(|e| match e {
            Error::MissingBand(band) => Error::SchemaMismatch {
                expected: format!("{:?}", self.schema()),
                actual: format!("{:?} (no band {})", image.band_names(), band),
                context: "raster prediction",
            },
            other => other,
        })?;
        let template = selected.template()?;
        let (rows, cols) = template.shape();

        let data: Vec<u8> = (0..rows)
            .into_par_iter()
            .flat_map(|row| {
                let mut row_data = vec![CLASS_NODATA; cols];
                let mut features = Vec::with_capacity(selected.len());
                for (col, out) in row_data.iter_mut().enumerate() {
                    if selected.pixel_vector(row, col, &mut features) {
                        *out = self.predict_features(&features);
                    }
                }
                row_data
            })
            .collect();

        template.with_data(data, Some(CLASS_NODATA))
    }
}

fn check_schema(expected: &[String], actual: &[String], context: &'static str) -> Result<()> {
    if expected != actual {
        return Err(Error::SchemaMismatch {
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
            context,
        });
    }
    Ok(())
}

fn check_record_lengths(samples: &SampleSet, context: &'static str) -> Result<()> {
    let expected = samples.schema().len();
    if let Some(r) = samples.records().iter().find(|r| r.features.len() != expected) {
        return Err(Error::SchemaMismatch {
            expected: format!("{} features {:?}", expected, samples.schema()),
            actual: format!("{} features", r.features.len()),
            context,
        });
    }
    Ok(())
}

/// A fitted random forest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    schema: Vec<String>,
    num_classes: usize,
    trees: Vec<DecisionTree>,
    feature_importance: Vec<f64>,
}

impl RandomForest {
    /// Fit a forest on `train`.
    ///
    /// `feature_schema` must equal the sample set's schema. Every class in
    /// `0..params.num_classes` needs at least one training record, else
    /// `InsufficientData` names the first empty class.
    pub fn train(train: &SampleSet, feature_schema: &[String], params: &RandomForestParams) -> Result<Self> {
        params.validate()?;
        check_schema(feature_schema, train.schema(), "training samples")?;
        check_record_lengths(train, "training samples")?;

        let num_classes = params.num_classes;
        let n_features = feature_schema.len();
        if let Some(r) = train.records().iter().find(|r| usize::from(r.label) >= num_classes) {
            return Err(Error::InvalidParameter {
                name: "label",
                value: r.label.to_string(),
                reason: format!("class ids must be below {}", num_classes),
            });
        }

        let counts = train.class_counts(num_classes);
        if let Some(class) = counts.iter().position(|&c| c == 0) {
            return Err(Error::InsufficientData {
                class: class as u8,
                counts,
            });
        }

        let n = train.len();
        let mut matrix = Array2::<f64>::zeros((n, n_features));
        for (i, record) in train.records().iter().enumerate() {
            for (j, &v) in record.features.iter().enumerate() {
                matrix[[i, j]] = v;
            }
        }
        let labels = train.labels();

        let tree_params = TreeParams {
            max_features: params.max_features.resolve(n_features),
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            min_samples_leaf: params.min_samples_leaf,
        };

        let mut master = StdRng::seed_from_u64(params.seed);
        let seeds: Vec<u64> = (0..params.num_trees).map(|_| master.gen()).collect();

        let view = matrix.view();
        let fitted: Vec<(DecisionTree, Vec<f64>)> = seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let indices: Vec<usize> = if params.bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                let mut importance = vec![0.0; n_features];
                let tree = DecisionTree::fit(view, &labels, indices, num_classes, &tree_params, &mut rng, &mut importance);
                (tree, importance)
            })
            .collect();

        let mut feature_importance = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(fitted.len());
        for (tree, importance) in fitted {
            for (total, v) in feature_importance.iter_mut().zip(importance) {
                *total += v;
            }
            trees.push(tree);
        }
        let sum: f64 = feature_importance.iter().sum();
        if sum > 0.0 {
            feature_importance.iter_mut().for_each(|v| *v /= sum);
        }

        tracing::info!(
            trees = trees.len(),
            samples = n,
            features = n_features,
            max_features = tree_params.max_features,
            "trained random forest"
        );

        Ok(Self {
            schema: feature_schema.to_vec(),
            num_classes,
            trees,
            feature_importance,
        })
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Total Gini decrease per feature, normalised to sum to 1.
    ///
    /// All zeros when no tree ever split.
    pub fn feature_importance(&self) -> &[f64] {
        &self.feature_importance
    }

    /// Per-class vote counts for one feature vector
    pub fn votes(&self, features: &[f64]) -> Vec<usize> {
        let mut votes = vec![0; self.num_classes];
        for tree in &self.trees {
            votes[usize::from(tree.predict(features))] += 1;
        }
        votes
    }
}

impl Classifier for RandomForest {
    fn schema(&self) -> &[String] {
        &self.schema
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Majority vote; ties go to the lowest class id
    fn predict_features(&self, features: &[f64]) -> u8 {
        debug_assert_eq!(features.len(), self.schema.len());
        majority(&self.votes(features))
    }
}
