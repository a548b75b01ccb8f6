//! End-to-end land-cover classification run
//!
//! query -> cloud mask -> median composite -> AOI clip -> indices ->
//! samples -> split -> random forest -> classified raster + accuracy ->
//! optional export.
//!
//! Every input is explicit: the scene source, the query and the labeled
//! polygons are arguments of [`Pipeline::run`], tunables live in
//! [`PipelineConfig`]. Stage outputs are kept in a [`RasterStore`] and
//! only read through shared references afterwards.

use crate::classification::{
    assess, extract_samples, split_samples, AccuracyReport, Classifier, ConfusionMatrix,
    OverlapPolicy, RandomForest, RandomForestParams, SamplingParams, SplitParams,
};
use crate::export::{export_classified, ExportConfig, ExportRequest, ExportSummary, RasterSink};
use crate::imagery::{
    append_indices, apply_mask, clip_to_region, masked_fraction, median_composite, usable_mask,
    CloudMaskParams, ImageCollectionQuery, Scene, SceneSource, SpectralIndex,
};
use crate::maybe_rayon::*;
use lulc_core::raster::{Raster, RasterId, RasterImage, RasterStore};
use lulc_core::vector::LabeledPolygonSet;
use lulc_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Every tunable of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub cloud_mask: CloudMaskParams,
    /// Indices appended to the composite before sampling
    pub indices: Vec<SpectralIndex>,
    /// Feature schema: bands read for training and prediction, in order
    pub bands: Vec<String>,
    /// Sampling pixel size; `None` samples the composite's native grid
    pub scale: Option<f64>,
    pub overlap_policy: OverlapPolicy,
    pub split: SplitParams,
    pub forest: RandomForestParams,
    pub export: Option<ExportConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cloud_mask: CloudMaskParams::default(),
            indices: vec![SpectralIndex::Ndvi, SpectralIndex::Ndwi],
            bands: crate::classification::default_feature_bands(),
            scale: Some(10.0),
            overlap_policy: OverlapPolicy::Reject,
            split: SplitParams::default(),
            forest: RandomForestParams::default(),
            export: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::InvalidParameter {
            name: "config",
            value: "<json>".into(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text).map_err(|e| match e {
            Error::InvalidParameter { name, reason, .. } => Error::InvalidParameter {
                name,
                value: path.as_ref().display().to_string(),
                reason,
            },
            other => other,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.bands.is_empty() {
            return Err(Error::InvalidParameter {
                name: "bands",
                value: "[]".into(),
                reason: "the feature schema needs at least one band".into(),
            });
        }
        for (i, band) in self.bands.iter().enumerate() {
            if self.bands[..i].contains(band) {
                return Err(Error::InvalidParameter {
                    name: "bands",
                    value: band.clone(),
                    reason: "listed twice".into(),
                });
            }
        }
        if let Some(scale) = self.scale {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(Error::InvalidParameter {
                    name: "scale",
                    value: scale.to_string(),
                    reason: "sampling scale must be positive".into(),
                });
            }
        }
        if !(0.0..=1.0).contains(&self.split.train_fraction) {
            return Err(Error::InvalidParameter {
                name: "split.train_fraction",
                value: self.split.train_fraction.to_string(),
                reason: "must lie in [0, 1]".into(),
            });
        }
        self.forest.validate()
    }

    fn sampling(&self) -> SamplingParams {
        SamplingParams {
            bands: self.bands.clone(),
            scale: self.scale,
            overlap_policy: self.overlap_policy,
        }
    }
}

/// Run summary handed to reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub scenes: usize,
    pub confusion_matrix: ConfusionMatrix,
    pub overall_accuracy: f64,
    pub kappa: f64,
    pub producers_accuracy: Vec<Option<f64>>,
    pub consumers_accuracy: Vec<Option<f64>>,
    pub total_samples: usize,
    pub train_samples: usize,
    pub test_samples: usize,
    /// (band, normalised Gini importance)
    pub feature_importance: Vec<(String, f64)>,
}

impl Diagnostics {
    fn new(scenes: usize, report: AccuracyReport, counts: (usize, usize, usize), forest: &RandomForest) -> Self {
        let (total_samples, train_samples, test_samples) = counts;
        Self {
            scenes,
            confusion_matrix: report.confusion_matrix,
            overall_accuracy: report.overall_accuracy,
            kappa: report.kappa,
            producers_accuracy: report.producers_accuracy,
            consumers_accuracy: report.consumers_accuracy,
            total_samples,
            train_samples,
            test_samples,
            feature_importance: forest
                .schema()
                .iter()
                .cloned()
                .zip(forest.feature_importance().iter().copied())
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Other(e.to_string()))
    }
}

/// Everything a run produced
#[derive(Debug)]
pub struct PipelineOutcome {
    pub store: RasterStore,
    /// Clipped median composite
    pub composite: RasterId,
    /// Composite plus indices, restricted to the feature schema
    pub features: RasterId,
    pub classified: Raster<u8>,
    pub forest: RandomForest,
    pub diagnostics: Diagnostics,
    pub export: Option<ExportSummary>,
}

/// A configured classification run
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Mask every scene and reduce them to one clipped median composite
    pub fn composite(&self, scenes: &[Scene], query: &ImageCollectionQuery) -> Result<RasterImage> {
        let masked: Vec<RasterImage> = scenes
            .par_iter()
            .map(|scene| {
                let params = &self.config.cloud_mask;
                let mask = usable_mask(scene.image.band(&params.band)?, &params.unusable_codes);
                let fraction = masked_fraction(&mask);
                if fraction >= 1.0 {
                    tracing::warn!(scene = %scene.id, "scene is fully masked");
                } else {
                    tracing::debug!(scene = %scene.id, masked = fraction, "cloud mask applied");
                }
                apply_mask(&scene.image, &mask)
            })
            .collect::<Result<Vec<_>>>()?;

        let refs: Vec<&RasterImage> = masked.iter().collect();
        let composite = median_composite(&refs)?;
        clip_to_region(&composite, &query.aoi)
    }

    /// Append the configured indices and keep only the feature bands
    pub fn features(&self, composite: &RasterImage) -> Result<RasterImage> {
        append_indices(composite, &self.config.indices)?.select(&self.config.bands)
    }

    /// Run every stage.
    ///
    /// The export runs only when both an export config and a sink are
    /// given. Any stage error ends the run.
    pub fn run(
        &self,
        source: &dyn SceneSource,
        query: &ImageCollectionQuery,
        polygons: &LabeledPolygonSet,
        sink: Option<&dyn RasterSink>,
    ) -> Result<PipelineOutcome> {
        let scenes = source.query(query)?;
        tracing::info!(scenes = scenes.len(), "scenes selected");

        let mut store = RasterStore::new();
        let composite = store.insert("composite", self.composite(&scenes, query)?);
        let feature_bands = self.features(store.get(composite)?)?;
        let features = store.insert("features", feature_bands);
        let feature_image = store.get(features)?;

        let samples = extract_samples(feature_image, polygons, &self.config.sampling())?;
        let split = split_samples(&samples, &self.config.split)?;
        tracing::info!(
            total = samples.len(),
            train = split.train.len(),
            test = split.test.len(),
            per_class = ?samples.class_counts(self.config.forest.num_classes),
            "samples extracted"
        );

        let forest = RandomForest::train(&split.train, &self.config.bands, &self.config.forest)?;
        let classified = forest.predict_image(feature_image)?;

        let report = assess(&forest, &split.test)?;
        tracing::info!(
            overall_accuracy = report.overall_accuracy,
            kappa = report.kappa,
            "accuracy assessed"
        );

        let export = match (&self.config.export, sink) {
            (Some(config), Some(sink)) => {
                let request = ExportRequest::new(config, query.aoi.clone());
                Some(export_classified(&classified, &request, sink)?)
            }
            (Some(config), None) => {
                tracing::warn!(destination = %config.destination, "export configured but no sink given; skipped");
                None
            }
            (None, _) => None,
        };

        let diagnostics = Diagnostics::new(
            scenes.len(),
            report,
            (samples.len(), split.train.len(), split.test.len()),
            &forest,
        );

        Ok(PipelineOutcome {
            store,
            composite,
            features,
            classified,
            forest,
            diagnostics,
            export,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.cloud_mask.unusable_codes, vec![3, 8, 9, 10]);
        assert_eq!(config.bands, vec!["B2", "B3", "B4", "B8", "NDVI", "NDWI"]);
        assert_eq!(config.scale, Some(10.0));
        assert_eq!(config.split.train_fraction, 0.7);
        assert_eq!(config.forest.num_trees, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{
            "forest": { "num_trees": 50, "max_features": { "fixed": 3 } },
            "split": { "seed": 7 },
            "overlap_policy": "keep_all",
            "export": { "destination": "lulc_2023" }
        }"#;
        let config = PipelineConfig::from_json_str(json).unwrap();

        assert_eq!(config.forest.num_trees, 50);
        assert_eq!(config.forest.max_features, crate::classification::MaxFeatures::Fixed(3));
        assert_eq!(config.forest.min_samples_leaf, 1);
        assert_eq!(config.split.seed, 7);
        assert_eq!(config.split.train_fraction, 0.7);
        assert_eq!(config.overlap_policy, OverlapPolicy::KeepAll);

        let export = config.export.unwrap();
        assert_eq!(export.scale, 10.0);
        assert_eq!(export.max_pixels, 10_000_000_000_000);
    }

    #[test]
    fn test_rejects_invalid_config() {
        assert!(PipelineConfig::from_json_str(r#"{ "bands": [] }"#).is_err());
        assert!(PipelineConfig::from_json_str(r#"{ "bands": ["B2", "B2"] }"#).is_err());
        assert!(PipelineConfig::from_json_str(r#"{ "split": { "train_fraction": 2.0 } }"#).is_err());
        assert!(PipelineConfig::from_json_str(r#"{ "forest": { "num_trees": 0 } }"#).is_err());
        assert!(PipelineConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"{ "scale": null }"#).unwrap();
        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.scale, None);

        assert!(PipelineConfig::from_json_file(dir.path().join("missing.json")).is_err());
    }
}
