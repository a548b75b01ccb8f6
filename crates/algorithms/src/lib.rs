//! # LULC Algorithms
//!
//! Supervised land-cover classification of multispectral imagery.
//!
//! ## Modules
//!
//! - **imagery**: Scene query, SCL cloud mask, median composite, AOI clip, NDVI/NDWI
//! - **classification**: Sample extraction, train/test split, random forest, accuracy
//! - **export**: Pixel-count guard, nearest-neighbour resampling, raster sinks
//! - **pipeline**: Configuration and the end-to-end run

pub mod classification;
pub mod export;
pub mod imagery;
pub mod pipeline;

pub(crate) mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classification::{
        assess, extract_samples, split_samples, AccuracyReport, Classifier, ConfusionMatrix,
        MaxFeatures, OverlapPolicy, RandomForest, RandomForestParams, SampleRecord, SampleSet,
        SamplingParams, SplitParams, TrainTestSplit, CLASS_NODATA,
    };
    pub use crate::export::{
        export_classified, ExportConfig, ExportRequest, ExportSummary, GeoTiffSink, RasterSink,
    };
    pub use crate::imagery::{
        append_indices, clip_to_region, mask_clouds, median_composite, ndvi, ndwi,
        normalized_difference, CloudMaskParams, DateRange, ImageCollectionQuery,
        InMemoryCollection, Scene, SceneSource, SpectralIndex,
    };
    pub use crate::pipeline::{Diagnostics, Pipeline, PipelineConfig, PipelineOutcome};
    pub use lulc_core::prelude::*;
}
