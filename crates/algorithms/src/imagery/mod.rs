//! Imagery preparation
//!
//! Steps that turn a raw scene collection into the feature image:
//! - Scene query: date, cloud-cover and AOI filtering
//! - Cloud mask: SCL-based per-pixel masking
//! - Composite: per-pixel median across scenes, AOI clipping
//! - Indices: NDVI, NDWI

mod cloud_mask;
mod composite;
mod indices;
mod query;

pub use cloud_mask::{
    apply_mask, mask_clouds, masked_fraction, usable_mask, CloudMaskParams,
    DEFAULT_UNUSABLE_SCL,
};
pub use composite::{clip_to_region, median, median_composite};
pub use indices::{append_indices, compute_index, ndvi, ndwi, normalized_difference, SpectralIndex};
pub use query::{DateRange, ImageCollectionQuery, InMemoryCollection, Scene, SceneSource};
