//! # LULC Core
//!
//! Core types and I/O for supervised land-cover classification.
//!
//! This crate provides:
//! - `Raster<T>`: Generic single-band raster grid
//! - `RasterImage`: Named band stack sharing one grid geometry
//! - `RasterStore`: Arena owning the rasters produced by each stage
//! - `GeoTransform` / `CRS`: Georeferencing
//! - `Region` / `LabeledPolygonSet`: Area of interest and training polygons
//! - Native GeoTIFF I/O

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod vector;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement, RasterId, RasterImage, RasterStore};
pub use vector::{LabeledPolygon, LabeledPolygonSet, LandCoverClass, Region};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement, RasterId, RasterImage, RasterStore};
    pub use crate::vector::{LabeledPolygon, LabeledPolygonSet, LandCoverClass, Region};
}
