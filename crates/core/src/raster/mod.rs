//! Raster data structures

mod element;
mod geotransform;
mod grid;
mod image;
mod store;

pub use element::RasterElement;
pub use geotransform::GeoTransform;
pub use grid::Raster;
pub use image::RasterImage;
pub use store::{RasterId, RasterStore};
