//! Export of classified rasters
//!
//! An export request names a target pixel size, a destination and a
//! pixel-count guard. The guard is checked before any resampling or
//! writing; the classified raster is then resampled (nearest neighbour)
//! onto a grid covering the export region and handed to a [`RasterSink`].

use crate::classification::CLASS_NODATA;
use crate::maybe_rayon::*;
use lulc_core::io::write_class_geotiff;
use lulc_core::raster::{GeoTransform, Raster};
use lulc_core::vector::Region;
use lulc_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default pixel-count guard
pub const DEFAULT_MAX_PIXELS: u64 = 10_000_000_000_000;

/// Export settings that come from configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Output pixel size, map units
    #[serde(default = "default_export_scale")]
    pub scale: f64,
    pub destination: String,
    #[serde(default = "default_max_pixels")]
    pub max_pixels: u64,
}

fn default_export_scale() -> f64 {
    10.0
}

fn default_max_pixels() -> u64 {
    DEFAULT_MAX_PIXELS
}

/// A complete export job
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub scale: f64,
    pub destination: String,
    pub max_pixels: u64,
    /// Output extent; pixels outside the polygon are no-data
    pub region: Region,
}

impl ExportRequest {
    pub fn new(config: &ExportConfig, region: Region) -> Self {
        Self {
            scale: config.scale,
            destination: config.destination.clone(),
            max_pixels: config.max_pixels,
            region,
        }
    }

    /// Output grid dimensions `(rows, cols)` over the region's bounding box
    pub fn dimensions(&self) -> Result<(usize, usize)> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(Error::InvalidParameter {
                name: "scale",
                value: self.scale.to_string(),
                reason: "export scale must be positive".into(),
            });
        }
        let (min_x, min_y, max_x, max_y) = self.region.bounds();
        let cols = ((max_x - min_x) / self.scale).ceil() as usize;
        let rows = ((max_y - min_y) / self.scale).ceil() as usize;
        Ok((rows, cols))
    }

    /// Number of output pixels the request would produce
    pub fn pixel_count(&self) -> Result<u64> {
        let (rows, cols) = self.dimensions()?;
        Ok((rows as u64).saturating_mul(cols as u64))
    }

    /// Fail with `ExportTooLarge` if the request exceeds its guard
    pub fn check_size(&self) -> Result<u64> {
        let requested = self.pixel_count()?;
        if requested > self.max_pixels {
            return Err(Error::ExportTooLarge {
                requested,
                max: self.max_pixels,
            });
        }
        Ok(requested)
    }
}

/// Persistence collaborator for classified rasters
pub trait RasterSink {
    fn write(&self, raster: &Raster<u8>, destination: &str) -> Result<()>;
}

/// Writes `<directory>/<destination>.tif`
#[derive(Debug, Clone)]
pub struct GeoTiffSink {
    directory: PathBuf,
}

impl GeoTiffSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn path_for(&self, destination: &str) -> PathBuf {
        let path = self.directory.join(destination);
        if path.extension().is_some() {
            path
        } else {
            path.with_extension("tif")
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl RasterSink for GeoTiffSink {
    fn write(&self, raster: &Raster<u8>, destination: &str) -> Result<()> {
        let path = self.path_for(destination);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_class_geotiff(raster, &path)?;
        tracing::info!(path = %path.display(), "wrote classified raster");
        Ok(())
    }
}

/// What an export produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSummary {
    pub destination: String,
    pub rows: usize,
    pub cols: usize,
    pub pixels: u64,
    pub scale: f64,
}

/// Nearest-neighbour resample of `classified` onto the request's grid.
///
/// The output origin is the top-left corner of the region's bounding box.
/// Output pixels whose centre is outside the region, or falls on no
/// source pixel, are [`CLASS_NODATA`].
pub fn resample_to_request(classified: &Raster<u8>, request: &ExportRequest) -> Result<Raster<u8>> {
    let (rows, cols) = request.dimensions()?;
    let (min_x, _, _, max_y) = request.region.bounds();
    let transform = GeoTransform::new(min_x, max_y, request.scale, -request.scale);
    let src = classified.transform();
    let (src_rows, src_cols) = classified.shape();

    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![CLASS_NODATA; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let (x, y) = transform.pixel_to_geo(col, row);
                if !request.region.contains(x, y) {
                    continue;
                }
                if let Some((r, c)) = src.pixel_index(x, y, src_rows, src_cols) {
                    let v = unsafe { classified.get_unchecked(r, c) };
                    if !classified.is_nodata(v) {
                        *out = v;
                    }
                }
            }
            row_data
        })
        .collect();

    let mut output = Raster::from_vec(data, rows, cols)?;
    output.set_transform(transform);
    output.set_crs(classified.crs().cloned());
    output.set_nodata(Some(CLASS_NODATA));
    Ok(output)
}

/// Check the guard, resample and write.
///
/// Nothing reaches the sink when the guard fails.
pub fn export_classified(
    classified: &Raster<u8>,
    request: &ExportRequest,
    sink: &dyn RasterSink,
) -> Result<ExportSummary> {
    let pixels = request.check_size()?;
    let output = resample_to_request(classified, request)?;
    sink.write(&output, &request.destination)?;

    Ok(ExportSummary {
        destination: request.destination.clone(),
        rows: output.rows(),
        cols: output.cols(),
        pixels,
        scale: request.scale,
    })
}
