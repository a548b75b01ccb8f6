//! Normalized-difference spectral indices
//!
//! NDVI and NDWI are derived from the composite's reflectance bands and
//! appended to it as extra feature bands.

use crate::maybe_rayon::*;
use lulc_core::raster::{Raster, RasterImage};
use lulc_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Spectral indices that can be appended to a composite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpectralIndex {
    /// Normalized Difference Vegetation Index, (NIR - Red) / (NIR + Red)
    Ndvi,
    /// Normalized Difference Water Index (McFeeters), (Green - NIR) / (Green + NIR)
    Ndwi,
}

impl SpectralIndex {
    /// Band name the index is stored under
    pub fn band_name(self) -> &'static str {
        match self {
            SpectralIndex::Ndvi => "NDVI",
            SpectralIndex::Ndwi => "NDWI",
        }
    }

    /// Sentinel-2 bands (positive, negative) of the normalized difference
    pub fn source_bands(self) -> (&'static str, &'static str) {
        match self {
            SpectralIndex::Ndvi => ("B8", "B4"),
            SpectralIndex::Ndwi => ("B3", "B8"),
        }
    }
}

/// Compute `(band_a - band_b) / (band_a + band_b)`.
///
/// Pixels where either band is no-data or the denominator is zero become
/// no-data (`NaN`). Results are clamped to [-1, 1], which only bites for
/// negative reflectance values.
pub fn normalized_difference(band_a: &Raster<f64>, band_b: &Raster<f64>) -> Result<Raster<f64>> {
    if !band_a.same_geometry(band_b) {
        return Err(Error::SizeMismatch {
            er: band_a.rows(),
            ec: band_a.cols(),
            ar: band_b.rows(),
            ac: band_b.cols(),
        });
    }

    let (rows, cols) = band_a.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let a = unsafe { band_a.get_unchecked(row, col) };
                let b = unsafe { band_b.get_unchecked(row, col) };

                if band_a.is_nodata(a) || band_b.is_nodata(b) {
                    continue;
                }

                let sum = a + b;
                if sum == 0.0 {
                    continue;
                }

                *out = ((a - b) / sum).clamp(-1.0, 1.0);
            }
            row_data
        })
        .collect();

    band_a.with_data(data, Some(f64::NAN))
}

/// NDVI = (NIR - Red) / (NIR + Red)
pub fn ndvi(nir: &Raster<f64>, red: &Raster<f64>) -> Result<Raster<f64>> {
    normalized_difference(nir, red)
}

/// NDWI = (Green - NIR) / (Green + NIR)
pub fn ndwi(green: &Raster<f64>, nir: &Raster<f64>) -> Result<Raster<f64>> {
    normalized_difference(green, nir)
}

/// Compute one index from the matching bands of `image`
pub fn compute_index(image: &RasterImage, index: SpectralIndex) -> Result<Raster<f64>> {
    let (a, b) = index.source_bands();
    normalized_difference(image.band(a)?, image.band(b)?)
}

/// Copy of `image` with `indices` appended as extra bands, in order
pub fn append_indices(image: &RasterImage, indices: &[SpectralIndex]) -> Result<RasterImage> {
    let mut out = image.clone();
    for &index in indices {
        out.add_band(index.band_name(), compute_index(image, index)?)?;
    }
    Ok(out)
}
