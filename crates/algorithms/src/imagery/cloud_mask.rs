//! Scene-classification cloud masking
//!
//! Sentinel-2 L2A scenes carry a categorical scene classification layer
//! (SCL). Pixels whose SCL code is listed as unusable are replaced by
//! no-data in every band of the scene.

use crate::maybe_rayon::*;
use lulc_core::raster::{Raster, RasterImage};
use lulc_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// SCL codes for cloud shadow, medium-probability cloud,
/// high-probability cloud and thin cirrus
pub const DEFAULT_UNUSABLE_SCL: [u16; 4] = [3, 8, 9, 10];

/// Parameters for [`mask_clouds`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudMaskParams {
    /// Name of the scene classification band
    pub band: String,
    /// Classification codes treated as unusable
    pub unusable_codes: Vec<u16>,
}

impl Default for CloudMaskParams {
    fn default() -> Self {
        Self {
            band: "SCL".to_string(),
            unusable_codes: DEFAULT_UNUSABLE_SCL.to_vec(),
        }
    }
}

/// Boolean usability mask: `true` where the observation is usable.
///
/// A no-data classification value counts as unusable.
pub fn usable_mask(scl: &Raster<f64>, unusable_codes: &[u16]) -> Vec<bool> {
    let (rows, cols) = scl.shape();
    (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_mask = vec![false; cols];
            for (col, usable) in row_mask.iter_mut().enumerate() {
                let code = unsafe { scl.get_unchecked(row, col) };
                if scl.is_nodata(code) {
                    continue;
                }
                *usable = !unusable_codes.iter().any(|&u| f64::from(u) == code.round());
            }
            row_mask
        })
        .collect()
}

/// Replace every band value with no-data where the scene classification
/// marks the pixel as cloud, cloud shadow or cirrus.
///
/// The input is left untouched. A scene that is entirely unusable comes
/// back fully masked; compositing tolerates that.
pub fn mask_clouds(image: &RasterImage, params: &CloudMaskParams) -> Result<RasterImage> {
    let scl = image.band(&params.band)?;
    apply_mask(image, &usable_mask(scl, &params.unusable_codes))
}

/// Replace every band value with no-data where `mask` is `false`.
///
/// `mask` is row-major with one entry per pixel, as returned by
/// [`usable_mask`].
pub fn apply_mask(image: &RasterImage, mask: &[bool]) -> Result<RasterImage> {
    let (rows, cols) = image.shape();
    if mask.len() != rows * cols {
        return Err(Error::InvalidParameter {
            name: "mask",
            value: format!("{} entries", mask.len()),
            reason: format!("image has {}x{} pixels", rows, cols),
        });
    }

    let mut masked = RasterImage::new();
    for (name, band) in image.bands() {
        let data: Vec<f64> = band
            .data()
            .iter()
            .zip(mask)
            .map(|(&v, &usable)| if usable && !band.is_nodata(v) { v } else { f64::NAN })
            .collect();
        masked.add_band(name, band.with_data(data, Some(f64::NAN))?)?;
    }
    Ok(masked)
}

/// Fraction of pixels the mask removes, in [0, 1]
pub fn masked_fraction(mask: &[bool]) -> f64 {
    if mask.is_empty() {
        return 0.0;
    }
    mask.iter().filter(|&&usable| !usable).count() as f64 / mask.len() as f64
}
