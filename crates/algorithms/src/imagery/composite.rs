//! Temporal median compositing and AOI clipping

use crate::maybe_rayon::*;
use lulc_core::raster::{Raster, RasterImage};
use lulc_core::vector::Region;
use lulc_core::{Error, Result};

/// Median of the values in `values`, reordering the slice.
///
/// Even counts average the two middle values. `None` for an empty slice.
pub fn median(values: &mut [f64]) -> Option<f64> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    values.sort_by(f64::total_cmp);
    Some(if n % 2 == 0 {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    } else {
        values[n / 2]
    })
}

/// Per-pixel median of one band across a stack of rasters
fn median_band(stack: &[&Raster<f64>]) -> Result<Raster<f64>> {
    let template = stack[0];
    let (rows, cols) = template.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            let mut values = Vec::with_capacity(stack.len());
            for (col, out) in row_data.iter_mut().enumerate() {
                values.clear();
                for band in stack {
                    let v = unsafe { band.get_unchecked(row, col) };
                    if !band.is_nodata(v) {
                        values.push(v);
                    }
                }
                if let Some(m) = median(&mut values) {
                    *out = m;
                }
            }
            row_data
        })
        .collect();

    template.with_data(data, Some(f64::NAN))
}

/// Composite a sequence of cloud-masked scenes into one image.
///
/// Every band of the first scene is reduced with a per-pixel median over
/// the observations that are not no-data. Pixels without any valid
/// observation stay no-data. All scenes must share the band set and the
/// grid geometry of the first one.
///
/// Fails with `DataAvailability` when `scenes` is empty or when the
/// result holds no valid pixel at all.
pub fn median_composite(scenes: &[&RasterImage]) -> Result<RasterImage> {
    let Some(first) = scenes.first() else {
        return Err(Error::DataAvailability {
            stage: "composite",
            reason: "no scenes to composite".into(),
        });
    };

    let template = first.template()?;
    let mut composite = RasterImage::new();
    for name in first.band_names() {
        let mut stack = Vec::with_capacity(scenes.len());
        for scene in scenes {
            let band = scene.band(name)?;
            if !band.same_geometry(template) {
                return Err(Error::GeometryMismatch {
                    band: name.to_string(),
                    reason: "scenes in a composite must share one grid".into(),
                });
            }
            stack.push(band);
        }
        composite.add_band(name, median_band(&stack)?)?;
    }

    if composite.bands().all(|(_, band)| band.valid_count() == 0) {
        return Err(Error::DataAvailability {
            stage: "composite",
            reason: format!(
                "all {} scenes are fully masked; composite has no valid pixel",
                scenes.len()
            ),
        });
    }

    Ok(composite)
}

/// Set every band to no-data outside `region`.
///
/// A pixel is kept when its centre lies inside the region.
pub fn clip_to_region(image: &RasterImage, region: &Region) -> Result<RasterImage> {
    let template = image.template()?;
    let (rows, cols) = template.shape();

    let inside: Vec<bool> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| {
                    let (x, y) = template.pixel_to_geo(col, row);
                    region.contains(x, y)
                })
                .collect::<Vec<_>>()
        })
        .collect();

    let mut clipped = RasterImage::new();
    for (name, band) in image.bands() {
        let data: Vec<f64> = band
            .data()
            .iter()
            .zip(&inside)
            .map(|(&v, &keep)| if keep && !band.is_nodata(v) { v } else { f64::NAN })
            .collect();
        clipped.add_band(name, band.with_data(data, Some(f64::NAN))?)?;
    }
    Ok(clipped)
}
