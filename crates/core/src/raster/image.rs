//! Multi-band raster image

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};

/// A stack of named `f64` bands that all share one grid geometry.
///
/// Band order is preserved; it defines the layout of the feature vector
/// read by [`RasterImage::pixel_vector`]. No-data is `NaN`.
#[derive(Debug, Clone, Default)]
pub struct RasterImage {
    bands: Vec<(String, Raster<f64>)>,
}

impl RasterImage {
    pub fn new() -> Self {
        Self { bands: Vec::new() }
    }

    /// Build an image from `(name, band)` pairs
    pub fn from_bands<I, S>(bands: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Raster<f64>)>,
        S: Into<String>,
    {
        let mut image = Self::new();
        for (name, band) in bands {
            image.add_band(name, band)?;
        }
        Ok(image)
    }

    /// Append a band.
    ///
    /// Fails if the name is already taken or the band sits on a
    /// different grid than the bands already present.
    pub fn add_band(&mut self, name: impl Into<String>, band: Raster<f64>) -> Result<()> {
        let name = name.into();
        if self.bands.iter().any(|(n, _)| *n == name) {
            return Err(Error::InvalidParameter {
                name: "band",
                value: name,
                reason: "duplicate band name".into(),
            });
        }
        if let Some((first_name, first)) = self.bands.first() {
            if !first.same_geometry(&band) {
                return Err(Error::GeometryMismatch {
                    band: name,
                    reason: format!(
                        "shape {:?} / transform {:?} differs from band '{}' ({:?} / {:?})",
                        band.shape(),
                        band.transform(),
                        first_name,
                        first.shape(),
                        first.transform()
                    ),
                });
            }
        }
        self.bands.push((name, band));
        Ok(())
    }

    /// Look up a band by name
    pub fn band(&self, name: &str) -> Result<&Raster<f64>> {
        self.bands
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b)
            .ok_or_else(|| Error::MissingBand(name.to_string()))
    }

    pub fn has_band(&self, name: &str) -> bool {
        self.bands.iter().any(|(n, _)| n == name)
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn bands(&self) -> impl Iterator<Item = (&str, &Raster<f64>)> {
        self.bands.iter().map(|(n, b)| (n.as_str(), b))
    }

    pub fn into_bands(self) -> Vec<(String, Raster<f64>)> {
        self.bands
    }

    /// Number of bands
    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Grid dimensions (rows, cols); (0, 0) for an image without bands
    pub fn shape(&self) -> (usize, usize) {
        self.bands.first().map_or((0, 0), |(_, b)| b.shape())
    }

    pub fn transform(&self) -> GeoTransform {
        self.bands
            .first()
            .map_or_else(GeoTransform::default, |(_, b)| *b.transform())
    }

    /// A band-less template of this image's grid, for building derived rasters
    pub fn template(&self) -> Result<&Raster<f64>> {
        self.bands
            .first()
            .map(|(_, b)| b)
            .ok_or_else(|| Error::Algorithm("image has no bands".into()))
    }

    /// New image holding only `names`, in that order
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let mut selected = Self::new();
        for name in names {
            let name = name.as_ref();
            selected.add_band(name, self.band(name)?.clone())?;
        }
        Ok(selected)
    }

    /// Write the band values at (row, col) into `out`, in band order.
    ///
    /// Returns `false` if any band is no-data at that pixel; `out` is then
    /// left partially filled and must not be used.
    pub fn pixel_vector(&self, row: usize, col: usize, out: &mut Vec<f64>) -> bool {
        out.clear();
        for (_, band) in &self.bands {
            let v = band.data()[(row, col)];
            if band.is_nodata(v) {
                return false;
            }
            out.push(v);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(values: Vec<f64>) -> Raster<f64> {
        let mut r = Raster::from_vec(values, 2, 2).unwrap();
        r.set_transform(GeoTransform::new(0.0, 20.0, 10.0, -10.0));
        r
    }

    #[test]
    fn test_add_and_select() {
        let image = RasterImage::from_bands([
            ("B2", band(vec![1.0; 4])),
            ("B3", band(vec![2.0; 4])),
            ("B4", band(vec![3.0; 4])),
        ])
        .unwrap();

        assert_eq!(image.band_names(), vec!["B2", "B3", "B4"]);

        let selected = image.select(&["B4", "B2"]).unwrap();
        assert_eq!(selected.band_names(), vec!["B4", "B2"]);

        let mut v = Vec::new();
        assert!(selected.pixel_vector(0, 0, &mut v));
        assert_eq!(v, vec![3.0, 1.0]);
    }

    #[test]
    fn test_missing_band() {
        let image = RasterImage::from_bands([("B2", band(vec![1.0; 4]))]).unwrap();
        assert!(matches!(image.select(&["B8"]), Err(Error::MissingBand(b)) if b == "B8"));
    }

    #[test]
    fn test_rejects_mismatched_grid() {
        let mut image = RasterImage::from_bands([("B2", band(vec![1.0; 4]))]).unwrap();
        let other = Raster::from_vec(vec![1.0; 9], 3, 3).unwrap();
        assert!(matches!(
            image.add_band("B3", other),
            Err(Error::GeometryMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_name() {
        let mut image = RasterImage::from_bands([("B2", band(vec![1.0; 4]))]).unwrap();
        assert!(image.add_band("B2", band(vec![0.0; 4])).is_err());
    }

    #[test]
    fn test_pixel_vector_nodata() {
        let image = RasterImage::from_bands([
            ("B2", band(vec![1.0, f64::NAN, 1.0, 1.0])),
            ("B3", band(vec![2.0; 4])),
        ])
        .unwrap();
        let mut v = Vec::new();
        assert!(image.pixel_vector(0, 0, &mut v));
        assert!(!image.pixel_vector(0, 1, &mut v));
    }
}
