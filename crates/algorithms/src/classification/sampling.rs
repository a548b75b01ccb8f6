//! Training sample extraction from labeled polygons
//!
//! Every pixel centre strictly inside a labeled polygon yields one
//! [`SampleRecord`] holding the pixel's band vector and the polygon's
//! class. Pixels with no-data in any band are skipped.

use crate::maybe_rayon::*;
use lulc_core::raster::{GeoTransform, RasterImage};
use lulc_core::vector::{LabeledPolygon, LabeledPolygonSet, LandCoverClass};
use lulc_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where a sample was taken
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleLocation {
    /// Row on the sampling grid
    pub row: usize,
    /// Column on the sampling grid
    pub col: usize,
    /// Pixel centre, map units
    pub x: f64,
    pub y: f64,
}

/// One labeled feature vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    /// Band values in schema order
    pub features: Vec<f64>,
    /// Class id
    pub label: u8,
    /// Random key in [0, 1) used for the train/test split
    pub split_key: Option<f64>,
    pub location: SampleLocation,
}

/// A collection of sample records sharing one feature schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SampleSetDef")]
pub struct SampleSet {
    schema: Vec<String>,
    records: Vec<SampleRecord>,
}

/// Unchecked serialized form of [`SampleSet`]
#[derive(Deserialize)]
struct SampleSetDef {
    schema: Vec<String>,
    records: Vec<SampleRecord>,
}

impl TryFrom<SampleSetDef> for SampleSet {
    type Error = Error;

    fn try_from(def: SampleSetDef) -> Result<Self> {
        Self::from_records(def.schema, def.records)
    }
}

impl SampleSet {
    pub fn new(schema: Vec<String>) -> Self {
        Self {
            schema,
            records: Vec::new(),
        }
    }

    /// Build a set, checking every record against the schema length
    pub fn from_records(schema: Vec<String>, records: Vec<SampleRecord>) -> Result<Self> {
        let mut set = Self::new(schema);
        for record in records {
            set.push(record)?;
        }
        Ok(set)
    }

    pub fn push(&mut self, record: SampleRecord) -> Result<()> {
        if record.features.len() != self.schema.len() {
            return Err(Error::SchemaMismatch {
                expected: format!("{} features {:?}", self.schema.len(), self.schema),
                actual: format!("{} features", record.features.len()),
                context: "sample record",
            });
        }
        self.records.push(record);
        Ok(())
    }

    pub fn schema(&self) -> &[String] {
        &self.schema
    }

    pub fn records(&self) -> &[SampleRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<SampleRecord> {
        self.records
    }

    pub fn labels(&self) -> Vec<u8> {
        self.records.iter().map(|r| r.label).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records per class id `0..num_classes`.
    ///
    /// Labels outside that range are not counted.
    pub fn class_counts(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0; num_classes];
        for record in &self.records {
            if let Some(c) = counts.get_mut(usize::from(record.label)) {
                *c += 1;
            }
        }
        counts
    }
}

/// What to do when polygons of different classes cover the same pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Fail the extraction, naming the pixel and the classes involved
    #[default]
    Reject,
    /// Emit one record per covering polygon
    KeepAll,
}

/// Parameters for [`extract_samples`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    /// Bands to read, in feature order
    pub bands: Vec<String>,
    /// Sampling pixel size in map units; `None` samples the native grid.
    ///
    /// Any other size reads the native pixel under each sampling-grid
    /// centre (nearest neighbour, no interpolation).
    pub scale: Option<f64>,
    pub overlap_policy: OverlapPolicy,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            bands: default_feature_bands(),
            scale: None,
            overlap_policy: OverlapPolicy::Reject,
        }
    }
}

/// Reflectance bands plus the two indices
pub fn default_feature_bands() -> Vec<String> {
    ["B2", "B3", "B4", "B8", "NDVI", "NDWI"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Sampling grid laid over the source raster
struct SamplingGrid {
    transform: GeoTransform,
    rows: usize,
    cols: usize,
    src_rows: usize,
    src_cols: usize,
    src_transform: GeoTransform,
}

impl SamplingGrid {
    fn new(image: &RasterImage, scale: Option<f64>) -> Result<Self> {
        let src_transform = image.transform();
        let (src_rows, src_cols) = image.shape();
        let native = src_transform.cell_size();

        let scale = match scale {
            Some(s) if !(s.is_finite() && s > 0.0) => {
                return Err(Error::InvalidParameter {
                    name: "scale",
                    value: s.to_string(),
                    reason: "sampling scale must be positive".into(),
                })
            }
            Some(s) if (s - native).abs() > native * 1e-9 => s,
            _ => {
                return Ok(Self {
                    transform: src_transform,
                    rows: src_rows,
                    cols: src_cols,
                    src_rows,
                    src_cols,
                    src_transform,
                })
            }
        };

        let (min_x, min_y, max_x, max_y) = src_transform.bounds(src_cols, src_rows);
        Ok(Self {
            transform: src_transform.with_pixel_size(scale),
            rows: ((max_y - min_y) / scale).ceil() as usize,
            cols: ((max_x - min_x) / scale).ceil() as usize,
            src_rows,
            src_cols,
            src_transform,
        })
    }

    /// Sampling-grid cells whose extent may touch the given bounds
    fn window(&self, bounds: (f64, f64, f64, f64)) -> Option<(usize, usize, usize, usize)> {
        let (min_x, min_y, max_x, max_y) = bounds;
        let corners = [(min_x, min_y), (min_x, max_y), (max_x, min_y), (max_x, max_y)];
        let (mut c0, mut r0, mut c1, mut r1) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for (x, y) in corners {
            let (c, r) = self.transform.geo_to_pixel(x, y);
            c0 = c0.min(c);
            r0 = r0.min(r);
            c1 = c1.max(c);
            r1 = r1.max(r);
        }
        if !(c0.is_finite() && r0.is_finite() && c1.is_finite() && r1.is_finite()) {
            return None;
        }
        if c1 < 0.0 || r1 < 0.0 || c0 >= self.cols as f64 || r0 >= self.rows as f64 {
            return None;
        }
        let row_start = r0.floor().max(0.0) as usize;
        let col_start = c0.floor().max(0.0) as usize;
        let row_end = (r1.floor() as usize).min(self.rows.saturating_sub(1));
        let col_end = (c1.floor() as usize).min(self.cols.saturating_sub(1));
        Some((row_start, col_start, row_end, col_end))
    }

    /// Native pixel under a sampling-grid centre
    fn source_pixel(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        self.src_transform.pixel_index(x, y, self.src_rows, self.src_cols)
    }
}

fn samples_in_polygon(
    image: &RasterImage,
    grid: &SamplingGrid,
    polygon: LabeledPolygon<'_>,
) -> Vec<SampleRecord> {
    let mut records = Vec::new();
    let Some((row_start, col_start, row_end, col_end)) = grid.window(polygon.bounds()) else {
        return records;
    };

    let mut features = Vec::with_capacity(image.len());
    for row in row_start..=row_end {
        for col in col_start..=col_end {
            let (x, y) = grid.transform.pixel_to_geo(col, row);
            if !polygon.contains(x, y) {
                continue;
            }
            let Some((src_row, src_col)) = grid.source_pixel(x, y) else {
                continue;
            };
            if !image.pixel_vector(src_row, src_col, &mut features) {
                continue;
            }
            records.push(SampleRecord {
                features: features.clone(),
                label: polygon.class.id(),
                split_key: None,
                location: SampleLocation { row, col, x, y },
            });
        }
    }
    records
}

fn check_overlaps(records: &[SampleRecord]) -> Result<()> {
    let mut seen: HashMap<(usize, usize), u8> = HashMap::new();
    for record in records {
        let key = (record.location.row, record.location.col);
        match seen.get(&key) {
            Some(&class) if class != record.label => {
                return Err(Error::InvalidParameter {
                    name: "labeled polygons",
                    value: format!("pixel ({}, {})", key.0, key.1),
                    reason: format!(
                        "covered by polygons of classes {} and {}",
                        describe(class),
                        describe(record.label)
                    ),
                });
            }
            Some(_) => {}
            None => {
                seen.insert(key, record.label);
            }
        }
    }
    Ok(())
}

fn describe(label: u8) -> String {
    LandCoverClass::from_id(label).map_or_else(|| label.to_string(), |c| c.to_string())
}

/// Extract one sample per (polygon, pixel centre inside the polygon).
///
/// Records come out in class order, then polygon order, then row-major
/// pixel order, so the result is identical across runs and thread counts.
pub fn extract_samples(
    image: &RasterImage,
    polygons: &LabeledPolygonSet,
    params: &SamplingParams,
) -> Result<SampleSet> {
    let selected = image.select(&params.bands)?;
    let grid = SamplingGrid::new(&selected, params.scale)?;

    let labeled: Vec<LabeledPolygon<'_>> = polygons.iter().collect();
    let per_polygon: Vec<Vec<SampleRecord>> = labeled
        .into_par_iter()
        .map(|polygon| samples_in_polygon(&selected, &grid, polygon))
        .collect();
    let records: Vec<SampleRecord> = per_polygon.into_iter().flatten().collect();

    if params.overlap_policy == OverlapPolicy::Reject {
        check_overlaps(&records)?;
    }

    tracing::debug!(
        polygons = polygons.len(),
        samples = records.len(),
        "extracted training samples"
    );

    SampleSet::from_records(params.bands.clone(), records)
}
