//! Scene collections and the query used to filter them
//!
//! The imagery service that actually stores scenes is external; it is
//! reached through [`SceneSource`]. [`InMemoryCollection`] applies the
//! query to scenes that are already loaded.

use chrono::NaiveDate;
use lulc_core::raster::RasterImage;
use lulc_core::vector::Region;
use lulc_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Half-open acquisition date interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end <= start {
            return Err(Error::InvalidParameter {
                name: "date_range",
                value: format!("{} .. {}", start, end),
                reason: "end must be after start".into(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }
}

/// Which scenes to composite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageCollectionQuery {
    pub aoi: Region,
    pub date_range: DateRange,
    /// Scenes at or above this whole-scene cloudy percentage are dropped
    pub max_cloud_percent: f64,
}

/// One acquisition: all its bands plus the scene-level metadata
#[derive(Debug, Clone)]
pub struct Scene {
    pub id: String,
    pub acquired: NaiveDate,
    /// Whole-scene cloudy pixel percentage reported by the provider
    pub cloudy_pixel_percentage: f64,
    pub image: RasterImage,
}

impl Scene {
    /// Map bounds of the scene grid
    pub fn bounds(&self) -> Result<(f64, f64, f64, f64)> {
        Ok(self.image.template()?.bounds())
    }

    /// Whether this scene passes every filter of `query`
    pub fn matches(&self, query: &ImageCollectionQuery) -> Result<bool> {
        Ok(query.date_range.contains(self.acquired)
            && self.cloudy_pixel_percentage < query.max_cloud_percent
            && query.aoi.intersects_bounds(self.bounds()?))
    }
}

/// External provider of raw scenes
pub trait SceneSource {
    /// Scenes matching the query, in acquisition order.
    ///
    /// An empty answer is a `DataAvailability` error, never an empty list.
    fn query(&self, query: &ImageCollectionQuery) -> Result<Vec<Scene>>;
}

/// A fully materialized scene collection
#[derive(Debug, Clone, Default)]
pub struct InMemoryCollection {
    scenes: Vec<Scene>,
}

impl InMemoryCollection {
    pub fn new(scenes: Vec<Scene>) -> Self {
        Self { scenes }
    }

    pub fn push(&mut self, scene: Scene) {
        self.scenes.push(scene);
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

impl SceneSource for InMemoryCollection {
    fn query(&self, query: &ImageCollectionQuery) -> Result<Vec<Scene>> {
        let mut selected = Vec::new();
        for scene in &self.scenes {
            if scene.matches(query)? {
                selected.push(scene.clone());
            } else {
                tracing::debug!(scene = %scene.id, "scene rejected by date/cloud/bounds filter");
            }
        }

        if selected.is_empty() {
            return Err(Error::DataAvailability {
                stage: "scene query",
                reason: format!(
                    "none of {} scenes fall in {}..{} with cloud cover below {}% over the AOI",
                    self.scenes.len(),
                    query.date_range.start,
                    query.date_range.end,
                    query.max_cloud_percent
                ),
            });
        }

        selected.sort_by(|a, b| a.acquired.cmp(&b.acquired).then_with(|| a.id.cmp(&b.id)));
        Ok(selected)
    }
}
