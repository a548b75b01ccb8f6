//! Arena of stage outputs

use crate::error::{Error, Result};
use crate::raster::RasterImage;
use std::fmt;

/// Handle to an image owned by a [`RasterStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RasterId(usize);

impl fmt::Display for RasterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "raster#{}", self.0)
    }
}

/// Append-only arena owning the images produced by pipeline stages.
///
/// Each stage inserts its output once and hands the returned id to the
/// next stage, which reads it through a shared reference. Images are
/// never mutated after insertion.
#[derive(Debug, Default)]
pub struct RasterStore {
    images: Vec<(String, RasterImage)>,
}

impl RasterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `image`, labelled with the stage that produced it
    pub fn insert(&mut self, label: impl Into<String>, image: RasterImage) -> RasterId {
        self.images.push((label.into(), image));
        RasterId(self.images.len() - 1)
    }

    pub fn get(&self, id: RasterId) -> Result<&RasterImage> {
        self.images
            .get(id.0)
            .map(|(_, image)| image)
            .ok_or_else(|| Error::Other(format!("unknown {}", id)))
    }

    pub fn label(&self, id: RasterId) -> Option<&str> {
        self.images.get(id.0).map(|(label, _)| label.as_str())
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
