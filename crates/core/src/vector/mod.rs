//! Vector inputs: area of interest and labeled training polygons

use crate::error::{Error, Result};
use geo::{BoundingRect, Contains};
use geo_types::{Coord, LineString, Point, Polygon};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Land-cover classes, numbered by their output class id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LandCoverClass {
    Water = 0,
    Vegetation = 1,
    Built = 2,
    Barren = 3,
}

impl LandCoverClass {
    /// Number of classes
    pub const COUNT: usize = 4;

    /// All classes in class-id order
    pub const ALL: [LandCoverClass; Self::COUNT] = [
        LandCoverClass::Water,
        LandCoverClass::Vegetation,
        LandCoverClass::Built,
        LandCoverClass::Barren,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(usize::from(id)).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            LandCoverClass::Water => "water",
            LandCoverClass::Vegetation => "vegetation",
            LandCoverClass::Built => "built",
            LandCoverClass::Barren => "barren",
        }
    }
}

impl fmt::Display for LandCoverClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.id())
    }
}

/// Build a polygon from an exterior ring of (x, y) vertices.
///
/// The ring is closed automatically; fewer than three distinct vertices
/// is an error.
pub fn polygon_from_vertices(vertices: &[[f64; 2]]) -> Result<Polygon<f64>> {
    let mut coords: Vec<Coord<f64>> = vertices.iter().map(|&[x, y]| Coord { x, y }).collect();
    if coords.len() > 1 && coords.first() == coords.last() {
        coords.pop();
    }
    if coords.len() < 3 {
        return Err(Error::InvalidParameter {
            name: "polygon",
            value: format!("{} vertices", coords.len()),
            reason: "a polygon needs at least 3 vertices".into(),
        });
    }
    if coords.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(Error::InvalidParameter {
            name: "polygon",
            value: format!("{:?}", vertices),
            reason: "non-finite vertex".into(),
        });
    }
    Ok(Polygon::new(LineString::from(coords), vec![]))
}

/// Area of interest.
///
/// Vertices are expressed in the CRS of the rasters they bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<[f64; 2]>", into = "Vec<[f64; 2]>")]
pub struct Region {
    polygon: Polygon<f64>,
}

impl Region {
    pub fn new(vertices: &[[f64; 2]]) -> Result<Self> {
        Ok(Self {
            polygon: polygon_from_vertices(vertices)?,
        })
    }

    /// Axis-aligned rectangle region
    pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self> {
        Self::new(&[[min_x, min_y], [max_x, min_y], [max_x, max_y], [min_x, max_y]])
    }

    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Whether (x, y) lies strictly inside the region
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.polygon.contains(&Point::new(x, y))
    }

    /// Bounding box (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        bounds_of(&self.polygon)
    }

    /// Whether the region's bounding box overlaps the given box
    pub fn intersects_bounds(&self, other: (f64, f64, f64, f64)) -> bool {
        let (min_x, min_y, max_x, max_y) = self.bounds();
        min_x <= other.2 && max_x >= other.0 && min_y <= other.3 && max_y >= other.1
    }
}

impl TryFrom<Vec<[f64; 2]>> for Region {
    type Error = Error;

    fn try_from(vertices: Vec<[f64; 2]>) -> Result<Self> {
        Region::new(&vertices)
    }
}

impl From<Region> for Vec<[f64; 2]> {
    fn from(region: Region) -> Self {
        region.polygon.exterior().coords().map(|c| [c.x, c.y]).collect()
    }
}

pub(crate) fn bounds_of(polygon: &Polygon<f64>) -> (f64, f64, f64, f64) {
    match polygon.bounding_rect() {
        Some(rect) => (rect.min().x, rect.min().y, rect.max().x, rect.max().y),
        None => (f64::NAN, f64::NAN, f64::NAN, f64::NAN),
    }
}

/// One training polygon with its class
#[derive(Debug, Clone, Copy)]
pub struct LabeledPolygon<'a> {
    pub class: LandCoverClass,
    pub polygon: &'a Polygon<f64>,
}

impl LabeledPolygon<'_> {
    /// Whether (x, y) lies strictly inside the polygon
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.polygon.contains(&Point::new(x, y))
    }

    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        bounds_of(self.polygon)
    }
}

/// Training polygons grouped into one collection per class.
///
/// Every polygon belongs to exactly one class. Spatial overlap between
/// collections is not checked here; sampling decides how to treat it.
#[derive(Debug, Clone, Default)]
pub struct LabeledPolygonSet {
    collections: [Vec<Polygon<f64>>; LandCoverClass::COUNT],
}

impl LabeledPolygonSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, class: LandCoverClass, polygon: Polygon<f64>) {
        self.collections[class as usize].push(polygon);
    }

    /// Append a polygon given by its exterior ring
    pub fn push_vertices(&mut self, class: LandCoverClass, vertices: &[[f64; 2]]) -> Result<()> {
        self.push(class, polygon_from_vertices(vertices)?);
        Ok(())
    }

    pub fn polygons(&self, class: LandCoverClass) -> &[Polygon<f64>] {
        &self.collections[class as usize]
    }

    /// All polygons, in class-id order then insertion order
    pub fn iter(&self) -> impl Iterator<Item = LabeledPolygon<'_>> {
        LandCoverClass::ALL.into_iter().flat_map(move |class| {
            self.collections[class as usize]
                .iter()
                .map(move |polygon| LabeledPolygon { class, polygon })
        })
    }

    /// Total number of polygons
    pub fn len(&self) -> usize {
        self.collections.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Serialized form: one list of rings per named class
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LabeledPolygonSetDef {
    #[serde(default)]
    pub water: Vec<Vec<[f64; 2]>>,
    #[serde(default)]
    pub vegetation: Vec<Vec<[f64; 2]>>,
    #[serde(default)]
    pub built: Vec<Vec<[f64; 2]>>,
    #[serde(default)]
    pub barren: Vec<Vec<[f64; 2]>>,
}

impl TryFrom<LabeledPolygonSetDef> for LabeledPolygonSet {
    type Error = Error;

    fn try_from(def: LabeledPolygonSetDef) -> Result<Self> {
        let mut set = LabeledPolygonSet::new();
        let groups = [
            (LandCoverClass::Water, def.water),
            (LandCoverClass::Vegetation, def.vegetation),
            (LandCoverClass::Built, def.built),
            (LandCoverClass::Barren, def.barren),
        ];
        for (class, rings) in groups {
            for ring in rings {
                set.push_vertices(class, &ring)?;
            }
        }
        Ok(set)
    }
}
