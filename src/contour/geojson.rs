//! GeoJSON model of the contour artifact.
//!
//! ```json
//! {"type": "FeatureCollection", "features": [
//!   {"type": "Feature", "geometry": {"type": "Point", "coordinates": [ra, dec]},
//!    "properties": {"credible_level": 0}},
//!   {"type": "Feature", "geometry": {"type": "MultiLineString", "coordinates": [[[ra, dec], ...]]},
//!    "properties": {"credible_level": 90}}
//! ]}
//! ```

use serde::{Deserialize, Serialize};

use crate::constants::Degree;

/// `[longitude, latitude]` in degrees.
pub type Position = [Degree; 2];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "FeatureCollection")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Feature")]
pub struct Feature {
    pub geometry: Geometry,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    MultiLineString(Vec<Vec<Position>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Properties {
    pub credible_level: u32,
}

impl Feature {
    /// Maximum a posteriori position, tagged with credible level 0.
    pub fn point(position: Position) -> Self {
        Feature {
            geometry: Geometry::Point(position),
            properties: Properties { credible_level: 0 },
        }
    }

    pub fn contour(credible_level: u32, paths: Vec<Vec<Position>>) -> Self {
        Feature {
            geometry: Geometry::MultiLineString(paths),
            properties: Properties { credible_level },
        }
    }
}

impl FeatureCollection {
    /// Position of the credible-level-0 point feature.
    pub fn posterior_max(&self) -> Option<Position> {
        self.features.iter().find_map(|f| match f.geometry {
            Geometry::Point(p) if f.properties.credible_level == 0 => Some(p),
            _ => None,
        })
    }

    /// Paths of the contour drawn at `credible_level`.
    pub fn paths(&self, credible_level: u32) -> Option<&[Vec<Position>]> {
        self.features.iter().find_map(|f| match &f.geometry {
            Geometry::MultiLineString(paths) if f.properties.credible_level == credible_level => {
                Some(paths.as_slice())
            }
            _ => None,
        })
    }
}
