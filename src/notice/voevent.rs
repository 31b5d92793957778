//! Serde model of the subset of the VOEvent 2.0 schema read by the notice parser.
//!
//! Only the nodes the engine consumes are modelled; every other element or
//! attribute is ignored by the deserializer. Namespace prefixes on element names
//! (e.g. `voe:VOEvent`) are ignored as well.
//!
//! ```text
//! VOEvent @ivorn @role
//! ├── What
//! │   ├── Param @name @value          (repeated)
//! │   └── Group @name @type           (repeated, may nest)
//! │       └── Param @name @value
//! ├── WhereWhen
//! │   └── ObsDataLocation
//! │       └── ObservationLocation
//! │           └── AstroCoords @coord_system_id
//! │               ├── Time/TimeInstant/ISOTime
//! │               └── Position2D
//! │                   ├── Value2/{C1, C2}
//! │                   └── Error2Radius
//! └── Why
//!     └── Inference
//!         └── Concept
//! ```

use quick_xml::de::from_str;
use serde::Deserialize;

use crate::skyloc_errors::SkylocError;

/// Coordinate system of the node that carries the event time.
pub const UTC_FK5_GEO: &str = "UTC-FK5-GEO";

#[derive(Debug, Clone, Deserialize)]
pub struct VoEvent {
    #[serde(rename = "@ivorn")]
    pub ivorn: String,

    #[serde(rename = "@role", default)]
    pub role: Option<String>,

    #[serde(rename = "What", default)]
    pub what: Option<What>,

    #[serde(rename = "WhereWhen", default)]
    pub where_when: Option<WhereWhen>,

    #[serde(rename = "Why", default)]
    pub why: Option<Why>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct What {
    #[serde(rename = "Param", default)]
    pub params: Vec<Param>,

    #[serde(rename = "Group", default)]
    pub groups: Vec<Group>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Group {
    #[serde(rename = "@name", default)]
    pub name: Option<String>,

    #[serde(rename = "@type", default)]
    pub group_type: Option<String>,

    #[serde(rename = "Param", default)]
    pub params: Vec<Param>,

    #[serde(rename = "Group", default)]
    pub groups: Vec<Group>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Param {
    #[serde(rename = "@name")]
    pub name: String,

    #[serde(rename = "@value", default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WhereWhen {
    #[serde(rename = "ObsDataLocation", default)]
    pub obs_data_location: Option<ObsDataLocation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObsDataLocation {
    #[serde(rename = "ObservationLocation", default)]
    pub observation_location: Option<ObservationLocation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObservationLocation {
    #[serde(rename = "AstroCoords", default)]
    pub astro_coords: Vec<AstroCoords>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AstroCoords {
    #[serde(rename = "@coord_system_id", default)]
    pub coord_system_id: Option<String>,

    #[serde(rename = "Time", default)]
    pub time: Option<Time>,

    #[serde(rename = "Position2D", default)]
    pub position_2d: Option<Position2D>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Time {
    #[serde(rename = "TimeInstant", default)]
    pub time_instant: Option<TimeInstant>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeInstant {
    #[serde(rename = "ISOTime", default)]
    pub iso_time: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Position2D {
    #[serde(rename = "Value2", default)]
    pub value2: Option<Value2>,

    #[serde(rename = "Error2Radius", default)]
    pub error2_radius: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Value2 {
    #[serde(rename = "C1", default)]
    pub c1: Option<String>,

    #[serde(rename = "C2", default)]
    pub c2: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Why {
    #[serde(rename = "Inference", default)]
    pub inferences: Vec<Inference>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Inference {
    #[serde(rename = "Concept", default)]
    pub concepts: Vec<String>,
}

impl VoEvent {
    /// Parse a VOEvent XML document.
    ///
    /// Arguments
    /// -----------------
    /// * `xml`: the full document text.
    ///
    /// Return
    /// ----------
    /// * The parsed document or a [`SkylocError::XmlError`].
    pub fn from_xml(xml: &str) -> Result<Self, SkylocError> {
        Ok(from_str(xml)?)
    }

    /// Top-level `What/Param` nodes, in document order.
    pub fn top_params(&self) -> impl Iterator<Item = &Param> {
        self.what.iter().flat_map(|w| w.params.iter())
    }

    /// Every `Param` node of the document: top-level ones first, then the
    /// content of each group, depth first.
    pub fn all_params(&self) -> Vec<&Param> {
        fn collect<'a>(groups: &'a [Group], out: &mut Vec<&'a Param>) {
            for group in groups {
                out.extend(group.params.iter());
                collect(&group.groups, out);
            }
        }

        let mut out: Vec<&Param> = self.top_params().collect();
        if let Some(what) = &self.what {
            collect(&what.groups, &mut out);
        }
        out
    }

    /// First `Param` named `name` anywhere in the document (the `.//Param[@name=...]` lookup).
    pub fn find_param(&self, name: &str) -> Option<&Param> {
        self.all_params().into_iter().find(|p| p.name == name)
    }

    /// Top-level `What/Param` named `name`.
    pub fn find_top_param(&self, name: &str) -> Option<&Param> {
        self.top_params().find(|p| p.name == name)
    }

    /// First top-level `What/Group` whose `type` attribute equals `group_type`.
    pub fn find_group(&self, group_type: &str) -> Option<&Group> {
        self.what
            .iter()
            .flat_map(|w| w.groups.iter())
            .find(|g| g.group_type.as_deref() == Some(group_type))
    }

    /// `AstroCoords` nodes under `WhereWhen/ObsDataLocation/ObservationLocation`.
    pub fn astro_coords(&self) -> impl Iterator<Item = &AstroCoords> {
        self.where_when
            .iter()
            .filter_map(|ww| ww.obs_data_location.as_ref())
            .filter_map(|odl| odl.observation_location.as_ref())
            .flat_map(|ol| ol.astro_coords.iter())
    }

    /// First `Why/Inference/Concept` text.
    pub fn concept(&self) -> Option<&str> {
        self.why
            .iter()
            .flat_map(|why| why.inferences.iter())
            .flat_map(|inf| inf.concepts.iter())
            .map(|c| c.trim())
            .next()
    }
}
