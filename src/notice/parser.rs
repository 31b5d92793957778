//! Field extractors for GCN VOEvent notices.
//!
//! Every extractor is a pure function of the parsed [`VoEvent`]; absent optional
//! nodes yield `None` / are skipped, present but unparsable values yield
//! [`SkylocError::MalformedValue`].

use std::{collections::BTreeMap, collections::VecDeque, sync::LazyLock};

use hifitime::Epoch;
use ordered_float::NotNan;
use regex::Regex;

use crate::{
    notice::{
        voevent::{Param, VoEvent, UTC_FK5_GEO},
        NoticeType,
    },
    skyloc_errors::SkylocError,
    time::iso_to_epoch_rounded,
};

/// Numeric parameters collected by [`get_properties`].
pub const PROPERTY_NAMES: [&str; 24] = [
    // gravitational waves
    "HasNS",
    "HasRemnant",
    "FAR",
    "BNS",
    "NSBH",
    "BBH",
    "MassGap",
    "Terrestrial",
    // GRBs
    "Burst_Signif",
    "Data_Signif",
    "Det_Signif",
    "Image_Signif",
    "Rate_Signif",
    "Trig_Signif",
    "Burst_Inten",
    "Burst_Peak",
    "Data_Timescale",
    "Data_Integ",
    "Integ_Time",
    "Trig_Timescale",
    "Trig_Dur",
    "Hardness_Ratio",
    // neutrinos
    "signalness",
    "energy",
];

const GRB_CONCEPT: &str = "process.variation.burst;em.gamma";
const TRANSIENT_CONCEPT: &str = "process.variation.trans;em.gamma";

static URI_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z][A-Za-z0-9+.\-]*:)?(?://[^/?#]*)?([^?#]*)")
        .expect("URI path regex is valid")
});

/// Path component of a URI, without its leading slashes.
pub(crate) fn uri_path(uri: &str) -> &str {
    URI_PATH
        .captures(uri)
        .and_then(|c| c.get(1))
        .map_or("", |m| m.as_str())
        .trim_start_matches('/')
}

fn parse_value<T: std::str::FromStr>(param: &Param) -> Result<Option<T>, SkylocError> {
    param
        .value
        .as_deref()
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|_| SkylocError::malformed(param.name.as_str(), v))
        })
        .transpose()
}

/// Stream name of the notice: the `ivorn` path without its leading slash
/// (`ivo://nasa.gsfc.gcn/AMON#ICECUBE_...` → `AMON`).
pub fn get_mission(voevent: &VoEvent) -> String {
    uri_path(&voevent.ivorn).to_string()
}

/// GCN packet type from the `Packet_Type` parameter, if present.
pub fn get_notice_type(voevent: &VoEvent) -> Result<Option<NoticeType>, SkylocError> {
    match voevent.find_param("Packet_Type") {
        Some(param) => Ok(parse_value::<i32>(param)?.map(NoticeType::from)),
        None => Ok(None),
    }
}

/// Trigger identifier from the `TrigID` parameter.
///
/// Return
/// ----------
/// * `Ok(None)` when the parameter or its value is absent, the integer otherwise.
pub fn get_trigger(voevent: &VoEvent) -> Result<Option<i64>, SkylocError> {
    match voevent.find_param("TrigID") {
        Some(param) => parse_value::<i64>(param),
        None => Ok(None),
    }
}

/// UTC event time, rounded to the nearest second.
///
/// The time is read from
/// `WhereWhen/ObsDataLocation/ObservationLocation/AstroCoords[@coord_system_id='UTC-FK5-GEO']/Time/TimeInstant/ISOTime`.
///
/// Return
/// ----------
/// * The epoch, [`SkylocError::MissingNode`] when the node is absent.
pub fn get_event_time(voevent: &VoEvent) -> Result<Epoch, SkylocError> {
    let iso = voevent
        .astro_coords()
        .filter(|c| c.coord_system_id.as_deref() == Some(UTC_FK5_GEO))
        .filter_map(|c| c.time.as_ref())
        .filter_map(|t| t.time_instant.as_ref())
        .find_map(|t| t.iso_time.as_deref())
        .ok_or_else(|| SkylocError::MissingNode("ISOTime".into()))?;
    iso_to_epoch_rounded("ISOTime", iso)
}

/// Numeric properties of the allow-list [`PROPERTY_NAMES`] present in the notice.
pub fn get_properties(voevent: &VoEvent) -> Result<BTreeMap<String, f64>, SkylocError> {
    let mut properties = BTreeMap::new();
    for name in PROPERTY_NAMES {
        let Some(param) = voevent.find_param(name) else {
            continue;
        };
        if let Some(value) = parse_value::<f64>(param)? {
            properties.insert(name.to_string(), value);
        }
    }
    Ok(properties)
}

/// Classification tags of the notice, in extraction priority order.
///
/// The returned iterator is lazy: each step of the extraction is evaluated only
/// when the tags it produces are requested. Call `get_tags` again (or clone the
/// iterator before consuming it) to restart the sequence.
pub fn get_tags(voevent: &VoEvent) -> Result<Tags<'_>, SkylocError> {
    Ok(Tags {
        voevent,
        notice_type: get_notice_type(voevent)?,
        step: TagStep::Mission,
        pending: VecDeque::new(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagStep {
    Mission,
    Concept,
    NoticeKind,
    Retraction,
    LongShort,
    DurationClass,
    Classification,
    Search,
    Instruments,
    Done,
}

impl TagStep {
    fn next(self) -> Self {
        match self {
            TagStep::Mission => TagStep::Concept,
            TagStep::Concept => TagStep::NoticeKind,
            TagStep::NoticeKind => TagStep::Retraction,
            TagStep::Retraction => TagStep::LongShort,
            TagStep::LongShort => TagStep::DurationClass,
            TagStep::DurationClass => TagStep::Classification,
            TagStep::Classification => TagStep::Search,
            TagStep::Search => TagStep::Instruments,
            TagStep::Instruments | TagStep::Done => TagStep::Done,
        }
    }
}

/// Lazy iterator over the classification tags of a notice.
///
/// Produced by [`get_tags`]. Yields `Err` once, then stops, if a classification
/// score cannot be parsed.
#[derive(Debug, Clone)]
pub struct Tags<'a> {
    voevent: &'a VoEvent,
    notice_type: Option<NoticeType>,
    step: TagStep,
    pending: VecDeque<String>,
}

fn param_value<'a>(voevent: &'a VoEvent, name: &str) -> Option<&'a str> {
    voevent.find_param(name).and_then(|p| p.value.as_deref())
}

impl Tags<'_> {
    fn evaluate(&mut self, step: TagStep) -> Result<(), SkylocError> {
        let voevent = self.voevent;
        match step {
            TagStep::Mission => {
                let mission = get_mission(voevent);
                if !mission.is_empty() {
                    self.pending.push_back(mission);
                }
            }
            TagStep::Concept => match voevent.concept() {
                Some(GRB_CONCEPT) => {
                    let not_grb = param_value(voevent, "GRB_Identified") == Some("false");
                    self.pending
                        .push_back(if not_grb { "Not GRB" } else { "GRB" }.to_string());
                }
                Some(TRANSIENT_CONCEPT) => self.pending.push_back("transient".to_string()),
                _ => {}
            },
            TagStep::NoticeKind => match self.notice_type {
                Some(nt) if nt.is_gravitational_wave() => {
                    self.pending.push_back("GW".to_string());
                }
                Some(nt) if nt.is_neutrino() => {
                    self.pending.push_back("Neutrino".to_string());
                    self.pending.push_back("IceCube".to_string());
                    self.pending.push_back(
                        if nt == NoticeType::IcecubeAstrotrackGold {
                            "Gold"
                        } else {
                            "Bronze"
                        }
                        .to_string(),
                    );
                }
                _ => {}
            },
            TagStep::Retraction => {
                if self.notice_type.is_some_and(|nt| nt.is_retraction()) {
                    self.pending.push_back("retracted".to_string());
                }
            }
            TagStep::LongShort | TagStep::DurationClass => {
                let name = if step == TagStep::LongShort {
                    "Long_short"
                } else {
                    "Duration_class"
                };
                if let Some(value) = param_value(voevent, name) {
                    let value = value.trim().to_lowercase();
                    if value != "unknown" {
                        self.pending.push_back(value);
                    }
                }
            }
            TagStep::Classification => {
                if let Some(label) = self.top_classification()? {
                    self.pending.push_back(label);
                }
            }
            TagStep::Search => {
                if let Some(search) = voevent
                    .find_top_param("Search")
                    .and_then(|p| p.value.as_deref())
                {
                    self.pending.push_back(search.to_string());
                }
            }
            TagStep::Instruments => {
                if let Some(instruments) = param_value(voevent, "Instruments") {
                    self.pending.extend(
                        instruments
                            .split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(str::to_string),
                    );
                }
            }
            TagStep::Done => {}
        }
        Ok(())
    }

    /// Highest-scoring label of the `What/Group[@type='Classification']` parameters.
    ///
    /// Ties on the score go to the lexicographically greatest label.
    fn top_classification(&self) -> Result<Option<String>, SkylocError> {
        let Some(group) = self.voevent.find_group("Classification") else {
            return Ok(None);
        };

        let mut scored = Vec::with_capacity(group.params.len());
        for param in &group.params {
            let raw = param.value.as_deref().unwrap_or_default();
            let score = parse_value::<f64>(param)?
                .and_then(|s| NotNan::new(s).ok())
                .ok_or_else(|| SkylocError::malformed(param.name.as_str(), raw))?;
            scored.push((score, param.name.as_str()));
        }

        Ok(scored.into_iter().max().map(|(_, name)| name.to_string()))
    }
}

impl Iterator for Tags<'_> {
    type Item = Result<String, SkylocError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(tag) = self.pending.pop_front() {
                return Some(Ok(tag));
            }
            if self.step == TagStep::Done {
                return None;
            }
            let step = self.step;
            self.step = step.next();
            if let Err(err) = self.evaluate(step) {
                self.step = TagStep::Done;
                self.pending.clear();
                return Some(Err(err));
            }
        }
    }
}
