//! # GCN notice parsing
//!
//! This module turns an incoming VOEvent document into an immutable
//! [`AlertNotice`](crate::notice::AlertNotice): trigger identifier, event time,
//! classification tags and scalar properties.
//!
//! ## Overview
//!
//! - [`voevent`](crate::notice::voevent) – serde model of the VOEvent nodes read by the engine.
//! - [`parser`](crate::notice::parser) – field extractors (`get_trigger`, `get_event_time`,
//!   `get_tags`, `get_properties`, …).
//! - [`NoticeType`](crate::notice::NoticeType) – GCN packet types that drive tag extraction
//!   and skymap source selection.
//!
//! ## Error policy
//!
//! - Optional nodes that are absent are skipped silently.
//! - Present but unparsable values are reported as
//!   [`SkylocError::MalformedValue`](crate::skyloc_errors::SkylocError::MalformedValue).
//! - A missing event time is fatal ([`SkylocError::MissingNode`](crate::skyloc_errors::SkylocError::MissingNode)).

pub mod parser;
pub mod voevent;

use std::collections::BTreeMap;

use hifitime::Epoch;
use serde::Serialize;

use crate::skyloc_errors::SkylocError;
use parser::{get_event_time, get_mission, get_notice_type, get_properties, get_tags, get_trigger};
use voevent::VoEvent;

/// GCN packet types the engine reacts to.
///
/// Values are the `Packet_Type` numbers of the GCN socket protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NoticeType {
    FermiGbmFinPos,
    FermiGbmSubthresh,
    LvcPreliminary,
    LvcInitial,
    LvcUpdate,
    LvcRetraction,
    IcecubeAstrotrackGold,
    IcecubeAstrotrackBronze,
    Other(i32),
}

impl From<i32> for NoticeType {
    fn from(code: i32) -> Self {
        match code {
            115 => NoticeType::FermiGbmFinPos,
            131 => NoticeType::FermiGbmSubthresh,
            150 => NoticeType::LvcPreliminary,
            151 => NoticeType::LvcInitial,
            152 => NoticeType::LvcUpdate,
            164 => NoticeType::LvcRetraction,
            173 => NoticeType::IcecubeAstrotrackGold,
            174 => NoticeType::IcecubeAstrotrackBronze,
            other => NoticeType::Other(other),
        }
    }
}

impl From<NoticeType> for i32 {
    fn from(notice_type: NoticeType) -> Self {
        match notice_type {
            NoticeType::FermiGbmFinPos => 115,
            NoticeType::FermiGbmSubthresh => 131,
            NoticeType::LvcPreliminary => 150,
            NoticeType::LvcInitial => 151,
            NoticeType::LvcUpdate => 152,
            NoticeType::LvcRetraction => 164,
            NoticeType::IcecubeAstrotrackGold => 173,
            NoticeType::IcecubeAstrotrackBronze => 174,
            NoticeType::Other(code) => code,
        }
    }
}

impl NoticeType {
    /// Gravitational-wave alert stream (LIGO/Virgo/KAGRA).
    pub fn is_gravitational_wave(&self) -> bool {
        matches!(
            self,
            NoticeType::LvcPreliminary
                | NoticeType::LvcInitial
                | NoticeType::LvcUpdate
                | NoticeType::LvcRetraction
        )
    }

    /// IceCube gold or bronze track alert.
    pub fn is_neutrino(&self) -> bool {
        matches!(
            self,
            NoticeType::IcecubeAstrotrackGold | NoticeType::IcecubeAstrotrackBronze
        )
    }

    pub fn is_retraction(&self) -> bool {
        matches!(self, NoticeType::LvcRetraction)
    }
}

/// Immutable parsed view of one incoming notice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertNotice {
    pub ivorn: String,
    pub mission: String,
    pub notice_type: Option<NoticeType>,
    pub trigger_id: Option<i64>,
    #[serde(serialize_with = "serialize_epoch")]
    pub event_time: Epoch,
    pub tags: Vec<String>,
    pub properties: BTreeMap<String, f64>,
}

fn serialize_epoch<S: serde::Serializer>(epoch: &Epoch, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(epoch)
}

impl AlertNotice {
    /// Extract every field of the notice from a parsed document.
    ///
    /// Arguments
    /// -----------------
    /// * `voevent`: the parsed VOEvent document.
    ///
    /// Return
    /// ----------
    /// * The notice, or the first fatal extraction error (missing time node,
    ///   malformed trigger, tag source or property value).
    pub fn from_voevent(voevent: &VoEvent) -> Result<Self, SkylocError> {
        Ok(AlertNotice {
            ivorn: voevent.ivorn.clone(),
            mission: get_mission(voevent),
            notice_type: get_notice_type(voevent)?,
            trigger_id: get_trigger(voevent)?,
            event_time: get_event_time(voevent)?,
            tags: get_tags(voevent)?.collect::<Result<Vec<_>, _>>()?,
            properties: get_properties(voevent)?,
        })
    }

    /// Parse an XML document and extract the notice in one step.
    pub fn from_xml(xml: &str) -> Result<Self, SkylocError> {
        Self::from_voevent(&VoEvent::from_xml(xml)?)
    }
}

#[cfg(test)]
mod notice_test {
    use super::*;

    #[test]
    fn test_notice_type_codes() {
        for code in [115, 131, 150, 151, 152, 164, 173, 174, 61] {
            assert_eq!(i32::from(NoticeType::from(code)), code);
        }
        assert_eq!(NoticeType::from(61), NoticeType::Other(61));
        assert!(NoticeType::LvcRetraction.is_gravitational_wave());
        assert!(NoticeType::LvcRetraction.is_retraction());
        assert!(!NoticeType::FermiGbmFinPos.is_neutrino());
    }
}
