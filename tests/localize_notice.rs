use std::sync::Arc;

use approx::assert_relative_eq;
use hifitime::Epoch;
use skyloc::{
    config::SkylocConfig,
    constants::chi2dof_ppf,
    notice::{voevent::VoEvent, NoticeType},
    skyloc::Skyloc,
    skyloc_errors::{SkylocError, Stage},
};

mod common;
use common::{assert_canonical, max_center_distance, voevent_xml};

fn skyloc() -> Skyloc {
    Skyloc::new(SkylocConfig {
        contour_max_grid: 512,
        ..SkylocConfig::default()
    })
}

#[test]
fn cone_notice_end_to_end() {
    let xml = voevent_xml(
        "ivo://nasa.gsfc.gcn/SWIFT#BAT_GRB_Pos_1013527-000",
        r#"<Param name="Packet_Type" value="61" />
           <Param name="TrigID" value="1013527" />"#,
        Some((10.0, -20.0, 1.0)),
    );
    let voevent = VoEvent::from_xml(&xml).unwrap();
    let skyloc = skyloc();

    let notice = skyloc.parse_notice(&voevent).unwrap();
    assert_eq!(notice.mission, "SWIFT");
    assert_eq!(notice.notice_type, Some(NoticeType::Other(61)));
    assert_eq!(notice.trigger_id, Some(1013527));
    assert_eq!(
        notice.event_time,
        Epoch::from_gregorian_utc_hms(2021, 1, 1, 12, 34, 56)
    );

    let skymap = skyloc.get_skymap(&voevent).unwrap().unwrap();
    assert_eq!(skymap.localization_name, "10.00000_-20.00000_1.00000");
    assert_canonical(&skymap);
    assert!(max_center_distance(&skymap, 10.0, -20.0) <= 4.0);

    let localization = skyloc.localize(&voevent).unwrap().unwrap();
    assert_eq!(localization.skymap, skymap);
    let contour = localization.contour.as_ref().unwrap();
    let [ra, dec] = contour.posterior_max().unwrap();
    assert!((ra - 10.0).abs() < 0.1 && (dec + 20.0).abs() < 0.1);
    assert_eq!(contour.paths(50).map(<[_]>::len), Some(1));
    assert_eq!(contour.paths(90).map(<[_]>::len), Some(1));
}

#[test]
fn amon_radius_is_converted_to_one_sigma() {
    let xml = voevent_xml(
        "ivo://nasa.gsfc.gcn/AMON#ICECUBE_GOLD_Event2021-01-01",
        r#"<Param name="Packet_Type" value="173" />"#,
        Some((150.0, 30.0, 2.0)),
    );
    let skymap = skyloc()
        .get_skymap(&VoEvent::from_xml(&xml).unwrap())
        .unwrap()
        .unwrap();

    let sigma = 2.0 / chi2dof_ppf(0.95);
    assert_relative_eq!(chi2dof_ppf(0.95), 2.447746830680816, max_relative = 1e-12);
    assert_eq!(skymap.localization_name, format!("150.00000_30.00000_{sigma:.5}"));
    assert!(max_center_distance(&skymap, 150.0, 30.0) <= 4.0 * sigma);
    assert_canonical(&skymap);
}

#[test]
fn retractions_have_no_skymap() {
    let skyloc = skyloc();

    let by_subtype = voevent_xml(
        "ivo://gwnet/LVC#S190822c-2-Retraction",
        r#"<Param name="Packet_Type" value="164" />"#,
        None,
    );
    let by_flag = voevent_xml(
        "ivo://nasa.gsfc.gcn/SWIFT#BAT_GRB_Pos",
        r#"<Param name="Retraction" value="1" />"#,
        Some((10.0, -20.0, 1.0)),
    );
    for xml in [by_subtype, by_flag] {
        let voevent = VoEvent::from_xml(&xml).unwrap();
        assert_eq!(skyloc.get_skymap(&voevent).unwrap(), None);
        assert!(skyloc.localize(&voevent).unwrap().is_none());
    }
    assert!(skyloc.cache().is_empty());

    let tags = skyloc
        .parse_notice(&VoEvent::from_xml(&voevent_xml(
            "ivo://gwnet/LVC#S190822c-2-Retraction",
            r#"<Param name="Packet_Type" value="164" />"#,
            None,
        ))
        .unwrap())
        .unwrap()
        .tags;
    assert_eq!(tags, vec!["LVC", "GW", "retracted"]);
}

#[test]
fn localizations_are_cached_until_invalidated() {
    let xml = voevent_xml(
        "ivo://nasa.gsfc.gcn/SWIFT#BAT_GRB_Pos_1",
        "",
        Some((250.0, 60.0, 3.0)),
    );
    let skyloc = skyloc();

    let first = skyloc.localize_xml(&xml).unwrap().unwrap();
    let second = skyloc.localize_xml(&xml).unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    assert!(skyloc.invalidate("ivo://nasa.gsfc.gcn/SWIFT#BAT_GRB_Pos_1"));
    let third = skyloc.localize_xml(&xml).unwrap().unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(first.contour, third.contour);
}

#[test]
fn failures_name_the_notice_and_stage() {
    let skyloc = skyloc();

    let xml = voevent_xml(
        "ivo://nasa.gsfc.gcn/SWIFT#BAT_GRB_Pos_2",
        r#"<Param name="TrigID" value="12x" />"#,
        None,
    );
    let err = skyloc
        .parse_notice(&VoEvent::from_xml(&xml).unwrap())
        .unwrap_err();
    assert!(matches!(
        &err,
        SkylocError::Stage { notice, stage: Stage::NoticeParser, .. }
            if notice == "ivo://nasa.gsfc.gcn/SWIFT#BAT_GRB_Pos_2"
    ));
    assert_eq!(
        err.root(),
        &SkylocError::MalformedValue {
            field: "TrigID".into(),
            value: "12x".into()
        }
    );

    let xml = voevent_xml(
        "ivo://nasa.gsfc.gcn/SWIFT#BAT_GRB_Pos_3",
        "",
        Some((10.0, -20.0, 0.0)),
    );
    let err = skyloc.localize_xml(&xml).unwrap_err();
    assert!(matches!(
        err,
        SkylocError::Stage {
            stage: Stage::SkymapBuilder,
            ..
        }
    ));

    assert!(matches!(
        skyloc.localize_xml("<VOEvent"),
        Err(SkylocError::Stage {
            stage: Stage::NoticeParser,
            ..
        })
    ));
}
