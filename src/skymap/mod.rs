//! # Sky localization maps
//!
//! This module defines [`SkyMap`], the canonical multi-order probability density map,
//! and the three strategies that build one from an alert:
//!
//! - [`cone`](crate::skymap::cone) – Gaussian error circle around a best position.
//! - [`polygon`](crate::skymap::polygon) – uniform density inside a convex spherical polygon.
//! - [`grid`](crate::skymap::grid) – externally supplied HEALPix FITS table (inline payload or URL).
//!
//! Every builder output goes through the [`canonical`](crate::skymap::canonical) checks;
//! external grids may in addition be masked by an occulting body
//! ([`occultation`](crate::skymap::occultation)).
//!
//! ## Source selection
//!
//! [`SkymapSource::from_voevent`] decides which strategy applies to a notice:
//!
//! 1. retraction notices yield no map,
//! 2. Fermi GBM final position: `LocationMap_URL` rewritten to the HEALPix product,
//! 3. Fermi GBM subthreshold: `HealPix_URL`,
//! 4. `GW_SKYMAP` group: `skymap_fits`,
//! 5. error cone from `Position2D` (AMON radii are converted to 1-sigma),
//! 6. otherwise no map.

pub mod canonical;
pub mod cone;
pub mod grid;
pub mod occultation;
pub mod polygon;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    constants::{chi2dof_ppf, Degree, Uniq, AMON_CONTAINMENT, AMON_MISSION},
    healpix::uniq_pixel_area,
    notice::{parser::get_mission, voevent::VoEvent, NoticeType},
    skyloc_errors::SkylocError,
};

/// Canonical multi-order probability density map.
///
/// `uniq` is strictly ascending, every other column is aligned with it, and the
/// density integrates to one over the sphere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkyMap {
    pub localization_name: String,
    pub uniq: Vec<Uniq>,
    pub probdensity: Vec<f64>,
    pub distmu: Option<Vec<f64>>,
    pub distsigma: Option<Vec<f64>>,
    pub distnorm: Option<Vec<f64>>,
}

impl SkyMap {
    /// A 2-D map without distance information.
    pub fn new(localization_name: impl Into<String>, uniq: Vec<Uniq>, probdensity: Vec<f64>) -> Self {
        SkyMap {
            localization_name: localization_name.into(),
            uniq,
            probdensity,
            distmu: None,
            distsigma: None,
            distnorm: None,
        }
    }

    pub fn len(&self) -> usize {
        self.uniq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uniq.is_empty()
    }

    /// Integral of the density over the sphere, `Σ probdensity[i] · area(uniq[i])`.
    pub fn integral(&self) -> Result<f64, SkylocError> {
        self.uniq
            .iter()
            .zip(&self.probdensity)
            .map(|(&u, &rho)| Ok(rho * uniq_pixel_area(u)?))
            .sum()
    }
}

/// Where an externally supplied grid comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum GridSource {
    /// Remote FITS file.
    Url(String),
    /// Inline data URL, `...;name=<file>;base64,<payload>`.
    Inline(String),
    /// FITS file already on disk.
    File(Utf8PathBuf),
}

/// Parameters of one skymap construction strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum SkymapSource {
    /// Error circle, radius already expressed as 1 sigma.
    Cone {
        ra: Degree,
        dec: Degree,
        error: Degree,
    },
    /// Convex polygon given by its `(ra, dec)` vertices.
    Polygon {
        localization_name: String,
        vertices: Vec<(Degree, Degree)>,
    },
    Grid(GridSource),
}

/// Rewrite a Fermi GBM localization plot URL into the HEALPix map URL.
pub(crate) fn gbm_healpix_url(locplot_url: &str) -> String {
    locplot_url
        .replace("http://", "https://")
        .replace("_locplot_", "_healpix_")
        .replace(".png", ".fit")
}

fn parse_coordinate(field: &str, text: Option<&String>) -> Result<Option<f64>, SkylocError> {
    text.map(|t| {
        t.trim()
            .parse::<f64>()
            .map_err(|_| SkylocError::malformed(field, t.as_str()))
    })
    .transpose()
}

impl SkymapSource {
    /// Select the construction strategy of a notice.
    ///
    /// Arguments
    /// -----------------
    /// * `voevent`: the parsed notice document.
    ///
    /// Return
    /// ----------
    /// * `Ok(None)` for retractions and notices without any usable localization,
    ///   the selected source otherwise.
    /// * [`SkylocError::MalformedValue`] when a packet type, retraction flag or cone
    ///   coordinate is present but unparsable.
    pub fn from_voevent(voevent: &VoEvent) -> Result<Option<Self>, SkylocError> {
        let notice_type = crate::notice::parser::get_notice_type(voevent)?;
        let url_param = |name: &str| -> Option<String> {
            voevent
                .find_top_param(name)
                .and_then(|p| p.value.as_deref())
                .map(|v| v.trim().to_string())
        };

        let retraction = match voevent.find_param("Retraction") {
            Some(param) => match param.value.as_deref() {
                Some(v) => {
                    v.trim()
                        .parse::<i64>()
                        .map_err(|_| SkylocError::malformed("Retraction", v))?
                        == 1
                }
                None => false,
            },
            None => false,
        };
        if retraction || notice_type.is_some_and(|nt| nt.is_retraction()) {
            debug!(ivorn = %voevent.ivorn, "retraction notice, no skymap");
            return Ok(None);
        }

        match notice_type {
            Some(NoticeType::FermiGbmFinPos) => {
                if let Some(url) = url_param("LocationMap_URL") {
                    return Ok(Some(SkymapSource::Grid(GridSource::Url(gbm_healpix_url(&url)))));
                }
            }
            Some(NoticeType::FermiGbmSubthresh) => {
                if let Some(url) = url_param("HealPix_URL") {
                    return Ok(Some(SkymapSource::Grid(GridSource::Url(url))));
                }
            }
            _ => {}
        }

        if let Some(url) = voevent
            .find_group("GW_SKYMAP")
            .and_then(|g| g.params.iter().find(|p| p.name == "skymap_fits"))
            .and_then(|p| p.value.as_deref())
        {
            return Ok(Some(SkymapSource::Grid(GridSource::Url(url.trim().to_string()))));
        }

        let Some(position) = voevent.astro_coords().find_map(|c| c.position_2d.as_ref()) else {
            return Ok(None);
        };
        let value2 = position.value2.as_ref();
        let ra = parse_coordinate("C1", value2.and_then(|v| v.c1.as_ref()))?;
        let dec = parse_coordinate("C2", value2.and_then(|v| v.c2.as_ref()))?;
        let error = parse_coordinate("Error2Radius", position.error2_radius.as_ref())?;

        let (Some(ra), Some(dec), Some(mut error)) = (ra, dec, error) else {
            return Ok(None);
        };

        if get_mission(voevent) == AMON_MISSION {
            error /= chi2dof_ppf(AMON_CONTAINMENT);
        }

        Ok(Some(SkymapSource::Cone { ra, dec, error }))
    }
}

#[cfg(test)]
mod skymap_test {
    use super::*;
    use approx::assert_relative_eq;

    fn voevent(ivorn: &str, what: &str, position: &str) -> VoEvent {
        VoEvent::from_xml(&format!(
            r#"<VOEvent ivorn="{ivorn}">
  <What>{what}</What>
  <WhereWhen><ObsDataLocation><ObservationLocation>
    <AstroCoords coord_system_id="UTC-FK5-GEO">
      <Time><TimeInstant><ISOTime>2021-01-01T00:00:00</ISOTime></TimeInstant></Time>
      {position}
    </AstroCoords>
  </ObservationLocation></ObsDataLocation></WhereWhen>
</VOEvent>"#
        ))
        .unwrap()
    }

    const POSITION: &str = r#"<Position2D unit="deg">
        <Value2><C1>10.0</C1><C2>-20.0</C2></Value2>
        <Error2Radius>2.447746830680816</Error2Radius>
      </Position2D>"#;

    #[test]
    fn test_gbm_url_rewrite() {
        assert_eq!(
            gbm_healpix_url(
                "http://heasarc.gsfc.nasa.gov/FTP/fermi/data/gbm/triggers/2019/bn190425089/quicklook/glg_locplot_all_bn190425089.png"
            ),
            "https://heasarc.gsfc.nasa.gov/FTP/fermi/data/gbm/triggers/2019/bn190425089/quicklook/glg_healpix_all_bn190425089.fit"
        );
    }

    #[test]
    fn test_select_gbm_final_position() {
        let v = voevent(
            "ivo://nasa.gsfc.gcn/Fermi#GBM_Fin_Pos",
            r#"<Param name="Packet_Type" value="115" />
               <Param name="LocationMap_URL" value="http://x/glg_locplot_all_bn1.png" />"#,
            POSITION,
        );
        assert_eq!(
            SkymapSource::from_voevent(&v).unwrap(),
            Some(SkymapSource::Grid(GridSource::Url(
                "https://x/glg_healpix_all_bn1.fit".into()
            )))
        );
    }

    #[test]
    fn test_select_subthreshold_and_gw() {
        let v = voevent(
            "ivo://nasa.gsfc.gcn/Fermi#GBM_Sub",
            r#"<Param name="Packet_Type" value="131" />
               <Param name="HealPix_URL" value="https://x/healpix.fit" />"#,
            "",
        );
        assert_eq!(
            SkymapSource::from_voevent(&v).unwrap(),
            Some(SkymapSource::Grid(GridSource::Url("https://x/healpix.fit".into())))
        );

        let v = voevent(
            "ivo://gwnet/LVC#S1",
            r#"<Param name="Packet_Type" value="150" />
               <Group type="GW_SKYMAP" name="bayestar">
                 <Param name="skymap_fits" value="https://x/bayestar.fits.gz" />
               </Group>"#,
            "",
        );
        assert_eq!(
            SkymapSource::from_voevent(&v).unwrap(),
            Some(SkymapSource::Grid(GridSource::Url("https://x/bayestar.fits.gz".into())))
        );
    }

    #[test]
    fn test_select_retraction() {
        let v = voevent(
            "ivo://gwnet/LVC#S1-Retraction",
            r#"<Param name="Packet_Type" value="164" />"#,
            "",
        );
        assert_eq!(SkymapSource::from_voevent(&v).unwrap(), None);

        let v = voevent(
            "ivo://nasa.gsfc.gcn/SWIFT#BAT",
            r#"<Param name="Retraction" value="1" />"#,
            POSITION,
        );
        assert_eq!(SkymapSource::from_voevent(&v).unwrap(), None);
    }

    #[test]
    fn test_select_cone_and_amon_conversion() {
        let v = voevent("ivo://nasa.gsfc.gcn/SWIFT#BAT", "", POSITION);
        let Some(SkymapSource::Cone { ra, dec, error }) = SkymapSource::from_voevent(&v).unwrap()
        else {
            panic!("expected a cone");
        };
        assert_eq!((ra, dec), (10.0, -20.0));
        assert_relative_eq!(error, 2.447746830680816);

        let v = voevent("ivo://nasa.gsfc.gcn/AMON#ICECUBE_GOLD", "", POSITION);
        let Some(SkymapSource::Cone { error, .. }) = SkymapSource::from_voevent(&v).unwrap() else {
            panic!("expected a cone");
        };
        assert_relative_eq!(error, 1.0, max_relative = 1e-12);
    }

    #[test]
    fn test_select_nothing() {
        let v = voevent("ivo://nasa.gsfc.gcn/SWIFT#BAT", "", "");
        assert_eq!(SkymapSource::from_voevent(&v).unwrap(), None);

        let v = voevent(
            "ivo://nasa.gsfc.gcn/SWIFT#BAT",
            "",
            r#"<Position2D><Value2><C1>nan?</C1><C2>1</C2></Value2><Error2Radius>1</Error2Radius></Position2D>"#,
        );
        assert_eq!(
            SkymapSource::from_voevent(&v),
            Err(SkylocError::malformed("C1", "nan?"))
        );
    }

    #[test]
    fn test_integral() {
        let skymap = SkyMap::new("full", (48..96).collect(), vec![1.0 / (4.0 * std::f64::consts::PI); 48]);
        assert_relative_eq!(skymap.integral().unwrap(), 1.0, max_relative = 1e-12);
        assert_eq!(skymap.len(), 48);
    }
}
