#![allow(dead_code)]

use approx::assert_relative_eq;
use skyloc::{
    constants::RADEG,
    healpix::{angular_distance, lonlat_to_vec, uniq2nest, pix2vec_nest},
    skymap::SkyMap,
};

mod fits;
pub use fits::{fits_table, inline_payload, write_fits, Column};

/// VOEvent document with the given ivorn, `What` content and optional `Position2D`.
pub fn voevent_xml(ivorn: &str, what: &str, position: Option<(f64, f64, f64)>) -> String {
    let position = position
        .map(|(ra, dec, err)| {
            format!(
                r#"<Position2D unit="deg">
              <Name1>RA</Name1><Name2>Dec</Name2>
              <Value2><C1>{ra}</C1><C2>{dec}</C2></Value2>
              <Error2Radius>{err}</Error2Radius>
            </Position2D>"#
            )
        })
        .unwrap_or_default();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<voe:VOEvent xmlns:voe="http://www.ivoa.net/xml/VOEvent/v2.0" ivorn="{ivorn}" role="observation" version="2.0">
  <Who><Date>2021-01-01T00:00:00</Date></Who>
  <What>
    {what}
  </What>
  <WhereWhen>
    <ObsDataLocation>
      <ObservatoryLocation id="GEOLUN" />
      <ObservationLocation>
        <AstroCoordSystem id="UTC-FK5-GEO" />
        <AstroCoords coord_system_id="UTC-FK5-GEO">
          <Time unit="s"><TimeInstant><ISOTime>2021-01-01T12:34:56.40</ISOTime></TimeInstant></Time>
          {position}
        </AstroCoords>
      </ObservationLocation>
    </ObsDataLocation>
  </WhereWhen>
</voe:VOEvent>"#
    )
}

/// Check the canonical skymap invariants: strictly ascending UNIQ, aligned columns, unit integral.
pub fn assert_canonical(skymap: &SkyMap) {
    assert!(!skymap.is_empty());
    assert_eq!(skymap.uniq.len(), skymap.probdensity.len());
    assert!(skymap.uniq.windows(2).all(|w| w[0] < w[1]));
    assert!(skymap.probdensity.iter().all(|&rho| rho >= 0.0));
    assert_relative_eq!(skymap.integral().unwrap(), 1.0, max_relative = 1e-6);
}

/// Largest angular distance in degrees between `(ra, dec)` and a pixel center of the map.
pub fn max_center_distance(skymap: &SkyMap, ra: f64, dec: f64) -> f64 {
    let center = lonlat_to_vec(ra * RADEG, dec * RADEG);
    skymap
        .uniq
        .iter()
        .map(|&u| {
            let (order, ipix) = uniq2nest(u).unwrap();
            angular_distance(&pix2vec_nest(order, ipix), &center) / RADEG
        })
        .fold(0.0, f64::max)
}
