use tracing::debug;

use crate::{
    constants::{Degree, POLYGON_ORDER, RADEG},
    healpix::{
        lonlat_to_vec, nest2uniq, pixel_area,
        query::{query_polygon, ConvexPolygon},
    },
    skyloc_errors::SkylocError,
    skymap::SkyMap,
};

/// Uniform skymap over a convex polygon, rasterized at order 10 (nside 1024).
///
/// See [`from_polygon_with`].
pub fn from_polygon(
    localization_name: &str,
    vertices: &[(Degree, Degree)],
) -> Result<SkyMap, SkylocError> {
    from_polygon_with(localization_name, vertices, POLYGON_ORDER)
}

/// Uniform skymap over a convex polygon.
///
/// Every pixel of `order` whose center lies inside the polygon gets the same
/// density; pixels outside are not part of the map.
///
/// Arguments
/// -----------------
/// * `localization_name`: name of the resulting map.
/// * `vertices`: `(ra, dec)` vertices in degrees, in either winding order.
/// * `order`: HEALPix order of the rasterization.
///
/// Return
/// ----------
/// * A single-order map sorted by UNIQ.
/// * [`SkylocError::UnsupportedRepresentation`] when the polygon is degenerate, not convex,
///   or too small to contain any pixel center.
pub fn from_polygon_with(
    localization_name: &str,
    vertices: &[(Degree, Degree)],
    order: u8,
) -> Result<SkyMap, SkylocError> {
    if vertices
        .iter()
        .any(|(ra, dec)| !ra.is_finite() || !dec.is_finite())
    {
        return Err(SkylocError::UnsupportedRepresentation(format!(
            "polygon {localization_name} has non-finite vertices"
        )));
    }

    let xyz: Vec<_> = vertices
        .iter()
        .map(|&(ra, dec)| lonlat_to_vec(ra * RADEG, dec * RADEG))
        .collect();
    let polygon = ConvexPolygon::new(&xyz)?;

    let ipix = query_polygon(order, &polygon);
    debug!(
        name = localization_name,
        order,
        pixels = ipix.len(),
        "building polygon skymap"
    );
    if ipix.is_empty() {
        return Err(SkylocError::UnsupportedRepresentation(format!(
            "polygon {localization_name} contains no pixel center at order {order}"
        )));
    }

    let rho = 1.0 / (ipix.len() as f64 * pixel_area(order));
    let uniq: Vec<_> = ipix.into_iter().map(|p| nest2uniq(order, p)).collect();
    let probdensity = vec![rho; uniq.len()];
    Ok(SkyMap::new(localization_name, uniq, probdensity))
}
