use tracing::debug;

use crate::{
    constants::{Degree, RADEG},
    healpix::{
        angular_distance, lonlat_to_vec, nest2uniq, order_for_resolution, pix2vec_nest,
        pixel_area, query::query_disc,
    },
    skyloc_errors::SkylocError,
    skymap::SkyMap,
};

/// Gaussian skymap around a best position, with default resolution and extent.
///
/// See [`from_cone_with`].
pub fn from_cone(ra: Degree, dec: Degree, error: Degree) -> Result<SkyMap, SkylocError> {
    from_cone_with(ra, dec, error, 16, 4.0)
}

/// Gaussian skymap around a best position.
///
/// The resolution is the coarsest HEALPix order whose pixels are at most
/// `error / pixels_per_radius` wide. Every pixel whose center lies within
/// `sigma_extent · error` of the position receives the density
/// `exp(-0.5 (d / error)²)`, then the map is normalized to unit probability.
///
/// Arguments
/// -----------------
/// * `ra`, `dec`: best position in degrees.
/// * `error`: 1-sigma error radius in degrees, finite and strictly positive.
/// * `pixels_per_radius`: minimum number of pixels spanning `error`.
/// * `sigma_extent`: radius of the map, in units of `error`.
///
/// Return
/// ----------
/// * A single-order map named `"{ra:.5}_{dec:.5}_{error:.5}"`, sorted by UNIQ.
/// * [`SkylocError::UnsupportedRepresentation`] for a non-finite input or a non-positive radius.
pub fn from_cone_with(
    ra: Degree,
    dec: Degree,
    error: Degree,
    pixels_per_radius: u32,
    sigma_extent: f64,
) -> Result<SkyMap, SkylocError> {
    if !(ra.is_finite() && dec.is_finite() && error.is_finite()) || error <= 0.0 {
        return Err(SkylocError::UnsupportedRepresentation(format!(
            "error cone ra={ra} dec={dec} radius={error}"
        )));
    }
    let localization_name = format!("{ra:.5}_{dec:.5}_{error:.5}");

    let center = lonlat_to_vec(ra * RADEG, dec * RADEG);
    let radius = error * RADEG;
    let order = order_for_resolution(radius / pixels_per_radius.max(1) as f64);

    let ipix = query_disc(order, &center, sigma_extent * radius);
    debug!(
        name = %localization_name,
        order,
        pixels = ipix.len(),
        "building cone skymap"
    );

    let mut probdensity: Vec<f64> = ipix
        .iter()
        .map(|&p| {
            let d = angular_distance(&pix2vec_nest(order, p), &center) / radius;
            (-0.5 * d * d).exp()
        })
        .collect();

    let norm = probdensity.iter().sum::<f64>() * pixel_area(order);
    if norm <= 0.0 {
        return Err(SkylocError::IntegrityViolation(format!(
            "empty error cone {localization_name}"
        )));
    }
    probdensity.iter_mut().for_each(|rho| *rho /= norm);

    let uniq = ipix.into_iter().map(|p| nest2uniq(order, p)).collect();
    Ok(SkyMap::new(localization_name, uniq, probdensity))
}
