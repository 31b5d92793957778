//! Masking of the sky hidden by a foreground body.
//!
//! Space-based detectors in low Earth orbit (Fermi GBM in particular) cannot see the
//! part of the sky behind the Earth. Their HEALPix products declare the geocenter
//! direction with the `GEO_RA` / `GEO_DEC` header keys and the apparent Earth radius
//! with `GEO_RAD`; the probability inside that disc is removed and the rest of the
//! map renormalized.

use tracing::debug;

use crate::{
    constants::{Degree, RADEG},
    healpix::{
        lonlat_to_vec,
        moc::{derasterize, rasterize},
        query::query_disc,
    },
    skyloc_errors::SkylocError,
    skymap::SkyMap,
};

/// Occulting disc on the sky, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OccultingDisc {
    pub ra: Degree,
    pub dec: Degree,
    pub radius: Degree,
}

/// Remove the probability inside an occulting disc and renormalize.
///
/// The map is rasterized at `order`, every pixel whose center lies inside the disc
/// is zeroed, the remaining probability is rescaled to one and the grid is turned
/// back into a multi-order map. Distance columns do not survive the resampling.
///
/// Arguments
/// -----------------
/// * `skymap`: the map to mask.
/// * `disc`: the occulting body.
/// * `order`: HEALPix order of the mask.
///
/// Return
/// ----------
/// * A new, unsorted, multi-order map with the same name.
/// * [`SkylocError::IntegrityViolation`] when no probability is left outside the disc.
pub fn apply_occultation(
    skymap: &SkyMap,
    disc: &OccultingDisc,
    order: u8,
) -> Result<SkyMap, SkylocError> {
    let mut prob = rasterize(&skymap.uniq, &skymap.probdensity, order)?;

    let center = lonlat_to_vec(disc.ra * RADEG, disc.dec * RADEG);
    let occulted = query_disc(order, &center, disc.radius * RADEG);
    for &ipix in &occulted {
        prob[ipix as usize] = 0.0;
    }

    let total: f64 = prob.iter().sum();
    debug!(
        name = %skymap.localization_name,
        order,
        occulted = occulted.len(),
        remaining = total,
        "applying occultation mask"
    );
    if total <= 0.0 || !total.is_finite() {
        return Err(SkylocError::IntegrityViolation(format!(
            "no probability left outside the occulting disc of {}",
            skymap.localization_name
        )));
    }
    prob.iter_mut().for_each(|p| *p /= total);

    let (uniq, probdensity) = derasterize(&prob, order)?;
    Ok(SkyMap::new(skymap.localization_name.clone(), uniq, probdensity))
}

#[cfg(test)]
mod occultation_test {
    use super::*;
    use crate::{
        constants::FULL_SKY,
        healpix::{angular_distance, nest2uniq, pix2vec_nest, uniq2nest, uniq_pixel_area},
        skymap::canonical::canonicalize,
    };
    use approx::assert_relative_eq;

    fn uniform_sky() -> SkyMap {
        SkyMap::new(
            "allsky",
            (0..12).map(|p| nest2uniq(0, p)).collect(),
            vec![1.0 / FULL_SKY; 12],
        )
    }

    #[test]
    fn test_no_mass_inside_disc() {
        let disc = OccultingDisc {
            ra: 120.0,
            dec: -30.0,
            radius: 67.5,
        };
        let order = 5;
        let masked = canonicalize(apply_occultation(&uniform_sky(), &disc, order).unwrap(), 1e-6)
            .unwrap();
        assert_relative_eq!(masked.integral().unwrap(), 1.0, max_relative = 1e-9);

        let center = lonlat_to_vec(120.0 * RADEG, -30.0 * RADEG);
        let occulted = query_disc(order, &center, 67.5 * RADEG);
        let flat = rasterize(&masked.uniq, &masked.probdensity, order).unwrap();
        for ipix in occulted {
            assert_eq!(flat[ipix as usize], 0.0);
        }

        // the rest of the sky is still uniform
        let visible: Vec<f64> = masked
            .uniq
            .iter()
            .zip(&masked.probdensity)
            .filter(|&(_, &rho)| rho > 0.0)
            .map(|(_, &rho)| rho)
            .collect();
        assert!(visible.iter().all(|&r| (r - visible[0]).abs() < 1e-9 * r));
    }

    #[test]
    fn test_mass_outside_disc_keeps_its_shape() {
        let disc = OccultingDisc {
            ra: 0.0,
            dec: 90.0,
            radius: 30.0,
        };
        let masked = apply_occultation(&uniform_sky(), &disc, 4).unwrap();
        let north = lonlat_to_vec(0.0, 90.0 * RADEG);

        let occulted_area: f64 = masked
            .uniq
            .iter()
            .zip(&masked.probdensity)
            .filter(|&(_, &rho)| rho == 0.0)
            .map(|(&u, _)| uniq_pixel_area(u).unwrap())
            .sum();
        assert!(occulted_area > 0.0);

        for (&u, &rho) in masked.uniq.iter().zip(&masked.probdensity) {
            let (o, p) = uniq2nest(u).unwrap();
            if angular_distance(&pix2vec_nest(o, p), &north) > 40.0 * RADEG {
                assert_relative_eq!(rho, 1.0 / (FULL_SKY - occulted_area), max_relative = 1e-9);
            }
        }
    }

    #[test]
    fn test_fully_occulted_map() {
        let disc = OccultingDisc {
            ra: 0.0,
            dec: 0.0,
            radius: 180.0,
        };
        assert!(matches!(
            apply_occultation(&uniform_sky(), &disc, 3),
            Err(SkylocError::IntegrityViolation(_))
        ));
    }
}
