//! # Credible-level contours
//!
//! This module turns a canonical [`SkyMap`] into its derived contour artifact:
//!
//! 1. **Greedy credible levels** ([`credible_levels`]): pixels are ranked by decreasing
//!    density and each one is assigned the cumulative probability (in percent) of all
//!    the pixels ranked before it, itself included.
//! 2. **Contour paths** ([`contour_paths`]): the credible-level field is sampled on a
//!    regular longitude/latitude grid covering the region of interest, iso-lines are
//!    traced by marching squares and simplified. Rings keep continuous longitudes, so
//!    a ring crossing the 0°/360° seam stays one closed path.
//! 3. **Maximum a posteriori position** ([`posterior_max`]).
//!
//! [`get_contour`] bundles the three into a GeoJSON [`FeatureCollection`].
//!
//! ## Sampling grid
//!
//! The grid step is half the pixel resolution of the finest pixel of the region
//! enclosed by the highest requested level, capped at a maximum number of nodes
//! per axis. Regions close to a pole or spanning most longitudes are sampled on a
//! periodic full-longitude grid; otherwise the grid frame is forced outside every
//! contour so that all paths close.
//!
//! ## See also
//! ------------
//! * [`marching`](crate::contour::marching) – iso-lines, joining and simplification.
//! * [`geojson`](crate::contour::geojson) – output schema.

pub mod geojson;
pub mod marching;

use std::cmp::Reverse;

use itertools::Itertools;
use ordered_float::OrderedFloat;
use tracing::debug;

use crate::{
    constants::{Degree, Percent, DPI, RADEG},
    healpix::{max_pixrad, moc::MocIndex, pix2ang_nest, pixel_resolution, uniq2nest, uniq_pixel_area},
    skyloc_errors::SkylocError,
    skymap::SkyMap,
};
use geojson::{Feature, FeatureCollection, Position};
use marching::{path_length, simplify, unwrap_longitudes, SampledGrid};

/// Above this latitude the region of interest is sampled over all longitudes.
const POLAR_LATITUDE: Degree = 80.0;

/// Regions wider than this in longitude are sampled over all longitudes.
const WIDE_LONGITUDE: Degree = 270.0;

/// Credible level of the sky not covered by the map.
const UNCOVERED: Percent = 100.0;

/// Greedy credible level (percent) of every pixel, aligned with `skymap.uniq`.
///
/// Ties in density are ranked by ascending UNIQ.
pub fn credible_levels(skymap: &SkyMap) -> Result<Vec<Percent>, SkylocError> {
    let prob = skymap
        .uniq
        .iter()
        .zip(&skymap.probdensity)
        .map(|(&u, &rho)| Ok(rho * uniq_pixel_area(u)?))
        .collect::<Result<Vec<f64>, SkylocError>>()?;
    let total: f64 = prob.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return Err(SkylocError::IntegrityViolation(format!(
            "{} holds no probability",
            skymap.localization_name
        )));
    }

    let ranking = (0..prob.len())
        .sorted_by_key(|&i| (Reverse(OrderedFloat(skymap.probdensity[i])), skymap.uniq[i]));

    let mut levels = vec![0.0; prob.len()];
    let mut cumulative = 0.0;
    for i in ranking {
        cumulative += prob[i];
        levels[i] = 100.0 * cumulative / total;
    }
    Ok(levels)
}

/// Center of the pixel of highest density, `[ra, dec]` in degrees.
///
/// Ties go to the pixel of lowest UNIQ.
pub fn posterior_max(skymap: &SkyMap) -> Result<Position, SkylocError> {
    let best = skymap
        .uniq
        .iter()
        .zip(&skymap.probdensity)
        .min_by_key(|&(&u, &rho)| (Reverse(OrderedFloat(rho)), u))
        .map(|(&u, _)| u)
        .ok_or_else(|| {
            SkylocError::IntegrityViolation(format!("{} is empty", skymap.localization_name))
        })?;
    let (order, ipix) = uniq2nest(best)?;
    let (lon, lat) = pix2ang_nest(order, ipix);
    Ok([lon / RADEG, lat / RADEG])
}

/// Smallest longitude interval holding every value, as `(start, width)` in degrees.
///
/// The interval starts right after the largest gap between consecutive longitudes.
fn longitude_span(lons: &mut [Degree]) -> (Degree, Degree) {
    lons.sort_by(|a, b| a.total_cmp(b));
    let n = lons.len();
    let mut start = lons[0];
    let mut largest_gap = lons[0] + 360.0 - lons[n - 1];
    for k in 1..n {
        let gap = lons[k] - lons[k - 1];
        if gap > largest_gap {
            largest_gap = gap;
            start = lons[k];
        }
    }
    (start, 360.0 - largest_gap)
}

/// Sample the credible-level field on the grid covering the pixels at or below `max_level`.
fn sample_region(
    skymap: &SkyMap,
    levels: &[Percent],
    max_level: Percent,
    max_grid: usize,
) -> Result<SampledGrid, SkylocError> {
    let top = levels
        .iter()
        .position_min_by(|a, b| a.total_cmp(*b))
        .unwrap_or_default();

    let mut lons = Vec::new();
    let mut lat_min = f64::INFINITY;
    let mut lat_max = f64::NEG_INFINITY;
    let mut finest = 0;
    let mut coarsest = u8::MAX;
    for (i, (&u, &cl)) in skymap.uniq.iter().zip(levels).enumerate() {
        if cl > max_level && i != top {
            continue;
        }
        let (order, ipix) = uniq2nest(u)?;
        let (lon, lat) = pix2ang_nest(order, ipix);
        lons.push(lon / RADEG);
        lat_min = lat_min.min(lat / RADEG);
        lat_max = lat_max.max(lat / RADEG);
        finest = finest.max(order);
        coarsest = coarsest.min(order);
    }

    let step = 0.5 * pixel_resolution(finest) / RADEG;
    let margin = max_pixrad(coarsest) / RADEG + 2.0 * step;
    let lat_min = (lat_min - margin).max(-90.0);
    let lat_max = (lat_max + margin).min(90.0);

    let (lon_start, lon_width) = longitude_span(&mut lons);
    let highest = lat_min.abs().max(lat_max.abs());
    let periodic = highest > POLAR_LATITUDE || {
        let lon_margin = margin / (highest * RADEG).cos();
        lon_width + 2.0 * lon_margin > WIDE_LONGITUDE
    };

    let axis = |width: Degree| ((width / step).ceil() as usize + 1).clamp(2, max_grid.max(2));

    let nlat = axis(lat_max - lat_min);
    let dlat = (lat_max - lat_min) / (nlat - 1) as f64;
    let (lon0, dlon, nlon) = if periodic {
        let nlon = axis(360.0).max(3);
        (0.0, 360.0 / nlon as f64, nlon)
    } else {
        let lon_margin = margin / (highest * RADEG).cos();
        let width = lon_width + 2.0 * lon_margin;
        let nlon = axis(width);
        (lon_start - lon_margin, width / (nlon - 1) as f64, nlon)
    };

    let index = MocIndex::new(&skymap.uniq)?;
    let mut values = Vec::with_capacity(nlon * nlat);
    for j in 0..nlat {
        let lat = lat_min + j as f64 * dlat;
        for i in 0..nlon {
            let lon = lon0 + i as f64 * dlon;
            let frame = (!periodic && (i == 0 || i == nlon - 1))
                || (j == 0 && lat_min > -90.0)
                || (j == nlat - 1 && lat_max < 90.0);
            let value = if frame {
                UNCOVERED
            } else {
                index
                    .find((lon * RADEG).rem_euclid(DPI), lat * RADEG)
                    .map_or(UNCOVERED, |k| levels[k])
            };
            values.push(value);
        }
    }

    debug!(
        name = %skymap.localization_name,
        nlon,
        nlat,
        periodic,
        "sampled credible levels"
    );

    Ok(SampledGrid {
        lon0,
        dlon,
        nlon,
        lat0: lat_min,
        dlat,
        nlat,
        periodic,
        values,
    })
}

/// Contour paths of every requested credible level, in `[ra, dec]` degrees.
///
/// Arguments
/// -----------------
/// * `skymap`: canonical skymap.
/// * `credible_levels_pct`: the levels, in percent.
/// * `max_grid`: maximum number of sampling nodes along each axis.
///
/// Return
/// ----------
/// * One list of paths per requested level, in the same order. Paths are simplified
///   and closed rings stay closed; the first longitude of a path lies in `[0, 360)` and
///   the following ones are continuous, so they may leave that interval.
pub fn contour_paths(
    skymap: &SkyMap,
    credible_levels_pct: &[u32],
    max_grid: usize,
) -> Result<Vec<Vec<Vec<Position>>>, SkylocError> {
    let Some(&max_level) = credible_levels_pct.iter().max() else {
        return Ok(Vec::new());
    };
    let levels = credible_levels(skymap)?;
    let grid = sample_region(skymap, &levels, max_level as f64, max_grid)?;
    let epsilon = 0.25 * grid.dlon.min(grid.dlat);

    Ok(credible_levels_pct
        .iter()
        .map(|&level| {
            grid.iso_lines(level as f64)
                .iter()
                .map(|path| simplify(&unwrap_longitudes(path), epsilon))
                .filter(|path| {
                    let degenerate_ring = path.first() == path.last() && path.len() < 4;
                    !degenerate_ring && path_length(path) >= epsilon
                })
                .collect()
        })
        .collect())
}

/// GeoJSON contour of a skymap: the maximum a posteriori point followed by one
/// `MultiLineString` per credible level.
pub fn get_contour(
    skymap: &SkyMap,
    credible_levels_pct: &[u32],
    max_grid: usize,
) -> Result<FeatureCollection, SkylocError> {
    let center = posterior_max(skymap)?;
    let paths = contour_paths(skymap, credible_levels_pct, max_grid)?;

    let mut features = Vec::with_capacity(paths.len() + 1);
    features.push(Feature::point(center));
    features.extend(
        credible_levels_pct
            .iter()
            .zip(paths)
            .map(|(&level, paths)| Feature::contour(level, paths)),
    );
    Ok(FeatureCollection { features })
}

#[cfg(test)]
mod contour_test {
    use super::*;
    use crate::{
        constants::FULL_SKY,
        healpix::{angular_distance, lonlat_to_vec, nest2uniq, pixel_area},
        skymap::{cone::from_cone, polygon::from_polygon_with},
    };
    use approx::assert_relative_eq;

    #[test]
    fn test_credible_levels_greedy() {
        let area = pixel_area(0);
        let skymap = SkyMap::new(
            "three",
            vec![nest2uniq(0, 0), nest2uniq(0, 1), nest2uniq(0, 2)],
            vec![0.2 / area, 0.5 / area, 0.3 / area],
        );
        let levels = credible_levels(&skymap).unwrap();
        assert_relative_eq!(levels[1], 50.0, max_relative = 1e-12);
        assert_relative_eq!(levels[2], 80.0, max_relative = 1e-12);
        assert_relative_eq!(levels[0], 100.0, max_relative = 1e-12);
    }

    #[test]
    fn test_credible_level_ties_follow_uniq() {
        let rho = 1.0 / FULL_SKY;
        let skymap = SkyMap::new("flat", (4..16).collect(), vec![rho; 12]);
        let levels = credible_levels(&skymap).unwrap();
        assert!(levels.windows(2).all(|w| w[0] < w[1]));
        assert_relative_eq!(levels[0], 100.0 / 12.0, max_relative = 1e-12);
    }

    #[test]
    fn test_longitude_span() {
        let (start, width) = longitude_span(&mut [350.0, 10.0, 5.0, 355.0]);
        assert_eq!((start, width), (350.0, 20.0));

        let (start, width) = longitude_span(&mut [100.0, 120.0, 110.0]);
        assert_eq!((start, width), (100.0, 20.0));
    }

    #[test]
    fn test_posterior_max_of_cone() {
        let skymap = from_cone(10.0, -20.0, 1.0).unwrap();
        let [ra, dec] = posterior_max(&skymap).unwrap();
        let d = angular_distance(
            &lonlat_to_vec(ra * RADEG, dec * RADEG),
            &lonlat_to_vec(10.0 * RADEG, -20.0 * RADEG),
        );
        assert!(d < pixel_resolution(10));
    }

    #[test]
    fn test_cone_contours_are_circles() {
        let skymap = from_cone(10.0, -20.0, 1.0).unwrap();
        let center = lonlat_to_vec(10.0 * RADEG, -20.0 * RADEG);
        let collection = get_contour(&skymap, &[50, 90], 1024).unwrap();
        assert_eq!(collection.features.len(), 3);

        // radius of the p-containment circle of a 2-D Gaussian: sqrt(-2 ln(1 - p))
        for (level, expected) in [(50, 1.1774100225154747), (90, 2.145966026289347)] {
            let paths = collection.paths(level).unwrap();
            assert_eq!(paths.len(), 1, "level {level}");
            let ring = &paths[0];
            assert_eq!(ring.first(), ring.last());
            for p in ring {
                let r = angular_distance(&lonlat_to_vec(p[0] * RADEG, p[1] * RADEG), &center) / RADEG;
                assert!((r - expected).abs() < 0.1, "level {level}: radius {r}");
            }
        }
    }

    #[test]
    fn test_contour_across_the_seam_is_one_ring() {
        let skymap = from_cone(0.5, 10.0, 2.0).unwrap();
        let center = lonlat_to_vec(0.5 * RADEG, 10.0 * RADEG);
        let paths = contour_paths(&skymap, &[90], 1024).unwrap();
        assert_eq!(paths[0].len(), 1);

        let ring = &paths[0][0];
        assert_eq!(ring.first(), ring.last());
        assert!((0.0..360.0).contains(&ring[0][0]));
        assert!(ring.windows(2).all(|w| (w[1][0] - w[0][0]).abs() < 5.0));
        assert!(ring.iter().any(|p| p[0].rem_euclid(360.0) > 350.0));
        assert!(ring.iter().any(|p| p[0].rem_euclid(360.0) < 10.0));
        for p in ring {
            let r = angular_distance(&lonlat_to_vec(p[0] * RADEG, p[1] * RADEG), &center) / RADEG;
            assert!((r - 2.0 * 2.145966026289347).abs() < 0.2, "radius {r}");
        }
    }

    #[test]
    fn test_contours_near_the_pole_are_closed() {
        let skymap = from_cone(0.0, 89.5, 0.3).unwrap();
        let collection = get_contour(&skymap, &[50, 90], 1024).unwrap();

        // the 50% ring stays off the pole, the 90% ring winds around it
        let inner = collection.paths(50).unwrap();
        assert_eq!(inner.len(), 1);
        assert_eq!(inner[0].first(), inner[0].last());
        assert!(inner[0].iter().all(|p| p[1] < 90.0));

        let outer = collection.paths(90).unwrap();
        assert_eq!(outer.len(), 1);
        assert_eq!(outer[0].first(), outer[0].last());
        assert!(outer[0].iter().any(|p| p[1] == 90.0));
    }

    #[test]
    fn test_polar_polygon_uses_full_longitude() {
        let cap = [(0.0, 80.0), (90.0, 80.0), (180.0, 80.0), (270.0, 80.0)];
        let skymap = from_polygon_with("cap", &cap, 6).unwrap();
        let collection = get_contour(&skymap, &[90], 256).unwrap();
        let paths = collection.paths(90).unwrap();
        assert!(!paths.is_empty());
        for p in paths.iter().flatten() {
            assert!(p[1] > 70.0 && p[1] < 90.0, "{p:?}");
        }
    }

    #[test]
    fn test_contour_is_idempotent() {
        let skymap = from_cone(200.0, 45.0, 5.0).unwrap();
        assert_eq!(
            get_contour(&skymap, &[50, 90], 512).unwrap(),
            get_contour(&skymap, &[50, 90], 512).unwrap()
        );
    }

    #[test]
    fn test_no_levels() {
        let skymap = from_cone(200.0, 45.0, 5.0).unwrap();
        let collection = get_contour(&skymap, &[], 512).unwrap();
        assert_eq!(collection.features.len(), 1);
    }
}
