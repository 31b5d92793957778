//! Region coverage at a fixed HEALPix order.
//!
//! Both queries descend the NESTED hierarchy from the 12 base pixels, pruning
//! every pixel whose bounding circle (center ± [`max_pixrad`]) cannot reach
//! the region, and keep the pixels of the target order whose **center** lies
//! inside the region. The depth-first descent visits children in increasing
//! index order, so the returned indices are sorted ascending.

use nalgebra::Vector3;

use crate::{
    constants::{Radian, N_BASE_PIXELS},
    healpix::{angular_distance, max_pixrad, pix2vec_nest},
    skyloc_errors::SkylocError,
};

/// Pixels whose center lies within `radius` of `center`.
///
/// Arguments
/// -----------------
/// * `order`: target HEALPix order.
/// * `center`: unit vector of the disc center.
/// * `radius`: disc radius in radians.
///
/// Return
/// ----------
/// * Sorted NESTED indices at `order`.
pub fn query_disc(order: u8, center: &Vector3<f64>, radius: Radian) -> Vec<u64> {
    let mut out = Vec::new();
    for face in 0..N_BASE_PIXELS {
        descend(0, face, &mut out, &|depth, ipix| {
            let dist = angular_distance(&pix2vec_nest(depth, ipix), center);
            if depth == order {
                Coverage::from_bool(dist <= radius)
            } else if dist <= radius + max_pixrad(depth) {
                Coverage::Partial
            } else {
                Coverage::Outside
            }
        });
    }
    out
}

/// A convex spherical polygon described by the inward normals of its edges.
#[derive(Debug, Clone)]
pub struct ConvexPolygon {
    normals: Vec<Vector3<f64>>,
}

impl ConvexPolygon {
    /// Build a polygon from its vertices given as unit vectors.
    ///
    /// The vertices may be listed clockwise or counter-clockwise, and a closing vertex
    /// equal to the first one is ignored.
    ///
    /// Return
    /// ----------
    /// * The polygon, or [`SkylocError::UnsupportedRepresentation`] when it has fewer
    ///   than three distinct vertices, a degenerate edge, or is not convex.
    pub fn new(vertices: &[Vector3<f64>]) -> Result<Self, SkylocError> {
        let mut vertices = vertices.to_vec();
        if vertices.len() > 1 && (vertices[0] - vertices[vertices.len() - 1]).norm() < 1e-12 {
            vertices.pop();
        }
        if vertices.len() < 3 {
            return Err(SkylocError::UnsupportedRepresentation(format!(
                "polygon needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }

        let n = vertices.len();
        let mut normals = Vec::with_capacity(n);
        for i in 0..n {
            let edge = vertices[i].cross(&vertices[(i + 1) % n]);
            let norm = edge.norm();
            if norm < 1e-12 {
                return Err(SkylocError::UnsupportedRepresentation(format!(
                    "polygon edge {i} is degenerate"
                )));
            }
            normals.push(edge / norm);
        }

        // orient the normals towards the vertex barycenter
        let barycenter: Vector3<f64> = vertices.iter().sum();
        let orientation: f64 = normals.iter().map(|n| n.dot(&barycenter)).sum();
        if orientation < 0.0 {
            normals.iter_mut().for_each(|n| *n = -*n);
        }

        for (i, normal) in normals.iter().enumerate() {
            if vertices.iter().any(|v| normal.dot(v) < -1e-10) {
                return Err(SkylocError::UnsupportedRepresentation(format!(
                    "polygon is not convex at edge {i}"
                )));
            }
        }

        Ok(ConvexPolygon { normals })
    }

    /// Whether the unit vector `v` lies inside the polygon (boundary included).
    pub fn contains(&self, v: &Vector3<f64>) -> bool {
        self.normals.iter().all(|n| n.dot(v) >= 0.0)
    }

    /// Whether a circle of angular `radius` around `v` may intersect the polygon.
    fn may_intersect(&self, v: &Vector3<f64>, radius: Radian) -> bool {
        let slack = -radius.min(std::f64::consts::FRAC_PI_2).sin();
        self.normals.iter().all(|n| n.dot(v) >= slack)
    }
}

/// Pixels whose center lies inside a convex polygon.
///
/// Return
/// ----------
/// * Sorted NESTED indices at `order`.
pub fn query_polygon(order: u8, polygon: &ConvexPolygon) -> Vec<u64> {
    let mut out = Vec::new();
    for face in 0..N_BASE_PIXELS {
        descend(0, face, &mut out, &|depth, ipix| {
            let center = pix2vec_nest(depth, ipix);
            if depth == order {
                Coverage::from_bool(polygon.contains(&center))
            } else if polygon.may_intersect(&center, max_pixrad(depth)) {
                Coverage::Partial
            } else {
                Coverage::Outside
            }
        });
    }
    out
}

enum Coverage {
    Inside,
    Partial,
    Outside,
}

impl Coverage {
    fn from_bool(inside: bool) -> Self {
        if inside {
            Coverage::Inside
        } else {
            Coverage::Outside
        }
    }
}

fn descend<F>(depth: u8, ipix: u64, out: &mut Vec<u64>, test: &F)
where
    F: Fn(u8, u64) -> Coverage,
{
    match test(depth, ipix) {
        Coverage::Outside => {}
        Coverage::Inside => out.push(ipix),
        Coverage::Partial => {
            for child in 4 * ipix..4 * ipix + 4 {
                descend(depth + 1, child, out, test);
            }
        }
    }
}

#[cfg(test)]
mod query_test {
    use super::*;
    use crate::healpix::{lonlat_to_vec, npix, pix2ang_nest};
    use std::f64::consts::PI;

    #[test]
    fn test_query_disc_matches_brute_force() {
        let order = 5;
        let center = lonlat_to_vec(1.0, -0.3);
        let radius = 0.2;

        let fast = query_disc(order, &center, radius);
        let brute: Vec<u64> = (0..npix(order))
            .filter(|&p| angular_distance(&pix2vec_nest(order, p), &center) <= radius)
            .collect();

        assert!(!fast.is_empty());
        assert_eq!(fast, brute);
    }

    #[test]
    fn test_query_disc_around_pole_and_full_sky() {
        let north = Vector3::new(0.0, 0.0, 1.0);
        let cap = query_disc(3, &north, 0.3);
        assert!(cap
            .iter()
            .all(|&p| pix2ang_nest(3, p).1 >= PI / 2.0 - 0.3 - 1e-12));

        let all = query_disc(2, &north, PI);
        assert_eq!(all.len() as u64, npix(2));
    }

    #[test]
    fn test_query_polygon_matches_brute_force() {
        let vertices: Vec<_> = [(0.1, 0.1), (0.5, 0.1), (0.5, 0.4), (0.1, 0.4)]
            .iter()
            .map(|&(lon, lat)| lonlat_to_vec(lon, lat))
            .collect();
        let polygon = ConvexPolygon::new(&vertices).unwrap();

        let order = 6;
        let fast = query_polygon(order, &polygon);
        let brute: Vec<u64> = (0..npix(order))
            .filter(|&p| polygon.contains(&pix2vec_nest(order, p)))
            .collect();
        assert!(!fast.is_empty());
        assert_eq!(fast, brute);
    }

    #[test]
    fn test_polygon_orientation_does_not_matter() {
        let mut vertices: Vec<_> = [(0.1, 0.1), (0.5, 0.1), (0.3, 0.4)]
            .iter()
            .map(|&(lon, lat)| lonlat_to_vec(lon, lat))
            .collect();
        let ccw = query_polygon(6, &ConvexPolygon::new(&vertices).unwrap());
        vertices.reverse();
        let cw = query_polygon(6, &ConvexPolygon::new(&vertices).unwrap());
        assert_eq!(ccw, cw);
    }

    #[test]
    fn test_invalid_polygons() {
        let v = |lon: f64, lat: f64| lonlat_to_vec(lon, lat);

        assert!(ConvexPolygon::new(&[v(0.0, 0.0), v(0.1, 0.0)]).is_err());

        // closing vertex is dropped, leaving two vertices
        assert!(ConvexPolygon::new(&[v(0.0, 0.0), v(0.1, 0.0), v(0.0, 0.0)]).is_err());

        // arrow head shape
        let concave = [
            v(0.0, 0.0),
            v(0.4, 0.0),
            v(0.4, 0.4),
            v(0.2, 0.1),
            v(0.0, 0.4),
        ];
        assert!(matches!(
            ConvexPolygon::new(&concave),
            Err(SkylocError::UnsupportedRepresentation(_))
        ));
    }
}
