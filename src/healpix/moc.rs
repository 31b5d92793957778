//! Conversions between multi-order (UNIQ) maps and fixed-order NESTED grids.
//!
//! - [`rasterize`] spreads a multi-order probability density onto a single order
//!   as per-pixel **probabilities**: coarse pixels are split evenly among their
//!   descendants, finer pixels are summed into their ancestor.
//! - [`derasterize`] turns per-pixel probabilities back into a multi-order
//!   **density** map, merging every complete quartet of sibling pixels that
//!   carry exactly the same density into their parent.
//! - [`MocIndex`] answers point-location queries on a multi-order map.

use crate::{
    constants::{Radian, Uniq},
    healpix::{ang2pix_nest, nest2uniq, npix, pixel_area, uniq2nest},
    skyloc_errors::SkylocError,
};

/// Per-pixel probability at a fixed order from a multi-order density map.
///
/// Arguments
/// -----------------
/// * `uniq`: multi-order pixel indices.
/// * `probdensity`: probability density (per steradian) aligned with `uniq`.
/// * `order`: target order of the NESTED grid.
///
/// Return
/// ----------
/// * A vector of length `npix(order)` indexed by NESTED pixel; pixels not covered
///   by the map carry zero probability.
pub fn rasterize(uniq: &[Uniq], probdensity: &[f64], order: u8) -> Result<Vec<f64>, SkylocError> {
    if uniq.len() != probdensity.len() {
        return Err(SkylocError::IntegrityViolation(format!(
            "{} UNIQ indices for {} densities",
            uniq.len(),
            probdensity.len()
        )));
    }

    let mut prob = vec![0.0; npix(order) as usize];
    for (&u, &rho) in uniq.iter().zip(probdensity) {
        let (pix_order, ipix) = uniq2nest(u)?;
        if pix_order <= order {
            let shift = 2 * (order - pix_order) as u64;
            let start = (ipix << shift) as usize;
            let p = rho * pixel_area(order);
            prob[start..start + (1usize << shift)]
                .iter_mut()
                .for_each(|x| *x += p);
        } else {
            let parent = ipix >> (2 * (pix_order - order) as u64);
            prob[parent as usize] += rho * pixel_area(pix_order);
        }
    }
    Ok(prob)
}

/// Multi-order density map from per-pixel probabilities at a fixed order.
///
/// Arguments
/// -----------------
/// * `prob`: per-pixel probability, NESTED ordering, length `npix(order)`.
/// * `order`: order of the input grid.
///
/// Return
/// ----------
/// * `(uniq, probdensity)` covering the whole sphere, not sorted.
pub fn derasterize(prob: &[f64], order: u8) -> Result<(Vec<Uniq>, Vec<f64>), SkylocError> {
    if prob.len() as u64 != npix(order) {
        return Err(SkylocError::IntegrityViolation(format!(
            "grid of {} pixels does not match order {order}",
            prob.len()
        )));
    }

    let area = pixel_area(order);
    let mut level: Vec<Option<f64>> = prob.iter().map(|p| Some(p / area)).collect();
    let mut uniq = Vec::new();
    let mut probdensity = Vec::new();

    for pix_order in (1..=order).rev() {
        let mut parents = Vec::with_capacity(level.len() / 4);
        for (parent, quartet) in level.chunks_exact(4).enumerate() {
            match quartet {
                [Some(a), Some(b), Some(c), Some(d)] if a == b && b == c && c == d => {
                    parents.push(Some(*a));
                }
                _ => {
                    for (k, rho) in quartet.iter().enumerate() {
                        if let Some(rho) = rho {
                            uniq.push(nest2uniq(pix_order, 4 * parent as u64 + k as u64));
                            probdensity.push(*rho);
                        }
                    }
                    parents.push(None);
                }
            }
        }
        level = parents;
    }

    for (ipix, rho) in level.iter().enumerate() {
        if let Some(rho) = rho {
            uniq.push(nest2uniq(0, ipix as u64));
            probdensity.push(*rho);
        }
    }

    Ok((uniq, probdensity))
}

/// Point location on a multi-order map.
///
/// Every pixel is expanded into the half-open range of NESTED indices it covers at
/// the deepest order of the map; ranges are sorted so a lookup is a binary search.
#[derive(Debug, Clone)]
pub struct MocIndex {
    max_order: u8,
    ranges: Vec<(u64, u64, usize)>,
}

impl MocIndex {
    pub fn new(uniq: &[Uniq]) -> Result<Self, SkylocError> {
        let decoded = uniq
            .iter()
            .map(|&u| uniq2nest(u))
            .collect::<Result<Vec<_>, _>>()?;
        let max_order = decoded.iter().map(|(o, _)| *o).max().unwrap_or(0);

        let mut ranges: Vec<(u64, u64, usize)> = decoded
            .iter()
            .enumerate()
            .map(|(i, &(order, ipix))| {
                let shift = 2 * (max_order - order) as u64;
                (ipix << shift, (ipix + 1) << shift, i)
            })
            .collect();
        ranges.sort_unstable_by_key(|r| r.0);

        Ok(MocIndex { max_order, ranges })
    }

    /// Position in the map arrays of the pixel containing `(lon, lat)`, if covered.
    pub fn find(&self, lon: Radian, lat: Radian) -> Option<usize> {
        let hash = ang2pix_nest(self.max_order, lon, lat);
        let pos = self.ranges.partition_point(|r| r.0 <= hash);
        if pos == 0 {
            return None;
        }
        let (start, end, idx) = self.ranges[pos - 1];
        (start..end).contains(&hash).then_some(idx)
    }
}
