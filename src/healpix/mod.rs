//! # HEALPix NESTED scheme and multi-order (UNIQ) indexing
//!
//! Minimal HEALPix toolkit used by the skymap builders, the occultation mask
//! and the contour generator.
//!
//! ## Conventions
//!
//! - Resolution is expressed as an **order** `k`, with `nside = 2^k` and
//!   `npix = 12 · 4^k`.
//! - Pixel indices are in the **NESTED** scheme unless stated otherwise.
//! - Sky positions are `(lon, lat)` in **radians** (right ascension, declination).
//! - A multi-order pixel is identified by its UNIQ index
//!   `uniq = 4 · 4^order + ipix`, so that a single integer carries both the order
//!   and the position.
//!
//! ## Submodules
//!
//! - [`query`](crate::healpix::query) – cone and convex-polygon coverage by hierarchical descent.
//! - [`moc`](crate::healpix::moc) – rasterize / derasterize multi-order maps.
//!
//! ## References
//!
//! * Górski et al. (2005), *HEALPix: a Framework for High-Resolution Discretization
//!   and Fast Analysis of Data Distributed on the Sphere*, ApJ 622, 759.
//! * IVOA MOC 2.0 recommendation for the UNIQ numbering.

pub mod moc;
pub mod query;

use nalgebra::Vector3;
use std::f64::consts::{FRAC_PI_2, PI};

use crate::{
    constants::{Radian, Steradian, Uniq, DPI, MAX_ORDER, N_BASE_PIXELS},
    skyloc_errors::SkylocError,
};

const JRLL: [i64; 12] = [2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4];
const JPLL: [i64; 12] = [1, 3, 5, 7, 0, 2, 4, 6, 1, 3, 5, 7];

/// Number of pixels along a base-pixel side at the given order.
#[inline]
pub fn nside(order: u8) -> u64 {
    1 << order
}

/// Total number of pixels covering the sphere at the given order.
#[inline]
pub fn npix(order: u8) -> u64 {
    N_BASE_PIXELS << (2 * order as u64)
}

/// Solid angle of one pixel at the given order.
#[inline]
pub fn pixel_area(order: u8) -> Steradian {
    PI / (3.0 * (1u64 << (2 * order as u64)) as f64)
}

/// Square root of the pixel solid angle (the astropy-healpix "pixel resolution").
#[inline]
pub fn pixel_resolution(order: u8) -> Radian {
    pixel_area(order).sqrt()
}

/// Upper bound of the angular distance between a pixel center and any point of the pixel.
///
/// HEALPix pixels are not circles; the largest center-to-corner distance is below
/// `1.2 × pixel_resolution` for every order, so `1.6 ×` is a safe bound for pruning
/// hierarchical searches. The bound is capped at π.
#[inline]
pub fn max_pixrad(order: u8) -> Radian {
    (1.6 * pixel_resolution(order)).min(PI)
}

/// Lowest order whose pixel resolution does not exceed `resolution`.
///
/// Same rule as `astropy_healpix.pixel_resolution_to_nside(resolution, round='up')`:
/// `order = ceil(log2(sqrt(π/3) / resolution))`, clamped to `[0, MAX_ORDER]`.
///
/// Arguments
/// -----------------
/// * `resolution`: target pixel resolution in radians, strictly positive.
///
/// Return
/// ----------
/// * The HEALPix order.
pub fn order_for_resolution(resolution: Radian) -> u8 {
    let level = ((PI / 3.0).sqrt() / resolution).log2().ceil();
    if level.is_nan() || level <= 0.0 {
        0
    } else if level >= MAX_ORDER as f64 {
        MAX_ORDER
    } else {
        level as u8
    }
}

// -------------------------------------------------------------------------------------------------
// Bit interleaving
// -------------------------------------------------------------------------------------------------

#[inline]
fn spread_bits(v: u64) -> u64 {
    let mut x = v & 0x0000_0000_FFFF_FFFF;
    x = (x | (x << 16)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x << 8)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x << 4)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x << 2)) & 0x3333_3333_3333_3333;
    (x | (x << 1)) & 0x5555_5555_5555_5555
}

#[inline]
fn compress_bits(v: u64) -> u64 {
    let mut x = v & 0x5555_5555_5555_5555;
    x = (x | (x >> 1)) & 0x3333_3333_3333_3333;
    x = (x | (x >> 2)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x >> 4)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x >> 8)) & 0x0000_FFFF_0000_FFFF;
    (x | (x >> 16)) & 0x0000_0000_FFFF_FFFF
}

#[inline]
fn xyf2nest(order: u8, ix: u64, iy: u64, face: u64) -> u64 {
    (face << (2 * order as u64)) + spread_bits(ix) + (spread_bits(iy) << 1)
}

#[inline]
fn nest2xyf(order: u8, ipix: u64) -> (u64, u64, u64) {
    let face = ipix >> (2 * order as u64);
    let pix = ipix & ((1u64 << (2 * order as u64)) - 1);
    (compress_bits(pix), compress_bits(pix >> 1), face)
}

// -------------------------------------------------------------------------------------------------
// Position ↔ pixel
// -------------------------------------------------------------------------------------------------

/// NESTED pixel containing the sky position `(lon, lat)`.
///
/// Arguments
/// -----------------
/// * `order`: HEALPix order.
/// * `lon`: longitude (right ascension) in radians, any value (wrapped).
/// * `lat`: latitude (declination) in radians, in `[-π/2, π/2]`.
///
/// Return
/// ----------
/// * The NESTED pixel index.
pub fn ang2pix_nest(order: u8, lon: Radian, lat: Radian) -> u64 {
    let nside = nside(order) as i64;
    let z = lat.sin();
    let sth = lat.cos();
    let za = z.abs();
    let tt = (lon.rem_euclid(DPI) / FRAC_PI_2).rem_euclid(4.0);

    if za <= 2.0 / 3.0 {
        let temp1 = nside as f64 * (0.5 + tt);
        let temp2 = nside as f64 * z * 0.75;
        let jp = (temp1 - temp2) as i64; // ascending edge line
        let jm = (temp1 + temp2) as i64; // descending edge line
        let ifp = jp >> order;
        let ifm = jm >> order;
        let face = if ifp == ifm {
            ifp | 4
        } else if ifp < ifm {
            ifp
        } else {
            ifm + 8
        };
        let ix = jm & (nside - 1);
        let iy = nside - (jp & (nside - 1)) - 1;
        xyf2nest(order, ix as u64, iy as u64, face as u64)
    } else {
        let ntt = (tt as i64).min(3);
        let tp = tt - ntt as f64;
        let tmp = if za < 0.99 {
            nside as f64 * (3.0 * (1.0 - za)).sqrt()
        } else {
            nside as f64 * sth / ((1.0 + za) / 3.0).sqrt()
        };
        let jp = ((tp * tmp) as i64).min(nside - 1);
        let jm = (((1.0 - tp) * tmp) as i64).min(nside - 1);
        if z > 0.0 {
            xyf2nest(
                order,
                (nside - jm - 1) as u64,
                (nside - jp - 1) as u64,
                ntt as u64,
            )
        } else {
            xyf2nest(order, jp as u64, jm as u64, (ntt + 8) as u64)
        }
    }
}

/// Center of a NESTED pixel as `(z, sin θ, φ)` with `z = sin(lat)` and `sin θ = cos(lat)`.
fn pix2zphi_nest(order: u8, ipix: u64) -> (f64, f64, f64) {
    let nside = nside(order) as i64;
    let npix = npix(order) as f64;
    let fact2 = 4.0 / npix;
    let fact1 = (2 * nside) as f64 * fact2;

    let (ix, iy, face) = nest2xyf(order, ipix);
    let (ix, iy, face) = (ix as i64, iy as i64, face as usize);

    let jr = (JRLL[face] << order) - ix - iy - 1;

    let (nr, z, sth) = if jr < nside {
        // north polar cap
        let nr = jr;
        let tmp = (nr * nr) as f64 * fact2;
        (nr, 1.0 - tmp, (tmp * (2.0 - tmp)).sqrt())
    } else if jr > 3 * nside {
        // south polar cap
        let nr = 4 * nside - jr;
        let tmp = (nr * nr) as f64 * fact2;
        (nr, tmp - 1.0, (tmp * (2.0 - tmp)).sqrt())
    } else {
        let z = (2 * nside - jr) as f64 * fact1;
        (nside, z, ((1.0 - z) * (1.0 + z)).sqrt())
    };

    let mut tmp = JPLL[face] * nr + ix - iy;
    if tmp < 0 {
        tmp += 8 * nr;
    }
    let phi = (0.5 * FRAC_PI_2 * tmp as f64) / nr as f64;
    (z, sth, phi)
}

/// Center of a NESTED pixel as `(lon, lat)` in radians, `lon ∈ [0, 2π)`.
pub fn pix2ang_nest(order: u8, ipix: u64) -> (Radian, Radian) {
    let (z, sth, phi) = pix2zphi_nest(order, ipix);
    (phi.rem_euclid(DPI), z.atan2(sth))
}

/// Center of a NESTED pixel as a unit vector.
pub fn pix2vec_nest(order: u8, ipix: u64) -> Vector3<f64> {
    let (z, sth, phi) = pix2zphi_nest(order, ipix);
    Vector3::new(sth * phi.cos(), sth * phi.sin(), z)
}

/// Center of a RING pixel as `(lon, lat)` in radians.
fn pix2ang_ring(order: u8, ipix: u64) -> (Radian, Radian) {
    let nside = nside(order) as i64;
    let npix = npix(order) as i64;
    let ncap = 2 * nside * (nside - 1);
    let fact2 = 4.0 / npix as f64;
    let fact1 = (2 * nside) as f64 * fact2;
    let pix = ipix as i64;

    let (z, phi) = if pix < ncap {
        let iring = (1 + isqrt(1 + 2 * pix)) >> 1;
        let iphi = (pix + 1) - 2 * iring * (iring - 1);
        let z = 1.0 - (iring * iring) as f64 * fact2;
        (z, (iphi as f64 - 0.5) * FRAC_PI_2 / iring as f64)
    } else if pix < npix - ncap {
        let nl4 = 4 * nside;
        let ip = pix - ncap;
        let tmp = ip / nl4;
        let iring = tmp + nside;
        let iphi = ip - nl4 * tmp + 1;
        let fodd = if ((iring + nside) & 1) != 0 { 1.0 } else { 0.5 };
        let z = (2 * nside - iring) as f64 * fact1;
        (z, (iphi as f64 - fodd) * PI * 0.75 * fact1)
    } else {
        let ip = npix - pix;
        let iring = (1 + isqrt(2 * ip - 1)) >> 1;
        let iphi = 4 * iring + 1 - (ip - 2 * iring * (iring - 1));
        let z = (iring * iring) as f64 * fact2 - 1.0;
        (z, (iphi as f64 - 0.5) * FRAC_PI_2 / iring as f64)
    };
    (phi, z.asin())
}

fn isqrt(v: i64) -> i64 {
    let mut r = (v as f64).sqrt() as i64;
    while r * r > v {
        r -= 1;
    }
    while (r + 1) * (r + 1) <= v {
        r += 1;
    }
    r
}

/// Convert a RING pixel index to the NESTED scheme at the same order.
pub fn ring2nest(order: u8, ipix: u64) -> u64 {
    let (lon, lat) = pix2ang_ring(order, ipix);
    ang2pix_nest(order, lon, lat)
}

// -------------------------------------------------------------------------------------------------
// UNIQ indexing
// -------------------------------------------------------------------------------------------------

/// Encode a NESTED pixel at `order` as a UNIQ index.
#[inline]
pub fn nest2uniq(order: u8, ipix: u64) -> Uniq {
    (4u64 << (2 * order as u64)) + ipix
}

/// Decode a UNIQ index into `(order, ipix)`.
///
/// Return
/// ----------
/// * `(order, nested pixel)` or [`SkylocError::IntegrityViolation`] for indices
///   below 4 or beyond [`MAX_ORDER`].
pub fn uniq2nest(uniq: Uniq) -> Result<(u8, u64), SkylocError> {
    if uniq < 4 {
        return Err(SkylocError::IntegrityViolation(format!(
            "invalid UNIQ index {uniq}"
        )));
    }
    let msb = 63 - uniq.leading_zeros() as u64;
    let order = msb / 2 - 1;
    if order > MAX_ORDER as u64 {
        return Err(SkylocError::IntegrityViolation(format!(
            "UNIQ index {uniq} is beyond order {MAX_ORDER}"
        )));
    }
    let order = order as u8;
    Ok((order, uniq - (4u64 << (2 * order as u64))))
}

/// Solid angle of the pixel designated by a UNIQ index.
pub fn uniq_pixel_area(uniq: Uniq) -> Result<Steradian, SkylocError> {
    uniq2nest(uniq).map(|(order, _)| pixel_area(order))
}

// -------------------------------------------------------------------------------------------------
// Spherical geometry helpers
// -------------------------------------------------------------------------------------------------

/// Unit vector of the sky position `(lon, lat)` in radians.
pub fn lonlat_to_vec(lon: Radian, lat: Radian) -> Vector3<f64> {
    Vector3::new(lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin())
}

/// `(lon, lat)` in radians of a (not necessarily unit) vector, `lon ∈ [0, 2π)`.
pub fn vec_to_lonlat(v: &Vector3<f64>) -> (Radian, Radian) {
    let lon = v.y.atan2(v.x).rem_euclid(DPI);
    let lat = v.z.atan2((v.x * v.x + v.y * v.y).sqrt());
    (lon, lat)
}

/// Great-circle distance between two unit vectors, accurate at all separations.
#[inline]
pub fn angular_distance(a: &Vector3<f64>, b: &Vector3<f64>) -> Radian {
    a.cross(b).norm().atan2(a.dot(b))
}
