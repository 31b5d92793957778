//! # Constants and type definitions for skyloc
//!
//! This module centralizes the **angular constants**, **HEALPix limits** and
//! **default pipeline parameters** used throughout the crate, together with
//! the type aliases that make units explicit in function signatures.
//!
//! ## Overview
//!
//! - Angle conversions (degrees ↔ radians)
//! - HEALPix resolution limits
//! - Error-radius conventions of the reporting missions
//! - Defaults of the occultation and contour stages

// -------------------------------------------------------------------------------------------------
// Angular constants
// -------------------------------------------------------------------------------------------------

/// 2π, useful for longitude wrapping
pub const DPI: f64 = 2. * std::f64::consts::PI;

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

/// Solid angle of the full sphere in steradians
pub const FULL_SKY: f64 = 4. * std::f64::consts::PI;

// -------------------------------------------------------------------------------------------------
// HEALPix limits
// -------------------------------------------------------------------------------------------------

/// Deepest HEALPix order representable with 64-bit UNIQ indices
pub const MAX_ORDER: u8 = 29;

/// Number of base pixels of the HEALPix tessellation
pub const N_BASE_PIXELS: u64 = 12;

// -------------------------------------------------------------------------------------------------
// Mission conventions
// -------------------------------------------------------------------------------------------------

/// Mission whose notices report a 90% containment radius instead of a 1-sigma radius
pub const AMON_MISSION: &str = "AMON";

/// Containment probability of the radius reported by [`AMON_MISSION`]
pub const AMON_CONTAINMENT: f64 = 0.95;

/// Percent point function of the chi distribution with two degrees of freedom.
///
/// The chi(2) CDF is `1 - exp(-x²/2)`, so the quantile has the closed form
/// `sqrt(-2 ln(1 - p))`.
///
/// Arguments
/// -----------------
/// * `p`: the cumulative probability, in `[0, 1)`.
///
/// Return
/// ----------
/// * The radius (in units of sigma) enclosing a fraction `p` of a 2-D Gaussian.
pub fn chi2dof_ppf(p: f64) -> f64 {
    (-2.0 * (1.0 - p).ln()).sqrt()
}

// -------------------------------------------------------------------------------------------------
// Pipeline defaults
// -------------------------------------------------------------------------------------------------

/// Default angular radius of the occulting Earth disc, used when `GEO_RAD` is absent
pub const DEFAULT_GEO_RADIUS: Degree = 67.5;

/// HEALPix order at which occultation masks are applied (nside 128)
pub const OCCULTATION_ORDER: u8 = 7;

/// HEALPix order used to rasterize polygons (nside 1024)
pub const POLYGON_ORDER: u8 = 10;

/// Credible levels (percent) at which contours are drawn
pub const CONTOUR_LEVELS: [u32; 2] = [50, 90];

/// Relative tolerance on the integral of the probability density over the sphere
pub const NORMALIZATION_TOLERANCE: f64 = 1e-6;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Angle in radians
pub type Radian = f64;
/// Solid angle in steradians
pub type Steradian = f64;
/// Multi-order HEALPix pixel index
pub type Uniq = u64;
/// Credible level in percent
pub type Percent = f64;
