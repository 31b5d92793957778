pub mod cache;
pub mod config;
pub mod constants;
pub mod contour;
pub mod env_state;
pub mod healpix;
pub mod localization;
pub mod notice;
pub mod skyloc;
pub mod skyloc_errors;
pub mod skymap;
pub mod time;

#[cfg(test)]
#[path = "../tests/common/fits.rs"]
pub(crate) mod fits_fixture;
