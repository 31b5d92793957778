//! # Pipeline configuration
//!
//! [`SkylocConfig`] gathers every tunable of the localization pipeline. All fields
//! have defaults, so a partial JSON document (or none at all) is enough:
//!
//! ```rust
//! use skyloc::config::SkylocConfig;
//!
//! let config: SkylocConfig = serde_json::from_str(r#"{ "fetch_retries": 5 }"#).unwrap();
//! assert_eq!(config.fetch_retries, 5);
//! assert_eq!(config.polygon_order, 10);
//! ```

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    constants::{
        Degree, CONTOUR_LEVELS, DEFAULT_GEO_RADIUS, NORMALIZATION_TOLERANCE, OCCULTATION_ORDER,
        POLYGON_ORDER,
    },
    skyloc_errors::SkylocError,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkylocConfig {
    /// Global timeout of one HTTP request, in seconds
    pub fetch_timeout_secs: u64,
    /// Number of retries after a failed download
    pub fetch_retries: u32,
    /// Base delay between two download attempts, multiplied by the attempt number
    pub fetch_backoff_ms: u64,

    /// Minimum number of pixels spanning the cone radius
    pub cone_pixels_per_radius: u32,
    /// Extent of the cone map, in units of the 1-sigma radius
    pub cone_sigma_extent: f64,

    /// HEALPix order used to rasterize polygons
    pub polygon_order: u8,

    /// HEALPix order at which occultation masks are applied
    pub occultation_order: u8,
    /// Occulting disc radius used when the FITS header has no `GEO_RAD`
    pub default_occultation_radius: Degree,
    /// Directory of staged grid payloads, the system temporary directory when unset
    pub staging_dir: Option<Utf8PathBuf>,

    /// Credible levels (percent) of the contours
    pub contour_levels: Vec<u32>,
    /// Maximum number of contour grid nodes along each axis
    pub contour_max_grid: usize,

    /// Relative tolerance on the integral of the density over the sphere
    pub normalization_tolerance: f64,
}

impl Default for SkylocConfig {
    fn default() -> Self {
        SkylocConfig {
            fetch_timeout_secs: 10,
            fetch_retries: 3,
            fetch_backoff_ms: 500,
            cone_pixels_per_radius: 16,
            cone_sigma_extent: 4.0,
            polygon_order: POLYGON_ORDER,
            occultation_order: OCCULTATION_ORDER,
            default_occultation_radius: DEFAULT_GEO_RADIUS,
            staging_dir: None,
            contour_levels: CONTOUR_LEVELS.to_vec(),
            contour_max_grid: 1024,
            normalization_tolerance: NORMALIZATION_TOLERANCE,
        }
    }
}

impl SkylocConfig {
    /// Read a configuration from a JSON file; absent fields keep their default.
    ///
    /// Arguments
    /// -----------------
    /// * `path`: the JSON document.
    ///
    /// Return
    /// ----------
    /// * The configuration, or an [`SkylocError::IoError`] / [`SkylocError::ConfigError`].
    pub fn from_json_file(path: &Utf8Path) -> Result<Self, SkylocError> {
        let text = fs::read_to_string(path)?;
        let config: SkylocConfig = serde_json::from_str(&text)?;
        debug!(path = %path, "loaded configuration");
        Ok(config)
    }
}
