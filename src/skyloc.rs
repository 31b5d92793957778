//! # Skyloc: localization pipeline façade
//!
//! This module defines the [`Skyloc`](crate::skyloc::Skyloc) struct, which wires the
//! pipeline stages together:
//!
//! 1. **Notice parsing** ([`AlertNotice`]) – metadata of the incoming VOEvent.
//! 2. **Skymap building** – source selected by [`SkymapSource::from_voevent`], then
//!    the cone, polygon or external-grid strategy.
//! 3. **Canonicalization** ([`canonicalize`]) – ordering, uniqueness and normalization checks.
//! 4. **Occultation** ([`apply_occultation`]) – external grids only, when their header
//!    declares an occulting body; the masked map is canonicalized again.
//! 5. **Contours** ([`Localization::compute_contour`]) – credible regions and the
//!    maximum a posteriori position.
//!
//! Every failure is wrapped in [`SkylocError::Stage`] with the notice identifier and the
//! stage it happened in. Computed localizations are kept in a
//! [`LocalizationCache`] keyed by notice identifier.
//!
//! ## Typical usage
//!
//! ```rust, no_run
//! use skyloc::{config::SkylocConfig, notice::voevent::VoEvent, skyloc::Skyloc};
//!
//! let skyloc = Skyloc::new(SkylocConfig::default());
//! let xml = std::fs::read_to_string("notice.xml").unwrap();
//! let voevent = VoEvent::from_xml(&xml).unwrap();
//!
//! let notice = skyloc.parse_notice(&voevent).unwrap();
//! if let Some(localization) = skyloc.localize(&voevent).unwrap() {
//!     println!("{} {}", notice.ivorn, serde_json::to_string(&*localization).unwrap());
//! }
//! ```
//!
//! ## See also
//! ------------
//! * [`SkylocConfig`] – Tunables of every stage.
//! * [`SkylocEnv`] – HTTP client used by the external-grid strategy.

use std::sync::Arc;

use camino::Utf8Path;
use tracing::info;

use crate::{
    cache::LocalizationCache,
    config::SkylocConfig,
    env_state::SkylocEnv,
    localization::Localization,
    notice::{voevent::VoEvent, AlertNotice},
    skyloc_errors::{SkylocError, Stage, StageContext},
    skymap::{
        canonical::canonicalize,
        cone::from_cone_with,
        grid::{self, GridMap},
        occultation::apply_occultation,
        polygon::from_polygon_with,
        GridSource, SkyMap, SkymapSource,
    },
};

#[derive(Debug, Default)]
pub struct Skyloc {
    env_state: SkylocEnv,
    config: SkylocConfig,
    cache: LocalizationCache,
}

impl Skyloc {
    /// Construct a new [`Skyloc`] pipeline.
    ///
    /// Arguments
    /// -----------------
    /// * `config`: tunables of the pipeline; also configures the HTTP client.
    ///
    /// Return
    /// ----------
    /// * A pipeline with an empty localization cache.
    pub fn new(config: SkylocConfig) -> Self {
        Skyloc {
            env_state: SkylocEnv::new(&config),
            config,
            cache: LocalizationCache::new(),
        }
    }

    pub fn config(&self) -> &SkylocConfig {
        &self.config
    }

    pub fn env_state(&self) -> &SkylocEnv {
        &self.env_state
    }

    pub fn cache(&self) -> &LocalizationCache {
        &self.cache
    }

    /// Extract the metadata of a notice.
    pub fn parse_notice(&self, voevent: &VoEvent) -> Result<AlertNotice, SkylocError> {
        AlertNotice::from_voevent(voevent).in_stage(&voevent.ivorn, Stage::NoticeParser)
    }

    /// Build, canonicalize and, for external grids, mask the skymap of a source.
    ///
    /// Arguments
    /// -----------------
    /// * `notice`: identifier of the notice the source comes from, used in error context.
    /// * `source`: the construction strategy and its parameters.
    ///
    /// Return
    /// ----------
    /// * A canonical skymap: strictly ascending UNIQ, no duplicates, unit integral.
    /// * A [`SkylocError::Stage`] naming the failing stage otherwise.
    ///
    /// See also
    /// ------------
    /// * [`SkymapSource::from_voevent`] – Source selection from a notice.
    pub fn build_skymap(&self, notice: &str, source: &SkymapSource) -> Result<SkyMap, SkylocError> {
        let config = &self.config;
        let tolerance = config.normalization_tolerance;

        let GridMap {
            skymap,
            occulting_disc,
        } = self.build_raw(source).in_stage(notice, Stage::SkymapBuilder)?;
        let skymap = canonicalize(skymap, tolerance).in_stage(notice, Stage::Canonicalizer)?;

        let skymap = match occulting_disc {
            Some(disc) => {
                let masked = apply_occultation(&skymap, &disc, config.occultation_order)
                    .in_stage(notice, Stage::OcclusionMasker)?;
                canonicalize(masked, tolerance).in_stage(notice, Stage::Canonicalizer)?
            }
            None => skymap,
        };

        info!(
            notice,
            name = %skymap.localization_name,
            pixels = skymap.len(),
            "skymap built"
        );
        Ok(skymap)
    }

    fn build_raw(&self, source: &SkymapSource) -> Result<GridMap, SkylocError> {
        let config = &self.config;
        let geo_radius = config.default_occultation_radius;
        let staging_dir = config.staging_dir.as_deref().map(Utf8Path::as_std_path);
        let plain = |skymap: SkyMap| GridMap {
            skymap,
            occulting_disc: None,
        };

        match source {
            SkymapSource::Cone { ra, dec, error } => from_cone_with(
                *ra,
                *dec,
                *error,
                config.cone_pixels_per_radius,
                config.cone_sigma_extent,
            )
            .map(plain),
            SkymapSource::Polygon {
                localization_name,
                vertices,
            } => from_polygon_with(localization_name, vertices, config.polygon_order).map(plain),
            SkymapSource::Grid(GridSource::Url(url)) => {
                grid::from_url(&self.env_state, url, geo_radius, staging_dir)
            }
            SkymapSource::Grid(GridSource::Inline(payload)) => {
                grid::from_bytes(payload, geo_radius, staging_dir)
            }
            SkymapSource::Grid(GridSource::File(path)) => grid::read_fits(
                path.as_std_path(),
                path.file_name().unwrap_or_default().to_string(),
                geo_radius,
            ),
        }
    }

    /// Skymap of a notice.
    ///
    /// Return
    /// ----------
    /// * `Ok(None)` for retractions and notices without a usable localization.
    pub fn get_skymap(&self, voevent: &VoEvent) -> Result<Option<SkyMap>, SkylocError> {
        let notice = voevent.ivorn.as_str();
        SkymapSource::from_voevent(voevent)
            .in_stage(notice, Stage::SkymapBuilder)?
            .map(|source| self.build_skymap(notice, &source))
            .transpose()
    }

    /// Skymap and contours of a notice, computed once and cached by notice identifier.
    ///
    /// Arguments
    /// -----------------
    /// * `voevent`: the parsed notice.
    ///
    /// Return
    /// ----------
    /// * `Ok(None)` for retractions and notices without a usable localization.
    /// * The shared localization otherwise; a later call for the same notice returns the
    ///   same instance until [`invalidate`](Skyloc::invalidate) is called.
    pub fn localize(&self, voevent: &VoEvent) -> Result<Option<Arc<Localization>>, SkylocError> {
        let notice = voevent.ivorn.as_str();
        let Some(source) = SkymapSource::from_voevent(voevent).in_stage(notice, Stage::SkymapBuilder)?
        else {
            return Ok(None);
        };

        self.cache
            .get_or_try_insert(notice, || {
                let mut localization = Localization::new(self.build_skymap(notice, &source)?);
                localization
                    .compute_contour(&self.config.contour_levels, self.config.contour_max_grid)
                    .in_stage(notice, Stage::ContourGenerator)?;
                Ok(localization)
            })
            .map(Some)
    }

    /// Parse an XML notice and localize it.
    pub fn localize_xml(&self, xml: &str) -> Result<Option<Arc<Localization>>, SkylocError> {
        let voevent = VoEvent::from_xml(xml).in_stage("<unparsed>", Stage::NoticeParser)?;
        self.localize(&voevent)
    }

    /// Drop the cached localization of a superseded notice.
    pub fn invalidate(&self, ivorn: &str) -> bool {
        self.cache.invalidate(ivorn)
    }
}
