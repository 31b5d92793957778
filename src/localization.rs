//! A canonical skymap together with its derived contour artifact.

use serde::{Deserialize, Serialize};

use crate::{
    contour::{geojson::FeatureCollection, get_contour},
    skyloc_errors::SkylocError,
    skymap::SkyMap,
};

/// One skymap and the contour derived from it.
///
/// `contour` stays `None` until [`Localization::compute_contour`] runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Localization {
    #[serde(flatten)]
    pub skymap: SkyMap,
    pub contour: Option<FeatureCollection>,
}

impl Localization {
    pub fn new(skymap: SkyMap) -> Self {
        Localization {
            skymap,
            contour: None,
        }
    }

    pub fn localization_name(&self) -> &str {
        &self.skymap.localization_name
    }

    /// Derive the contour at `credible_levels_pct` and store it, replacing any previous one.
    ///
    /// Arguments
    /// -----------------
    /// * `credible_levels_pct`: the credible levels, in percent.
    /// * `max_grid`: maximum number of sampling nodes per axis.
    ///
    /// See also
    /// ------------
    /// * [`get_contour`] – The underlying generator.
    pub fn compute_contour(
        &mut self,
        credible_levels_pct: &[u32],
        max_grid: usize,
    ) -> Result<&FeatureCollection, SkylocError> {
        let contour = get_contour(&self.skymap, credible_levels_pct, max_grid)?;
        Ok(self.contour.insert(contour))
    }
}

#[cfg(test)]
mod localization_test {
    use super::*;
    use crate::skymap::cone::from_cone;

    #[test]
    fn test_localization_json_schema() {
        let mut localization = Localization::new(from_cone(10.0, -20.0, 1.0).unwrap());
        let json = serde_json::to_value(&localization).unwrap();
        assert_eq!(json["localization_name"], "10.00000_-20.00000_1.00000");
        assert!(json["distmu"].is_null());
        assert!(json["contour"].is_null());

        localization.compute_contour(&[90], 256).unwrap();
        let json = serde_json::to_string(&localization).unwrap();
        let back: Localization = serde_json::from_str(&json).unwrap();
        assert_eq!(back, localization);
        assert_eq!(back.contour.unwrap().features.len(), 2);
    }
}
