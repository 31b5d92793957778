//! Canonical ordering and normalization checks shared by every builder.

use itertools::Itertools;
use tracing::debug;

use crate::{healpix::uniq2nest, skyloc_errors::SkylocError, skymap::SkyMap};

fn check_column(name: &str, column: &Option<Vec<f64>>, len: usize) -> Result<(), SkylocError> {
    match column {
        Some(values) if values.len() != len => Err(SkylocError::IntegrityViolation(format!(
            "{name} has {} values for {len} pixels",
            values.len()
        ))),
        _ => Ok(()),
    }
}

fn permute(column: Option<Vec<f64>>, order: &[usize]) -> Option<Vec<f64>> {
    column.map(|values| order.iter().map(|&i| values[i]).collect())
}

/// Sort a skymap by ascending UNIQ and check its invariants.
///
/// The density values are never modified: the columns are only permuted
/// together with `uniq`.
///
/// Arguments
/// -----------------
/// * `skymap`: builder output, in any pixel order.
/// * `tolerance`: relative tolerance on `Σ probdensity · area = 1`.
///
/// Return
/// ----------
/// * The sorted skymap.
/// * [`SkylocError::IntegrityViolation`] on misaligned columns, invalid or duplicate
///   UNIQ indices, negative or non-finite densities, or a normalization error
///   beyond `tolerance`.
pub fn canonicalize(skymap: SkyMap, tolerance: f64) -> Result<SkyMap, SkylocError> {
    let len = skymap.uniq.len();
    if skymap.probdensity.len() != len {
        return Err(SkylocError::IntegrityViolation(format!(
            "{len} UNIQ indices for {} densities",
            skymap.probdensity.len()
        )));
    }
    check_column("DISTMU", &skymap.distmu, len)?;
    check_column("DISTSIGMA", &skymap.distsigma, len)?;
    check_column("DISTNORM", &skymap.distnorm, len)?;

    if let Some(rho) = skymap
        .probdensity
        .iter()
        .find(|rho| !rho.is_finite() || **rho < 0.0)
    {
        return Err(SkylocError::IntegrityViolation(format!(
            "invalid probability density {rho}"
        )));
    }
    for &u in &skymap.uniq {
        uniq2nest(u)?;
    }

    let sorted = skymap.uniq.windows(2).all(|w| w[0] < w[1]);
    let skymap = if sorted {
        skymap
    } else {
        let order: Vec<usize> = (0..len).sorted_unstable_by_key(|&i| skymap.uniq[i]).collect();
        if let Some((a, _)) = order
            .iter()
            .tuple_windows()
            .find(|(a, b)| skymap.uniq[**a] == skymap.uniq[**b])
        {
            return Err(SkylocError::IntegrityViolation(format!(
                "duplicate UNIQ {}",
                skymap.uniq[*a]
            )));
        }
        debug!(name = %skymap.localization_name, pixels = len, "sorting skymap pixels");

        SkyMap {
            uniq: order.iter().map(|&i| skymap.uniq[i]).collect(),
            probdensity: order.iter().map(|&i| skymap.probdensity[i]).collect(),
            distmu: permute(skymap.distmu, &order),
            distsigma: permute(skymap.distsigma, &order),
            distnorm: permute(skymap.distnorm, &order),
            localization_name: skymap.localization_name,
        }
    };

    check_normalization(&skymap, tolerance)?;
    Ok(skymap)
}

/// Check that the density integrates to one within a relative `tolerance`.
pub fn check_normalization(skymap: &SkyMap, tolerance: f64) -> Result<(), SkylocError> {
    let integral = skymap.integral()?;
    if (integral - 1.0).abs() > tolerance {
        return Err(SkylocError::IntegrityViolation(format!(
            "probability of {} integrates to {integral}",
            skymap.localization_name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod canonical_test {
    use super::*;
    use crate::healpix::{nest2uniq, pixel_area};

    fn quarter_sky() -> SkyMap {
        // base pixels 0..3, each holding a quarter of the probability
        let rho = 0.25 / pixel_area(0);
        SkyMap {
            localization_name: "quarter".into(),
            uniq: vec![nest2uniq(0, 2), nest2uniq(0, 0), nest2uniq(0, 3), nest2uniq(0, 1)],
            probdensity: vec![rho; 4],
            distmu: Some(vec![2.0, 0.0, 3.0, 1.0]),
            distsigma: None,
            distnorm: None,
        }
    }

    #[test]
    fn test_sorts_all_columns_together() {
        let skymap = canonicalize(quarter_sky(), 1e-6).unwrap();
        assert_eq!(skymap.uniq, vec![4, 5, 6, 7]);
        assert_eq!(skymap.distmu, Some(vec![0.0, 1.0, 2.0, 3.0]));
        assert!(skymap.distsigma.is_none());
    }

    #[test]
    fn test_duplicates_are_rejected() {
        let mut skymap = quarter_sky();
        skymap.uniq[2] = skymap.uniq[0];
        assert_eq!(
            canonicalize(skymap, 1e-6),
            Err(SkylocError::IntegrityViolation("duplicate UNIQ 6".into()))
        );
    }

    #[test]
    fn test_misaligned_columns_are_rejected() {
        let mut skymap = quarter_sky();
        skymap.distmu = Some(vec![1.0]);
        assert!(matches!(
            canonicalize(skymap, 1e-6),
            Err(SkylocError::IntegrityViolation(_))
        ));

        let mut skymap = quarter_sky();
        skymap.probdensity.pop();
        assert!(canonicalize(skymap, 1e-6).is_err());
    }

    #[test]
    fn test_normalization_is_checked() {
        let mut skymap = quarter_sky();
        skymap.probdensity.iter_mut().for_each(|r| *r *= 1.01);
        assert!(matches!(
            canonicalize(skymap, 1e-6),
            Err(SkylocError::IntegrityViolation(_))
        ));

        let mut skymap = quarter_sky();
        skymap.probdensity[0] = -1.0;
        assert!(canonicalize(skymap, 1e-6).is_err());
    }

    #[test]
    fn test_invalid_uniq() {
        let mut skymap = quarter_sky();
        skymap.uniq[0] = 3;
        assert!(canonicalize(skymap, 1e-6).is_err());
    }
}
