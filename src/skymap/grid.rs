//! # External HEALPix grids
//!
//! Reader for the FITS skymaps distributed with alerts: multi-order maps
//! (`UNIQ`, `PROBDENSITY` and the optional `DISTMU`, `DISTSIGMA`, `DISTNORM`
//! columns, as produced by BAYESTAR) and flat single-order maps (first column
//! holding the per-pixel probability, `ORDERING` / `NSIDE` header keys, as produced
//! by Fermi GBM). The table is read from the first extension.
//!
//! A grid comes either from a URL or from an inline data URL
//! (`data:application/fits;name=<file>;base64,<payload>`). In both cases the bytes
//! are staged in a named temporary file (in the given staging directory, or the
//! system one), which is removed when the read ends, successful or not.
//!
//! The occulting body declared in the header (`GEO_RA`, `GEO_DEC`, `GEO_RAD`) is
//! returned alongside the map; masking is left to
//! [`apply_occultation`](crate::skymap::occultation::apply_occultation). An absent key
//! means no occultation, a key that does not hold a number is an error.

use std::{io::Write, path::Path};

use base64::{engine::general_purpose::STANDARD, Engine};
use fitsio::{
    errors::Error as FitsioError, hdu::FitsHdu, hdu::HduInfo, headers::ReadsKey,
    tables::ConcreteColumnDescription, FitsFile,
};
use tracing::debug;

use crate::{
    constants::{Degree, MAX_ORDER},
    env_state::SkylocEnv,
    healpix::{moc::derasterize, npix, ring2nest},
    notice::parser::uri_path,
    skyloc_errors::SkylocError,
    skymap::{occultation::OccultingDisc, SkyMap},
};

/// Sentinel of missing pixels in flat HEALPix maps.
const UNSEEN: f64 = -1.6375e30;

/// cfitsio status of a header lookup for an absent keyword.
const KEY_NO_EXIST: i32 = 202;

/// A map read from an external grid, with the occulting body its header declares.
#[derive(Debug, Clone, PartialEq)]
pub struct GridMap {
    pub skymap: SkyMap,
    pub occulting_disc: Option<OccultingDisc>,
}

/// Split an inline data URL into its declared filename and its decoded body.
///
/// Everything after the last `name=` of the part before `base64,` is the filename,
/// with `;` separators removed.
pub fn decode_inline_payload(payload: &str) -> Result<(String, Vec<u8>), SkylocError> {
    let (prefix, body) = payload.split_once("base64,").ok_or_else(|| {
        SkylocError::UnsupportedRepresentation("inline payload without base64 marker".into())
    })?;
    let filename = prefix
        .rsplit("name=")
        .next()
        .unwrap_or_default()
        .replace(';', "");

    let body: String = body.split_whitespace().collect();
    Ok((filename, STANDARD.decode(body)?))
}

/// Last component of the path of a URL.
pub fn url_basename(url: &str) -> &str {
    uri_path(url).rsplit('/').next().unwrap_or_default()
}

/// Skymap from an inline base64 data URL.
///
/// Arguments
/// -----------------
/// * `payload`: the data URL.
/// * `default_geo_radius`: occulting disc radius used when `GEO_RAD` is absent.
/// * `staging_dir`: where the payload is staged, the system temporary directory if `None`.
///
/// Return
/// ----------
/// * The map named after the declared filename, with its occulting body if any.
pub fn from_bytes(
    payload: &str,
    default_geo_radius: Degree,
    staging_dir: Option<&Path>,
) -> Result<GridMap, SkylocError> {
    let (filename, bytes) = decode_inline_payload(payload)?;
    debug!(filename = %filename, bytes = bytes.len(), "decoded inline skymap");
    read_staged(&bytes, filename, default_geo_radius, staging_dir)
}

/// Skymap downloaded from a URL.
///
/// Arguments
/// -----------------
/// * `env`: network environment performing the download (timeout and retries).
/// * `url`: location of the FITS file.
/// * `default_geo_radius`: occulting disc radius used when `GEO_RAD` is absent.
/// * `staging_dir`: where the download is staged, the system temporary directory if `None`.
///
/// Return
/// ----------
/// * The map named after the basename of the URL, with its occulting body if any.
/// * [`SkylocError::FetchFailure`] when the download keeps failing.
pub fn from_url(
    env: &SkylocEnv,
    url: &str,
    default_geo_radius: Degree,
    staging_dir: Option<&Path>,
) -> Result<GridMap, SkylocError> {
    let bytes = env.get_bytes_from_url(url)?;
    read_staged(&bytes, url_basename(url).to_string(), default_geo_radius, staging_dir)
}

/// Stage `bytes` in a temporary file and read it; the file is removed on every exit path.
fn read_staged(
    bytes: &[u8],
    localization_name: String,
    default_geo_radius: Degree,
    staging_dir: Option<&Path>,
) -> Result<GridMap, SkylocError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("skyloc-").suffix(".fits");
    let mut staged = match staging_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    staged.write_all(bytes)?;
    staged.flush()?;
    read_fits(staged.path(), localization_name, default_geo_radius)
}

/// Read a FITS skymap from disk.
///
/// Arguments
/// -----------------
/// * `path`: the FITS file; gzip-compressed files are accepted.
/// * `localization_name`: name given to the map.
/// * `default_geo_radius`: occulting disc radius used when `GEO_RAD` is absent.
///
/// Return
/// ----------
/// * The map, in file order (not yet canonical), and the occulting body.
/// * [`SkylocError::UnsupportedRepresentation`] when the first extension is not a
///   table or holds neither a multi-order nor a flat map.
pub fn read_fits(
    path: &Path,
    localization_name: String,
    default_geo_radius: Degree,
) -> Result<GridMap, SkylocError> {
    let mut fptr = FitsFile::open(path)?;
    let hdu = fptr.hdu(1)?;

    let (columns, num_rows) = match &hdu.info {
        HduInfo::TableInfo {
            column_descriptions,
            num_rows,
        } => (column_descriptions.clone(), *num_rows),
        _ => {
            return Err(SkylocError::UnsupportedRepresentation(
                "first FITS extension is not a table".into(),
            ))
        }
    };

    let skymap = if find_column(&columns, "UNIQ").is_some() {
        read_multiorder(&mut fptr, &hdu, &columns, localization_name)?
    } else {
        read_flat(&mut fptr, &hdu, &columns, num_rows, localization_name)?
    };

    let occulting_disc = read_occulting_disc(&mut fptr, &hdu, default_geo_radius)?;
    debug!(
        name = %skymap.localization_name,
        pixels = skymap.len(),
        occulted = occulting_disc.is_some(),
        "read FITS skymap"
    );

    Ok(GridMap {
        skymap,
        occulting_disc,
    })
}

fn find_column<'a>(
    columns: &'a [ConcreteColumnDescription],
    name: &str,
) -> Option<&'a ConcreteColumnDescription> {
    columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}

/// Header value of `key`, `None` when the keyword is absent.
///
/// A keyword whose value cannot be read as `T` is a [`SkylocError::MalformedValue`]
/// holding its raw text.
fn read_key_optional<T: ReadsKey>(
    hdu: &FitsHdu,
    fptr: &mut FitsFile,
    key: &str,
) -> Result<Option<T>, SkylocError> {
    match hdu.read_key::<T>(fptr, key) {
        Ok(value) => Ok(Some(value)),
        Err(FitsioError::Fits(err)) if err.status == KEY_NO_EXIST => Ok(None),
        Err(FitsioError::Fits(_)) => {
            let raw: String = hdu.read_key(fptr, key)?;
            Err(SkylocError::malformed(key, raw.trim()))
        }
        Err(err) => Err(err.into()),
    }
}

fn read_optional_col(
    fptr: &mut FitsFile,
    hdu: &FitsHdu,
    columns: &[ConcreteColumnDescription],
    name: &str,
) -> Result<Option<Vec<f64>>, SkylocError> {
    match find_column(columns, name) {
        Some(column) => Ok(Some(hdu.read_col(fptr, &column.name)?)),
        None => Ok(None),
    }
}

fn read_multiorder(
    fptr: &mut FitsFile,
    hdu: &FitsHdu,
    columns: &[ConcreteColumnDescription],
    localization_name: String,
) -> Result<SkyMap, SkylocError> {
    let uniq_column = find_column(columns, "UNIQ")
        .ok_or_else(|| SkylocError::MissingNode("UNIQ".into()))?;
    let uniq: Vec<i64> = hdu.read_col(fptr, &uniq_column.name)?;
    let uniq = uniq
        .into_iter()
        .map(|u| {
            u64::try_from(u)
                .map_err(|_| SkylocError::IntegrityViolation(format!("negative UNIQ {u}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let probdensity = read_optional_col(fptr, hdu, columns, "PROBDENSITY")?
        .ok_or_else(|| SkylocError::MissingNode("PROBDENSITY".into()))?;

    Ok(SkyMap {
        localization_name,
        uniq,
        probdensity,
        distmu: read_optional_col(fptr, hdu, columns, "DISTMU")?,
        distsigma: read_optional_col(fptr, hdu, columns, "DISTSIGMA")?,
        distnorm: read_optional_col(fptr, hdu, columns, "DISTNORM")?,
    })
}

/// Order of a full-sky map of `n` pixels.
fn flat_order(n: usize) -> Result<u8, SkylocError> {
    (0..=MAX_ORDER)
        .find(|&order| npix(order) == n as u64)
        .ok_or_else(|| {
            SkylocError::UnsupportedRepresentation(format!(
                "{n} pixels is not a full-sky HEALPix map"
            ))
        })
}

fn read_flat(
    fptr: &mut FitsFile,
    hdu: &FitsHdu,
    columns: &[ConcreteColumnDescription],
    num_rows: usize,
    localization_name: String,
) -> Result<SkyMap, SkylocError> {
    let column = columns.first().ok_or_else(|| {
        SkylocError::UnsupportedRepresentation("FITS table without columns".into())
    })?;

    let indexing: Option<String> = read_key_optional(hdu, fptr, "INDXSCHM")?;
    if indexing.is_some_and(|s| s.trim().eq_ignore_ascii_case("EXPLICIT")) {
        return Err(SkylocError::UnsupportedRepresentation(
            "partial sky HEALPix maps".into(),
        ));
    }

    // vector cells hold consecutive pixels of the map
    let n = num_rows * column.data_type.repeat.max(1);
    let order = flat_order(n)?;
    if let Some(nside) = read_key_optional::<i64>(hdu, fptr, "NSIDE")? {
        if nside != 1_i64 << order {
            return Err(SkylocError::IntegrityViolation(format!(
                "NSIDE {nside} does not match a map of {n} pixels"
            )));
        }
    }

    let values: Vec<f64> = hdu.read_col_range(fptr, &column.name, &(0..n))?;
    let values: Vec<f64> = values
        .into_iter()
        .map(|v| if v.is_finite() && v != UNSEEN { v } else { 0.0 })
        .collect();

    let ordering = read_key_optional::<String>(hdu, fptr, "ORDERING")?
        .map(|s| s.trim().to_uppercase())
        .unwrap_or_else(|| "RING".to_string());
    let mut prob = match ordering.as_str() {
        "NESTED" => values,
        "RING" => {
            let mut nested = vec![0.0; n];
            for (ipix, v) in values.into_iter().enumerate() {
                nested[ring2nest(order, ipix as u64) as usize] = v;
            }
            nested
        }
        other => {
            return Err(SkylocError::UnsupportedRepresentation(format!(
                "HEALPix ordering {other}"
            )))
        }
    };

    let total: f64 = prob.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return Err(SkylocError::IntegrityViolation(format!(
            "flat map {localization_name} holds no probability"
        )));
    }
    prob.iter_mut().for_each(|p| *p /= total);

    debug!(name = %localization_name, order, ordering = %ordering, "derasterizing flat map");
    let (uniq, probdensity) = derasterize(&prob, order)?;
    Ok(SkyMap::new(localization_name, uniq, probdensity))
}

/// Occulting body of the header; both `GEO_RA` and `GEO_DEC` must be present.
fn read_occulting_disc(
    fptr: &mut FitsFile,
    hdu: &FitsHdu,
    default_geo_radius: Degree,
) -> Result<Option<OccultingDisc>, SkylocError> {
    let ra = read_key_optional::<f64>(hdu, fptr, "GEO_RA")?;
    let dec = read_key_optional::<f64>(hdu, fptr, "GEO_DEC")?;
    let radius = read_key_optional::<f64>(hdu, fptr, "GEO_RAD")?;

    Ok(ra.zip(dec).map(|(ra, dec)| OccultingDisc {
        ra,
        dec,
        radius: radius.unwrap_or(default_geo_radius),
    }))
}
