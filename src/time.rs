use hifitime::{Epoch, Unit};

use crate::skyloc_errors::SkylocError;

/// Transformation from an ISO-8601 UTC timestamp to an epoch rounded to the nearest second
///
/// Accepted forms are those of [`Epoch::from_gregorian_str`]: `YYYY-MM-DDTHH:MM:SS[.fff]`,
/// a space allowed in place of the `T` separator, with an optional `Z` or time scale
/// suffix (UTC when absent). Half a second or more rounds up.
///
/// Argument
/// --------
/// * `field`: the name of the document node, used in error messages
/// * `iso`: the timestamp text
///
/// Return
/// ------
/// * the UTC epoch with whole-second precision
/// * [`SkylocError::MalformedValue`] if the text is not a valid timestamp
pub fn iso_to_epoch_rounded(field: &str, iso: &str) -> Result<Epoch, SkylocError> {
    let iso = iso.trim();
    let epoch = Epoch::from_gregorian_str(iso).map_err(|_| SkylocError::malformed(field, iso))?;
    Ok(epoch.round(Unit::Second * 1_i64))
}
