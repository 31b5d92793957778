//! FITS binary-table fixtures shared by the unit and integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};

/// One column of a FITS binary table: 64-bit integers or doubles.
pub enum Column {
    Long(&'static str, Vec<i64>),
    Double(&'static str, Vec<f64>),
}

impl Column {
    fn name(&self) -> &str {
        match self {
            Column::Long(name, _) | Column::Double(name, _) => name,
        }
    }

    fn len(&self) -> usize {
        match self {
            Column::Long(_, v) => v.len(),
            Column::Double(_, v) => v.len(),
        }
    }

    fn form(&self) -> &str {
        match self {
            Column::Long(..) => "K",
            Column::Double(..) => "D",
        }
    }
}

fn block(cards: &[String]) -> Vec<u8> {
    let mut bytes: Vec<u8> = cards
        .iter()
        .flat_map(|c| format!("{c:<80}").into_bytes())
        .collect();
    bytes.resize(bytes.len().div_ceil(2880) * 2880, b' ');
    bytes
}

fn value_card(key: &str, value: impl std::fmt::Display) -> String {
    format!("{key:<8}= {value:>20}")
}

/// FITS file with an empty primary HDU and one binary table extension.
///
/// `keys` are extra header cards of the extension, values written verbatim
/// (quote strings yourself: `("ORDERING", "'NESTED'")`).
pub fn fits_table(columns: &[Column], keys: &[(&str, &str)]) -> Vec<u8> {
    let primary = block(&[
        value_card("SIMPLE", "T"),
        value_card("BITPIX", 8),
        value_card("NAXIS", 0),
        value_card("EXTEND", "T"),
        "END".to_string(),
    ]);

    let rows = columns.first().map_or(0, Column::len);
    let mut cards = vec![
        "XTENSION= 'BINTABLE'".to_string(),
        value_card("BITPIX", 8),
        value_card("NAXIS", 2),
        value_card("NAXIS1", 8 * columns.len()),
        value_card("NAXIS2", rows),
        value_card("PCOUNT", 0),
        value_card("GCOUNT", 1),
        value_card("TFIELDS", columns.len()),
    ];
    for (i, column) in columns.iter().enumerate() {
        cards.push(format!("{:<8}= '{:<8}'", format!("TTYPE{}", i + 1), column.name()));
        cards.push(format!("{:<8}= '{:<8}'", format!("TFORM{}", i + 1), column.form()));
    }
    cards.extend(keys.iter().map(|(k, v)| value_card(k, v)));
    cards.push("END".to_string());
    let header = block(&cards);

    let mut data = Vec::with_capacity(rows * 8 * columns.len());
    for row in 0..rows {
        for column in columns {
            match column {
                Column::Long(_, v) => data.extend_from_slice(&v[row].to_be_bytes()),
                Column::Double(_, v) => data.extend_from_slice(&v[row].to_be_bytes()),
            }
        }
    }
    data.resize(data.len().div_ceil(2880) * 2880, 0);

    [primary, header, data].concat()
}

/// Inline data URL carrying `bytes` under `filename`.
pub fn inline_payload(filename: &str, bytes: &[u8]) -> String {
    format!(
        "data:application/fits;name={filename};base64,{}",
        STANDARD.encode(bytes)
    )
}

/// Write a FITS table in `dir` and return its path.
pub fn write_fits(dir: &Path, filename: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(filename);
    std::fs::write(&path, bytes).unwrap();
    path
}
