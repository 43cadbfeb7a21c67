// src/hscodes.rs

use csv::ReaderBuilder;
use std::{collections::HashSet, fs::File, path::Path};
use tracing::{error, info};

use crate::error::{Result, ScrapeError};

pub const HS_CODE_COLUMN: &str = "HSN_CD";

/// Read the selectable HS codes. Codes stay strings so leading zeros survive.
pub fn load_hs_codes(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let load_err = |e: &dyn std::fmt::Display| {
        ScrapeError::DataLoad(format!("{}: {}", path.display(), e))
    };

    let file = File::open(path).map_err(|e| load_err(&e))?;
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(file);
    let column = rdr
        .headers()
        .map_err(|e| load_err(&e))?
        .iter()
        .position(|h| h.trim() == HS_CODE_COLUMN)
        .ok_or_else(|| load_err(&format!("no {} column", HS_CODE_COLUMN)))?;

    let mut seen = HashSet::new();
    let mut codes = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| load_err(&e))?;
        let Some(code) = record.get(column).map(str::trim) else { continue };
        if !code.is_empty() && seen.insert(code.to_string()) {
            codes.push(code.to_string());
        }
    }
    info!(path = %path.display(), codes = codes.len(), "loaded HS codes");
    Ok(codes)
}

/// Same as [`load_hs_codes`], but a failure leaves an empty selection
/// instead of stopping the caller.
pub fn load_hs_codes_or_empty(path: impl AsRef<Path>) -> Vec<String> {
    load_hs_codes(path).unwrap_or_else(|e| {
        error!(error = %e, "error loading HS code data");
        Vec::new()
    })
}
