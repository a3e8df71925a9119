//! Canonical column names and the header alias table.
//!
//! Exports of the same study sheet disagree on header spelling and trailing
//! whitespace (`"DOL "`, `"MBM/DMB?"`, `"Type of Milk"`). Headers are cleaned
//! once at load time so the rest of the crate only sees canonical names.

use std::collections::BTreeMap;

use log::debug;

use crate::error::{DataError, DataResult};

pub const SUBJECT_ID: &str = "Subject ID";
pub const SAMPLE_ID: &str = "sample_unique_id";
pub const DOL: &str = "DOL";
pub const CGA: &str = "CGA";
pub const MILK_TYPE: &str = "Type of Milk";
pub const SAMPLE_SOURCE: &str = "Sample Source";
pub const HMF: &str = "HMF";
pub const TPN: &str = "TPN";
pub const IRON: &str = "Iron";
pub const ALIQUOTS: &str = "Aliquots";
pub const NOTES: &str = "Additional Comments";
pub const WEIGHT: &str = "Current Weight";
pub const HEIGHT: &str = "Current Height";
pub const HEAD_CIRCUMFERENCE: &str = "Current HC";
pub const DOL_CATEGORY: &str = "DOL Category";

/// Identifier columns. Always kept as text, so `007` stays distinct from `7`.
pub const IDENTIFIER_COLUMNS: [&str; 2] = [SUBJECT_ID, SAMPLE_ID];

pub const LINKED: &str = "Linked";
pub const INFANT_SEX: &str = "Infant Sex";
pub const FEEDING_PERIOD: &str = "Feeding Time Period";
pub const IS_PREPPED: &str = "Is Prepped";

/// Derived columns; never present in a source file.
pub const SECRETOR_STATUS: &str = "Secretor Status";
pub const CGA_CATEGORY: &str = "CGA Category";
pub const SAMPLE_NUMBER: &str = "Sample #";

/// Categorical milk / nutrition columns summarised on the overview.
pub const NUTRITION_COLUMNS: [&str; 5] = [SAMPLE_SOURCE, MILK_TYPE, HMF, TPN, IRON];

pub const GROWTH_COLUMNS: [&str; 3] = [WEIGHT, HEIGHT, HEAD_CIRCUMFERENCE];

/// Header spellings seen across file revisions → canonical name.
pub fn default_aliases() -> BTreeMap<String, String> {
    [
        ("MBM/DBM?", MILK_TYPE),
        ("MBM/DMB?", MILK_TYPE),
        ("Scavenged/Fresh?", SAMPLE_SOURCE),
        ("HMF Y/N?", HMF),
        ("TPN Y/N?", TPN),
        ("Iron Y/N?", IRON),
        ("Aliquots_num", ALIQUOTS),
        ("Subject_ID", SUBJECT_ID),
        ("Sample ID", SAMPLE_ID),
        ("2'FL", "2FL"),
        ("2’FL", "2FL"),
    ]
    .into_iter()
    .map(|(from, to)| (from.to_string(), to.to_string()))
    .collect()
}

/// Default HMO panel, in display order.
pub fn default_hmo_columns() -> Vec<String> {
    [
        "2FL", "DFLac", "3SL", "6SL", "LNT", "LNnT", "LNFP I", "LNFP II", "LNFP III", "LSTc",
        "DFLNT", "DSLNT", "DFLNH", "FDSLNH", "DSLNH",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Trim every header and apply `aliases`. Blank headers are named
/// `Unnamed: {position}`. Fails when two source headers end up with the same
/// canonical name.
pub fn normalize_headers(
    headers: &[String],
    aliases: &BTreeMap<String, String>,
) -> DataResult<Vec<String>> {
    let mut seen: BTreeMap<String, &str> = BTreeMap::new();
    let mut out = Vec::with_capacity(headers.len());

    for (position, raw) in headers.iter().enumerate() {
        let trimmed = raw.trim();
        let canonical = if trimmed.is_empty() {
            format!("Unnamed: {position}")
        } else {
            aliases
                .get(trimmed)
                .map(String::as_str)
                .unwrap_or(trimmed)
                .to_string()
        };
        if canonical != raw.as_str() {
            debug!("header '{raw}' -> '{canonical}'");
        }
        if let Some(first) = seen.get(&canonical) {
            return Err(DataError::DuplicateColumn {
                canonical,
                first: first.to_string(),
                second: raw.clone(),
            });
        }
        seen.insert(canonical.clone(), raw);
        out.push(canonical);
    }
    Ok(out)
}
