use std::cmp::Ordering;
use std::fmt;

use anyhow::{Result, bail};
use log::warn;
use serde::{Deserialize, Serialize};

use super::model::{Table, Value};
use super::schema;
use crate::error::DataResult;

// ---------------------------------------------------------------------------
// Secretor status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SecretorStatus {
    Secretor,
    #[serde(rename = "Non-Secretor")]
    NonSecretor,
}

impl SecretorStatus {
    pub fn label(self) -> &'static str {
        match self {
            SecretorStatus::Secretor => "Secretor",
            SecretorStatus::NonSecretor => "Non-Secretor",
        }
    }

    /// Parse a recorded label. Case, spacing and the hyphen in
    /// "Non-Secretor" are not significant; anything else is `None`.
    pub fn from_label(text: &str) -> Option<Self> {
        let key: String = text
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "secretor" => Some(SecretorStatus::Secretor),
            "nonsecretor" => Some(SecretorStatus::NonSecretor),
            _ => None,
        }
    }
}

impl fmt::Display for SecretorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How secretor status is obtained for each sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SecretorRule {
    /// Concentration in `column` at or above `cutoff` (inclusive, in the
    /// column's unit, AUC) is "Secretor".
    Threshold { column: String, cutoff: f64 },
    /// `column` already holds "Secretor" / "Non-Secretor" labels, as in the
    /// merged sheet's `moms_secretor_status`.
    Label { column: String },
}

impl Default for SecretorRule {
    fn default() -> Self {
        SecretorRule::Threshold {
            column: "2FL".to_string(),
            cutoff: 5_000_000.0,
        }
    }
}

impl SecretorRule {
    pub fn column(&self) -> &str {
        match self {
            SecretorRule::Threshold { column, .. } | SecretorRule::Label { column } => column,
        }
    }

    pub fn cutoff(&self) -> Option<f64> {
        match self {
            SecretorRule::Threshold { cutoff, .. } => Some(*cutoff),
            SecretorRule::Label { .. } => None,
        }
    }
}

/// `value >= cutoff` → Secretor, below → Non-Secretor. A missing (or NaN)
/// value has no status; it is never defaulted to either label.
pub fn classify_secretor(value: Option<f64>, cutoff: f64) -> Option<SecretorStatus> {
    let v = value.filter(|v| !v.is_nan())?;
    if v >= cutoff {
        Some(SecretorStatus::Secretor)
    } else {
        Some(SecretorStatus::NonSecretor)
    }
}

/// Per-row status under `rule`; errors only if the column is absent.
/// Unrecognised labels count as missing.
pub fn secretor_statuses(table: &Table, rule: &SecretorRule) -> DataResult<Vec<Option<SecretorStatus>>> {
    match rule {
        SecretorRule::Threshold { column, cutoff } => Ok(table
            .numeric_column(column)?
            .into_iter()
            .map(|v| classify_secretor(v, *cutoff))
            .collect()),
        SecretorRule::Label { column } => {
            let mut statuses = Vec::with_capacity(table.len());
            for (row, cell) in table.column_values(column)?.enumerate() {
                if cell.is_missing() {
                    statuses.push(None);
                    continue;
                }
                let status = SecretorStatus::from_label(&cell.to_field());
                if status.is_none() {
                    warn!("row {row}: '{}' is not a secretor label", cell.to_field());
                }
                statuses.push(status);
            }
            Ok(statuses)
        }
    }
}

/// Copy of `table` with a derived `Secretor Status` column.
pub fn with_secretor_status(table: &Table, rule: &SecretorRule) -> DataResult<Table> {
    let labels = secretor_statuses(table, rule)?
        .into_iter()
        .map(|s| s.map_or(Value::Null, |s| Value::from(s.label())))
        .collect();
    table.clone().with_column(schema::SECRETOR_STATUS, labels)
}

// ---------------------------------------------------------------------------
// Corrected gestational age categories
// ---------------------------------------------------------------------------

/// Right-closed bins `(edge[i], edge[i+1]]`, with the lowest edge included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CgaBins {
    pub edges: Vec<f64>,
    pub labels: Vec<String>,
}

impl Default for CgaBins {
    fn default() -> Self {
        Self {
            edges: vec![0.0, 32.0, 34.0, 36.0, 45.0],
            labels: ["Very Preterm", "Moderate Preterm", "Late Preterm", "Term"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl CgaBins {
    pub fn validate(&self) -> Result<()> {
        if self.edges.len() != self.labels.len() + 1 {
            bail!(
                "CGA bins need one more edge than labels ({} edges, {} labels)",
                self.edges.len(),
                self.labels.len()
            );
        }
        if self.edges.windows(2).any(|w| w[0].partial_cmp(&w[1]) != Some(Ordering::Less)) {
            bail!("CGA bin edges must be strictly increasing");
        }
        Ok(())
    }

    pub fn categorize(&self, weeks: Option<f64>) -> Option<&str> {
        let w = weeks.filter(|w| !w.is_nan())?;
        let first = *self.edges.first()?;
        if w == first {
            return self.labels.first().map(String::as_str);
        }
        self.edges
            .windows(2)
            .zip(&self.labels)
            .find(|(edge, _)| w > edge[0] && w <= edge[1])
            .map(|(_, label)| label.as_str())
    }
}

/// Copy of `table` with a derived `CGA Category` column.
pub fn with_cga_category(table: &Table, bins: &CgaBins) -> DataResult<Table> {
    let labels = table
        .numeric_column(schema::CGA)?
        .into_iter()
        .map(|w| bins.categorize(w).map_or(Value::Null, Value::from))
        .collect();
    table.clone().with_column(schema::CGA_CATEGORY, labels)
}
