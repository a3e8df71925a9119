use std::collections::BTreeSet;

use serde::Serialize;

use crate::config::Config;
use crate::data::model::{Table, Value};
use crate::data::schema;
use crate::error::{DataError, DataResult};

// ---------------------------------------------------------------------------
// Selection state
// ---------------------------------------------------------------------------

/// What the viewer currently has selected. Owned by the front end and passed
/// into the preparation functions; nothing in the data layer remembers it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Selection {
    /// Subject identifier as displayed. `None` picks the first eligible one.
    pub subject: Option<String>,

    /// HMO metric column. `None` picks the first configured HMO.
    pub hmo: Option<String>,

    /// Growth column plotted next to the HMO. `None` means weight.
    pub growth_metric: Option<String>,
}

impl Selection {
    pub fn subject(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            ..Self::default()
        }
    }

    /// Resolve the selected subject to the table's own key value.
    ///
    /// An explicit choice must exist in the table (it does not have to be in
    /// `eligible`). Without one, the first eligible subject is used, the same
    /// default a dropdown over `eligible` would show.
    pub fn resolve_subject(
        &self,
        table: &Table,
        eligible: &BTreeSet<Value>,
        threshold: usize,
    ) -> DataResult<Value> {
        match &self.subject {
            Some(wanted) => table
                .column_values(schema::SUBJECT_ID)?
                .find(|v| !v.is_missing() && v.to_field() == *wanted)
                .cloned()
                .ok_or_else(|| DataError::UnknownSubject(wanted.clone())),
            None => eligible
                .iter()
                .next()
                .cloned()
                .ok_or(DataError::NoEligibleSubject(threshold)),
        }
    }

    pub fn hmo_column<'a>(&'a self, config: &'a Config) -> DataResult<&'a str> {
        match &self.hmo {
            Some(h) => Ok(h),
            None => config
                .hmo_columns
                .first()
                .map(String::as_str)
                .ok_or_else(|| DataError::MissingColumn("HMO".to_string())),
        }
    }

    pub fn growth_column(&self) -> &str {
        self.growth_metric.as_deref().unwrap_or(schema::WEIGHT)
    }
}
