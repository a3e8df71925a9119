use thiserror::Error;

/// Failures raised by the data-preparation layer.
///
/// Missing cell values are never errors; they travel through the pipeline as
/// [`Value::Null`](crate::data::model::Value::Null).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataError {
    #[error("column '{0}' not found")]
    MissingColumn(String),

    #[error("columns '{first}' and '{second}' both map to '{canonical}'")]
    DuplicateColumn {
        canonical: String,
        first: String,
        second: String,
    },

    #[error("row {row} has {found} cells but the table has {expected} columns")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("key ({0}) appears more than once")]
    DuplicateKey(String),

    #[error("subject '{0}' has no samples")]
    UnknownSubject(String),

    #[error("no subject has more than {0} samples")]
    NoEligibleSubject(usize),

    #[error("no HMO measurements for subject '{0}'")]
    NoHmoData(String),

    #[error("column '{column}' holds a non-numeric value at row {row}")]
    NotNumeric { column: String, row: usize },

    #[error("unsupported file extension: .{0}")]
    UnsupportedFormat(String),
}

pub type DataResult<T> = std::result::Result<T, DataError>;
