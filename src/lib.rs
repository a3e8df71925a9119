//! Data preparation for the NeoBANK human-milk biobank dashboard.
//!
//! Loads spreadsheet exports of sample metadata and HMO measurements and
//! turns them into the tables the dashboard charts: cohort filters,
//! secretor classification, group-by summaries and long-form reshapes.

pub mod config;
pub mod data;
pub mod error;
pub mod report;
pub mod state;

pub use config::Config;
pub use data::model::{SampleRecord, Table, Value};
pub use error::{DataError, DataResult};
pub use state::Selection;
