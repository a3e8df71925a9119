/// Data layer: core types, loading, and the preparation steps every
/// dashboard section repeats.
///
/// Architecture:
/// ```text
///  .xlsx / .csv / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file, canonical headers (schema) → Table
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  cohort selection, per-column predicates
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ classify  │  secretor status, CGA category
///   └──────────┘
///        │
///        ├──────────────┐
///        ▼              ▼
///   ┌──────────┐   ┌──────────┐
///   │aggregate  │   │ reshape   │  long form, min-max normalization
///   └──────────┘   └──────────┘
///        │              │
///        ▼              ▼
///      report / export (CSV)
/// ```

pub mod aggregate;
pub mod classify;
pub mod export;
pub mod filter;
pub mod loader;
pub mod model;
pub mod reshape;
pub mod schema;
