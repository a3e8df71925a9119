use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array,
    StringArray,
};
use arrow::datatypes::DataType;
use arrow::util::display::array_value_to_string;
use calamine::{Data, Range, Reader, open_workbook_auto};
use log::{info, warn};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{Table, Value};
use super::schema;
use crate::error::DataError;

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a sample table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.xlsx` / `.xlsm` / `.xls` / `.ods` – first worksheet, header in row 1
/// * `.csv`     – header row, one sample per line
/// * `.json`    – `[{ "Subject ID": ..., "2FL": ..., ... }, ...]`
/// * `.parquet` – one flat column per field
///
/// Headers are trimmed and mapped through `aliases` before the table is
/// returned, so every caller sees canonical column names. Identifier columns
/// ([`schema::IDENTIFIER_COLUMNS`]) always hold text.
pub fn load_file(path: &Path, aliases: &BTreeMap<String, String>) -> Result<Table> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let raw = match ext.as_str() {
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => read_workbook(path)?,
        "csv" => read_csv(path)?,
        "json" => read_json(path)?,
        "parquet" | "pq" => read_parquet(path)?,
        other => return Err(DataError::UnsupportedFormat(other.to_string()).into()),
    };

    let columns = schema::normalize_headers(&raw.headers, aliases)
        .with_context(|| format!("normalizing headers of {}", path.display()))?;
    let identifier: Vec<bool> = columns
        .iter()
        .map(|c| schema::IDENTIFIER_COLUMNS.contains(&c.as_str()))
        .collect();
    let rows: Vec<Vec<Value>> = raw
        .rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .enumerate()
                .map(|(i, cell)| type_cell(cell, identifier.get(i).copied().unwrap_or(false), raw.typed))
                .collect()
        })
        .collect();
    let table = Table::from_rows(columns, rows)
        .with_context(|| format!("building table from {}", path.display()))?;

    info!(
        "Loaded {} rows x {} columns from {}",
        table.len(),
        table.columns().len(),
        path.display()
    );
    warn_duplicate_sample_ids(&table);
    Ok(table)
}

fn warn_duplicate_sample_ids(table: &Table) {
    let Ok(ids) = table.column_values(schema::SAMPLE_ID) else {
        return;
    };
    let mut seen = BTreeSet::new();
    for id in ids.filter(|v| !v.is_missing()) {
        if !seen.insert(id) {
            warn!("sample id '{}' appears more than once", id.to_field());
        }
    }
}

/// Cells as read from the file. Delimited text arrives untyped (`typed ==
/// false`) and is typed once the canonical column names are known.
struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<Value>>,
    typed: bool,
}

fn type_cell(cell: Value, identifier: bool, typed: bool) -> Value {
    match cell {
        Value::Null => Value::Null,
        v if identifier => Value::String(v.to_field()),
        Value::String(s) if !typed => guess_value_type(&s),
        v => v,
    }
}

// ---------------------------------------------------------------------------
// Spreadsheet loader
// ---------------------------------------------------------------------------

fn read_workbook(path: &Path) -> Result<RawTable> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("opening workbook {}", path.display()))?;
    let range = workbook
        .worksheet_range_at(0)
        .context("workbook has no worksheets")?
        .context("reading first worksheet")?;
    range_to_raw(&range)
}

/// Header from the first row; fully blank rows are skipped.
fn range_to_raw(range: &Range<Data>) -> Result<RawTable> {
    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .context("worksheet is empty")?
        .iter()
        .map(|cell| cell_to_value(cell).to_field())
        .collect();

    let body: Vec<Vec<Value>> = rows
        .map(|row| row.iter().map(cell_to_value).collect::<Vec<Value>>())
        .filter(|row| !row.iter().all(Value::is_missing))
        .collect();
    Ok(RawTable {
        headers,
        rows: body,
        typed: true,
    })
}

fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::Int(i) => Value::Integer(*i),
        Data::Float(f) => Value::Float(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) => raw_text(s),
        Data::DateTime(dt) => Value::Float(dt.as_f64()),
        Data::DateTimeIso(s) => Value::Date(s.clone()),
        Data::DurationIso(s) => Value::String(s.clone()),
        Data::Error(e) => {
            warn!("spreadsheet cell error {e:?}, treated as missing");
            Value::Null
        }
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

fn read_csv(path: &Path) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        if record.len() > headers.len() {
            bail!(
                "CSV row {row_no}: {} fields but only {} headers",
                record.len(),
                headers.len()
            );
        }
        rows.push(record.iter().map(raw_text).collect());
    }
    Ok(RawTable {
        headers,
        rows,
        typed: false,
    })
}

/// Trimmed text cell; blank is Null.
fn raw_text(s: &str) -> Value {
    let s = s.trim();
    if s.is_empty() {
        Value::Null
    } else {
        Value::String(s.to_string())
    }
}

fn guess_value_type(s: &str) -> Value {
    let s = s.trim();
    if s.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return Value::Float(f);
    }
    if s == "true" || s == "false" {
        return Value::Bool(s == "true");
    }
    Value::String(s.to_string())
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "Subject ID": "NB-01", "sample_unique_id": "NB-01-1", "DOL": 7, "2FL": 5400000.0 },
///   ...
/// ]
/// ```
///
/// Columns are the union of keys over all records; a record lacking a key
/// gets a null cell.
fn read_json(path: &Path) -> Result<RawTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root.as_array().context("Expected top-level JSON array")?;

    let mut headers: Vec<String> = Vec::new();
    let mut objects = Vec::with_capacity(records.len());
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;
        for key in obj.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
        objects.push(obj);
    }

    let rows: Vec<Vec<Value>> = objects
        .into_iter()
        .map(|obj| {
            headers
                .iter()
                .map(|h| obj.get(h).map_or(Value::Null, json_to_value))
                .collect()
        })
        .collect();
    Ok(RawTable {
        headers,
        rows,
        typed: true,
    })
}

fn json_to_value(val: &JsonValue) -> Value {
    match val {
        JsonValue::String(s) if s.trim().is_empty() => Value::Null,
        JsonValue::String(s) => Value::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                Value::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Null => Value::Null,
        other => Value::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a flat Parquet table, as written by `df.to_parquet()` or by the
/// `generate_sample` tool.
fn read_parquet(path: &Path) -> Result<RawTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let headers: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    let mut rows = Vec::new();
    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        for row in 0..batch.num_rows() {
            let values = batch
                .columns()
                .iter()
                .map(|col| extract_value(col, row))
                .collect::<Result<Vec<_>>>()
                .with_context(|| format!("Row {row}"))?;
            rows.push(values);
        }
    }
    Ok(RawTable {
        headers,
        rows,
        typed: true,
    })
}

/// Extract a single cell from an Arrow column at a given row.
fn extract_value(col: &ArrayRef, row: usize) -> Result<Value> {
    if col.is_null(row) {
        return Ok(Value::Null);
    }
    let any = col.as_any();
    let value = match col.data_type() {
        DataType::Utf8 => match any.downcast_ref::<StringArray>() {
            Some(s) => Value::String(s.value(row).to_string()),
            None => bail!("expected StringArray"),
        },
        DataType::LargeUtf8 => Value::String(col.as_string::<i64>().value(row).to_string()),
        DataType::Int32 => match any.downcast_ref::<Int32Array>() {
            Some(a) => Value::Integer(a.value(row) as i64),
            None => bail!("expected Int32Array"),
        },
        DataType::Int64 => match any.downcast_ref::<Int64Array>() {
            Some(a) => Value::Integer(a.value(row)),
            None => bail!("expected Int64Array"),
        },
        DataType::Float32 => match any.downcast_ref::<Float32Array>() {
            Some(a) => Value::Float(a.value(row) as f64),
            None => bail!("expected Float32Array"),
        },
        DataType::Float64 => match any.downcast_ref::<Float64Array>() {
            Some(a) => Value::Float(a.value(row)),
            None => bail!("expected Float64Array"),
        },
        DataType::Boolean => match any.downcast_ref::<BooleanArray>() {
            Some(a) => Value::Bool(a.value(row)),
            None => bail!("expected BooleanArray"),
        },
        DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => {
            Value::Date(array_value_to_string(col, row)?)
        }
        _ => Value::String(array_value_to_string(col, row)?),
    };
    if value.is_missing() {
        return Ok(Value::Null);
    }
    Ok(value)
}
