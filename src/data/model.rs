use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::schema;
use crate::error::{DataError, DataResult};

// ---------------------------------------------------------------------------
// Value – a single spreadsheet cell
// ---------------------------------------------------------------------------

/// A dynamically-typed cell mirroring the dtypes a spreadsheet export produces.
/// Group keys live in `BTreeMap` / `BTreeSet` downstream so `Value` must be `Ord`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// ISO-8601 date string kept as text.
    Date(String),
    Null,
}

// -- Manual Eq/Ord so we can put Value in BTreeSet --

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use Value::*;
        fn discriminant(v: &Value) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
                Date(_) => 5,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) | (Date(a), Date(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::String(s) | Value::Date(s) => s.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Null => {}
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Option<f64>> for Value {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Value::Null, Value::Float)
    }
}

impl Value {
    /// Numeric view of the cell. Text is not coerced; see [`Value::to_numeric`].
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Numeric view that also parses numeric-looking text, like a lenient
    /// spreadsheet "to number". Anything unparseable becomes `None`.
    pub fn to_numeric(&self) -> Option<f64> {
        match self {
            Value::String(s) => s.trim().parse::<f64>().ok(),
            other => other.as_f64(),
        }
    }

    /// Null, or a float that is NaN.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Text written to a delimited export. Null becomes an empty field and
    /// floats use the shortest representation that round-trips.
    pub fn to_field(&self) -> String {
        match self {
            Value::String(s) | Value::Date(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Table – the loaded sheet
// ---------------------------------------------------------------------------

/// Row-major table with ordered, uniquely-named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from rows. Short rows are padded with nulls; long rows
    /// are rejected.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> DataResult<Self> {
        let mut table = Table::new(columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn push_row(&mut self, mut row: Vec<Value>) -> DataResult<()> {
        let expected = self.columns.len();
        if row.len() > expected {
            return Err(DataError::RowWidth {
                row: self.rows.len(),
                expected,
                found: row.len(),
            });
        }
        row.resize(expected, Value::Null);
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn column_index(&self, name: &str) -> DataResult<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| DataError::MissingColumn(name.to_string()))
    }

    /// Cell lookup by column name; `None` when the column does not exist.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    pub fn column_values(&self, name: &str) -> DataResult<impl Iterator<Item = &Value> + '_> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(move |r| &r[idx]))
    }

    /// Numeric column values, text coerced where it parses; otherwise `None`.
    pub fn numeric_column(&self, name: &str) -> DataResult<Vec<Option<f64>>> {
        Ok(self
            .column_values(name)?
            .map(|v| v.to_numeric().filter(|x| !x.is_nan()))
            .collect())
    }

    /// Sorted set of distinct values in a column, nulls included.
    pub fn unique_values(&self, name: &str) -> DataResult<BTreeSet<Value>> {
        Ok(self.column_values(name)?.cloned().collect())
    }

    /// New table holding the given rows, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// New table holding only `names`, in that order.
    pub fn select_columns(&self, names: &[&str]) -> DataResult<Table> {
        let idx: Vec<usize> = names
            .iter()
            .map(|n| self.column_index(n))
            .collect::<DataResult<_>>()?;
        Ok(Table {
            columns: names.iter().map(|n| n.to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|r| idx.iter().map(|&i| r[i].clone()).collect())
                .collect(),
        })
    }

    /// Rows whose `column` equals `value`.
    pub fn rows_where(&self, column: &str, value: &Value) -> DataResult<Table> {
        let idx = self.column_index(column)?;
        let indices: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| &r[idx] == value)
            .map(|(i, _)| i)
            .collect();
        Ok(self.select_rows(&indices))
    }

    /// Append a column, or replace it in place when the name already exists.
    pub fn with_column(mut self, name: &str, values: Vec<Value>) -> DataResult<Table> {
        if values.len() != self.rows.len() {
            return Err(DataError::RowWidth {
                row: values.len().min(self.rows.len()),
                expected: self.rows.len(),
                found: values.len(),
            });
        }
        match self.columns.iter().position(|c| c == name) {
            Some(idx) => {
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row[idx] = v;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row.push(v);
                }
            }
        }
        Ok(self)
    }

    /// Stable ascending sort on a numeric column; missing values go last.
    pub fn sorted_by_numeric(&self, column: &str) -> DataResult<Table> {
        let keys = self.numeric_column(column)?;
        let mut order: Vec<usize> = (0..self.rows.len()).collect();
        order.sort_by(|&a, &b| match (keys[a], keys[b]) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        Ok(self.select_rows(&order))
    }

    /// Stable ascending sort on any column using [`Value`] ordering.
    pub fn sorted_by(&self, column: &str) -> DataResult<Table> {
        let idx = self.column_index(column)?;
        let mut order: Vec<usize> = (0..self.rows.len()).collect();
        order.sort_by(|&a, &b| self.rows[a][idx].cmp(&self.rows[b][idx]));
        Ok(self.select_rows(&order))
    }

    /// Typed projection of every row. Requires the subject and sample
    /// identifier columns; every other field is optional.
    pub fn records(&self, hmo_columns: &[String]) -> DataResult<Vec<SampleRecord>> {
        let subject_idx = self.column_index(schema::SUBJECT_ID)?;
        let sample_idx = self.column_index(schema::SAMPLE_ID)?;
        let optional = |name: &str| self.columns.iter().position(|c| c == name);
        let dol_idx = optional(schema::DOL);
        let cga_idx = optional(schema::CGA);
        let milk_idx = optional(schema::MILK_TYPE);
        let source_idx = optional(schema::SAMPLE_SOURCE);
        let hmf_idx = optional(schema::HMF);
        let tpn_idx = optional(schema::TPN);
        let iron_idx = optional(schema::IRON);
        let notes_idx = optional(schema::NOTES);
        let hmo_idx: Vec<(String, usize)> = hmo_columns
            .iter()
            .filter_map(|h| optional(h).map(|i| (h.clone(), i)))
            .collect();

        let text = |row: &[Value], idx: Option<usize>| -> Option<String> {
            idx.map(|i| &row[i])
                .filter(|v| !v.is_missing())
                .map(Value::to_field)
        };

        Ok(self
            .rows
            .iter()
            .map(|row| SampleRecord {
                subject_id: row[subject_idx].to_field(),
                sample_id: row[sample_idx].to_field(),
                day_of_life: dol_idx
                    .and_then(|i| row[i].to_numeric())
                    .filter(|d| d.is_finite())
                    .map(|d| d.round() as i64),
                cga_weeks: cga_idx
                    .and_then(|i| row[i].to_numeric())
                    .filter(|d| !d.is_nan()),
                milk_type: text(row, milk_idx),
                sample_source: text(row, source_idx),
                fortifier: text(row, hmf_idx),
                tpn: text(row, tpn_idx),
                iron: text(row, iron_idx),
                notes: text(row, notes_idx),
                hmo: hmo_idx
                    .iter()
                    .map(|(name, i)| (name.clone(), row[*i].to_numeric().filter(|v| !v.is_nan())))
                    .collect(),
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// SampleRecord – typed view of one biological sample
// ---------------------------------------------------------------------------

/// One biological sample. Subjects are not stored; they are the groups of
/// records sharing `subject_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleRecord {
    pub subject_id: String,
    pub sample_id: String,
    pub day_of_life: Option<i64>,
    pub cga_weeks: Option<f64>,
    pub milk_type: Option<String>,
    pub sample_source: Option<String>,
    pub fortifier: Option<String>,
    pub tpn: Option<String>,
    pub iron: Option<String>,
    pub notes: Option<String>,
    /// HMO concentration per configured metric column.
    pub hmo: BTreeMap<String, Option<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table::from_rows(
            vec!["Subject ID".into(), "sample_unique_id".into(), "DOL".into()],
            vec![
                vec!["S1".into(), "S1-3".into(), Value::Integer(9)],
                vec!["S1".into(), "S1-1".into(), Value::Null],
                vec!["S2".into(), "S2-1".into(), Value::String("4".into())],
            ],
        )
        .unwrap()
    }

    #[test]
    fn short_rows_are_padded_and_long_rows_rejected() {
        let mut t = Table::new(vec!["a".into(), "b".into()]);
        t.push_row(vec![Value::Integer(1)]).unwrap();
        assert_eq!(t.rows()[0], vec![Value::Integer(1), Value::Null]);

        let err = t
            .push_row(vec![Value::Null, Value::Null, Value::Null])
            .unwrap_err();
        assert_eq!(
            err,
            DataError::RowWidth {
                row: 1,
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn numeric_sort_puts_missing_last_and_coerces_text() {
        let sorted = table().sorted_by_numeric("DOL").unwrap();
        let ids: Vec<String> = sorted
            .column_values("sample_unique_id")
            .unwrap()
            .map(Value::to_field)
            .collect();
        assert_eq!(ids, vec!["S2-1", "S1-3", "S1-1"]);
    }

    #[test]
    fn missing_column_is_reported_by_name() {
        let err = table().column_index("CGA").unwrap_err();
        assert_eq!(err, DataError::MissingColumn("CGA".into()));
    }

    #[test]
    fn with_column_replaces_existing() {
        let t = table()
            .with_column("DOL", vec![Value::Null, Value::Null, Value::Null])
            .unwrap();
        assert_eq!(t.columns().len(), 3);
        assert!(t.column_values("DOL").unwrap().all(Value::is_missing));
    }

    #[test]
    fn records_project_optional_fields() {
        let records = table().records(&[]).unwrap();
        assert_eq!(records[0].day_of_life, Some(9));
        assert_eq!(records[1].day_of_life, None);
        assert_eq!(records[2].day_of_life, Some(4));
        assert_eq!(records[0].milk_type, None);
    }

    #[test]
    fn float_fields_round_trip_as_text() {
        assert_eq!(Value::Float(5_000_000.0).to_field(), "5000000");
        assert_eq!(Value::Float(0.1).to_field(), "0.1");
        assert_eq!(Value::Null.to_field(), "");
    }
}
