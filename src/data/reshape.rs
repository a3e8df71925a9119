use std::collections::BTreeMap;

use serde::Serialize;

use super::model::{Table, Value};
use super::schema;
use crate::error::{DataError, DataResult};

// ---------------------------------------------------------------------------
// Wide ⇄ long
// ---------------------------------------------------------------------------

/// One (identifier, metric, value) observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LongRow {
    pub ids: Vec<Value>,
    pub metric: String,
    pub value: Value,
}

/// Long form of a table: identifier columns plus one row per metric cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LongTable {
    pub id_columns: Vec<String>,
    /// Metric columns in their original order.
    pub metrics: Vec<String>,
    pub rows: Vec<LongRow>,
}

/// Unpivot `metrics` into long form. Rows come out metric by metric, each
/// block in the source row order. Values are copied untouched.
pub fn melt(table: &Table, id_columns: &[&str], metrics: &[String]) -> DataResult<LongTable> {
    let id_idx: Vec<usize> = id_columns
        .iter()
        .map(|c| table.column_index(c))
        .collect::<DataResult<_>>()?;
    let metric_idx: Vec<usize> = metrics
        .iter()
        .map(|m| table.column_index(m))
        .collect::<DataResult<_>>()?;

    let mut rows = Vec::with_capacity(table.len() * metrics.len());
    for (metric, &m) in metrics.iter().zip(&metric_idx) {
        for row in table.rows() {
            rows.push(LongRow {
                ids: id_idx.iter().map(|&i| row[i].clone()).collect(),
                metric: metric.clone(),
                value: row[m].clone(),
            });
        }
    }

    Ok(LongTable {
        id_columns: id_columns.iter().map(|c| c.to_string()).collect(),
        metrics: metrics.to_vec(),
        rows,
    })
}

/// Re-widen a long table: one row per identifier tuple (first-seen order),
/// one column per metric. Absent cells are null.
///
/// `pivot(melt(t))` reproduces `t` restricted to the id and metric columns.
pub fn pivot(long: &LongTable) -> DataResult<Table> {
    let metric_pos: BTreeMap<&str, usize> = long
        .metrics
        .iter()
        .enumerate()
        .map(|(i, m)| (m.as_str(), i))
        .collect();
    let n_ids = long.id_columns.len();

    let mut row_of: BTreeMap<&[Value], usize> = BTreeMap::new();
    let mut order: Vec<&[Value]> = Vec::new();
    let mut cells: Vec<Vec<Option<Value>>> = Vec::new();

    for r in &long.rows {
        let col = *metric_pos
            .get(r.metric.as_str())
            .ok_or_else(|| DataError::MissingColumn(r.metric.clone()))?;
        let ids = r.ids.as_slice();
        let row = *row_of.entry(ids).or_insert_with(|| {
            order.push(ids);
            cells.push(vec![None; long.metrics.len()]);
            cells.len() - 1
        });
        if cells[row][col].is_some() {
            return Err(DataError::DuplicateKey(format_key(ids, &r.metric)));
        }
        cells[row][col] = Some(r.value.clone());
    }

    let mut columns = long.id_columns.clone();
    columns.extend(long.metrics.iter().cloned());
    let mut table = Table::new(columns);
    for (ids, values) in order.into_iter().zip(cells) {
        let mut row = Vec::with_capacity(n_ids + values.len());
        row.extend_from_slice(ids);
        row.extend(values.into_iter().map(|v| v.unwrap_or(Value::Null)));
        table.push_row(row)?;
    }
    Ok(table)
}

fn format_key(ids: &[Value], metric: &str) -> String {
    let mut parts: Vec<String> = ids.iter().map(Value::to_field).collect();
    parts.push(metric.to_string());
    parts.join(", ")
}

impl LongTable {
    /// Flat table: id columns, then `metric_name`, then `value_name`.
    pub fn to_table(&self, metric_name: &str, value_name: &str) -> DataResult<Table> {
        let mut columns = self.id_columns.clone();
        columns.push(metric_name.to_string());
        columns.push(value_name.to_string());
        let rows = self
            .rows
            .iter()
            .map(|r| {
                let mut row = r.ids.clone();
                row.push(Value::String(r.metric.clone()));
                row.push(r.value.clone());
                row
            })
            .collect();
        Table::from_rows(columns, rows)
    }
}

// ---------------------------------------------------------------------------
// Min-max normalization
// ---------------------------------------------------------------------------

/// Rescale each metric column to [0, 1] with its own min and max.
///
/// Missing cells stay null. A column whose non-missing values are all equal
/// (including a single sample) has no spread; every such cell becomes NaN.
pub fn normalize_min_max(table: &Table, metrics: &[String]) -> DataResult<Table> {
    let mut out = table.clone();
    for metric in metrics {
        let values = table.numeric_column(metric)?;
        let lo = values.iter().flatten().copied().reduce(f64::min);
        let hi = values.iter().flatten().copied().reduce(f64::max);
        let scaled = values
            .into_iter()
            .map(|v| match (v, lo, hi) {
                (Some(x), Some(lo), Some(hi)) => Value::Float((x - lo) / (hi - lo)),
                _ => Value::Null,
            })
            .collect();
        out = out.with_column(metric, scaled)?;
    }
    Ok(out)
}

/// One subject's samples ordered by day of life, metrics normalized within
/// the subject, and a 1-based `Sample #` column. Output columns:
/// `Sample #`, `DOL` (when present), then `metrics`.
pub fn normalize_subject(table: &Table, subject: &Value, metrics: &[String]) -> DataResult<Table> {
    let rows = table.rows_where(schema::SUBJECT_ID, subject)?;
    if rows.is_empty() {
        return Err(DataError::UnknownSubject(subject.to_field()));
    }
    let rows = if rows.has_column(schema::DOL) {
        rows.sorted_by_numeric(schema::DOL)?
    } else {
        rows
    };
    let numbered = rows.clone().with_column(
        schema::SAMPLE_NUMBER,
        (1..=rows.len() as i64).map(Value::Integer).collect(),
    )?;
    let normalized = normalize_min_max(&numbered, metrics)?;

    let mut keep: Vec<&str> = vec![schema::SAMPLE_NUMBER];
    if normalized.has_column(schema::DOL) {
        keep.push(schema::DOL);
    }
    keep.extend(metrics.iter().map(String::as_str));
    normalized.select_columns(&keep)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> Vec<String> {
        vec!["2FL".into(), "LNT".into()]
    }

    fn wide() -> Table {
        Table::from_rows(
            vec!["sample_unique_id".into(), "2FL".into(), "LNT".into()],
            vec![
                vec!["a".into(), Value::Float(1.5), Value::Integer(7)],
                vec!["b".into(), Value::Null, Value::Float(-2.0)],
                vec!["c".into(), Value::Float(1e7), "n/d".into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn melt_is_metric_major() {
        let long = melt(&wide(), &["sample_unique_id"], &metrics()).unwrap();
        assert_eq!(long.rows.len(), 6);
        assert_eq!(long.rows[0].metric, "2FL");
        assert_eq!(long.rows[3].metric, "LNT");
        assert_eq!(long.rows[3].ids, vec![Value::from("a")]);
        assert_eq!(long.rows[1].value, Value::Null);
    }

    #[test]
    fn pivot_undoes_melt() {
        let t = wide();
        let long = melt(&t, &["sample_unique_id"], &metrics()).unwrap();
        assert_eq!(pivot(&long).unwrap(), t);
    }

    #[test]
    fn pivot_rejects_duplicate_cells() {
        let mut long = melt(&wide(), &["sample_unique_id"], &metrics()).unwrap();
        let dup = long.rows[0].clone();
        long.rows.push(dup);
        assert!(matches!(pivot(&long), Err(DataError::DuplicateKey(_))));
    }

    #[test]
    fn min_max_spans_unit_interval() {
        let t = Table::from_rows(
            vec!["v".into()],
            vec![
                vec![Value::Integer(10)],
                vec![Value::Integer(20)],
                vec![Value::Null],
                vec![Value::Integer(15)],
            ],
        )
        .unwrap();
        let out = normalize_min_max(&t, &["v".to_string()]).unwrap();
        let v: Vec<Value> = out.column_values("v").unwrap().cloned().collect();
        assert_eq!(
            v,
            vec![Value::Float(0.0), Value::Float(1.0), Value::Null, Value::Float(0.5)]
        );
    }

    #[test]
    fn constant_metric_becomes_nan() {
        let t = Table::from_rows(
            vec!["v".into()],
            vec![vec![Value::Integer(4)], vec![Value::Integer(4)]],
        )
        .unwrap();
        let out = normalize_min_max(&t, &["v".to_string()]).unwrap();
        assert!(out
            .column_values("v")
            .unwrap()
            .all(|v| matches!(v, Value::Float(x) if x.is_nan())));
    }

    #[test]
    fn subject_is_sorted_numbered_and_normalized() {
        let t = Table::from_rows(
            vec!["Subject ID".into(), "DOL".into(), "2FL".into(), "LNT".into()],
            vec![
                vec!["S1".into(), Value::Integer(12), Value::Integer(30), Value::Integer(5)],
                vec!["S2".into(), Value::Integer(1), Value::Integer(99), Value::Integer(1)],
                vec!["S1".into(), Value::Integer(3), Value::Integer(10), Value::Integer(5)],
            ],
        )
        .unwrap();
        let out = normalize_subject(&t, &Value::from("S1"), &metrics()).unwrap();
        assert_eq!(out.columns(), ["Sample #", "DOL", "2FL", "LNT"]);
        assert_eq!(
            out.rows()[0][..3],
            [Value::Integer(1), Value::Integer(3), Value::Float(0.0)]
        );
        assert_eq!(out.rows()[1][2], Value::Float(1.0));
        assert!(out.rows()[1][3].is_missing());

        let err = normalize_subject(&t, &Value::from("S9"), &metrics()).unwrap_err();
        assert_eq!(err, DataError::UnknownSubject("S9".into()));
    }
}
