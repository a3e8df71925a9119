use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::model::{Table, Value};
use crate::error::{DataError, DataResult};

// ---------------------------------------------------------------------------
// Group-by aggregation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggOp {
    /// Non-missing values of the value column.
    Count,
    Sum,
    Mean,
}

/// What to do with key combinations that have no rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyGroups {
    /// Only combinations present in the data (plain bar/pie charts).
    #[default]
    Omit,
    /// Full cross product of the observed key values, absent combinations
    /// reported as 0 (faceted / stacked charts).
    Zero,
}

/// One output row: a key combination and its aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub keys: Vec<Value>,
    /// `None` when a Sum/Mean group had no non-missing values.
    pub value: Option<f64>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    n: usize,
    sum: f64,
}

impl Accumulator {
    fn finish(self, op: AggOp) -> Option<f64> {
        match op {
            AggOp::Count => Some(self.n as f64),
            AggOp::Sum if self.n > 0 => Some(self.sum),
            AggOp::Mean if self.n > 0 => Some(self.sum / self.n as f64),
            _ => None,
        }
    }
}

/// Group `table` by `keys` and aggregate `value` with `op`.
///
/// Rows with a missing key are dropped. Missing values are skipped, never
/// read as zero: summing `[10, null, 20]` gives 30 and their mean is 15.
/// Groups come back sorted by key.
pub fn aggregate(
    table: &Table,
    keys: &[&str],
    value: &str,
    op: AggOp,
    empty: EmptyGroups,
) -> DataResult<Vec<Group>> {
    let key_idx: Vec<usize> = keys
        .iter()
        .map(|k| table.column_index(k))
        .collect::<DataResult<_>>()?;
    let value_idx = table.column_index(value)?;

    let mut groups: BTreeMap<Vec<Value>, Accumulator> = BTreeMap::new();
    for (r, row) in table.rows().iter().enumerate() {
        let key: Vec<Value> = key_idx.iter().map(|&i| row[i].clone()).collect();
        if key.iter().any(Value::is_missing) {
            continue;
        }
        let acc = groups.entry(key).or_default();

        let cell = &row[value_idx];
        if cell.is_missing() {
            continue;
        }
        acc.n += 1;
        if op != AggOp::Count {
            acc.sum += cell.to_numeric().ok_or_else(|| DataError::NotNumeric {
                column: value.to_string(),
                row: r,
            })?;
        }
    }

    if empty == EmptyGroups::Omit {
        return Ok(groups
            .into_iter()
            .map(|(keys, acc)| Group {
                keys,
                value: acc.finish(op),
            })
            .collect());
    }

    let domains: Vec<Vec<Value>> = (0..key_idx.len())
        .map(|k| {
            groups
                .keys()
                .map(|key| key[k].clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        })
        .collect();

    Ok(cross_product(&domains)
        .into_iter()
        .map(|keys| {
            let value = match groups.get(&keys) {
                Some(acc) => acc.finish(op),
                None => Some(0.0),
            };
            Group { keys, value }
        })
        .collect())
}

fn cross_product(domains: &[Vec<Value>]) -> Vec<Vec<Value>> {
    domains.iter().fold(vec![Vec::new()], |acc, domain| {
        acc.iter()
            .flat_map(|prefix| {
                domain.iter().map(move |v| {
                    let mut next = prefix.clone();
                    next.push(v.clone());
                    next
                })
            })
            .collect()
    })
}

/// Lay groups out as a table: one column per key, then `value_name`.
pub fn groups_to_table(keys: &[&str], value_name: &str, groups: &[Group]) -> DataResult<Table> {
    let mut columns: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    columns.push(value_name.to_string());
    let rows = groups
        .iter()
        .map(|g| {
            let mut row = g.keys.clone();
            row.push(Value::from(g.value));
            row
        })
        .collect();
    Table::from_rows(columns, rows)
}

// ---------------------------------------------------------------------------
// Single-column summaries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueCount {
    pub value: Value,
    pub count: usize,
}

/// Frequency of each value in `column`, most frequent first (ties by value).
/// Missing values are counted as a `Null` entry only when `include_missing`.
pub fn value_counts(table: &Table, column: &str, include_missing: bool) -> DataResult<Vec<ValueCount>> {
    let mut counts: BTreeMap<Value, usize> = BTreeMap::new();
    for v in table.column_values(column)? {
        if v.is_missing() {
            if include_missing {
                *counts.entry(Value::Null).or_insert(0) += 1;
            }
            continue;
        }
        *counts.entry(v.clone()).or_insert(0) += 1;
    }
    let mut out: Vec<ValueCount> = counts
        .into_iter()
        .map(|(value, count)| ValueCount { value, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    Ok(out)
}

/// Distinct non-missing values in `column`.
pub fn count_unique(table: &Table, column: &str) -> DataResult<usize> {
    Ok(table
        .column_values(column)?
        .filter(|v| !v.is_missing())
        .collect::<BTreeSet<_>>()
        .len())
}

/// Sum of the non-missing numeric values in `column`.
pub fn column_sum(table: &Table, column: &str) -> DataResult<f64> {
    Ok(table.numeric_column(column)?.into_iter().flatten().sum())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRange {
    pub metric: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub range: Option<f64>,
}

/// Min, max and spread of each metric over its non-missing values.
pub fn metric_ranges(table: &Table, metrics: &[String]) -> DataResult<Vec<MetricRange>> {
    metrics
        .iter()
        .map(|metric| {
            let values: Vec<f64> = table.numeric_column(metric)?.into_iter().flatten().collect();
            let min = values.iter().copied().reduce(f64::min);
            let max = values.iter().copied().reduce(f64::max);
            Ok(MetricRange {
                metric: metric.clone(),
                min,
                max,
                range: min.zip(max).map(|(lo, hi)| hi - lo),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table::from_rows(
            vec!["Subject ID".into(), "Type of Milk".into(), "Aliquots".into()],
            vec![
                vec!["A".into(), "MOM".into(), Value::Integer(10)],
                vec!["A".into(), "MOM".into(), Value::Null],
                vec!["A".into(), "DBM".into(), Value::Integer(20)],
                vec!["B".into(), "MOM".into(), Value::Float(2.5)],
                vec!["B".into(), Value::Null, Value::Integer(4)],
            ],
        )
        .unwrap()
    }

    fn values(groups: &[Group]) -> Vec<(Vec<String>, Option<f64>)> {
        groups
            .iter()
            .map(|g| (g.keys.iter().map(Value::to_field).collect(), g.value))
            .collect()
    }

    #[test]
    fn sum_skips_nulls() {
        let t = Table::from_rows(
            vec!["k".into(), "v".into()],
            vec![
                vec!["x".into(), Value::Null],
                vec!["x".into(), Value::Integer(10)],
                vec!["x".into(), Value::Integer(20)],
            ],
        )
        .unwrap();
        let sum = aggregate(&t, &["k"], "v", AggOp::Sum, EmptyGroups::Omit).unwrap();
        assert_eq!(sum[0].value, Some(30.0));
        let mean = aggregate(&t, &["k"], "v", AggOp::Mean, EmptyGroups::Omit).unwrap();
        assert_eq!(mean[0].value, Some(15.0));
        let count = aggregate(&t, &["k"], "v", AggOp::Count, EmptyGroups::Omit).unwrap();
        assert_eq!(count[0].value, Some(2.0));
    }

    #[test]
    fn omit_drops_empty_combinations() {
        let groups = aggregate(
            &table(),
            &["Subject ID", "Type of Milk"],
            "Subject ID",
            AggOp::Count,
            EmptyGroups::Omit,
        )
        .unwrap();
        assert_eq!(
            values(&groups),
            vec![
                (vec!["A".into(), "DBM".into()], Some(1.0)),
                (vec!["A".into(), "MOM".into()], Some(2.0)),
                (vec!["B".into(), "MOM".into()], Some(1.0)),
            ]
        );
    }

    #[test]
    fn zero_fills_full_cross_product() {
        let groups = aggregate(
            &table(),
            &["Subject ID", "Type of Milk"],
            "Subject ID",
            AggOp::Count,
            EmptyGroups::Zero,
        )
        .unwrap();
        assert_eq!(groups.len(), 4);
        assert_eq!(
            values(&groups)[2],
            (vec!["B".to_string(), "DBM".to_string()], Some(0.0))
        );
    }

    #[test]
    fn all_null_group_sums_to_none() {
        let t = Table::from_rows(
            vec!["k".into(), "v".into()],
            vec![vec!["x".into(), Value::Null]],
        )
        .unwrap();
        let groups = aggregate(&t, &["k"], "v", AggOp::Sum, EmptyGroups::Omit).unwrap();
        assert_eq!(groups[0].value, None);
    }

    #[test]
    fn text_in_numeric_column_is_an_error() {
        let t = Table::from_rows(
            vec!["k".into(), "v".into()],
            vec![vec!["x".into(), "n/a".into()]],
        )
        .unwrap();
        let err = aggregate(&t, &["k"], "v", AggOp::Sum, EmptyGroups::Omit).unwrap_err();
        assert_eq!(
            err,
            DataError::NotNumeric {
                column: "v".into(),
                row: 0
            }
        );
    }

    #[test]
    fn value_counts_sorted_by_frequency() {
        let counts = value_counts(&table(), "Type of Milk", false).unwrap();
        assert_eq!(counts[0], ValueCount { value: "MOM".into(), count: 3 });
        assert_eq!(counts.len(), 2);

        let with_missing = value_counts(&table(), "Type of Milk", true).unwrap();
        assert!(with_missing.contains(&ValueCount { value: Value::Null, count: 1 }));
    }

    #[test]
    fn ranges_ignore_missing() {
        let ranges = metric_ranges(&table(), &["Aliquots".to_string()]).unwrap();
        assert_eq!(ranges[0].min, Some(2.5));
        assert_eq!(ranges[0].max, Some(20.0));
        assert_eq!(ranges[0].range, Some(17.5));
        assert_eq!(column_sum(&table(), "Aliquots").unwrap(), 36.5);
        assert_eq!(count_unique(&table(), "Subject ID").unwrap(), 2);
    }
}
