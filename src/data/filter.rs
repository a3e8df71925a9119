use std::collections::{BTreeMap, BTreeSet};

use super::model::{Table, Value};
use super::schema;
use crate::error::DataResult;

// ---------------------------------------------------------------------------
// Filter predicate: which unique values are selected per column
// ---------------------------------------------------------------------------

/// Per-column selection state: maps column_name → set of selected values.
/// A column absent from the map is unconstrained.
pub type FilterState = BTreeMap<String, BTreeSet<Value>>;

/// Build a [`FilterState`] from `(column, displayed value)` pairs, matching
/// cells by their exported text. Pairs on the same column are alternatives;
/// text that matches no cell selects nothing.
pub fn filter_state_from_text(table: &Table, pairs: &[(String, String)]) -> DataResult<FilterState> {
    let mut state = FilterState::new();
    for (column, text) in pairs {
        let matching: Vec<Value> = table
            .unique_values(column)?
            .into_iter()
            .filter(|v| !v.is_missing() && v.to_field() == *text)
            .collect();
        state.entry(column.clone()).or_default().extend(matching);
    }
    Ok(state)
}

/// Return indices of rows that pass all active filters.
///
/// A row passes a column filter when its value for that column is in the
/// selected set. An empty set selects nothing.
pub fn filtered_indices(table: &Table, filters: &FilterState) -> DataResult<Vec<usize>> {
    let resolved: Vec<(usize, &BTreeSet<Value>)> = filters
        .iter()
        .map(|(col, selected)| Ok((table.column_index(col)?, selected)))
        .collect::<DataResult<_>>()?;

    Ok(table
        .rows()
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            resolved
                .iter()
                .all(|(idx, selected)| selected.contains(&row[*idx]))
        })
        .map(|(i, _)| i)
        .collect())
}

/// Rows passing every filter, in original order.
pub fn filter_rows(table: &Table, filters: &FilterState) -> DataResult<Table> {
    let indices = filtered_indices(table, filters)?;
    Ok(table.select_rows(&indices))
}

// ---------------------------------------------------------------------------
// Cohort filter
// ---------------------------------------------------------------------------

/// Samples per subject, keyed by subject (sorted). Rows without a subject
/// are not counted.
pub fn subject_sample_counts(table: &Table) -> DataResult<BTreeMap<Value, usize>> {
    let mut counts = BTreeMap::new();
    for subject in table.column_values(schema::SUBJECT_ID)? {
        if subject.is_missing() {
            continue;
        }
        *counts.entry(subject.clone()).or_insert(0) += 1;
    }
    Ok(counts)
}

/// Subjects with strictly more than `threshold` samples.
pub fn longitudinal_subjects(table: &Table, threshold: usize) -> DataResult<BTreeSet<Value>> {
    Ok(subject_sample_counts(table)?
        .into_iter()
        .filter(|(_, n)| *n > threshold)
        .map(|(subject, _)| subject)
        .collect())
}

/// Rows belonging to any of `subjects`, in original order.
pub fn restrict_to_subjects(table: &Table, subjects: &BTreeSet<Value>) -> DataResult<Table> {
    let filters = FilterState::from([(schema::SUBJECT_ID.to_string(), subjects.clone())]);
    filter_rows(table, &filters)
}

/// Longitudinal subjects together with the table restricted to them.
pub fn longitudinal_cohort(table: &Table, threshold: usize) -> DataResult<(BTreeSet<Value>, Table)> {
    let subjects = longitudinal_subjects(table, threshold)?;
    let rows = restrict_to_subjects(table, &subjects)?;
    Ok((subjects, rows))
}

/// Subjects with at least one sample whose `column` equals `value`
/// (e.g. ever received maternal milk).
pub fn subjects_with(table: &Table, column: &str, value: &Value) -> DataResult<BTreeSet<Value>> {
    let matching = table.rows_where(column, value)?;
    let subjects = matching
        .column_values(schema::SUBJECT_ID)?
        .filter(|s| !s.is_missing())
        .cloned()
        .collect();
    Ok(subjects)
}

/// First row per subject after ordering by sample identifier.
pub fn first_sample_per_subject(table: &Table) -> DataResult<Table> {
    let sorted = table.sorted_by(schema::SAMPLE_ID)?;
    let subject_idx = sorted.column_index(schema::SUBJECT_ID)?;
    let mut seen = BTreeSet::new();
    let indices: Vec<usize> = sorted
        .rows()
        .iter()
        .enumerate()
        .filter(|(_, row)| seen.insert(row[subject_idx].clone()))
        .map(|(i, _)| i)
        .collect();
    Ok(sorted.select_rows(&indices))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cohort(samples: &[(&str, usize)]) -> Table {
        let mut t = Table::new(vec![
            schema::SUBJECT_ID.into(),
            schema::SAMPLE_ID.into(),
            schema::MILK_TYPE.into(),
        ]);
        for (subject, n) in samples {
            for i in 0..*n {
                let milk = if i == 0 { "DBM" } else { "MOM" };
                t.push_row(vec![
                    Value::from(*subject),
                    Value::String(format!("{subject}-{i}")),
                    Value::from(milk),
                ])
                .unwrap();
            }
        }
        t
    }

    #[test]
    fn threshold_is_strict() {
        let t = cohort(&[("A", 5), ("B", 2)]);
        let subjects = longitudinal_subjects(&t, 3).unwrap();
        assert_eq!(subjects, BTreeSet::from([Value::from("A")]));

        let (_, rows) = longitudinal_cohort(&t, 3).unwrap();
        assert_eq!(rows.len(), 5);
    }

    #[test]
    fn exactly_threshold_is_excluded() {
        let t = cohort(&[("A", 3)]);
        assert!(longitudinal_subjects(&t, 3).unwrap().is_empty());
    }

    #[test]
    fn cohort_shrinks_as_threshold_grows() {
        let t = cohort(&[("A", 1), ("B", 2), ("C", 4), ("D", 4), ("E", 7)]);
        let sizes: Vec<usize> = (0..9)
            .map(|n| longitudinal_subjects(&t, n).unwrap().len())
            .collect();
        assert!(sizes.windows(2).all(|w| w[0] >= w[1]), "{sizes:?}");
        assert_eq!(sizes[0], 5);
        assert_eq!(sizes[8], 0);
    }

    #[test]
    fn empty_table_gives_empty_cohort() {
        let t = cohort(&[]);
        assert!(longitudinal_subjects(&t, 3).unwrap().is_empty());
    }

    #[test]
    fn empty_selection_hides_everything() {
        let t = cohort(&[("A", 2)]);
        let filters = FilterState::from([(schema::MILK_TYPE.to_string(), BTreeSet::new())]);
        assert!(filtered_indices(&t, &filters).unwrap().is_empty());

        let both = filter_state_from_text(
            &t,
            &[
                (schema::MILK_TYPE.to_string(), "MOM".to_string()),
                (schema::MILK_TYPE.to_string(), "DBM".to_string()),
            ],
        )
        .unwrap();
        assert_eq!(filtered_indices(&t, &both).unwrap(), vec![0, 1]);
    }

    #[test]
    fn text_filters_match_numeric_cells() {
        let mut t = cohort(&[("A", 2), ("B", 1)]);
        t = t
            .with_column(schema::DOL, vec![Value::Integer(3), Value::Integer(9), Value::Null])
            .unwrap();
        let state = filter_state_from_text(
            &t,
            &[
                (schema::DOL.to_string(), "9".to_string()),
                (schema::MILK_TYPE.to_string(), "MOM".to_string()),
            ],
        )
        .unwrap();
        let rows = filter_rows(&t, &state).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.get(0, schema::SAMPLE_ID), Some(&Value::from("A-1")));

        let none = filter_state_from_text(&t, &[(schema::DOL.to_string(), "4".to_string())]).unwrap();
        assert!(filter_rows(&t, &none).unwrap().is_empty());
    }

    #[test]
    fn first_sample_follows_sample_id_order() {
        let t = cohort(&[("B", 1), ("A", 3)]);
        let firsts = first_sample_per_subject(&t).unwrap();
        let ids: Vec<String> = firsts
            .column_values(schema::SAMPLE_ID)
            .unwrap()
            .map(Value::to_field)
            .collect();
        assert_eq!(ids, vec!["A-0", "B-0"]);
    }

    #[test]
    fn subjects_with_maternal_milk() {
        let t = cohort(&[("A", 3), ("B", 1)]);
        let with_mom = subjects_with(&t, schema::MILK_TYPE, &Value::from("MOM")).unwrap();
        assert_eq!(with_mom, BTreeSet::from([Value::from("A")]));
    }
}
