//! Dashboard sections.
//!
//! Each section is computed on its own from the loaded table. A section that
//! cannot be built (a column missing from this file revision, no eligible
//! subject, ...) is reported as failed and the remaining sections still
//! render.

use std::collections::BTreeMap;

use log::error;
use serde::Serialize;

use crate::config::Config;
use crate::data::aggregate::{
    self, AggOp, EmptyGroups, Group, MetricRange, ValueCount, column_sum, count_unique,
    value_counts,
};
use crate::data::classify::{self, SecretorRule};
use crate::data::filter;
use crate::data::model::{Table, Value};
use crate::data::reshape::{self, LongTable};
use crate::data::schema;
use crate::error::{DataError, DataResult};
use crate::state::Selection;

// ---------------------------------------------------------------------------
// Section wrapper
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section<T> {
    Ready(T),
    Failed(String),
}

impl<T> Section<T> {
    fn build(name: &str, f: impl FnOnce() -> DataResult<T>) -> Self {
        match f() {
            Ok(v) => Section::Ready(v),
            Err(e) => {
                error!("section '{name}' failed: {e}");
                Section::Failed(e.to_string())
            }
        }
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Section::Ready(v) => Some(v),
            Section::Failed(_) => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Section::Ready(_))
    }
}

// ---------------------------------------------------------------------------
// Section payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectCount {
    pub subject: Value,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub total_samples: usize,
    pub unique_subjects: usize,
    pub samples_per_subject: Vec<SubjectCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aliquots {
    pub total: f64,
    pub per_subject: Vec<Group>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Longitudinal {
    /// Subjects need strictly more samples than this.
    pub threshold: usize,
    pub subjects: Vec<Value>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Secretor {
    pub rule: SecretorRule,
    /// Per-sample labels; samples without a measurement appear as `null`.
    pub samples: Vec<ValueCount>,
    /// One label per subject, from its first maternal-milk sample.
    pub maternal: Vec<ValueCount>,
    pub subjects_with_maternal_milk: usize,
    pub subjects_without_maternal_milk: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrajectoryPoint {
    pub sample_id: String,
    pub day_of_life: Option<i64>,
    pub cga_weeks: Option<f64>,
    pub cga_category: Option<String>,
    pub growth: Option<f64>,
    pub hmo: Option<f64>,
    pub milk_type: Option<String>,
    pub sample_source: Option<String>,
    pub fortifier: Option<String>,
    pub tpn: Option<String>,
    pub iron: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    pub subject: Value,
    pub hmo: String,
    pub growth_metric: String,
    pub points: Vec<TrajectoryPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heatmap {
    pub subject: Value,
    /// Min-max normalized HMO values per sample, in long form keyed by
    /// `Sample #` and `DOL`. JSON has no NaN, so a metric without spread
    /// serializes as `null` just like an unmeasured sample; check
    /// `no_spread` to tell them apart.
    pub cells: LongTable,
    /// Metrics measured for this subject whose values are all equal.
    pub no_spread: Vec<String>,
}

/// Sample counts for the demographic bars.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Demographics {
    /// Samples per `Linked` flag.
    pub linked: Section<Vec<ValueCount>>,
    /// Infants per sex, one vote per subject.
    pub infant_sex: Section<Vec<ValueCount>>,
}

// ---------------------------------------------------------------------------
// Section builders
// ---------------------------------------------------------------------------

pub fn overview(table: &Table) -> DataResult<Overview> {
    let counts = filter::subject_sample_counts(table)?;
    Ok(Overview {
        total_samples: count_unique(table, schema::SAMPLE_ID)?,
        unique_subjects: counts.len(),
        samples_per_subject: counts
            .into_iter()
            .map(|(subject, samples)| SubjectCount { subject, samples })
            .collect(),
    })
}

pub fn aliquots(table: &Table) -> DataResult<Aliquots> {
    Ok(Aliquots {
        total: column_sum(table, schema::ALIQUOTS)?,
        per_subject: aggregate::aggregate(
            table,
            &[schema::SUBJECT_ID],
            schema::ALIQUOTS,
            AggOp::Sum,
            EmptyGroups::Omit,
        )?,
    })
}

pub fn longitudinal(table: &Table, threshold: usize) -> DataResult<Longitudinal> {
    let subjects: Vec<Value> = filter::longitudinal_subjects(table, threshold)?
        .into_iter()
        .collect();
    Ok(Longitudinal {
        threshold,
        count: subjects.len(),
        subjects,
    })
}

pub fn secretor(table: &Table, config: &Config) -> DataResult<Secretor> {
    let labelled = classify::with_secretor_status(table, &config.secretor)?;
    let maternal_value = Value::String(config.maternal_milk.clone());

    let maternal_rows = labelled.rows_where(schema::MILK_TYPE, &maternal_value)?;
    let first_maternal = filter::first_sample_per_subject(&maternal_rows)?;
    let with_mom = filter::subjects_with(table, schema::MILK_TYPE, &maternal_value)?.len();
    let all_subjects = filter::subject_sample_counts(table)?.len();

    Ok(Secretor {
        rule: config.secretor.clone(),
        samples: value_counts(&labelled, schema::SECRETOR_STATUS, true)?,
        maternal: value_counts(&first_maternal, schema::SECRETOR_STATUS, true)?,
        subjects_with_maternal_milk: with_mom,
        subjects_without_maternal_milk: all_subjects - with_mom,
    })
}

/// Linked flag per sample and sex per infant. The two halves fail
/// independently.
pub fn demographics(table: &Table) -> Demographics {
    Demographics {
        linked: Section::build("linked", || value_counts(table, schema::LINKED, false)),
        infant_sex: Section::build("infant sex", || {
            let infants = filter::first_sample_per_subject(table)?;
            value_counts(&infants, schema::INFANT_SEX, false)
        }),
    }
}

/// Free-text notes and how often each occurs; blank notes are left out.
pub fn notes(table: &Table) -> DataResult<Vec<ValueCount>> {
    value_counts(table, schema::NOTES, false)
}

/// Feeding period counts, blanks counted as their own entry.
pub fn feeding_periods(table: &Table) -> DataResult<Vec<ValueCount>> {
    value_counts(table, schema::FEEDING_PERIOD, true)
}

/// Prepped flag counts, blanks counted as their own entry.
pub fn prepped(table: &Table) -> DataResult<Vec<ValueCount>> {
    value_counts(table, schema::IS_PREPPED, true)
}

pub fn hmo_ranges(table: &Table, config: &Config) -> DataResult<Vec<MetricRange>> {
    aggregate::metric_ranges(table, &config.hmo_columns)
}

/// Samples per (subject, DOL category), zero-filled for stacked bars.
pub fn dol_categories(table: &Table) -> DataResult<Vec<Group>> {
    aggregate::aggregate(
        table,
        &[schema::SUBJECT_ID, schema::DOL_CATEGORY],
        schema::SUBJECT_ID,
        AggOp::Count,
        EmptyGroups::Zero,
    )
}

pub fn trajectory(
    table: &Table,
    config: &Config,
    subject: &Value,
    selection: &Selection,
) -> DataResult<Trajectory> {
    let hmo = selection.hmo_column(config)?.to_string();
    let growth_metric = selection.growth_column().to_string();

    let rows = table.rows_where(schema::SUBJECT_ID, subject)?;
    if rows.is_empty() {
        return Err(DataError::UnknownSubject(subject.to_field()));
    }
    let rows = rows.sorted_by_numeric(schema::DOL)?;
    // Fails early when the selected HMO column is absent.
    rows.column_index(&hmo)?;
    let growth = rows.numeric_column(&growth_metric)?;
    let records = rows.records(std::slice::from_ref(&hmo))?;

    let points = records
        .into_iter()
        .zip(growth)
        .map(|(rec, growth)| TrajectoryPoint {
            cga_category: config.cga_bins.categorize(rec.cga_weeks).map(String::from),
            hmo: rec.hmo.get(&hmo).copied().flatten(),
            sample_id: rec.sample_id,
            day_of_life: rec.day_of_life,
            cga_weeks: rec.cga_weeks,
            growth,
            milk_type: rec.milk_type,
            sample_source: rec.sample_source,
            fortifier: rec.fortifier,
            tpn: rec.tpn,
            iron: rec.iron,
        })
        .collect();

    Ok(Trajectory {
        subject: subject.clone(),
        hmo,
        growth_metric,
        points,
    })
}

pub fn heatmap(table: &Table, config: &Config, subject: &Value) -> DataResult<Heatmap> {
    let rows = table.rows_where(schema::SUBJECT_ID, subject)?;
    let has_values = config.hmo_columns.iter().try_fold(false, |any, h| {
        Ok::<_, DataError>(any || rows.numeric_column(h)?.iter().any(Option::is_some))
    })?;
    if !rows.is_empty() && !has_values {
        return Err(DataError::NoHmoData(subject.to_field()));
    }

    let normalized = reshape::normalize_subject(table, subject, &config.hmo_columns)?;
    let mut ids = vec![schema::SAMPLE_NUMBER];
    if normalized.has_column(schema::DOL) {
        ids.push(schema::DOL);
    }
    let mut no_spread = Vec::new();
    for metric in &config.hmo_columns {
        if normalized
            .column_values(metric)?
            .any(|v| matches!(v, Value::Float(x) if x.is_nan()))
        {
            no_spread.push(metric.clone());
        }
    }
    Ok(Heatmap {
        subject: subject.clone(),
        cells: reshape::melt(&normalized, &ids, &config.hmo_columns)?,
        no_spread,
    })
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

/// Every section of the dashboard for one loaded file and one selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub rows: usize,
    pub columns: Vec<String>,
    pub overview: Section<Overview>,
    pub demographics: Demographics,
    pub aliquots: Section<Aliquots>,
    pub distributions: BTreeMap<String, Section<Vec<ValueCount>>>,
    pub notes: Section<Vec<ValueCount>>,
    pub feeding_periods: Section<Vec<ValueCount>>,
    pub prepped: Section<Vec<ValueCount>>,
    pub longitudinal: Section<Longitudinal>,
    pub secretor: Section<Secretor>,
    pub hmo_ranges: Section<Vec<MetricRange>>,
    pub dol_categories: Section<Vec<Group>>,
    pub trajectory: Section<Trajectory>,
    pub heatmap: Section<Heatmap>,
}

impl Dashboard {
    pub fn build(table: &Table, config: &Config, selection: &Selection) -> Self {
        let threshold = config.min_timepoints;
        let subject = || -> DataResult<Value> {
            let eligible = filter::longitudinal_subjects(table, threshold)?;
            selection.resolve_subject(table, &eligible, threshold)
        };

        Dashboard {
            rows: table.len(),
            columns: table.columns().to_vec(),
            overview: Section::build("overview", || overview(table)),
            demographics: demographics(table),
            aliquots: Section::build("aliquots", || aliquots(table)),
            distributions: schema::NUTRITION_COLUMNS
                .iter()
                .map(|col| {
                    let section = Section::build(col, || value_counts(table, col, false));
                    (col.to_string(), section)
                })
                .collect(),
            notes: Section::build("notes", || notes(table)),
            feeding_periods: Section::build("feeding periods", || feeding_periods(table)),
            prepped: Section::build("prepped", || prepped(table)),
            longitudinal: Section::build("longitudinal", || longitudinal(table, threshold)),
            secretor: Section::build("secretor", || secretor(table, config)),
            hmo_ranges: Section::build("hmo ranges", || hmo_ranges(table, config)),
            dol_categories: Section::build("dol categories", || dol_categories(table)),
            trajectory: Section::build("trajectory", || {
                trajectory(table, config, &subject()?, selection)
            }),
            heatmap: Section::build("heatmap", || heatmap(table, config, &subject()?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            hmo_columns: vec!["2FL".into(), "LNT".into()],
            ..Config::default()
        }
    }

    fn table() -> Table {
        let columns = [
            "Subject ID",
            "sample_unique_id",
            "DOL",
            "CGA",
            "Type of Milk",
            "Aliquots",
            "Current Weight",
            "2FL",
            "LNT",
        ];
        let mut t = Table::new(columns.iter().map(|c| c.to_string()).collect());
        let rows: [(&str, &str, i64, f64, &str, i64, f64, Option<f64>, f64); 6] = [
            ("A", "A-1", 10, 30.0, "DBM", 2, 900.0, Some(1e6), 3.0),
            ("A", "A-2", 3, 29.0, "MOM", 1, 850.0, Some(6e6), 1.0),
            ("A", "A-3", 20, 33.0, "MOM", 3, 1000.0, None, 2.0),
            ("A", "A-4", 30, 35.0, "MOM", 0, 1100.0, Some(2e6), 4.0),
            ("B", "B-1", 5, 38.0, "MOM", 4, 2900.0, Some(4e6), 5.0),
            ("B", "B-2", 9, 39.0, "DBM", 1, 3000.0, Some(4.5e6), 5.0),
        ];
        for (s, id, dol, cga, milk, aliq, w, fl, lnt) in rows {
            t.push_row(vec![
                s.into(),
                id.into(),
                Value::Integer(dol),
                Value::Float(cga),
                milk.into(),
                Value::Integer(aliq),
                Value::Float(w),
                Value::from(fl),
                Value::Float(lnt),
            ])
            .unwrap();
        }
        t
    }

    #[test]
    fn overview_counts() {
        let o = overview(&table()).unwrap();
        assert_eq!(o.total_samples, 6);
        assert_eq!(o.unique_subjects, 2);
        assert_eq!(
            o.samples_per_subject[0],
            SubjectCount {
                subject: "A".into(),
                samples: 4
            }
        );
        let a = aliquots(&table()).unwrap();
        assert_eq!(a.total, 11.0);
        assert_eq!(a.per_subject[1].value, Some(5.0));
    }

    #[test]
    fn maternal_status_uses_first_mom_sample() {
        let s = secretor(&table(), &config()).unwrap();
        // A's first MOM sample is A-2 (6e6), B's is B-1 (4e6).
        assert_eq!(
            s.maternal,
            vec![
                ValueCount { value: "Non-Secretor".into(), count: 1 },
                ValueCount { value: "Secretor".into(), count: 1 },
            ]
        );
        assert!(s.samples.contains(&ValueCount { value: Value::Null, count: 1 }));
        assert_eq!(s.subjects_with_maternal_milk, 2);
        assert_eq!(s.subjects_without_maternal_milk, 0);
    }

    #[test]
    fn trajectory_is_ordered_by_day_of_life() {
        let t = trajectory(&table(), &config(), &"A".into(), &Selection::default()).unwrap();
        let days: Vec<Option<i64>> = t.points.iter().map(|p| p.day_of_life).collect();
        assert_eq!(days, vec![Some(3), Some(10), Some(20), Some(30)]);
        assert_eq!(t.points[0].hmo, Some(6e6));
        assert_eq!(t.points[0].growth, Some(850.0));
        assert_eq!(t.points[0].cga_category.as_deref(), Some("Very Preterm"));
        assert_eq!(t.points[3].cga_category.as_deref(), Some("Late Preterm"));
    }

    #[test]
    fn heatmap_marks_constant_metric_as_nan() {
        let h = heatmap(&table(), &config(), &"B".into()).unwrap();
        let lnt: Vec<&Value> = h
            .cells
            .rows
            .iter()
            .filter(|r| r.metric == "LNT")
            .map(|r| &r.value)
            .collect();
        assert_eq!(lnt.len(), 2);
        assert!(lnt.iter().all(|v| v.is_missing()));
        assert_eq!(h.no_spread, vec!["LNT".to_string()]);
    }

    #[test]
    fn maternal_status_from_recorded_labels() {
        let labels = vec![
            Value::from("Non-Secretor"),
            Value::from("Non-Secretor"),
            Value::from("Non-Secretor"),
            Value::from("Non-Secretor"),
            Value::from("Secretor"),
            Value::from("Secretor"),
        ];
        let t = table().with_column("moms_secretor_status", labels).unwrap();
        let config = Config {
            secretor: SecretorRule::Label {
                column: "moms_secretor_status".into(),
            },
            ..config()
        };
        let s = secretor(&t, &config).unwrap();
        assert_eq!(
            s.maternal,
            vec![
                ValueCount { value: "Non-Secretor".into(), count: 1 },
                ValueCount { value: "Secretor".into(), count: 1 },
            ]
        );
        assert!(!s.samples.iter().any(|c| c.value == Value::Null));
    }

    #[test]
    fn categorical_sections_follow_null_policy() {
        let t = table()
            .with_column(
                schema::FEEDING_PERIOD,
                vec![
                    "Day".into(),
                    Value::Null,
                    "Day".into(),
                    "Night".into(),
                    Value::Null,
                    Value::Null,
                ],
            )
            .unwrap()
            .with_column(
                schema::NOTES,
                vec![
                    "thawed".into(),
                    Value::Null,
                    "thawed".into(),
                    Value::Null,
                    Value::Null,
                    "leaked".into(),
                ],
            )
            .unwrap()
            .with_column(
                schema::INFANT_SEX,
                vec![
                    "Female".into(),
                    "Female".into(),
                    "Female".into(),
                    "Female".into(),
                    "Male".into(),
                    "Male".into(),
                ],
            )
            .unwrap();

        assert_eq!(
            feeding_periods(&t).unwrap(),
            vec![
                ValueCount { value: Value::Null, count: 3 },
                ValueCount { value: "Day".into(), count: 2 },
                ValueCount { value: "Night".into(), count: 1 },
            ]
        );
        assert_eq!(
            notes(&t).unwrap(),
            vec![
                ValueCount { value: "thawed".into(), count: 2 },
                ValueCount { value: "leaked".into(), count: 1 },
            ]
        );

        let demo = demographics(&t);
        assert_eq!(
            demo.infant_sex.ready().unwrap(),
            &vec![
                ValueCount { value: "Female".into(), count: 1 },
                ValueCount { value: "Male".into(), count: 1 },
            ]
        );
        assert!(!demo.linked.is_ready());
    }

    #[test]
    fn failing_sections_do_not_hide_others() {
        let dash = Dashboard::build(&table(), &config(), &Selection::default());
        assert!(dash.overview.is_ready());
        assert!(dash.secretor.is_ready());
        assert!(dash.trajectory.is_ready());
        // No DOL Category / Sample Source columns in this file.
        assert_eq!(
            dash.dol_categories,
            Section::Failed("column 'DOL Category' not found".into())
        );
        assert!(!dash.distributions["Sample Source"].is_ready());
        assert!(dash.distributions["Type of Milk"].is_ready());
        assert!(!dash.prepped.is_ready());
        assert!(!dash.demographics.linked.is_ready());
        assert_eq!(dash.longitudinal.ready().map(|l| l.count), Some(1));
    }

    #[test]
    fn no_eligible_subject_fails_only_subject_sections() {
        let config = Config {
            min_timepoints: 10,
            ..config()
        };
        let dash = Dashboard::build(&table(), &config, &Selection::default());
        assert!(!dash.trajectory.is_ready());
        assert!(!dash.heatmap.is_ready());
        assert!(dash.hmo_ranges.is_ready());
    }
}
