use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;

use neobank::data::aggregate::{self, AggOp, EmptyGroups};
use neobank::data::classify::{self, SecretorRule};
use neobank::data::{export, filter, loader, reshape, schema};
use neobank::report::{self, Dashboard};
use neobank::{Config, Selection, Table};

/// Prepare NeoBANK biobank sample sheets for the dashboard.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Sample sheet (.xlsx, .xls, .ods, .csv, .json, .parquet)
    input: PathBuf,

    /// JSON config (cutoffs, HMO columns, header aliases)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Subjects need more than this many samples to count as longitudinal
    #[arg(long)]
    min_timepoints: Option<usize>,

    /// Secretor cutoff in AUC units (inclusive)
    #[arg(long)]
    cutoff: Option<f64>,

    /// Keep only rows where COLUMN shows VALUE; repeat a column to allow
    /// several values
    #[arg(long = "keep", value_name = "COLUMN=VALUE", value_parser = parse_keep)]
    keep: Vec<(String, String)>,

    /// Output format for tabular results
    #[arg(long, value_enum, default_value_t = Format::Json)]
    format: Format,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Every dashboard section as one JSON document
    Summary {
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        hmo: Option<String>,
        #[arg(long)]
        growth: Option<String>,
    },
    /// Rows of the longitudinal subjects
    Cohort,
    /// Secretor status summary
    Secretor,
    /// Group-by aggregate of one value column
    Aggregate {
        #[arg(long = "by", required = true)]
        by: Vec<String>,
        #[arg(long)]
        value: String,
        #[arg(long, value_enum, default_value_t = Op::Count)]
        op: Op,
        /// Emit every key combination, empty ones as 0
        #[arg(long, default_value_t = false)]
        complete: bool,
    },
    /// Frequency of each value in a column
    Counts {
        column: String,
        #[arg(long, default_value_t = false)]
        include_missing: bool,
    },
    /// HMO columns in long form
    Reshape {
        #[arg(long = "id", required = true)]
        id: Vec<String>,
        #[arg(long)]
        subject: Option<String>,
        /// Min-max normalize within the subject (requires --subject)
        #[arg(long, default_value_t = false)]
        normalize: bool,
    },
    /// One subject's samples over time
    Subject {
        subject: String,
        #[arg(long)]
        hmo: Option<String>,
        #[arg(long)]
        growth: Option<String>,
    },
    /// Write the loaded table as CSV
    Export {
        output: PathBuf,
        /// Append the derived secretor status column
        #[arg(long, default_value_t = false)]
        with_secretor: bool,
        /// Append the derived CGA category column
        #[arg(long, default_value_t = false)]
        with_cga: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Csv,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Op {
    Count,
    Sum,
    Mean,
}

impl From<Op> for AggOp {
    fn from(op: Op) -> Self {
        match op {
            Op::Count => AggOp::Count,
            Op::Sum => AggOp::Sum,
            Op::Mean => AggOp::Mean,
        }
    }
}

enum Output {
    Document(serde_json::Value),
    Table(Table),
    Written,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(n) = args.min_timepoints {
        config.min_timepoints = n;
    }
    if let Some(cutoff) = args.cutoff {
        match &mut config.secretor {
            SecretorRule::Threshold { cutoff: c, .. } => *c = cutoff,
            SecretorRule::Label { column } => {
                bail!("--cutoff needs a threshold secretor rule; '{column}' is read as labels")
            }
        }
    }
    config.validate()?;

    let mut table = loader::load_file(&args.input, &config.aliases())
        .with_context(|| format!("loading {}", args.input.display()))?;
    if !args.keep.is_empty() {
        let filters = filter::filter_state_from_text(&table, &args.keep)?;
        table = filter::filter_rows(&table, &filters)?;
        info!("{} rows left after --keep filters", table.len());
    }

    let output = run(&args.command, &table, &config)?;
    emit(output, args.format)
}

fn parse_keep(arg: &str) -> Result<(String, String), String> {
    let (column, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected COLUMN=VALUE, got '{arg}'"))?;
    Ok((column.trim().to_string(), value.trim().to_string()))
}

fn run(command: &Command, table: &Table, config: &Config) -> Result<Output> {
    let output = match command {
        Command::Summary {
            subject,
            hmo,
            growth,
        } => {
            let selection = Selection {
                subject: subject.clone(),
                hmo: hmo.clone(),
                growth_metric: growth.clone(),
            };
            let dashboard = Dashboard::build(table, config, &selection);
            Output::Document(serde_json::to_value(&dashboard)?)
        }
        Command::Cohort => {
            let (subjects, rows) = filter::longitudinal_cohort(table, config.min_timepoints)?;
            info!(
                "{} subjects with more than {} samples",
                subjects.len(),
                config.min_timepoints
            );
            Output::Table(rows)
        }
        Command::Secretor => Output::Document(serde_json::to_value(report::secretor(table, config)?)?),
        Command::Aggregate {
            by,
            value,
            op,
            complete,
        } => {
            let keys: Vec<&str> = by.iter().map(String::as_str).collect();
            let empty = if *complete {
                EmptyGroups::Zero
            } else {
                EmptyGroups::Omit
            };
            let groups = aggregate::aggregate(table, &keys, value, (*op).into(), empty)?;
            Output::Table(aggregate::groups_to_table(&keys, value, &groups)?)
        }
        Command::Counts {
            column,
            include_missing,
        } => {
            let counts = aggregate::value_counts(table, column, *include_missing)?;
            let rows = counts
                .into_iter()
                .map(|c| vec![c.value, neobank::Value::Integer(c.count as i64)])
                .collect();
            Output::Table(Table::from_rows(vec![column.clone(), "Count".to_string()], rows)?)
        }
        Command::Reshape {
            id,
            subject,
            normalize,
        } => {
            let ids: Vec<&str> = id.iter().map(String::as_str).collect();
            let source = match (subject, normalize) {
                (Some(s), true) => {
                    let key = Selection::subject(s.clone()).resolve_subject(
                        table,
                        &Default::default(),
                        config.min_timepoints,
                    )?;
                    reshape::normalize_subject(table, &key, &config.hmo_columns)?
                }
                (Some(s), false) => {
                    let key = Selection::subject(s.clone()).resolve_subject(
                        table,
                        &Default::default(),
                        config.min_timepoints,
                    )?;
                    table.rows_where(schema::SUBJECT_ID, &key)?
                }
                (None, true) => bail!("--normalize needs --subject"),
                (None, false) => table.clone(),
            };
            let long = reshape::melt(&source, &ids, &config.hmo_columns)?;
            Output::Table(long.to_table("HMO", "Value")?)
        }
        Command::Subject {
            subject,
            hmo,
            growth,
        } => {
            let selection = Selection {
                subject: Some(subject.clone()),
                hmo: hmo.clone(),
                growth_metric: growth.clone(),
            };
            let key = selection.resolve_subject(table, &Default::default(), config.min_timepoints)?;
            let trajectory = report::trajectory(table, config, &key, &selection)?;
            Output::Document(serde_json::to_value(trajectory)?)
        }
        Command::Export {
            output,
            with_secretor,
            with_cga,
        } => {
            let mut labelled = table.clone();
            if *with_secretor {
                labelled = classify::with_secretor_status(&labelled, &config.secretor)?;
            }
            if *with_cga {
                labelled = classify::with_cga_category(&labelled, &config.cga_bins)?;
            }
            export::export_csv(&labelled, output)?;
            Output::Written
        }
    };
    Ok(output)
}

fn emit(output: Output, format: Format) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match (output, format) {
        (Output::Written, _) => return Ok(()),
        (Output::Table(table), Format::Csv) => export::write_csv(&table, &mut out)?,
        (Output::Table(table), Format::Json) => {
            serde_json::to_writer_pretty(&mut out, &table_to_json(&table))?;
            writeln!(out)?;
        }
        (Output::Document(doc), Format::Json) => {
            serde_json::to_writer_pretty(&mut out, &doc)?;
            writeln!(out)?;
        }
        (Output::Document(_), Format::Csv) => {
            bail!("this command produces a nested document; use --format json")
        }
    }
    Ok(())
}

/// Records-oriented JSON: one object per row.
fn table_to_json(table: &Table) -> serde_json::Value {
    let records = table
        .rows()
        .iter()
        .map(|row| {
            let obj: serde_json::Map<String, serde_json::Value> = table
                .columns()
                .iter()
                .zip(row)
                .map(|(col, v)| {
                    (
                        col.clone(),
                        serde_json::to_value(v).unwrap_or(serde_json::Value::Null),
                    )
                })
                .collect();
            serde_json::Value::Object(obj)
        })
        .collect();
    serde_json::Value::Array(records)
}
