use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use super::model::Table;

/// Write `table` as comma-separated values: header row, then every row in
/// loaded order. Null cells are empty fields.
pub fn write_csv<W: Write>(table: &Table, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(table.columns())
        .context("writing CSV header")?;
    for (row_no, row) in table.rows().iter().enumerate() {
        wtr.write_record(row.iter().map(|v| v.to_field()))
            .with_context(|| format!("writing CSV row {row_no}"))?;
    }
    wtr.flush().context("flushing CSV output")?;
    Ok(())
}

/// CSV text of `table`, for download buttons and stdout.
pub fn to_csv_string(table: &Table) -> Result<String> {
    let mut buf = Vec::new();
    write_csv(table, &mut buf)?;
    String::from_utf8(buf).context("CSV output is not UTF-8")
}

pub fn export_csv(table: &Table, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    write_csv(table, std::io::BufWriter::new(file))?;
    log::info!("Exported {} rows to {}", table.len(), path.display());
    Ok(())
}
