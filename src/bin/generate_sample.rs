use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use log::info;
use parquet::arrow::ArrowWriter;

const HMOS: [&str; 15] = [
    "2FL", "DFLac", "3SL", "6SL", "LNT", "LNnT", "LNFP I", "LNFP II", "LNFP III", "LSTc", "DFLNT",
    "DSLNT", "DFLNH", "FDSLNH", "DSLNH",
];

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next_u64() % n
    }

    fn pick<'a>(&mut self, options: &[&'a str]) -> &'a str {
        options[self.below(options.len() as u64) as usize]
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// One generated sample, column-ordered like the raw study sheet.
struct Row {
    subject: String,
    sample: String,
    cga: f64,
    dol: i64,
    weight: f64,
    height: f64,
    hc: f64,
    source: &'static str,
    milk: &'static str,
    hmf: &'static str,
    tpn: &'static str,
    iron: &'static str,
    aliquots: i64,
    notes: Option<&'static str>,
    hmo: Vec<Option<f64>>,
}

fn generate(rng: &mut SimpleRng, subjects: usize) -> Vec<Row> {
    let mut rows = Vec::new();
    for s in 0..subjects {
        let subject = format!("NB-{:03}", s + 1);
        let n_samples = 1 + rng.below(7) as usize;
        let birth_ga = 24.0 + rng.next_f64() * 12.0;
        let secretor = rng.next_f64() < 0.75;
        let mut dol = 1 + rng.below(5) as i64;
        let mut weight = 600.0 + (birth_ga - 24.0) * 150.0;

        for i in 0..n_samples {
            let cga = birth_ga + dol as f64 / 7.0;
            let milk = rng.pick(&["MOM", "MOM", "DBM", "MOM + DBM"]);
            let maternal = milk != "DBM";
            let hmo = HMOS
                .iter()
                .enumerate()
                .map(|(h, _)| {
                    // Donor milk is pooled; its HMO panel was not measured.
                    if !maternal || rng.next_f64() < 0.05 {
                        return None;
                    }
                    let base = if h == 0 {
                        if secretor { 8.0e6 } else { 1.5e6 }
                    } else {
                        2.0e6 / (h as f64 + 1.0)
                    };
                    Some(rng.gauss(base, base * 0.2).max(0.0).round())
                })
                .collect();

            rows.push(Row {
                subject: subject.clone(),
                sample: format!("{subject}-{:02}", i + 1),
                cga: (cga * 10.0).round() / 10.0,
                dol,
                weight: weight.round(),
                height: (30.0 + cga * 0.5).round(),
                hc: (20.0 + cga * 0.35).round(),
                source: rng.pick(&["Scavenged", "Scavenged", "Residual"]),
                milk,
                hmf: rng.pick(&["Y", "N"]),
                tpn: if dol < 10 { "Y" } else { "N" },
                iron: rng.pick(&["Y", "N", "N"]),
                aliquots: rng.below(5) as i64,
                notes: (rng.next_f64() < 0.15).then_some("thawed before aliquoting"),
                hmo,
            });

            dol += 3 + rng.below(8) as i64;
            weight += rng.gauss(20.0, 5.0) * 5.0;
        }
    }
    rows
}

/// Raw header spellings, as exported from the study spreadsheet.
fn headers() -> Vec<String> {
    let mut h: Vec<String> = [
        "Subject ID",
        "sample_unique_id",
        "CGA",
        "DOL ",
        "Current Weight",
        "Current Height",
        "Current HC",
        "Scavenged/Fresh?",
        "MBM/DMB?",
        "HMF Y/N?",
        "TPN Y/N?",
        "Iron Y/N? ",
        "Aliquots_num",
        "Additional Comments",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    h.extend(HMOS.iter().map(|s| s.to_string()));
    h
}

fn write_csv(rows: &[Row], path: &PathBuf) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path).context("creating CSV")?;
    wtr.write_record(headers())?;
    for r in rows {
        let mut record = vec![
            r.subject.clone(),
            r.sample.clone(),
            r.cga.to_string(),
            r.dol.to_string(),
            r.weight.to_string(),
            r.height.to_string(),
            r.hc.to_string(),
            r.source.to_string(),
            r.milk.to_string(),
            r.hmf.to_string(),
            r.tpn.to_string(),
            r.iron.to_string(),
            r.aliquots.to_string(),
            r.notes.unwrap_or_default().to_string(),
        ];
        record.extend(r.hmo.iter().map(|v| v.map(|x| x.to_string()).unwrap_or_default()));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_parquet(rows: &[Row], path: &PathBuf) -> Result<()> {
    let text = |f: &dyn Fn(&Row) -> Option<String>| -> ArrayRef {
        let mut b = StringBuilder::new();
        for r in rows {
            b.append_option(f(r));
        }
        Arc::new(b.finish())
    };
    let float = |f: &dyn Fn(&Row) -> Option<f64>| -> ArrayRef {
        let mut b = Float64Builder::new();
        for r in rows {
            b.append_option(f(r));
        }
        Arc::new(b.finish())
    };
    let int = |f: &dyn Fn(&Row) -> i64| -> ArrayRef {
        let mut b = Int64Builder::new();
        for r in rows {
            b.append_value(f(r));
        }
        Arc::new(b.finish())
    };

    let mut columns: Vec<ArrayRef> = vec![
        text(&|r| Some(r.subject.clone())),
        text(&|r| Some(r.sample.clone())),
        float(&|r| Some(r.cga)),
        int(&|r| r.dol),
        float(&|r| Some(r.weight)),
        float(&|r| Some(r.height)),
        float(&|r| Some(r.hc)),
        text(&|r| Some(r.source.to_string())),
        text(&|r| Some(r.milk.to_string())),
        text(&|r| Some(r.hmf.to_string())),
        text(&|r| Some(r.tpn.to_string())),
        text(&|r| Some(r.iron.to_string())),
        int(&|r| r.aliquots),
        text(&|r| r.notes.map(String::from)),
    ];
    for h in 0..HMOS.len() {
        columns.push(float(&|r| r.hmo[h]));
    }

    let fields: Vec<Field> = headers()
        .into_iter()
        .zip(&columns)
        .map(|(name, col)| Field::new(name, col.data_type().clone(), true))
        .collect();
    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), columns).context("building record batch")?;

    let file = std::fs::File::create(path).context("creating parquet file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let mut rng = SimpleRng::new(42);
    let rows = generate(&mut rng, 34);

    let csv_path = out_dir.join("sample_cohort.csv");
    let parquet_path = out_dir.join("sample_cohort.parquet");
    write_csv(&rows, &csv_path)?;
    write_parquet(&rows, &parquet_path)?;

    info!(
        "Wrote {} samples to {} and {}",
        rows.len(),
        csv_path.display(),
        parquet_path.display()
    );
    println!("Wrote {} samples for 34 subjects", rows.len());
    Ok(())
}
