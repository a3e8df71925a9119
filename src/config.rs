use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::data::classify::{CgaBins, SecretorRule};
use crate::data::schema;

// ---------------------------------------------------------------------------
// Run configuration
// ---------------------------------------------------------------------------

/// Tunable constants of the dashboard: cutoffs, metric panel, header aliases.
/// Every field has a default so a config file only lists what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub secretor: SecretorRule,

    /// Subjects need strictly more samples than this to count as longitudinal.
    pub min_timepoints: usize,

    /// HMO metric columns, in display order.
    pub hmo_columns: Vec<String>,

    /// Extra header aliases, merged over the built-in table.
    pub column_aliases: BTreeMap<String, String>,

    pub cga_bins: CgaBins,

    /// Milk type marking maternal (own mother's) milk.
    pub maternal_milk: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            secretor: SecretorRule::default(),
            min_timepoints: 3,
            hmo_columns: schema::default_hmo_columns(),
            column_aliases: BTreeMap::new(),
            cga_bins: CgaBins::default(),
            maternal_milk: "MOM".to_string(),
        }
    }
}

impl Config {
    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = serde_json::from_str(&text).context("parsing config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(cutoff) = self.secretor.cutoff() {
            if !cutoff.is_finite() {
                bail!("secretor cutoff must be a finite number");
            }
        }
        self.cga_bins.validate()?;
        Ok(())
    }

    /// Built-in aliases with user entries layered on top.
    pub fn aliases(&self) -> BTreeMap<String, String> {
        let mut aliases = schema::default_aliases();
        aliases.extend(
            self.column_aliases
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        aliases
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "min_timepoints": 2, "column_aliases": { "Milk": "Type of Milk" } }"#)
                .unwrap();
        assert_eq!(config.min_timepoints, 2);
        assert_eq!(config.secretor.cutoff(), Some(5_000_000.0));
        assert_eq!(config.hmo_columns.len(), 15);
        assert_eq!(config.aliases().get("Milk").map(String::as_str), Some("Type of Milk"));
        assert_eq!(
            config.aliases().get("MBM/DMB?").map(String::as_str),
            Some("Type of Milk")
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(serde_json::from_str::<Config>(r#"{ "cutof": 1 }"#).is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("neobank.json");
        std::fs::write(
            &path,
            r#"{ "secretor": { "kind": "threshold", "column": "2FL [nmol/mL]", "cutoff": 1200 } }"#,
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.secretor.column(), "2FL [nmol/mL]");
        assert_eq!(config.secretor.cutoff(), Some(1200.0));
    }

    #[test]
    fn label_rule_from_file() {
        let config: Config = serde_json::from_str(
            r#"{ "secretor": { "kind": "label", "column": "moms_secretor_status" } }"#,
        )
        .unwrap();
        assert_eq!(
            config.secretor,
            SecretorRule::Label {
                column: "moms_secretor_status".into()
            }
        );
        assert!(config.validate().is_ok());
    }
}
