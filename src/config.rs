// ⚙️ Configuration
// defaults <- optional JSON file <- DASHBOARD_* env vars <- CLI flags

use crate::record::PriceColumn;
use crate::series::{parse_selection, RangePreset};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_SOURCE: &str = "DASHBOARD_SOURCE";
pub const ENV_TITLE: &str = "DASHBOARD_TITLE";
pub const ENV_SERIES: &str = "DASHBOARD_SERIES";
pub const ENV_RANGE: &str = "DASHBOARD_RANGE";
pub const ENV_BIND: &str = "DASHBOARD_BIND";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// CSV or JSON export of the sheet
    pub source: PathBuf,

    /// Page / header title
    pub title: String,

    /// Comma separated price columns; None = Close, else first available
    pub series: Option<String>,

    pub range: RangePreset,

    /// Rows shown in the text data preview
    pub preview_rows: usize,

    /// Server listen address
    pub bind: String,

    /// Fallback tracing filter when RUST_LOG is unset
    pub log_filter: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig {
            source: PathBuf::from("data/prices.csv"),
            title: "Stock Price Analysis".to_string(),
            series: None,
            range: RangePreset::All,
            preview_rows: 20,
            bind: "0.0.0.0:3000".to_string(),
            log_filter: "info".to_string(),
        }
    }
}

impl DashboardConfig {
    /// Defaults, overlaid with `path` when given, then with the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.with_env(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Apply DASHBOARD_* overrides. `lookup` is `std::env::var` in practice.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(source) = lookup(ENV_SOURCE) {
            self.source = PathBuf::from(source);
        }
        if let Some(title) = lookup(ENV_TITLE) {
            self.title = title;
        }
        if let Some(series) = lookup(ENV_SERIES) {
            self.series = Some(series);
        }
        if let Some(range) = lookup(ENV_RANGE) {
            self.range = range
                .parse::<RangePreset>()
                .with_context(|| format!("Invalid {}", ENV_RANGE))?;
        }
        if let Some(bind) = lookup(ENV_BIND) {
            self.bind = bind;
        }
        // Validate eagerly so a typo fails at startup, not at first render
        self.selection()?;
        Ok(self)
    }

    /// Parsed `series`, None when unset or blank
    pub fn selection(&self) -> Result<Option<Vec<PriceColumn>>> {
        match self.series.as_deref() {
            None => Ok(None),
            Some(text) => {
                let columns = parse_selection(text).context("Invalid series selection")?;
                Ok(if columns.is_empty() { None } else { Some(columns) })
            }
        }
    }
}
