// 🔁 Pipeline
// Row Source -> Normalizer -> (PriceTable, HeatmapTable)
//
// One run = one fetch + two pure stages. Nothing is kept between runs.

use crate::error::PipelineError;
use crate::normalizer::{aggregate_monthly, normalize, HeatmapTable, NormalizationReport, PriceTable};
use crate::record::Record;
use crate::source::RowSource;
use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

// ============================================================================
// SECTION OUTCOME
// ============================================================================

/// Section - what one dashboard panel has to show
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Section<T> {
    /// Data to render
    Ready(T),
    /// Stage succeeded but produced zero rows: show "no data", not an empty chart
    NoData,
    /// A required column is missing for this panel
    Failed(PipelineError),
}

impl<T> Section<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Section::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Section::Ready(_))
    }

    pub fn as_ref(&self) -> Section<&T> {
        match self {
            Section::Ready(value) => Section::Ready(value),
            Section::NoData => Section::NoData,
            Section::Failed(err) => Section::Failed(err.clone()),
        }
    }

    /// Transform the ready value, keeping NoData / Failed as they are
    pub fn map<U>(&self, f: impl FnOnce(&T) -> U) -> Section<U> {
        match self {
            Section::Ready(value) => Section::Ready(f(value)),
            Section::NoData => Section::NoData,
            Section::Failed(err) => Section::Failed(err.clone()),
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Section::Ready(_) => "ready",
            Section::NoData => "no_data",
            Section::Failed(_) => "failed",
        }
    }
}

// ============================================================================
// DASHBOARD
// ============================================================================

/// Dashboard - the complete output of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub prices: Section<PriceTable>,
    pub heatmap: Section<HeatmapTable>,
    pub report: NormalizationReport,
}

/// Build both sections from raw records.
///
/// # Errors
/// `MissingColumn("Date")` aborts the whole run: without timestamps neither
/// panel can be drawn. A missing Close only fails the heatmap section.
pub fn build_dashboard(records: &[Record]) -> Result<Dashboard, PipelineError> {
    let (table, report) = normalize(records)?;

    if table.is_empty() {
        return Ok(Dashboard {
            prices: Section::NoData,
            heatmap: Section::NoData,
            report,
        });
    }

    let heatmap = match aggregate_monthly(&table) {
        Ok(heatmap) if heatmap.is_empty() => Section::NoData,
        Ok(heatmap) => Section::Ready(heatmap),
        Err(err) => {
            warn!(error = %err, "heatmap unavailable");
            Section::Failed(err)
        }
    };

    Ok(Dashboard {
        prices: Section::Ready(table),
        heatmap,
        report,
    })
}

/// Fetch from `source` and build the dashboard.
///
/// The outer `Result` is a source failure (I/O, bad file); the inner one is
/// a schema failure the caller should show to the user.
pub fn run(source: &dyn RowSource) -> Result<std::result::Result<Dashboard, PipelineError>> {
    let records = source
        .fetch()
        .with_context(|| format!("Failed to fetch rows from {}", source.describe()))?;

    let dashboard = build_dashboard(&records);

    match &dashboard {
        Ok(d) => info!(
            source = %source.describe(),
            rows = d.report.input_rows,
            kept = d.report.kept_rows,
            dropped = d.report.dropped_count(),
            heatmap = d.heatmap.status(),
            "pipeline run complete"
        ),
        Err(err) => warn!(source = %source.describe(), error = %err, "pipeline run failed"),
    }

    Ok(dashboard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PriceColumn;
    use crate::source::MemorySource;

    fn rec(date: &str, close: &str) -> Record {
        Record::new().with("Date", date).with("Close", close)
    }

    #[test]
    fn test_full_dashboard() {
        let records = vec![
            rec("02/01/2023 09:00:00", "10"),
            rec("01/01/2023 09:00:00", "20"),
            rec("bad", "30"),
        ];
        let dashboard = build_dashboard(&records).unwrap();

        let prices = dashboard.prices.ready().unwrap();
        assert_eq!(prices.len(), 2);
        assert_eq!(prices.rows[0].price(PriceColumn::Close), Some(20.0));

        let heatmap = dashboard.heatmap.ready().unwrap();
        assert_eq!(heatmap.get(2023, 1), Some(15.0));
        assert_eq!(dashboard.report.dropped_count(), 1);
    }

    #[test]
    fn test_missing_date_aborts_run() {
        let records = vec![Record::new().with("Close", "1")];
        let err = build_dashboard(&records).unwrap_err();
        assert_eq!(err.missing(), Some("Date"));
    }

    #[test]
    fn test_all_rows_dropped_is_no_data() {
        let dashboard = build_dashboard(&[rec("not-a-date", "1")]).unwrap();
        assert_eq!(dashboard.prices, Section::NoData);
        assert_eq!(dashboard.heatmap, Section::NoData);
        assert_eq!(dashboard.report.input_rows, 1);
    }

    #[test]
    fn test_missing_close_only_fails_heatmap() {
        let records = vec![Record::new()
            .with("Date", "01/01/2023 09:00:00")
            .with("Open", "5")];
        let dashboard = build_dashboard(&records).unwrap();

        assert!(dashboard.prices.is_ready());
        match &dashboard.heatmap {
            Section::Failed(err) => assert_eq!(err.missing(), Some("Close")),
            other => panic!("expected failed heatmap, got {:?}", other),
        }
    }

    #[test]
    fn test_unusable_close_gives_no_data_heatmap() {
        let dashboard = build_dashboard(&[rec("01/01/2023 09:00:00", "n/a")]).unwrap();
        assert!(dashboard.prices.is_ready());
        assert_eq!(dashboard.heatmap, Section::NoData);
    }

    #[test]
    fn test_run_through_source() {
        let source = MemorySource::new(vec![rec("01/01/2023 09:00:00", "1")]);
        let dashboard = run(&source).unwrap().unwrap();
        assert!(dashboard.prices.is_ready());

        let empty = MemorySource::new(vec![]);
        assert!(run(&empty).unwrap().is_err());
    }

    #[test]
    fn test_section_serializes_with_status() {
        let ready: Section<u32> = Section::Ready(3);
        let json = serde_json::to_value(&ready).unwrap();
        assert_eq!(json["status"], "ready");
        assert_eq!(json["data"], 3);

        let failed: Section<u32> = Section::Failed(PipelineError::missing_column("Close", "needed"));
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert!(json["data"].as_str().unwrap().contains("Close"));

        let none: Section<u32> = Section::NoData;
        assert_eq!(serde_json::to_value(&none).unwrap()["status"], "no_data");
    }
}
