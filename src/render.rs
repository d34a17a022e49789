// 🖨️ Presentation Layer
// Turns a Dashboard into something a person (or another program) reads.
// Presenters never see raw records, only the pipeline output.

use crate::config::DashboardConfig;
use crate::error::PipelineError;
use crate::normalizer::{
    HeatmapTable, NormalizationReport, PriceTable, DATE_FORMAT, DATE_FORMAT_HINT,
};
use crate::pipeline::{Dashboard, Section};
use crate::record::PriceColumn;
use crate::series::{
    available_columns, melt, resolve_selection, summarize, RangePreset, SeriesPoint, SeriesSummary,
};
use anyhow::Result;
use serde::Serialize;
use std::io::Write;

/// Presenter - the narrow interface to whatever displays the dashboard
pub trait Presenter {
    fn present(&self, dashboard: &Dashboard, out: &mut dyn Write) -> Result<()>;

    /// Shown instead of the dashboard when the run itself failed
    fn present_failure(&self, error: &PipelineError, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "Error loading or parsing data: {}", error)?;
        writeln!(out, "{}", fix_hint(error))?;
        Ok(())
    }
}

/// What to tell the user so they can fix the source data
pub fn fix_hint(error: &PipelineError) -> String {
    match error.missing() {
        Some("Date") => format!(
            "Please ensure the sheet has a 'Date' column formatted {} and try again.",
            DATE_FORMAT_HINT
        ),
        Some(column) => format!("Please add a numeric '{}' column to the sheet.", column),
        None => "Please check the requested options.".to_string(),
    }
}

// ============================================================================
// VIEW MODELS (shared by JSON output and the HTTP server)
// ============================================================================

/// Heatmap as a grid: `values[i][j]` = year `years[i]`, month `months[j]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapView {
    pub years: Vec<String>,
    pub months: Vec<&'static str>,
    pub values: Vec<Vec<Option<f64>>>,
    pub excluded_rows: usize,
}

impl From<&HeatmapTable> for HeatmapView {
    fn from(table: &HeatmapTable) -> Self {
        HeatmapView {
            years: table.rows.iter().map(|r| r.label()).collect(),
            months: table.months().to_vec(),
            values: table.rows.iter().map(|r| r.cells.to_vec()).collect(),
            excluded_rows: table.excluded_rows,
        }
    }
}

/// Time chart data: selected series, melted, within the range
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartView {
    pub available: Vec<PriceColumn>,
    pub selected: Vec<PriceColumn>,
    pub range: RangePreset,
    pub points: Vec<SeriesPoint>,
    pub summary: Vec<SeriesSummary>,
}

impl ChartView {
    pub fn build(table: &PriceTable, requested: Option<&[PriceColumn]>, range: RangePreset) -> Self {
        let selected = resolve_selection(table, requested);
        let points = melt(range.window(table), &selected);
        let summary = summarize(&points, &selected);
        ChartView {
            available: available_columns(table),
            selected,
            range,
            points,
            summary,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView<'a> {
    pub title: &'a str,
    pub prices: Section<&'a PriceTable>,
    pub chart: Section<ChartView>,
    pub heatmap: Section<HeatmapView>,
    pub report: &'a NormalizationReport,
}

impl<'a> DashboardView<'a> {
    pub fn new(
        title: &'a str,
        dashboard: &'a Dashboard,
        requested: Option<&[PriceColumn]>,
        range: RangePreset,
    ) -> Self {
        DashboardView {
            title,
            prices: dashboard.prices.as_ref(),
            chart: dashboard
                .prices
                .map(|t| ChartView::build(t, requested, range)),
            heatmap: dashboard.heatmap.map(|h| HeatmapView::from(h)),
            report: &dashboard.report,
        }
    }
}

// ============================================================================
// TEXT PRESENTER
// ============================================================================

pub struct TextPresenter {
    pub title: String,
    pub selection: Option<Vec<PriceColumn>>,
    pub range: RangePreset,
    pub preview_rows: usize,
}

impl TextPresenter {
    pub fn from_config(config: &DashboardConfig) -> Result<Self> {
        Ok(TextPresenter {
            title: config.title.clone(),
            selection: config.selection()?,
            range: config.range,
            preview_rows: config.preview_rows,
        })
    }

    fn write_preview(&self, table: &PriceTable, out: &mut dyn Write) -> Result<()> {
        let shown = self.preview_rows.min(table.len());
        writeln!(out, "Raw Data Preview (first {} of {} rows)", shown, table.len())?;

        let extras = table.extra_columns();
        let mut header = format!("{:<20}", "Date");
        for column in &table.columns {
            header.push_str(&format!("{:>12}", column.name()));
        }
        for name in &extras {
            header.push_str(&format!("  {}", name));
        }
        writeln!(out, "{}", header.trim_end())?;

        for row in table.rows.iter().take(shown) {
            let mut line = format!("{:<20}", row.timestamp.format(DATE_FORMAT).to_string());
            for column in &table.columns {
                line.push_str(&format!("{:>12}", format_cell(row.price(*column))));
            }
            for name in &extras {
                let raw = row.extras.get(name).map(|v| v.to_string()).unwrap_or_default();
                line.push_str(&format!("  {}", raw));
            }
            writeln!(out, "{}", line.trim_end())?;
        }
        Ok(())
    }

    fn write_chart(&self, table: &PriceTable, out: &mut dyn Write) -> Result<()> {
        let chart = ChartView::build(table, self.selection.as_deref(), self.range);
        let names: Vec<&str> = chart.selected.iter().map(|c| c.name()).collect();
        writeln!(
            out,
            "Historical Stock Prices [{}] range: {}",
            names.join(", "),
            chart.range
        )?;

        if chart.summary.is_empty() {
            writeln!(out, "No data available to plot for the selected price types.")?;
            return Ok(());
        }

        for s in &chart.summary {
            let change = s
                .change_pct()
                .map(|p| format!("{:+.2}%", p))
                .unwrap_or_else(|| "n/a".to_string());
            writeln!(
                out,
                "{:<6} points={} first={:.2} last={:.2} min={:.2} max={:.2} change={}",
                s.price_type.name(),
                s.points,
                s.first,
                s.last,
                s.min,
                s.max,
                change
            )?;
        }
        Ok(())
    }

    fn write_heatmap(&self, heatmap: &HeatmapTable, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "Average Close Price Heatmap (Year vs. Month)")?;

        let mut header = format!("{:<6}", "Year");
        for month in heatmap.months() {
            header.push_str(&format!("{:>10}", month));
        }
        writeln!(out, "{}", header)?;

        for row in &heatmap.rows {
            let mut line = format!("{:<6}", row.label());
            for cell in &row.cells {
                line.push_str(&format!("{:>10}", format_cell(*cell)));
            }
            writeln!(out, "{}", line.trim_end())?;
        }

        if heatmap.excluded_rows > 0 {
            writeln!(out, "({} rows without a numeric Close left out)", heatmap.excluded_rows)?;
        }
        Ok(())
    }
}

/// Two decimals; empty cells stay blank (never printed as 0)
fn format_cell(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_default()
}

impl Presenter for TextPresenter {
    fn present(&self, dashboard: &Dashboard, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "{}", self.title)?;
        writeln!(out, "{}", "=".repeat(self.title.chars().count()))?;
        writeln!(out, "{}", dashboard.report.summary())?;
        writeln!(out)?;

        match &dashboard.prices {
            Section::Ready(table) => {
                self.write_preview(table, out)?;
                writeln!(out)?;
                self.write_chart(table, out)?;
            }
            Section::NoData => {
                writeln!(out, "No data available to plot. Please ensure your data is correctly loaded.")?
            }
            Section::Failed(err) => self.present_failure(err, out)?,
        }
        writeln!(out)?;

        match &dashboard.heatmap {
            Section::Ready(heatmap) => self.write_heatmap(heatmap, out)?,
            Section::NoData => writeln!(
                out,
                "No data available to plot the heatmap, or 'Close' column is missing/invalid."
            )?,
            Section::Failed(err) => {
                writeln!(out, "Cannot draw heatmap: {}", err)?;
                writeln!(out, "{}", fix_hint(err))?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// JSON PRESENTER
// ============================================================================

pub struct JsonPresenter {
    pub title: String,
    pub selection: Option<Vec<PriceColumn>>,
    pub range: RangePreset,
}

impl JsonPresenter {
    pub fn from_config(config: &DashboardConfig) -> Result<Self> {
        Ok(JsonPresenter {
            title: config.title.clone(),
            selection: config.selection()?,
            range: config.range,
        })
    }
}

impl Presenter for JsonPresenter {
    fn present(&self, dashboard: &Dashboard, out: &mut dyn Write) -> Result<()> {
        let view = DashboardView::new(&self.title, dashboard, self.selection.as_deref(), self.range);
        serde_json::to_writer_pretty(&mut *out, &view)?;
        writeln!(out)?;
        Ok(())
    }

    fn present_failure(&self, error: &PipelineError, out: &mut dyn Write) -> Result<()> {
        let body = serde_json::json!({
            "status": "failed",
            "error": error.to_string(),
            "hint": fix_hint(error),
        });
        serde_json::to_writer_pretty(&mut *out, &body)?;
        writeln!(out)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::build_dashboard;
    use crate::record::Record;

    fn text(presenter: &dyn Presenter, dashboard: &Dashboard) -> String {
        let mut buf = Vec::new();
        presenter.present(dashboard, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn presenter() -> TextPresenter {
        TextPresenter::from_config(&DashboardConfig::default()).unwrap()
    }

    fn sample() -> Dashboard {
        build_dashboard(&[
            Record::new()
                .with("Date", "03/01/2023 09:00:00")
                .with("Open", "9")
                .with("Close", "10")
                .with("Volume", "100"),
            Record::new()
                .with("Date", "20/01/2023 09:00:00")
                .with("Open", "19")
                .with("Close", "20")
                .with("Volume", "200"),
            Record::new().with("Date", "oops").with("Close", "1"),
        ])
        .unwrap()
    }

    #[test]
    fn test_text_contains_all_sections() {
        let out = text(&presenter(), &sample());

        assert!(out.starts_with("Stock Price Analysis\n"));
        assert!(out.contains("3 rows in, 2 kept, 1 dropped"));
        assert!(out.contains("Raw Data Preview (first 2 of 2 rows)"));
        assert!(out.contains("03/01/2023 09:00:00"));
        assert!(out.contains("Volume"));
        assert!(out.contains("Historical Stock Prices [Close] range: all"));
        assert!(out.contains("points=2 first=10.00 last=20.00"));
        assert!(out.contains("2023"));
        assert!(out.contains("15.00"));
    }

    #[test]
    fn test_heatmap_empty_cells_are_blank() {
        let out = text(&presenter(), &sample());
        let line = out.lines().find(|l| l.starts_with("2023")).unwrap();
        // Only January has data; the rest of the row is blank
        assert_eq!(line.trim_end(), format!("{:<6}{:>10}", "2023", "15.00"));
        assert!(!line.contains("0.00 "));
    }

    #[test]
    fn test_no_data_message() {
        let dashboard = build_dashboard(&[Record::new().with("Date", "nope").with("Close", "1")]).unwrap();
        let out = text(&presenter(), &dashboard);
        assert!(out.contains("No data available to plot."));
        assert!(out.contains("No data available to plot the heatmap"));
    }

    #[test]
    fn test_missing_close_message() {
        let dashboard = build_dashboard(&[Record::new()
            .with("Date", "01/01/2023 00:00:00")
            .with("Open", "1")])
        .unwrap();
        let out = text(&presenter(), &dashboard);
        assert!(out.contains("Historical Stock Prices [Open]"));
        assert!(out.contains("Cannot draw heatmap: missing column 'Close'"));
    }

    #[test]
    fn test_failure_names_expected_pattern() {
        let err = build_dashboard(&[Record::new().with("Close", "1")]).unwrap_err();
        let mut buf = Vec::new();
        presenter().present_failure(&err, &mut buf).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.contains("'Date'"));
        assert!(out.contains(DATE_FORMAT_HINT));
    }

    #[test]
    fn test_json_output_shape() {
        let presenter = JsonPresenter::from_config(&DashboardConfig::default()).unwrap();
        let out = text(&presenter, &sample());
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();

        assert_eq!(value["prices"]["status"], "ready");
        assert_eq!(value["heatmap"]["status"], "ready");
        assert_eq!(value["heatmap"]["data"]["years"][0], "2023");
        assert_eq!(value["heatmap"]["data"]["months"].as_array().unwrap().len(), 12);
        assert_eq!(value["heatmap"]["data"]["values"][0][0], 15.0);
        assert!(value["heatmap"]["data"]["values"][0][1].is_null());
        assert_eq!(value["chart"]["data"]["selected"][0], "Close");
        assert_eq!(value["chart"]["data"]["points"].as_array().unwrap().len(), 2);
        assert_eq!(value["report"]["dropped"][0]["raw"], "oops");
    }

    #[test]
    fn test_chart_view_respects_range_and_selection() {
        let dashboard = sample();
        let table = dashboard.prices.ready().unwrap();
        let chart = ChartView::build(
            table,
            Some(&[PriceColumn::Open, PriceColumn::Close][..]),
            RangePreset::OneMonth,
        );

        assert_eq!(chart.selected, vec![PriceColumn::Open, PriceColumn::Close]);
        assert_eq!(chart.available, vec![PriceColumn::Open, PriceColumn::Close]);
        // 20/12/2022 .. 20/01/2023 keeps both rows
        assert_eq!(chart.points.len(), 4);
    }
}
