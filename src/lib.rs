// Stock Dashboard - Core Library
// Exposes the normalizer pipeline for use in the CLI, TUI, API server, and tests

pub mod error;
pub mod record;
pub mod normalizer;
pub mod series;
pub mod source;
pub mod pipeline;
pub mod config;
pub mod render;

// Re-export commonly used types
pub use error::PipelineError;
pub use record::{CellValue, PriceColumn, Record, DATE_COLUMN};
pub use normalizer::{
    aggregate_monthly, normalize, parse_and_sort, parse_timestamp,
    DroppedRow, HeatmapRow, HeatmapTable, NormalizationReport, PriceRow, PriceTable,
    DATE_FORMAT, DATE_FORMAT_HINT, MONTH_LABELS,
};
pub use series::{
    available_columns, default_selection, melt, parse_selection, resolve_selection, summarize,
    RangePreset, SeriesPoint, SeriesSummary,
};
pub use source::{
    detect_source, open_source, CsvFileSource, JsonFileSource, MemorySource, RowSource, SourceKind,
};
pub use pipeline::{build_dashboard, run, Dashboard, Section};
pub use config::DashboardConfig;
pub use render::{
    fix_hint, ChartView, DashboardView, HeatmapView, JsonPresenter, Presenter, TextPresenter,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the fmt subscriber on stderr.
///
/// `RUST_LOG` wins; otherwise `fallback` (e.g. "info") is used.
pub fn init_logging(fallback: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    // try_init: a second call (tests, embedding) is not an error
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
