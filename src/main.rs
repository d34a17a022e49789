// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

use stock_dashboard::{
    init_logging, open_source, parse_selection, run, DashboardConfig, JsonPresenter, Presenter,
    RangePreset, TextPresenter,
};

#[derive(Parser)]
#[command(name = "stock-dashboard")]
#[command(about = "Stock price table, time series and monthly heatmap from a sheet export", long_about = None)]
struct Cli {
    /// JSON config file (defaults are used when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// CSV or JSON export of the sheet (overrides config / DASHBOARD_SOURCE)
    #[arg(short, long, global = true)]
    source: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the data preview, series summary and heatmap
    Show {
        /// Price columns to plot, e.g. "Close,Open"
        #[arg(long)]
        series: Option<String>,

        /// Date range: 1m, 6m, ytd, 1y, all
        #[arg(long)]
        range: Option<RangePreset>,

        /// Rows in the data preview
        #[arg(long)]
        preview: Option<usize>,
    },

    /// Print the dashboard as JSON
    Json {
        #[arg(long)]
        series: Option<String>,

        #[arg(long)]
        range: Option<RangePreset>,
    },

    /// Validate the source and list dropped rows
    Check,

    /// Interactive terminal dashboard
    Tui,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = DashboardConfig::load(cli.config.as_deref())?;
    if let Some(source) = cli.source {
        config.source = source;
    }

    init_logging(&config.log_filter);
    info!(source = %config.source.display(), "startup");

    match cli.command.unwrap_or(Commands::Show {
        series: None,
        range: None,
        preview: None,
    }) {
        Commands::Show { series, range, preview } => {
            apply_overrides(&mut config, series, range)?;
            if let Some(rows) = preview {
                config.preview_rows = rows;
            }
            let presenter = TextPresenter::from_config(&config)?;
            render(&config, &presenter)
        }
        Commands::Json { series, range } => {
            apply_overrides(&mut config, series, range)?;
            let presenter = JsonPresenter::from_config(&config)?;
            render(&config, &presenter)
        }
        Commands::Check => run_check(&config),
        Commands::Tui => run_ui_mode(config),
    }
}

fn apply_overrides(
    config: &mut DashboardConfig,
    series: Option<String>,
    range: Option<RangePreset>,
) -> Result<()> {
    if let Some(series) = series {
        parse_selection(&series)?;
        config.series = Some(series);
    }
    if let Some(range) = range {
        config.range = range;
    }
    Ok(())
}

/// One pipeline run, shown through `presenter`. Schema failures are shown,
/// not propagated, and turn into exit code 2.
fn render(config: &DashboardConfig, presenter: &dyn Presenter) -> Result<ExitCode> {
    let source = open_source(&config.source)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match run(source.as_ref())? {
        Ok(dashboard) => {
            presenter.present(&dashboard, &mut out)?;
            out.flush()?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            presenter.present_failure(&err, &mut out)?;
            out.flush()?;
            Ok(ExitCode::from(2))
        }
    }
}

fn run_check(config: &DashboardConfig) -> Result<ExitCode> {
    let source = open_source(&config.source)?;

    let dashboard = match run(source.as_ref())? {
        Ok(dashboard) => dashboard,
        Err(err) => {
            eprintln!("❌ {}", err);
            eprintln!("   {}", stock_dashboard::fix_hint(&err));
            return Ok(ExitCode::from(2));
        }
    };

    println!("📂 {}", source.describe());
    println!("✓ {}", dashboard.report.summary());
    for dropped in &dashboard.report.dropped {
        println!(
            "   row {}: {} '{}' ({})",
            dropped.index + 1,
            dropped.column,
            dropped.raw,
            dropped.reason
        );
    }
    println!("✓ prices: {}", dashboard.prices.status());
    println!("✓ heatmap: {}", dashboard.heatmap.status());
    if let stock_dashboard::Section::Failed(err) = &dashboard.heatmap {
        println!("   {}", err);
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: DashboardConfig) -> Result<ExitCode> {
    let source = open_source(&config.source)?;
    let mut app = ui::App::new(source, &config)?;
    ui::run_ui(&mut app)?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: DashboardConfig) -> Result<ExitCode> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the web dashboard: cargo run --bin dashboard-server --features server");
    Ok(ExitCode::FAILURE)
}
