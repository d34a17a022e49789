// Stock Dashboard - Web Server
// REST API with Axum; every request re-runs the pipeline against the source

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info};

use stock_dashboard::{
    fix_hint, init_logging, open_source, parse_selection, run, ChartView, Dashboard,
    DashboardConfig, HeatmapView, PipelineError, RangePreset, RowSource,
};

#[derive(Parser)]
#[command(name = "dashboard-server")]
#[command(about = "HTTP API and web page for the stock dashboard", long_about = None)]
struct Args {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// CSV or JSON export of the sheet
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Listen address, e.g. 127.0.0.1:8080
    #[arg(short, long)]
    bind: Option<String>,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    config: Arc<DashboardConfig>,
    source: Arc<dyn RowSource>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
            hint: None,
        }
    }
}

impl ApiResponse<()> {
    fn failure(message: String, hint: Option<String>) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message),
            hint,
        }
    }
}

fn error_response(status: StatusCode, message: String, hint: Option<String>) -> Response {
    (status, Json(ApiResponse::failure(message, hint))).into_response()
}

fn pipeline_error_response(status: StatusCode, err: &PipelineError) -> Response {
    error_response(status, err.to_string(), Some(fix_hint(err)))
}

/// Query for GET /api/prices
#[derive(Debug, Default, Deserialize)]
struct PricesQuery {
    /// Comma separated price columns
    series: Option<String>,
    /// 1m, 6m, ytd, 1y, all
    range: Option<String>,
}

/// Fetch + normalize + aggregate off the async runtime
async fn load_dashboard(state: &AppState) -> Result<Dashboard, Response> {
    let source = Arc::clone(&state.source);

    let outcome = tokio::task::spawn_blocking(move || run(source.as_ref()))
        .await
        .map_err(|e| {
            error!(error = %e, "pipeline task panicked");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Pipeline task failed".to_string(), None)
        })?;

    match outcome {
        Ok(Ok(dashboard)) => Ok(dashboard),
        Ok(Err(err)) => Err(pipeline_error_response(StatusCode::UNPROCESSABLE_ENTITY, &err)),
        Err(e) => {
            error!(error = %e, "source failed");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error loading data: {:#}", e),
                None,
            ))
        }
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/prices - Melted series for the chart
async fn get_prices(State(state): State<AppState>, Query(query): Query<PricesQuery>) -> Response {
    let requested = match query.series.as_deref().or(state.config.series.as_deref()) {
        Some(text) => match parse_selection(text) {
            Ok(columns) => Some(columns),
            Err(err) => return pipeline_error_response(StatusCode::BAD_REQUEST, &err),
        },
        None => None,
    };

    let range = match query.range.as_deref() {
        Some(text) => match text.parse::<RangePreset>() {
            Ok(range) => range,
            Err(err) => return pipeline_error_response(StatusCode::BAD_REQUEST, &err),
        },
        None => state.config.range,
    };

    let dashboard = match load_dashboard(&state).await {
        Ok(d) => d,
        Err(response) => return response,
    };

    let chart = dashboard
        .prices
        .map(|table| ChartView::build(table, requested.as_deref(), range));

    (StatusCode::OK, Json(ApiResponse::ok(chart))).into_response()
}

/// GET /api/table - Sorted price table
async fn get_table(State(state): State<AppState>) -> Response {
    match load_dashboard(&state).await {
        Ok(dashboard) => (StatusCode::OK, Json(ApiResponse::ok(dashboard.prices))).into_response(),
        Err(response) => response,
    }
}

/// GET /api/heatmap - Average Close by year and month
async fn get_heatmap(State(state): State<AppState>) -> Response {
    match load_dashboard(&state).await {
        Ok(dashboard) => {
            let view = dashboard.heatmap.map(|h| HeatmapView::from(h));
            (StatusCode::OK, Json(ApiResponse::ok(view))).into_response()
        }
        Err(response) => response,
    }
}

/// GET /api/report - Row counts and dropped rows
async fn get_report(State(state): State<AppState>) -> Response {
    match load_dashboard(&state).await {
        Ok(dashboard) => (StatusCode::OK, Json(ApiResponse::ok(dashboard.report))).into_response(),
        Err(response) => response,
    }
}

/// GET / - Serve index.html
async fn serve_index() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/prices", get(get_prices))
        .route("/table", get(get_table))
        .route("/heatmap", get(get_heatmap))
        .route("/report", get(get_report))
        .with_state(state);

    Router::new()
        .route("/", get(serve_index))
        .nest("/api", api_routes)
        .nest_service("/static", ServeDir::new("web"))
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = DashboardConfig::load(args.config.as_deref())?;
    if let Some(source) = args.source {
        config.source = source;
    }
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    init_logging(&config.log_filter);

    println!("🌐 Stock Dashboard - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let source: Arc<dyn RowSource> = Arc::from(open_source(&config.source)?);
    println!("✓ Source: {}", source.describe());

    let bind = config.bind.clone();
    let state = AppState {
        config: Arc::new(config),
        source,
    };

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(addr = %bind, "listening");

    println!("\n🚀 Server running on http://{}", bind);
    println!("   API: http://{}/api/prices", bind);
    println!("   UI:  http://{}", bind);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;
    use stock_dashboard::{MemorySource, Record};

    fn state_with(records: Vec<Record>) -> State<AppState> {
        State(AppState {
            config: Arc::new(DashboardConfig::default()),
            source: Arc::new(MemorySource::new(records)),
        })
    }

    fn priced(date: &str, close: &str) -> Record {
        Record::new().with("Date", date).with("Close", close)
    }

    fn query(series: Option<&str>, range: Option<&str>) -> Query<PricesQuery> {
        Query(PricesQuery {
            series: series.map(str::to_string),
            range: range.map(str::to_string),
        })
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_prices_ready() {
        let state = state_with(vec![
            priced("02/01/2023 09:00:00", "10"),
            priced("01/01/2023 09:00:00", "20"),
        ]);
        let response = get_prices(state, query(None, None)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "ready");
        assert_eq!(body["data"]["data"]["selected"][0], "Close");
        assert_eq!(body["data"]["data"]["points"][0]["value"], 20.0);
    }

    #[tokio::test]
    async fn test_missing_date_is_unprocessable() {
        let records = vec![Record::new().with("Close", "1")];

        let response = get_table(state_with(records.clone())).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("'Date'"));
        assert!(body["hint"].as_str().unwrap().contains("DD/MM/YYYY HH:MM:SS"));

        let response = get_prices(state_with(records.clone()), query(None, None)).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = get_heatmap(state_with(records)).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_bad_query_is_bad_request() {
        let records = vec![priced("01/01/2023 09:00:00", "1")];

        let response = get_prices(state_with(records.clone()), query(None, Some("2w"))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].as_str().unwrap().contains("2w"));

        let response = get_prices(state_with(records.clone()), query(None, Some(""))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = get_prices(state_with(records), query(Some("Close,Volume"), None)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_all_dates_bad_is_no_data() {
        let records = vec![priced("not-a-date", "1"), priced("2023-01-01", "2")];

        for response in [
            get_table(state_with(records.clone())).await,
            get_heatmap(state_with(records.clone())).await,
            get_prices(state_with(records.clone()), query(None, None)).await,
        ] {
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            assert_eq!(body["success"], true);
            assert_eq!(body["data"]["status"], "no_data");
        }

        let body = body_json(get_report(state_with(records)).await).await;
        assert_eq!(body["data"]["input_rows"], 2);
        assert_eq!(body["data"]["kept_rows"], 0);
    }

    #[tokio::test]
    async fn test_missing_close_fails_heatmap_only() {
        let records = vec![Record::new().with("Date", "01/01/2023 09:00:00").with("Open", "3")];

        let response = get_heatmap(state_with(records.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["status"], "failed");
        assert!(body["data"]["data"].as_str().unwrap().contains("'Close'"));

        let body = body_json(get_table(state_with(records)).await).await;
        assert_eq!(body["data"]["status"], "ready");
    }
}
