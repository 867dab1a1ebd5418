//! Plate Scanner API Server
//!
//! REST surface over the scanning pipeline: scan lifecycle, status and
//! attempt history, manual lookups, evidence capture and Prometheus metrics.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use camera_capture::{CameraState, DirectoryDevice};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use plate_detector::Tier;
use scan_pipeline::Scanner;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_governor::GovernorLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vehicle_registry::HttpRegistryClient;

pub mod error;
pub mod rate_limit;
pub mod routes;
pub mod settings;

pub use settings::{ServerSettings, Settings};

/// Application state shared across handlers
pub struct AppState {
    pub scanner: Arc<Scanner>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
    /// Prometheus renderer, when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(scanner: Arc<Scanner>, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            scanner,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
            metrics,
        }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub camera: CameraState,
    pub scanning: bool,
    pub active_tier: Option<Tier>,
}

/// Create the application router.
///
/// `lookup_limit` rate-limits the manual lookup route per client IP; it
/// needs the server to provide `ConnectInfo<SocketAddr>`.
pub fn create_router(
    state: Arc<AppState>,
    lookup_limit: Option<Arc<rate_limit::LookupGovernorConfig>>,
) -> Router {
    let mut lookup = Router::new().route("/api/v1/lookup", post(routes::lookup::lookup));
    if let Some(config) = lookup_limit {
        lookup = lookup.layer(GovernorLayer { config });
    }

    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/scan/start", post(routes::scan::start))
        .route("/api/v1/scan/stop", post(routes::scan::stop))
        .route("/api/v1/scan/pause", post(routes::scan::pause))
        .route("/api/v1/scan/status", get(routes::scan::status))
        .route("/api/v1/scan/attempts", get(routes::scan::attempts))
        .route("/api/v1/scan/permission", post(routes::scan::request_permission))
        .route("/api/v1/evidence", post(routes::evidence::capture))
        .route("/metrics", get(metrics_handler))
        .merge(lookup)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let status = state.scanner.status().await;

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        camera: status.state.camera,
        scanning: status.state.is_scanning(),
        active_tier: status.detection.active_tier,
    })
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed".to_string()),
    }
}

/// Initialize logging; `RUST_LOG` overrides the configured level
pub fn init_logging(settings: &ServerSettings) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let installed = if settings.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}

/// Build the scanner from settings
pub fn build_scanner(settings: &Settings) -> anyhow::Result<Scanner> {
    let device = Arc::new(DirectoryDevice::new(&settings.camera.device));
    let registry = Arc::new(HttpRegistryClient::new(&settings.registry)?);

    Ok(Scanner::new(
        device,
        settings.camera.clone(),
        settings.scanner.clone(),
        Arc::new(settings.detector.clone()),
        registry.clone(),
    )
    .with_submitter(registry))
}

/// Run the server until Ctrl-C
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| warn!("Prometheus recorder not installed: {}", e))
        .ok();

    let scanner = Arc::new(build_scanner(&settings)?);
    let state = Arc::new(AppState::new(scanner.clone(), metrics));

    let lookup_limit = rate_limit::create_governor_config(&settings.server.lookup_rate_limit);
    if lookup_limit.is_none() {
        warn!("Lookup rate limit disabled: invalid quota {:?}", settings.server.lookup_rate_limit);
    }
    let app = create_router(state, lookup_limit);

    info!("Starting API server on {}", settings.server.addr);
    let listener = tokio::net::TcpListener::bind(&settings.server.addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    info!("Shutting down, releasing camera");
    scanner.stop_scan().await;
    Ok(())
}
