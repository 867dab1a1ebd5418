//! Plate Scanner - Main Entry Point
//!
//! Usage: `plate-scanner [settings-file]`

use api::{init_logging, run_server, Settings};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1);
    let settings = Settings::load(path.as_deref())?;
    init_logging(&settings.server)?;

    info!("=== Plate Scanner v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        device = %settings.camera.device,
        registry = %settings.registry.base_url,
        tick_ms = settings.scanner.tick_interval_ms,
        "Starting plate scanning service..."
    );

    run_server(settings).await
}
