//! OBD-II Dashboard - Main Entry Point

use anyhow::Context;
use api::{init_logging, run_server, Settings};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("invalid OBD_DASH_* configuration")?;
    init_logging(&settings);

    info!("=== OBD-II Dashboard v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        device = %settings.device,
        mock = settings.mock,
        selection = %settings.selection_path().display(),
        "Starting"
    );

    run_server(settings).await
}
