//! Trace Replay Server - Main Entry Point

use app::{build_server, config_path_from_args, init_logging, load_config};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config(config_path_from_args())?;
    init_logging(&config.log_level)?;

    info!("=== Trace Replay Server v{} ===", env!("CARGO_PKG_VERSION"));

    let server = build_server(&config)?;
    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                shutdown.stop();
            }
            Err(e) => warn!("Unable to listen for interrupt: {}", e),
        }
    });

    server.serve().await?;
    Ok(())
}
