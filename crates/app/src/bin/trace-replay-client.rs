//! Trace Replay Client - Main Entry Point

use app::{config_path_from_args, init_logging, load_config, run_client};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config(config_path_from_args())?;
    init_logging(&config.log_level)?;

    info!("=== Trace Replay Client v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Connecting to {}", config.client.server_addr);

    let library = run_client(&config).await?;
    match library {
        Some(library) => info!("Done, {} segments known", library.len()),
        None => info!("Done, no segments recorded"),
    }

    Ok(())
}
