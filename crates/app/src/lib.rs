//! Trace Replay Application
//!
//! Configuration loading, logging setup, and the top-level server and
//! client flows shared by the binaries.

use anyhow::Context;
use curve_warning::{CurveWarningAssist, WarningConfig};
use ingest::{run_session, PipelineConfig, SessionProcessor, TracingSink};
use replay_engine::{ReplayConfig, ReplayServer};
use segmentation::{ClassifierConfig, SegmentLibrary};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Default configuration file, used when no path is given
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Environment variable prefix (`CURVESIM_SERVER__BIND_ADDR=...`)
pub const ENV_PREFIX: &str = "CURVESIM";

/// Trace file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceFiles {
    pub can: PathBuf,
    pub gps: PathBuf,
}

impl Default for TraceFiles {
    fn default() -> Self {
        Self {
            can: PathBuf::from("data/can_trace.trc"),
            gps: PathBuf::from("data/gps_trace.csv"),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ReplayConfig,
    pub client: PipelineConfig,
    pub classifier: ClassifierConfig,
    pub warning: WarningConfig,
    pub traces: TraceFiles,
    /// Where the recorded segment library is saved and reloaded
    pub library_path: Option<PathBuf>,
    /// Client sessions per invocation; the first records when no library exists
    pub runs: usize,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ReplayConfig::default(),
            client: PipelineConfig::default(),
            classifier: ClassifierConfig::default(),
            warning: WarningConfig::default(),
            traces: TraceFiles::default(),
            library_path: None,
            runs: 2,
            log_level: "info".to_string(),
        }
    }
}

/// Load configuration from an optional TOML file overlaid with environment variables
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, config::ConfigError> {
    config::Config::builder()
        .add_source(config::File::from(path.as_ref()).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}

/// Configuration path from the first command-line argument
pub fn config_path_from_args() -> PathBuf {
    std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Initialize logging
pub fn init_logging(level: &str) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}

/// Load both traces and build a replay server
pub fn build_server(config: &AppConfig) -> anyhow::Result<ReplayServer> {
    let (can, can_report) = trace_store::load_can_trace(&config.traces.can)?;
    let (gps, gps_report) = trace_store::load_gps_trace(&config.traces.gps)?;
    if can_report.errors > 0 || gps_report.errors > 0 {
        warn!(
            "Trace lines skipped with errors: {} CAN, {} GPS",
            can_report.errors, gps_report.errors
        );
    }

    let server = ReplayServer::new(config.server.clone(), can, gps)?;
    Ok(server)
}

/// Run the configured number of client sessions.
///
/// Without a saved library the first session records segments; every later
/// session runs with curve warnings from that recording.
pub async fn run_client(config: &AppConfig) -> anyhow::Result<Option<Arc<SegmentLibrary>>> {
    let mut library = match &config.library_path {
        Some(path) if path.exists() => Some(Arc::new(
            SegmentLibrary::load(path).with_context(|| format!("loading {}", path.display()))?,
        )),
        _ => None,
    };

    for run in 1..=config.runs.max(1) {
        let mut processor =
            SessionProcessor::new(config.classifier.clone()).with_sink(TracingSink::new());

        match &library {
            Some(recorded) => {
                info!("Run {}: curve warnings from {} segments", run, recorded.len());
                processor = processor.with_assist(CurveWarningAssist::new(
                    config.warning.clone(),
                    Arc::clone(recorded),
                ));
            }
            None => info!("Run {}: recording segments", run),
        }

        let report = run_session(&config.client, &mut processor).await?;
        if !report.completed {
            warn!("Run {} ended before the simulation completed", run);
        }

        if library.is_none() {
            let recorded = processor.into_library();
            if recorded.is_empty() {
                warn!("No segments recorded in run {}", run);
                continue;
            }

            let summary = recorded.summary();
            info!(
                "Recorded {} segments ({} straight, {} curve)",
                recorded.len(),
                summary.straights,
                summary.curves
            );
            if let Some(path) = &config.library_path {
                recorded.save(path)?;
            }
            library = Some(Arc::new(recorded));
        }
    }

    Ok(library)
}
