//! Client Ingestion Pipeline
//!
//! Receives the replay stream, keeps a live sensor snapshot, and feeds the
//! segment classifier, geometry aggregator and curve warning assist.

mod error;
mod pipeline;
mod sink;
mod state;

pub use error::IngestError;
pub use pipeline::{
    process_loop, receive_loop, run_pipeline, run_session, PipelineConfig, PipelineStats,
    RunReport, SessionProcessor, StatsSnapshot,
};
pub use sink::{SessionSink, TracingSink};
pub use state::LiveSensorState;
