//! Timed Trace Replay over TCP
//!
//! Merges a CAN trace and a GPS trace into one time-ordered stream and
//! delivers it to TCP clients at the original offsets.

mod error;
mod scheduler;
mod server;

pub use error::ReplayError;
pub use scheduler::{MergedStream, Pacer, ReplayEvent};
pub use server::{run_session, ReplayConfig, ReplayServer, SessionReport, ShutdownHandle};
