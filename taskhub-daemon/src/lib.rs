//! Background sync daemon: scheduler + config watcher + sync processor +
//! socket server.

mod error;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use protocol::{call, ControlReply, ControlRequest};
pub use runtime::{
    init_tracing, run, start_blocking, ContainerStatus, SyncSummary, TaskSummary,
};
