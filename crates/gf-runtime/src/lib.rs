#[macro_use]
mod log_macros;

pub mod command_log;
pub mod dispatch;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod queue;
pub mod state;
pub mod sweeper;
pub mod tracing_init;
pub mod transport;

pub use command_log::{CommandLog, FileCommandLog, NullCommandLog};
pub use dispatch::{Dispatch, DispatchResponse, DispatchResult, OutputMode};
pub use error::{RuntimeError, RuntimeReason, RuntimeResult};
pub use queue::{DurableQueue, QueueEntry};
pub use state::GfServer;
pub use transport::{HttpTransport, LocalTransport, LogTransport, Transport, TransportRegistry};
