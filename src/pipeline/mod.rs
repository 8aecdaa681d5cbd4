pub mod channel;
pub mod runner;

pub use channel::{create_channel, handoff_channel, Receiver, Sender};
pub use runner::{Pipeline, PipelineError, DEFAULT_SHUTDOWN_TIMEOUT};
