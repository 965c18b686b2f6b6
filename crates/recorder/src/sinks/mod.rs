//! Measurement sink implementations

mod file;
mod log;
mod output;

pub use file::{FileSink, RecorderStats};
pub use log::LogSink;
pub use output::OutputSink;
