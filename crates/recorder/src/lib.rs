//! # Recorder
//!
//! Output side of a co-simulation run.
//!
//! Responsibilities:
//! - `info.csv` actor log, one row per vehicle per tick
//! - Sensor payload files (PNG / binary PLY) with a JSON sidecar each
//! - Run manifest on close

pub mod encode;
pub mod palette;
pub mod sinks;

pub use contracts::{MeasurementSink, SensorMeasurement};
pub use sinks::{FileSink, LogSink, OutputSink, RecorderStats};
