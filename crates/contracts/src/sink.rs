//! MeasurementSink trait - output side of the synchronization loop

use crate::{CosimError, SensorMeasurement, VehicleActor};

/// Per-run output.
///
/// Receives the actor rows of every tick and every drained sensor measurement.
#[trait_variant::make(MeasurementSink: Send)]
pub trait LocalMeasurementSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Append one row per live vehicle for `frame`
    async fn write_actors(&mut self, frame: u64, actors: &[VehicleActor]) -> Result<(), CosimError>;

    /// Write one sensor payload and its sidecar metadata
    async fn write_measurement(&mut self, measurement: &SensorMeasurement) -> Result<(), CosimError>;

    async fn flush(&mut self) -> Result<(), CosimError>;

    async fn close(&mut self) -> Result<(), CosimError>;
}
