//! Sink selected at startup

use contracts::{CosimError, MeasurementSink, SensorMeasurement, VehicleActor};

use super::{FileSink, LogSink, RecorderStats};

/// File output, or logging only for dry runs
pub enum OutputSink {
    File(FileSink),
    Log(LogSink),
}

impl OutputSink {
    pub fn stats(&self) -> RecorderStats {
        match self {
            Self::File(sink) => sink.stats(),
            Self::Log(sink) => sink.stats(),
        }
    }
}

impl MeasurementSink for OutputSink {
    fn name(&self) -> &str {
        match self {
            Self::File(sink) => sink.name(),
            Self::Log(sink) => sink.name(),
        }
    }

    async fn write_actors(&mut self, frame: u64, actors: &[VehicleActor]) -> Result<(), CosimError> {
        match self {
            Self::File(sink) => sink.write_actors(frame, actors).await,
            Self::Log(sink) => sink.write_actors(frame, actors).await,
        }
    }

    async fn write_measurement(&mut self, measurement: &SensorMeasurement) -> Result<(), CosimError> {
        match self {
            Self::File(sink) => sink.write_measurement(measurement).await,
            Self::Log(sink) => sink.write_measurement(measurement).await,
        }
    }

    async fn flush(&mut self) -> Result<(), CosimError> {
        match self {
            Self::File(sink) => sink.flush().await,
            Self::Log(sink) => sink.flush().await,
        }
    }

    async fn close(&mut self) -> Result<(), CosimError> {
        match self {
            Self::File(sink) => sink.close().await,
            Self::Log(sink) => sink.close().await,
        }
    }
}
