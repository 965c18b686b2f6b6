//! LogSink - logs output summaries via tracing

use contracts::{CosimError, MeasurementSink, SensorMeasurement, VehicleActor};
use tracing::{debug, info, instrument};

use super::RecorderStats;

/// Sink that only logs, for dry runs
pub struct LogSink {
    name: String,
    stats: RecorderStats,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stats: RecorderStats::default(),
        }
    }

    pub fn stats(&self) -> RecorderStats {
        self.stats
    }
}

impl MeasurementSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write_actors(&mut self, frame: u64, actors: &[VehicleActor]) -> Result<(), CosimError> {
        debug!(sink = %self.name, frame, vehicles = actors.len(), "Actor rows");
        self.stats.actor_rows += actors.len() as u64;
        Ok(())
    }

    async fn write_measurement(&mut self, measurement: &SensorMeasurement) -> Result<(), CosimError> {
        if measurement.payload.is_blank() {
            self.stats.blank_skipped += 1;
            return Ok(());
        }
        debug!(
            sink = %self.name,
            frame = measurement.frame,
            agent = measurement.agent,
            channel = %measurement.channel,
            "Measurement received"
        );
        self.stats.payloads_written += 1;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), CosimError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), CosimError> {
        info!(
            sink = %self.name,
            rows = self.stats.actor_rows,
            payloads = self.stats.payloads_written,
            "LogSink closed"
        );
        Ok(())
    }
}
