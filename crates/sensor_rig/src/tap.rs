//! Callback side of one mounted sensor

use std::sync::{Arc, RwLock};

use async_channel::Sender;
use contracts::{SensorChannel, SensorDataCallback, SensorMeasurement, VehicleActorId};
use metrics::counter;
use tracing::trace;

use crate::metrics::RigMetrics;

/// Everything a sensor callback needs, captured once at attach time.
///
/// The gate is shared by all sensors of one agent. Callbacks only take a
/// non-blocking read; detach takes the write side to close it.
#[derive(Clone)]
pub struct RiderTap {
    pub channel: SensorChannel,
    pub agent: VehicleActorId,
    sender: Sender<SensorMeasurement>,
    gate: Arc<RwLock<bool>>,
    metrics: Arc<RigMetrics>,
}

impl RiderTap {
    pub fn new(
        channel: SensorChannel,
        agent: VehicleActorId,
        sender: Sender<SensorMeasurement>,
        gate: Arc<RwLock<bool>>,
        metrics: Arc<RigMetrics>,
    ) -> Self {
        Self {
            channel,
            agent,
            sender,
            gate,
            metrics,
        }
    }

    /// Enqueue one measurement if the gate is open. Never blocks.
    ///
    /// The read guard is held until the send completes, so once detach holds
    /// the write side no further entry can land in the queue.
    pub fn deliver(&self, mut measurement: SensorMeasurement) -> bool {
        // being closed, or poisoned
        let Ok(open) = self.gate.try_read() else {
            return self.drop_late();
        };
        if !*open {
            return self.drop_late();
        }

        measurement.channel = self.channel;
        measurement.agent = self.agent;
        let frame = measurement.frame;
        let sent = self.sender.try_send(measurement).is_ok();
        drop(open);

        if !sent {
            self.metrics.record_dropped();
            return false;
        }
        self.metrics.record_received();
        counter!("cosim_sensor_payloads_total", "channel" => self.channel.dir_name()).increment(1);
        trace!(agent = self.agent, channel = %self.channel, frame, "measurement queued");
        true
    }

    fn drop_late(&self) -> bool {
        self.metrics.record_dropped();
        trace!(agent = self.agent, channel = %self.channel, "measurement after detach dropped");
        false
    }

    pub fn into_callback(self) -> SensorDataCallback {
        Arc::new(move |measurement| {
            self.deliver(measurement);
        })
    }
}
