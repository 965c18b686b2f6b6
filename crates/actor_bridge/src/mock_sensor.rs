//! Mock sensor implementation
//!
//! Implements `SensorSource`. The mock vehicle simulator fires one measurement
//! per listening sensor on every step; delivery happens on a dedicated thread,
//! like engine callbacks of a real simulator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use contracts::{SensorChannel, SensorDataCallback, SensorMeasurement, SensorSource, VehicleActorId};
use tracing::{debug, trace};

use crate::lock;

/// Mock sensor
///
/// Cheap to clone; clones share the same stream.
#[derive(Clone)]
pub struct MockSensor {
    actor_id: VehicleActorId,
    channel: SensorChannel,
    listening: Arc<AtomicBool>,
    pulses: Arc<Mutex<Option<async_channel::Sender<SensorMeasurement>>>>,
}

impl MockSensor {
    pub fn new(actor_id: VehicleActorId, channel: SensorChannel) -> Self {
        Self {
            actor_id,
            channel,
            listening: Arc::new(AtomicBool::new(false)),
            pulses: Arc::new(Mutex::new(None)),
        }
    }

    /// Hand a measurement to the delivery thread. Dropped when not listening.
    pub fn fire(&self, measurement: SensorMeasurement) -> bool {
        if !self.listening.load(Ordering::SeqCst) {
            return false;
        }
        match lock(&self.pulses).as_ref() {
            Some(tx) => tx.try_send(measurement).is_ok(),
            None => false,
        }
    }
}

impl SensorSource for MockSensor {
    fn actor_id(&self) -> VehicleActorId {
        self.actor_id
    }

    fn channel(&self) -> SensorChannel {
        self.channel
    }

    fn listen(&self, callback: SensorDataCallback) {
        // Idempotent: if already listening, don't start again
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }

        let (tx, rx) = async_channel::unbounded::<SensorMeasurement>();
        *lock(&self.pulses) = Some(tx);

        let actor_id = self.actor_id;
        let channel = self.channel;
        thread::spawn(move || {
            debug!(actor_id, channel = %channel, "mock sensor started");
            // Pulses queued before stop() are still delivered, like a real
            // engine callback racing the stop request.
            while let Ok(measurement) = rx.recv_blocking() {
                trace!(actor_id, frame = measurement.frame, "mock measurement delivered");
                callback(measurement);
            }
            debug!(actor_id, channel = %channel, "mock sensor stopped");
        });
    }

    fn stop(&self) {
        self.listening.store(false, Ordering::SeqCst);
        lock(&self.pulses).take();
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }
}
