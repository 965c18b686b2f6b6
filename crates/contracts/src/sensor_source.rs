//! SensorSource trait - stream handle of one spawned sensor
//!
//! Mock and real engines hand out the same abstraction; the sensor rig only
//! ever talks to this trait.

use std::sync::Arc;

use crate::{SensorChannel, SensorMeasurement, VehicleActorId};

/// Measurement callback.
///
/// Invoked from engine threads, concurrently with the tick loop.
pub type SensorDataCallback = Arc<dyn Fn(SensorMeasurement) + Send + Sync>;

/// Stream side of a spawned sensor
pub trait SensorSource: Send + Sync {
    /// Sensor actor id
    fn actor_id(&self) -> VehicleActorId;

    fn channel(&self) -> SensorChannel;

    /// Register the data callback.
    ///
    /// Listening twice keeps the first callback.
    fn listen(&self, callback: SensorDataCallback);

    /// Stop producing callbacks. Callbacks already running may still complete.
    fn stop(&self);

    fn is_listening(&self) -> bool;
}
