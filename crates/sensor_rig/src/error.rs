//! Sensor rig error types

use actor_bridge::SimulatorError;
use contracts::{CosimError, Engine, TrafficActorId, VehicleActorId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SensorRigError {
    /// Agent has no live mirror to mount on
    #[error("agent {agent} has no vehicle {parent} to mount sensors on")]
    ParentMissing {
        agent: TrafficActorId,
        parent: VehicleActorId,
    },

    /// Spawned sensor did not expose a stream
    #[error("sensor {sensor} has no data stream")]
    NoStream { sensor: VehicleActorId },

    #[error(transparent)]
    Simulator(#[from] SimulatorError),
}

impl SensorRigError {
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Simulator(e) => e.is_fatal(),
            _ => false,
        }
    }
}

impl From<SensorRigError> for CosimError {
    fn from(err: SensorRigError) -> Self {
        match err {
            SensorRigError::ParentMissing { agent, .. } => {
                CosimError::transient_actor(Engine::Vehicle, agent)
            }
            SensorRigError::NoStream { sensor } => CosimError::Other(format!(
                "sensor {} has no data stream",
                sensor
            )),
            SensorRigError::Simulator(e) => e.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SensorRigError>;
