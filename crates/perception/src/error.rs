use contracts::{CosimError, Engine, TrafficActorId};
use thiserror::Error;

/// Perception errors
#[derive(Debug, Error)]
pub enum PerceptionError {
    #[error("ego '{ego}' has no position this tick")]
    EgoMissing { ego: TrafficActorId },
}

impl From<PerceptionError> for CosimError {
    fn from(err: PerceptionError) -> Self {
        match err {
            PerceptionError::EgoMissing { ego } => CosimError::transient_actor(Engine::Traffic, ego),
        }
    }
}

pub type Result<T> = std::result::Result<T, PerceptionError>;
