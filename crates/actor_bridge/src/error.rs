//! Simulator client error types

use contracts::{CosimError, Engine};
use thiserror::Error;

/// Error returned by simulator clients
#[derive(Debug, Error)]
pub enum SimulatorError {
    /// Connection lost or RPC timed out
    #[error("failed to reach {engine}: {message}")]
    ConnectionFailed { engine: Engine, message: String },

    /// Referenced actor does not exist
    #[error("{engine} actor '{actor}' not found")]
    ActorNotFound { engine: Engine, actor: String },

    /// Engine refused to spawn an actor
    #[error("{engine} rejected spawn of '{type_id}': {message}")]
    SpawnRejected {
        engine: Engine,
        type_id: String,
        message: String,
    },

    /// Destroy error
    #[error("failed to destroy {engine} actor '{actor}': {message}")]
    DestroyFailed {
        engine: Engine,
        actor: String,
        message: String,
    },

    /// Wrapped CosimError
    #[error(transparent)]
    Contract(#[from] CosimError),
}

impl SimulatorError {
    pub fn connection(engine: Engine, message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            engine,
            message: message.into(),
        }
    }

    pub fn actor_not_found(engine: Engine, actor: impl ToString) -> Self {
        Self::ActorNotFound {
            engine,
            actor: actor.to_string(),
        }
    }

    pub fn spawn_rejected(
        engine: Engine,
        type_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::SpawnRejected {
            engine,
            type_id: type_id.into(),
            message: message.into(),
        }
    }

    /// Engine is gone; the run cannot continue
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } => true,
            Self::Contract(e) => e.is_fatal(),
            _ => false,
        }
    }
}

impl From<SimulatorError> for CosimError {
    fn from(err: SimulatorError) -> Self {
        match err {
            SimulatorError::ConnectionFailed { engine, message } => {
                CosimError::EngineUnavailable { engine, message }
            }
            SimulatorError::ActorNotFound { engine, actor } => {
                CosimError::TransientActor { engine, actor }
            }
            SimulatorError::SpawnRejected {
                engine,
                type_id,
                message,
            } => CosimError::spawn_failure(engine, type_id, 1, message),
            SimulatorError::DestroyFailed {
                engine,
                actor,
                message,
            } => CosimError::Other(format!("failed to destroy {engine} actor '{actor}': {message}")),
            SimulatorError::Contract(e) => e,
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, SimulatorError>;
