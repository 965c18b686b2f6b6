//! Layered error definitions
//!
//! Categorized by recovery: per-actor / per-tick / startup / engine

use thiserror::Error;

use crate::SensorChannel;

/// Unified error type of the co-simulation core
#[derive(Debug, Error)]
pub enum CosimError {
    // ===== Recovered per actor =====
    /// Referenced actor no longer exists in one simulator
    #[error("{engine} actor '{actor}' no longer exists")]
    TransientActor { engine: Engine, actor: String },

    /// Mirror spawn rejected by an engine
    #[error("mirror spawn of '{actor}' in {engine} failed after {attempts} attempt(s): {message}")]
    SpawnFailure {
        engine: Engine,
        actor: String,
        attempts: u32,
        message: String,
    },

    /// Links of one landmark disagree
    #[error("ambiguous signal state for landmark '{landmark}': {states}")]
    AmbiguousSignalState { landmark: String, states: String },

    // ===== Recovered per tick =====
    /// A sensor channel produced nothing within the per-tick budget
    #[error("drain timeout on channel '{channel}': waited {waited_ms}ms, missing agents {missing:?}")]
    QueueDrainTimeout {
        channel: SensorChannel,
        waited_ms: u64,
        missing: Vec<u32>,
    },

    // ===== Fatal =====
    /// Invalid or incomplete configuration
    #[error("configuration error at '{field}': {message}")]
    Configuration { field: String, message: String },

    /// Connection or timeout against a simulator
    #[error("{engine} unavailable: {message}")]
    EngineUnavailable { engine: Engine, message: String },

    // ===== Output =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Which simulator an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Traffic,
    Vehicle,
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Traffic => f.write_str("traffic simulator"),
            Self::Vehicle => f.write_str("vehicle simulator"),
        }
    }
}

impl CosimError {
    pub fn transient_actor(engine: Engine, actor: impl ToString) -> Self {
        Self::TransientActor {
            engine,
            actor: actor.to_string(),
        }
    }

    pub fn spawn_failure(
        engine: Engine,
        actor: impl ToString,
        attempts: u32,
        message: impl Into<String>,
    ) -> Self {
        Self::SpawnFailure {
            engine,
            actor: actor.to_string(),
            attempts,
            message: message.into(),
        }
    }

    /// Create configuration error
    pub fn configuration(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn engine_unavailable(engine: Engine, message: impl Into<String>) -> Self {
        Self::EngineUnavailable {
            engine,
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Error aborts the run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::EngineUnavailable { .. }
        )
    }

    /// Category label used in logs and metrics
    pub fn category(&self) -> &'static str {
        match self {
            Self::TransientActor { .. } => "transient_actor",
            Self::SpawnFailure { .. } => "spawn_failure",
            Self::AmbiguousSignalState { .. } => "ambiguous_signal_state",
            Self::QueueDrainTimeout { .. } => "queue_drain_timeout",
            Self::Configuration { .. } => "configuration",
            Self::EngineUnavailable { .. } => "engine_unavailable",
            Self::SinkWrite { .. } => "sink_write",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }
}
