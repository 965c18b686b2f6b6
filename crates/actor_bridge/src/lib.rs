//! # Actor Bridge
//!
//! Engine-facing half of the co-simulation.
//!
//! Responsibilities:
//! - Client traits for the traffic and vehicle simulators
//! - `ActorRegistry`: id mapping and mirror lifecycle
//! - Transform, light and blueprint conversions between the engines
//! - In-process mock engines for tests and dry runs

pub mod bridge_helper;
pub mod client;
pub mod error;
pub mod mock_sensor;
pub mod mock_traffic;
pub mod mock_vehicle;
pub mod registry;

use std::sync::{Mutex, MutexGuard};

pub use bridge_helper::{BlueprintCatalog, NetOffset, SPAWN_OFFSET_Z};
pub use client::{Neighbor, StepReport, TrafficSimulator, VehicleSimulator, WorldSettings};
pub use error::{Result, SimulatorError};
pub use mock_sensor::MockSensor;
pub use mock_traffic::{MockTrafficConfig, MockTrafficSim, ScriptedAgent, ScriptedController};
pub use mock_vehicle::{MockVehicleConfig, MockVehicleSim, ScriptedVehicle};
pub use registry::{
    ActorRegistry, MirrorLink, MirrorStatus, Origin, ReconcilePlan, SpawnOutcome, TickReport,
};

/// Lock ignoring poisoning; mock state stays usable after a panicking test thread
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
