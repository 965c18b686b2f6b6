//! # Contracts
//!
//! Interface contracts shared by every crate of the co-simulation workspace.
//! Business crates depend on this crate only, never the other way around.
//!
//! ## Time Model
//! - `frame` is the vehicle simulator frame counter after each step
//! - `timestamp` is simulation time in seconds (f64)

mod actor;
mod actor_id;
mod config;
mod error;
mod geometry;
mod sensor;
mod sensor_source;
mod signal;
mod sink;

pub use actor::*;
pub use actor_id::{TrafficActorId, VehicleActorId};
pub use config::*;
pub use error::*;
pub use geometry::*;
pub use sensor::*;
pub use sensor_source::{SensorDataCallback, SensorSource};
pub use signal::*;
pub use sink::*;
