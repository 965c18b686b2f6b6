//! # Sensor Rig
//!
//! Mounts the configured sensor bundle on perception agents in the vehicle
//! simulator and collects their measurements tick by tick.
//!
//! Responsibilities:
//! - Attach / detach riders (idempotent attach, gate → collect → destroy detach)
//! - One unbounded queue per channel, fed from engine callback threads
//! - Bounded per-channel drain for the current frame

mod error;
mod manager;
mod metrics;
mod tap;

pub use error::{Result, SensorRigError};
pub use manager::SensorRigManager;
pub use metrics::{RigMetrics, RigMetricsSnapshot};
pub use tap::RiderTap;
