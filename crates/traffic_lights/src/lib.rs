//! # Traffic Lights
//!
//! Landmark addressed view over the traffic simulator's signal controllers.
//!
//! Responsibilities:
//! - Validate controller programs at startup
//! - Resolve a landmark to its (controller, link) pairs
//! - Read and write landmark states with a fail-safe red on disagreement
//! - Mirror light states between both simulators for common landmarks
//!
//! ## Example
//!
//! ```ignore
//! let mut bridge = TrafficLightBridge::load(&traffic).await?;
//! bridge.tick(&traffic).await?;
//! sync_traffic_to_vehicle(&bridge, &vehicle).await?;
//! ```

mod bridge;
mod sync;

pub use bridge::{TrafficLightBridge, SignalLink};
pub use sync::{common_landmarks, sync_traffic_to_vehicle, sync_vehicle_to_traffic};

pub type Result<T> = std::result::Result<T, contracts::CosimError>;
