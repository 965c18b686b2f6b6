//! # Perception
//!
//! Collective-perception subset selection around the ego agent.
//!
//! Responsibilities:
//! - Filter the in-range neighborhood with a `RangePolicy`
//! - Farthest-point sampling of at most `sample_size` agents, ego first
//! - Tick-over-tick subset deltas for the sensor rig
//! - Ego lifecycle (`NotDeparted -> Active -> Arrived`)

mod ego;
mod error;
mod range;
mod selector;

pub use ego::{EgoState, EgoTracker};
pub use error::{PerceptionError, Result};
pub use range::{in_range, InRange};
pub use selector::{select, PerceptionSelector, PerceptionSubset, SubsetDelta};

/// Ground-plane position used by the selector
pub type Point = nalgebra::Point2<f64>;
