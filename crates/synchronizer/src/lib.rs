//! # Synchronizer
//!
//! Lockstep driver of the traffic and vehicle simulators.
//!
//! Responsibilities:
//! - `Init -> Running -> Draining -> Stopped` state machine
//! - Mirror reconciliation and transform push for every live pair
//! - Traffic-light mirroring in the configured direction
//! - Perception subset upkeep and sensor rider attach/detach around ego
//! - Best-effort cleanup when an engine becomes unavailable
//!
//! ## Example
//!
//! ```ignore
//! let session = Session::new(traffic, vehicle);
//! let mut sync = SynchronizationLoop::new(config, session, sink);
//! let report = sync.run(StopHandle::new()).await?;
//! ```

mod report;
mod roles;
mod session;
mod sync_loop;

pub use report::{MirrorCounters, RunReport, StopReason};
pub use roles::{assign_roles, Role, RoleHighlighter};
pub use session::{Session, StopHandle};
pub use sync_loop::{LoopState, SynchronizationLoop, TickOutcome};

pub type Result<T> = std::result::Result<T, contracts::CosimError>;
