//! Run report

use std::fmt;

use observability::TickSummary;
use perception::EgoState;
use sensor_rig::RigMetricsSnapshot;

/// Why the loop left `Running`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EgoArrived,
    StopRequested,
    TickLimit,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EgoArrived => "ego_arrived",
            Self::StopRequested => "stop_requested",
            Self::TickLimit => "tick_limit",
        }
    }
}

/// Mirror lifecycle counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorCounters {
    pub spawned: u64,
    pub destroyed: u64,
    pub spawn_failures: u64,
    /// Actors excluded from sync after exhausting retries or lacking a type
    pub dropped: u64,
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub ticks: u64,
    /// Last vehicle simulator frame
    pub last_frame: u64,
    pub stop_reason: StopReason,
    pub ego_state: EgoState,
    pub mirrors: MirrorCounters,
    /// Measurements handed to the sink
    pub payloads_delivered: u64,
    /// Traffic lights written across simulators
    pub lights_synced: u64,
    pub rig: RigMetricsSnapshot,
    pub summary: TickSummary,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Run Report ===")?;
        writeln!(f, "Stop reason: {}", self.stop_reason.as_str())?;
        writeln!(f, "Ticks: {} (last frame {})", self.ticks, self.last_frame)?;
        writeln!(f, "Ego: {}", self.ego_state.as_str())?;
        writeln!(
            f,
            "Mirrors: spawned={}, destroyed={}, spawn_failures={}, dropped={}",
            self.mirrors.spawned,
            self.mirrors.destroyed,
            self.mirrors.spawn_failures,
            self.mirrors.dropped
        )?;
        writeln!(
            f,
            "Sensor payloads: delivered={}, received={}, dropped_at_gate={}, drain_timeouts={}",
            self.payloads_delivered,
            self.rig.payloads_received,
            self.rig.payloads_dropped,
            self.rig.drain_timeouts
        )?;
        writeln!(f, "Traffic lights synced: {}", self.lights_synced)?;
        write!(f, "{}", self.summary)
    }
}
