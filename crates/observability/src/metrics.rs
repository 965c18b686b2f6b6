//! Co-simulation metrics
//!
//! Facade recorders for the per-tick values plus an in-memory aggregator for
//! the end-of-run summary.

use metrics::{counter, gauge, histogram};

/// Values observed during one tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickSample {
    pub tick: u64,
    /// Wall time spent in the tick
    pub duration_ms: f64,
    /// Live mirrored pairs after reconciliation
    pub mirrors_active: usize,
    /// Perception subset size, 0 while ego is not active
    pub subset_size: usize,
    /// Measurements handed to the sink
    pub payloads: usize,
    /// Channels that hit the drain deadline
    pub drain_timeouts: u64,
}

/// Record the facade metrics of one tick
///
/// ```ignore
/// observability::record_tick_metrics(&sample);
/// ```
pub fn record_tick_metrics(sample: &TickSample) {
    counter!("cosim_ticks_total").increment(1);
    gauge!("cosim_last_tick").set(sample.tick as f64);
    histogram!("cosim_tick_duration_ms").record(sample.duration_ms);
    gauge!("cosim_mirrors_active").set(sample.mirrors_active as f64);
    gauge!("cosim_perception_subset_size").set(sample.subset_size as f64);
    if sample.payloads > 0 {
        counter!("cosim_payloads_written_total").increment(sample.payloads as u64);
    }
}

/// Record a failed mirror spawn in `engine`
pub fn record_mirror_spawn_failure(engine: &str) {
    counter!("cosim_mirror_spawn_failures_total", "engine" => engine.to_string()).increment(1);
}

/// Record an actor removed from sync after exhausting its retries
pub fn record_mirror_dropped(engine: &str) {
    counter!("cosim_mirrors_dropped_total", "engine" => engine.to_string()).increment(1);
}

/// Tick statistics aggregator
///
/// Aggregates in memory for the run summary.
#[derive(Debug, Clone, Default)]
pub struct TickStatsAggregator {
    pub total_ticks: u64,

    pub total_payloads: u64,

    pub total_drain_timeouts: u64,

    /// Ticks where at least one channel timed out
    pub ticks_with_timeouts: u64,

    pub tick_duration: RunningStats,

    pub subset_size: RunningStats,

    pub mirrors_active: RunningStats,
}

impl TickStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, sample: &TickSample) {
        self.total_ticks += 1;
        self.total_payloads += sample.payloads as u64;
        self.total_drain_timeouts += sample.drain_timeouts;
        if sample.drain_timeouts > 0 {
            self.ticks_with_timeouts += 1;
        }

        self.tick_duration.push(sample.duration_ms);
        self.mirrors_active.push(sample.mirrors_active as f64);
        if sample.subset_size > 0 {
            self.subset_size.push(sample.subset_size as f64);
        }
    }

    pub fn summary(&self) -> TickSummary {
        TickSummary {
            total_ticks: self.total_ticks,
            total_payloads: self.total_payloads,
            total_drain_timeouts: self.total_drain_timeouts,
            timeout_rate: if self.total_ticks > 0 {
                self.ticks_with_timeouts as f64 / self.total_ticks as f64 * 100.0
            } else {
                0.0
            },
            tick_duration_ms: StatsSummary::from(&self.tick_duration),
            subset_size: StatsSummary::from(&self.subset_size),
            mirrors_active: StatsSummary::from(&self.mirrors_active),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Run summary
#[derive(Debug, Clone, Default)]
pub struct TickSummary {
    pub total_ticks: u64,
    pub total_payloads: u64,
    pub total_drain_timeouts: u64,
    /// Percentage of ticks with a drain timeout
    pub timeout_rate: f64,
    pub tick_duration_ms: StatsSummary,
    pub subset_size: StatsSummary,
    pub mirrors_active: StatsSummary,
}

impl std::fmt::Display for TickSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Tick Summary ===")?;
        writeln!(f, "Total ticks: {}", self.total_ticks)?;
        writeln!(f, "Payloads written: {}", self.total_payloads)?;
        writeln!(
            f,
            "Drain timeouts: {} ({:.2}% of ticks)",
            self.total_drain_timeouts, self.timeout_rate
        )?;
        writeln!(f, "Tick duration (ms): {}", self.tick_duration_ms)?;
        writeln!(f, "Perception subset size: {}", self.subset_size)?;
        writeln!(f, "Active mirrors: {}", self.mirrors_active)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
