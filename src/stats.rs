//! Aggregate simulation statistics.
//!
//! The arbiter increments atomics on its hot paths; the driver renders a
//! `SimulationReport` at teardown. The same events are mirrored onto the
//! `metrics` facade so the instrumentation points stay in place even though
//! no exporter is wired up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::aircraft::AircraftId;

#[derive(Debug)]
pub struct ArbiterStats {
    started: Instant,
    deadlocks_detected: AtomicU64,
    forced_retreats: AtomicU64,
    boosts_applied: AtomicU64,
    grants: AtomicU64,
}

impl ArbiterStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            deadlocks_detected: AtomicU64::new(0),
            forced_retreats: AtomicU64::new(0),
            boosts_applied: AtomicU64::new(0),
            grants: AtomicU64::new(0),
        }
    }

    pub fn record_deadlock(&self) {
        self.deadlocks_detected.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("arbiter.deadlocks.detected").increment(1);
    }

    pub fn record_forced_retreat(&self) {
        self.forced_retreats.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("arbiter.retreats.forced").increment(1);
    }

    pub fn record_boost(&self) {
        self.boosts_applied.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("arbiter.boosts.applied").increment(1);
    }

    pub fn record_grant(&self) {
        self.grants.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("arbiter.grants.total").increment(1);
    }

    pub fn deadlocks_detected(&self) -> u64 {
        self.deadlocks_detected.load(Ordering::Relaxed)
    }

    pub fn forced_retreats(&self) -> u64 {
        self.forced_retreats.load(Ordering::Relaxed)
    }

    pub fn boosts_applied(&self) -> u64 {
        self.boosts_applied.load(Ordering::Relaxed)
    }

    pub fn grants(&self) -> u64 {
        self.grants.load(Ordering::Relaxed)
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

impl Default for ArbiterStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Final per-aircraft line of the teardown report.
#[derive(Debug, Clone, Serialize)]
pub struct AircraftReport {
    pub id: AircraftId,
    pub priority: u32,
    /// Mean over recorded waits longer than 1 ms; zero-like waits are noise
    /// from uncontended handovers and are excluded.
    pub mean_wait_seconds: f64,
    pub waits_recorded: usize,
}

/// Everything the driver logs (and optionally dumps as JSON) at teardown.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub sectors: usize,
    pub aircraft: usize,
    pub elapsed_seconds: f64,
    pub deadlocks_detected: u64,
    pub forced_retreats: u64,
    pub boosts_applied: u64,
    pub grants: u64,
    /// Detected deadlocks per wall-clock second.
    pub contention_rate: f64,
    pub fleet_mean_wait_seconds: f64,
    pub fleet: Vec<AircraftReport>,
}

/// Mean of the waits above the 1 ms noise floor, in seconds.
pub fn mean_wait_seconds(waits: &[std::time::Duration]) -> f64 {
    let mut sum = 0.0;
    let mut counted = 0u32;
    for wait in waits {
        if wait.as_secs_f64() > 0.001 {
            sum += wait.as_secs_f64();
            counted += 1;
        }
    }
    if counted > 0 { sum / f64::from(counted) } else { 0.0 }
}

/// Zero-initialize the simulation counters so they exist before the first
/// event is recorded.
pub fn init_simulation_metrics() {
    metrics::counter!("arbiter.deadlocks.detected").absolute(0);
    metrics::counter!("arbiter.retreats.forced").absolute(0);
    metrics::counter!("arbiter.boosts.applied").absolute(0);
    metrics::counter!("arbiter.grants.total").absolute(0);
    metrics::counter!("aircraft.legs.flown").absolute(0);
    metrics::gauge!("arbiter.sectors.occupied").set(0.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_mean_wait_excludes_zero_like_waits() {
        let waits = [
            Duration::from_millis(0),
            Duration::from_micros(500),
            Duration::from_secs(2),
            Duration::from_secs(4),
        ];
        let mean = mean_wait_seconds(&waits);
        assert!((mean - 3.0).abs() < 1e-9, "got {mean}");
    }

    #[test]
    fn test_mean_wait_of_nothing_is_zero() {
        assert_eq!(mean_wait_seconds(&[]), 0.0);
        assert_eq!(mean_wait_seconds(&[Duration::from_micros(10)]), 0.0);
    }

    #[test]
    fn test_stats_counters_accumulate() {
        let stats = ArbiterStats::new();
        stats.record_deadlock();
        stats.record_forced_retreat();
        stats.record_forced_retreat();
        stats.record_grant();
        assert_eq!(stats.deadlocks_detected(), 1);
        assert_eq!(stats.forced_retreats(), 2);
        assert_eq!(stats.boosts_applied(), 0);
        assert_eq!(stats.grants(), 1);
    }
}
