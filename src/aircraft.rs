use tokio::sync::Notify;

pub type AircraftId = usize;
pub type SectorId = usize;

/// Inclusive range of priorities assigned at creation. Higher is served
/// first; the arbiter's anti-starvation boost can push the effective
/// priority above `PRIORITY_MAX`.
pub const PRIORITY_MIN: u32 = 1;
pub const PRIORITY_MAX: u32 = 1000;

/// Creation-time identity of one aircraft. Everything that changes during
/// the flight (current sector, effective priority, retreat bookkeeping)
/// lives inside the arbiter, guarded by its lock; this struct only carries
/// what is fixed for the lifetime of the simulation plus the wake signal
/// the arbiter uses to hand the aircraft a sector.
pub struct Aircraft {
    pub id: AircraftId,
    /// Priority as assigned at creation; the ordering baseline.
    pub priority: u32,
    /// Ordered sectors to visit. Consecutive duplicates are skipped by the
    /// agent at traversal time.
    pub route: Vec<SectorId>,
    /// One-permit wake latch. Signalled by the arbiter when this aircraft
    /// has been made an occupant or ordered to retreat; awaited only by the
    /// aircraft's own task.
    pub(crate) wake: Notify,
}

impl Aircraft {
    pub fn new(id: AircraftId, priority: u32, route: Vec<SectorId>) -> Self {
        Self {
            id,
            priority,
            route,
            wake: Notify::new(),
        }
    }

    /// Route rendered for logs, e.g. `S2 -> S3 -> S0`.
    pub fn describe_route(&self) -> String {
        self.route
            .iter()
            .map(|s| format!("S{s}"))
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

impl std::fmt::Debug for Aircraft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aircraft")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("route", &self.route)
            .finish()
    }
}
