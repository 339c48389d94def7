//! The arbiter: exclusive sector occupancy for concurrent aircraft.
//!
//! One `Arbiter` instance owns the whole airspace state behind a single
//! async mutex. Aircraft tasks call [`Arbiter::request`] and
//! [`Arbiter::release`]; the priority queues, the wait-for cycle check,
//! victim selection, and the anti-starvation boost all happen inside those
//! two calls. The lock is never held across a suspension: waiters park on
//! their own [`tokio::sync::Notify`] after the lock is dropped, and the
//! retreat back-off sleeps outside it too.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::aircraft::{Aircraft, AircraftId, SectorId};
use crate::deadlock::{self, Verdict};
use crate::priority_queue::{QueueEntry, SectorQueue};
use crate::stats::{ArbiterStats, AircraftReport, SimulationReport, mean_wait_seconds};

/// Consecutive forced retreats tolerated before the priority boost applies.
pub const MAX_RETREATS: u32 = 2;
/// Long waits tolerated (since the last completed handover) before boosting.
pub const MAX_LONG_WAITS: u32 = 2;
/// Added to the original priority when boosted.
pub const PRIORITY_BOOST: u32 = 700;
/// A wait longer than this counts toward the long-wait boost trigger.
pub const LONG_WAIT: Duration = Duration::from_secs(3);
/// Pause between a retreat and the retry, taken with the lock released.
pub const RETREAT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("sector S{sector} is outside the airspace (0..{sectors})")]
    InvalidSector { sector: SectorId, sectors: usize },
}

/// Mutable per-aircraft state. Lives inside the arbiter's lock; the queue
/// entries and the deadlock walk reference aircraft by id only.
#[derive(Debug)]
pub(crate) struct FlightState {
    pub(crate) current_sector: Option<SectorId>,
    pub(crate) waiting_for: Option<SectorId>,
    pub(crate) priority_original: u32,
    pub(crate) priority_effective: u32,
    pub(crate) retreat_count: u32,
    pub(crate) long_wait_count: u32,
    pub(crate) retreat_pending: bool,
    wait_started: Option<Instant>,
    wait_times: Vec<Duration>,
}

impl FlightState {
    pub(crate) fn new(priority: u32) -> Self {
        Self {
            current_sector: None,
            waiting_for: None,
            priority_original: priority,
            priority_effective: priority,
            retreat_count: 0,
            long_wait_count: 0,
            retreat_pending: false,
            wait_started: None,
            wait_times: Vec::new(),
        }
    }
}

/// Everything ARB_LOCK guards.
pub(crate) struct Board {
    pub(crate) occupants: Vec<Option<AircraftId>>,
    pub(crate) queues: Vec<SectorQueue>,
    pub(crate) flights: Vec<FlightState>,
}

/// Occupancy and queue contents at one instant, for the radar display and
/// for tests.
#[derive(Debug, Clone, Serialize)]
pub struct AirspaceSnapshot {
    pub occupants: Vec<Option<AircraftId>>,
    pub queues: Vec<Vec<QueueEntry>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AircraftStatus {
    pub id: AircraftId,
    pub current_sector: Option<SectorId>,
    pub waiting_for: Option<SectorId>,
    pub priority_original: u32,
    pub priority_effective: u32,
    pub retreat_count: u32,
    pub long_wait_count: u32,
    pub waits_recorded: usize,
}

pub struct Arbiter {
    sectors: usize,
    board: Mutex<Board>,
    fleet: Vec<Arc<Aircraft>>,
    stats: ArbiterStats,
}

impl Arbiter {
    /// Build the arbiter for `sectors` sectors and the given fleet.
    /// Aircraft ids must match their index in `fleet`.
    pub fn new(sectors: usize, fleet: &[Arc<Aircraft>]) -> Self {
        assert!(
            fleet.iter().enumerate().all(|(i, a)| a.id == i),
            "aircraft ids must match their fleet index"
        );
        let board = Board {
            occupants: vec![None; sectors],
            queues: vec![SectorQueue::new(); sectors],
            flights: fleet.iter().map(|a| FlightState::new(a.priority)).collect(),
        };
        Self {
            sectors,
            board: Mutex::new(board),
            fleet: fleet.to_vec(),
            stats: ArbiterStats::new(),
        }
    }

    pub fn sector_count(&self) -> usize {
        self.sectors
    }

    pub fn stats(&self) -> &ArbiterStats {
        &self.stats
    }

    /// Block until `aircraft` holds `target` exclusively.
    ///
    /// Returns immediately if the aircraft already occupies `target`. Any
    /// previously held sector is left untouched; releasing it after the
    /// grant is the caller's job. Fails only on an out-of-range sector.
    pub async fn request(&self, aircraft: &Aircraft, target: SectorId) -> Result<(), RequestError> {
        let id = aircraft.id;
        loop {
            let mut board = self.board.lock().await;

            if target >= self.sectors {
                return Err(RequestError::InvalidSector {
                    sector: target,
                    sectors: self.sectors,
                });
            }
            if board.flights[id].current_sector == Some(target) {
                debug!(aircraft = id, sector = target, "already occupying requested sector");
                return Ok(());
            }

            let occupied = matches!(board.occupants[target], Some(holder) if holder != id);
            // Run the cycle check even for a free sector: it refuses a
            // cycle one step before the closing request would block on it.
            let verdict = deadlock::check(&board, id, target);
            if verdict != Verdict::NoCycle {
                self.stats.record_deadlock();
            }

            match verdict {
                Verdict::NoCycle if !occupied => {
                    self.grant_free(&mut board, aircraft, target);
                    return Ok(());
                }
                Verdict::RetreatSelf => {
                    warn!(
                        aircraft = id,
                        sector = target,
                        "request would close a wait-for cycle, retreating"
                    );
                    self.note_retreat(&mut board, aircraft);
                    if let Some(held) = board.flights[id].current_sector {
                        self.vacate(&mut board, id, held);
                    }
                    drop(board);
                    tokio::time::sleep(RETREAT_BACKOFF).await;
                }
                other => {
                    // Sector busy; line up. If the cycle check named a
                    // different victim, order it out before sleeping.
                    let priority = board.flights[id].priority_effective;
                    info!(
                        aircraft = id,
                        priority,
                        sector = target,
                        occupied_by = ?board.occupants[target],
                        "waiting for sector"
                    );
                    board.queues[target].insert(id, priority);
                    board.flights[id].waiting_for = Some(target);
                    board.flights[id].wait_started = Some(Instant::now());

                    if let Verdict::RetreatOther(victim) = other {
                        self.order_retreat(&mut board, victim);
                    }

                    drop(board);
                    aircraft.wake.notified().await;

                    let mut board = self.board.lock().await;
                    if board.flights[id].retreat_pending {
                        board.flights[id].retreat_pending = false;
                        self.note_retreat(&mut board, aircraft);
                        if let Some(held) = board.flights[id].current_sector {
                            self.vacate(&mut board, id, held);
                        }
                        drop(board);
                        tokio::time::sleep(RETREAT_BACKOFF).await;
                    } else {
                        // The release path already made us the occupant.
                        self.finish_granted_wait(&mut board, aircraft, target);
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Relinquish `sector`. If anyone is queued for it, the highest-priority
    /// waiter becomes the occupant and is woken; otherwise the sector is
    /// free. Releasing an invalid or unheld sector is a logged no-op.
    pub async fn release(&self, aircraft: &Aircraft, sector: SectorId) {
        if sector >= self.sectors {
            warn!(
                aircraft = aircraft.id,
                sector, "release of a sector outside the airspace, ignoring"
            );
            return;
        }
        let mut board = self.board.lock().await;
        self.vacate(&mut board, aircraft.id, sector);
    }

    /// Find whatever sector `aircraft` holds and release it. No-op if it
    /// holds none. Used by the agent abort path.
    pub async fn emergency_release(&self, aircraft: &Aircraft) {
        let mut board = self.board.lock().await;
        let held = board.occupants.iter().position(|o| *o == Some(aircraft.id));
        if let Some(sector) = held {
            warn!(aircraft = aircraft.id, sector, "emergency release of held sector");
            self.vacate(&mut board, aircraft.id, sector);
        }
    }

    pub async fn snapshot(&self) -> AirspaceSnapshot {
        let board = self.board.lock().await;
        AirspaceSnapshot {
            occupants: board.occupants.clone(),
            queues: board.queues.iter().map(|q| q.snapshot()).collect(),
        }
    }

    pub async fn aircraft_status(&self, id: AircraftId) -> Option<AircraftStatus> {
        let board = self.board.lock().await;
        let flight = board.flights.get(id)?;
        Some(AircraftStatus {
            id,
            current_sector: flight.current_sector,
            waiting_for: flight.waiting_for,
            priority_original: flight.priority_original,
            priority_effective: flight.priority_effective,
            retreat_count: flight.retreat_count,
            long_wait_count: flight.long_wait_count,
            waits_recorded: flight.wait_times.len(),
        })
    }

    /// Teardown report: aggregate counters plus per-aircraft mean waits.
    pub async fn report(&self) -> SimulationReport {
        let board = self.board.lock().await;
        let fleet: Vec<AircraftReport> = self
            .fleet
            .iter()
            .map(|a| AircraftReport {
                id: a.id,
                priority: a.priority,
                mean_wait_seconds: mean_wait_seconds(&board.flights[a.id].wait_times),
                waits_recorded: board.flights[a.id].wait_times.len(),
            })
            .collect();
        let fleet_mean = if fleet.is_empty() {
            0.0
        } else {
            fleet.iter().map(|r| r.mean_wait_seconds).sum::<f64>() / fleet.len() as f64
        };
        let elapsed = self.stats.elapsed_seconds();
        let deadlocks = self.stats.deadlocks_detected();
        SimulationReport {
            sectors: self.sectors,
            aircraft: self.fleet.len(),
            elapsed_seconds: elapsed,
            deadlocks_detected: deadlocks,
            forced_retreats: self.stats.forced_retreats(),
            boosts_applied: self.stats.boosts_applied(),
            grants: self.stats.grants(),
            contention_rate: if elapsed > 0.0 { deadlocks as f64 / elapsed } else { 0.0 },
            fleet_mean_wait_seconds: fleet_mean,
            fleet,
        }
    }

    /// Direct grant of a sector nobody holds.
    fn grant_free(&self, board: &mut Board, aircraft: &Aircraft, target: SectorId) {
        board.occupants[target] = Some(aircraft.id);
        board.flights[aircraft.id].current_sector = Some(target);
        self.stats.record_grant();
        info!(aircraft = aircraft.id, sector = target, "assumed free sector");
    }

    /// Bookkeeping after waking from a queued wait that ended in a grant:
    /// the releaser has already flipped the occupancy to us.
    fn finish_granted_wait(&self, board: &mut Board, aircraft: &Aircraft, target: SectorId) {
        debug_assert_eq!(board.occupants[target], Some(aircraft.id));
        let flight = &mut board.flights[aircraft.id];
        let waited = flight.wait_started.take().map(|s| s.elapsed()).unwrap_or_default();
        if flight.wait_times.len() < aircraft.route.len() {
            flight.wait_times.push(waited);
        }
        // A completed handover spends whatever boost got the aircraft here;
        // a boost earned *now* stands until the next one.
        flight.priority_effective = flight.priority_original;
        if waited > LONG_WAIT {
            flight.long_wait_count += 1;
            if flight.long_wait_count >= MAX_LONG_WAITS {
                flight.priority_effective = flight.priority_original + PRIORITY_BOOST;
                self.stats.record_boost();
                info!(
                    aircraft = aircraft.id,
                    waited_ms = waited.as_millis() as u64,
                    boosted_to = flight.priority_effective,
                    "priority boosted after repeated long waits"
                );
            }
        }
        flight.long_wait_count = 0;
        flight.retreat_count = 0;
        flight.current_sector = Some(target);
        self.stats.record_grant();
        info!(
            aircraft = aircraft.id,
            sector = target,
            waited_ms = waited.as_millis() as u64,
            "sector handover complete"
        );
    }

    /// Count a forced retreat (either flavor) and boost if the aircraft has
    /// now retreated `MAX_RETREATS` times without a completed handover.
    fn note_retreat(&self, board: &mut Board, aircraft: &Aircraft) {
        let flight = &mut board.flights[aircraft.id];
        flight.retreat_count += 1;
        if let Some(started) = flight.wait_started.take()
            && started.elapsed() > LONG_WAIT
        {
            flight.long_wait_count += 1;
        }
        self.stats.record_forced_retreat();
        if flight.retreat_count >= MAX_RETREATS
            && flight.priority_effective == flight.priority_original
        {
            flight.priority_effective = flight.priority_original + PRIORITY_BOOST;
            self.stats.record_boost();
            info!(
                aircraft = aircraft.id,
                retreats = flight.retreat_count,
                boosted_to = flight.priority_effective,
                "priority boosted after repeated retreats"
            );
        }
    }

    /// Eject a queued victim: flag it, pull it out of its queue, wake it.
    /// The victim releases its own held sector when it processes the flag.
    fn order_retreat(&self, board: &mut Board, victim: AircraftId) {
        let flight = &mut board.flights[victim];
        flight.retreat_pending = true;
        let wanted = flight.waiting_for.take();
        if let Some(sector) = wanted {
            board.queues[sector].remove(victim);
        }
        warn!(victim, was_waiting_on = ?wanted, "ordering retreat to break wait-for cycle");
        self.fleet[victim].wake.notify_one();
    }

    /// Internal release path shared by release, emergency release and both
    /// retreat flavors.
    fn vacate(&self, board: &mut Board, id: AircraftId, sector: SectorId) {
        if board.occupants[sector] != Some(id) {
            warn!(
                aircraft = id,
                sector, "release of a sector the aircraft does not hold, ignoring"
            );
            return;
        }
        board.occupants[sector] = None;
        if board.flights[id].current_sector == Some(sector) {
            board.flights[id].current_sector = None;
        }
        match board.queues[sector].pop_highest() {
            Some(next) => {
                board.occupants[sector] = Some(next.id);
                board.flights[next.id].waiting_for = None;
                self.fleet[next.id].wake.notify_one();
                info!(
                    sector,
                    from = id,
                    to = next.id,
                    priority = next.priority,
                    "sector handed to highest-priority waiter"
                );
            }
            None => {
                info!(aircraft = id, sector, "sector released, now free");
            }
        }
    }
}
