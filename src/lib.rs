//! CLEARANCE - air traffic control sector arbiter simulation
//!
//! A fixed set of airspace sectors is shared by concurrent aircraft, each
//! flying a precomputed route. The arbiter serializes sector occupancy,
//! detects wait-for cycles before they deadlock, and boosts the priority of
//! aircraft that keep losing cycle resolutions so that every route
//! eventually completes.

pub mod agent;
pub mod aircraft;
pub mod arbiter;
pub mod commands;
pub mod deadlock;
pub mod log_format;
pub mod priority_queue;
pub mod radar;
pub mod routes;
pub mod stats;

pub use aircraft::{Aircraft, AircraftId, SectorId};
pub use arbiter::{AircraftStatus, AirspaceSnapshot, Arbiter, RequestError};
pub use stats::{AircraftReport, SimulationReport};
