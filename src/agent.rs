//! The per-aircraft worker task: walk the route, one sector at a time.

use std::sync::Arc;
use std::time::Duration;

use rand::RngExt;
use rand::rngs::StdRng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::aircraft::{Aircraft, SectorId};
use crate::arbiter::Arbiter;

/// Simulated time spent crossing a sector, drawn per leg.
pub const FLIGHT_TIME_MS: std::ops::RangeInclusive<u64> = 1000..=1500;

/// Fly `aircraft` along its route. Requests the next sector, releases the
/// previous one once the grant lands, then sleeps the simulated flight
/// time. Consecutive duplicate sectors are skipped. A cancelled token ends
/// the route at the next leg boundary; a failed request aborts the agent.
pub async fn fly_route(
    aircraft: Arc<Aircraft>,
    arbiter: Arc<Arbiter>,
    cancel: CancellationToken,
    mut rng: StdRng,
) {
    info!(
        aircraft = aircraft.id,
        priority = aircraft.priority,
        route = %aircraft.describe_route(),
        "departing"
    );

    let mut current: Option<SectorId> = None;
    for &next in &aircraft.route {
        if cancel.is_cancelled() {
            info!(aircraft = aircraft.id, "shutdown requested, abandoning route");
            break;
        }
        if current == Some(next) {
            continue;
        }

        if let Err(err) = arbiter.request(&aircraft, next).await {
            error!(aircraft = aircraft.id, error = %err, "clearance denied, aborting route");
            arbiter.emergency_release(&aircraft).await;
            current = None;
            break;
        }

        if let Some(previous) = current {
            arbiter.release(&aircraft, previous).await;
        }
        current = Some(next);
        metrics::counter!("aircraft.legs.flown").increment(1);

        let flight_ms = rng.random_range(FLIGHT_TIME_MS);
        debug!(aircraft = aircraft.id, sector = next, flight_ms, "flying through sector");
        tokio::time::sleep(Duration::from_millis(flight_ms)).await;
    }

    if let Some(last) = current {
        arbiter.release(&aircraft, last).await;
    }

    info!(aircraft = aircraft.id, "route complete");
}
