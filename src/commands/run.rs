//! The simulation driver: build the fleet, spawn the agents, join them,
//! report.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::{RngExt, SeedableRng};
use rand::rngs::StdRng;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent;
use crate::aircraft::{Aircraft, PRIORITY_MAX, PRIORITY_MIN};
use crate::arbiter::Arbiter;
use crate::radar;
use crate::routes;
use crate::stats::init_simulation_metrics;

pub struct RunOptions {
    pub sectors: usize,
    pub aircraft: usize,
    pub seed: Option<u64>,
    /// Seconds between radar sweeps; 0 disables the radar task.
    pub radar_interval: u64,
    pub json_stats: bool,
}

pub async fn handle_run(opts: RunOptions) -> Result<()> {
    let sectors = if opts.sectors < 2 {
        warn!("at least 2 sectors required, clamping to 2");
        2
    } else {
        opts.sectors
    };

    // Random seed unless pinned; always logged so a run can be replayed.
    let seed = opts.seed.unwrap_or_else(|| rand::rng().random());
    let mut rng = StdRng::seed_from_u64(seed);

    info!("===============================================");
    info!("  AIR TRAFFIC CONTROL SECTOR SIMULATION");
    info!("===============================================");
    info!(
        sectors,
        aircraft = opts.aircraft,
        seed,
        priority_range = %format!("{PRIORITY_MIN}-{PRIORITY_MAX}"),
        "starting (Ctrl+C for graceful shutdown)"
    );

    init_simulation_metrics();

    let fleet: Vec<Arc<Aircraft>> = (0..opts.aircraft)
        .map(|id| {
            let priority = rng.random_range(PRIORITY_MIN..=PRIORITY_MAX);
            let length = routes::route_length(&mut rng, sectors);
            let route = routes::random_route(&mut rng, sectors, length);
            Arc::new(Aircraft::new(id, priority, route))
        })
        .collect();

    let arbiter = Arc::new(Arbiter::new(sectors, &fleet));
    let cancel = CancellationToken::new();

    spawn_signal_handler(cancel.clone());

    let radar_task = (opts.radar_interval > 0).then(|| {
        radar::spawn_radar(
            arbiter.clone(),
            Duration::from_secs(opts.radar_interval),
            cancel.clone(),
        )
    });

    let handles: Vec<_> = fleet
        .iter()
        .map(|aircraft| {
            // Per-agent RNG derived from the run seed keeps flight times
            // reproducible under --seed.
            let agent_rng = StdRng::seed_from_u64(seed.wrapping_add(1 + aircraft.id as u64));
            tokio::spawn(agent::fly_route(
                aircraft.clone(),
                arbiter.clone(),
                cancel.clone(),
                agent_rng,
            ))
        })
        .collect();

    info!(agents = handles.len(), "all aircraft airborne, waiting for routes to complete");
    for (id, handle) in handles.into_iter().enumerate() {
        handle.await?;
        info!(aircraft = id, "agent joined");
    }

    // Teardown: stop the radar, then report.
    cancel.cancel();
    if let Some(task) = radar_task {
        task.await.ok();
    }

    let report = arbiter.report().await;
    info!("===============================================");
    info!("  FINAL REPORT");
    info!("===============================================");
    info!(
        elapsed_s = %format!("{:.2}", report.elapsed_seconds),
        deadlocks = report.deadlocks_detected,
        forced_retreats = report.forced_retreats,
        boosts = report.boosts_applied,
        grants = report.grants,
        contention_per_s = %format!("{:.3}", report.contention_rate),
        "simulation finished"
    );
    for line in &report.fleet {
        info!(
            aircraft = line.id,
            priority = line.priority,
            mean_wait_s = %format!("{:.2}", line.mean_wait_seconds),
            waits = line.waits_recorded,
            "aircraft summary"
        );
    }
    info!(
        fleet_mean_wait_s = %format!("{:.2}", report.fleet_mean_wait_seconds),
        "fleet mean wait"
    );

    if opts.json_stats {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}

/// Cancel the token on SIGINT (and SIGTERM on unix). Agents notice at their
/// next leg boundary and land; the driver's join loop then finishes
/// normally, so shutdown still produces the final report.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received, letting aircraft land...");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(err) => {
            warn!(error = %err, "unable to install SIGTERM handler");
            tokio::signal::ctrl_c().await.ok();
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
}
