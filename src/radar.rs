//! Periodic radar display: sector occupancy and waiting queues.
//!
//! Purely diagnostic; reads a snapshot under the arbiter lock and logs it.
//! Runs until its cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::arbiter::Arbiter;

pub fn spawn_radar(
    arbiter: Arc<Arbiter>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("radar stopped");
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }

            let snap = arbiter.snapshot().await;
            let occupied = snap.occupants.iter().filter(|o| o.is_some()).count();
            metrics::gauge!("arbiter.sectors.occupied").set(occupied as f64);

            info!(
                occupied,
                total = snap.occupants.len(),
                "radar sweep"
            );
            for (sector, occupant) in snap.occupants.iter().enumerate() {
                match occupant {
                    Some(id) => info!("  S{sector}: occupied by aircraft {id}"),
                    None => info!("  S{sector}: free"),
                }
            }
            for (sector, queue) in snap.queues.iter().enumerate() {
                if !queue.is_empty() {
                    let entries: Vec<String> = queue
                        .iter()
                        .map(|e| format!("A{}(P:{})", e.id, e.priority))
                        .collect();
                    info!("  S{sector} queue: [{}]", entries.join(", "));
                }
            }
        }
    })
}
