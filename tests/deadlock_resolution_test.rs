//! Deadlock detection, victim selection, and the anti-starvation boost,
//! exercised end to end.

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use clearance::agent::fly_route;
use clearance::aircraft::Aircraft;
use clearance::arbiter::{Arbiter, PRIORITY_BOOST};

fn spawn_request(
    arbiter: &Arc<Arbiter>,
    aircraft: &Arc<Aircraft>,
    sector: usize,
) -> tokio::task::JoinHandle<()> {
    let (arbiter, aircraft) = (arbiter.clone(), aircraft.clone());
    tokio::spawn(async move {
        arbiter.request(&aircraft, sector).await.unwrap();
    })
}

async fn join(label: &str, handle: tokio::task::JoinHandle<()>) {
    timeout(Duration::from_secs(5), handle)
        .await
        .unwrap_or_else(|_| panic!("{label} did not complete"))
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_head_on_deadlock_resolves_against_low_priority() {
    // Two aircraft crossing the same two sectors in opposite directions.
    // Exactly one cycle is detected, the priority-100 aircraft retreats,
    // and both routes still complete.
    let fleet = vec![
        Arc::new(Aircraft::new(0, 100, vec![0, 1])),
        Arc::new(Aircraft::new(1, 900, vec![1, 0])),
    ];
    let arbiter = Arc::new(Arbiter::new(2, &fleet));
    let cancel = CancellationToken::new();

    let handles: Vec<_> = fleet
        .iter()
        .map(|a| {
            tokio::spawn(fly_route(
                a.clone(),
                arbiter.clone(),
                cancel.clone(),
                StdRng::seed_from_u64(20 + a.id as u64),
            ))
        })
        .collect();
    for handle in handles {
        timeout(Duration::from_secs(30), handle).await.unwrap().unwrap();
    }

    let report = arbiter.report().await;
    assert_eq!(report.deadlocks_detected, 1);
    assert_eq!(report.forced_retreats, 1);
    assert_eq!(report.boosts_applied, 0);
    // 0 and 1 each granted twice: their first sectors, then the swap.
    assert_eq!(report.grants, 4);

    let snap = arbiter.snapshot().await;
    assert!(snap.occupants.iter().all(|o| o.is_none()));
    assert!(snap.queues.iter().all(|q| q.is_empty()));
}

/// A scripted starvation scenario. Aircraft 0 (priority 1) is forced to
/// retreat twice without an intervening handover, earning the boost; the
/// boosted priority then wins a cycle resolution against a peer that would
/// otherwise have outranked it.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_retreats_boost_priority_and_win_next_cycle() {
    let fleet = vec![
        Arc::new(Aircraft::new(0, 1, vec![0, 1, 2])),
        Arc::new(Aircraft::new(1, 650, vec![1, 0])),
        Arc::new(Aircraft::new(2, 600, vec![2, 1])),
    ];
    let arbiter = Arc::new(Arbiter::new(3, &fleet));
    let (a0, a1, a2) = (&fleet[0], &fleet[1], &fleet[2]);

    // --- Retreat 1: 0 holds S0, 1 holds S1 and waits for S0; 0's request
    // for S1 closes the cycle and 0 is the lowest priority in it.
    arbiter.request(a0, 0).await.unwrap();
    arbiter.request(a1, 1).await.unwrap();
    let t1 = spawn_request(&arbiter, a1, 0);
    sleep(Duration::from_millis(100)).await;
    let t0 = spawn_request(&arbiter, a0, 1);
    join("aircraft 1 taking S0", t1).await;
    // Free S1 while 0 is still backing off so its retry regains a sector
    // without a handover (which would clear the retreat count).
    arbiter.release(a1, 1).await;
    join("aircraft 0 taking S1", t0).await;

    let status = arbiter.aircraft_status(0).await.unwrap();
    assert_eq!(status.current_sector, Some(1));
    assert_eq!(status.retreat_count, 1);
    assert_eq!(status.priority_effective, 1);

    // --- Retreat 2: same squeeze with aircraft 2 around S1/S2. The second
    // consecutive retreat triggers the boost.
    arbiter.request(a2, 2).await.unwrap();
    let t2 = spawn_request(&arbiter, a2, 1);
    sleep(Duration::from_millis(100)).await;
    let t0b = spawn_request(&arbiter, a0, 2);
    join("aircraft 2 taking S1", t2).await;
    arbiter.release(a2, 2).await;
    join("aircraft 0 taking S2", t0b).await;

    let status = arbiter.aircraft_status(0).await.unwrap();
    assert_eq!(status.current_sector, Some(2));
    assert_eq!(status.retreat_count, 2);
    assert_eq!(status.priority_effective, 1 + PRIORITY_BOOST);
    assert_eq!(arbiter.stats().boosts_applied(), 1);

    // --- The boosted aircraft now outranks aircraft 1 (650) in victim
    // selection: when 0 requests S0 and closes a cycle with 1, it is 1
    // that gets ordered out.
    let t1b = spawn_request(&arbiter, a1, 2);
    sleep(Duration::from_millis(100)).await;
    let t0c = spawn_request(&arbiter, a0, 0);
    join("boosted aircraft 0 taking S0", t0c).await;

    let victim = arbiter.aircraft_status(1).await.unwrap();
    assert_eq!(victim.retreat_count, 1, "aircraft 1 should have been the victim");
    let winner = arbiter.aircraft_status(0).await.unwrap();
    assert_eq!(winner.current_sector, Some(0));
    // the handover that completed the win spends the boost
    assert_eq!(winner.priority_effective, 1);
    assert_eq!(winner.retreat_count, 0);

    // Unwind: give S2 to aircraft 1, then clear the board. Aircraft 2
    // still holds S1 from the handover in retreat 2.
    sleep(Duration::from_millis(200)).await;
    arbiter.release(a0, 2).await;
    join("aircraft 1 taking S2", t1b).await;
    arbiter.release(a1, 2).await;
    arbiter.release(a2, 1).await;
    arbiter.release(a0, 0).await;

    let report = arbiter.report().await;
    assert_eq!(report.deadlocks_detected, 3);
    assert_eq!(report.forced_retreats, 3);
    assert_eq!(report.boosts_applied, 1);
    assert_eq!(report.grants, 9);
    assert!(arbiter.snapshot().await.occupants.iter().all(|o| o.is_none()));
}
