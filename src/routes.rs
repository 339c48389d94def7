//! Random route generation.
//!
//! Routes mostly creep between neighboring sectors with an occasional small
//! hop, which produces far more sector contention between aircraft than
//! uniform sampling would.

use rand::RngExt;

use crate::aircraft::SectorId;

/// Pick a route length between half and one-and-a-half times the sector
/// count, floored at 3.
pub fn route_length<R: RngExt + ?Sized>(rng: &mut R, sectors: usize) -> usize {
    let min = (sectors / 2).max(3);
    let max = (sectors * 3 / 2).max(min + 5);
    rng.random_range(min..=max)
}

/// Generate a route of `length` sectors over `sectors` total: 70% of steps
/// advance to the next sector, 20% step back, 10% hop 1-3 sectors in a
/// random direction.
pub fn random_route<R: RngExt + ?Sized>(
    rng: &mut R,
    sectors: usize,
    length: usize,
) -> Vec<SectorId> {
    let mut route = Vec::with_capacity(length);
    let mut current = rng.random_range(0..sectors);
    route.push(current);
    for _ in 1..length {
        let roll = rng.random_range(0..100);
        current = if roll < 70 {
            (current + 1) % sectors
        } else if roll < 90 {
            (current + sectors - 1) % sectors
        } else {
            let hop = rng.random_range(1..=3) % sectors;
            if rng.random_range(0..2) == 0 {
                (current + hop) % sectors
            } else {
                (current + sectors - hop) % sectors
            }
        };
        route.push(current);
    }
    route
}
