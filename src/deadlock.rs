//! Wait-for cycle detection over the arbiter's board.
//!
//! Evaluated under the arbiter lock before every grant decision, including
//! requests for a currently-free sector, so a cycle is refused one step
//! before it would close. The walk follows the single wait-for edge each
//! aircraft can have: requester -> occupant of the wanted sector -> the
//! sector *that* aircraft waits for -> its occupant -> ...

use crate::aircraft::{AircraftId, SectorId};
use crate::arbiter::Board;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Safe to grant the sector, or to queue behind its occupant.
    NoCycle,
    /// Granting (or waiting) would close a cycle and the requester carries
    /// the lowest effective priority in it; it must release what it holds
    /// and retry.
    RetreatSelf,
    /// A cycle was found but a lower-priority participant pays for it; the
    /// requester may queue once that aircraft has been ordered out.
    RetreatOther(AircraftId),
}

/// Decide whether letting `requester` wait on `target` closes a wait-for
/// cycle, and if so who retreats.
pub(crate) fn check(board: &Board, requester: AircraftId, target: SectorId) -> Verdict {
    let Some(blocker) = board.occupants[target] else {
        return Verdict::NoCycle;
    };
    if blocker == requester {
        return Verdict::NoCycle;
    }
    // An aircraft holding nothing cannot appear on a cycle.
    if board.flights[requester].current_sector.is_none() {
        return Verdict::NoCycle;
    }

    let mut visited = vec![false; board.flights.len()];
    let mut min_id = blocker;
    let mut min_priority = u32::MAX;
    let mut current = blocker;

    loop {
        if visited[current] {
            // Looped back into the chain without passing the requester:
            // some other cycle, not ours to resolve here.
            return Verdict::NoCycle;
        }
        visited[current] = true;

        let priority = board.flights[current].priority_effective;
        if priority < min_priority {
            min_priority = priority;
            min_id = current;
        }

        let Some(wanted) = board.flights[current].waiting_for else {
            return Verdict::NoCycle;
        };
        let Some(holder) = board.occupants[wanted] else {
            return Verdict::NoCycle;
        };
        if holder == requester {
            // The hypothetical requester -> blocker edge closes the cycle.
            // Requester loses ties deliberately.
            return if board.flights[requester].priority_effective <= min_priority {
                Verdict::RetreatSelf
            } else {
                Verdict::RetreatOther(min_id)
            };
        }
        current = holder;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::FlightState;

    fn board(sectors: usize, priorities: &[u32]) -> Board {
        Board {
            occupants: vec![None; sectors],
            queues: vec![crate::priority_queue::SectorQueue::new(); sectors],
            flights: priorities.iter().map(|&p| FlightState::new(p)).collect(),
        }
    }

    fn occupy(b: &mut Board, id: AircraftId, sector: SectorId) {
        b.occupants[sector] = Some(id);
        b.flights[id].current_sector = Some(sector);
    }

    fn wait_on(b: &mut Board, id: AircraftId, sector: SectorId) {
        b.flights[id].waiting_for = Some(sector);
        let p = b.flights[id].priority_effective;
        b.queues[sector].insert(id, p);
    }

    #[test]
    fn test_free_sector_is_no_cycle() {
        let mut b = board(2, &[100, 900]);
        occupy(&mut b, 0, 0);
        assert_eq!(check(&b, 0, 1), Verdict::NoCycle);
    }

    #[test]
    fn test_own_sector_is_no_cycle() {
        let mut b = board(2, &[100]);
        occupy(&mut b, 0, 0);
        assert_eq!(check(&b, 0, 0), Verdict::NoCycle);
    }

    #[test]
    fn test_requester_holding_nothing_is_no_cycle() {
        let mut b = board(2, &[100, 900]);
        occupy(&mut b, 1, 1);
        wait_on(&mut b, 1, 0); // 1 waits on a sector nobody holds yet
        assert_eq!(check(&b, 0, 1), Verdict::NoCycle);
    }

    #[test]
    fn test_blocker_not_waiting_is_no_cycle() {
        let mut b = board(2, &[100, 900]);
        occupy(&mut b, 0, 0);
        occupy(&mut b, 1, 1);
        assert_eq!(check(&b, 0, 1), Verdict::NoCycle);
    }

    #[test]
    fn test_head_on_cycle_low_priority_requester_retreats() {
        // 0 holds S0 and asks for S1; 1 holds S1 and already waits on S0.
        let mut b = board(2, &[100, 900]);
        occupy(&mut b, 0, 0);
        occupy(&mut b, 1, 1);
        wait_on(&mut b, 1, 0);
        assert_eq!(check(&b, 0, 1), Verdict::RetreatSelf);
    }

    #[test]
    fn test_head_on_cycle_high_priority_requester_names_victim() {
        let mut b = board(2, &[100, 900]);
        occupy(&mut b, 0, 0);
        occupy(&mut b, 1, 1);
        wait_on(&mut b, 0, 1);
        assert_eq!(check(&b, 1, 0), Verdict::RetreatOther(0));
    }

    #[test]
    fn test_priority_tie_goes_against_requester() {
        let mut b = board(2, &[500, 500]);
        occupy(&mut b, 0, 0);
        occupy(&mut b, 1, 1);
        wait_on(&mut b, 1, 0);
        assert_eq!(check(&b, 0, 1), Verdict::RetreatSelf);
    }

    #[test]
    fn test_three_party_cycle_picks_minimum_on_walk() {
        // 0(800) holds S0 asks S1; 1(300) holds S1 waits S2; 2(450) holds S2 waits S0.
        let mut b = board(3, &[800, 300, 450]);
        occupy(&mut b, 0, 0);
        occupy(&mut b, 1, 1);
        occupy(&mut b, 2, 2);
        wait_on(&mut b, 1, 2);
        wait_on(&mut b, 2, 0);
        assert_eq!(check(&b, 0, 1), Verdict::RetreatOther(1));
    }

    #[test]
    fn test_victim_tie_takes_first_encountered() {
        // Both cycle partners at 300; the one reached first on the walk
        // (the blocker, id 1) is the victim.
        let mut b = board(3, &[800, 300, 300]);
        occupy(&mut b, 0, 0);
        occupy(&mut b, 1, 1);
        occupy(&mut b, 2, 2);
        wait_on(&mut b, 1, 2);
        wait_on(&mut b, 2, 0);
        assert_eq!(check(&b, 0, 1), Verdict::RetreatOther(1));
    }

    #[test]
    fn test_cycle_not_through_requester_is_no_cycle() {
        // 1 and 2 wait on each other's sectors via a stale edge; the chain
        // from 0's request revisits without ever reaching 0.
        let mut b = board(4, &[100, 500, 600]);
        occupy(&mut b, 0, 3);
        occupy(&mut b, 1, 1);
        occupy(&mut b, 2, 2);
        wait_on(&mut b, 1, 2);
        wait_on(&mut b, 2, 1);
        assert_eq!(check(&b, 0, 1), Verdict::NoCycle);
    }

    #[test]
    fn test_chain_ending_in_flight_is_no_cycle() {
        // 0 asks S1 held by 1; 1 waits S2 held by 2; 2 is mid-flight.
        let mut b = board(3, &[100, 500, 600]);
        occupy(&mut b, 0, 0);
        occupy(&mut b, 1, 1);
        occupy(&mut b, 2, 2);
        wait_on(&mut b, 1, 2);
        assert_eq!(check(&b, 0, 1), Verdict::NoCycle);
    }
}
