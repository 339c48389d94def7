//! Per-sector waiting queue, ordered by effective priority.
//!
//! Highest priority sits at the head; equal priorities keep arrival order
//! (first in, first out). Entries snapshot the aircraft's effective
//! priority at insertion time; a queued aircraft is suspended and cannot
//! change its own priority, so the snapshot never goes stale.

use std::collections::VecDeque;

use serde::Serialize;

use crate::aircraft::AircraftId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    pub id: AircraftId,
    pub priority: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SectorQueue {
    entries: VecDeque<QueueEntry>,
}

impl SectorQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert keeping priorities monotone non-increasing head-to-tail,
    /// after any already-queued entry of the same priority.
    pub fn insert(&mut self, id: AircraftId, priority: u32) {
        let at = self
            .entries
            .iter()
            .position(|e| e.priority < priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(at, QueueEntry { id, priority });
    }

    /// Remove and return the head entry.
    pub fn pop_highest(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    pub fn peek(&self) -> Option<&QueueEntry> {
        self.entries.front()
    }

    /// Move the head to the tail.
    pub fn rotate(&mut self) {
        if let Some(head) = self.entries.pop_front() {
            self.entries.push_back(head);
        }
    }

    /// Remove the first entry for `id`; returns whether one was found.
    pub fn remove(&mut self, id: AircraftId) -> bool {
        match self.entries.iter().position(|e| e.id == id) {
            Some(at) => {
                self.entries.remove(at);
                true
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Copy of the queue contents, head first. Used by the radar display
    /// and by tests asserting queue order.
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.entries.iter().copied().collect()
    }
}
