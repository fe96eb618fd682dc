//! Short-term memory: a fixed number of prioritised slots per session.
//!
//! ## Eviction
//!
//! When the bank is full, the slot with the smallest
//! `(priority, access_count, created_at, position)` is replaced. The tuple
//! is a total order, so identical bank states always evict the same slot.

use std::cmp::Reverse;

use memory_types::MemorySlot;

/// Per-session slot bank. `slots.len() <= max_slots` holds after every call.
#[derive(Debug, Clone)]
pub struct ShortTermMemoryBank {
    session_id: String,
    slots: Vec<MemorySlot>,
    max_slots: usize,
}

impl ShortTermMemoryBank {
    pub fn new(session_id: impl Into<String>, max_slots: usize) -> Self {
        Self {
            session_id: session_id.into(),
            slots: Vec::with_capacity(max_slots),
            max_slots,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.max_slots
    }

    /// Index of the slot that would be evicted next.
    pub fn eviction_candidate(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .min_by_key(|(idx, slot)| (slot.priority, slot.access_count, slot.created_at, *idx))
            .map(|(idx, _)| idx)
    }

    /// Insert `slot`, replacing the eviction candidate when full.
    /// Returns the evicted slot.
    pub fn insert(&mut self, slot: MemorySlot) -> Option<MemorySlot> {
        if self.max_slots == 0 {
            return None;
        }
        if !self.is_full() {
            self.slots.push(slot);
            return None;
        }
        let idx = self.eviction_candidate()?;
        Some(std::mem::replace(&mut self.slots[idx], slot))
    }

    /// Up to `n` slots by `(priority desc, access_count desc)`.
    ///
    /// Every returned slot is touched in the bank; the returned copies
    /// reflect the bumped counters.
    pub fn take_top(&mut self, n: usize) -> Vec<MemorySlot> {
        let mut order: Vec<usize> = (0..self.slots.len()).collect();
        order.sort_by_key(|&idx| {
            let slot = &self.slots[idx];
            (
                Reverse(slot.priority),
                Reverse(slot.access_count),
                Reverse(slot.created_at),
                idx,
            )
        });
        order.truncate(n);

        order
            .into_iter()
            .map(|idx| {
                let slot = &mut self.slots[idx];
                slot.touch();
                slot.clone()
            })
            .collect()
    }

    /// Slots in bank order.
    pub fn slots(&self) -> &[MemorySlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
