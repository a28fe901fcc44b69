//! Arena allocation for mixture agents.
//!
//! Provides `AgentId` (a dense, total-orderable identifier) and `AgentArena`
//! (contiguous slot storage with tombstones). The arena stores agent data of a
//! generic type `T`.
//!
//! # Determinism
//! - `AgentId` ordering is by its inner `u32`.
//! - Iteration order over slots is by index (0..capacity).
//! - Slots are never reused: a deallocated slot stays a tombstone for the
//!   lifetime of the arena, so an `AgentId` recorded in any index denotes
//!   either the same agent or a dead one.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense agent identifier for arena-allocated mixtures.
///
/// `AgentId(u32)` is `Copy`, `Eq`, `Ord`, `Hash`. The inner value is an index
/// into the arena's slot array.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(u32);

impl AgentId {
    /// Creates a new `AgentId` from a raw `u32`.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw `u32` index.
    #[inline]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Contiguous storage for agent data with tombstoned deallocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentArena<T> {
    slots: Vec<Option<T>>,
    /// Number of live agents (slots with `Some`).
    live_count: usize,
}

impl<T> AgentArena<T> {
    /// Creates a new empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            live_count: 0,
        }
    }

    /// Allocates a new slot at the end of the arena and returns its id.
    ///
    /// # Panics
    /// Panics if more than `u32::MAX` slots have been allocated.
    pub fn allocate(&mut self, data: T) -> AgentId {
        let idx = u32::try_from(self.slots.len()).expect("agent arena exhausted");
        self.slots.push(Some(data));
        self.live_count += 1;
        AgentId(idx)
    }

    /// Deallocates the slot identified by `id`, returning its data.
    ///
    /// Returns `None` if the slot was out of bounds or already dead. The slot
    /// becomes a tombstone and is never handed out again.
    pub fn deallocate(&mut self, id: AgentId) -> Option<T> {
        let data = self.slots.get_mut(id.index())?.take()?;
        self.live_count -= 1;
        Some(data)
    }

    /// Returns a reference to the data at `id`, if the slot is live.
    pub fn get(&self, id: AgentId) -> Option<&T> {
        self.slots.get(id.index())?.as_ref()
    }

    /// Returns a mutable reference to the data at `id`, if the slot is live.
    pub fn get_mut(&mut self, id: AgentId) -> Option<&mut T> {
        self.slots.get_mut(id.index())?.as_mut()
    }

    /// Returns `true` if `id` denotes a live slot.
    pub fn contains(&self, id: AgentId) -> bool {
        self.get(id).is_some()
    }

    /// Returns the number of live agents.
    pub fn live_count(&self) -> usize {
        self.live_count
    }

    /// Returns the total number of slots ever allocated, tombstones included.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Iterates over live slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (AgentId, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|data| (AgentId(idx as u32), data)))
    }

    /// Iterates over live ids in index order.
    pub fn ids(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.iter().map(|(id, _)| id)
    }
}

impl<T> Default for AgentArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_basic() {
        let mut arena = AgentArena::new();
        let a = arena.allocate("a");
        let b = arena.allocate("b");
        assert_eq!(arena.live_count(), 2);
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.deallocate(a), Some("a"));
        assert_eq!(arena.deallocate(a), None);
        assert!(!arena.contains(a));
        assert!(arena.contains(b));
        assert_eq!(arena.live_count(), 1);
    }

    #[test]
    fn tombstones_are_never_reused() {
        let mut arena = AgentArena::new();
        let a = arena.allocate(1);
        arena.deallocate(a);
        let b = arena.allocate(2);
        assert_ne!(a, b);
        assert_eq!(arena.capacity(), 2);
        assert_eq!(arena.get(a), None);
    }

    #[test]
    fn deterministic_iteration() {
        let mut arena = AgentArena::new();
        let ids: Vec<_> = (0..5).map(|i| arena.allocate(i)).collect();
        arena.deallocate(ids[2]);
        let seen: Vec<_> = arena.iter().map(|(id, v)| (id.as_u32(), *v)).collect();
        assert_eq!(seen, vec![(0, 0), (1, 1), (3, 3), (4, 4)]);
    }
}
