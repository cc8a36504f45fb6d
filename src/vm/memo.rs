//! Elastic memoization table
//!
//! A fixed-capacity, direct-mapped cache from (position, memo id) to the
//! outcome of a rule at that position. There is no probing and no chaining:
//! each key maps to exactly one slot, and recording a new outcome silently
//! evicts whatever occupied it. A lookup only reports a hit when the stored
//! key and state both match, so an evicted entry is indistinguishable from one
//! never recorded and the rule is simply parsed again.
//!
//! # Layout
//!
//! The key packs the position into the high bits and the memo id into the
//! low `shift` bits, where `2^shift` covers every memo id of the program. The
//! table holds `window × 2^shift` slots (window rounded up to a power of two)
//! and a slot is `key & mask`, so the table remembers the last `window`
//! positions of every rule.

use super::node::{NodeArena, NodeId};
use super::program::MemoId;

/// Default number of positions remembered per rule
pub const DEFAULT_MEMO_WINDOW: usize = 32;

const EMPTY_KEY: u64 = u64::MAX;

/// Outcome of a memoized rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoResult {
    /// The rule failed at this position
    Failed,
    /// The rule matched, optionally producing a node
    Matched(Option<NodeId>),
}

/// A memo table slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoEntry {
    key: u64,
    consumed: usize,
    state: u8,
    result: MemoResult,
}

impl MemoEntry {
    const EMPTY: MemoEntry = MemoEntry {
        key: EMPTY_KEY,
        consumed: 0,
        state: 0,
        result: MemoResult::Failed,
    };

    /// Bytes consumed by the rule
    #[inline]
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Recorded outcome
    #[inline]
    pub fn result(&self) -> MemoResult {
        self.result
    }

    /// Whether the recorded outcome is a failure
    #[inline]
    pub fn is_failure(&self) -> bool {
        self.result == MemoResult::Failed
    }

    /// Cached node of a successful match
    #[inline]
    pub fn node(&self) -> Option<NodeId> {
        match self.result {
            MemoResult::Matched(node) => node,
            MemoResult::Failed => None,
        }
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.key == EMPTY_KEY
    }
}

/// Direct-mapped memo table
#[derive(Debug)]
pub struct MemoTable {
    entries: Vec<MemoEntry>,
    shift: u32,
    mask: usize,
}

impl Default for MemoTable {
    fn default() -> Self {
        Self::new(DEFAULT_MEMO_WINDOW, 1)
    }
}

impl MemoTable {
    /// Create a table remembering `window` positions for each of `memo_size` ids
    pub fn new(window: usize, memo_size: u16) -> Self {
        let shift = (memo_size.max(1) as u32).next_power_of_two().trailing_zeros();
        let capacity = window.max(1).next_power_of_two() << shift;

        Self {
            entries: vec![MemoEntry::EMPTY; capacity],
            shift,
            mask: capacity - 1,
        }
    }

    /// Number of slots
    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    #[inline(always)]
    fn key(&self, pos: usize, id: MemoId) -> u64 {
        ((pos as u64) << self.shift) | id as u64
    }

    /// Look up the outcome of rule `id` at `pos` recorded under `state`
    #[inline]
    pub fn lookup(&self, pos: usize, id: MemoId, state: u8) -> Option<MemoEntry> {
        let key = self.key(pos, id);
        let entry = self.entries[key as usize & self.mask];
        (entry.key == key && entry.state == state).then_some(entry)
    }

    /// Record a successful match, retaining `node`
    ///
    /// Returns `true` when a different key was evicted.
    pub fn record(
        &mut self,
        arena: &mut NodeArena,
        pos: usize,
        id: MemoId,
        node: Option<NodeId>,
        consumed: usize,
        state: u8,
    ) -> bool {
        if let Some(node) = node {
            arena.retain(node);
        }
        self.store(arena, pos, id, MemoResult::Matched(node), consumed, state)
    }

    /// Record that rule `id` failed at `pos`
    ///
    /// Returns `true` when a different key was evicted.
    pub fn record_failure(&mut self, arena: &mut NodeArena, pos: usize, id: MemoId, state: u8) -> bool {
        self.store(arena, pos, id, MemoResult::Failed, 0, state)
    }

    fn store(
        &mut self,
        arena: &mut NodeArena,
        pos: usize,
        id: MemoId,
        result: MemoResult,
        consumed: usize,
        state: u8,
    ) -> bool {
        let key = self.key(pos, id);
        let slot = &mut self.entries[key as usize & self.mask];
        let evicted = !slot.is_empty() && slot.key != key;
        let old = std::mem::replace(
            slot,
            MemoEntry {
                key,
                consumed,
                state,
                result,
            },
        );
        if let Some(node) = old.node() {
            arena.release(node);
        }
        evicted
    }

    /// Release every cached node and empty the table
    pub fn dispose(&mut self, arena: &mut NodeArena) {
        for entry in &mut self.entries {
            if let Some(node) = entry.node() {
                arena.release(node);
            }
            *entry = MemoEntry::EMPTY;
        }
    }

    /// Number of occupied slots
    pub fn occupancy(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_empty()).count()
    }

    /// Heap usage in bytes
    #[inline]
    pub fn memory_usage(&self) -> usize {
        self.entries.capacity() * std::mem::size_of::<MemoEntry>()
    }
}
