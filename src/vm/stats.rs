//! Execution statistics
//!
//! Counters are owned by the caller and passed to
//! [`Runtime::execute`](super::runtime::Runtime::execute); a runtime run
//! without a `Stats` does not count anything.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Counters collected while executing a program
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Instructions executed
    pub inst_count: u64,
    /// Failures unwound
    pub fail_count: u64,
    /// Choice frames pushed by `Alt`
    pub alt_count: u64,
    /// Memo lookups answered with a cached match
    pub memo_hit: u64,
    /// Memo lookups answered with a cached failure
    pub memo_fail_hit: u64,
    /// Memo lookups that missed
    pub memo_miss: u64,
    /// Outcomes recorded in the memo table
    pub memo_store: u64,
    /// Records that evicted a different key
    pub memo_evict: u64,
    /// `SMask` executions
    pub sym_mask: u64,
    /// `SDef` executions
    pub sym_def: u64,
    /// `SExists` executions
    pub sym_exists: u64,
    /// `SMatch` and `SIs` lookups
    pub sym_get: u64,
    /// `SIsDef` and `SIsa` lookups
    pub sym_contains: u64,
    /// Calls per nonterminal id
    pub calls: Vec<u64>,
}

impl Stats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every counter
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Ratio of memo lookups that hit (success or failure)
    pub fn memo_hit_rate(&self) -> f64 {
        let hits = self.memo_hit + self.memo_fail_hit;
        let total = hits + self.memo_miss;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    #[inline]
    pub(crate) fn count_call(&mut self, nonterm: u16) {
        let i = nonterm as usize;
        if self.calls.len() <= i {
            self.calls.resize(i + 1, 0);
        }
        self.calls[i] += 1;
    }

    /// Render the counters as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "instructions: {}", self.inst_count)?;
        writeln!(f, "failures:     {}", self.fail_count)?;
        writeln!(f, "alternatives: {}", self.alt_count)?;
        writeln!(
            f,
            "memo:         {} hit, {} fail-hit, {} miss, {} stored, {} evicted ({:.1}% hit rate)",
            self.memo_hit,
            self.memo_fail_hit,
            self.memo_miss,
            self.memo_store,
            self.memo_evict,
            self.memo_hit_rate() * 100.0
        )?;
        write!(
            f,
            "symbols:      {} mask, {} def, {} exists, {} get, {} contains",
            self.sym_mask, self.sym_def, self.sym_exists, self.sym_get, self.sym_contains
        )
    }
}
