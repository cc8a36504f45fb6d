//! Backtracking symbol table
//!
//! Symbols are bound by appending entries; a mask entry opens a scope in
//! which a table has no binding until something is added after it. Lookups
//! scan from the most recent entry downward and stop at the first entry for
//! the requested table. A savepoint is the current length and rolling back
//! truncates to it, which is how the dispatch loop undoes symbol definitions
//! made on a failed branch.
//!
//! Tokens are spans of the input buffer; the table never copies input bytes.

use super::program::TagId;
use std::hash::Hasher;

/// Length of the symbol log at a savepoint
pub type SymbolMark = usize;

/// A span of the input bound to a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    /// Start offset
    pub start: usize,
    /// End offset (exclusive)
    pub end: usize,
}

impl Token {
    /// Create a token covering `start..end`
    #[inline]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// The token's bytes within `input`
    #[inline]
    pub fn bytes<'a>(&self, input: &'a [u8]) -> &'a [u8] {
        &input[self.start..self.end]
    }
}

#[derive(Debug, Clone, Copy)]
struct SymbolEntry {
    seq: u32,
    hash: u64,
    table: TagId,
    /// `None` marks a scope mask
    token: Option<Token>,
}

/// Stack of symbol bindings with masks and savepoints
#[derive(Debug, Default)]
pub struct SymbolTable {
    entries: Vec<SymbolEntry>,
    seq: u32,
}

#[inline]
fn content_hash(bytes: &[u8]) -> u64 {
    let mut hasher = ahash::AHasher::default();
    hasher.write(bytes);
    hasher.finish()
}

impl SymbolTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, masks included
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, table: TagId, token: Option<Token>, hash: u64) {
        self.seq = self.seq.wrapping_add(1);
        self.entries.push(SymbolEntry {
            seq: self.seq,
            hash,
            table,
            token,
        });
    }

    /// Open a scope in which `table` has no visible symbol
    pub fn add_mask(&mut self, table: TagId) {
        self.push(table, None, 0);
    }

    /// Bind `token` in `table`
    pub fn add(&mut self, table: TagId, token: Token, input: &[u8]) {
        let hash = content_hash(token.bytes(input));
        self.push(table, Some(token), hash);
    }

    /// Nearest entry for `table`, masks included
    #[inline]
    fn nearest(&self, table: TagId) -> Option<&SymbolEntry> {
        self.entries.iter().rev().find(|e| e.table == table)
    }

    /// Whether `table` has a visible symbol
    pub fn has_symbol(&self, table: TagId) -> bool {
        self.nearest(table).is_some_and(|e| e.token.is_some())
    }

    /// The visible symbol of `table`, if any
    pub fn get_symbol(&self, table: TagId) -> Option<Token> {
        self.nearest(table).and_then(|e| e.token)
    }

    /// Whether `bytes` is bound in `table` within the current scope
    pub fn contains(&self, table: TagId, bytes: &[u8], input: &[u8]) -> bool {
        let hash = content_hash(bytes);
        for entry in self.entries.iter().rev().filter(|e| e.table == table) {
            match entry.token {
                None => return false,
                Some(token) if entry.hash == hash && token.bytes(input) == bytes => return true,
                Some(_) => {}
            }
        }
        false
    }

    /// Sequence number of the most recent entry
    #[inline]
    pub fn last_seq(&self) -> u32 {
        self.entries.last().map_or(0, |e| e.seq)
    }

    /// Mark the current state
    #[inline]
    pub fn savepoint(&self) -> SymbolMark {
        self.entries.len()
    }

    /// Discard every entry added after `mark`
    ///
    /// # Panics
    /// Panics if `mark` lies beyond the end of the table.
    #[inline]
    pub fn rollback(&mut self, mark: SymbolMark) {
        assert!(
            mark <= self.entries.len(),
            "stale symbol savepoint {} (table length {})",
            mark,
            self.entries.len()
        );
        self.entries.truncate(mark);
    }

    /// Remove all entries
    pub fn clear(&mut self) {
        self.entries.clear();
        self.seq = 0;
    }
}
