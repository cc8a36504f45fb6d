//! Transactional AST construction log
//!
//! Tree-building instructions do not allocate nodes directly. They append
//! entries to an [`AstLog`]; a rule that succeeds commits the entries logged
//! since its mark into a single [`Node`](super::node::Node), a branch that
//! fails truncates the log back to the mark of its choice frame. Failed
//! alternatives therefore never pay for node allocation.
//!
//! # Entry semantics
//!
//! While materializing a range, entries are interpreted left to right:
//!
//! | Entry | Effect on the node under construction |
//! |-------|---------------------------------------|
//! | `New(pos)` | start over: span starts at `pos`, no children, no tag |
//! | `Capture(pos)` | span ends at `pos` |
//! | `Tag(t)` / `Replace(s)` | set tag / replacement value |
//! | `Link(label, node)` | add `node` as the next child |
//! | `Swap(pos, label)` | finish the current node and make it child 0 (under `label`) of a new node starting at `pos` |
//! | `Push` ... `Pop(label)` | build the enclosed entries into a nested node linked under `label` |

use super::node::{NodeArena, NodeId};
use super::program::{StrId, TagId, NO_TAG};

/// Log length at the time of a save; passed back to commit or roll back
pub type AstMark = usize;

/// Default initial capacity of the log
pub const DEFAULT_AST_LOG_CAPACITY: usize = 128;

/// One logged tree-construction operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEntry {
    /// Open a node at a position
    New {
        /// Start offset
        pos: usize,
    },
    /// Close the current node's span at a position
    Capture {
        /// End offset
        pos: usize,
    },
    /// Tag the current node
    Tag {
        /// Tag id
        tag: TagId,
    },
    /// Attach a replacement value to the current node
    Replace {
        /// String id
        value: StrId,
    },
    /// Open a nested node
    Push,
    /// Close the nested node opened by the matching `Push`
    Pop {
        /// Label of the nested node within its parent
        label: TagId,
    },
    /// Left fold: the current node becomes the first child of a new one
    Swap {
        /// Start offset of the new node
        pos: usize,
        /// Label of the folded node
        label: TagId,
    },
    /// A committed child
    Link {
        /// Label within the parent
        label: TagId,
        /// Retained child node
        node: NodeId,
        /// Entries covered by this link (nested push/pop ranges)
        shift: usize,
    },
}

impl LogEntry {
    fn position(&self) -> usize {
        match *self {
            LogEntry::New { pos } | LogEntry::Capture { pos } | LogEntry::Swap { pos, .. } => pos,
            _ => 0,
        }
    }
}

/// Append-only log of pending tree construction
#[derive(Debug, Default)]
pub struct AstLog {
    entries: Vec<LogEntry>,
    /// Most recent link and the log index it was written at
    last_linked: Option<(usize, NodeId)>,
    parsed: Option<NodeId>,
}

impl AstLog {
    /// Create a log with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_AST_LOG_CAPACITY)
    }

    /// Create a log with room for `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            last_linked: None,
            parsed: None,
        }
    }

    /// Number of pending entries
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pending entries, oldest first
    #[inline]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Mark the current end of the log
    #[inline]
    pub fn save_tx(&self) -> AstMark {
        self.entries.len()
    }

    /// Discard every entry after `mark`, releasing the nodes they link
    ///
    /// # Panics
    /// Panics if `mark` lies beyond the end of the log.
    pub fn rollback_tx(&mut self, arena: &mut NodeArena, mark: AstMark) {
        assert!(
            mark <= self.entries.len(),
            "stale AST mark {} (log length {})",
            mark,
            self.entries.len()
        );
        for entry in &self.entries[mark..] {
            if let LogEntry::Link { node, .. } = *entry {
                arena.release(node);
            }
        }
        self.entries.truncate(mark);
        if matches!(self.last_linked, Some((at, _)) if at >= mark) {
            self.last_linked = self.find_last_link();
        }
    }

    /// Newest `Link` entry still in the log
    fn find_last_link(&self) -> Option<(usize, NodeId)> {
        self.entries
            .iter()
            .enumerate()
            .rev()
            .find_map(|(at, entry)| match *entry {
                LogEntry::Link { node, .. } => Some((at, node)),
                _ => None,
            })
    }

    /// Materialize the entries after `mark` into one node and link it under `label`
    ///
    /// Committing an empty range does nothing.
    ///
    /// # Panics
    /// Panics if `mark` lies beyond the end of the log.
    pub fn commit_tx(&mut self, arena: &mut NodeArena, label: TagId, mark: AstMark) {
        assert!(
            mark <= self.entries.len(),
            "stale AST mark {} (log length {})",
            mark,
            self.entries.len()
        );
        if mark == self.entries.len() {
            return;
        }
        let node = self.create_node(arena, mark, None);
        self.rollback_tx(arena, mark);
        self.log_link(arena, label, node);
    }

    /// Log the start of a node
    #[inline]
    pub fn log_new(&mut self, pos: usize) {
        self.entries.push(LogEntry::New { pos });
    }

    /// Log the end of the current node's span
    #[inline]
    pub fn log_capture(&mut self, pos: usize) {
        self.entries.push(LogEntry::Capture { pos });
    }

    /// Log a tag
    #[inline]
    pub fn log_tag(&mut self, tag: TagId) {
        self.entries.push(LogEntry::Tag { tag });
    }

    /// Log a replacement value
    #[inline]
    pub fn log_replace(&mut self, value: StrId) {
        self.entries.push(LogEntry::Replace { value });
    }

    /// Log the start of a nested node
    #[inline]
    pub fn log_push(&mut self) {
        self.entries.push(LogEntry::Push);
    }

    /// Log the end of a nested node
    #[inline]
    pub fn log_pop(&mut self, label: TagId) {
        self.entries.push(LogEntry::Pop { label });
    }

    /// Log a left fold at `pos`
    #[inline]
    pub fn log_swap(&mut self, pos: usize, label: TagId) {
        self.entries.push(LogEntry::Swap { pos, label });
    }

    /// Link an existing node, retaining it for as long as the entry lives
    pub fn log_link(&mut self, arena: &mut NodeArena, label: TagId, node: NodeId) {
        arena.retain(node);
        self.last_linked = Some((self.entries.len(), node));
        self.entries.push(LogEntry::Link {
            label,
            node,
            shift: 0,
        });
    }

    /// Node of the most recent link still in the log
    #[inline]
    pub fn last_linked_node(&self) -> Option<NodeId> {
        self.last_linked.map(|(_, node)| node)
    }

    /// Build the final tree from the first `New` entry and empty the log
    ///
    /// The first call retains the tree once on behalf of the caller, who must
    /// eventually release it. Later calls return the same node.
    pub fn parsed_node(&mut self, arena: &mut NodeArena) -> Option<NodeId> {
        if self.parsed.is_some() {
            return self.parsed;
        }
        let start = self
            .entries
            .iter()
            .position(|e| matches!(e, LogEntry::New { .. }));
        let parsed = start.map(|start| self.create_node(arena, start, None));
        if let Some(node) = parsed {
            arena.retain(node);
        }
        self.rollback_tx(arena, 0);
        self.parsed = parsed;
        parsed
    }

    /// Drop all pending entries and forget the parsed tree
    ///
    /// The parsed tree itself belongs to whoever called `parsed_node` and is
    /// not released here.
    pub fn reset(&mut self, arena: &mut NodeArena) {
        self.rollback_tx(arena, 0);
        self.last_linked = None;
        self.parsed = None;
    }

    /// Build a node from `start` to the end of the log, or up to the `Pop`
    /// matching `pushed`
    fn create_node(&mut self, arena: &mut NodeArena, start: usize, pushed: Option<usize>) -> NodeId {
        let tail = self.entries.len();
        let mut head = start;
        let mut spos = self.entries.get(start).map_or(0, LogEntry::position);
        let mut epos = spos;
        let mut tag = NO_TAG;
        let mut value = None;
        let mut size = 0;

        let mut cur = start;
        while cur < tail {
            match self.entries[cur] {
                LogEntry::New { pos } => {
                    spos = pos;
                    epos = pos;
                    size = 0;
                    tag = NO_TAG;
                    value = None;
                    head = cur;
                }
                LogEntry::Capture { pos } => epos = pos,
                LogEntry::Tag { tag: t } => tag = t,
                LogEntry::Replace { value: v } => value = Some(v),
                LogEntry::Swap { pos, label } => {
                    let node = self.construct(arena, head, cur, spos, epos, size, tag, value);
                    arena.retain(node);
                    self.entries[cur] = LogEntry::Link {
                        label,
                        node,
                        shift: 0,
                    };
                    spos = pos;
                    tag = NO_TAG;
                    value = None;
                    size = 1;
                    head = cur;
                }
                LogEntry::Pop { label } => {
                    // A pop without a push belongs to an enclosing range; ignore it
                    if let Some(p) = pushed {
                        let node = self.construct(arena, head, cur, spos, epos, size, tag, value);
                        arena.retain(node);
                        self.entries[p] = LogEntry::Link {
                            label,
                            node,
                            shift: cur - p,
                        };
                        return node;
                    }
                }
                LogEntry::Push => {
                    self.create_node(arena, cur + 1, Some(cur));
                    size += 1;
                    if let LogEntry::Link { shift, .. } = self.entries[cur] {
                        cur += shift;
                    }
                }
                LogEntry::Link { shift, .. } => {
                    size += 1;
                    cur += shift;
                }
            }
            cur += 1;
        }

        let node = self.construct(arena, head, tail, spos, epos, size, tag, value);
        if let Some(p) = pushed {
            // Unclosed push: the nested node runs to the end of the log
            arena.retain(node);
            self.entries[p] = LogEntry::Link {
                label: NO_TAG,
                node,
                shift: tail - 1 - p,
            };
        }
        node
    }

    /// Allocate a node and attach the links found in `head..end` as children
    #[allow(clippy::too_many_arguments)]
    fn construct(
        &self,
        arena: &mut NodeArena,
        head: usize,
        end: usize,
        spos: usize,
        epos: usize,
        size: usize,
        tag: TagId,
        value: Option<StrId>,
    ) -> NodeId {
        let node = arena.alloc(tag, spos, epos.saturating_sub(spos), size, value);
        let mut n = 0;
        let mut cur = head;
        while cur < end && n < size {
            if let LogEntry::Link {
                label,
                node: child,
                shift,
            } = self.entries[cur]
            {
                arena.set(node, n, label, child);
                n += 1;
                cur += shift;
            }
            cur += 1;
        }
        node
    }
}
