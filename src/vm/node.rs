//! Reference-counted parse tree nodes
//!
//! Nodes live in a [`NodeArena`] and are addressed by [`NodeId`]. Each node
//! carries a reference count: linking a node (as a child, into the AST log or
//! into the memo table) retains it, unlinking releases it. When the count
//! drops to zero the node is swept, its children are released in turn, and
//! its slot goes onto a free-index stack for reuse by later allocations.
//!
//! Nodes with at most two children keep them inline; the third child spills
//! the list onto the heap.

use super::program::{StrId, TagId};
use std::fmt;

/// Handle to a node in a [`NodeArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Index of the node's slot in the arena
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A labeled link from a parent to a child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// Label of the child within its parent (0 = unlabeled)
    pub label: TagId,
    /// The child node
    pub node: NodeId,
}

/// Number of children stored without a heap allocation
pub const INLINE_CHILDREN: usize = 2;

/// Child list of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Children {
    /// Up to [`INLINE_CHILDREN`] slots stored in the node itself
    Inline {
        /// Number of slots in use
        len: u8,
        /// Slot storage; slots at `len..` are always `None`
        slots: [Option<Edge>; INLINE_CHILDREN],
    },
    /// Heap storage once the list outgrows the inline slots
    Heap(Vec<Option<Edge>>),
}

impl Default for Children {
    fn default() -> Self {
        Children::Inline {
            len: 0,
            slots: [None; INLINE_CHILDREN],
        }
    }
}

impl Children {
    /// Create a list of `len` empty slots
    pub fn with_len(len: usize) -> Self {
        if len <= INLINE_CHILDREN {
            Children::Inline {
                len: len as u8,
                slots: [None; INLINE_CHILDREN],
            }
        } else {
            Children::Heap(vec![None; len])
        }
    }

    /// Number of slots (filled or not)
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Children::Inline { len, .. } => *len as usize,
            Children::Heap(v) => v.len(),
        }
    }

    /// Whether the list has no slots
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the list still lives inline
    #[inline]
    pub fn is_inline(&self) -> bool {
        matches!(self, Children::Inline { .. })
    }

    /// Get the edge in slot `i`
    #[inline]
    pub fn get(&self, i: usize) -> Option<Edge> {
        self.as_slice().get(i).copied().flatten()
    }

    /// All slots in order
    #[inline]
    pub fn as_slice(&self) -> &[Option<Edge>] {
        match self {
            Children::Inline { len, slots } => &slots[..*len as usize],
            Children::Heap(v) => v,
        }
    }

    /// Iterate over filled slots
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.as_slice().iter().flatten().copied()
    }

    /// Make sure slot `i` exists, spilling to the heap when needed
    fn ensure_slot(&mut self, i: usize) {
        if i < self.len() {
            return;
        }
        match self {
            Children::Inline { len, .. } if i < INLINE_CHILDREN => {
                *len = (i + 1) as u8;
            }
            Children::Inline { len, slots } => {
                let mut heap = Vec::with_capacity(i + 1);
                heap.extend_from_slice(&slots[..*len as usize]);
                heap.resize(i + 1, None);
                *self = Children::Heap(heap);
            }
            Children::Heap(v) => v.resize(i + 1, None),
        }
    }

    /// Replace slot `i`, growing the list if needed; returns the previous edge
    fn replace(&mut self, i: usize, edge: Edge) -> Option<Edge> {
        self.ensure_slot(i);
        match self {
            Children::Inline { slots, .. } => slots[i].replace(edge),
            Children::Heap(v) => v[i].replace(edge),
        }
    }
}

/// A parse tree node
#[derive(Debug, Clone, Default)]
pub struct Node {
    tag: TagId,
    start: usize,
    len: usize,
    value: Option<StrId>,
    children: Children,
    refc: u32,
    live: bool,
}

impl Node {
    /// Tag id (0 = untagged)
    #[inline]
    pub fn tag(&self) -> TagId {
        self.tag
    }

    /// Start offset of the matched span
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    /// End offset (exclusive) of the matched span
    #[inline]
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// Length of the matched span in bytes
    #[inline]
    pub fn span_len(&self) -> usize {
        self.len
    }

    /// Replacement value set by `TReplace`, if any
    #[inline]
    pub fn value(&self) -> Option<StrId> {
        self.value
    }

    /// The matched bytes of `input`
    pub fn text<'a>(&self, input: &'a [u8]) -> &'a [u8] {
        let end = self.end().min(input.len());
        &input[self.start.min(end)..end]
    }

    /// Child list
    #[inline]
    pub fn children(&self) -> &Children {
        &self.children
    }

    /// Number of child slots
    #[inline]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Current reference count
    #[inline]
    pub fn refcount(&self) -> u32 {
        self.refc
    }
}

/// Allocation counters of a [`NodeArena`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Nodes handed out by `alloc`
    pub allocated: u64,
    /// Nodes swept back onto the free stack
    pub freed: u64,
    /// Allocations served from the free stack
    pub reused: u64,
    /// Largest number of simultaneously live nodes
    pub high_water: usize,
}

/// Slot pool of nodes with a free-index stack
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: Vec<Node>,
    free: Vec<NodeId>,
    sweep: Vec<NodeId>,
    stats: ArenaStats,
}

impl NodeArena {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an arena with room for `capacity` nodes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Allocate a node with `child_count` empty child slots and a refcount of zero
    pub fn alloc(
        &mut self,
        tag: TagId,
        start: usize,
        len: usize,
        child_count: usize,
        value: Option<StrId>,
    ) -> NodeId {
        let node = Node {
            tag,
            start,
            len,
            value,
            children: Children::with_len(child_count),
            refc: 0,
            live: true,
        };

        self.stats.allocated += 1;
        let id = match self.free.pop() {
            Some(id) => {
                self.stats.reused += 1;
                self.nodes[id.index()] = node;
                id
            }
            None => {
                let id = NodeId(self.nodes.len() as u32);
                self.nodes.push(node);
                id
            }
        };
        self.stats.high_water = self.stats.high_water.max(self.live_count());
        id
    }

    /// Borrow a live node
    ///
    /// # Panics
    /// Panics if `id` refers to a swept slot.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        let node = &self.nodes[id.index()];
        assert!(node.live, "access to freed node {}", id);
        node
    }

    /// Get the child in slot `i`, or `None` when the slot is out of range or empty
    #[inline]
    pub fn get(&self, parent: NodeId, i: usize) -> Option<NodeId> {
        self.node(parent).children.get(i).map(|e| e.node)
    }

    /// Get the label of slot `i`
    #[inline]
    pub fn label(&self, parent: NodeId, i: usize) -> Option<TagId> {
        self.node(parent).children.get(i).map(|e| e.label)
    }

    /// Store `child` in slot `i` of `parent`, growing the child list if needed
    ///
    /// The new child is retained before the previous occupant is released, so
    /// re-setting a slot to its current child is safe.
    pub fn set(&mut self, parent: NodeId, i: usize, label: TagId, child: NodeId) {
        self.retain(child);
        let old = self.nodes[parent.index()]
            .children
            .replace(i, Edge { label, node: child });
        if let Some(old) = old {
            self.release(old.node);
        }
    }

    /// Append `child` after the last slot of `parent`
    pub fn append(&mut self, parent: NodeId, label: TagId, child: NodeId) {
        let i = self.node(parent).child_count();
        self.set(parent, i, label, child);
    }

    /// Increment the reference count of a node
    #[inline]
    pub fn retain(&mut self, id: NodeId) {
        let node = &mut self.nodes[id.index()];
        assert!(node.live, "retain of freed node {}", id);
        node.refc += 1;
    }

    /// Decrement the reference count of a node, sweeping it at zero
    ///
    /// Sweeping releases every child; the cascade runs on an explicit stack
    /// so deep trees cannot exhaust the call stack.
    ///
    /// # Panics
    /// Panics if the node is already at zero or has been swept.
    pub fn release(&mut self, id: NodeId) {
        let mut pending = std::mem::take(&mut self.sweep);
        pending.push(id);

        while let Some(id) = pending.pop() {
            let node = &mut self.nodes[id.index()];
            assert!(
                node.live && node.refc > 0,
                "release of node {} with zero refcount",
                id
            );
            node.refc -= 1;
            if node.refc > 0 {
                continue;
            }

            let children = std::mem::take(&mut node.children);
            node.live = false;
            node.value = None;
            pending.extend(children.edges().map(|e| e.node));
            self.free.push(id);
            self.stats.freed += 1;
        }

        self.sweep = pending;
    }

    /// Reference count of a node, or `None` once it has been swept
    #[inline]
    pub fn refcount(&self, id: NodeId) -> Option<u32> {
        self.nodes
            .get(id.index())
            .filter(|n| n.live)
            .map(|n| n.refc)
    }

    /// Whether `id` refers to a live node
    #[inline]
    pub fn is_live(&self, id: NodeId) -> bool {
        self.nodes.get(id.index()).is_some_and(|n| n.live)
    }

    /// Number of live nodes
    #[inline]
    pub fn live_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Allocation counters
    #[inline]
    pub fn stats(&self) -> ArenaStats {
        self.stats
    }

    /// Drop every node and forget all counters
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.sweep.clear();
        self.stats = ArenaStats::default();
    }

    /// Approximate heap usage in bytes
    pub fn memory_usage(&self) -> usize {
        let spilled: usize = self
            .nodes
            .iter()
            .map(|n| match &n.children {
                Children::Heap(v) => v.capacity() * std::mem::size_of::<Option<Edge>>(),
                Children::Inline { .. } => 0,
            })
            .sum();
        self.nodes.capacity() * std::mem::size_of::<Node>()
            + (self.free.capacity() + self.sweep.capacity()) * std::mem::size_of::<NodeId>()
            + spilled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_get() {
        let mut arena = NodeArena::new();
        let n = arena.alloc(3, 4, 2, 1, None);
        assert_eq!(arena.node(n).tag(), 3);
        assert_eq!(arena.node(n).end(), 6);
        assert_eq!(arena.node(n).child_count(), 1);
        assert_eq!(arena.get(n, 0), None);
        assert_eq!(arena.get(n, 5), None);
        assert_eq!(arena.refcount(n), Some(0));
    }

    #[test]
    fn test_inline_spills_on_third_child() {
        let mut arena = NodeArena::new();
        let parent = arena.alloc(0, 0, 0, 0, None);
        let kids: Vec<_> = (0..3).map(|i| arena.alloc(0, i, 1, 0, None)).collect();

        arena.append(parent, 0, kids[0]);
        arena.append(parent, 7, kids[1]);
        assert!(arena.node(parent).children().is_inline());

        arena.append(parent, 0, kids[2]);
        let children = arena.node(parent).children();
        assert!(!children.is_inline());
        assert_eq!(children.len(), 3);
        assert_eq!(arena.get(parent, 0), Some(kids[0]));
        assert_eq!(arena.get(parent, 1), Some(kids[1]));
        assert_eq!(arena.label(parent, 1), Some(7));
        assert_eq!(arena.get(parent, 2), Some(kids[2]));
    }

    #[test]
    fn test_set_grows_and_replaces() {
        let mut arena = NodeArena::new();
        let parent = arena.alloc(0, 0, 0, 0, None);
        let a = arena.alloc(0, 0, 1, 0, None);
        let b = arena.alloc(0, 1, 1, 0, None);
        arena.retain(parent);

        arena.set(parent, 4, 0, a);
        assert_eq!(arena.node(parent).child_count(), 5);
        assert_eq!(arena.get(parent, 3), None);
        assert_eq!(arena.refcount(a), Some(1));

        arena.set(parent, 4, 0, b);
        assert!(!arena.is_live(a));
        assert_eq!(arena.refcount(b), Some(1));

        // Setting the same child again keeps it alive
        arena.set(parent, 4, 0, b);
        assert_eq!(arena.refcount(b), Some(1));
    }

    #[test]
    fn test_release_sweeps_recursively() {
        let mut arena = NodeArena::new();
        let root = arena.alloc(0, 0, 0, 0, None);
        let mid = arena.alloc(0, 0, 0, 0, None);
        let leaf = arena.alloc(0, 0, 0, 0, None);
        arena.append(mid, 0, leaf);
        arena.append(root, 0, mid);
        arena.retain(root);
        assert_eq!(arena.live_count(), 3);

        arena.release(root);
        assert_eq!(arena.live_count(), 0);
        assert_eq!(arena.stats().freed, 3);
    }

    #[test]
    fn test_shared_child_survives_one_parent() {
        let mut arena = NodeArena::new();
        let p1 = arena.alloc(0, 0, 0, 0, None);
        let p2 = arena.alloc(0, 0, 0, 0, None);
        let shared = arena.alloc(0, 0, 0, 0, None);
        arena.append(p1, 0, shared);
        arena.append(p2, 0, shared);
        arena.retain(p1);
        arena.retain(p2);

        arena.release(p1);
        assert!(arena.is_live(shared));
        assert_eq!(arena.refcount(shared), Some(1));
        arena.release(p2);
        assert!(!arena.is_live(shared));
    }

    #[test]
    fn test_free_slots_are_reused() {
        let mut arena = NodeArena::new();
        let a = arena.alloc(0, 0, 0, 0, None);
        arena.retain(a);
        arena.release(a);
        let b = arena.alloc(1, 0, 0, 0, None);
        assert_eq!(a, b);
        assert_eq!(arena.stats().reused, 1);
        assert_eq!(arena.stats().high_water, 1);
        assert_eq!(arena.node(b).tag(), 1);
    }

    #[test]
    #[should_panic(expected = "zero refcount")]
    fn test_release_at_zero_panics() {
        let mut arena = NodeArena::new();
        let a = arena.alloc(0, 0, 0, 0, None);
        arena.release(a);
    }

    #[test]
    fn test_deep_chain_release() {
        let mut arena = NodeArena::new();
        let mut top = arena.alloc(0, 0, 0, 0, None);
        for _ in 0..100_000 {
            let parent = arena.alloc(0, 0, 0, 0, None);
            arena.append(parent, 0, top);
            top = parent;
        }
        arena.retain(top);
        arena.release(top);
        assert_eq!(arena.live_count(), 0);
    }
}
