//! Property-based tests using proptest
//!
//! These tests check the parse-state structures against simple reference
//! models, and the failure position reported for truncated documents.

mod common;

use common::json_program;
use pegvm::vm::{AstLog, MemoTable, NodeArena, Runtime, SymbolTable, TagId, Token, NO_TAG};
use proptest::prelude::*;
use std::collections::HashMap;

// =============================================================================
// AST Log Transactions
// =============================================================================

#[derive(Debug, Clone)]
enum LogOp {
    New(usize),
    Capture(usize),
    Tag(TagId),
    Push,
    Pop(TagId),
    Swap(usize, TagId),
    Link(TagId),
    Begin,
    Commit(TagId),
    Abort,
}

fn log_op() -> impl Strategy<Value = LogOp> {
    prop_oneof![
        (0usize..64).prop_map(LogOp::New),
        (0usize..64).prop_map(LogOp::Capture),
        (1u16..4).prop_map(LogOp::Tag),
        Just(LogOp::Push),
        (0u16..4).prop_map(LogOp::Pop),
        (0usize..64, 0u16..4).prop_map(|(pos, label)| LogOp::Swap(pos, label)),
        (1u16..4).prop_map(LogOp::Link),
        Just(LogOp::Begin),
        (0u16..4).prop_map(LogOp::Commit),
        Just(LogOp::Abort),
    ]
}

/// Apply `ops`, treating `Begin`/`Commit`/`Abort` as nested transactions
fn apply_log_ops(log: &mut AstLog, arena: &mut NodeArena, ops: &[LogOp]) {
    let mut marks = Vec::new();
    for op in ops {
        match *op {
            LogOp::New(pos) => log.log_new(pos),
            LogOp::Capture(pos) => log.log_capture(pos),
            LogOp::Tag(tag) => log.log_tag(tag),
            LogOp::Push => log.log_push(),
            LogOp::Pop(label) => log.log_pop(label),
            LogOp::Swap(pos, label) => log.log_swap(pos, label),
            LogOp::Link(tag) => {
                let node = arena.alloc(tag, 0, 0, 0, None);
                log.log_link(arena, NO_TAG, node);
            }
            LogOp::Begin => marks.push(log.save_tx()),
            LogOp::Commit(label) => {
                if let Some(mark) = marks.pop() {
                    log.commit_tx(arena, label, mark);
                }
            }
            LogOp::Abort => {
                if let Some(mark) = marks.pop() {
                    log.rollback_tx(arena, mark);
                }
            }
        }
    }
}

proptest! {
    /// Rolling back to a mark restores the log and the live node count
    #[test]
    fn test_ast_rollback_restores_state(
        prefix in prop::collection::vec(log_op(), 0..20),
        body in prop::collection::vec(log_op(), 0..60),
    ) {
        let mut arena = NodeArena::new();
        let mut log = AstLog::new();
        apply_log_ops(&mut log, &mut arena, &prefix);

        let mark = log.save_tx();
        let entries = log.entries().to_vec();
        let live = arena.live_count();

        apply_log_ops(&mut log, &mut arena, &body);
        log.rollback_tx(&mut arena, mark);
        prop_assert_eq!(log.entries(), entries.as_slice());
        prop_assert_eq!(arena.live_count(), live);

        // A second rollback to the same mark changes nothing
        log.rollback_tx(&mut arena, mark);
        prop_assert_eq!(log.entries(), entries.as_slice());
        prop_assert_eq!(arena.live_count(), live);
    }

    /// Every node allocated through the log is freed once the log is emptied
    #[test]
    fn test_ast_refcounts_balance(ops in prop::collection::vec(log_op(), 0..80)) {
        let mut arena = NodeArena::new();
        let mut log = AstLog::new();
        apply_log_ops(&mut log, &mut arena, &ops);

        log.rollback_tx(&mut arena, 0);
        prop_assert!(log.is_empty());
        prop_assert_eq!(arena.live_count(), 0);
        let stats = arena.stats();
        prop_assert_eq!(stats.allocated, stats.freed);
    }
}

// =============================================================================
// Memo Table
// =============================================================================

#[derive(Debug, Clone)]
enum MemoOp {
    Record { pos: usize, id: u16, state: u8, consumed: usize },
    Fail { pos: usize, id: u16, state: u8 },
    Lookup { pos: usize, id: u16, state: u8 },
}

fn memo_op() -> impl Strategy<Value = MemoOp> {
    prop_oneof![
        (0usize..64, 0u16..3, 0u8..2, 0usize..8)
            .prop_map(|(pos, id, state, consumed)| MemoOp::Record { pos, id, state, consumed }),
        (0usize..64, 0u16..3, 0u8..2).prop_map(|(pos, id, state)| MemoOp::Fail { pos, id, state }),
        (0usize..64, 0u16..3, 0u8..2).prop_map(|(pos, id, state)| MemoOp::Lookup { pos, id, state }),
    ]
}

proptest! {
    /// A hit always agrees with the most recent record of the same key
    #[test]
    fn test_memo_hits_match_latest_record(
        window in 1usize..8,
        ops in prop::collection::vec(memo_op(), 0..120),
    ) {
        let mut arena = NodeArena::new();
        let mut memo = MemoTable::new(window, 3);
        // (pos, id) -> (state, consumed or None for failure)
        let mut latest: HashMap<(usize, u16), (u8, Option<usize>)> = HashMap::new();

        for op in ops {
            match op {
                MemoOp::Record { pos, id, state, consumed } => {
                    memo.record(&mut arena, pos, id, None, consumed, state);
                    latest.insert((pos, id), (state, Some(consumed)));
                    let hit = memo.lookup(pos, id, state);
                    prop_assert!(hit.is_some());
                    prop_assert_eq!(hit.map(|e| e.consumed()), Some(consumed));
                }
                MemoOp::Fail { pos, id, state } => {
                    memo.record_failure(&mut arena, pos, id, state);
                    latest.insert((pos, id), (state, None));
                    prop_assert!(memo.lookup(pos, id, state).is_some_and(|e| e.is_failure()));
                }
                MemoOp::Lookup { pos, id, state } => {
                    if let Some(entry) = memo.lookup(pos, id, state) {
                        let expected = latest.get(&(pos, id)).copied();
                        let found = if entry.is_failure() { None } else { Some(entry.consumed()) };
                        prop_assert_eq!(expected, Some((state, found)));
                    }
                }
            }
            prop_assert!(memo.occupancy() <= memo.capacity());
        }
    }
}

// =============================================================================
// Symbol Table
// =============================================================================

const SYMBOL_TEXT: &[u8] = b"abababcabcab";

#[derive(Debug, Clone)]
enum SymOp {
    Add(TagId, usize, usize),
    Mask(TagId),
    Save,
    Rollback,
}

fn sym_op() -> impl Strategy<Value = SymOp> {
    prop_oneof![
        3 => (0u16..3, 0usize..SYMBOL_TEXT.len(), 0usize..4).prop_map(|(t, s, l)| {
            SymOp::Add(t, s, (s + l).min(SYMBOL_TEXT.len()))
        }),
        1 => (0u16..3).prop_map(SymOp::Mask),
        1 => Just(SymOp::Save),
        1 => Just(SymOp::Rollback),
    ]
}

/// Reference model: a plain list of bindings, `None` for masks
#[derive(Default)]
struct ModelTable {
    entries: Vec<(TagId, Option<(usize, usize)>)>,
}

impl ModelTable {
    fn visible(&self, table: TagId) -> Option<&[u8]> {
        let (_, token) = self.entries.iter().rev().find(|(t, _)| *t == table)?;
        token.map(|(s, e)| &SYMBOL_TEXT[s..e])
    }

    fn contains(&self, table: TagId, bytes: &[u8]) -> bool {
        for (_, token) in self.entries.iter().rev().filter(|(t, _)| *t == table) {
            match token {
                None => return false,
                Some((s, e)) if &SYMBOL_TEXT[*s..*e] == bytes => return true,
                Some(_) => {}
            }
        }
        false
    }
}

proptest! {
    /// Lookups agree with the reference model under masks and rollbacks
    #[test]
    fn test_symbol_scoping_matches_model(
        ops in prop::collection::vec(sym_op(), 0..80),
        probe_start in 0usize..SYMBOL_TEXT.len(),
        probe_len in 0usize..4,
    ) {
        let probe = &SYMBOL_TEXT[probe_start..(probe_start + probe_len).min(SYMBOL_TEXT.len())];
        let mut table = SymbolTable::new();
        let mut model = ModelTable::default();
        let mut saves = Vec::new();

        for op in ops {
            match op {
                SymOp::Add(t, s, e) => {
                    table.add(t, Token::new(s, e), SYMBOL_TEXT);
                    model.entries.push((t, Some((s, e))));
                }
                SymOp::Mask(t) => {
                    table.add_mask(t);
                    model.entries.push((t, None));
                }
                SymOp::Save => saves.push(table.savepoint()),
                SymOp::Rollback => {
                    if let Some(mark) = saves.pop() {
                        table.rollback(mark);
                        model.entries.truncate(mark);
                    }
                }
            }

            prop_assert_eq!(table.len(), model.entries.len());
            for t in 0..3 {
                let got = table.get_symbol(t).map(|tok| tok.bytes(SYMBOL_TEXT));
                prop_assert_eq!(got, model.visible(t));
                prop_assert_eq!(table.has_symbol(t), model.visible(t).is_some());
                prop_assert_eq!(table.contains(t, probe, SYMBOL_TEXT), model.contains(t, probe));
            }
        }
    }
}

// =============================================================================
// Failure Position
// =============================================================================

#[derive(Debug, Clone)]
enum Doc {
    Int(u32),
    Str(String),
    List(Vec<Doc>),
}

fn doc() -> impl Strategy<Value = Doc> {
    let leaf = prop_oneof![
        any::<u32>().prop_map(Doc::Int),
        "[a-z ]{0,6}".prop_map(Doc::Str),
    ];
    leaf.prop_recursive(3, 16, 3, |inner| {
        prop::collection::vec(inner, 1..4).prop_map(Doc::List)
    })
}

fn render(doc: &Doc, ws: &str, out: &mut String) {
    match doc {
        Doc::Int(n) => out.push_str(&n.to_string()),
        Doc::Str(s) => {
            out.push('\'');
            out.push_str(s);
            out.push('\'');
        }
        Doc::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(ws);
                render(item, ws, out);
            }
            out.push_str(ws);
            out.push(']');
        }
    }
}

fn object() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(("[a-z]{1,4}", doc()), 1..4),
        prop_oneof![Just(""), Just(" ")],
    )
        .prop_map(|(pairs, ws)| {
            let mut out = String::from("{");
            for (i, (key, value)) in pairs.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(ws);
                out.push('\'');
                out.push_str(key);
                out.push('\'');
                out.push_str(ws);
                out.push(':');
                out.push_str(ws);
                render(value, ws, &mut out);
            }
            out.push_str(ws);
            out.push('}');
            out
        })
}

proptest! {
    /// A document parses, and every proper prefix fails exactly at its end
    #[test]
    fn test_truncated_document_head(text in object()) {
        let program = json_program();
        let mut rt = Runtime::new(&program);
        let input = text.as_bytes();

        prop_assert!(rt.parse(input).unwrap().is_success());
        let root = rt.parsed_node().unwrap();
        rt.nodes_mut().release(root);

        for k in 0..input.len() {
            prop_assert!(!rt.parse(&input[..k]).unwrap().is_success());
            prop_assert_eq!(rt.head(), k);
            prop_assert_eq!(rt.nodes().live_count(), 0);
        }
    }

    /// Arbitrary bytes never raise a runtime error and keep head in bounds
    #[test]
    fn test_arbitrary_input_head_in_bounds(input in prop::collection::vec(any::<u8>(), 0..64)) {
        let program = json_program();
        let mut rt = Runtime::new(&program);

        let status = rt.parse(&input).unwrap();
        prop_assert!(rt.head() <= input.len());
        if let Some(root) = rt.parsed_node() {
            prop_assert!(status.is_success());
            rt.nodes_mut().release(root);
        }
        prop_assert_eq!(rt.nodes().live_count(), 0);
    }
}
