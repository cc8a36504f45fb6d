//! Integration tests for the symbol table instructions
//!
//! These tests cover:
//! - Scoped tag matching with SOpen/SClose
//! - Masks hiding outer bindings
//! - Membership and equality checks against bound symbols
//! - Rollback of definitions made on failed branches

mod common;

use common::tag_program;
use pegvm::vm::{ByteSet, Program, ProgramBuilder, Runtime, Stats};

fn lower() -> ByteSet {
    ByteSet::from_range(b'a', b'z')
}

/// `[a-z]+` bracketed by `Pos` ... `SDef table`
fn define_word(b: &mut ProgramBuilder, table: &str) {
    b.pos();
    b.set(lower());
    b.rset(lower());
    b.sdef(table);
}

// ============================================================================
// Scoped Tag Tests
// ============================================================================

#[test]
fn test_nested_tags_match() {
    let program = tag_program(true);
    let mut rt = Runtime::new(&program);
    assert!(rt.parse(b"<a><b>x</b>y</a>").unwrap().is_success());
    assert!(rt.parse(b"<a></a>").unwrap().is_success());
    assert!(rt.parse(b"<abc><d><e>hi</e></d></abc>").unwrap().is_success());
}

#[test]
fn test_crossed_tags_rejected() {
    let program = tag_program(true);
    let mut rt = Runtime::new(&program);
    assert!(!rt.parse(b"<a><b>x</a></b>").unwrap().is_success());
    assert!(!rt.parse(b"<a>x</b>").unwrap().is_success());
}

#[test]
fn test_scope_restores_outer_binding() {
    let input = b"<a><b></b></a>";

    // Without a scope the inner definition shadows the outer one
    let unscoped = tag_program(false);
    assert!(!Runtime::new(&unscoped).parse(input).unwrap().is_success());

    let scoped = tag_program(true);
    let mut rt = Runtime::new(&scoped);
    assert!(rt.parse(input).unwrap().is_success());
    // Every scope was closed
    assert!(rt.symtab().is_empty());
}

#[test]
fn test_tag_stats() {
    let program = tag_program(true);
    let mut rt = Runtime::new(&program);
    let mut stats = Stats::new();
    assert!(rt
        .parse_with_stats(b"<a><b></b></a>", &mut stats)
        .unwrap()
        .is_success());
    assert_eq!(stats.sym_def, 2);
    assert_eq!(stats.sym_get, 2);
}

// ============================================================================
// Mask and Existence Tests
// ============================================================================

/// Define `T`, check that a mask hides it, then match it again
fn mask_program() -> Program {
    let mut b = ProgramBuilder::new();
    let start = b.label();
    let unmasked = b.label();
    let reject = b.label();
    b.entry(start);
    b.bind(start);
    b.pos();
    b.set(lower());
    b.sdef("T");
    b.alt(unmasked);
    b.smask("T");
    b.sexists("T");
    b.succ();
    b.jump(reject);
    b.bind(unmasked);
    // The mask went away with the failed branch
    b.sexists("T");
    b.smatch("T");
    b.ret();
    b.bind(reject);
    b.fail();
    b.build().unwrap()
}

#[test]
fn test_mask_hides_binding() {
    let program = mask_program();
    let mut rt = Runtime::new(&program);
    let mut stats = Stats::new();

    assert!(rt.parse_with_stats(b"aa", &mut stats).unwrap().is_success());
    assert_eq!(rt.pos(), 2);
    assert_eq!(stats.sym_mask, 1);
    assert_eq!(stats.sym_exists, 2);
    assert_eq!(stats.sym_def, 1);
    assert_eq!(stats.sym_get, 1);

    assert!(!rt.parse(b"ab").unwrap().is_success());
}

#[test]
fn test_is_def_checks_literal() {
    // word ' ' <isdef KW "if">
    let mut b = ProgramBuilder::new();
    let start = b.label();
    b.entry(start);
    b.bind(start);
    define_word(&mut b, "KW");
    b.byte(b' ');
    b.sis_def("KW", b"if");
    b.ret();
    let program = b.build().unwrap();

    let mut rt = Runtime::new(&program);
    assert!(rt.parse(b"if ").unwrap().is_success());
    assert!(!rt.parse(b"do ").unwrap().is_success());
    assert!(!rt.parse(b"iff ").unwrap().is_success());
}

// ============================================================================
// Equality and Membership Tests
// ============================================================================

#[test]
fn test_is_compares_latest_binding() {
    // word ' ' Pos word SIs W !.
    let mut b = ProgramBuilder::new();
    let start = b.label();
    b.entry(start);
    b.bind(start);
    define_word(&mut b, "W");
    b.byte(b' ');
    b.pos();
    b.set(lower());
    b.rset(lower());
    b.sis("W");
    b.nany();
    b.ret();
    let program = b.build().unwrap();

    let mut rt = Runtime::new(&program);
    assert!(rt.parse(b"abc abc").unwrap().is_success());
    assert!(!rt.parse(b"abc abd").unwrap().is_success());
    assert!(!rt.parse(b"abc ab").unwrap().is_success());
}

/// Two definitions of `W`, then a third word checked with `check`
fn three_words(check: fn(&mut ProgramBuilder, &str)) -> Program {
    let mut b = ProgramBuilder::new();
    let start = b.label();
    b.entry(start);
    b.bind(start);
    define_word(&mut b, "W");
    b.byte(b' ');
    define_word(&mut b, "W");
    b.byte(b' ');
    b.pos();
    b.set(lower());
    b.rset(lower());
    check(&mut b, "W");
    b.ret();
    b.build().unwrap()
}

#[test]
fn test_isa_searches_every_binding() {
    let program = three_words(ProgramBuilder::sisa);
    let mut rt = Runtime::new(&program);
    assert!(rt.parse(b"ab cd ab").unwrap().is_success());
    assert!(rt.parse(b"ab cd cd").unwrap().is_success());
    assert!(!rt.parse(b"ab cd ef").unwrap().is_success());

    // SIs only sees the most recent binding
    let program = three_words(ProgramBuilder::sis);
    let mut rt = Runtime::new(&program);
    assert!(!rt.parse(b"ab cd ab").unwrap().is_success());
    assert!(rt.parse(b"ab cd cd").unwrap().is_success());
}

// ============================================================================
// Rollback Tests
// ============================================================================

#[test]
fn test_failed_branch_rolls_back_definition() {
    // (<def W word> '!') / (!<exists W> [a-z]+)
    let mut b = ProgramBuilder::new();
    let start = b.label();
    let second = b.label();
    let undefined = b.label();
    let done = b.label();
    b.entry(start);
    b.bind(start);
    b.alt(second);
    define_word(&mut b, "W");
    b.byte(b'!');
    b.succ();
    b.jump(done);
    b.bind(second);
    b.alt(undefined);
    b.sexists("W");
    b.succ();
    b.fail();
    b.bind(undefined);
    b.rset(lower());
    b.bind(done);
    b.ret();
    let program = b.build().unwrap();

    let mut rt = Runtime::new(&program);
    assert!(rt.parse(b"ab!").unwrap().is_success());
    assert_eq!(rt.symtab().len(), 1);

    assert!(rt.parse(b"ab?").unwrap().is_success());
    assert_eq!(rt.pos(), 2);
    assert!(rt.symtab().is_empty());
}
