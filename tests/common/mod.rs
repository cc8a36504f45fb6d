//! Grammars shared by the integration tests, assembled by hand

#![allow(dead_code)]

use pegvm::vm::{ByteSet, Label, Program, ProgramBuilder};

/// The sample fixture
pub const JSON_FIXTURE: &[u8] = b"{ 'key' : [12, 345] }";

fn ws() -> ByteSet {
    ByteSet::from_bytes(b" \t\r\n")
}

/// `(_ ',' _ $label(target))*` as an Alt/Skip loop
fn separated_tail(b: &mut ProgramBuilder, target: Label, label: &str) {
    let top = b.label();
    let done = b.label();
    b.alt(done);
    b.bind(top);
    b.rset(ws());
    b.byte(b',');
    b.rset(ws());
    b.tstart();
    b.call(target);
    b.tcommit(label);
    b.skip();
    b.jump(top);
    b.bind(done);
}

/// A small JSON-like grammar with single-quoted strings
///
/// ```text
/// File     = _ Json _ !.
/// Json     = { '{' _ $(KeyValue) (_ ',' _ $(KeyValue))* _ '}' #JSON }
/// KeyValue = { $key(String) _ ':' _ $value(Value) #KeyValue }
/// String   = '\'' { (!'\'' .)* #String } '\''
/// Value    = String / List / Integer
/// List     = { '[' _ $(Value) (_ ',' _ $(Value))* _ ']' #List }
/// Integer  = { [0-9]+ #Integer }
/// ```
pub fn json_program() -> Program {
    let mut b = ProgramBuilder::new();
    let file = b.label();
    let json = b.label();
    let key_value = b.label();
    let string = b.label();
    let value = b.label();
    let list = b.label();
    let integer = b.label();

    b.entry(file);
    b.nonterminal("File", file);
    b.nonterminal("Json", json);
    b.nonterminal("KeyValue", key_value);
    b.nonterminal("String", string);
    b.nonterminal("Value", value);
    b.nonterminal("List", list);
    b.nonterminal("Integer", integer);

    b.bind(file);
    b.rset(ws());
    b.call(json);
    b.rset(ws());
    b.nany();
    b.ret();

    b.bind(json);
    b.tnew(0);
    b.byte(b'{');
    b.rset(ws());
    b.tstart();
    b.call(key_value);
    b.tcommit("");
    separated_tail(&mut b, key_value, "");
    b.rset(ws());
    b.byte(b'}');
    b.ttag("JSON");
    b.tcapture(0);
    b.ret();

    b.bind(key_value);
    b.tnew(0);
    b.tstart();
    b.call(string);
    b.tcommit("key");
    b.rset(ws());
    b.byte(b':');
    b.rset(ws());
    b.tstart();
    b.call(value);
    b.tcommit("value");
    b.ttag("KeyValue");
    b.tcapture(0);
    b.ret();

    b.bind(string);
    b.byte(b'\'');
    b.tnew(0);
    b.rset(ByteSet::from_bytes(b"'").complement());
    b.ttag("String");
    b.tcapture(0);
    b.byte(b'\'');
    b.ret();

    let as_list = b.label();
    let as_integer = b.label();
    let value_end = b.label();
    b.bind(value);
    b.alt(as_list);
    b.call(string);
    b.succ();
    b.jump(value_end);
    b.bind(as_list);
    b.alt(as_integer);
    b.call(list);
    b.succ();
    b.jump(value_end);
    b.bind(as_integer);
    b.call(integer);
    b.bind(value_end);
    b.ret();

    b.bind(list);
    b.tnew(0);
    b.byte(b'[');
    b.rset(ws());
    b.tstart();
    b.call(value);
    b.tcommit("");
    separated_tail(&mut b, value, "");
    b.rset(ws());
    b.byte(b']');
    b.ttag("List");
    b.tcapture(0);
    b.ret();

    b.bind(integer);
    b.tnew(0);
    b.set(ByteSet::ascii_digit());
    b.rset(ByteSet::ascii_digit());
    b.ttag("Integer");
    b.tcapture(0);
    b.ret();

    b.build().expect("json grammar assembles")
}

/// Matching open and close tags
///
/// ```text
/// File    = Element !.
/// Element = '<' <scope <symbol TAG [a-z]+> '>' Content* '</' <match TAG> '>'>
/// Content = Element / [^<]+
/// ```
///
/// With `scoped` false the element body is not wrapped in a symbol scope,
/// so inner tags shadow outer ones.
pub fn tag_program(scoped: bool) -> Program {
    let name = ByteSet::from_range(b'a', b'z');
    let text = ByteSet::from_bytes(b"<").complement();

    let mut b = ProgramBuilder::new();
    let file = b.label();
    let element = b.label();
    b.entry(file);
    b.nonterminal("File", file);
    b.nonterminal("Element", element);

    b.bind(file);
    b.call(element);
    b.nany();
    b.ret();

    b.bind(element);
    b.byte(b'<');
    if scoped {
        b.sopen();
    }
    b.pos();
    b.set(name);
    b.rset(name);
    b.sdef("TAG");
    b.byte(b'>');

    let top = b.label();
    let as_text = b.label();
    let next = b.label();
    let done = b.label();
    b.alt(done);
    b.bind(top);
    b.alt(as_text);
    b.call(element);
    b.succ();
    b.jump(next);
    b.bind(as_text);
    b.set(text);
    b.rset(text);
    b.bind(next);
    b.skip();
    b.jump(top);
    b.bind(done);

    b.str(b"</");
    b.smatch("TAG");
    b.byte(b'>');
    if scoped {
        b.sclose();
    }
    b.ret();

    b.build().expect("tag grammar assembles")
}

/// Emit a memoized call of `target` linking its node under `label`
///
/// ```text
///     TLookup state label memo -> end
///     Alt failed
///     TStart
///     Call target
///     TCommit label
///     TMemo state memo
///     Jump end
/// failed:
///     MemoFail state memo
/// end:
/// ```
pub fn memo_call(b: &mut ProgramBuilder, target: Label, label: &str, memo: u16) {
    let failed = b.label();
    let end = b.label();
    b.tlookup(0, label, memo, end);
    b.alt(failed);
    b.tstart();
    b.call(target);
    b.tcommit(label);
    b.tmemo(0, memo);
    b.jump(end);
    b.bind(failed);
    b.memo_fail(0, memo);
    b.bind(end);
}

/// Same as [`memo_call`] without tree construction
pub fn memo_call_plain(b: &mut ProgramBuilder, target: Label, memo: u16) {
    let failed = b.label();
    let end = b.label();
    b.lookup(0, memo, end);
    b.alt(failed);
    b.call(target);
    b.memo(0, memo);
    b.jump(end);
    b.bind(failed);
    b.memo_fail(0, memo);
    b.bind(end);
}
