//! Program assembler
//!
//! [`ProgramBuilder`] emits instructions one method per opcode, interns
//! constants (strings, byte sets, tags) and resolves forward references
//! through [`Label`]s when the program is built. The prologue shared by every
//! program is emitted up front.
//!
//! # Example
//!
//! ```rust
//! use pegvm::vm::{ProgramBuilder, Runtime};
//!
//! // Digits = [0-9]+
//! let mut b = ProgramBuilder::new();
//! let digits = b.label();
//! b.entry(digits);
//! b.nonterminal("Digits", digits);
//! b.bind(digits);
//! b.set(pegvm::vm::ByteSet::ascii_digit());
//! b.rset(pegvm::vm::ByteSet::ascii_digit());
//! b.ret();
//! let program = b.build().unwrap();
//!
//! let mut rt = Runtime::new(&program);
//! assert!(rt.parse(b"2024").unwrap().is_success());
//! ```

use super::byte_set::ByteSet;
use super::error::VmError;
use super::instruction::Opcode;
use super::program::{
    JumpTable, MemoId, NontermId, Nonterminal, Program, ProgramParts, SetId, StrId, TagId,
    FIRST_TABLE_SIZE, PROLOGUE,
};
use hashbrown::HashMap;

/// A code address that may not be known yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

/// A displacement waiting for its label
#[derive(Debug, Clone, Copy)]
struct Fixup {
    /// Offset of the i32 operand in the code
    at: usize,
    /// Address just past the instruction
    end: usize,
    label: Label,
}

/// Incremental program builder
#[derive(Debug)]
pub struct ProgramBuilder {
    code: Vec<u8>,
    entry: Option<Label>,
    labels: Vec<Option<usize>>,
    fixups: Vec<Fixup>,
    first_fixups: Vec<(usize, usize, Vec<Label>)>,
    jump_fixups: Vec<(usize, usize, Vec<Label>)>,
    sets: Vec<ByteSet>,
    set_ids: HashMap<ByteSet, SetId>,
    strings: Vec<Vec<u8>>,
    string_ids: HashMap<Vec<u8>, StrId>,
    tags: Vec<String>,
    tag_ids: HashMap<String, TagId>,
    nonterms: Vec<(String, Label)>,
    first_tables: Vec<Vec<i32>>,
    jump_tables: Vec<JumpTable>,
    memo_size: u16,
    /// First error seen while emitting, reported by `build`
    error: Option<VmError>,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBuilder {
    /// Create a builder holding only the prologue
    pub fn new() -> Self {
        let mut tag_ids = HashMap::new();
        tag_ids.insert(String::new(), 0);
        Self {
            code: PROLOGUE.to_vec(),
            entry: None,
            labels: Vec::new(),
            fixups: Vec::new(),
            first_fixups: Vec::new(),
            jump_fixups: Vec::new(),
            sets: Vec::new(),
            set_ids: HashMap::new(),
            strings: Vec::new(),
            string_ids: HashMap::new(),
            tags: vec![String::new()],
            tag_ids,
            nonterms: Vec::new(),
            first_tables: Vec::new(),
            jump_tables: Vec::new(),
            memo_size: 0,
            error: None,
        }
    }

    /// Address of the next instruction
    #[inline]
    pub fn here(&self) -> usize {
        self.code.len()
    }

    fn record_error(&mut self, err: VmError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    // ========================================================================
    // Labels, constants and metadata
    // ========================================================================

    /// Create an unbound label
    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() as u32 - 1)
    }

    /// Bind `label` to the next instruction
    pub fn bind(&mut self, label: Label) {
        let here = self.here();
        let index = label.0 as usize;
        match self.labels.get(index).copied() {
            Some(None) => self.labels[index] = Some(here),
            Some(Some(_)) => {
                self.record_error(VmError::invalid_program(format!(
                    "label {} bound twice",
                    label.0
                )));
            }
            None => {
                self.record_error(VmError::invalid_program(format!(
                    "label {} does not belong to this builder",
                    label.0
                )));
            }
        }
    }

    /// Create a label bound to the next instruction
    pub fn label_here(&mut self) -> Label {
        let label = self.label();
        self.bind(label);
        label
    }

    /// Start parsing at `label`
    pub fn entry(&mut self, label: Label) {
        self.entry = Some(label);
    }

    /// Register a named rule starting at `start`
    ///
    /// Registering the same start label twice returns the existing id.
    pub fn nonterminal(&mut self, name: &str, start: Label) -> NontermId {
        if let Some(i) = self.nonterms.iter().position(|(_, l)| *l == start) {
            return i as NontermId;
        }
        self.nonterms.push((name.to_string(), start));
        (self.nonterms.len() - 1) as NontermId
    }

    /// Intern a tag, label or symbol table name
    pub fn tag(&mut self, name: &str) -> TagId {
        if let Some(&id) = self.tag_ids.get(name) {
            return id;
        }
        let id = self.tags.len() as TagId;
        self.tags.push(name.to_string());
        self.tag_ids.insert(name.to_string(), id);
        id
    }

    /// Intern a string constant
    pub fn string(&mut self, s: &[u8]) -> StrId {
        if let Some(&id) = self.string_ids.get(s) {
            return id;
        }
        let id = self.strings.len() as StrId;
        self.strings.push(s.to_vec());
        self.string_ids.insert(s.to_vec(), id);
        id
    }

    /// Intern a byte set
    pub fn byte_set(&mut self, set: ByteSet) -> SetId {
        if let Some(&id) = self.set_ids.get(&set) {
            return id;
        }
        let id = self.sets.len() as SetId;
        self.sets.push(set);
        self.set_ids.insert(set, id);
        id
    }

    /// Allocate a fresh memo id
    pub fn memo_id(&mut self) -> MemoId {
        let id = self.memo_size;
        self.memo_size += 1;
        id
    }

    // ========================================================================
    // Encoding helpers
    // ========================================================================

    fn op(&mut self, op: Opcode) {
        self.code.push(op as u8);
    }

    fn u8(&mut self, v: u8) {
        self.code.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.code.extend_from_slice(&v.to_le_bytes());
    }

    /// Placeholder displacement, patched in `build`
    ///
    /// The displacement is always the last operand, so the instruction ends
    /// right after it.
    fn disp(&mut self, label: Label) {
        let at = self.code.len();
        self.code.extend_from_slice(&0i32.to_le_bytes());
        self.fixups.push(Fixup {
            at,
            end: at + 4,
            label,
        });
    }

    fn with_byte(&mut self, op: Opcode, b: u8) {
        self.op(op);
        self.u8(b);
    }

    fn with_str(&mut self, op: Opcode, s: &[u8]) {
        let id = self.string(s);
        self.op(op);
        self.u16(id);
    }

    fn with_set(&mut self, op: Opcode, set: ByteSet) {
        let id = self.byte_set(set);
        self.op(op);
        self.u16(id);
    }

    fn with_tag(&mut self, op: Opcode, name: &str) {
        let id = self.tag(name);
        self.op(op);
        self.u16(id);
    }

    // ========================================================================
    // Control flow
    // ========================================================================

    /// `Nop`
    pub fn nop(&mut self) {
        self.op(Opcode::Nop);
    }

    /// `Fail`
    pub fn fail(&mut self) {
        self.op(Opcode::Fail);
    }

    /// `Alt`: push a choice frame falling back to `target`
    pub fn alt(&mut self, target: Label) {
        self.op(Opcode::Alt);
        self.disp(target);
    }

    /// `Succ`
    pub fn succ(&mut self) {
        self.op(Opcode::Succ);
    }

    /// `Jump`
    pub fn jump(&mut self, target: Label) {
        self.op(Opcode::Jump);
        self.disp(target);
    }

    /// `Call`: the callee is registered as a nonterminal if it is not one yet
    pub fn call(&mut self, target: Label) {
        let nonterm = self.nonterminal(&format!("L{}", target.0), target);
        self.op(Opcode::Call);
        self.u16(nonterm);
        self.disp(target);
    }

    /// `Ret`
    pub fn ret(&mut self) {
        self.op(Opcode::Ret);
    }

    /// `Pos`
    pub fn pos(&mut self) {
        self.op(Opcode::Pos);
    }

    /// `Back`
    pub fn back(&mut self) {
        self.op(Opcode::Back);
    }

    /// `Skip`
    pub fn skip(&mut self) {
        self.op(Opcode::Skip);
    }

    /// `Exit`
    pub fn exit(&mut self, status: u8) {
        self.with_byte(Opcode::Exit, status);
    }

    /// `First`: `targets[b]` is taken when the next byte is `b`
    pub fn first(&mut self, targets: &[Label; FIRST_TABLE_SIZE]) {
        let id = self.first_tables.len() as u16;
        self.first_tables.push(vec![0; FIRST_TABLE_SIZE]);
        self.op(Opcode::First);
        self.u16(id);
        let end = self.here();
        self.first_fixups.push((id as usize, end, targets.to_vec()));
    }

    /// `TblJump1`/`TblJump2`/`TblJump3`, chosen by the number of planes
    ///
    /// `targets` needs `1 << planes.len()` entries.
    pub fn tbl_jump(&mut self, planes: Vec<ByteSet>, targets: &[Label]) {
        let op = match planes.len() {
            1 => Opcode::TblJump1,
            2 => Opcode::TblJump2,
            3 => Opcode::TblJump3,
            n => {
                self.record_error(VmError::invalid_program(format!(
                    "jump table with {} planes",
                    n
                )));
                return;
            }
        };
        if targets.len() != 1 << planes.len() {
            self.record_error(VmError::invalid_program(format!(
                "jump table with {} planes needs {} targets, got {}",
                planes.len(),
                1 << planes.len(),
                targets.len()
            )));
            return;
        }
        let id = self.jump_tables.len() as u16;
        self.jump_tables.push(JumpTable {
            jumps: vec![0; targets.len()],
            planes,
        });
        self.op(op);
        self.u16(id);
        let end = self.here();
        self.jump_fixups.push((id as usize, end, targets.to_vec()));
    }

    // ========================================================================
    // Matching
    // ========================================================================

    /// `Byte`
    pub fn byte(&mut self, b: u8) {
        self.with_byte(Opcode::Byte, b);
    }

    /// `Any`
    pub fn any(&mut self) {
        self.op(Opcode::Any);
    }

    /// `Str`
    pub fn str(&mut self, s: &[u8]) {
        self.with_str(Opcode::Str, s);
    }

    /// `Set`
    pub fn set(&mut self, set: ByteSet) {
        self.with_set(Opcode::Set, set);
    }

    /// `NByte`
    pub fn nbyte(&mut self, b: u8) {
        self.with_byte(Opcode::NByte, b);
    }

    /// `NAny`
    pub fn nany(&mut self) {
        self.op(Opcode::NAny);
    }

    /// `NStr`
    pub fn nstr(&mut self, s: &[u8]) {
        self.with_str(Opcode::NStr, s);
    }

    /// `NSet`
    pub fn nset(&mut self, set: ByteSet) {
        self.with_set(Opcode::NSet, set);
    }

    /// `OByte`
    pub fn obyte(&mut self, b: u8) {
        self.with_byte(Opcode::OByte, b);
    }

    /// `OAny`
    pub fn oany(&mut self) {
        self.op(Opcode::OAny);
    }

    /// `OStr`
    pub fn ostr(&mut self, s: &[u8]) {
        self.with_str(Opcode::OStr, s);
    }

    /// `OSet`
    pub fn oset(&mut self, set: ByteSet) {
        self.with_set(Opcode::OSet, set);
    }

    /// `RByte`
    pub fn rbyte(&mut self, b: u8) {
        self.with_byte(Opcode::RByte, b);
    }

    /// `RAny`
    pub fn rany(&mut self) {
        self.op(Opcode::RAny);
    }

    /// `RStr`
    pub fn rstr(&mut self, s: &[u8]) {
        self.with_str(Opcode::RStr, s);
    }

    /// `RSet`
    pub fn rset(&mut self, set: ByteSet) {
        self.with_set(Opcode::RSet, set);
    }

    // ========================================================================
    // Memoization
    // ========================================================================

    /// `Lookup`: on a hit, jump to `target`
    pub fn lookup(&mut self, state: u8, memo: MemoId, target: Label) {
        self.op(Opcode::Lookup);
        self.u8(state);
        self.u16(memo);
        self.disp(target);
    }

    /// `Memo`
    pub fn memo(&mut self, state: u8, memo: MemoId) {
        self.op(Opcode::Memo);
        self.u8(state);
        self.u16(memo);
    }

    /// `MemoFail`
    pub fn memo_fail(&mut self, state: u8, memo: MemoId) {
        self.op(Opcode::MemoFail);
        self.u8(state);
        self.u16(memo);
    }

    /// `TLookup`: on a hit, link the cached node under `label` and jump
    pub fn tlookup(&mut self, state: u8, label: &str, memo: MemoId, target: Label) {
        let label = self.tag(label);
        self.op(Opcode::TLookup);
        self.u8(state);
        self.u16(label);
        self.u16(memo);
        self.disp(target);
    }

    /// `TMemo`
    pub fn tmemo(&mut self, state: u8, memo: MemoId) {
        self.op(Opcode::TMemo);
        self.u8(state);
        self.u16(memo);
    }

    // ========================================================================
    // Tree construction
    // ========================================================================

    /// `TPush`
    pub fn tpush(&mut self) {
        self.op(Opcode::TPush);
    }

    /// `TPop`
    pub fn tpop(&mut self, label: &str) {
        self.with_tag(Opcode::TPop, label);
    }

    /// `TLeftFold`
    pub fn tleft_fold(&mut self, shift: i8, label: &str) {
        let label = self.tag(label);
        self.op(Opcode::TLeftFold);
        self.u8(shift as u8);
        self.u16(label);
    }

    /// `TNew`
    pub fn tnew(&mut self, shift: i8) {
        self.with_byte(Opcode::TNew, shift as u8);
    }

    /// `TCapture`
    pub fn tcapture(&mut self, shift: i8) {
        self.with_byte(Opcode::TCapture, shift as u8);
    }

    /// `TTag`
    pub fn ttag(&mut self, tag: &str) {
        self.with_tag(Opcode::TTag, tag);
    }

    /// `TReplace`
    pub fn treplace(&mut self, value: &[u8]) {
        self.with_str(Opcode::TReplace, value);
    }

    /// `TStart`
    pub fn tstart(&mut self) {
        self.op(Opcode::TStart);
    }

    /// `TCommit`
    pub fn tcommit(&mut self, label: &str) {
        self.with_tag(Opcode::TCommit, label);
    }

    /// `TAbort`
    pub fn tabort(&mut self) {
        self.op(Opcode::TAbort);
    }

    // ========================================================================
    // Symbol table
    // ========================================================================

    /// `SOpen`
    pub fn sopen(&mut self) {
        self.op(Opcode::SOpen);
    }

    /// `SClose`
    pub fn sclose(&mut self) {
        self.op(Opcode::SClose);
    }

    /// `SMask`
    pub fn smask(&mut self, table: &str) {
        self.with_tag(Opcode::SMask, table);
    }

    /// `SDef`
    pub fn sdef(&mut self, table: &str) {
        self.with_tag(Opcode::SDef, table);
    }

    /// `SIsDef`
    pub fn sis_def(&mut self, table: &str, symbol: &[u8]) {
        let table = self.tag(table);
        let symbol = self.string(symbol);
        self.op(Opcode::SIsDef);
        self.u16(table);
        self.u16(symbol);
    }

    /// `SExists`
    pub fn sexists(&mut self, table: &str) {
        self.with_tag(Opcode::SExists, table);
    }

    /// `SMatch`
    pub fn smatch(&mut self, table: &str) {
        self.with_tag(Opcode::SMatch, table);
    }

    /// `SIs`
    pub fn sis(&mut self, table: &str) {
        self.with_tag(Opcode::SIs, table);
    }

    /// `SIsa`
    pub fn sisa(&mut self, table: &str) {
        self.with_tag(Opcode::SIsa, table);
    }

    // ========================================================================
    // Build
    // ========================================================================

    fn address(&self, label: Label) -> Result<usize, VmError> {
        self.labels
            .get(label.0 as usize)
            .copied()
            .flatten()
            .ok_or_else(|| VmError::invalid_program(format!("label {} is never bound", label.0)))
    }

    fn displacement(&self, end: usize, label: Label) -> Result<i32, VmError> {
        let target = self.address(label)?;
        i32::try_from(target as i64 - end as i64)
            .map_err(|_| VmError::invalid_program("jump displacement out of range"))
    }

    /// Resolve labels and validate the program
    pub fn build(mut self) -> Result<Program, VmError> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        let entry = self
            .entry
            .ok_or_else(|| VmError::invalid_program("no entry point"))?;
        let entry = self.address(entry)?;

        for fixup in &self.fixups {
            let disp = self.displacement(fixup.end, fixup.label)?;
            self.code[fixup.at..fixup.at + 4].copy_from_slice(&disp.to_le_bytes());
        }
        let mut first_tables = std::mem::take(&mut self.first_tables);
        for (id, end, targets) in &self.first_fixups {
            for (slot, &label) in first_tables[*id].iter_mut().zip(targets) {
                *slot = self.displacement(*end, label)?;
            }
        }
        let mut jump_tables = std::mem::take(&mut self.jump_tables);
        for (id, end, targets) in &self.jump_fixups {
            for (slot, &label) in jump_tables[*id].jumps.iter_mut().zip(targets) {
                *slot = self.displacement(*end, label)?;
            }
        }

        // A rule ends where the next one starts
        let mut starts = Vec::with_capacity(self.nonterms.len());
        for (_, label) in &self.nonterms {
            starts.push(self.address(*label)?);
        }
        let code_len = self.code.len();
        let nonterms = self
            .nonterms
            .iter()
            .zip(&starts)
            .map(|((name, _), &start)| Nonterminal {
                name: name.clone(),
                start,
                end: starts
                    .iter()
                    .copied()
                    .filter(|&s| s > start)
                    .min()
                    .unwrap_or(code_len),
            })
            .collect();

        Program::from_parts(ProgramParts {
            code: self.code,
            entry,
            sets: self.sets,
            strings: self.strings,
            tags: self.tags,
            nonterms,
            first_tables,
            jump_tables,
            memo_size: self.memo_size,
        })
    }
}
