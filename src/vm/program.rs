//! Compiled programs
//!
//! A [`Program`] is the flat instruction buffer plus the constant tables its
//! operands index into. Programs are validated once when they are built or
//! deserialized; the dispatch loop relies on that and indexes tables directly.

use super::byte_set::ByteSet;
use super::error::VmError;
use super::instruction::{read_i32, read_u16, Opcode, Operand};
use serde::{Deserialize, Serialize};

/// Index into the tag table (tags, edge labels and symbol table names)
pub type TagId = u16;
/// Index into the string table
pub type StrId = u16;
/// Index into the byte set table
pub type SetId = u16;
/// Memoization slot id of a rule
pub type MemoId = u16;
/// Index into the nonterminal table
pub type NontermId = u16;

/// Tag id of the empty tag/label
pub const NO_TAG: TagId = 0;

/// Address of the `Exit 0` instruction every program starts with
pub const SUCCESS_EXIT: usize = 0;

/// Address of the `Exit 1` instruction following the success exit
pub const FAILURE_EXIT: usize = 2;

/// Number of entries in a `First` table
pub const FIRST_TABLE_SIZE: usize = 256;

/// Encoded prologue shared by every program
pub const PROLOGUE: [u8; 4] = [Opcode::Exit as u8, 0, Opcode::Exit as u8, 1];

/// A named rule and its code range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonterminal {
    /// Rule name
    pub name: String,
    /// Address of the first instruction
    pub start: usize,
    /// Address just past the last instruction
    pub end: usize,
}

/// Multi-way branch table built from 1 to 3 bit-plane byte sets
///
/// Plane `k` contributes bit `k` of the index, so a byte selects
/// `jumps[sum(planes[k].contains(b) << k)]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JumpTable {
    /// Bit planes, low bit first
    pub planes: Vec<ByteSet>,
    /// Relative displacements, `1 << planes.len()` entries
    pub jumps: Vec<i32>,
}

impl JumpTable {
    /// Branch index for a byte
    #[inline(always)]
    pub fn index(&self, b: u8) -> usize {
        self.planes
            .iter()
            .enumerate()
            .fold(0, |idx, (k, plane)| idx | ((plane.contains(b) as usize) << k))
    }
}

/// Serializable form of a [`Program`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramParts {
    /// Instruction buffer, starting with [`PROLOGUE`]
    pub code: Vec<u8>,
    /// Address where parsing starts
    pub entry: usize,
    /// Byte set table
    pub sets: Vec<ByteSet>,
    /// String table
    pub strings: Vec<Vec<u8>>,
    /// Tag table; entry 0 is the empty tag
    pub tags: Vec<String>,
    /// Nonterminal table
    pub nonterms: Vec<Nonterminal>,
    /// `First` tables, [`FIRST_TABLE_SIZE`] displacements each
    pub first_tables: Vec<Vec<i32>>,
    /// Bit-plane jump tables
    pub jump_tables: Vec<JumpTable>,
    /// Number of memo ids used by the program
    pub memo_size: u16,
}

/// A validated program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ProgramParts", into = "ProgramParts")]
pub struct Program {
    parts: ProgramParts,
}

impl TryFrom<ProgramParts> for Program {
    type Error = VmError;

    fn try_from(parts: ProgramParts) -> Result<Self, VmError> {
        Program::from_parts(parts)
    }
}

impl From<Program> for ProgramParts {
    fn from(program: Program) -> Self {
        program.parts
    }
}

impl Program {
    /// Validate and wrap program parts
    pub fn from_parts(parts: ProgramParts) -> Result<Self, VmError> {
        validate(&parts)?;
        Ok(Self { parts })
    }

    /// Re-run the structural checks done at construction
    pub fn validate(&self) -> Result<(), VmError> {
        validate(&self.parts)
    }

    /// Load a program from its JSON form
    pub fn from_json(json: &str) -> Result<Self, VmError> {
        serde_json::from_str(json).map_err(|e| VmError::invalid_program(e.to_string()))
    }

    /// Serialize the program to JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.parts).unwrap_or_default()
    }

    /// Instruction buffer
    #[inline]
    pub fn code(&self) -> &[u8] {
        &self.parts.code
    }

    /// Address where parsing starts
    #[inline]
    pub fn entry(&self) -> usize {
        self.parts.entry
    }

    /// Byte set by id
    #[inline(always)]
    pub fn set(&self, id: SetId) -> &ByteSet {
        &self.parts.sets[id as usize]
    }

    /// String by id
    #[inline(always)]
    pub fn string(&self, id: StrId) -> &[u8] {
        &self.parts.strings[id as usize]
    }

    /// Tag name by id
    #[inline]
    pub fn tag_name(&self, id: TagId) -> &str {
        &self.parts.tags[id as usize]
    }

    /// Look up a tag id by name
    pub fn tag_id(&self, name: &str) -> Option<TagId> {
        self.parts
            .tags
            .iter()
            .position(|t| t == name)
            .map(|i| i as TagId)
    }

    /// Number of tags
    #[inline]
    pub fn tag_count(&self) -> usize {
        self.parts.tags.len()
    }

    /// Nonterminal table
    #[inline]
    pub fn nonterms(&self) -> &[Nonterminal] {
        &self.parts.nonterms
    }

    /// Nonterminal whose code range contains `pc`
    pub fn nonterm_at(&self, pc: usize) -> Option<&Nonterminal> {
        self.parts
            .nonterms
            .iter()
            .find(|nt| nt.start <= pc && pc < nt.end)
    }

    /// `First` table by id
    #[inline(always)]
    pub fn first_table(&self, id: u16) -> &[i32] {
        &self.parts.first_tables[id as usize]
    }

    /// Bit-plane jump table by id
    #[inline(always)]
    pub fn jump_table(&self, id: u16) -> &JumpTable {
        &self.parts.jump_tables[id as usize]
    }

    /// Number of memo ids
    #[inline]
    pub fn memo_size(&self) -> u16 {
        self.parts.memo_size
    }

    /// Iterate over `(address, opcode)` pairs
    pub fn instructions(&self) -> impl Iterator<Item = (usize, Opcode)> + '_ {
        let code = self.code();
        let mut pc = 0;
        std::iter::from_fn(move || {
            let op = Opcode::decode(code, pc).ok()?;
            let at = pc;
            pc += op.size();
            Some((at, op))
        })
    }
}

fn check_index(pc: usize, kind: &'static str, index: usize, len: usize) -> Result<(), VmError> {
    if index < len {
        Ok(())
    } else {
        Err(VmError::InvalidOperand { pc, kind, index })
    }
}

fn check_target(boundaries: &[bool], end: usize, disp: i32) -> Result<(), VmError> {
    let target = end as i64 + disp as i64;
    if target >= 0 && (target as usize) < boundaries.len() && boundaries[target as usize] {
        Ok(())
    } else {
        Err(VmError::invalid_program(format!(
            "jump from {} by {} does not land on an instruction",
            end, disp
        )))
    }
}

/// Check prologue, instruction boundaries, table indices and jump targets
fn validate(parts: &ProgramParts) -> Result<(), VmError> {
    let code = &parts.code;
    if !code.starts_with(&PROLOGUE) {
        return Err(VmError::invalid_program("missing exit prologue"));
    }

    for (i, table) in parts.first_tables.iter().enumerate() {
        if table.len() != FIRST_TABLE_SIZE {
            return Err(VmError::invalid_program(format!(
                "first table {} has {} entries",
                i,
                table.len()
            )));
        }
    }
    for (i, table) in parts.jump_tables.iter().enumerate() {
        if !(1..=3).contains(&table.planes.len()) || table.jumps.len() != 1 << table.planes.len()
        {
            return Err(VmError::invalid_program(format!(
                "jump table {} is malformed",
                i
            )));
        }
    }

    // First pass: boundaries and operand indices
    let mut boundaries = vec![false; code.len()];
    let mut branches: Vec<(usize, Opcode)> = Vec::new();
    let mut pc = 0;
    while pc < code.len() {
        let op = Opcode::decode(code, pc)?;
        let end = pc + op.size();
        if end > code.len() {
            return Err(VmError::TruncatedInstruction { pc });
        }
        boundaries[pc] = true;

        let mut at = pc + 1;
        for operand in op.operands() {
            let index = match operand.width() {
                2 => read_u16(code, at) as usize,
                _ => 0,
            };
            match operand {
                Operand::Str => check_index(pc, "string", index, parts.strings.len())?,
                Operand::Set => check_index(pc, "set", index, parts.sets.len())?,
                Operand::Tag => check_index(pc, "tag", index, parts.tags.len())?,
                Operand::Memo => check_index(pc, "memo", index, parts.memo_size as usize)?,
                Operand::Nonterm => check_index(pc, "nonterminal", index, parts.nonterms.len())?,
                Operand::First => check_index(pc, "first table", index, parts.first_tables.len())?,
                Operand::JumpTable => {
                    check_index(pc, "jump table", index, parts.jump_tables.len())?;
                    let planes = match op {
                        Opcode::TblJump1 => 1,
                        Opcode::TblJump2 => 2,
                        _ => 3,
                    };
                    if parts.jump_tables[index].planes.len() != planes {
                        return Err(VmError::InvalidOperand {
                            pc,
                            kind: "jump table",
                            index,
                        });
                    }
                }
                _ => {}
            }
            at += operand.width();
        }

        if op
            .operands()
            .iter()
            .any(|o| matches!(o, Operand::Disp | Operand::First | Operand::JumpTable))
        {
            branches.push((pc, op));
        }
        pc = end;
    }
    boundaries.push(false);

    // Second pass: every branch target starts an instruction
    for (pc, op) in branches {
        let end = pc + op.size();
        match op {
            Opcode::First => {
                let table = &parts.first_tables[read_u16(code, pc + 1) as usize];
                for &disp in table {
                    check_target(&boundaries, end, disp)?;
                }
            }
            Opcode::TblJump1 | Opcode::TblJump2 | Opcode::TblJump3 => {
                let table = &parts.jump_tables[read_u16(code, pc + 1) as usize];
                for &disp in &table.jumps {
                    check_target(&boundaries, end, disp)?;
                }
            }
            _ => {
                // The displacement is always the last operand
                let disp = read_i32(code, end - 4);
                check_target(&boundaries, end, disp)?;
            }
        }
    }

    if parts.entry >= code.len() || !boundaries[parts.entry] {
        return Err(VmError::invalid_program(format!(
            "entry {} is not an instruction",
            parts.entry
        )));
    }
    Ok(())
}
