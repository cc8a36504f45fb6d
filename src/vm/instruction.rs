//! Instruction set
//!
//! An instruction is a one-byte opcode followed by fixed-width little-endian
//! operands. The operand layout of each opcode is fixed, so the dispatch loop
//! decodes operands in lockstep with advancing the program counter. Relative
//! displacements are signed 32-bit values measured from the address just past
//! the instruction.

use super::error::VmError;
use std::fmt;

/// Operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Opcode {
    /// Do nothing
    Nop = 0,
    /// Fail unconditionally
    Fail = 1,
    /// Push a choice frame whose fallback is the operand target
    Alt = 2,
    /// Drop the top choice frame
    Succ = 3,
    /// Unconditional relative jump
    Jump = 4,
    /// Push a return address and jump to a nonterminal
    Call = 5,
    /// Return to the address on top of the stack
    Ret = 6,
    /// Push the current position
    Pos = 7,
    /// Pop a position into the cursor
    Back = 8,
    /// Loop progress check on the top frame
    Skip = 9,
    /// Match one byte
    Byte = 10,
    /// Match any byte
    Any = 11,
    /// Match a string
    Str = 12,
    /// Match a byte in a set
    Set = 13,
    /// Negative lookahead for a byte
    NByte = 14,
    /// Succeed only at end of input
    NAny = 15,
    /// Negative lookahead for a string
    NStr = 16,
    /// Negative lookahead for a byte set
    NSet = 17,
    /// Optional byte
    OByte = 18,
    /// Optional any byte
    OAny = 19,
    /// Optional string
    OStr = 20,
    /// Optional byte in a set
    OSet = 21,
    /// Zero or more of a byte
    RByte = 22,
    /// Consume the rest of the input
    RAny = 23,
    /// Zero or more of a string
    RStr = 24,
    /// Zero or more bytes in a set
    RSet = 25,
    /// Jump through a 256-entry table indexed by the next byte
    First = 27,
    /// Consult the memo table
    Lookup = 28,
    /// Record a successful rule in the memo table
    Memo = 29,
    /// Record a failed rule in the memo table and fail
    MemoFail = 30,
    /// Log a push
    TPush = 31,
    /// Log a pop
    TPop = 32,
    /// Log a left fold (swap)
    TLeftFold = 33,
    /// Log a new node
    TNew = 34,
    /// Log a capture
    TCapture = 35,
    /// Log a tag
    TTag = 36,
    /// Log a replacement value
    TReplace = 37,
    /// Push the current AST mark
    TStart = 38,
    /// Pop an AST mark and commit it
    TCommit = 39,
    /// Pop an AST mark and roll back to it
    TAbort = 40,
    /// Consult the memo table and link the cached node
    TLookup = 41,
    /// Record a successful rule with its node
    TMemo = 42,
    /// Push a symbol table savepoint
    SOpen = 43,
    /// Pop a symbol table savepoint and roll back to it
    SClose = 44,
    /// Add a scope mask
    SMask = 45,
    /// Bind the token since the saved position
    SDef = 46,
    /// Check that a constant string is bound
    SIsDef = 47,
    /// Check that a table has a symbol
    SExists = 48,
    /// Match the input against a table's symbol
    SMatch = 49,
    /// Check the token since the saved position equals a table's symbol
    SIs = 50,
    /// Check the token since the saved position is bound in a table
    SIsa = 51,
    /// Stop and return a status
    Exit = 54,
    /// One-bit-plane jump table
    TblJump1 = 55,
    /// Two-bit-plane jump table
    TblJump2 = 56,
    /// Three-bit-plane jump table
    TblJump3 = 57,
}

/// Kinds of operands, in encoding order within an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// Literal byte (u8)
    Byte,
    /// Memo state (u8)
    State,
    /// Exit status (u8)
    Status,
    /// Position shift (i8)
    Shift,
    /// Relative displacement (i32)
    Disp,
    /// Nonterminal id (u16)
    Nonterm,
    /// String table id (u16)
    Str,
    /// Byte set table id (u16)
    Set,
    /// Tag table id used as a tag, label or symbol table name (u16)
    Tag,
    /// Memo id (u16)
    Memo,
    /// First table id (u16)
    First,
    /// Bit-plane jump table id (u16)
    JumpTable,
}

impl Operand {
    /// Encoded width in bytes
    #[inline]
    pub const fn width(self) -> usize {
        match self {
            Operand::Byte | Operand::State | Operand::Status | Operand::Shift => 1,
            Operand::Disp => 4,
            _ => 2,
        }
    }
}

impl Opcode {
    /// Decode an opcode byte
    pub fn from_u8(b: u8) -> Option<Self> {
        use Opcode::*;
        Some(match b {
            0 => Nop,
            1 => Fail,
            2 => Alt,
            3 => Succ,
            4 => Jump,
            5 => Call,
            6 => Ret,
            7 => Pos,
            8 => Back,
            9 => Skip,
            10 => Byte,
            11 => Any,
            12 => Str,
            13 => Set,
            14 => NByte,
            15 => NAny,
            16 => NStr,
            17 => NSet,
            18 => OByte,
            19 => OAny,
            20 => OStr,
            21 => OSet,
            22 => RByte,
            23 => RAny,
            24 => RStr,
            25 => RSet,
            27 => First,
            28 => Lookup,
            29 => Memo,
            30 => MemoFail,
            31 => TPush,
            32 => TPop,
            33 => TLeftFold,
            34 => TNew,
            35 => TCapture,
            36 => TTag,
            37 => TReplace,
            38 => TStart,
            39 => TCommit,
            40 => TAbort,
            41 => TLookup,
            42 => TMemo,
            43 => SOpen,
            44 => SClose,
            45 => SMask,
            46 => SDef,
            47 => SIsDef,
            48 => SExists,
            49 => SMatch,
            50 => SIs,
            51 => SIsa,
            54 => Exit,
            55 => TblJump1,
            56 => TblJump2,
            57 => TblJump3,
            _ => return None,
        })
    }

    /// Operand layout of this opcode
    pub fn operands(self) -> &'static [Operand] {
        use Opcode::*;
        use Operand as O;
        match self {
            Nop | Fail | Succ | Ret | Pos | Back | Skip | Any | NAny | OAny | RAny | TPush
            | TStart | TAbort | SOpen | SClose => &[],
            Alt | Jump => &[O::Disp],
            Call => &[O::Nonterm, O::Disp],
            Byte | NByte | OByte | RByte => &[O::Byte],
            Str | NStr | OStr | RStr | TReplace => &[O::Str],
            Set | NSet | OSet | RSet => &[O::Set],
            First => &[O::First],
            Lookup => &[O::State, O::Memo, O::Disp],
            Memo | MemoFail | TMemo => &[O::State, O::Memo],
            TPop | TTag | TCommit => &[O::Tag],
            TLeftFold => &[O::Shift, O::Tag],
            TNew | TCapture => &[O::Shift],
            TLookup => &[O::State, O::Tag, O::Memo, O::Disp],
            SMask | SDef | SExists | SMatch | SIs | SIsa => &[O::Tag],
            SIsDef => &[O::Tag, O::Str],
            Exit => &[O::Status],
            TblJump1 | TblJump2 | TblJump3 => &[O::JumpTable],
        }
    }

    /// Total encoded size including the opcode byte
    #[inline]
    pub fn size(self) -> usize {
        1 + self.operands().iter().map(|o| o.width()).sum::<usize>()
    }

    /// Mnemonic
    pub fn name(self) -> &'static str {
        use Opcode::*;
        match self {
            Nop => "Nop",
            Fail => "Fail",
            Alt => "Alt",
            Succ => "Succ",
            Jump => "Jump",
            Call => "Call",
            Ret => "Ret",
            Pos => "Pos",
            Back => "Back",
            Skip => "Skip",
            Byte => "Byte",
            Any => "Any",
            Str => "Str",
            Set => "Set",
            NByte => "NByte",
            NAny => "NAny",
            NStr => "NStr",
            NSet => "NSet",
            OByte => "OByte",
            OAny => "OAny",
            OStr => "OStr",
            OSet => "OSet",
            RByte => "RByte",
            RAny => "RAny",
            RStr => "RStr",
            RSet => "RSet",
            First => "First",
            Lookup => "Lookup",
            Memo => "Memo",
            MemoFail => "MemoFail",
            TPush => "TPush",
            TPop => "TPop",
            TLeftFold => "TLeftFold",
            TNew => "TNew",
            TCapture => "TCapture",
            TTag => "TTag",
            TReplace => "TReplace",
            TStart => "TStart",
            TCommit => "TCommit",
            TAbort => "TAbort",
            TLookup => "TLookup",
            TMemo => "TMemo",
            SOpen => "SOpen",
            SClose => "SClose",
            SMask => "SMask",
            SDef => "SDef",
            SIsDef => "SIsDef",
            SExists => "SExists",
            SMatch => "SMatch",
            SIs => "SIs",
            SIsa => "SIsa",
            Exit => "Exit",
            TblJump1 => "TblJump1",
            TblJump2 => "TblJump2",
            TblJump3 => "TblJump3",
        }
    }

    /// Decode the opcode at `pc`
    #[inline]
    pub fn decode(code: &[u8], pc: usize) -> Result<Self, VmError> {
        let b = *code.get(pc).ok_or(VmError::TruncatedInstruction { pc })?;
        Self::from_u8(b).ok_or(VmError::InvalidOpcode { opcode: b, pc })
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Operand readers
// ============================================================================

#[inline(always)]
pub(crate) fn read_u8(code: &[u8], at: usize) -> u8 {
    code[at]
}

#[inline(always)]
pub(crate) fn read_i8(code: &[u8], at: usize) -> i8 {
    code[at] as i8
}

#[inline(always)]
pub(crate) fn read_u16(code: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([code[at], code[at + 1]])
}

#[inline(always)]
pub(crate) fn read_i32(code: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([code[at], code[at + 1], code[at + 2], code[at + 3]])
}

/// Resolve a displacement relative to the end of an instruction
#[inline(always)]
pub(crate) fn resolve(end: usize, disp: i32) -> usize {
    (end as i64 + disp as i64) as usize
}
