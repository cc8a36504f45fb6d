//! PEG bytecode virtual machine
//!
//! # Module Organization
//!
//! ## Dispatch Core
//! - [`Runtime`] - Interpreter: registers, frame stack and the failure protocol
//! - [`RuntimeConfig`] - Stack size, memo window, input and time limits
//! - [`Stack`] - Fixed-capacity frame/operand stack
//!
//! ## Programs
//! - [`Program`] - Validated instruction buffer plus constant tables
//! - [`Opcode`] - Instruction set and operand layout
//! - [`ProgramBuilder`] - Label-resolving assembler
//! - [`ByteSet`] - 256-bit byte class
//!
//! ## Parse State
//! - [`AstLog`] - Transactional tree construction log
//! - [`MemoTable`] - Direct-mapped memo table
//! - [`SymbolTable`] - Backtracking symbol table
//! - [`NodeArena`] - Refcounted tree nodes
//!
//! ## Diagnostics
//! - [`Stats`] - Execution counters
//! - [`debug`] - Tree printer and disassembler
//! - [`source_location`] - Line/column tracking
//!
//! ## Export
//! - [`transform`] - Node trees as JSON values
//! - [`parallel`] - Batch parsing

// ============================================================================
// Module Declarations
// ============================================================================

pub mod assembler;
pub mod ast;
pub mod byte_set;
pub mod debug;
pub mod error;
pub mod instruction;
pub mod memo;
pub mod node;
pub mod program;
pub mod runtime;
pub mod source_location;
pub mod stack;
pub mod stats;
pub mod symtab;
pub mod transform;

// Batch parsing (always available, uses rayon when feature is enabled)
pub mod parallel;

// ============================================================================
// Dispatch Core
// ============================================================================

pub use runtime::{
    CancelToken, ExitStatus, Runtime, RuntimeConfig, DEFAULT_MAX_INPUT_SIZE, DEFAULT_TIMEOUT_MS,
};
pub use stack::{Frame, Slot, Stack, DEFAULT_STACK_SIZE};

// ============================================================================
// Programs
// ============================================================================

pub use assembler::{Label, ProgramBuilder};
pub use byte_set::ByteSet;
pub use instruction::{Opcode, Operand};
pub use program::{
    JumpTable, MemoId, NontermId, Nonterminal, Program, ProgramParts, SetId, StrId, TagId,
    FAILURE_EXIT, NO_TAG, SUCCESS_EXIT,
};

// ============================================================================
// Parse State
// ============================================================================

pub use ast::{AstLog, AstMark, LogEntry, DEFAULT_AST_LOG_CAPACITY};
pub use memo::{MemoEntry, MemoResult, MemoTable, DEFAULT_MEMO_WINDOW};
pub use node::{ArenaStats, Children, Edge, Node, NodeArena, NodeId};
pub use symtab::{SymbolMark, SymbolTable, Token};

// ============================================================================
// Diagnostics
// ============================================================================

pub use debug::{disassemble, TreePrinter};
pub use error::VmError;
pub use source_location::SourcePosition;
pub use stats::Stats;

// ============================================================================
// Export
// ============================================================================

pub use parallel::{parse_batch_parallel, parse_batch_with_config, BatchResult, ParallelConfig};
pub use transform::{node_to_json, node_to_value};
