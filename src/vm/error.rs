//! Runtime errors
//!
//! A failed parse is not an error: it is reported as [`ExitStatus::Failure`]
//! by the runtime. The variants here cover resource exhaustion and bytecode
//! that the dispatch loop cannot execute.
//!
//! [`ExitStatus::Failure`]: super::runtime::ExitStatus::Failure

use super::source_location::SourcePosition;
use std::fmt;

/// Errors raised while building, validating or executing a program
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    /// The frame/operand stack arena is full
    StackOverflow {
        /// Stack capacity in slots
        capacity: usize,
        /// Instruction that attempted the push
        pc: usize,
    },

    /// An instruction popped from an empty stack
    StackUnderflow {
        /// Instruction that attempted the pop
        pc: usize,
    },

    /// The popped stack slot does not have the kind the instruction needs
    StackMismatch {
        /// Instruction that attempted the pop
        pc: usize,
        /// Kind of slot the instruction expected
        expected: &'static str,
    },

    /// The byte at `pc` is not a known opcode
    InvalidOpcode {
        /// Raw opcode byte
        opcode: u8,
        /// Address of the instruction
        pc: usize,
    },

    /// The instruction at `pc` runs past the end of the code buffer
    TruncatedInstruction {
        /// Address of the instruction
        pc: usize,
    },

    /// An operand refers to a constant table entry that does not exist
    InvalidOperand {
        /// Address of the instruction
        pc: usize,
        /// Name of the constant table
        kind: &'static str,
        /// Index that was out of range
        index: usize,
    },

    /// The program is malformed (bad prologue, unbound label, jump out of range)
    InvalidProgram {
        /// Reason why the program is invalid
        reason: String,
    },

    /// Input exceeds maximum allowed size
    InputTooLarge {
        /// Size of the input in bytes
        input_size: usize,
        /// Maximum allowed size
        max_size: usize,
    },

    /// Timeout exceeded during parsing
    TimeoutExceeded {
        /// Time elapsed in milliseconds
        elapsed_ms: u64,
        /// Timeout limit in milliseconds
        timeout_ms: u64,
    },

    /// The parse was cancelled through its [`CancelToken`](super::runtime::CancelToken)
    Cancelled {
        /// Instruction at which cancellation was observed
        pc: usize,
    },

    /// `execute` was called before `parse_init` primed the stack
    NotInitialized,
}

impl VmError {
    /// Create an `InvalidProgram` error
    pub fn invalid_program(reason: impl Into<String>) -> Self {
        VmError::InvalidProgram {
            reason: reason.into(),
        }
    }

    /// Whether this error reports an exhausted resource rather than bad bytecode
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(
            self,
            VmError::StackOverflow { .. }
                | VmError::InputTooLarge { .. }
                | VmError::TimeoutExceeded { .. }
                | VmError::Cancelled { .. }
        )
    }

    /// Render the error together with the furthest input position reached
    pub fn format_with_position(&self, input: &[u8], head: usize) -> String {
        let sp = SourcePosition::from_offset(input, head);
        format!("{} (furthest position: {}, byte offset {})", self, sp, head)
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::StackOverflow { capacity, pc } => {
                write!(f, "Stack overflow: {} slots exhausted at pc {}", capacity, pc)
            }
            VmError::StackUnderflow { pc } => write!(f, "Stack underflow at pc {}", pc),
            VmError::StackMismatch { pc, expected } => {
                write!(f, "Stack mismatch at pc {}: expected {}", pc, expected)
            }
            VmError::InvalidOpcode { opcode, pc } => {
                write!(f, "Invalid opcode {} at pc {}", opcode, pc)
            }
            VmError::TruncatedInstruction { pc } => {
                write!(f, "Truncated instruction at pc {}", pc)
            }
            VmError::InvalidOperand { pc, kind, index } => {
                write!(f, "Invalid {} index {} at pc {}", kind, index, pc)
            }
            VmError::InvalidProgram { reason } => write!(f, "Invalid program: {}", reason),
            VmError::InputTooLarge {
                input_size,
                max_size,
            } => write!(
                f,
                "Input too large: {} bytes exceeds limit of {} bytes",
                input_size, max_size
            ),
            VmError::TimeoutExceeded {
                elapsed_ms,
                timeout_ms,
            } => write!(
                f,
                "Timeout exceeded: {}ms exceeds limit of {}ms",
                elapsed_ms, timeout_ms
            ),
            VmError::Cancelled { pc } => write!(f, "Parse cancelled at pc {}", pc),
            VmError::NotInitialized => write!(f, "Runtime not initialized: call parse_init first"),
        }
    }
}

impl std::error::Error for VmError {}
