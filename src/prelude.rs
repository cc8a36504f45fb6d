//! Prelude module for convenient imports
//!
//! This module re-exports the most commonly used types from pegvm.
//! Importing this module with a wildcard import brings the core types into scope:
//!
//! ```
//! use pegvm::prelude::*;
//! ```
//!
//! # Re-exported Items
//!
//! ## Core Types
//! - [`Program`] - Validated bytecode program
//! - [`ProgramBuilder`] - Assembler producing programs
//! - [`Runtime`] - Bytecode interpreter
//! - [`RuntimeConfig`] - Runtime limits
//! - [`ExitStatus`] - Outcome of a parse
//!
//! ## Trees
//! - [`NodeArena`] - Refcounted node storage
//! - [`NodeId`] - Node handle
//! - [`TreePrinter`] - Tree pretty printer
//! - [`node_to_value()`] - Tree export to JSON
//!
//! ## Error Handling
//! - [`VmError`] - Runtime error type
//! - [`SourcePosition`] - Line/column of a byte offset

// ============================================================================
// Core Types
// ============================================================================

pub use crate::vm::{ByteSet, ExitStatus, Label, Program, ProgramBuilder, Runtime, RuntimeConfig};

// ============================================================================
// Trees
// ============================================================================

pub use crate::vm::{node_to_value, NodeArena, NodeId, TreePrinter};

// ============================================================================
// Error Handling
// ============================================================================

pub use crate::vm::{SourcePosition, Stats, VmError};
