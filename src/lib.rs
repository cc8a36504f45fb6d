//! pegvm - PEG Bytecode Virtual Machine
//!
//! An interpreter for compiled parsing expression grammars. It provides:
//! - A backtracking dispatch loop over a flat bytecode buffer
//! - Transactional AST construction (failed branches never allocate nodes)
//! - Elastic packrat memoization with a fixed memory footprint
//! - A backtracking symbol table for context-sensitive grammars
//! - Refcounted parse tree nodes shared between memo table and tree
//! - An assembler, disassembler and tree printer
//!
//! ## Quick Start
//!
//! ```rust
//! use pegvm::vm::{ProgramBuilder, Runtime, TreePrinter};
//!
//! // Greeting = 'hello' ' '+ Name ;  Name = [a-z]+ #Name
//! let mut b = ProgramBuilder::new();
//! let greeting = b.label();
//! let name = b.label();
//! b.entry(greeting);
//! b.nonterminal("Greeting", greeting);
//! b.nonterminal("Name", name);
//!
//! b.bind(greeting);
//! b.tnew(0);
//! b.str(b"hello");
//! b.byte(b' ');
//! b.rbyte(b' ');
//! b.tstart();
//! b.call(name);
//! b.tcommit("name");
//! b.ttag("Greeting");
//! b.tcapture(0);
//! b.ret();
//!
//! b.bind(name);
//! b.tnew(0);
//! b.set(pegvm::vm::ByteSet::from_range(b'a', b'z'));
//! b.rset(pegvm::vm::ByteSet::from_range(b'a', b'z'));
//! b.ttag("Name");
//! b.tcapture(0);
//! b.ret();
//!
//! let program = b.build().unwrap();
//! let input = b"hello world";
//!
//! let mut runtime = Runtime::new(&program);
//! assert!(runtime.parse(input).unwrap().is_success());
//! let tree = runtime.parsed_node().unwrap();
//! let text = TreePrinter::new().print(tree, runtime.nodes(), &program, input);
//! assert_eq!(text, "#Greeting[\n  $name=#Name['world']\n]\n");
//! runtime.nodes_mut().release(tree);
//! ```
//!
//! ## Feature Flags
//!
//! - `logging` - Enable debug logging using the `log` crate
//! - `parallel` - Parse batches of inputs on a rayon thread pool

// Lint configuration for production quality
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::all)]
#![allow(clippy::new_without_default)]
#![allow(clippy::module_inception)]

// Prelude module for convenient imports
pub mod prelude;

pub mod vm;

/// Re-export commonly used types for convenience
pub use vm::{
    disassemble, ByteSet, ExitStatus, NodeArena, NodeId, Program, ProgramBuilder, Runtime,
    RuntimeConfig, Stats, TreePrinter, VmError,
};
