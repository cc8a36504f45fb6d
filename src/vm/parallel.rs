//! Batch parsing
//!
//! Parses many independent inputs against one [`Program`]. Every input gets
//! a private [`Runtime`], so nothing is shared between parses except the
//! read-only program.
//!
//! # Feature Flag
//!
//! Inputs are spread over a rayon thread pool when the `parallel` feature is
//! enabled and parsed one after another otherwise:
//!
//! ```toml
//! [dependencies]
//! pegvm = { version = "0.1", features = ["parallel"] }
//! ```
//!
//! # Example
//!
//! ```rust
//! use pegvm::vm::{parallel::parse_batch_parallel, ProgramBuilder};
//!
//! let mut b = ProgramBuilder::new();
//! let start = b.label_here();
//! b.entry(start);
//! b.str(b"hello");
//! b.ret();
//! let program = b.build().unwrap();
//!
//! let inputs: [&[u8]; 3] = [b"hello", b"help", b"hello!"];
//! let results = parse_batch_parallel(&program, &inputs);
//! assert!(results[0].is_success());
//! assert!(!results[1].is_success());
//! assert!(results[2].is_success());
//! ```

use super::error::VmError;
use super::program::Program;
use super::runtime::{ExitStatus, Runtime, RuntimeConfig};
use super::transform::node_to_value;
use serde_json::Value;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Outcome of parsing one input of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    /// Exit status, or the error that stopped the runtime
    pub status: Result<ExitStatus, VmError>,
    /// Furthest position reached
    pub head: usize,
    /// Exported tree of a successful parse
    pub tree: Option<Value>,
}

impl BatchResult {
    /// Whether the input parsed successfully
    pub fn is_success(&self) -> bool {
        matches!(self.status, Ok(ExitStatus::Success))
    }
}

/// Configuration for batch parsing
#[derive(Debug, Clone, Default)]
pub struct ParallelConfig {
    /// Configuration of every per-input runtime
    pub runtime: RuntimeConfig,
    /// Number of threads to use (None = rayon's global pool)
    pub num_threads: Option<usize>,
}

impl ParallelConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-input runtime configuration
    pub fn with_runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    /// Set the number of threads to use
    pub fn with_num_threads(mut self, n: usize) -> Self {
        self.num_threads = Some(n);
        self
    }
}

/// Parse one input with a fresh runtime and export its tree
fn parse_one(program: &Program, config: RuntimeConfig, input: &[u8]) -> BatchResult {
    let mut runtime = Runtime::with_config(program, config);
    let status = runtime.parse(input);
    let tree = match status {
        Ok(ExitStatus::Success) => runtime.parsed_node().map(|root| {
            let value = node_to_value(root, runtime.nodes(), program, input);
            runtime.nodes_mut().release(root);
            value
        }),
        _ => None,
    };
    BatchResult {
        status,
        head: runtime.head(),
        tree,
    }
}

/// Parse every input with default runtime settings
///
/// Results are in the same order as `inputs`.
pub fn parse_batch_parallel(program: &Program, inputs: &[&[u8]]) -> Vec<BatchResult> {
    parse_batch_with_config(program, inputs, &ParallelConfig::default())
}

/// Parse every input with explicit settings
#[cfg(feature = "parallel")]
pub fn parse_batch_with_config(
    program: &Program,
    inputs: &[&[u8]],
    config: &ParallelConfig,
) -> Vec<BatchResult> {
    let runtime = config.runtime;
    let run = || -> Vec<BatchResult> {
        inputs
            .par_iter()
            .map(|input| parse_one(program, runtime, input))
            .collect()
    };

    match config.num_threads {
        Some(n) => match rayon::ThreadPoolBuilder::new().num_threads(n).build() {
            Ok(pool) => pool.install(run),
            Err(_) => run(),
        },
        None => run(),
    }
}

/// Parse every input with explicit settings (sequential fallback)
#[cfg(not(feature = "parallel"))]
pub fn parse_batch_with_config(
    program: &Program,
    inputs: &[&[u8]],
    config: &ParallelConfig,
) -> Vec<BatchResult> {
    inputs
        .iter()
        .map(|input| parse_one(program, config.runtime, input))
        .collect()
}
