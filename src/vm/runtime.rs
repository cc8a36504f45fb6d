//! Bytecode interpreter
//!
//! [`Runtime`] executes a [`Program`] against an input buffer. It owns the
//! frame stack, the AST log, the symbol table, the memo table and the node
//! arena for one parse at a time; none of these are shared between runtimes.
//!
//! # Failure protocol
//!
//! Every matching instruction that fails unwinds the current choice frame:
//! the position is restored if the frame's saved position is behind it (the
//! furthest position reached is kept in `head`), the AST log and the symbol
//! table are rolled back to the frame's marks, and execution continues at
//! the frame's fallback address. Nothing else undoes side effects.
//!
//! # Example
//!
//! ```rust
//! use pegvm::vm::{ExitStatus, ProgramBuilder, Runtime};
//!
//! let mut b = ProgramBuilder::new();
//! let start = b.label();
//! b.entry(start);
//! b.bind(start);
//! b.str(b"hello");
//! b.ret();
//! let program = b.build().unwrap();
//!
//! let mut runtime = Runtime::new(&program);
//! assert_eq!(runtime.parse(b"hello world").unwrap(), ExitStatus::Success);
//! assert_eq!(runtime.pos(), 5);
//! ```

use super::ast::{AstLog, DEFAULT_AST_LOG_CAPACITY};
use super::error::VmError;
use super::instruction::{read_i32, read_i8, read_u16, read_u8, resolve, Opcode};
use super::memo::{MemoTable, DEFAULT_MEMO_WINDOW};
use super::node::{NodeArena, NodeId};
use super::program::{Program, FAILURE_EXIT, SUCCESS_EXIT};
use super::source_location::{render_caret, SourcePosition};
use super::stack::{Slot, Stack, DEFAULT_STACK_SIZE};
use super::stats::Stats;
use super::symtab::{SymbolTable, Token};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Logging macros - no-op when logging feature is disabled
#[cfg(not(feature = "logging"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {};
}

/// Logging macros - use log crate when logging feature is enabled
#[cfg(feature = "logging")]
macro_rules! log_debug {
    ($($arg:tt)*) => { log::debug!($($arg)*) };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_trace {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "logging")]
macro_rules! log_trace {
    ($($arg:tt)*) => { log::trace!($($arg)*) };
}

/// Default maximum input size: 100 MB
pub const DEFAULT_MAX_INPUT_SIZE: usize = 100 * 1024 * 1024;

/// Default timeout in milliseconds (0 = no timeout)
pub const DEFAULT_TIMEOUT_MS: u64 = 0;

/// Number of `Call`/`Alt` instructions between timeout checks
const TIMEOUT_CHECK_INTERVAL: u64 = 1024;

/// Runtime configuration
///
/// # Example
///
/// ```rust
/// use pegvm::vm::RuntimeConfig;
///
/// let config = RuntimeConfig::new()
///     .with_stack_size(4096)
///     .with_memo_window(64)
///     .with_timeout_ms(5000);
/// assert_eq!(config.stack_size, 4096);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Frame/operand stack capacity in slots
    pub stack_size: usize,

    /// Initial capacity of the AST log
    pub ast_log_capacity: usize,

    /// Positions remembered per rule by the memo table
    pub memo_window: usize,

    /// Maximum allowed input size in bytes
    pub max_input_size: usize,

    /// Timeout in milliseconds (0 = no timeout)
    pub timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            ast_log_capacity: DEFAULT_AST_LOG_CAPACITY,
            memo_window: DEFAULT_MEMO_WINDOW,
            max_input_size: DEFAULT_MAX_INPUT_SIZE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl RuntimeConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stack capacity in slots
    pub fn with_stack_size(mut self, slots: usize) -> Self {
        self.stack_size = slots;
        self
    }

    /// Set the initial AST log capacity
    pub fn with_ast_log_capacity(mut self, capacity: usize) -> Self {
        self.ast_log_capacity = capacity;
        self
    }

    /// Set the number of positions remembered per rule
    pub fn with_memo_window(mut self, window: usize) -> Self {
        self.memo_window = window;
        self
    }

    /// Set the maximum input size
    pub fn with_max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = size;
        self
    }

    /// Set the timeout in milliseconds
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }
}

/// Shared flag used to cancel a running parse from another thread
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Outcome of a finished parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// `Exit 0` was reached
    Success,
    /// `Exit` with a nonzero status was reached
    Failure(u8),
}

impl ExitStatus {
    /// Map an `Exit` operand to a status
    #[inline]
    pub fn from_code(code: u8) -> Self {
        if code == 0 {
            ExitStatus::Success
        } else {
            ExitStatus::Failure(code)
        }
    }

    /// The raw status code
    #[inline]
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure(code) => code,
        }
    }

    /// Whether the parse succeeded
    #[inline]
    pub fn is_success(self) -> bool {
        self == ExitStatus::Success
    }
}

/// The interpreter state for one parse at a time
pub struct Runtime<'p> {
    program: &'p Program,
    config: RuntimeConfig,
    stack: Stack,
    ast: AstLog,
    symtab: SymbolTable,
    memo: MemoTable,
    nodes: NodeArena,
    /// Input cursor
    pos: usize,
    /// Furthest position reached before a failure
    head: usize,
    cancel: Option<CancelToken>,
    start_time: Option<Instant>,
    boundary_count: u64,
}

impl<'p> Runtime<'p> {
    /// Create a runtime with the default configuration
    pub fn new(program: &'p Program) -> Self {
        Self::with_config(program, RuntimeConfig::default())
    }

    /// Create a runtime with a custom configuration
    pub fn with_config(program: &'p Program, config: RuntimeConfig) -> Self {
        log_debug!(
            "runtime: {} bytes of code, stack {} slots, memo window {}",
            program.code().len(),
            config.stack_size,
            config.memo_window
        );
        Self {
            program,
            config,
            stack: Stack::new(config.stack_size),
            ast: AstLog::with_capacity(config.ast_log_capacity),
            symtab: SymbolTable::new(),
            memo: MemoTable::new(config.memo_window, program.memo_size()),
            nodes: NodeArena::new(),
            pos: 0,
            head: 0,
            cancel: None,
            start_time: None,
            boundary_count: 0,
        }
    }

    /// Attach a cancellation token, polled at `Call` and `Alt`
    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.cancel = Some(token);
    }

    /// The program being executed
    #[inline]
    pub fn program(&self) -> &'p Program {
        self.program
    }

    /// The configuration
    #[inline]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Current input position
    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Furthest input position reached
    #[inline]
    pub fn head(&self) -> usize {
        self.head
    }

    /// Node arena holding the parse tree
    #[inline]
    pub fn nodes(&self) -> &NodeArena {
        &self.nodes
    }

    /// Mutable node arena, for releasing trees
    #[inline]
    pub fn nodes_mut(&mut self) -> &mut NodeArena {
        &mut self.nodes
    }

    /// The AST log
    #[inline]
    pub fn ast(&self) -> &AstLog {
        &self.ast
    }

    /// The symbol table
    #[inline]
    pub fn symtab(&self) -> &SymbolTable {
        &self.symtab
    }

    /// The memo table
    #[inline]
    pub fn memo(&self) -> &MemoTable {
        &self.memo
    }

    /// Tear down AST log, symbol table, memo table and stack for a new input
    ///
    /// Trees handed out by [`parsed_node`](Self::parsed_node) stay alive
    /// until their owner releases them.
    pub fn reset(&mut self) {
        log_debug!("runtime reset");
        self.ast.reset(&mut self.nodes);
        self.symtab.clear();
        self.memo.dispose(&mut self.nodes);
        self.stack.clear();
        self.pos = 0;
        self.head = 0;
    }

    /// Prime the stack for a parse of `input` starting at `pc`
    ///
    /// Pushes the outermost choice frame (falling back to the failure exit)
    /// and the return address of the success exit, and returns `pc`.
    pub fn parse_init(&mut self, input: &[u8], pc: usize) -> Result<usize, VmError> {
        if input.len() > self.config.max_input_size {
            return Err(VmError::InputTooLarge {
                input_size: input.len(),
                max_size: self.config.max_input_size,
            });
        }

        self.stack.clear();
        self.pos = 0;
        self.head = 0;
        self.boundary_count = 0;
        self.start_time = (self.config.timeout_ms > 0).then(Instant::now);

        self.stack.push_frame(
            self.pos,
            FAILURE_EXIT,
            self.ast.save_tx(),
            self.symtab.savepoint(),
            pc,
        )?;
        self.stack.push(Slot::Return(SUCCESS_EXIT), pc)?;
        Ok(pc)
    }

    /// Reset, prime and run the program from its entry point
    pub fn parse(&mut self, input: &[u8]) -> Result<ExitStatus, VmError> {
        self.run(input, None)
    }

    /// Like [`parse`](Self::parse), counting into `stats`
    pub fn parse_with_stats(
        &mut self,
        input: &[u8],
        stats: &mut Stats,
    ) -> Result<ExitStatus, VmError> {
        self.run(input, Some(stats))
    }

    fn run(&mut self, input: &[u8], stats: Option<&mut Stats>) -> Result<ExitStatus, VmError> {
        self.reset();
        let pc = self.parse_init(input, self.program.entry())?;
        let result = self.execute(input, pc, stats);
        if let Err(_err) = &result {
            log_debug!("parse aborted at pos {}: {}", self.pos, _err);
        }
        result
    }

    /// The tree committed by a successful parse
    ///
    /// The first call hands one reference to the caller, who releases it
    /// through [`nodes_mut`](Self::nodes_mut) when done.
    pub fn parsed_node(&mut self) -> Option<NodeId> {
        self.ast.parsed_node(&mut self.nodes)
    }

    /// Describe where a failed parse got stuck
    pub fn failure_report(&self, input: &[u8]) -> String {
        let sp = SourcePosition::from_offset(input, self.head);
        format!(
            "Parse failed at {} (byte offset {})\n{}",
            sp,
            self.head,
            render_caret(input, self.head)
        )
    }

    /// Unwind the current frame
    #[inline]
    fn fail(&mut self, pc: usize) -> Result<usize, VmError> {
        let frame = self.stack.pop_frame(pc)?;
        log_trace!("fail at pc {} pos {}: resume at {}", pc, self.pos, frame.next);
        if frame.pos < self.pos {
            self.head = self.head.max(self.pos);
            self.pos = frame.pos;
        }
        self.ast.rollback_tx(&mut self.nodes, frame.ast);
        self.symtab.rollback(frame.sym);
        Ok(frame.next)
    }

    /// Poll cancellation and the timeout at a `Call`/`Alt` boundary
    #[inline]
    fn check_boundary(&mut self, pc: usize) -> Result<(), VmError> {
        if let Some(token) = &self.cancel {
            if token.is_cancelled() {
                return Err(VmError::Cancelled { pc });
            }
        }
        if self.config.timeout_ms == 0 {
            return Ok(());
        }

        self.boundary_count += 1;
        if self.boundary_count % TIMEOUT_CHECK_INTERVAL != 0 {
            return Ok(());
        }
        if let Some(start) = self.start_time {
            let elapsed_ms = start.elapsed().as_millis() as u64;
            if elapsed_ms > self.config.timeout_ms {
                return Err(VmError::TimeoutExceeded {
                    elapsed_ms,
                    timeout_ms: self.config.timeout_ms,
                });
            }
        }
        Ok(())
    }

    /// Run from `pc` until an `Exit` instruction
    ///
    /// # Errors
    /// Returns an error if:
    /// - the stack was not primed by [`parse_init`](Self::parse_init)
    /// - the stack overflows or an instruction pops the wrong kind of slot
    /// - the parse is cancelled or times out
    pub fn execute(
        &mut self,
        input: &[u8],
        mut pc: usize,
        mut stats: Option<&mut Stats>,
    ) -> Result<ExitStatus, VmError> {
        if !self.stack.has_frame() {
            return Err(VmError::NotInitialized);
        }
        log_debug!("execute: {} bytes of input from pc {}", input.len(), pc);

        let program = self.program;
        let code = program.code();

        macro_rules! count {
            ($field:ident) => {
                if let Some(s) = stats.as_deref_mut() {
                    s.$field += 1;
                }
            };
        }

        loop {
            let at = pc;
            let op = Opcode::decode(code, at)?;
            pc = at + op.size();
            count!(inst_count);

            // Evaluates to `true` when the instruction failed
            let failed = match op {
                Opcode::Nop => false,
                Opcode::Fail => true,
                Opcode::Alt => {
                    let next = resolve(pc, read_i32(code, at + 1));
                    self.stack.push_frame(
                        self.pos,
                        next,
                        self.ast.save_tx(),
                        self.symtab.savepoint(),
                        at,
                    )?;
                    count!(alt_count);
                    self.check_boundary(at)?;
                    false
                }
                Opcode::Succ => {
                    self.stack.pop_frame(at)?;
                    false
                }
                Opcode::Jump => {
                    pc = resolve(pc, read_i32(code, at + 1));
                    false
                }
                Opcode::Call => {
                    let nonterm = read_u16(code, at + 1);
                    self.stack.push(Slot::Return(pc), at)?;
                    if let Some(s) = stats.as_deref_mut() {
                        s.count_call(nonterm);
                    }
                    self.check_boundary(at)?;
                    pc = resolve(pc, read_i32(code, at + 3));
                    false
                }
                Opcode::Ret => {
                    pc = self.stack.pop_return(at)?;
                    false
                }
                Opcode::Pos => {
                    self.stack.push(Slot::Pos(self.pos), at)?;
                    false
                }
                Opcode::Back => {
                    self.pos = self.stack.pop_pos(at)?;
                    false
                }
                Opcode::Skip => {
                    let (pos, ast, sym) = (self.pos, self.ast.save_tx(), self.symtab.savepoint());
                    let frame = self.stack.frame_mut(at)?;
                    if frame.pos == pos {
                        true
                    } else {
                        frame.pos = pos;
                        frame.ast = ast;
                        frame.sym = sym;
                        false
                    }
                }

                // Matching
                Opcode::Byte => {
                    let c = read_u8(code, at + 1);
                    if input.get(self.pos) == Some(&c) {
                        self.pos += 1;
                        false
                    } else {
                        true
                    }
                }
                Opcode::Any => {
                    if self.pos < input.len() {
                        self.pos += 1;
                        false
                    } else {
                        true
                    }
                }
                Opcode::Str => {
                    let s = program.string(read_u16(code, at + 1));
                    if input[self.pos..].starts_with(s) {
                        self.pos += s.len();
                        false
                    } else {
                        true
                    }
                }
                Opcode::Set => {
                    let set = program.set(read_u16(code, at + 1));
                    if input.get(self.pos).is_some_and(|&b| set.contains(b)) {
                        self.pos += 1;
                        false
                    } else {
                        true
                    }
                }
                Opcode::NByte => input.get(self.pos) == Some(&read_u8(code, at + 1)),
                Opcode::NAny => self.pos < input.len(),
                Opcode::NStr => input[self.pos..].starts_with(program.string(read_u16(code, at + 1))),
                Opcode::NSet => {
                    let set = program.set(read_u16(code, at + 1));
                    input.get(self.pos).is_some_and(|&b| set.contains(b))
                }
                Opcode::OByte => {
                    if input.get(self.pos) == Some(&read_u8(code, at + 1)) {
                        self.pos += 1;
                    }
                    false
                }
                Opcode::OAny => {
                    if self.pos < input.len() {
                        self.pos += 1;
                    }
                    false
                }
                Opcode::OStr => {
                    let s = program.string(read_u16(code, at + 1));
                    if input[self.pos..].starts_with(s) {
                        self.pos += s.len();
                    }
                    false
                }
                Opcode::OSet => {
                    let set = program.set(read_u16(code, at + 1));
                    if input.get(self.pos).is_some_and(|&b| set.contains(b)) {
                        self.pos += 1;
                    }
                    false
                }
                Opcode::RByte => {
                    let c = read_u8(code, at + 1);
                    self.pos += input[self.pos..].iter().take_while(|&&b| b == c).count();
                    false
                }
                Opcode::RAny => {
                    self.pos = input.len();
                    false
                }
                Opcode::RStr => {
                    let s = program.string(read_u16(code, at + 1));
                    if !s.is_empty() {
                        while input[self.pos..].starts_with(s) {
                            self.pos += s.len();
                        }
                    }
                    false
                }
                Opcode::RSet => {
                    let set = program.set(read_u16(code, at + 1));
                    self.pos += input[self.pos..]
                        .iter()
                        .take_while(|&&b| set.contains(b))
                        .count();
                    false
                }

                // Multi-way dispatch; end of input dispatches as byte 0
                Opcode::First => {
                    let table = program.first_table(read_u16(code, at + 1));
                    let b = input.get(self.pos).copied().unwrap_or(0);
                    pc = resolve(pc, table[b as usize]);
                    false
                }
                Opcode::TblJump1 | Opcode::TblJump2 | Opcode::TblJump3 => {
                    let table = program.jump_table(read_u16(code, at + 1));
                    let b = input.get(self.pos).copied().unwrap_or(0);
                    pc = resolve(pc, table.jumps[table.index(b)]);
                    false
                }

                // Memoization
                Opcode::Lookup | Opcode::TLookup => {
                    let state = read_u8(code, at + 1);
                    let (label, memo_id, disp) = if op == Opcode::TLookup {
                        (
                            Some(read_u16(code, at + 2)),
                            read_u16(code, at + 4),
                            read_i32(code, at + 6),
                        )
                    } else {
                        (None, read_u16(code, at + 2), read_i32(code, at + 4))
                    };
                    match self.memo.lookup(self.pos, memo_id, state) {
                        Some(entry) if entry.is_failure() => {
                            count!(memo_fail_hit);
                            true
                        }
                        Some(entry) => {
                            count!(memo_hit);
                            self.pos += entry.consumed();
                            if let (Some(label), Some(node)) = (label, entry.node()) {
                                self.ast.log_link(&mut self.nodes, label, node);
                            }
                            pc = resolve(pc, disp);
                            false
                        }
                        None => {
                            count!(memo_miss);
                            false
                        }
                    }
                }
                Opcode::Memo | Opcode::TMemo => {
                    let state = read_u8(code, at + 1);
                    let memo_id = read_u16(code, at + 2);
                    let frame = self.stack.pop_frame(at)?;
                    let node = if op == Opcode::TMemo {
                        self.ast.last_linked_node()
                    } else {
                        None
                    };
                    let consumed = self.pos.saturating_sub(frame.pos);
                    let evicted =
                        self.memo
                            .record(&mut self.nodes, frame.pos, memo_id, node, consumed, state);
                    count!(memo_store);
                    if evicted {
                        log_trace!("memo {} at {} evicted a previous entry", memo_id, frame.pos);
                        count!(memo_evict);
                    }
                    false
                }
                Opcode::MemoFail => {
                    let state = read_u8(code, at + 1);
                    let memo_id = read_u16(code, at + 2);
                    if self
                        .memo
                        .record_failure(&mut self.nodes, self.pos, memo_id, state)
                    {
                        count!(memo_evict);
                    }
                    count!(memo_store);
                    true
                }

                // Tree construction
                Opcode::TPush => {
                    self.ast.log_push();
                    false
                }
                Opcode::TPop => {
                    self.ast.log_pop(read_u16(code, at + 1));
                    false
                }
                Opcode::TLeftFold => {
                    let shift = read_i8(code, at + 1);
                    let label = read_u16(code, at + 2);
                    self.ast
                        .log_swap(self.pos.saturating_add_signed(shift as isize), label);
                    false
                }
                Opcode::TNew => {
                    let shift = read_i8(code, at + 1);
                    self.ast.log_new(self.pos.saturating_add_signed(shift as isize));
                    false
                }
                Opcode::TCapture => {
                    let shift = read_i8(code, at + 1);
                    self.ast
                        .log_capture(self.pos.saturating_add_signed(shift as isize));
                    false
                }
                Opcode::TTag => {
                    self.ast.log_tag(read_u16(code, at + 1));
                    false
                }
                Opcode::TReplace => {
                    self.ast.log_replace(read_u16(code, at + 1));
                    false
                }
                Opcode::TStart => {
                    self.stack.push(Slot::AstMark(self.ast.save_tx()), at)?;
                    false
                }
                Opcode::TCommit => {
                    let label = read_u16(code, at + 1);
                    let mark = self.stack.pop_ast_mark(at)?;
                    self.ast.commit_tx(&mut self.nodes, label, mark);
                    false
                }
                Opcode::TAbort => {
                    let mark = self.stack.pop_ast_mark(at)?;
                    self.ast.rollback_tx(&mut self.nodes, mark);
                    false
                }

                // Symbol table
                Opcode::SOpen => {
                    self.stack.push(Slot::SymMark(self.symtab.savepoint()), at)?;
                    false
                }
                Opcode::SClose => {
                    let mark = self.stack.pop_sym_mark(at)?;
                    self.symtab.rollback(mark);
                    false
                }
                Opcode::SMask => {
                    self.symtab.add_mask(read_u16(code, at + 1));
                    count!(sym_mask);
                    false
                }
                Opcode::SDef => {
                    let start = self.stack.pop_pos(at)?.min(self.pos);
                    self.symtab
                        .add(read_u16(code, at + 1), Token::new(start, self.pos), input);
                    count!(sym_def);
                    false
                }
                Opcode::SIsDef => {
                    let table = read_u16(code, at + 1);
                    let s = program.string(read_u16(code, at + 3));
                    count!(sym_contains);
                    !self.symtab.contains(table, s, input)
                }
                Opcode::SExists => {
                    count!(sym_exists);
                    !self.symtab.has_symbol(read_u16(code, at + 1))
                }
                Opcode::SMatch => {
                    count!(sym_get);
                    match self.symtab.get_symbol(read_u16(code, at + 1)) {
                        Some(token) if input[self.pos..].starts_with(token.bytes(input)) => {
                            self.pos += token.end - token.start;
                            false
                        }
                        _ => true,
                    }
                }
                Opcode::SIs => {
                    let start = self.stack.pop_pos(at)?.min(self.pos);
                    count!(sym_get);
                    match self.symtab.get_symbol(read_u16(code, at + 1)) {
                        Some(token) => token.bytes(input) != &input[start..self.pos],
                        None => true,
                    }
                }
                Opcode::SIsa => {
                    let start = self.stack.pop_pos(at)?.min(self.pos);
                    count!(sym_contains);
                    !self
                        .symtab
                        .contains(read_u16(code, at + 1), &input[start..self.pos], input)
                }

                Opcode::Exit => {
                    let status = ExitStatus::from_code(read_u8(code, at + 1));
                    self.head = self.head.max(self.pos);
                    log_debug!(
                        "exit {:?} at pos {} (head {})",
                        status,
                        self.pos,
                        self.head
                    );
                    return Ok(status);
                }
            };

            if failed {
                count!(fail_count);
                pc = self.fail(at)?;
            }
        }
    }
}
