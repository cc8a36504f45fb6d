//! Frame and operand stack
//!
//! One fixed-capacity arena holds choice frames, return addresses, saved
//! positions and saved marks. Frames are chained through `fp`: each frame
//! records the index of the frame below it, so unwinding to the current frame
//! discards every operand pushed above it.

use super::ast::AstMark;
use super::error::VmError;
use super::symtab::SymbolMark;

/// Default stack capacity in slots
pub const DEFAULT_STACK_SIZE: usize = 128 * 1024;

/// A choice point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Index of the previous frame, if any
    pub prev: Option<usize>,
    /// Saved input position
    pub pos: usize,
    /// Address to continue at when the frame is failed into
    pub next: usize,
    /// AST log mark
    pub ast: AstMark,
    /// Symbol table savepoint
    pub sym: SymbolMark,
}

/// A stack slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Choice frame
    Frame(Frame),
    /// Return address pushed by `Call`
    Return(usize),
    /// Input position pushed by `Pos`
    Pos(usize),
    /// AST mark pushed by `TStart`
    AstMark(AstMark),
    /// Symbol savepoint pushed by `SOpen`
    SymMark(SymbolMark),
}

/// Fixed-capacity stack of [`Slot`]s
#[derive(Debug)]
pub struct Stack {
    slots: Vec<Slot>,
    capacity: usize,
    fp: Option<usize>,
}

macro_rules! pop_as {
    ($name:ident, $variant:ident, $ty:ty, $what:literal) => {
        #[doc = concat!("Pop a ", $what)]
        #[inline]
        pub fn $name(&mut self, pc: usize) -> Result<$ty, VmError> {
            match self.pop(pc)? {
                Slot::$variant(v) => Ok(v),
                _ => Err(VmError::StackMismatch {
                    pc,
                    expected: $what,
                }),
            }
        }
    };
}

impl Stack {
    /// Create a stack holding at most `capacity` slots
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            fp: None,
        }
    }

    /// Maximum number of slots
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots in use
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the stack is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether a frame is on the stack
    #[inline]
    pub fn has_frame(&self) -> bool {
        self.fp.is_some()
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.slots.clear();
        self.fp = None;
    }

    /// Push an operand slot
    #[inline]
    pub fn push(&mut self, slot: Slot, pc: usize) -> Result<(), VmError> {
        if self.slots.len() >= self.capacity {
            return Err(VmError::StackOverflow {
                capacity: self.capacity,
                pc,
            });
        }
        self.slots.push(slot);
        Ok(())
    }

    /// Pop any slot
    #[inline]
    pub fn pop(&mut self, pc: usize) -> Result<Slot, VmError> {
        let slot = self.slots.pop().ok_or(VmError::StackUnderflow { pc })?;
        if let Slot::Frame(frame) = slot {
            // Popping a frame as an operand still unlinks it
            self.fp = frame.prev;
        }
        Ok(slot)
    }

    pop_as!(pop_return, Return, usize, "return address");
    pop_as!(pop_pos, Pos, usize, "position");
    pop_as!(pop_ast_mark, AstMark, AstMark, "AST mark");
    pop_as!(pop_sym_mark, SymMark, SymbolMark, "symbol savepoint");

    /// Push a choice frame and make it current
    #[inline]
    pub fn push_frame(
        &mut self,
        pos: usize,
        next: usize,
        ast: AstMark,
        sym: SymbolMark,
        pc: usize,
    ) -> Result<(), VmError> {
        let index = self.slots.len();
        self.push(
            Slot::Frame(Frame {
                prev: self.fp,
                pos,
                next,
                ast,
                sym,
            }),
            pc,
        )?;
        self.fp = Some(index);
        Ok(())
    }

    /// Pop the current frame together with every slot above it
    #[inline]
    pub fn pop_frame(&mut self, pc: usize) -> Result<Frame, VmError> {
        let fp = self.fp.ok_or(VmError::StackUnderflow { pc })?;
        let frame = match self.slots[fp] {
            Slot::Frame(frame) => frame,
            _ => {
                return Err(VmError::StackMismatch {
                    pc,
                    expected: "frame",
                })
            }
        };
        self.slots.truncate(fp);
        self.fp = frame.prev;
        Ok(frame)
    }

    /// The current frame
    #[inline]
    pub fn frame_mut(&mut self, pc: usize) -> Result<&mut Frame, VmError> {
        let fp = self.fp.ok_or(VmError::StackUnderflow { pc })?;
        match &mut self.slots[fp] {
            Slot::Frame(frame) => Ok(frame),
            _ => Err(VmError::StackMismatch {
                pc,
                expected: "frame",
            }),
        }
    }

    /// Number of frames on the stack
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut fp = self.fp;
        while let Some(i) = fp {
            depth += 1;
            fp = match self.slots[i] {
                Slot::Frame(frame) => frame.prev,
                _ => None,
            };
        }
        depth
    }
}
