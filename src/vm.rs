//! # The Jargon Stack Machine
//!
//! The machine owns three arrays and five registers:
//! - `code`: read-only instructions from the loader,
//! - `stack`: fixed-capacity array of [`StackItem`] cells, growing upward;
//!   `sp` is the next free slot,
//! - `heap`: fixed-capacity array of [`HeapItem`] cells, bump-allocated;
//!   `hp` is the next free slot,
//! - `fp`: base of the current activation record (`stack[fp]` holds the
//!   caller's frame pointer, `stack[fp + 1]` the return address, and the
//!   applied closure and its argument sit just below at `fp - 1`/`fp - 2`),
//! - `ep`: base of the innermost exception frame, or 0 when no `try` is
//!   active,
//! - `cp`: index of the next instruction.
//!
//! ## Stepping
//! [`Vm::step`] dispatches on `code[cp]`. Ordinary instructions advance
//! `cp` by one; jumps, calls, returns, and raises write `cp` themselves.
//! Instruction handlers live in the `ops_arith`, `ops_heap`, and
//! `ops_control` submodules.
//!
//! ## Faults
//! Two channels report trouble. Capacity violations (stack or heap
//! exhaustion, popping an empty stack, running past the code array) set a
//! terminal [`Status`] and stop the machine cleanly. Malformed states, where
//! a cell fails an instruction's precondition, surface as
//! [`RuntimeError`]s returned from `step`/`run`; they indicate a
//! miscompiled or hand-corrupted program and are not catchable by `raise`.
//!
//! ## Exception frames
//! `try` pushes a three-cell frame `ep fp ra` (saved exception pointer,
//! saved frame pointer, handler address) and points `ep` at its base.
//! `raise` unwinds straight to `stack[ep]` with no scanning; `untry` drops
//! the frame and restores `ep`. Because the machine installs a synthetic
//! first frame at startup, a real exception frame never starts at index 0,
//! so `ep == 0` unambiguously means "no handler".

use std::fmt;

use log::trace;

use crate::bytecode::{HeapIndex, HeapItem, Instr, StackIndex, StackItem};
use crate::error::RuntimeError;
use crate::input::Input;
use crate::loader::Program;
use crate::value::{self, Value};

mod ops_arith;
mod ops_control;
mod ops_heap;

#[cfg(test)]
mod tests;

/// Terminal and non-terminal machine states.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Running,
    Halted,
    CodeIndexOutOfBound,
    StackIndexOutOfBound,
    HeapIndexOutOfBound,
    StackUnderflow,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Running => f.write_str("running"),
            Status::Halted => f.write_str("halted"),
            Status::CodeIndexOutOfBound => f.write_str("code index out of bound"),
            Status::StackIndexOutOfBound => f.write_str("stack index out of bound"),
            Status::HeapIndexOutOfBound => f.write_str("heap index out of bound"),
            Status::StackUnderflow => f.write_str("stack underflow"),
        }
    }
}

/// Why an instruction could not complete: either a capacity violation that
/// becomes a terminal status, or a malformed state reported to the caller.
enum Fault {
    Status(Status),
    Error(RuntimeError),
}

impl From<RuntimeError> for Fault {
    fn from(e: RuntimeError) -> Fault {
        Fault::Error(e)
    }
}

type Exec<T = ()> = Result<T, Fault>;

/// The machine state.
pub struct Vm {
    code: Vec<Instr>,
    stack: Vec<StackItem>,
    heap: Vec<HeapItem>,
    sp: StackIndex,
    fp: StackIndex,
    ep: StackIndex,
    cp: usize,
    hp: HeapIndex,
    status: Status,
}

impl Vm {
    /// Build a machine over `program` with the given stack and heap
    /// capacities, and install the synthetic first frame so that a stray
    /// top-level `return` restores registers instead of reading garbage.
    pub fn new(program: Program, stack_max: usize, heap_max: usize) -> Vm {
        let mut vm = Vm {
            code: program.code,
            stack: vec![StackItem::Int(0); stack_max],
            heap: vec![HeapItem::Int(0); heap_max],
            sp: 0,
            fp: 0,
            ep: 0,
            cp: 0,
            hp: 0,
            status: Status::Running,
        };
        if vm.push(StackItem::FramePointer(0)).is_err()
            || vm.push(StackItem::ReturnAddress(0)).is_err()
        {
            vm.status = Status::StackIndexOutOfBound;
        }
        vm
    }

    /// Current status register.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Current stack height (the next free slot).
    pub fn stack_height(&self) -> usize {
        self.sp
    }

    /// Decode the cell on top of the stack against the heap.
    pub fn result(&self) -> Result<Value, RuntimeError> {
        if self.sp == 0 {
            return Err(RuntimeError::BadState("no value on the stack".to_string()));
        }
        value::decode(&self.heap[..self.hp], self.stack[self.sp - 1])
    }

    /// Step until the machine leaves the running state, returning the final
    /// status, or the first malformed-state error.
    pub fn run(&mut self, input: &mut dyn Input) -> Result<Status, RuntimeError> {
        while self.status == Status::Running {
            trace!("{}", self);
            self.step(input)?;
        }
        Ok(self.status)
    }

    /// Execute one instruction.
    pub fn step(&mut self, input: &mut dyn Input) -> Result<(), RuntimeError> {
        if self.cp >= self.code.len() {
            self.status = Status::CodeIndexOutOfBound;
            return Ok(());
        }
        let instr = self.code[self.cp].clone();
        let mut advance = true;
        let res: Exec = match &instr {
            Instr::Push(v) => self.push(*v),
            Instr::Unary(op) => self.exec_unary(*op, input),
            Instr::Oper(op) => self.exec_oper(*op),
            Instr::Swap => self.exec_swap(),
            Instr::Pop => self.pop().map(|_| ()),
            Instr::Label(_) => Ok(()),
            Instr::MkPair => self.exec_mk_pair(),
            Instr::Fst => self.exec_fst(),
            Instr::Snd => self.exec_snd(),
            Instr::MkInl => self.exec_mk_inl(),
            Instr::MkInr => self.exec_mk_inr(),
            Instr::Case(loc) => self.exec_case(loc, &mut advance),
            Instr::MkRef => self.exec_mk_ref(),
            Instr::Deref => self.exec_deref(),
            Instr::Assign => self.exec_assign(),
            Instr::Test(loc) => self.exec_test(loc, &mut advance),
            Instr::Goto(loc) => self.exec_goto(loc, &mut advance),
            Instr::Halt => {
                self.status = Status::Halted;
                Ok(())
            }
            Instr::MkClosure(loc, n) => self.exec_mk_closure(loc, *n),
            Instr::Apply => self.exec_apply(&mut advance),
            Instr::Return => self.exec_return(&mut advance),
            Instr::Lookup(path) => self.exec_lookup(*path),
            Instr::Try(loc) => self.exec_try(loc),
            Instr::UnTry => self.exec_untry(),
            Instr::Raise => self.exec_raise(&mut advance),
        };
        match res {
            Ok(()) => {
                if advance && self.status == Status::Running {
                    self.cp += 1;
                }
                Ok(())
            }
            Err(Fault::Status(status)) => {
                self.status = status;
                Ok(())
            }
            Err(Fault::Error(e)) => Err(e),
        }
    }

    fn push(&mut self, v: StackItem) -> Exec {
        if self.sp < self.stack.len() {
            self.stack[self.sp] = v;
            self.sp += 1;
            Ok(())
        } else {
            Err(Fault::Status(Status::StackIndexOutOfBound))
        }
    }

    fn pop(&mut self) -> Exec<StackItem> {
        if self.sp == 0 {
            Err(Fault::Status(Status::StackUnderflow))
        } else {
            self.sp -= 1;
            Ok(self.stack[self.sp])
        }
    }

    /// The cell at `sp - 1`, left in place.
    fn peek(&self) -> Exec<StackItem> {
        if self.sp == 0 {
            Err(Fault::Status(Status::StackUnderflow))
        } else {
            Ok(self.stack[self.sp - 1])
        }
    }

    /// A live stack cell (below `sp`).
    fn stack_get(&self, i: StackIndex) -> Exec<StackItem> {
        if i < self.sp {
            Ok(self.stack[i])
        } else {
            Err(Fault::Status(Status::StackIndexOutOfBound))
        }
    }

    /// An allocated heap cell (below `hp`).
    fn heap_get(&self, a: HeapIndex) -> Exec<HeapItem> {
        if a < self.hp {
            Ok(self.heap[a])
        } else {
            Err(Fault::Status(Status::HeapIndexOutOfBound))
        }
    }

    fn heap_set(&mut self, a: HeapIndex, v: HeapItem) -> Exec {
        if a < self.hp {
            self.heap[a] = v;
            Ok(())
        } else {
            Err(Fault::Status(Status::HeapIndexOutOfBound))
        }
    }

    fn exec_swap(&mut self) -> Exec {
        let top = self.pop()?;
        let below = self.pop()?;
        self.push(top)?;
        self.push(below)
    }
}

impl fmt::Display for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cp={} fp={} ep={} sp={} hp={}",
            self.cp, self.fp, self.ep, self.sp, self.hp
        )?;
        if let Some(instr) = self.code.get(self.cp) {
            write!(f, " next=[{}]", instr)?;
        }
        write!(f, " stack=[")?;
        for i in 0..self.sp {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", self.stack[i])?;
        }
        write!(f, "]")
    }
}
