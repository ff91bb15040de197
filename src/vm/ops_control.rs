//! Control-flow instruction handlers: branches, calls, lookups, and the
//! exception protocol.
//!
//! Handlers that transfer control clear the step loop's advance flag and
//! write `cp` themselves. Frame discipline:
//! - `apply` reads the closure at `sp - 1` (the argument sits at `sp - 2`),
//!   points `fp` at the current `sp`, saves the caller's `fp` and the
//!   return address above it, and jumps to the closure's entry point.
//! - `return` reads the saved registers back from `fp`, drops the frame
//!   together with the argument and the closure, and pushes the return
//!   value in their place.
//! - `try` pushes the frame `ep fp ra` and points `ep` at its base;
//!   `raise` restores the three registers from `stack[ep]` and re-pushes
//!   the raised value; `untry` discards the frame, keeping the protected
//!   value.

use crate::bytecode::{CodeIndex, HeapItem, HeapKind, Location, StackItem, ValuePath};
use crate::error::RuntimeError;
use crate::value;

use super::ops_heap::{heap_item_of, stack_item_of};
use super::{Exec, Fault, Status, Vm};

/// The code index the loader resolved a location to.
fn jump_target(loc: &Location) -> Result<CodeIndex, Fault> {
    loc.target
        .ok_or_else(|| Fault::Error(RuntimeError::UnresolvedTarget(loc.label.clone())))
}

impl Vm {
    /// `test`: pop a boolean, jump when it is false.
    pub(super) fn exec_test(&mut self, loc: &Location, advance: &mut bool) -> Exec {
        match self.pop()? {
            StackItem::Bool(true) => Ok(()),
            StackItem::Bool(false) => {
                self.cp = jump_target(loc)?;
                *advance = false;
                Ok(())
            }
            v => Err(Fault::Error(RuntimeError::BadState(format!(
                "`test` applied to {}",
                v
            )))),
        }
    }

    /// `goto`: unconditional jump.
    pub(super) fn exec_goto(&mut self, loc: &Location, advance: &mut bool) -> Exec {
        self.cp = jump_target(loc)?;
        *advance = false;
        Ok(())
    }

    /// `case`: pop a sum address, push its payload; fall through on `inl`,
    /// jump on `inr`.
    pub(super) fn exec_case(&mut self, loc: &Location, advance: &mut bool) -> Exec {
        let a = self.pop_heap_index()?;
        match self.heap_get(a)? {
            HeapItem::Header(_, HeapKind::Inl) => {
                let payload = stack_item_of(self.heap_get(a + 1)?)?;
                self.push(payload)
            }
            HeapItem::Header(_, HeapKind::Inr) => {
                let payload = stack_item_of(self.heap_get(a + 1)?)?;
                self.push(payload)?;
                self.cp = jump_target(loc)?;
                *advance = false;
                Ok(())
            }
            cell => Err(Fault::Error(RuntimeError::BadState(format!(
                "`case` applied to {}",
                cell
            )))),
        }
    }

    /// `mk_closure`: allocate `(header, entry, fv_1 .. fv_n)` where `fv_i`
    /// is the stack cell `i` below the top, then replace those `n` cells
    /// with the block's address.
    pub(super) fn exec_mk_closure(&mut self, loc: &Location, n: usize) -> Exec {
        let entry = jump_target(loc)?;
        if self.sp < n {
            return Err(Fault::Status(Status::StackUnderflow));
        }
        let a = self.allocate(2 + n)?;
        self.heap_set(a, HeapItem::Header(2 + n, HeapKind::Closure))?;
        self.heap_set(a + 1, HeapItem::CodeIndex(entry))?;
        for i in 1..=n {
            let item = heap_item_of(self.stack[self.sp - i])?;
            self.heap_set(a + 1 + i, item)?;
        }
        self.sp -= n;
        self.push(StackItem::HeapIndex(a))
    }

    /// `apply`: enter the closure on top of the stack.
    pub(super) fn exec_apply(&mut self, advance: &mut bool) -> Exec {
        let a = match self.peek()? {
            StackItem::HeapIndex(a) => a,
            v => {
                return Err(Fault::Error(RuntimeError::BadState(format!(
                    "`apply` expects a closure on top of the stack, found {}",
                    v
                ))))
            }
        };
        match self.heap_get(a)? {
            HeapItem::Header(_, HeapKind::Closure) => {}
            cell => {
                return Err(Fault::Error(RuntimeError::BadState(format!(
                    "`apply` applied to {}",
                    cell
                ))))
            }
        }
        let entry = match self.heap_get(a + 1)? {
            HeapItem::CodeIndex(c) => c,
            cell => {
                return Err(Fault::Error(RuntimeError::BadState(format!(
                    "closure without a code pointer: {}",
                    cell
                ))))
            }
        };
        let caller_fp = self.fp;
        self.fp = self.sp;
        self.push(StackItem::FramePointer(caller_fp))?;
        self.push(StackItem::ReturnAddress(self.cp + 1))?;
        self.cp = entry;
        *advance = false;
        Ok(())
    }

    /// `return`: restore the caller's registers, drop the frame together
    /// with the argument and the closure, and push the return value.
    pub(super) fn exec_return(&mut self, advance: &mut bool) -> Exec {
        let ret = self.pop()?;
        let saved_fp = match self.stack_get(self.fp)? {
            StackItem::FramePointer(s) => s,
            v => {
                return Err(Fault::Error(RuntimeError::BadState(format!(
                    "`return` found {} where the saved frame pointer should be",
                    v
                ))))
            }
        };
        let ra = match self.stack_get(self.fp + 1)? {
            StackItem::ReturnAddress(c) => c,
            v => {
                return Err(Fault::Error(RuntimeError::BadState(format!(
                    "`return` found {} where the return address should be",
                    v
                ))))
            }
        };
        if self.fp < 2 {
            return Err(Fault::Status(Status::StackUnderflow));
        }
        self.sp = self.fp - 2;
        self.fp = saved_fp;
        self.cp = ra;
        self.push(ret)?;
        *advance = false;
        Ok(())
    }

    /// `lookup`: resolve a value path against the current frame and push
    /// the cell it names.
    pub(super) fn exec_lookup(&mut self, path: ValuePath) -> Exec {
        match path {
            ValuePath::StackLocation(off) => {
                let idx = self.fp as i64 + off;
                if idx < 0 {
                    return Err(Fault::Status(Status::StackIndexOutOfBound));
                }
                let v = self.stack_get(idx as usize)?;
                self.push(v)
            }
            ValuePath::HeapLocation(off) => {
                if off < 1 {
                    return Err(Fault::Error(RuntimeError::BadState(format!(
                        "closure slot {} out of range",
                        off
                    ))));
                }
                if self.fp == 0 {
                    return Err(Fault::Error(RuntimeError::BadState(
                        "no closure below the current frame".to_string(),
                    )));
                }
                let a = match self.stack_get(self.fp - 1)? {
                    StackItem::HeapIndex(a) => a,
                    v => {
                        return Err(Fault::Error(RuntimeError::BadState(format!(
                            "expected the applied closure at the frame base, found {}",
                            v
                        ))))
                    }
                };
                let v = stack_item_of(self.heap_get(a + off as usize + 1)?)?;
                self.push(v)
            }
        }
    }

    /// `try`: open a protected region by pushing the exception frame and
    /// pointing `ep` at its base.
    pub(super) fn exec_try(&mut self, loc: &Location) -> Exec {
        let handler = jump_target(loc)?;
        let base = self.sp;
        self.push(StackItem::ExceptionPointer(self.ep))?;
        self.push(StackItem::FramePointer(self.fp))?;
        self.push(StackItem::ReturnAddress(handler))?;
        self.ep = base;
        Ok(())
    }

    /// `untry`: close the innermost protected region, keeping the value on
    /// top and restoring the previous exception pointer.
    pub(super) fn exec_untry(&mut self) -> Exec {
        let v = self.pop()?;
        if self.sp < 3 {
            return Err(Fault::Status(Status::StackUnderflow));
        }
        let base = self.sp - 3;
        let prev = match self.stack[base] {
            StackItem::ExceptionPointer(p) => p,
            cell => {
                return Err(Fault::Error(RuntimeError::BadState(format!(
                    "`untry` found {} where an exception frame should be",
                    cell
                ))))
            }
        };
        self.sp = base;
        self.ep = prev;
        self.push(v)
    }

    /// `raise`: pop the raised value and unwind to the innermost exception
    /// frame, restoring `ep`, `fp`, and `cp` from it.
    pub(super) fn exec_raise(&mut self, advance: &mut bool) -> Exec {
        let x = self.pop()?;
        if self.ep == 0 {
            let rendered = value::decode(&self.heap[..self.hp], x)
                .map(|v| v.to_string())
                .unwrap_or_else(|_| x.to_string());
            return Err(Fault::Error(RuntimeError::NoHandler(rendered)));
        }
        let base = self.ep;
        let prev = match self.stack_get(base)? {
            StackItem::ExceptionPointer(p) => p,
            cell => {
                return Err(Fault::Error(RuntimeError::BadState(format!(
                    "`raise` found {} where an exception frame should be",
                    cell
                ))))
            }
        };
        let saved_fp = match self.stack_get(base + 1)? {
            StackItem::FramePointer(s) => s,
            cell => {
                return Err(Fault::Error(RuntimeError::BadState(format!(
                    "exception frame holds {} instead of a frame pointer",
                    cell
                ))))
            }
        };
        let handler = match self.stack_get(base + 2)? {
            StackItem::ReturnAddress(c) => c,
            cell => {
                return Err(Fault::Error(RuntimeError::BadState(format!(
                    "exception frame holds {} instead of a handler address",
                    cell
                ))))
            }
        };
        self.sp = base;
        self.fp = saved_fp;
        self.ep = prev;
        self.cp = handler;
        self.push(x)?;
        *advance = false;
        Ok(())
    }
}
