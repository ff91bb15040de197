//! Heap-allocating instruction handlers: pairs, sums, and references.
//!
//! Allocation is bump-pointer via [`Vm::allocate`]. A block starts with a
//! header naming its kind and total size; references are a single bare
//! cell. The `ra`/`fp`/`ep` bookkeeping tags never move to the heap, and
//! headers and code pointers never move to the stack; the conversion
//! helpers enforce both directions.

use crate::bytecode::{HeapIndex, HeapItem, HeapKind, StackItem};
use crate::error::RuntimeError;

use super::{Exec, Fault, Status, Vm};

/// Convert a stack cell for storage in a heap block.
pub(super) fn heap_item_of(v: StackItem) -> Result<HeapItem, Fault> {
    match v {
        StackItem::Int(n) => Ok(HeapItem::Int(n)),
        StackItem::Bool(b) => Ok(HeapItem::Bool(b)),
        StackItem::Unit => Ok(HeapItem::Unit),
        StackItem::HeapIndex(a) => Ok(HeapItem::HeapIndex(a)),
        v => Err(Fault::Error(RuntimeError::BadState(format!(
            "{} cannot be stored on the heap",
            v
        )))),
    }
}

/// Convert a heap cell for placement on the stack.
pub(super) fn stack_item_of(v: HeapItem) -> Result<StackItem, Fault> {
    match v {
        HeapItem::Int(n) => Ok(StackItem::Int(n)),
        HeapItem::Bool(b) => Ok(StackItem::Bool(b)),
        HeapItem::Unit => Ok(StackItem::Unit),
        HeapItem::HeapIndex(a) => Ok(StackItem::HeapIndex(a)),
        v => Err(Fault::Error(RuntimeError::BadState(format!(
            "{} cannot be moved to the stack",
            v
        )))),
    }
}

impl Vm {
    /// Reserve `n` heap cells and return the first index.
    ///
    /// When the bump pointer cannot advance, the collector hook gets one
    /// chance to make room; if it reports no progress the allocation fails
    /// with the heap-exhaustion status.
    pub(super) fn allocate(&mut self, n: usize) -> Exec<HeapIndex> {
        if self.hp + n < self.heap.len() {
            let a = self.hp;
            self.hp += n;
            Ok(a)
        } else if let Some(a) = self.collect(n) {
            Ok(a)
        } else {
            Err(Fault::Status(Status::HeapIndexOutOfBound))
        }
    }

    /// Collector hook. Contract: either return `None` (no progress, the
    /// caller must fail the allocation) or reserve `wanted` cells in a
    /// state where `hp` has decreased and all block invariants still hold.
    /// The base machine never makes progress; a stop-the-world copying
    /// collector rooted at the `hi` cells of the live stack can be slotted
    /// in here without touching any other contract.
    fn collect(&mut self, _wanted: usize) -> Option<HeapIndex> {
        None
    }

    /// Pop a cell that must address a heap block.
    pub(super) fn pop_heap_index(&mut self) -> Exec<HeapIndex> {
        match self.pop()? {
            StackItem::HeapIndex(a) => Ok(a),
            v => Err(Fault::Error(RuntimeError::BadState(format!(
                "expected a heap address on the stack, found {}",
                v
            )))),
        }
    }

    /// `mk_pair`: pop right then left, allocate `(header, left, right)`.
    pub(super) fn exec_mk_pair(&mut self) -> Exec {
        let right = self.pop()?;
        let left = self.pop()?;
        let a = self.allocate(3)?;
        self.heap_set(a, HeapItem::Header(3, HeapKind::Pair))?;
        self.heap_set(a + 1, heap_item_of(left)?)?;
        self.heap_set(a + 2, heap_item_of(right)?)?;
        self.push(StackItem::HeapIndex(a))
    }

    /// `fst`: pop a pair address, push its first component.
    pub(super) fn exec_fst(&mut self) -> Exec {
        self.project_pair(1)
    }

    /// `snd`: pop a pair address, push its second component.
    pub(super) fn exec_snd(&mut self) -> Exec {
        self.project_pair(2)
    }

    fn project_pair(&mut self, slot: usize) -> Exec {
        let a = self.pop_heap_index()?;
        match self.heap_get(a)? {
            HeapItem::Header(_, HeapKind::Pair) => {
                let v = stack_item_of(self.heap_get(a + slot)?)?;
                self.push(v)
            }
            cell => Err(Fault::Error(RuntimeError::BadState(format!(
                "pair projection applied to {}",
                cell
            )))),
        }
    }

    /// `mk_inl`: pop a value, allocate `(header, value)` tagged left.
    pub(super) fn exec_mk_inl(&mut self) -> Exec {
        self.inject(HeapKind::Inl)
    }

    /// `mk_inr`: pop a value, allocate `(header, value)` tagged right.
    pub(super) fn exec_mk_inr(&mut self) -> Exec {
        self.inject(HeapKind::Inr)
    }

    fn inject(&mut self, kind: HeapKind) -> Exec {
        let v = self.pop()?;
        let a = self.allocate(2)?;
        self.heap_set(a, HeapItem::Header(2, kind))?;
        self.heap_set(a + 1, heap_item_of(v)?)?;
        self.push(StackItem::HeapIndex(a))
    }

    /// `mk_ref`: pop a value, allocate a single bare cell holding it.
    pub(super) fn exec_mk_ref(&mut self) -> Exec {
        let v = self.pop()?;
        let a = self.allocate(1)?;
        self.heap_set(a, heap_item_of(v)?)?;
        self.push(StackItem::HeapIndex(a))
    }

    /// `deref`: pop a reference address, push the cell it holds.
    pub(super) fn exec_deref(&mut self) -> Exec {
        let a = self.pop_heap_index()?;
        let v = stack_item_of(self.heap_get(a)?)?;
        self.push(v)
    }

    /// `assign`: pop a value then a reference address, store, push `unit`.
    pub(super) fn exec_assign(&mut self) -> Exec {
        let v = self.pop()?;
        let a = self.pop_heap_index()?;
        let item = heap_item_of(v)?;
        self.heap_set(a, item)?;
        self.push(StackItem::Unit)
    }
}
