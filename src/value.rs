//! # Decoded Result Values
//!
//! After the machine halts, the cell at the top of its stack is decoded
//! against the heap into a [`Value`]: scalars map directly, heap addresses
//! are chased through pair, sum, and reference cells, and closures render
//! as the opaque `CLOSURE`.
//!
//! Mutable references make cyclic heap shapes reachable from a result
//! (store a pair in a reference the pair itself points back to). Decoding
//! keeps a set of visited heap cells and renders any revisited cell as
//! `...` instead of recursing forever.

use std::collections::HashSet;
use std::fmt;

use crate::bytecode::{HeapIndex, HeapItem, HeapKind, StackItem};
use crate::error::RuntimeError;

/// A machine result in source-level terms.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Unit,
    Pair(Box<Value>, Box<Value>),
    Inl(Box<Value>),
    Inr(Box<Value>),
    /// A function value; its environment is not decoded.
    Closure,
    /// A heap cell revisited while decoding, rendered as `...`.
    Cyclic,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Unit => f.write_str("()"),
            Value::Pair(left, right) => write!(f, "({}, {})", left, right),
            Value::Inl(v) => write!(f, "inl({})", v),
            Value::Inr(v) => write!(f, "inr({})", v),
            Value::Closure => f.write_str("CLOSURE"),
            Value::Cyclic => f.write_str("..."),
        }
    }
}

/// Decode a stack cell against the allocated portion of the heap.
///
/// Bookkeeping cells (`ra`, `fp`, `ep`) never denote source values and are
/// rejected, as are addresses outside the allocated region.
pub fn decode(heap: &[HeapItem], item: StackItem) -> Result<Value, RuntimeError> {
    match item {
        StackItem::Int(n) => Ok(Value::Int(n)),
        StackItem::Bool(b) => Ok(Value::Bool(b)),
        StackItem::Unit => Ok(Value::Unit),
        StackItem::HeapIndex(a) => from_heap(heap, a, &mut HashSet::new()),
        other => Err(RuntimeError::BadState(format!(
            "`{}` does not denote a value",
            other
        ))),
    }
}

fn from_heap(
    heap: &[HeapItem],
    a: HeapIndex,
    seen: &mut HashSet<HeapIndex>,
) -> Result<Value, RuntimeError> {
    if !seen.insert(a) {
        return Ok(Value::Cyclic);
    }
    let cell = heap
        .get(a)
        .copied()
        .ok_or_else(|| RuntimeError::BadState(format!("heap index {} out of range", a)))?;
    match cell {
        HeapItem::Int(n) => Ok(Value::Int(n)),
        HeapItem::Bool(b) => Ok(Value::Bool(b)),
        HeapItem::Unit => Ok(Value::Unit),
        HeapItem::HeapIndex(next) => from_heap(heap, next, seen),
        HeapItem::CodeIndex(c) => Err(RuntimeError::BadState(format!(
            "bare code pointer {} outside a closure",
            c
        ))),
        HeapItem::Header(_, HeapKind::Pair) => Ok(Value::Pair(
            Box::new(from_heap(heap, a + 1, seen)?),
            Box::new(from_heap(heap, a + 2, seen)?),
        )),
        HeapItem::Header(_, HeapKind::Inl) => {
            Ok(Value::Inl(Box::new(from_heap(heap, a + 1, seen)?)))
        }
        HeapItem::Header(_, HeapKind::Inr) => {
            Ok(Value::Inr(Box::new(from_heap(heap, a + 1, seen)?)))
        }
        HeapItem::Header(_, HeapKind::Closure) => Ok(Value::Closure),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_and_pairs_render() {
        let heap = vec![
            HeapItem::Header(3, HeapKind::Pair),
            HeapItem::Int(1),
            HeapItem::HeapIndex(3),
            HeapItem::Header(2, HeapKind::Inr),
            HeapItem::Bool(true),
        ];
        let v = decode(&heap, StackItem::HeapIndex(0)).unwrap();
        assert_eq!(v.to_string(), "(1, inr(true))");
    }

    #[test]
    fn reference_chains_are_followed() {
        let heap = vec![HeapItem::HeapIndex(1), HeapItem::Int(9)];
        assert_eq!(decode(&heap, StackItem::HeapIndex(0)), Ok(Value::Int(9)));
    }

    #[test]
    fn cycles_render_as_ellipsis() {
        let heap = vec![HeapItem::HeapIndex(0)];
        assert_eq!(decode(&heap, StackItem::HeapIndex(0)), Ok(Value::Cyclic));
    }

    #[test]
    fn bookkeeping_cells_are_rejected() {
        let heap: Vec<HeapItem> = vec![];
        assert!(decode(&heap, StackItem::ReturnAddress(4)).is_err());
    }
}
