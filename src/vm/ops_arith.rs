//! Arithmetic and logical instruction handlers.
//!
//! Integer arithmetic wraps in two's complement; the one arithmetic fault
//! is division by zero. Operand tags are checked strictly, with no
//! coercions: a mismatch is a malformed state, not a source-level error.

use crate::ast::{BinOp, UnOp};
use crate::bytecode::StackItem;
use crate::error::RuntimeError;
use crate::input::Input;

use super::{Exec, Fault, Vm};

impl Vm {
    /// `unary not|neg|read`: pop one value, push the operator applied.
    /// `read` discards the popped operand and asks the input provider.
    pub(super) fn exec_unary(&mut self, op: UnOp, input: &mut dyn Input) -> Exec {
        let v = self.pop()?;
        let out = match (op, v) {
            (UnOp::Not, StackItem::Bool(b)) => StackItem::Bool(!b),
            (UnOp::Neg, StackItem::Int(n)) => StackItem::Int(n.wrapping_neg()),
            (UnOp::Read, _) => StackItem::Int(input.read_int()?),
            (op, v) => {
                return Err(Fault::Error(RuntimeError::BadState(format!(
                    "`unary {}` applied to {}",
                    op, v
                ))))
            }
        };
        self.push(out)
    }

    /// `oper <op>`: pop right then left, push `left op right`.
    pub(super) fn exec_oper(&mut self, op: BinOp) -> Exec {
        let right = self.pop()?;
        let left = self.pop()?;
        let out = match (op, left, right) {
            (BinOp::Add, StackItem::Int(a), StackItem::Int(b)) => StackItem::Int(a.wrapping_add(b)),
            (BinOp::Sub, StackItem::Int(a), StackItem::Int(b)) => StackItem::Int(a.wrapping_sub(b)),
            (BinOp::Mul, StackItem::Int(a), StackItem::Int(b)) => StackItem::Int(a.wrapping_mul(b)),
            (BinOp::Div, StackItem::Int(_), StackItem::Int(0)) => {
                return Err(Fault::Error(RuntimeError::DivisionByZero))
            }
            (BinOp::Div, StackItem::Int(a), StackItem::Int(b)) => StackItem::Int(a.wrapping_div(b)),
            (BinOp::Lt, StackItem::Int(a), StackItem::Int(b)) => StackItem::Bool(a < b),
            (BinOp::EqI, StackItem::Int(a), StackItem::Int(b)) => StackItem::Bool(a == b),
            (BinOp::EqB, StackItem::Bool(a), StackItem::Bool(b)) => StackItem::Bool(a == b),
            (BinOp::And, StackItem::Bool(a), StackItem::Bool(b)) => StackItem::Bool(a && b),
            (BinOp::Or, StackItem::Bool(a), StackItem::Bool(b)) => StackItem::Bool(a || b),
            (op, left, right) => {
                return Err(Fault::Error(RuntimeError::BadState(format!(
                    "`oper {}` applied to {} and {}",
                    op, left, right
                ))))
            }
        };
        self.push(out)
    }
}
