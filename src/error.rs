//! # Error Handling for the Jargon Pipeline
//!
//! Each stage of the pipeline has its own error type:
//! - [`CompileError`] for faults detected while translating an AST,
//! - [`LoadError`] for faults in a textual listing or in label resolution,
//! - [`RuntimeError`] for faults the machine detects while executing.
//!
//! ## Runtime errors vs. statuses
//! Capacity violations (stack/heap overflow, stack underflow, running off
//! the end of the code array) are *statuses*: the machine records them in
//! its status register and stops stepping. A [`RuntimeError`] is different:
//! it reports a machine state that no well-compiled program can reach, such
//! as an instruction finding the wrong kind of cell under its operands, or
//! a `raise` with no handler in scope. Runtime errors are returned from
//! `Vm::step`/`Vm::run` so callers and tests can assert on them; they are
//! not catchable by the `try`/`raise` mechanism of the source language.
//!
//! All three types implement [`fmt::Display`] and [`std::error::Error`].

use std::fmt;

/// Errors detected while compiling an AST to an instruction listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompileError {
    /// An identifier has no binding in the compile-time environment.
    UnknownIdent(String),
    /// A `Seq` node with no expressions denotes nothing.
    EmptySequence,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::UnknownIdent(name) => {
                write!(f, "unknown identifier `{}`", name)
            }
            CompileError::EmptySequence => {
                write!(f, "empty sequence has no value")
            }
        }
    }
}

impl std::error::Error for CompileError {}

/// Errors detected while parsing a textual listing or resolving labels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadError {
    /// A line of a textual listing could not be parsed.
    Parse { line: usize, msg: String },
    /// A control-transfer instruction names a label the listing never defines.
    UnresolvedLabel(String),
    /// The same label is defined at two positions in the listing.
    DuplicateLabel(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Parse { line, msg } => {
                write!(f, "line {}: {}", line, msg)
            }
            LoadError::UnresolvedLabel(label) => {
                write!(f, "reference to unresolved label `{}`", label)
            }
            LoadError::DuplicateLabel(label) => {
                write!(f, "label `{}` defined more than once", label)
            }
        }
    }
}

impl std::error::Error for LoadError {}

/// Errors the machine detects during execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuntimeError {
    /// A stack or heap cell did not satisfy an instruction's precondition.
    BadState(String),
    /// Integer division with a zero divisor.
    DivisionByZero,
    /// A `raise` unwound the whole stack without finding a handler frame.
    /// Carries the rendered form of the raised value.
    NoHandler(String),
    /// A control transfer went through a location the loader never resolved.
    UnresolvedTarget(String),
    /// The input provider could not produce an integer for `read`.
    InputFailed(String),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::BadState(msg) => {
                write!(f, "malformed state: {}", msg)
            }
            RuntimeError::DivisionByZero => {
                write!(f, "division by zero")
            }
            RuntimeError::NoHandler(value) => {
                write!(f, "raise {} found no handler", value)
            }
            RuntimeError::UnresolvedTarget(label) => {
                write!(f, "control transfer through unresolved label `{}`", label)
            }
            RuntimeError::InputFailed(msg) => {
                write!(f, "read failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for RuntimeError {}
