//! # Jargon Instruction Set & Listing Format
//!
//! This module defines the **cell types**, the **instruction set**, and the
//! **textual listing format** shared by the compiler, the loader, and the
//! virtual machine.
//!
//! ## Cells
//! The machine works on single tagged cells. [`StackItem`] is the shape of a
//! stack cell; besides the scalar values it includes the bookkeeping tags
//! `ra` (saved code index), `fp` (saved frame pointer) and `ep` (saved
//! exception pointer). [`HeapItem`] is the shape of a heap cell; compound
//! values start with a [`HeapItem::Header`] naming the block kind and its
//! total size in cells, header included.
//!
//! ## Locations
//! Control-transfer instructions carry a [`Location`]: a label plus an
//! optional resolved code index. The compiler emits locations with the index
//! absent; the loader fills it in. Executing through an unresolved location
//! is a runtime error.
//!
//! ## Text form
//! Every instruction has a canonical one-line form, `Display` on one side and
//! [`parse_listing`] on the other:
//!
//! ```text
//! push 10            # also: push true, push false, push ()
//! mk_closure L0 2    # entry label, captured-variable count
//! lookup stack -2    # frame-relative cell
//! lookup heap 1      # closure-relative slot
//! label L0
//! goto L0
//! ```
//!
//! `#` starts a comment; blank lines are ignored. `parse_listing` reports
//! the first offending line on error, and reparsing a displayed listing
//! yields the original instructions.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::{BinOp, UnOp};
use crate::error::LoadError;

/// Index into the code array.
pub type CodeIndex = usize;
/// Index into the stack array.
pub type StackIndex = usize;
/// Index into the heap array.
pub type HeapIndex = usize;
/// Signed frame- or closure-relative distance.
pub type Offset = i64;
/// Control-flow label, compared by equality.
pub type Label = String;

/// A label together with the code index the loader resolved it to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub label: Label,
    pub target: Option<CodeIndex>,
}

impl Location {
    /// A location as the compiler emits it, before resolution.
    pub fn new(label: Label) -> Location {
        Location { label, target: None }
    }
}

/// Compile-time address of a variable, resolved at runtime against the
/// current frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValuePath {
    /// The cell at `fp + offset`.
    StackLocation(Offset),
    /// Payload slot `offset` of the closure addressed by the cell at `fp - 1`.
    HeapLocation(Offset),
}

impl fmt::Display for ValuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValuePath::StackLocation(off) => write!(f, "stack {}", off),
            ValuePath::HeapLocation(off) => write!(f, "heap {}", off),
        }
    }
}

/// One stack cell.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StackItem {
    Int(i64),
    Bool(bool),
    Unit,
    /// Address of a heap block.
    HeapIndex(HeapIndex),
    /// Saved code index, pushed by `apply`.
    ReturnAddress(CodeIndex),
    /// Saved frame pointer, pushed by `apply` and by `try`.
    FramePointer(StackIndex),
    /// Saved exception pointer, pushed by `try`.
    ExceptionPointer(StackIndex),
}

impl fmt::Display for StackItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackItem::Int(n) => write!(f, "int {}", n),
            StackItem::Bool(b) => write!(f, "bool {}", b),
            StackItem::Unit => f.write_str("unit"),
            StackItem::HeapIndex(a) => write!(f, "hi {}", a),
            StackItem::ReturnAddress(c) => write!(f, "ra {}", c),
            StackItem::FramePointer(s) => write!(f, "fp {}", s),
            StackItem::ExceptionPointer(s) => write!(f, "ep {}", s),
        }
    }
}

/// The kind of a heap block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HeapKind {
    Pair,
    Inl,
    Inr,
    Closure,
}

impl fmt::Display for HeapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapKind::Pair => f.write_str("pair"),
            HeapKind::Inl => f.write_str("inl"),
            HeapKind::Inr => f.write_str("inr"),
            HeapKind::Closure => f.write_str("closure"),
        }
    }
}

/// One heap cell.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HeapItem {
    Int(i64),
    Bool(bool),
    Unit,
    /// Address of another heap block.
    HeapIndex(HeapIndex),
    /// Code entry point of a closure.
    CodeIndex(CodeIndex),
    /// Start of a block of the given total size (header cell included).
    Header(usize, HeapKind),
}

impl fmt::Display for HeapItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapItem::Int(n) => write!(f, "int {}", n),
            HeapItem::Bool(b) => write!(f, "bool {}", b),
            HeapItem::Unit => f.write_str("unit"),
            HeapItem::HeapIndex(a) => write!(f, "hi {}", a),
            HeapItem::CodeIndex(c) => write!(f, "ci {}", c),
            HeapItem::Header(n, kind) => write!(f, "header {} {}", n, kind),
        }
    }
}

/// Instruction set of the Jargon machine.
#[derive(Clone, Debug, PartialEq)]
pub enum Instr {
    /// Push a literal cell.
    Push(StackItem),
    /// Pop one value, push the operator applied to it.
    Unary(UnOp),
    /// Pop right then left, push `left op right`.
    Oper(BinOp),
    /// Exchange the top two cells.
    Swap,
    /// Discard the top cell.
    Pop,
    /// Loader marker; a no-op at runtime.
    Label(Label),
    /// Pop right then left, allocate a pair block, push its address.
    MkPair,
    /// Pop a pair address, push its first component.
    Fst,
    /// Pop a pair address, push its second component.
    Snd,
    /// Pop a value, allocate an `inl` block, push its address.
    MkInl,
    /// Pop a value, allocate an `inr` block, push its address.
    MkInr,
    /// Pop a sum address, push its payload; jump if it is an `inr`.
    Case(Location),
    /// Pop a value, allocate a one-cell reference, push its address.
    MkRef,
    /// Pop a reference address, push its content.
    Deref,
    /// Pop a value then a reference address, store, push `unit`.
    Assign,
    /// Pop a boolean; jump when it is false.
    Test(Location),
    /// Unconditional jump.
    Goto(Location),
    /// Stop with status `halted`.
    Halt,
    /// Allocate a closure with the given entry point, consuming the top
    /// `n` cells as its captured environment; push its address.
    MkClosure(Location, usize),
    /// Enter the closure on top of the stack, opening a new frame.
    Apply,
    /// Close the current frame, dropping argument and closure, and push
    /// the return value.
    Return,
    /// Push the value a path resolves to in the current frame.
    Lookup(ValuePath),
    /// Open a protected region whose handler starts at the location.
    Try(Location),
    /// Close the nearest protected region, keeping the protected value.
    UnTry,
    /// Pop a value and unwind to the nearest handler.
    Raise,
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Push(StackItem::Int(n)) => write!(f, "push {}", n),
            Instr::Push(StackItem::Bool(b)) => write!(f, "push {}", b),
            Instr::Push(StackItem::Unit) => f.write_str("push ()"),
            Instr::Push(other) => write!(f, "push {}", other),
            Instr::Unary(op) => write!(f, "unary {}", op),
            Instr::Oper(op) => write!(f, "oper {}", op),
            Instr::Swap => f.write_str("swap"),
            Instr::Pop => f.write_str("pop"),
            Instr::Label(label) => write!(f, "label {}", label),
            Instr::MkPair => f.write_str("mk_pair"),
            Instr::Fst => f.write_str("fst"),
            Instr::Snd => f.write_str("snd"),
            Instr::MkInl => f.write_str("mk_inl"),
            Instr::MkInr => f.write_str("mk_inr"),
            Instr::Case(loc) => write!(f, "case {}", loc.label),
            Instr::MkRef => f.write_str("mk_ref"),
            Instr::Deref => f.write_str("deref"),
            Instr::Assign => f.write_str("assign"),
            Instr::Test(loc) => write!(f, "test {}", loc.label),
            Instr::Goto(loc) => write!(f, "goto {}", loc.label),
            Instr::Halt => f.write_str("halt"),
            Instr::MkClosure(loc, n) => write!(f, "mk_closure {} {}", loc.label, n),
            Instr::Apply => f.write_str("apply"),
            Instr::Return => f.write_str("return"),
            Instr::Lookup(path) => write!(f, "lookup {}", path),
            Instr::Try(loc) => write!(f, "try {}", loc.label),
            Instr::UnTry => f.write_str("untry"),
            Instr::Raise => f.write_str("raise"),
        }
    }
}

/// Render a listing in its canonical text form, one instruction per line.
pub fn fmt_listing(listing: &[Instr]) -> String {
    let lines: Vec<String> = listing.iter().map(|i| i.to_string()).collect();
    lines.join("\n")
}

static LABEL_RE: Lazy<Regex> = Lazy::new(|| Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Parse a textual listing into instructions.
///
/// Returns a [`LoadError::Parse`] naming the first offending line. Labels
/// are not resolved here; that is the loader's job.
pub fn parse_listing(src: &str) -> Result<Vec<Instr>, LoadError> {
    let mut listing = Vec::new();
    for (idx, raw) in src.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let instr = parse_line(line).map_err(|msg| LoadError::Parse { line: idx + 1, msg })?;
        listing.push(instr);
    }
    Ok(listing)
}

fn parse_line(line: &str) -> Result<Instr, String> {
    let mut words = line.split_whitespace();
    let mnemonic = match words.next() {
        Some(w) => w,
        None => return Err("empty instruction".to_string()),
    };
    let instr = match mnemonic {
        "push" => match operand(&mut words)? {
            "()" => Instr::Push(StackItem::Unit),
            "true" => Instr::Push(StackItem::Bool(true)),
            "false" => Instr::Push(StackItem::Bool(false)),
            tok => match tok.parse::<i64>() {
                Ok(n) => Instr::Push(StackItem::Int(n)),
                Err(_) => return Err(format!("bad literal `{}`", tok)),
            },
        },
        "unary" => Instr::Unary(match operand(&mut words)? {
            "not" => UnOp::Not,
            "neg" => UnOp::Neg,
            "read" => UnOp::Read,
            tok => return Err(format!("unknown unary operator `{}`", tok)),
        }),
        "oper" => Instr::Oper(match operand(&mut words)? {
            "and" => BinOp::And,
            "or" => BinOp::Or,
            "eqb" => BinOp::EqB,
            "lt" => BinOp::Lt,
            "eqi" => BinOp::EqI,
            "add" => BinOp::Add,
            "sub" => BinOp::Sub,
            "mul" => BinOp::Mul,
            "div" => BinOp::Div,
            tok => return Err(format!("unknown operator `{}`", tok)),
        }),
        "swap" => Instr::Swap,
        "pop" => Instr::Pop,
        "label" => Instr::Label(label(&mut words)?),
        "mk_pair" => Instr::MkPair,
        "fst" => Instr::Fst,
        "snd" => Instr::Snd,
        "mk_inl" => Instr::MkInl,
        "mk_inr" => Instr::MkInr,
        "case" => Instr::Case(Location::new(label(&mut words)?)),
        "mk_ref" => Instr::MkRef,
        "deref" => Instr::Deref,
        "assign" => Instr::Assign,
        "test" => Instr::Test(Location::new(label(&mut words)?)),
        "goto" => Instr::Goto(Location::new(label(&mut words)?)),
        "halt" => Instr::Halt,
        "mk_closure" => {
            let entry = label(&mut words)?;
            let count = operand(&mut words)?;
            let n = count
                .parse::<usize>()
                .map_err(|_| format!("bad capture count `{}`", count))?;
            Instr::MkClosure(Location::new(entry), n)
        }
        "apply" => Instr::Apply,
        "return" => Instr::Return,
        "lookup" => {
            let kind = operand(&mut words)?;
            let off = operand(&mut words)?;
            let off = off
                .parse::<Offset>()
                .map_err(|_| format!("bad offset `{}`", off))?;
            match kind {
                "stack" => Instr::Lookup(ValuePath::StackLocation(off)),
                "heap" => Instr::Lookup(ValuePath::HeapLocation(off)),
                tok => return Err(format!("unknown lookup kind `{}`", tok)),
            }
        }
        "try" => Instr::Try(Location::new(label(&mut words)?)),
        "untry" => Instr::UnTry,
        "raise" => Instr::Raise,
        other => return Err(format!("unknown instruction `{}`", other)),
    };
    if let Some(extra) = words.next() {
        return Err(format!("trailing token `{}`", extra));
    }
    Ok(instr)
}

fn operand<'a>(words: &mut impl Iterator<Item = &'a str>) -> Result<&'a str, String> {
    words.next().ok_or_else(|| "missing operand".to_string())
}

fn label<'a>(words: &mut impl Iterator<Item = &'a str>) -> Result<Label, String> {
    let tok = operand(words)?;
    if LABEL_RE.is_match(tok) {
        Ok(tok.to_string())
    } else {
        Err(format!("bad label `{}`", tok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_text_round_trips() {
        let listing = vec![
            Instr::Push(StackItem::Int(-3)),
            Instr::Push(StackItem::Bool(true)),
            Instr::Push(StackItem::Unit),
            Instr::Unary(UnOp::Neg),
            Instr::Oper(BinOp::Add),
            Instr::Swap,
            Instr::Pop,
            Instr::MkPair,
            Instr::Fst,
            Instr::Snd,
            Instr::MkInl,
            Instr::MkInr,
            Instr::Case(Location::new("L1".to_string())),
            Instr::MkRef,
            Instr::Deref,
            Instr::Assign,
            Instr::Test(Location::new("L1".to_string())),
            Instr::Goto(Location::new("L1".to_string())),
            Instr::Label("L1".to_string()),
            Instr::MkClosure(Location::new("L2".to_string()), 2),
            Instr::Label("L2".to_string()),
            Instr::Apply,
            Instr::Return,
            Instr::Lookup(ValuePath::StackLocation(-2)),
            Instr::Lookup(ValuePath::HeapLocation(1)),
            Instr::Try(Location::new("L1".to_string())),
            Instr::UnTry,
            Instr::Raise,
            Instr::Halt,
        ];
        let text = fmt_listing(&listing);
        assert_eq!(parse_listing(&text).unwrap(), listing);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let src = "\n# a comment\npush 1   # trailing comment\n\nhalt\n";
        let listing = parse_listing(src).unwrap();
        assert_eq!(
            listing,
            vec![Instr::Push(StackItem::Int(1)), Instr::Halt]
        );
    }

    #[test]
    fn parse_errors_name_the_line() {
        let cases = [
            ("push 1\nfrobnicate\n", 2),
            ("push\n", 1),
            ("push 1 2\n", 1),
            ("goto 9bad\n", 1),
            ("push maybe\n", 1),
            ("lookup stack x\n", 1),
        ];
        for (src, want_line) in cases {
            match parse_listing(src) {
                Err(LoadError::Parse { line, .. }) => assert_eq!(line, want_line, "{:?}", src),
                other => panic!("expected a parse error for {:?}, got {:?}", src, other),
            }
        }
    }
}
