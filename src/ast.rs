//! Slang abstract syntax, as delivered by an external parser and checker.
//!
//! Every node carries a tag `T` (typically a source location) that the
//! compiler preserves but does not interpret. The [`free_vars`] analyzer
//! reports the free variables of an expression in first-occurrence order,
//! which is the order the compiler uses to lay out closure environments.

use std::fmt;

/// Unary operators.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnOp {
    Not,
    Neg,
    Read,
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnOp::Not => f.write_str("not"),
            UnOp::Neg => f.write_str("neg"),
            UnOp::Read => f.write_str("read"),
        }
    }
}

/// Binary operators.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    And,
    Or,
    EqB,
    Lt,
    EqI,
    Add,
    Sub,
    Mul,
    Div,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinOp::And => f.write_str("and"),
            BinOp::Or => f.write_str("or"),
            BinOp::EqB => f.write_str("eqb"),
            BinOp::Lt => f.write_str("lt"),
            BinOp::EqI => f.write_str("eqi"),
            BinOp::Add => f.write_str("add"),
            BinOp::Sub => f.write_str("sub"),
            BinOp::Mul => f.write_str("mul"),
            BinOp::Div => f.write_str("div"),
        }
    }
}

/// A Slang expression tagged with `T`.
///
/// Function-binding forms carry the parameter and body as a pair, mirroring
/// the shape `let f (x) = e1 in e2`.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr<T> {
    Unit(T),
    Boolean(T, bool),
    Integer(T, i64),
    Var(T, String),
    UnaryOp(T, UnOp, Box<Expr<T>>),
    Op(T, Box<Expr<T>>, BinOp, Box<Expr<T>>),
    Pair(T, Box<Expr<T>>, Box<Expr<T>>),
    Fst(T, Box<Expr<T>>),
    Snd(T, Box<Expr<T>>),
    Inl(T, Box<Expr<T>>),
    Inr(T, Box<Expr<T>>),
    Case(T, Box<Expr<T>>, (String, Box<Expr<T>>), (String, Box<Expr<T>>)),
    If(T, Box<Expr<T>>, Box<Expr<T>>, Box<Expr<T>>),
    Seq(T, Vec<Expr<T>>),
    Ref(T, Box<Expr<T>>),
    Deref(T, Box<Expr<T>>),
    Assign(T, Box<Expr<T>>, Box<Expr<T>>),
    While(T, Box<Expr<T>>, Box<Expr<T>>),
    App(T, Box<Expr<T>>, Box<Expr<T>>),
    Lambda(T, String, Box<Expr<T>>),
    LetFun(T, String, (String, Box<Expr<T>>), Box<Expr<T>>),
    LetRecFun(T, String, (String, Box<Expr<T>>), Box<Expr<T>>),
    Try(T, Box<Expr<T>>, String, Box<Expr<T>>),
    Raise(T, Box<Expr<T>>),
}

impl<T> Expr<T> {
    /// The tag attached to this node.
    pub fn tag(&self) -> &T {
        match self {
            Expr::Unit(t)
            | Expr::Boolean(t, _)
            | Expr::Integer(t, _)
            | Expr::Var(t, _)
            | Expr::UnaryOp(t, _, _)
            | Expr::Op(t, _, _, _)
            | Expr::Pair(t, _, _)
            | Expr::Fst(t, _)
            | Expr::Snd(t, _)
            | Expr::Inl(t, _)
            | Expr::Inr(t, _)
            | Expr::Case(t, _, _, _)
            | Expr::If(t, _, _, _)
            | Expr::Seq(t, _)
            | Expr::Ref(t, _)
            | Expr::Deref(t, _)
            | Expr::Assign(t, _, _)
            | Expr::While(t, _, _)
            | Expr::App(t, _, _)
            | Expr::Lambda(t, _, _)
            | Expr::LetFun(t, _, _, _)
            | Expr::LetRecFun(t, _, _, _)
            | Expr::Try(t, _, _, _)
            | Expr::Raise(t, _) => t,
        }
    }
}

/// The free variables of `e`, excluding `bound`, in first-occurrence order
/// and without duplicates.
pub fn free_vars<T>(bound: &[String], e: &Expr<T>) -> Vec<String> {
    let mut bound = bound.to_vec();
    let mut free = Vec::new();
    collect(&mut bound, e, &mut free);
    free
}

fn collect<T>(bound: &mut Vec<String>, e: &Expr<T>, free: &mut Vec<String>) {
    match e {
        Expr::Unit(_) | Expr::Boolean(_, _) | Expr::Integer(_, _) => {}
        Expr::Var(_, x) => {
            if !bound.iter().any(|b| b == x) && !free.iter().any(|v| v == x) {
                free.push(x.clone());
            }
        }
        Expr::UnaryOp(_, _, e1)
        | Expr::Fst(_, e1)
        | Expr::Snd(_, e1)
        | Expr::Inl(_, e1)
        | Expr::Inr(_, e1)
        | Expr::Ref(_, e1)
        | Expr::Deref(_, e1)
        | Expr::Raise(_, e1) => collect(bound, e1, free),
        Expr::Op(_, e1, _, e2)
        | Expr::Pair(_, e1, e2)
        | Expr::Assign(_, e1, e2)
        | Expr::While(_, e1, e2)
        | Expr::App(_, e1, e2) => {
            collect(bound, e1, free);
            collect(bound, e2, free);
        }
        Expr::If(_, e1, e2, e3) => {
            collect(bound, e1, free);
            collect(bound, e2, free);
            collect(bound, e3, free);
        }
        Expr::Seq(_, es) => {
            for e1 in es {
                collect(bound, e1, free);
            }
        }
        Expr::Lambda(_, x, body) => {
            with_bound(bound, &[x], |bound| collect(bound, body, free));
        }
        Expr::Case(_, e1, (x, e2), (y, e3)) => {
            collect(bound, e1, free);
            with_bound(bound, &[x], |bound| collect(bound, e2, free));
            with_bound(bound, &[y], |bound| collect(bound, e3, free));
        }
        Expr::LetFun(_, f, (x, e1), e2) => {
            with_bound(bound, &[x], |bound| collect(bound, e1, free));
            with_bound(bound, &[f], |bound| collect(bound, e2, free));
        }
        Expr::LetRecFun(_, f, (x, e1), e2) => {
            with_bound(bound, &[f, x], |bound| collect(bound, e1, free));
            with_bound(bound, &[f], |bound| collect(bound, e2, free));
        }
        Expr::Try(_, e1, x, e2) => {
            collect(bound, e1, free);
            with_bound(bound, &[x], |bound| collect(bound, e2, free));
        }
    }
}

fn with_bound(bound: &mut Vec<String>, names: &[&String], body: impl FnOnce(&mut Vec<String>)) {
    let depth = bound.len();
    bound.extend(names.iter().map(|n| (*n).clone()));
    body(bound);
    bound.truncate(depth);
}
