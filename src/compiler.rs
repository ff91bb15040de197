//! # Slang-to-Jargon Compiler
//!
//! Translation is a single recursive pass. `comp` takes a compile-time
//! environment mapping identifiers to [`ValuePath`]s and produces two
//! instruction streams: the *main* stream, executed in order, and the
//! *definitions* stream holding function bodies. The top-level listing is
//! `main ++ halt ++ definitions`, so bodies sit after the halt and are only
//! reachable through `apply`.
//!
//! ## Frames and environments
//! When `apply` runs, the argument sits at `fp - 2` and the applied closure
//! at `fp - 1`. A function body is therefore compiled in a fresh environment:
//! the parameter maps to `stack -2`, the function's own name (for `let rec`)
//! to `stack -1`, and the i-th captured free variable to `heap i`, a slot of
//! the closure block itself.
//!
//! ## Closure construction
//! At the construction site the captured variables are fetched with the
//! last one first, so that after the fetches the i-th free variable sits
//! `i` cells below the stack top, which is the order `mk_closure` copies
//! them into the block.
//!
//! ## Labels
//! Fresh labels (`L0`, `L1`, ...) come from a counter owned by the
//! [`Compiler`] session. A new session starts again at `L0`; compiling the
//! same term in a fresh session reproduces the same listing.

use log::debug;

use crate::ast::{free_vars, Expr};
use crate::bytecode::{fmt_listing, Instr, Label, Location, Offset, StackItem, ValuePath};
use crate::error::CompileError;

/// Compile-time environment: an ordered association list, searched from the
/// most recent binding backwards.
type VMap = Vec<(String, ValuePath)>;

/// A compilation session owning the fresh-label counter.
#[derive(Debug, Default)]
pub struct Compiler {
    next_label: usize,
}

impl Compiler {
    pub fn new() -> Compiler {
        Compiler { next_label: 0 }
    }

    /// Restart label generation at `L0`.
    pub fn reset(&mut self) {
        self.next_label = 0;
    }

    fn fresh(&mut self) -> Label {
        let label = format!("L{}", self.next_label);
        self.next_label += 1;
        label
    }

    /// Compile a closed expression into a flat listing ending in `halt`
    /// followed by the accumulated function bodies.
    pub fn compile<T>(&mut self, e: &Expr<T>) -> Result<Vec<Instr>, CompileError> {
        let (defs, mut code) = self.comp(&VMap::new(), e)?;
        code.push(Instr::Halt);
        code.extend(defs);
        debug!("compiled listing:\n{}", fmt_listing(&code));
        Ok(code)
    }

    /// Translate one expression under `vmap` into `(definitions, main)`.
    fn comp<T>(
        &mut self,
        vmap: &VMap,
        e: &Expr<T>,
    ) -> Result<(Vec<Instr>, Vec<Instr>), CompileError> {
        Ok(match e {
            Expr::Unit(_) => (vec![], vec![Instr::Push(StackItem::Unit)]),
            Expr::Boolean(_, b) => (vec![], vec![Instr::Push(StackItem::Bool(*b))]),
            Expr::Integer(_, n) => (vec![], vec![Instr::Push(StackItem::Int(*n))]),
            Expr::Var(_, x) => (vec![], vec![Instr::Lookup(lookup_path(vmap, x)?)]),
            Expr::UnaryOp(_, op, e1) => {
                let (defs, mut code) = self.comp(vmap, e1)?;
                code.push(Instr::Unary(*op));
                (defs, code)
            }
            Expr::Op(_, e1, op, e2) => {
                let (mut defs, mut code) = self.comp(vmap, e1)?;
                let (d2, c2) = self.comp(vmap, e2)?;
                defs.extend(d2);
                code.extend(c2);
                code.push(Instr::Oper(*op));
                (defs, code)
            }
            Expr::Pair(_, e1, e2) => {
                let (mut defs, mut code) = self.comp(vmap, e1)?;
                let (d2, c2) = self.comp(vmap, e2)?;
                defs.extend(d2);
                code.extend(c2);
                code.push(Instr::MkPair);
                (defs, code)
            }
            Expr::Fst(_, e1) => self.comp_then(vmap, e1, Instr::Fst)?,
            Expr::Snd(_, e1) => self.comp_then(vmap, e1, Instr::Snd)?,
            Expr::Inl(_, e1) => self.comp_then(vmap, e1, Instr::MkInl)?,
            Expr::Inr(_, e1) => self.comp_then(vmap, e1, Instr::MkInr)?,
            Expr::Ref(_, e1) => self.comp_then(vmap, e1, Instr::MkRef)?,
            Expr::Deref(_, e1) => self.comp_then(vmap, e1, Instr::Deref)?,
            Expr::Raise(_, e1) => self.comp_then(vmap, e1, Instr::Raise)?,
            Expr::Assign(_, e1, e2) => {
                let (mut defs, mut code) = self.comp(vmap, e1)?;
                let (d2, c2) = self.comp(vmap, e2)?;
                defs.extend(d2);
                code.extend(c2);
                code.push(Instr::Assign);
                (defs, code)
            }
            Expr::Seq(_, es) => {
                if es.is_empty() {
                    return Err(CompileError::EmptySequence);
                }
                let mut defs = Vec::new();
                let mut code = Vec::new();
                for (i, e1) in es.iter().enumerate() {
                    let (d, c) = self.comp(vmap, e1)?;
                    defs.extend(d);
                    code.extend(c);
                    if i + 1 < es.len() {
                        code.push(Instr::Pop);
                    }
                }
                (defs, code)
            }
            Expr::If(_, e1, e2, e3) => {
                let l_else = self.fresh();
                let l_end = self.fresh();
                let (mut defs, mut code) = self.comp(vmap, e1)?;
                code.push(Instr::Test(Location::new(l_else.clone())));
                let (d2, c2) = self.comp(vmap, e2)?;
                defs.extend(d2);
                code.extend(c2);
                code.push(Instr::Goto(Location::new(l_end.clone())));
                code.push(Instr::Label(l_else));
                let (d3, c3) = self.comp(vmap, e3)?;
                defs.extend(d3);
                code.extend(c3);
                code.push(Instr::Label(l_end));
                (defs, code)
            }
            Expr::While(_, e1, e2) => {
                let l_start = self.fresh();
                let l_end = self.fresh();
                let mut code = vec![Instr::Label(l_start.clone())];
                let (mut defs, c1) = self.comp(vmap, e1)?;
                code.extend(c1);
                code.push(Instr::Test(Location::new(l_end.clone())));
                let (d2, c2) = self.comp(vmap, e2)?;
                defs.extend(d2);
                code.extend(c2);
                code.push(Instr::Pop);
                code.push(Instr::Goto(Location::new(l_start)));
                code.push(Instr::Label(l_end));
                code.push(Instr::Push(StackItem::Unit));
                (defs, code)
            }
            Expr::App(_, e1, e2) => {
                // The argument is evaluated and pushed before the function.
                let (mut defs, mut code) = self.comp(vmap, e2)?;
                let (d1, c1) = self.comp(vmap, e1)?;
                defs.extend(d1);
                code.extend(c1);
                code.push(Instr::Apply);
                (defs, code)
            }
            Expr::Lambda(_, x, body) => self.comp_lambda(vmap, None, x, body)?,
            Expr::LetFun(_, f, (x, e1), e2) => {
                // let f x = e1 in e2  ==  (fun f -> e2) (fun x -> e1)
                let (mut defs, mut code) = self.comp_lambda(vmap, None, x, e1)?;
                let (d2, c2) = self.comp_lambda(vmap, None, f, e2)?;
                defs.extend(d2);
                code.extend(c2);
                code.push(Instr::Apply);
                (defs, code)
            }
            Expr::LetRecFun(_, f, (x, e1), e2) => {
                let (mut defs, mut code) = self.comp_lambda(vmap, Some(f), x, e1)?;
                let (d2, c2) = self.comp_lambda(vmap, None, f, e2)?;
                defs.extend(d2);
                code.extend(c2);
                code.push(Instr::Apply);
                (defs, code)
            }
            Expr::Case(_, e1, (x, e2), (y, e3)) => {
                let l_inr = self.fresh();
                let l_after = self.fresh();
                let (mut defs, mut code) = self.comp(vmap, e1)?;
                code.push(Instr::Case(Location::new(l_inr.clone())));
                let (d_l, c_l) = self.comp_lambda(vmap, None, x, e2)?;
                defs.extend(d_l);
                code.extend(c_l);
                code.push(Instr::Apply);
                code.push(Instr::Goto(Location::new(l_after.clone())));
                code.push(Instr::Label(l_inr));
                let (d_r, c_r) = self.comp_lambda(vmap, None, y, e3)?;
                defs.extend(d_r);
                code.extend(c_r);
                code.push(Instr::Apply);
                code.push(Instr::Label(l_after));
                (defs, code)
            }
            Expr::Try(_, e1, x, e2) => {
                let l_exc = self.fresh();
                let l_end = self.fresh();
                let mut code = vec![Instr::Try(Location::new(l_exc.clone()))];
                let (mut defs, c1) = self.comp(vmap, e1)?;
                code.extend(c1);
                code.push(Instr::UnTry);
                code.push(Instr::Goto(Location::new(l_end.clone())));
                code.push(Instr::Label(l_exc));
                let (d_h, c_h) = self.comp_lambda(vmap, None, x, e2)?;
                defs.extend(d_h);
                code.extend(c_h);
                code.push(Instr::Apply);
                code.push(Instr::Label(l_end));
                (defs, code)
            }
        })
    }

    /// Compile a subexpression and append one trailing instruction.
    fn comp_then<T>(
        &mut self,
        vmap: &VMap,
        e: &Expr<T>,
        instr: Instr,
    ) -> Result<(Vec<Instr>, Vec<Instr>), CompileError> {
        let (defs, mut code) = self.comp(vmap, e)?;
        code.push(instr);
        Ok((defs, code))
    }

    /// Compile a function body into the definitions stream and emit the
    /// closure construction into the main stream. `rec_name` is the
    /// function's own name when the binding is recursive.
    fn comp_lambda<T>(
        &mut self,
        vmap: &VMap,
        rec_name: Option<&String>,
        param: &String,
        body: &Expr<T>,
    ) -> Result<(Vec<Instr>, Vec<Instr>), CompileError> {
        let mut bound = vec![param.clone()];
        if let Some(f) = rec_name {
            bound.push(f.clone());
        }
        let fvars = free_vars(&bound, body);

        let entry = self.fresh();

        let mut body_vmap: VMap = vec![(param.clone(), ValuePath::StackLocation(-2))];
        if let Some(f) = rec_name {
            body_vmap.push((f.clone(), ValuePath::StackLocation(-1)));
        }
        for (i, fv) in fvars.iter().enumerate() {
            body_vmap.push((fv.clone(), ValuePath::HeapLocation(i as Offset + 1)));
        }

        let (body_defs, body_code) = self.comp(&body_vmap, body)?;

        let mut code = Vec::with_capacity(fvars.len() + 1);
        for fv in fvars.iter().rev() {
            code.push(Instr::Lookup(lookup_path(vmap, fv)?));
        }
        code.push(Instr::MkClosure(Location::new(entry.clone()), fvars.len()));

        let mut defs = body_defs;
        defs.push(Instr::Label(entry));
        defs.extend(body_code);
        defs.push(Instr::Return);
        Ok((defs, code))
    }
}

fn lookup_path(vmap: &VMap, name: &str) -> Result<ValuePath, CompileError> {
    vmap.iter()
        .rev()
        .find(|(n, _)| n == name)
        .map(|(_, path)| *path)
        .ok_or_else(|| CompileError::UnknownIdent(name.to_string()))
}
