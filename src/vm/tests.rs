use super::*;
use crate::ast::{BinOp, Expr, UnOp};
use crate::bytecode::{Instr, Location, ValuePath};
use crate::compiler::Compiler;
use crate::loader::load;

fn run_listing(listing: Vec<Instr>, stack_max: usize, heap_max: usize) -> (Vm, Result<Status, RuntimeError>) {
    let program = load(&listing).expect("listing loads");
    let mut vm = Vm::new(program, stack_max, heap_max);
    let mut input: Vec<i64> = vec![];
    let res = vm.run(&mut input);
    (vm, res)
}

fn eval_vm(e: &Expr<()>, input: Vec<i64>) -> Vm {
    let listing = Compiler::new().compile(e).expect("compiles");
    let program = load(&listing).expect("loads");
    let mut vm = Vm::new(program, 1000, 1000);
    let mut input = input;
    let status = vm.run(&mut input).expect("no runtime error");
    assert_eq!(status, Status::Halted);
    vm
}

fn eval(e: &Expr<()>) -> Value {
    eval_vm(e, vec![]).result().expect("decodes")
}

fn int(n: i64) -> Expr<()> {
    Expr::Integer((), n)
}

fn boolean(b: bool) -> Expr<()> {
    Expr::Boolean((), b)
}

fn var(x: &str) -> Expr<()> {
    Expr::Var((), x.to_string())
}

fn op(e1: Expr<()>, o: BinOp, e2: Expr<()>) -> Expr<()> {
    Expr::Op((), Box::new(e1), o, Box::new(e2))
}

fn lam(x: &str, body: Expr<()>) -> Expr<()> {
    Expr::Lambda((), x.to_string(), Box::new(body))
}

fn app(f: Expr<()>, arg: Expr<()>) -> Expr<()> {
    Expr::App((), Box::new(f), Box::new(arg))
}

fn letfun(f: &str, x: &str, e1: Expr<()>, e2: Expr<()>) -> Expr<()> {
    Expr::LetFun((), f.to_string(), (x.to_string(), Box::new(e1)), Box::new(e2))
}

fn letrec(f: &str, x: &str, e1: Expr<()>, e2: Expr<()>) -> Expr<()> {
    Expr::LetRecFun((), f.to_string(), (x.to_string(), Box::new(e1)), Box::new(e2))
}

fn seq(es: Vec<Expr<()>>) -> Expr<()> {
    Expr::Seq((), es)
}

fn if_(c: Expr<()>, t: Expr<()>, e: Expr<()>) -> Expr<()> {
    Expr::If((), Box::new(c), Box::new(t), Box::new(e))
}

fn while_(c: Expr<()>, body: Expr<()>) -> Expr<()> {
    Expr::While((), Box::new(c), Box::new(body))
}

fn pair(e1: Expr<()>, e2: Expr<()>) -> Expr<()> {
    Expr::Pair((), Box::new(e1), Box::new(e2))
}

fn ref_(e: Expr<()>) -> Expr<()> {
    Expr::Ref((), Box::new(e))
}

fn deref(e: Expr<()>) -> Expr<()> {
    Expr::Deref((), Box::new(e))
}

fn assign(e1: Expr<()>, e2: Expr<()>) -> Expr<()> {
    Expr::Assign((), Box::new(e1), Box::new(e2))
}

fn case_(e: Expr<()>, x: &str, e2: Expr<()>, y: &str, e3: Expr<()>) -> Expr<()> {
    Expr::Case(
        (),
        Box::new(e),
        (x.to_string(), Box::new(e2)),
        (y.to_string(), Box::new(e3)),
    )
}

fn try_(e1: Expr<()>, x: &str, e2: Expr<()>) -> Expr<()> {
    Expr::Try((), Box::new(e1), x.to_string(), Box::new(e2))
}

fn raise(e: Expr<()>) -> Expr<()> {
    Expr::Raise((), Box::new(e))
}

// --- End-to-end scenarios --------------------------------------------------

#[test]
fn arithmetic_precedence() {
    // 1 + 2 * 3
    let e = op(int(1), BinOp::Add, op(int(2), BinOp::Mul, int(3)));
    assert_eq!(eval(&e), Value::Int(7));
}

#[test]
fn conditional_with_projections() {
    // if 3 < 4 then fst (1, 2) else snd (1, 2)
    let e = if_(
        op(int(3), BinOp::Lt, int(4)),
        Expr::Fst((), Box::new(pair(int(1), int(2)))),
        Expr::Snd((), Box::new(pair(int(1), int(2)))),
    );
    assert_eq!(eval(&e), Value::Int(1));
}

#[test]
fn let_bound_function_applied_twice() {
    // let f x = x + 1 in f (f 10)
    let e = letfun(
        "f",
        "x",
        op(var("x"), BinOp::Add, int(1)),
        app(var("f"), app(var("f"), int(10))),
    );
    assert_eq!(eval(&e), Value::Int(12));
}

#[test]
fn recursive_factorial() {
    // let rec fact n = if n = 0 then 1 else n * fact (n - 1) in fact 5
    let body = if_(
        op(var("n"), BinOp::EqI, int(0)),
        int(1),
        op(
            var("n"),
            BinOp::Mul,
            app(var("fact"), op(var("n"), BinOp::Sub, int(1))),
        ),
    );
    let e = letrec("fact", "n", body, app(var("fact"), int(5)));
    assert_eq!(eval(&e), Value::Int(120));
}

#[test]
fn reference_cell_updates() {
    // let r = ref 0 in (r := !r + 41; r := !r + 1; !r)
    let body = seq(vec![
        assign(var("r"), op(deref(var("r")), BinOp::Add, int(41))),
        assign(var("r"), op(deref(var("r")), BinOp::Add, int(1))),
        deref(var("r")),
    ]);
    let e = app(lam("r", body), ref_(int(0)));
    assert_eq!(eval(&e), Value::Int(42));
}

#[test]
fn raised_value_reaches_handler() {
    // try (raise 7) + 100 with e -> e * 2
    let e = try_(
        op(raise(int(7)), BinOp::Add, int(100)),
        "e",
        op(var("e"), BinOp::Mul, int(2)),
    );
    assert_eq!(eval(&e), Value::Int(14));
}

#[test]
fn case_selects_the_right_branch() {
    // case inr 9 of inl x -> x + 1 | inr y -> y - 1
    let e = case_(
        Expr::Inr((), Box::new(int(9))),
        "x",
        op(var("x"), BinOp::Add, int(1)),
        "y",
        op(var("y"), BinOp::Sub, int(1)),
    );
    assert_eq!(eval(&e), Value::Int(8));
}

#[test]
fn while_loop_sums_one_to_ten() {
    // let r = ref 0 in let i = ref 1 in
    //   (while !i < 11 do (r := !r + !i; i := !i + 1); !r)
    let loop_body = seq(vec![
        assign(var("r"), op(deref(var("r")), BinOp::Add, deref(var("i")))),
        assign(var("i"), op(deref(var("i")), BinOp::Add, int(1))),
    ]);
    let inner = seq(vec![
        while_(op(deref(var("i")), BinOp::Lt, int(11)), loop_body),
        deref(var("r")),
    ]);
    let e = app(lam("r", app(lam("i", inner), ref_(int(1)))), ref_(int(0)));
    assert_eq!(eval(&e), Value::Int(55));
}

// --- Functions and frames --------------------------------------------------

#[test]
fn closure_survives_its_creating_frame() {
    // ((fun y -> fun x -> x + y) 5) 7
    let e = app(
        app(lam("y", lam("x", op(var("x"), BinOp::Add, var("y")))), int(5)),
        int(7),
    );
    assert_eq!(eval(&e), Value::Int(12));
}

#[test]
fn return_leaves_one_value_above_callers_stack() {
    // The caller's height is 2 (the synthetic first frame) before pushing
    // argument and closure; after the call returns only the result remains.
    let vm = eval_vm(&app(lam("x", var("x")), int(42)), vec![]);
    assert_eq!(vm.stack_height(), 3);
    assert_eq!(vm.result(), Ok(Value::Int(42)));
}

#[test]
fn closure_environment_is_copied_at_construction() {
    let listing = vec![
        Instr::Push(StackItem::Int(99)), // argument
        Instr::Push(StackItem::Int(5)),  // captured cell
        Instr::MkClosure(Location::new("Lf".to_string()), 1),
        Instr::Apply,
        Instr::Halt,
        Instr::Label("Lf".to_string()),
        Instr::Lookup(ValuePath::HeapLocation(1)),
        Instr::Return,
    ];
    let (vm, res) = run_listing(listing, 100, 100);
    assert_eq!(res, Ok(Status::Halted));
    assert_eq!(vm.result(), Ok(Value::Int(5)));
}

// --- Exceptions ------------------------------------------------------------

#[test]
fn normal_path_discards_the_exception_frame() {
    let vm = eval_vm(&try_(int(5), "e", int(99)), vec![]);
    assert_eq!(vm.stack_height(), 3);
    assert_eq!(vm.result(), Ok(Value::Int(5)));
}

#[test]
fn raise_unwinds_nested_call_frames() {
    // try (let f x = raise x in f 3 + 1) with e -> e
    let e = try_(
        letfun(
            "f",
            "x",
            raise(var("x")),
            op(app(var("f"), int(3)), BinOp::Add, int(1)),
        ),
        "e",
        var("e"),
    );
    assert_eq!(eval(&e), Value::Int(3));
}

#[test]
fn handlers_nest_and_rethrow() {
    // try (try raise 1 with a -> raise (a + 1)) with b -> b + 10
    let e = try_(
        try_(raise(int(1)), "a", raise(op(var("a"), BinOp::Add, int(1)))),
        "b",
        op(var("b"), BinOp::Add, int(10)),
    );
    assert_eq!(eval(&e), Value::Int(12));
}

#[test]
fn untry_restores_the_outer_handler() {
    // try ((try 1 with a -> 2); raise 5) with b -> b + 1
    let e = try_(
        seq(vec![try_(int(1), "a", int(2)), raise(int(5))]),
        "b",
        op(var("b"), BinOp::Add, int(1)),
    );
    assert_eq!(eval(&e), Value::Int(6));
}

#[test]
fn raise_without_handler_fails() {
    let listing = Compiler::new().compile(&raise(int(7))).unwrap();
    let program = load(&listing).unwrap();
    let mut vm = Vm::new(program, 100, 100);
    let mut input: Vec<i64> = vec![];
    match vm.run(&mut input) {
        Err(RuntimeError::NoHandler(v)) => assert_eq!(v, "7"),
        other => panic!("expected no-handler error, got {:?}", other),
    }
}

// --- Input -----------------------------------------------------------------

#[test]
fn read_consumes_scripted_input() {
    let e = op(
        Expr::UnaryOp((), UnOp::Read, Box::new(Expr::Unit(()))),
        BinOp::Add,
        Expr::UnaryOp((), UnOp::Read, Box::new(Expr::Unit(()))),
    );
    let vm = eval_vm(&e, vec![40, 2]);
    assert_eq!(vm.result(), Ok(Value::Int(42)));
}

// --- Statuses and malformed states -----------------------------------------

#[test]
fn empty_program_runs_off_the_code_array() {
    let (_, res) = run_listing(vec![], 10, 10);
    assert_eq!(res, Ok(Status::CodeIndexOutOfBound));
}

#[test]
fn stack_exhaustion_is_a_status() {
    let listing = vec![
        Instr::Push(StackItem::Int(1)),
        Instr::Push(StackItem::Int(1)),
        Instr::Push(StackItem::Int(1)),
        Instr::Halt,
    ];
    // Two slots are taken by the synthetic first frame.
    let (_, res) = run_listing(listing, 4, 10);
    assert_eq!(res, Ok(Status::StackIndexOutOfBound));
}

#[test]
fn heap_exhaustion_is_a_status() {
    let listing = vec![
        Instr::Push(StackItem::Int(1)),
        Instr::Push(StackItem::Int(2)),
        Instr::MkPair,
        Instr::Halt,
    ];
    let (_, res) = run_listing(listing, 10, 3);
    assert_eq!(res, Ok(Status::HeapIndexOutOfBound));
}

#[test]
fn popping_an_empty_stack_is_a_status() {
    let listing = vec![Instr::Pop, Instr::Pop, Instr::Pop, Instr::Halt];
    let (_, res) = run_listing(listing, 10, 10);
    assert_eq!(res, Ok(Status::StackUnderflow));
}

#[test]
fn apply_on_a_non_closure_is_malformed() {
    let listing = vec![Instr::Push(StackItem::Int(1)), Instr::Apply, Instr::Halt];
    let (_, res) = run_listing(listing, 10, 10);
    assert!(matches!(res, Err(RuntimeError::BadState(_))));
}

#[test]
fn fst_on_a_non_pair_is_malformed() {
    let listing = vec![
        Instr::Push(StackItem::Int(1)),
        Instr::MkInl,
        Instr::Fst,
        Instr::Halt,
    ];
    let (_, res) = run_listing(listing, 10, 10);
    assert!(matches!(res, Err(RuntimeError::BadState(_))));
}

#[test]
fn division_by_zero_is_reported() {
    let listing = vec![
        Instr::Push(StackItem::Int(1)),
        Instr::Push(StackItem::Int(0)),
        Instr::Oper(BinOp::Div),
        Instr::Halt,
    ];
    let (_, res) = run_listing(listing, 10, 10);
    assert_eq!(res, Err(RuntimeError::DivisionByZero));
}

// --- Plumbing --------------------------------------------------------------

#[test]
fn swap_exchanges_the_top_two_cells() {
    let listing = vec![
        Instr::Push(StackItem::Int(1)),
        Instr::Push(StackItem::Int(2)),
        Instr::Swap,
        Instr::Halt,
    ];
    let (vm, res) = run_listing(listing, 10, 10);
    assert_eq!(res, Ok(Status::Halted));
    assert_eq!(vm.result(), Ok(Value::Int(1)));
}

#[test]
fn labels_are_runtime_no_ops() {
    let listing = vec![
        Instr::Label("a".to_string()),
        Instr::Push(StackItem::Int(3)),
        Instr::Label("b".to_string()),
        Instr::Halt,
    ];
    let (vm, res) = run_listing(listing, 10, 10);
    assert_eq!(res, Ok(Status::Halted));
    assert_eq!(vm.result(), Ok(Value::Int(3)));
}

#[test]
fn compound_results_decode_through_the_heap() {
    let e = pair(int(1), Expr::Inl((), Box::new(boolean(true))));
    let v = eval(&e);
    assert_eq!(
        v,
        Value::Pair(
            Box::new(Value::Int(1)),
            Box::new(Value::Inl(Box::new(Value::Bool(true))))
        )
    );
    assert_eq!(v.to_string(), "(1, inl(true))");
}

#[test]
fn lambda_results_decode_as_closure() {
    let e = lam("x", var("x"));
    assert_eq!(eval(&e), Value::Closure);
}
