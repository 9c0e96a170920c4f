//! End-to-end programs: each one runs in a fresh root environment and the
//! transcript (everything printed, then the rendered result or error) is
//! compared with the expected text.

#![expect(clippy::unwrap_used)] // test code OK

use pretty_assertions::assert_eq;
use sprig::{Context, Error, create_global_env, parse_eval};

fn transcript(program: &str) -> String {
    let env = create_global_env();
    let (ctx, sink) = Context::buffered();
    let outcome = match parse_eval(&env, program, "program", &ctx) {
        Ok(node) => node.to_string(),
        Err(err) => format!("ERROR: {err}"),
    };
    format!("{}{outcome}", sink.take())
}

fn run_programs(cases: Vec<(&str, &str)>) {
    for (program, expected) in cases {
        assert_eq!(transcript(program), expected, "program:\n{program}");
    }
}

#[test]
fn test_recursion_and_closures() {
    run_programs(vec![
        (
            "(def fact (fn (n) (if (< n 2) 1 (* n (fact (- n 1))))))
             (fact 10)",
            "3628800",
        ),
        (
            "(def fib (fn (n) (cond (< n 2) n true (+ (fib (- n 1)) (fib (- n 2))))))
             (list (fib 0) (fib 1) (fib 15))",
            "(0 1 610)",
        ),
        (
            "(def compose (fn (f g) (fn (x) (f (g x)))))
             (def inc (fn (x) (+ x 1)))
             ((compose inc inc) 40)",
            "42",
        ),
        (
            "(def map (fn (f xs) (if (= xs '()) '() (cons (f (first xs)) (map f (rest xs))))))
             (map (fn (x) (* x x)) '(1 2 3 4))",
            "(1 4 9 16)",
        ),
        (
            "(def sum-below (fn (n) (if (= n 0) 0 (+ n (sum-below (- n 1))))))
             (sum-below 10000)",
            "50005000",
        ),
    ]);
}

#[test]
fn test_tail_calls_run_in_constant_stack() {
    run_programs(vec![(
        "(def sum-to (fn (n acc) (if (= n 0) acc (sum-to (- n 1) (+ acc n)))))
         (sum-to 1000000 0)",
        "500000500000",
    )]);
}

#[test]
fn test_output_and_results() {
    run_programs(vec![
        (
            "(println \"Hello,\" \"world\")
             (println (+ 1 2) '(a b) \\x)",
            "Hello, world\n3 (a b) \\x\nnil",
        ),
        (
            "(def greet (fn (name) (str \"Hello, \" name \"!\")))
             (greet \"Sprig\")",
            "\"Hello, Sprig!\"",
        ),
        (
            "(begin (println 1) (println 2) 'done)",
            "1\n2\ndone",
        ),
        ("^meta (quote x)", "x"),
        ("'^meta x", "^meta x"),
    ]);
}

#[test]
fn test_variadic_functions() {
    run_programs(vec![
        (
            "(def count-args (fn (&rest args) (if (= args '()) 0 (+ 1 (apply count-args (rest args))))))
             (count-args 'a 'b 'c)",
            "3",
        ),
        (
            "(def head-and-tail (fn (h &rest t) (list h t)))
             (head-and-tail 1 2 3)",
            "(1 (2 3))",
        ),
        (
            "(def two (fn (a b) a))
             (two 1)",
            "ERROR: Function 'two' expects 2 argument(s), but was given 1 (program: 2)",
        ),
    ]);
}

#[test]
fn test_macros() {
    run_programs(vec![
        (
            "(def when (macro (fn (c &rest body) (list 'if c (cons 'begin body) nil))))
             (when (< 1 2) (println \"yes\") 'ok)",
            "yes\nok",
        ),
        (
            "(def when (macro (fn (c &rest body) (list 'if c (cons 'begin body) nil))))
             (macroexpand1 '(when x (println 1)))",
            "(if x (begin (println 1)) nil)",
        ),
        (
            // Non-hygienic: the expansion sees the caller's bindings
            "(def use-y (macro (fn () 'y)))
             (def y 'outer)
             (let (y 'inner) (use-y))",
            "inner",
        ),
        (
            "(def swap! (macro (fn (a b) (list 'let (list 'tmp a) (list 'begin (list 'update! a b) (list 'update! b 'tmp))))))
             (def p 1)
             (def q 2)
             (swap! p q)
             (list p q)",
            "(2 1)",
        ),
    ]);
}

#[test]
fn test_scoping_rules() {
    run_programs(vec![
        ("(def x 1) (def x 2)", "ERROR: Cannot redefine a name: x (program: 1)"),
        ("(def y 1) (list (let (y 2) y) y)", "(2 1)"),
        (
            "(def n 0)
             (def bump (fn () (update! n (+ n 1))))
             (bump) (bump) (bump)
             n",
            "3",
        ),
        (
            "(def outer 'global)
             (def show (fn () outer))
             (let (outer 'local) (show))",
            "global",
        ),
    ]);
}

#[test]
fn test_eval_and_reflection() {
    run_programs(vec![
        ("(eval (list '+ 1 2))", "3"),
        ("(eval (read-string \"(* 6 7)\"))", "42"),
        (
            "(def adder (let (k 10) (fn (x) (+ x k))))
             (list (routine-params adder) (routine-body adder) (eval 'k (routine-environment adder)))",
            "((x) (+ x k) 10)",
        ),
        ("(typeof (current-environment))", "environment"),
        ("(readable-string (list 1 \"two\" 'three))", "\"(1 \"two\" three)\""),
    ]);
}

#[test]
fn test_concurrency() {
    run_programs(vec![
        ("(def c (chan)) (go (send! c 42)) (take! c)", "42"),
        ("(def c (chan)) (close! c) (take! c)", "nil"),
        (
            "(def results (chan))
             (def worker (fn (n) (send! results (* n n))))
             (go (worker 3))
             (take! results)",
            "9",
        ),
        (
            "(def ping (chan))
             (def pong (chan))
             (go (send! pong (+ 1 (take! ping))))
             (send! ping 41)
             (take! pong)",
            "42",
        ),
        (
            "(def c (chan))
             (def producer (fn (i) (if (> i 3) (close! c) (begin (send! c i) (producer (+ i 1))))))
             (go (producer 1))
             (def drain (fn (acc) (let (v (take! c)) (if (= v nil) acc (drain (concat acc (list v)))))))
             (drain '())",
            "(1 2 3)",
        ),
    ]);
}

#[test]
fn test_error_reporting() {
    run_programs(vec![
        ("(undefined 1)", "ERROR: Name not defined: undefined (program: 1)"),
        ("\n\n(car '(1))", "ERROR: Name not defined: car (program: 3)"),
        ("(panic \"custom\" 'failure)", "ERROR: custom failure (program: 1)"),
        ("(if true)", "ERROR: Special form 'if' expects 3 argument(s), but was given 1 (program: 1)"),
        ("(first 1 2)", "ERROR: Primitive 'first' expects 1 argument(s), but was given 2 (program: 1)"),
        ("(cond false 1)", "ERROR: No matching cond clause: (false 1) (program: 1)"),
    ]);
}

#[test]
fn test_parse_errors_stop_evaluation() {
    let env = create_global_env();
    let (ctx, sink) = Context::buffered();
    let err = parse_eval(&env, "(println \"never\")\n(+ 1 2", "program", &ctx).unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
    assert_eq!(err.to_string(), "Error (line 2): Unbalanced parentheses");
    assert_eq!(sink.contents(), "");

    let err = parse_eval(&env, ")\n1x", "program", &ctx).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Error (line 1): Unbalanced parentheses\nError (line 2): bad number syntax: \"1x\""
    );
}

#[test]
fn test_environment_persists_across_calls() {
    let env = create_global_env();
    let ctx = Context::silent();
    parse_eval(&env, "(def counter 0)", "one", &ctx).unwrap();
    parse_eval(&env, "(update! counter (+ counter 5))", "two", &ctx).unwrap();
    assert_eq!(parse_eval(&env, "counter", "three", &ctx).unwrap().to_string(), "5");
}
