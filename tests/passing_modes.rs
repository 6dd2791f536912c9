#![expect(clippy::unwrap_used)] // test code OK

use paramlisp::ast::{Value, sym, val};
use paramlisp::driver::{Outcome, Session};
use paramlisp::evaluator::{Environment, Interpreter};
use paramlisp::scheme::parse_scheme;
use paramlisp::{ArityMismatch, Error};

fn run(session: &Session, lines: &[&str]) -> Outcome {
    let mut last = Outcome::Silent;
    for line in lines {
        last = session.eval_line(line);
        if let Outcome::Error(e) = &last {
            panic!("'{line}' failed: {e}");
        }
    }
    last
}

#[test]
fn reference_parameter_updates_caller() {
    let session = Session::new();
    let outcome = run(
        &session,
        &[
            "(define (double (reference r)) (set! r (* r 2)))",
            "(define y 5)",
            "(double y)",
            "y",
        ],
    );
    assert_eq!(outcome, Outcome::Value(val(10)));
}

#[test]
fn delayed_parameter_is_call_by_name() {
    let session = Session::new();
    let outcome = run(
        &session,
        &[
            "(define calls 0)",
            "(define (next!) (set! calls (+ calls 1)) calls)",
            "(define (three-times (delayed e)) (list e e e))",
            "(three-times (next!))",
        ],
    );
    assert_eq!(outcome, Outcome::Value(val([1, 2, 3])));
    assert_eq!(session.eval_line("calls"), Outcome::Value(val(3)));
}

#[test]
fn dynamic_parameter_sees_callers_of_callers() {
    let session = Session::new();
    let outcome = run(
        &session,
        &[
            "(define (read-it (dynamic v)) v)",
            "(define (relay) (read-it token))",
            "(define (origin token) (relay))",
            "(origin 'found)",
        ],
    );
    assert_eq!(outcome, Outcome::Value(sym("found")));
}

#[test]
fn mixed_modes_in_one_lambda() {
    let session = Session::new();
    let outcome = run(
        &session,
        &[
            "(define total 1)",
            "(define (mix a (delayed b) (dynamic c) (reference d)) (set! d (+ a b c)) d)",
            "(define (caller c) (mix 10 (* total 100) c total))",
            "(caller 1000)",
        ],
    );
    assert_eq!(outcome, Outcome::Value(val(1110)));
    assert_eq!(session.eval_line("total"), Outcome::Value(val(1110)));
}

#[test]
fn arity_errors_report_direction() {
    let session = Session::new();
    run(&session, &["(define (two a b) a)"]);
    match session.eval_line("(two 1)") {
        Outcome::Error(e) => assert_eq!(e.arity_mismatch(), Some(ArityMismatch::TooFew)),
        other => panic!("expected arity error, got {other:?}"),
    }
    match session.eval_line("(two 1 2 3)") {
        Outcome::Error(e) => assert_eq!(e.arity_mismatch(), Some(ArityMismatch::TooMany)),
        other => panic!("expected arity error, got {other:?}"),
    }
}

#[test]
fn cond_matches_equivalent_if_chain() {
    let session = Session::new();
    run(
        &session,
        &[
            "(define (by-cond n) (cond ((< n 0) 'neg) ((= n 0) 'zero) (else 'pos)))",
            "(define (by-if n) (if (< n 0) 'neg (if (= n 0) 'zero 'pos)))",
        ],
    );
    for n in [-3, 0, 8] {
        assert_eq!(
            session.eval_line(&format!("(by-cond {n})")),
            session.eval_line(&format!("(by-if {n})")),
        );
    }
}

#[test]
fn failed_call_leaves_dynamic_scope_balanced() {
    let session = Session::new();
    run(
        &session,
        &[
            "(define (boom (dynamic x)) (error \"boom\" x))",
            "(define (outer x) (boom x))",
        ],
    );
    assert!(matches!(
        session.eval_line("(outer 1)"),
        Outcome::Error(Error::EvalError(_))
    ));
    assert_eq!(session.interpreter().dynamic_scope().depth(), 1);
}

fn eval_twice(
    interp: &Interpreter,
    args: &[Value],
    env: &Environment,
    depth: usize,
) -> Result<Value, Error> {
    let [expr] = args else {
        return Err(Error::arity_error(1, args.len()));
    };
    interp.eval_with_depth(expr, env, depth)?;
    interp.eval_with_depth(expr, env, depth)
}

#[test]
fn installed_form_receives_unevaluated_operands() {
    let mut session = Session::new();
    session
        .interpreter_mut()
        .install_special_form("twice", eval_twice)
        .unwrap();

    run(&session, &["(define n 0)", "(twice (set! n (+ n 1)))"]);
    assert_eq!(session.eval_line("n"), Outcome::Value(val(2)));

    assert_eq!(
        session.interpreter_mut().install_special_form("twice", eval_twice),
        Err(Error::SpecialFormConflict("twice".to_owned()))
    );
    assert_eq!(
        session.eval_line("(define twice 1)"),
        Outcome::Error(Error::SpecialFormRedefinition("twice".to_owned()))
    );
}

#[test]
fn interpreter_api_without_driver() {
    let interp = Interpreter::new();
    let expr = parse_scheme("((lambda ((reference r)) r) car)").unwrap();
    assert!(matches!(
        interp.eval(&expr).unwrap(),
        Value::BuiltinFunction { .. }
    ));
    assert_eq!(
        interp.eval(&parse_scheme("(undefined-proc 1)").unwrap()),
        Err(Error::UnboundVariable("undefined-proc".to_owned()))
    );
}
