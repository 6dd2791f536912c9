//! Session loop shared by the REPL and script runner.
//!
//! Every top-level item is evaluated on its own: an error abandons that item
//! (and the rest of its line) but the session carries on with the state the
//! item left behind. The end-of-input sentinel and the `exit` primitive end the
//! session.

use crate::ast::Value;
use crate::evaluator::{EvalConfig, Interpreter};
use crate::scheme::{ParseConfig, parse_program};
use crate::{Error, ParseErrorKind};
use log::debug;

/// Interpreter and reader options for a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionConfig {
    pub eval: EvalConfig,
    pub parse: ParseConfig,
}

/// Result of feeding one item (or one line) to a session
#[derive(Debug, PartialEq)]
pub enum Outcome {
    /// A value worth printing
    Value(Value),
    /// Nothing to print (unspecified result, or no input)
    Silent,
    Error(Error),
    /// The session should end
    Exit,
}

impl Outcome {
    fn from_result(result: Result<Value, Error>) -> Self {
        match result {
            Ok(Value::Unspecified) => Outcome::Silent,
            Ok(value) => Outcome::Value(value),
            Err(Error::Exit) => Outcome::Exit,
            Err(err) => Outcome::Error(err),
        }
    }
}

#[derive(Debug, Default)]
pub struct Session {
    interp: Interpreter,
    config: SessionConfig,
}

impl Session {
    pub fn new() -> Self {
        Session::default()
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Session {
            interp: Interpreter::with_config(config.eval),
            config,
        }
    }

    pub fn config(&self) -> SessionConfig {
        self.config
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interp
    }

    /// Mutable access for installing special forms or builtins before serving input
    pub fn interpreter_mut(&mut self) -> &mut Interpreter {
        &mut self.interp
    }

    /// Evaluate one already-read item in the global environment
    pub fn eval_item(&self, expr: &Value) -> Outcome {
        let outcome = Outcome::from_result(self.interp.eval(expr));
        if let Outcome::Error(err) = &outcome {
            debug!("item {expr} failed: {err}");
        }
        outcome
    }

    /// Read and evaluate every item on `line`; returns the outcome of the last
    /// one evaluated. Stops early at the first error or exit.
    pub fn eval_line(&self, line: &str) -> Outcome {
        let items = match parse_program(line, &self.config.parse) {
            Ok(items) => items,
            Err(err) => return Outcome::Error(err),
        };

        let mut last = Outcome::Silent;
        for item in &items {
            last = self.eval_item(item);
            if matches!(last, Outcome::Error(_) | Outcome::Exit) {
                break;
            }
        }
        last
    }

    /// Evaluate a whole program, collecting one outcome per item.
    ///
    /// Errors do not stop the script; an exit does.
    pub fn run_script(&self, source: &str) -> Vec<Outcome> {
        let items = match parse_program(source, &self.config.parse) {
            Ok(items) => items,
            Err(err) => return vec![Outcome::Error(err)],
        };
        debug!("running script with {} item(s)", items.len());

        let mut outcomes = Vec::with_capacity(items.len());
        for item in &items {
            let outcome = self.eval_item(item);
            let exit = outcome == Outcome::Exit;
            outcomes.push(outcome);
            if exit {
                debug!("script requested exit");
                break;
            }
        }
        outcomes
    }
}

/// True if `err` only means the input stopped mid-expression
pub fn needs_more_input(err: &Error) -> bool {
    matches!(err, Error::ParseError(e) if e.kind == ParseErrorKind::Incomplete)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{sym, val};

    #[test]
    fn test_eval_line_outcomes() {
        let session = Session::new();
        let cases: Vec<(&str, Outcome)> = vec![
            ("", Outcome::Silent),
            ("; just a comment", Outcome::Silent),
            ("(define x 2)", Outcome::Value(sym("x"))),
            ("(* x 21)", Outcome::Value(val(42))),
            ("(set! x 3)", Outcome::Silent),
            ("x (+ x 1)", Outcome::Value(val(4))), // last item wins
            ("(exit)", Outcome::Exit),
        ];
        for (line, expected) in cases {
            assert_eq!(session.eval_line(line), expected, "line: {line}");
        }
    }

    #[test]
    fn test_errors_keep_prior_effects() {
        let session = Session::new();
        session.eval_line("(define y 1)");
        // The set! before the failure is kept, the item after it is skipped
        let outcome = session.eval_line("(set! y 5) (car '()) (set! y 9)");
        assert!(matches!(outcome, Outcome::Error(_)));
        assert_eq!(session.eval_line("y"), Outcome::Value(val(5)));

        assert_eq!(
            session.eval_line("nope"),
            Outcome::Error(Error::UnboundVariable("nope".to_owned()))
        );
        assert_eq!(session.interpreter().dynamic_scope().depth(), 1);
    }

    #[test]
    fn test_eof_ends_session() {
        let session = Session::new();
        assert_eq!(session.eval_item(&Value::Eof), Outcome::Exit);
    }

    #[test]
    fn test_incomplete_input_detection() {
        let session = Session::new();
        match session.eval_line("(define (f x)") {
            Outcome::Error(err) => assert!(needs_more_input(&err)),
            other => panic!("expected incomplete parse, got {other:?}"),
        }
        match session.eval_line("(f))") {
            Outcome::Error(err) => assert!(!needs_more_input(&err)),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_run_script_stops_at_exit() {
        let session = Session::new();
        let script = "
            (define n 1)
            (car '())        ; error, script continues
            (set! n (+ n 1))
            n
            (exit)
            (set! n 100)
        ";
        let outcomes = session.run_script(script);
        assert_eq!(outcomes.len(), 5);
        assert!(matches!(outcomes[1], Outcome::Error(_)));
        assert_eq!(outcomes[3], Outcome::Value(val(2)));
        assert_eq!(outcomes[4], Outcome::Exit);
        assert_eq!(session.eval_line("n"), Outcome::Value(val(2)));
    }

    #[test]
    fn test_session_config() {
        let session = Session::with_config(SessionConfig {
            eval: EvalConfig { max_depth: 1 },
            parse: ParseConfig {
                handle_comments: false,
            },
        });
        assert!(matches!(session.eval_line("1 ; c"), Outcome::Error(Error::ParseError(_))));
        assert_eq!(
            session.eval_line("((lambda () 1))"),
            Outcome::Value(val(1))
        );
        assert!(matches!(
            session.eval_line("((lambda () ((lambda () 1))))"),
            Outcome::Error(Error::EvalError(_))
        ));
    }
}
