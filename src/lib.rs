//! paramlisp - a tree-walking Lisp interpreter with pluggable parameter passing
//!
//! This crate evaluates a small Scheme-flavoured language whose procedures choose,
//! parameter by parameter, how their arguments are passed:
//!
//! ```scheme
//! (define swap!
//!   (lambda ((reference a) (reference b))
//!     (let ((tmp a)) (set! a b) (set! b tmp))))
//!
//! (define twice (lambda ((delayed e)) (+ e e)))      ; e re-evaluated per use
//! (define peek  (lambda ((dynamic v)) v))             ; v resolved on the call stack
//! ```
//!
//! ## Parameter passing
//!
//! - plain parameters are evaluated eagerly in the caller's environment
//! - `delayed` parameters capture the operand and re-evaluate it on every access
//!   (call-by-name, no memoization)
//! - `dynamic` parameters are evaluated at the call site against the dynamic-scope
//!   stack, so they see bindings of every active caller
//! - `reference` parameters alias a variable of the caller; assignment through the
//!   parameter updates the caller's binding
//!
//! ## Special forms
//!
//! Special forms live in a name -> handler table owned by the
//! [`evaluator::Interpreter`]. The table is seeded with the core forms and can be
//! extended before the interpreter starts serving input. A variable bound to a
//! handler value can stand in for the form it names.
//!
//! ## Modules
//!
//! - `ast`: the value/expression model
//! - `evaluator`: dispatch/apply loop, environments, argument passing, special forms
//! - `builtinops`: the primitive procedure registry
//! - `scheme`: S-expression reader
//! - `driver`: session loop used by the REPL

use std::fmt;

/// Maximum parsing depth to prevent stack overflow attacks
/// This limits deeply nested structures in the S-expression reader
pub const MAX_PARSE_DEPTH: usize = 32;

/// Default evaluation depth limit: how many user procedure applications may be
/// in progress at once. Override through [`evaluator::EvalConfig`].
///
/// The evaluator recurses on the native stack, so running close to this limit
/// needs a thread with a larger stack than the 2 MiB Rust gives spawned threads.
pub const MAX_EVAL_DEPTH: usize = 2048;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Clone)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, malformed expressions)
    InvalidSyntax,
    /// Input ended before the expression was complete (EOF, unterminated string, unclosed parens)
    Incomplete,
    /// Expression nesting exceeded the maximum parse depth
    TooDeeplyNested,
    /// Extra input found after a complete, valid expression
    TrailingContent,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>, context: Option<String>) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
        }
    }

    /// Create a ParseError with context extracted from input at a given offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        let context_start = error_offset.saturating_sub(20);
        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.len() < input.len() {
            display_context.push_str("[...]");
        }

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context))
    }
}

/// Which side of the expected count an arity failure fell on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArityMismatch {
    TooFew,
    TooMany,
}

/// Error types for the interpreter
///
/// `Exit` is not a failure: it is the session-termination signal raised by the
/// end-of-input sentinel and the `exit` primitive. It travels on the error
/// channel so that it unwinds every in-flight evaluation in one step.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    ParseError(ParseError),
    EvalError(String),
    TypeError(String),
    UnboundVariable(String),
    ArityError {
        expected: usize,
        got: usize,
        expression: Option<String>, // Optional expression context
    },
    UnknownExpressionType(String),
    UnknownProcedureType(String),
    /// A special form is being installed under a name that is already taken
    SpecialFormConflict(String),
    /// A reference-tagged operand was not an identifier defined in the caller
    ReferenceArgument(String),
    /// `define`/`set!`/parameter list targeting the name of a special form
    SpecialFormRedefinition(String),
    Exit,
}

impl Error {
    /// Create an ArityError without expression context
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an ArityError with expression context
    pub fn arity_error_with_expr(expected: usize, got: usize, expression: String) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: Some(expression),
        }
    }

    /// For arity errors, whether too few or too many arguments were supplied
    pub fn arity_mismatch(&self) -> Option<ArityMismatch> {
        match self {
            Error::ArityError { expected, got, .. } if got < expected => {
                Some(ArityMismatch::TooFew)
            }
            Error::ArityError { expected, got, .. } if got > expected => {
                Some(ArityMismatch::TooMany)
            }
            _ => None,
        }
    }

    /// True for the session-exit signal
    pub fn is_exit(&self) -> bool {
        matches!(self, Error::Exit)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ParseError(e) => {
                write!(f, "ParseError: {}", e.message)?;
                if let Some(context) = &e.context {
                    write!(f, "\nContext: {context}")?;
                }
                Ok(())
            }
            Error::EvalError(msg) => write!(f, "EvaluationError: {msg}"),
            Error::TypeError(msg) => write!(f, "Type error: {msg}"),
            Error::UnboundVariable(var) => write!(f, "Unbound variable: {var}"),
            Error::ArityError {
                expected,
                got,
                expression,
            } => {
                let which = if got > expected {
                    "too many arguments"
                } else {
                    "too few arguments"
                };
                match expression {
                    Some(expr) => write!(
                        f,
                        "ArityError: {which} in {expr}: expected {expected}, got {got}"
                    ),
                    None => write!(f, "ArityError: {which}: expected {expected}, got {got}"),
                }
            }
            Error::UnknownExpressionType(expr) => {
                write!(f, "EvaluationError: unknown expression type: {expr}")
            }
            Error::UnknownProcedureType(proc) => {
                write!(f, "EvaluationError: unknown procedure type: {proc}")
            }
            Error::SpecialFormConflict(name) => {
                write!(f, "SpecialFormConflict: '{name}' is already defined")
            }
            Error::ReferenceArgument(operand) => write!(
                f,
                "ReferenceArgumentError: {operand} is not a defined variable of the caller"
            ),
            Error::SpecialFormRedefinition(name) => {
                write!(f, "Cannot redefine special form: {name}")
            }
            Error::Exit => write!(f, "Session exit"),
        }
    }
}

impl std::error::Error for Error {}

pub mod ast;
pub mod builtinops;
pub mod evaluator;

#[cfg(feature = "scheme")]
pub mod driver;

#[cfg(feature = "scheme")]
pub mod scheme;
