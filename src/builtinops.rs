//! Built-in operations registry.
//!
//! Primitives are host functions over already-evaluated arguments. Each entry
//! carries its Scheme identifier and an [`Arity`] that is checked before the
//! function runs, so implementations can destructure their argument slice
//! without re-checking the count.
//!
//! ```scheme
//! (+ 1 2 3)               ; arithmetic, overflow is an error
//! (equal? '(1 2) '(1 2))  ; structural equality
//! (stream-cdr s)          ; the evaluator forces the delayed tail
//! ```
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** following the signature `fn(args: &[Value]) -> Result<Value, Error>`
//! 2. **Add to BUILTIN_OPS** with its identifier and arity
//! 3. **Add tests** covering edge cases and error conditions
//!
//! Operations that need unevaluated operands belong in the special-form table
//! instead (see `evaluator::special_forms`).

use crate::Error;
use crate::ast::{NumberType, Value};
use crate::evaluator::Environment;
use log::warn;
use std::io::Write;
use std::sync::{Arc, LazyLock};

/// The erased builtin signature stored in [`Value::BuiltinFunction`]
pub type OperationFn = dyn Fn(Vec<Value>) -> Result<Value, Error> + Send + Sync;

/// Plain primitive implementation over evaluated arguments
pub type BuiltinFn = fn(&[Value]) -> Result<Value, Error>;

/// Accepted argument counts of a primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    pub fn validate(self, got: usize) -> Result<(), Error> {
        match self {
            Arity::Exact(expected) if got != expected => Err(Error::arity_error(expected, got)),
            Arity::AtLeast(min) if got < min => Err(Error::arity_error(min, got)),
            _ => Ok(()),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// The Scheme identifier for this operation
    pub id: &'static str,
    pub func: BuiltinFn,
    /// Expected number of arguments
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        // Compare operations by their id, which uniquely identifies them
        self.id == other.id
    }
}

impl BuiltinOp {
    /// Procedure value for this operation, with arity checking built in
    pub(crate) fn to_value(&self) -> Value {
        builtin_value(self.id, self.arity, self.func)
    }
}

/// Wrap a primitive as a procedure value that validates its argument count
pub(crate) fn builtin_value(id: &str, arity: Arity, func: BuiltinFn) -> Value {
    Value::BuiltinFunction {
        id: id.to_owned(),
        func: Arc::new(move |args: Vec<Value>| {
            arity.validate(args.len())?;
            func(&args)
        }),
    }
}

//
// Builtin Function Implementations
//

fn number(value: &Value) -> Result<NumberType, Error> {
    match value {
        Value::Number(n) => Ok(*n),
        _ => Err(Error::TypeError(format!("expected number, got {value}"))),
    }
}

fn list(value: &Value) -> Result<&[Value], Error> {
    match value {
        Value::List(elements) => Ok(elements.as_slice()),
        _ => Err(Error::TypeError(format!("expected list, got {value}"))),
    }
}

// Macro to generate numeric comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(args: &[Value]) -> Result<Value, Error> {
            let numbers = args.iter().map(number).collect::<Result<Vec<_>, _>>()?;
            // Chain comparisons: all adjacent pairs must satisfy the comparison
            Ok(Value::Bool(numbers.windows(2).all(|pair| pair[0] $op pair[1])))
        }
    };
}

// Generate all comparison functions
numeric_comparison!(builtin_eq, ==);
numeric_comparison!(builtin_lt, <);
numeric_comparison!(builtin_gt, >);
numeric_comparison!(builtin_le, <=);
numeric_comparison!(builtin_ge, >=);

fn builtin_add(args: &[Value]) -> Result<Value, Error> {
    let mut sum: NumberType = 0;
    for arg in args {
        sum = sum
            .checked_add(number(arg)?)
            .ok_or_else(|| Error::EvalError("Integer overflow in addition".into()))?;
    }
    Ok(Value::Number(sum))
}

fn builtin_sub(args: &[Value]) -> Result<Value, Error> {
    let [first, rest @ ..] = args else {
        return Err(Error::arity_error(1, 0));
    };
    let first = number(first)?;

    if rest.is_empty() {
        return first
            .checked_neg()
            .map(Value::Number)
            .ok_or_else(|| Error::EvalError("Integer overflow in negation".into()));
    }

    let mut result = first;
    for n in rest {
        result = result
            .checked_sub(number(n)?)
            .ok_or_else(|| Error::EvalError("Integer overflow in subtraction".into()))?;
    }
    Ok(Value::Number(result))
}

fn builtin_mul(args: &[Value]) -> Result<Value, Error> {
    let mut product: NumberType = 1;
    for arg in args {
        product = product
            .checked_mul(number(arg)?)
            .ok_or_else(|| Error::EvalError("Integer overflow in multiplication".into()))?;
    }
    Ok(Value::Number(product))
}

fn builtin_max(args: &[Value]) -> Result<Value, Error> {
    let mut result = number(&args[0])?;
    for n in &args[1..] {
        result = result.max(number(n)?);
    }
    Ok(Value::Number(result))
}

fn builtin_min(args: &[Value]) -> Result<Value, Error> {
    let mut result = number(&args[0])?;
    for n in &args[1..] {
        result = result.min(number(n)?);
    }
    Ok(Value::Number(result))
}

fn builtin_car(args: &[Value]) -> Result<Value, Error> {
    match list(&args[0])? {
        [first, ..] => Ok(first.clone()),
        [] => Err(Error::EvalError("car of empty list".into())),
    }
}

fn builtin_cdr(args: &[Value]) -> Result<Value, Error> {
    match list(&args[0])? {
        [_, rest @ ..] => Ok(Value::List(rest.to_vec())),
        [] => Err(Error::EvalError("cdr of empty list".into())),
    }
}

fn builtin_cons(args: &[Value]) -> Result<Value, Error> {
    match &args[1] {
        Value::List(tail) => {
            let mut new_list = Vec::with_capacity(tail.len() + 1);
            new_list.push(args[0].clone());
            new_list.extend_from_slice(tail);
            Ok(Value::List(new_list))
        }
        // Improper lists are not representable
        _ => Err(Error::TypeError(
            "cons requires a list as second argument".to_owned(),
        )),
    }
}

fn builtin_list(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::List(args.to_vec()))
}

fn builtin_null(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(args[0].is_nil()))
}

fn builtin_pair(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(
        matches!(&args[0], Value::List(elements) if !elements.is_empty()),
    ))
}

fn builtin_not(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(!args[0].is_true()))
}

fn builtin_equal(args: &[Value]) -> Result<Value, Error> {
    // Structural equality; values of different types are simply unequal
    Ok(Value::Bool(args[0] == args[1]))
}

fn builtin_string_append(args: &[Value]) -> Result<Value, Error> {
    let mut result = String::new();
    for arg in args {
        match arg {
            Value::String(s) => result.push_str(s),
            _ => {
                return Err(Error::TypeError(format!(
                    "string-append expects strings, got {arg}"
                )));
            }
        }
    }
    Ok(Value::String(result))
}

fn builtin_display(args: &[Value]) -> Result<Value, Error> {
    let text = match &args[0] {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let mut stdout = std::io::stdout().lock();
    write!(stdout, "{text}")
        .and_then(|()| stdout.flush())
        .map_err(|err| Error::EvalError(format!("display failed: {err}")))?;
    Ok(Value::Unspecified)
}

fn builtin_newline(_args: &[Value]) -> Result<Value, Error> {
    println!();
    Ok(Value::Unspecified)
}

fn builtin_error(args: &[Value]) -> Result<Value, Error> {
    let parts: Vec<String> = args
        .iter()
        .map(|value| match value {
            Value::String(s) => s.clone(),
            _ => format!("{value}"),
        })
        .collect();

    let message = if parts.is_empty() {
        "Error".to_string()
    } else {
        parts.join(" ")
    };

    Err(Error::EvalError(message))
}

fn builtin_exit(_args: &[Value]) -> Result<Value, Error> {
    Err(Error::Exit)
}

/// The tail of a stream is stored unevaluated; the evaluator forces it on return
fn builtin_stream_cdr(args: &[Value]) -> Result<Value, Error> {
    match list(&args[0])? {
        [_, tail] => Ok(tail.clone()),
        _ => Err(Error::TypeError(format!(
            "stream-cdr expects a stream pair, got {}",
            args[0]
        ))),
    }
}

/// Global registry of all built-in operations.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    vec![
        BuiltinOp {
            id: "+",
            func: builtin_add,
            arity: Arity::Any,
        },
        BuiltinOp {
            id: "-",
            func: builtin_sub,
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            id: "*",
            func: builtin_mul,
            arity: Arity::Any,
        },
        BuiltinOp {
            id: "=",
            func: builtin_eq,
            arity: Arity::AtLeast(2),
        },
        BuiltinOp {
            id: "<",
            func: builtin_lt,
            arity: Arity::AtLeast(2),
        },
        BuiltinOp {
            id: ">",
            func: builtin_gt,
            arity: Arity::AtLeast(2),
        },
        BuiltinOp {
            id: "<=",
            func: builtin_le,
            arity: Arity::AtLeast(2),
        },
        BuiltinOp {
            id: ">=",
            func: builtin_ge,
            arity: Arity::AtLeast(2),
        },
        BuiltinOp {
            id: "max",
            func: builtin_max,
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            id: "min",
            func: builtin_min,
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            id: "equal?",
            func: builtin_equal,
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "not",
            func: builtin_not,
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "car",
            func: builtin_car,
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "cdr",
            func: builtin_cdr,
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "cons",
            func: builtin_cons,
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "list",
            func: builtin_list,
            arity: Arity::Any,
        },
        BuiltinOp {
            id: "null?",
            func: builtin_null,
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "pair?",
            func: builtin_pair,
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "string-append",
            func: builtin_string_append,
            arity: Arity::Any,
        },
        BuiltinOp {
            id: "display",
            func: builtin_display,
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "newline",
            func: builtin_newline,
            arity: Arity::Exact(0),
        },
        BuiltinOp {
            id: "error",
            func: builtin_error,
            arity: Arity::Any,
        },
        BuiltinOp {
            id: "exit",
            func: builtin_exit,
            arity: Arity::Any,
        },
        BuiltinOp {
            id: "stream-car",
            func: builtin_car,
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "stream-cdr",
            func: builtin_stream_cdr,
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "stream-null?",
            func: builtin_null,
            arity: Arity::Exact(1),
        },
    ]
});

/// Get all builtin operations
pub(crate) fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Create a global environment with all builtin procedures and `the-empty-stream`
pub fn create_global_env() -> Environment {
    let env = Environment::new();
    for op in get_builtin_ops() {
        bind_global(&env, op.id, op.to_value());
    }
    bind_global(&env, "the-empty-stream", Value::List(vec![]));
    env
}

fn bind_global(env: &Environment, name: &str, value: Value) {
    // `define` only fails on the empty sentinel, and `env` has a frame
    if let Err(err) = env.define(name, value) {
        warn!("could not bind {name}: {err}");
    }
}
