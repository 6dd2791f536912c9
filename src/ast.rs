//! This module defines the core value type shared by code and data. The main enum,
//! [`Value`], covers literals, symbols, lists, primitive and user-defined procedures,
//! special-form handler values, and the two binding wrappers produced by the
//! argument-passing protocol ([`Value::Reference`] and [`Value::Delayed`]).
//! Ergonomic helpers such as [`val`], [`sym`], and [`nil`] build ASTs in code and
//! tests. Equality and display follow Scheme conventions.

use crate::builtinops::OperationFn;
use crate::evaluator::Environment;
use crate::evaluator::special_forms::SpecialForm;
use std::rc::Rc;
use std::sync::Arc;

/// Type alias for number values in interpreter
pub(crate) type NumberType = i64;

/// Allowed non-alphanumeric characters in symbol names
pub(crate) const SYMBOL_SPECIAL_CHARS: &str = "+-*/<>=!?_$.%&:^~";

/// Check if a string is a valid symbol name
/// Valid: non-empty, no leading digit, no "-digit" prefix, alphanumeric + SYMBOL_SPECIAL_CHARS
pub(crate) fn is_valid_symbol(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        None => false,
        Some(first_char) => {
            if first_char.is_ascii_digit() {
                return false;
            }

            if first_char == '-'
                && let Some(second_char) = chars.next()
                && second_char.is_ascii_digit()
            {
                return false;
            }

            name.chars()
                .all(|c| c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c))
        }
    }
}

/// How a formal parameter receives its argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassingMode {
    /// Evaluate the operand in the caller's environment before the call
    Value,
    /// Re-evaluate the operand in the caller's environment on every access
    Delayed,
    /// Evaluate the operand before the call against the dynamic-scope stack
    Dynamic,
    /// Alias the caller's variable named by the operand
    Reference,
}

impl PassingMode {
    /// Parameter tag keyword, or `None` for plain parameters
    pub fn tag(self) -> Option<&'static str> {
        match self {
            PassingMode::Value => None,
            PassingMode::Delayed => Some("delayed"),
            PassingMode::Dynamic => Some("dynamic"),
            PassingMode::Reference => Some("reference"),
        }
    }

    pub(crate) fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "delayed" => Some(PassingMode::Delayed),
            "dynamic" => Some(PassingMode::Dynamic),
            "reference" => Some(PassingMode::Reference),
            _ => None,
        }
    }
}

/// A formal parameter of a user-defined procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub mode: PassingMode,
}

impl Param {
    pub fn plain(name: impl Into<String>) -> Self {
        Param {
            name: name.into(),
            mode: PassingMode::Value,
        }
    }

    pub fn tagged(mode: PassingMode, name: impl Into<String>) -> Self {
        Param {
            name: name.into(),
            mode,
        }
    }
}

impl std::fmt::Display for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.mode.tag() {
            Some(tag) => write!(f, "({tag} {})", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Core AST type in interpreter
///
/// Lists are plain vectors; whether a list is a special form or an application
/// is decided by the evaluator when it looks at the head, never by the reader.
///
/// To build an AST, use the ergonomic helper functions:
/// - `val(42)` for values, `sym("name")` for symbols, `nil()` for empty lists
/// - `val([1, 2, 3])` for homogeneous lists
/// - `val(vec![sym("op"), val(42)])` for mixed lists
#[derive(Clone)]
pub enum Value {
    /// Numbers (integers only)
    Number(NumberType),
    /// Symbols (identifiers)
    Symbol(String),
    /// String literals
    String(String),
    /// Boolean values
    Bool(bool),
    /// Lists (empty list represents nil)
    List(Vec<Value>),
    /// Primitive procedures provided by the host
    /// Uses id string for equality comparison instead of function pointer
    BuiltinFunction {
        id: String,
        func: Arc<OperationFn>,
    },
    /// User-defined procedures (params, body sequence, closure env)
    Function {
        params: Vec<Param>,
        body: Rc<[Value]>,
        env: Environment,
    },
    /// A special-form handler used as a value
    SpecialForm(SpecialForm),
    /// Alias of the variable `name` as seen from `env`
    Reference { name: String, env: Environment },
    /// Suspended computation, re-run on every access
    Delayed { expr: Rc<Value>, env: Environment },
    /// End-of-input sentinel produced by the driver
    Eof,
    /// Unspecified values (e.g., return value of set!)
    /// These values never equal themselves or any other value
    Unspecified,
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::String(s) => write!(f, "String(\"{s}\")"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::List(list) => {
                write!(f, "List(")?;
                for (i, v) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::BuiltinFunction { id, .. } => write!(f, "BuiltinFunction({id})"),
            Value::Function { params, body, .. } => {
                write!(f, "Function(params={params:?}, body={body:?})")
            }
            Value::SpecialForm(form) => write!(f, "SpecialForm({})", form.name()),
            Value::Reference { name, .. } => write!(f, "Reference({name})"),
            Value::Delayed { expr, .. } => write!(f, "Delayed({expr:?})"),
            Value::Eof => write!(f, "Eof"),
            Value::Unspecified => write!(f, "Unspecified"),
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(n as NumberType)
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(|x| x.into()).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(arr.into_iter().map(|x| x.into()).collect())
    }
}

///   Helper function for creating symbols - works great in mixed lists!
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating Values - works great in mixed lists!
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for creating empty lists (nil)
pub fn nil() -> Value {
    Value::List(vec![])
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::String(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            Value::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::List(elements) => {
                write!(f, "(")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, ")")
            }
            Value::BuiltinFunction { id, .. } => write!(f, "#<builtin-function:{id}>"),
            Value::Function { params, .. } => {
                write!(f, "#<procedure (")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, ")>")
            }
            Value::SpecialForm(form) => write!(f, "#<special-form:{}>", form.name()),
            Value::Reference { name, .. } => write!(f, "#<reference:{name}>"),
            Value::Delayed { .. } => write!(f, "#<delayed>"),
            Value::Eof => write!(f, "#<eof>"),
            Value::Unspecified => write!(f, "#<unspecified>"),
        }
    }
}

impl Value {
    /// Check if a value represents nil (empty list)
    pub(crate) fn is_nil(&self) -> bool {
        matches!(self, Value::List(list) if list.is_empty())
    }

    /// Scheme truthiness: everything except `#f` counts as true
    pub fn is_true(&self) -> bool {
        !matches!(self, Value::Bool(false))
    }

    pub(crate) fn as_symbol(&self) -> Option<&str> {
        match self {
            Value::Symbol(name) => Some(name),
            _ => None,
        }
    }

    /// Literals that may not appear at the head of an application
    pub(crate) fn is_literal(&self) -> bool {
        matches!(
            self,
            Value::Number(_) | Value::String(_) | Value::Bool(_) | Value::Unspecified
        )
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::BuiltinFunction { id: id1, .. }, Value::BuiltinFunction { id: id2, .. }) => {
                // Compare BuiltinFunctions by id string, not function pointer
                id1 == id2
            }
            (
                Value::Function {
                    params: p1,
                    body: b1,
                    env: e1,
                },
                Value::Function {
                    params: p2,
                    body: b2,
                    env: e2,
                },
            ) => p1 == p2 && b1 == b2 && e1 == e2,
            (Value::SpecialForm(a), Value::SpecialForm(b)) => a == b,
            (
                Value::Reference { name: n1, env: e1 },
                Value::Reference { name: n2, env: e2 },
            ) => n1 == n2 && e1 == e2,
            (Value::Delayed { expr: x1, env: e1 }, Value::Delayed { expr: x2, env: e2 }) => {
                Rc::ptr_eq(x1, x2) && e1 == e2
            }
            (Value::Eof, Value::Eof) => true,
            (Value::Unspecified, _) | (_, Value::Unspecified) => false, // Unspecified never equals anything
            _ => false, // Different variants are never equal
        }
    }
}
