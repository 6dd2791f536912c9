//! The special-form table and the core forms it is seeded with.
//!
//! A special form receives its operands unevaluated together with the
//! environment of the form, and decides itself what to evaluate. Forms are
//! looked up by the head symbol of a list at evaluation time, so the same list
//! can be an application in one environment and a special form in another
//! (when a variable there is bound to a handler value).

use super::{Environment, Interpreter};
use crate::Error;
use crate::ast::{Param, PassingMode, Value, sym};
use log::debug;
use std::collections::HashMap;
use std::rc::Rc;

/// Handler signature: interpreter, unevaluated operands, environment of the form, depth
pub type SpecialFormFn = fn(&Interpreter, &[Value], &Environment, usize) -> Result<Value, Error>;

/// A named special-form handler. Also usable as a first-class value.
#[derive(Clone)]
pub struct SpecialForm {
    name: Rc<str>,
    handler: SpecialFormFn,
}

impl SpecialForm {
    pub fn new(name: &str, handler: SpecialFormFn) -> Self {
        SpecialForm {
            name: Rc::from(name),
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invoke(
        &self,
        interp: &Interpreter,
        operands: &[Value],
        env: &Environment,
        depth: usize,
    ) -> Result<Value, Error> {
        (self.handler)(interp, operands, env, depth)
    }
}

impl PartialEq for SpecialForm {
    fn eq(&self, other: &Self) -> bool {
        // Compare forms by name, not function pointer
        self.name == other.name
    }
}

impl std::fmt::Debug for SpecialForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SpecialForm({})", self.name)
    }
}

/// Forms every interpreter starts with
const CORE_FORMS: &[(&str, SpecialFormFn)] = &[
    ("quote", eval_quote),
    ("set!", eval_assignment),
    ("define", eval_define),
    ("if", eval_if),
    ("lambda", eval_lambda),
    ("begin", eval_begin),
    ("cond", eval_cond),
    ("defined?", eval_defined),
    ("locally-defined?", eval_locally_defined),
    ("make-unbound!", eval_unbind),
    ("make-unbound-locally!", eval_unbind_locally),
    ("cons-stream", eval_cons_stream),
    ("and", eval_and),
    ("or", eval_or),
    ("let", eval_let),
];

/// Name -> handler registry
#[derive(Debug, Clone, Default)]
pub struct SpecialFormTable {
    forms: HashMap<String, SpecialForm>,
}

impl SpecialFormTable {
    /// A table with no forms at all
    pub fn empty() -> Self {
        SpecialFormTable::default()
    }

    pub fn with_core_forms() -> Self {
        let forms = CORE_FORMS
            .iter()
            .map(|&(name, handler)| (name.to_owned(), SpecialForm::new(name, handler)))
            .collect();
        SpecialFormTable { forms }
    }

    /// Register `handler` under `name`.
    ///
    /// Fails if `name` already names a special form or is bound in `globals`.
    pub fn install(
        &mut self,
        name: &str,
        handler: SpecialFormFn,
        globals: &Environment,
    ) -> Result<(), Error> {
        if self.forms.contains_key(name) || globals.is_defined(name) {
            return Err(Error::SpecialFormConflict(name.to_owned()));
        }
        debug!("installing special form {name}");
        self.forms
            .insert(name.to_owned(), SpecialForm::new(name, handler));
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&SpecialForm> {
        self.forms.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.forms.contains_key(name)
    }

    /// Installed names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.forms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Evaluate quote special form
pub(crate) fn eval_quote(
    _interp: &Interpreter,
    args: &[Value],
    _env: &Environment,
    _depth: usize,
) -> Result<Value, Error> {
    match args {
        [expr] => Ok(expr.clone()),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

/// Evaluate set! special form
pub(crate) fn eval_assignment(
    interp: &Interpreter,
    args: &[Value],
    env: &Environment,
    depth: usize,
) -> Result<Value, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            interp.check_bindable(name)?;
            let value = interp.eval_with_depth(expr, env, depth)?;
            env.assign(name, value)?;
            Ok(Value::Unspecified)
        }
        [_, _] => Err(Error::TypeError("set! requires a symbol".to_owned())),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

/// Evaluate define special form: `(define x expr)` or `(define (f params...) body...)`
pub(crate) fn eval_define(
    interp: &Interpreter,
    args: &[Value],
    env: &Environment,
    depth: usize,
) -> Result<Value, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            interp.check_bindable(name)?;
            let value = interp.eval_with_depth(expr, env, depth)?;
            env.define(name.clone(), value).map(Value::Symbol)
        }
        [Value::List(signature), body @ ..] if !body.is_empty() => match signature.as_slice() {
            [Value::Symbol(name), params @ ..] => {
                interp.check_bindable(name)?;
                let function = make_function(interp, params, body, env)?;
                env.define(name.clone(), function).map(Value::Symbol)
            }
            _ => Err(Error::TypeError(
                "define requires a procedure name".to_owned(),
            )),
        },
        [_, _] => Err(Error::TypeError("define requires a symbol".to_owned())),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

/// Evaluate if special form; a missing alternative yields #f
pub(crate) fn eval_if(
    interp: &Interpreter,
    args: &[Value],
    env: &Environment,
    depth: usize,
) -> Result<Value, Error> {
    let (condition_expr, then_expr, else_expr) = match args {
        [condition, then] => (condition, then, None),
        [condition, then, otherwise] => (condition, then, Some(otherwise)),
        _ => return Err(Error::arity_error(3, args.len())),
    };

    if interp
        .eval_with_depth(condition_expr, env, depth)?
        .is_true()
    {
        interp.eval_with_depth(then_expr, env, depth)
    } else {
        match else_expr {
            Some(expr) => interp.eval_with_depth(expr, env, depth),
            None => Ok(Value::Bool(false)),
        }
    }
}

/// Evaluate lambda special form
pub(crate) fn eval_lambda(
    interp: &Interpreter,
    args: &[Value],
    env: &Environment,
    _depth: usize,
) -> Result<Value, Error> {
    match args {
        [Value::List(param_list), body @ ..] if !body.is_empty() => {
            make_function(interp, param_list, body, env)
        }
        [Value::List(_)] => Err(Error::EvalError("lambda requires a body".to_owned())),
        [_, ..] => Err(Error::TypeError(
            "Lambda parameters must be a list".to_owned(),
        )),
        [] => Err(Error::arity_error(2, 0)),
    }
}

fn make_function(
    interp: &Interpreter,
    param_list: &[Value],
    body: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    Ok(Value::Function {
        params: parse_params(interp, param_list)?,
        body: Rc::from(body),
        env: env.clone(),
    })
}

/// Parse a parameter list: bare symbols are plain, `(tag name)` selects a passing mode
fn parse_params(interp: &Interpreter, param_list: &[Value]) -> Result<Vec<Param>, Error> {
    let mut params: Vec<Param> = Vec::with_capacity(param_list.len());
    for spec in param_list {
        let param = match spec {
            Value::Symbol(name) => Param::plain(name.clone()),
            Value::List(parts) => match parts.as_slice() {
                [Value::Symbol(tag), Value::Symbol(name)] => {
                    let mode = PassingMode::from_tag(tag).ok_or_else(|| {
                        Error::TypeError(format!("Unknown parameter tag: {tag}"))
                    })?;
                    Param::tagged(mode, name.clone())
                }
                _ => {
                    return Err(Error::TypeError(format!(
                        "Malformed parameter specification: {spec}"
                    )));
                }
            },
            _ => {
                return Err(Error::TypeError(
                    "Lambda parameters must be symbols or (tag symbol) pairs".to_owned(),
                ));
            }
        };
        interp.check_bindable(&param.name)?;
        if params.iter().any(|p| p.name == param.name) {
            return Err(Error::EvalError(format!(
                "Duplicate parameter name: {}",
                param.name
            )));
        }
        params.push(param);
    }
    Ok(params)
}

/// Evaluate begin special form
pub(crate) fn eval_begin(
    interp: &Interpreter,
    args: &[Value],
    env: &Environment,
    depth: usize,
) -> Result<Value, Error> {
    interp.eval_sequence(args, env, depth)
}

/// Evaluate cond by rewriting it into nested if/begin forms
pub(crate) fn eval_cond(
    interp: &Interpreter,
    args: &[Value],
    env: &Environment,
    depth: usize,
) -> Result<Value, Error> {
    let expanded = cond_to_if(args)?;
    interp.eval_with_depth(&expanded, env, depth)
}

pub(crate) fn cond_to_if(clauses: &[Value]) -> Result<Value, Error> {
    let Some((first, rest)) = clauses.split_first() else {
        return Ok(Value::Bool(false));
    };
    let Value::List(clause) = first else {
        return Err(Error::TypeError(format!("cond clause must be a list: {first}")));
    };
    let Some((test, body)) = clause.split_first() else {
        return Err(Error::EvalError("empty cond clause".to_owned()));
    };
    if body.is_empty() {
        return Err(Error::EvalError(format!("cond clause has no body: {first}")));
    }

    if test.as_symbol() == Some("else") {
        if !rest.is_empty() {
            return Err(Error::EvalError(
                "else clause must be the last cond clause".to_owned(),
            ));
        }
        return Ok(sequence_to_expr(body));
    }

    Ok(Value::List(vec![
        sym("if"),
        test.clone(),
        sequence_to_expr(body),
        cond_to_if(rest)?,
    ]))
}

fn sequence_to_expr(body: &[Value]) -> Value {
    match body {
        [single] => single.clone(),
        _ => {
            let mut seq = Vec::with_capacity(body.len() + 1);
            seq.push(sym("begin"));
            seq.extend_from_slice(body);
            Value::List(seq)
        }
    }
}

macro_rules! binding_query {
    ($name:ident, $form:literal, $query:ident) => {
        pub(crate) fn $name(
            _interp: &Interpreter,
            args: &[Value],
            env: &Environment,
            _depth: usize,
        ) -> Result<Value, Error> {
            match args {
                [Value::Symbol(name)] => Ok(Value::Bool(env.$query(name))),
                [_] => Err(Error::TypeError(
                    concat!($form, " requires a symbol").to_owned(),
                )),
                _ => Err(Error::arity_error(1, args.len())),
            }
        }
    };
}

binding_query!(eval_defined, "defined?", is_defined);
binding_query!(eval_locally_defined, "locally-defined?", is_locally_defined);

macro_rules! unbinding_op {
    ($name:ident, $form:literal, $remove:ident) => {
        pub(crate) fn $name(
            _interp: &Interpreter,
            args: &[Value],
            env: &Environment,
            _depth: usize,
        ) -> Result<Value, Error> {
            match args {
                [Value::Symbol(name)] => {
                    env.$remove(name);
                    Ok(Value::Unspecified)
                }
                [_] => Err(Error::TypeError(
                    concat!($form, " requires a symbol").to_owned(),
                )),
                _ => Err(Error::arity_error(1, args.len())),
            }
        }
    };
}

unbinding_op!(eval_unbind, "make-unbound!", unbind);
unbinding_op!(eval_unbind_locally, "make-unbound-locally!", unbind_locally);

/// Evaluate cons-stream: the head now, the tail as a delayed expression
pub(crate) fn eval_cons_stream(
    interp: &Interpreter,
    args: &[Value],
    env: &Environment,
    depth: usize,
) -> Result<Value, Error> {
    match args {
        [head, tail] => {
            let head = interp.eval_with_depth(head, env, depth)?;
            Ok(Value::List(vec![
                head,
                Value::Delayed {
                    expr: Rc::new(tail.clone()),
                    env: env.clone(),
                },
            ]))
        }
        _ => Err(Error::arity_error(2, args.len())),
    }
}

macro_rules! boolean_logic_op {
    ($name:ident, $stop_when:literal, $default:literal) => {
        pub(crate) fn $name(
            interp: &Interpreter,
            args: &[Value],
            env: &Environment,
            depth: usize,
        ) -> Result<Value, Error> {
            let mut result = Value::Bool($default);
            for arg in args {
                result = interp.eval_with_depth(arg, env, depth)?;
                if result.is_true() == $stop_when {
                    break;
                }
            }
            Ok(result)
        }
    };
}

// Generate boolean logic functions
boolean_logic_op!(eval_and, false, true);
boolean_logic_op!(eval_or, true, false);

/// Evaluate let as an immediate application of a plain lambda
pub(crate) fn eval_let(
    interp: &Interpreter,
    args: &[Value],
    env: &Environment,
    depth: usize,
) -> Result<Value, Error> {
    let [Value::List(bindings), body @ ..] = args else {
        return Err(Error::TypeError(
            "let requires a binding list".to_owned(),
        ));
    };
    if body.is_empty() {
        return Err(Error::EvalError("let requires a body".to_owned()));
    }

    let mut names = Vec::with_capacity(bindings.len());
    let mut inits = Vec::with_capacity(bindings.len());
    for binding in bindings {
        match binding {
            Value::List(pair) if matches!(pair.as_slice(), [Value::Symbol(_), _]) => {
                names.push(pair[0].clone());
                inits.push(pair[1].clone());
            }
            _ => {
                return Err(Error::TypeError(format!(
                    "let binding must be (name expr): {binding}"
                )));
            }
        }
    }

    let function = make_function(interp, &names, body, env)?;
    let values = interp.eval_args(&inits, env, depth)?;
    interp.apply_with_depth(&function, values, depth)
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::val;

    fn always_seven(
        _interp: &Interpreter,
        _args: &[Value],
        _env: &Environment,
        _depth: usize,
    ) -> Result<Value, Error> {
        Ok(val(7))
    }

    #[test]
    fn test_install_and_lookup() {
        let globals = Environment::new();
        let mut table = SpecialFormTable::empty();
        table.install("seven", always_seven, &globals).unwrap();

        let form = table.lookup("seven").unwrap();
        assert_eq!(form.name(), "seven");
        assert!(table.contains("seven"));
        assert!(table.lookup("eight").is_none());
    }

    #[test]
    fn test_install_twice_conflicts() {
        let globals = Environment::new();
        let mut table = SpecialFormTable::with_core_forms();
        assert_eq!(
            table.install("if", always_seven, &globals),
            Err(Error::SpecialFormConflict("if".to_owned()))
        );

        table.install("seven", always_seven, &globals).unwrap();
        assert_eq!(
            table.install("seven", always_seven, &globals),
            Err(Error::SpecialFormConflict("seven".to_owned()))
        );
    }

    #[test]
    fn test_install_over_global_variable_conflicts() {
        let globals = Environment::new();
        globals.define("taken", val(1)).unwrap();
        let mut table = SpecialFormTable::empty();
        assert_eq!(
            table.install("taken", always_seven, &globals),
            Err(Error::SpecialFormConflict("taken".to_owned()))
        );
        assert!(!table.contains("taken"));
    }

    #[test]
    fn test_core_forms_seeded() {
        let table = SpecialFormTable::with_core_forms();
        for name in [
            "quote",
            "set!",
            "define",
            "if",
            "lambda",
            "begin",
            "cond",
            "defined?",
            "locally-defined?",
            "make-unbound!",
            "make-unbound-locally!",
            "cons-stream",
        ] {
            assert!(table.contains(name), "missing core form {name}");
        }
        let names = table.names();
        assert!(names.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_cond_desugaring() {
        let clauses = vec![
            val(vec![sym("a"), val(1)]),
            val(vec![sym("b"), val(2), val(3)]),
            val(vec![sym("else"), val(4)]),
        ];
        let expected = val(vec![
            sym("if"),
            sym("a"),
            val(1),
            val(vec![
                sym("if"),
                sym("b"),
                val(vec![sym("begin"), val(2), val(3)]),
                val(4),
            ]),
        ]);
        assert_eq!(cond_to_if(&clauses).unwrap(), expected);

        // Without else the chain ends in #f
        let clauses = vec![val(vec![sym("a"), val(1)])];
        assert_eq!(
            cond_to_if(&clauses).unwrap(),
            val(vec![sym("if"), sym("a"), val(1), val(false)])
        );
    }

    #[test]
    fn test_cond_else_must_be_last() {
        let clauses = vec![
            val(vec![sym("else"), val(1)]),
            val(vec![sym("a"), val(2)]),
        ];
        let err = cond_to_if(&clauses).unwrap_err();
        assert!(format!("{err}").contains("else clause must be the last"));
    }
}
