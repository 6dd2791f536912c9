//! The evaluator: dispatch on expression shape, procedure application, and the
//! per-interpreter state they share (global environment, special-form table,
//! dynamic-scope stack).

mod arguments;
pub mod environment;
pub mod special_forms;

pub use environment::{DynamicScope, Environment};
pub use special_forms::{SpecialForm, SpecialFormFn, SpecialFormTable};

use crate::ast::Value;
use crate::builtinops::{Arity, BuiltinFn, builtin_value, create_global_env};
use crate::{Error, MAX_EVAL_DEPTH};
use log::{debug, trace};

/// Evaluation limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalConfig {
    /// Maximum nesting of procedure applications before evaluation is aborted
    pub max_depth: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            max_depth: MAX_EVAL_DEPTH,
        }
    }
}

/// A complete interpreter instance.
///
/// Owns the global environment, the special-form table and the dynamic-scope
/// stack. Installing forms or builtins needs `&mut self`; evaluation only needs
/// `&self`, so the table cannot change while an evaluation is running.
#[derive(Debug)]
pub struct Interpreter {
    global: Environment,
    forms: SpecialFormTable,
    dynamic: DynamicScope,
    config: EvalConfig,
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Interpreter::with_config(EvalConfig::default())
    }

    pub fn with_config(config: EvalConfig) -> Self {
        let global = create_global_env();
        Interpreter {
            dynamic: DynamicScope::new(global.clone()),
            global,
            forms: SpecialFormTable::with_core_forms(),
            config,
        }
    }

    pub fn config(&self) -> EvalConfig {
        self.config
    }

    pub fn global_env(&self) -> &Environment {
        &self.global
    }

    pub fn special_forms(&self) -> &SpecialFormTable {
        &self.forms
    }

    pub fn dynamic_scope(&self) -> &DynamicScope {
        &self.dynamic
    }

    /// Add a special form. Fails with `SpecialFormConflict` if the name is already
    /// a special form or a global variable.
    pub fn install_special_form(&mut self, name: &str, handler: SpecialFormFn) -> Result<(), Error> {
        self.forms.install(name, handler, &self.global)
    }

    /// Register a custom builtin function in the global environment
    ///
    /// # Example
    /// ```
    /// use paramlisp::Error;
    /// use paramlisp::ast::{Value, sym};
    /// use paramlisp::builtinops::Arity;
    /// use paramlisp::evaluator::Interpreter;
    ///
    /// fn my_custom_function(_args: &[Value]) -> Result<Value, Error> {
    ///     Ok(Value::String("Hello from custom function!".to_owned()))
    /// }
    ///
    /// let mut interp = Interpreter::new();
    /// interp.register_builtin_function("my-func", Arity::Exact(0), my_custom_function)?;
    ///
    /// let result = interp.eval(&Value::List(vec![sym("my-func")]))?;
    /// assert_eq!(result, Value::String("Hello from custom function!".to_owned()));
    /// # Ok::<(), Error>(())
    /// ```
    pub fn register_builtin_function(
        &mut self,
        name: &str,
        arity: Arity,
        func: BuiltinFn,
    ) -> Result<(), Error> {
        if self.forms.contains(name) {
            return Err(Error::SpecialFormConflict(name.to_owned()));
        }
        self.global.define(name, builtin_value(name, arity, func))?;
        Ok(())
    }

    /// Evaluate `expr` in the global environment
    pub fn eval(&self, expr: &Value) -> Result<Value, Error> {
        self.eval_with_depth(expr, &self.global, 0)
    }

    pub fn eval_in(&self, expr: &Value, env: &Environment) -> Result<Value, Error> {
        self.eval_with_depth(expr, env, 0)
    }

    /// Evaluate an expression with depth tracking to prevent stack overflow.
    ///
    /// `depth` is the number of procedure applications in progress; it only
    /// grows when a user procedure body is entered.
    pub fn eval_with_depth(
        &self,
        expr: &Value,
        env: &Environment,
        depth: usize,
    ) -> Result<Value, Error> {
        match expr {
            // Self-evaluating forms (empty lists are NOT self-evaluating)
            Value::Number(_)
            | Value::String(_)
            | Value::Bool(_)
            | Value::BuiltinFunction { .. }
            | Value::Function { .. }
            | Value::SpecialForm(_)
            | Value::Unspecified => Ok(expr.clone()),

            Value::Eof => Err(Error::Exit),

            Value::Delayed { expr, env } => self.force(expr, env, depth),

            Value::Symbol(name) => self.eval_variable(name, env, depth),

            Value::List(elements) => self
                .eval_list(expr, elements, env, depth)
                .map_err(|err| add_context(err, expr)),

            Value::Reference { .. } => Err(Error::UnknownExpressionType(expr.to_string())),
        }
    }

    /// Evaluate each expression in order, returning the last value
    /// (`Unspecified` for an empty body)
    pub fn eval_sequence(
        &self,
        body: &[Value],
        env: &Environment,
        depth: usize,
    ) -> Result<Value, Error> {
        let mut result = Value::Unspecified;
        for expr in body {
            result = self.eval_with_depth(expr, env, depth)?;
        }
        Ok(result)
    }

    /// Apply a procedure to already-passed arguments
    pub fn apply(&self, func: &Value, args: Vec<Value>) -> Result<Value, Error> {
        self.apply_with_depth(func, args, 0)
    }

    pub(crate) fn apply_with_depth(
        &self,
        func: &Value,
        args: Vec<Value>,
        depth: usize,
    ) -> Result<Value, Error> {
        match func {
            Value::BuiltinFunction { id, func } => {
                trace!("applying builtin {id} to {} argument(s)", args.len());
                // Primitives may hand back a suspended tail (stream-cdr); run it now
                match func(args)? {
                    Value::Delayed { expr, env } => self.force(&expr, &env, depth),
                    result => Ok(result),
                }
            }
            Value::Function { params, body, env } => {
                let depth = self.enter_depth(depth)?;
                let names = params.iter().map(|param| param.name.clone()).collect();
                let call_env = env.extend(names, args)?;
                let _frame = self.dynamic.enter(&call_env);
                debug!(
                    "applying {func}, dynamic depth {}",
                    self.dynamic.depth()
                );
                self.eval_sequence(body, &call_env, depth)
            }
            other => Err(Error::UnknownProcedureType(other.to_string())),
        }
    }

    /// One level deeper: entering a procedure body or forcing a delayed expression
    fn enter_depth(&self, depth: usize) -> Result<usize, Error> {
        if depth >= self.config.max_depth {
            return Err(Error::EvalError(format!(
                "Evaluation depth limit exceeded (max: {})",
                self.config.max_depth
            )));
        }
        Ok(depth + 1)
    }

    /// Reject a name that is taken by a special form
    pub(crate) fn check_bindable(&self, name: &str) -> Result<(), Error> {
        if self.forms.contains(name) {
            return Err(Error::SpecialFormRedefinition(name.to_owned()));
        }
        Ok(())
    }

    /// Helper function to evaluate a list of argument expressions with depth tracking
    pub(crate) fn eval_args(
        &self,
        args: &[Value],
        env: &Environment,
        depth: usize,
    ) -> Result<Vec<Value>, Error> {
        args.iter()
            .map(|arg| self.eval_with_depth(arg, env, depth))
            .collect()
    }

    fn force(&self, expr: &Value, env: &Environment, depth: usize) -> Result<Value, Error> {
        trace!("forcing {expr}");
        self.eval_with_depth(expr, env, self.enter_depth(depth)?)
    }

    /// Variable reference: special-form names evaluate to their handler, references
    /// are followed to the aliased slot, delayed values are forced.
    fn eval_variable(&self, name: &str, env: &Environment, depth: usize) -> Result<Value, Error> {
        if let Some(form) = self.forms.lookup(name) {
            return Ok(Value::SpecialForm(form.clone()));
        }

        let mut value = env.lookup(name)?;
        while let Value::Reference {
            name: target,
            env: target_env,
        } = &value
        {
            value = target_env.lookup(target)?;
        }

        match value {
            Value::Delayed { expr, env } => self.force(&expr, &env, depth),
            value => Ok(value),
        }
    }

    /// The special form a list headed by `head` invokes, if any: either a name in
    /// the table, or a variable currently bound to a handler value.
    fn special_form_for(&self, head: &str, env: &Environment) -> Option<SpecialForm> {
        if let Some(form) = self.forms.lookup(head) {
            return Some(form.clone());
        }
        match env.get(head) {
            Some(Value::SpecialForm(form)) => Some(form),
            _ => None,
        }
    }

    fn eval_list(
        &self,
        expr: &Value,
        elements: &[Value],
        env: &Environment,
        depth: usize,
    ) -> Result<Value, Error> {
        match elements {
            [Value::Symbol(head), operands @ ..] => {
                if let Some(form) = self.special_form_for(head, env) {
                    trace!("special form {}", form.name());
                    return form.invoke(self, operands, env, depth);
                }
                self.eval_application(&elements[0], operands, env, depth)
            }
            [operator, operands @ ..] if !operator.is_literal() => {
                self.eval_application(operator, operands, env, depth)
            }
            _ => Err(Error::UnknownExpressionType(expr.to_string())),
        }
    }

    fn eval_application(
        &self,
        operator: &Value,
        operands: &[Value],
        env: &Environment,
        depth: usize,
    ) -> Result<Value, Error> {
        let func = self.eval_with_depth(operator, env, depth)?;
        let args = match &func {
            Value::Function { params, .. } => {
                self.bind_arguments(operator, params, operands, env, depth)?
            }
            _ => self.eval_args(operands, env, depth)?,
        };
        self.apply_with_depth(&func, args, depth)
    }
}

/// Helper function to add expression context to errors
fn add_context(error: Error, expr: &Value) -> Error {
    const MARKER: &str = "\n  Context: ";
    match error {
        // Only the innermost failing expression is reported
        Error::EvalError(msg) if !msg.contains(MARKER) => {
            Error::EvalError(format!("{msg}{MARKER}while evaluating: {expr}"))
        }
        Error::TypeError(msg) if !msg.contains(MARKER) => {
            Error::TypeError(format!("{msg}{MARKER}while evaluating: {expr}"))
        }
        other => other,
    }
}
