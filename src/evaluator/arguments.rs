//! Turning operand expressions into arguments, one parameter at a time.

use super::{Environment, Interpreter};
use crate::Error;
use crate::ast::{Param, PassingMode, Value};
use std::rc::Rc;

impl Interpreter {
    /// Pass each operand according to its parameter's mode.
    ///
    /// The count is checked first, so a mismatched call evaluates no operands.
    pub(crate) fn bind_arguments(
        &self,
        operator: &Value,
        params: &[Param],
        operands: &[Value],
        env: &Environment,
        depth: usize,
    ) -> Result<Vec<Value>, Error> {
        if params.len() != operands.len() {
            return Err(Error::arity_error_with_expr(
                params.len(),
                operands.len(),
                operator.to_string(),
            ));
        }
        params
            .iter()
            .zip(operands)
            .map(|(param, operand)| self.pass_argument(param, operand, env, depth))
            .collect()
    }

    fn pass_argument(
        &self,
        param: &Param,
        operand: &Value,
        env: &Environment,
        depth: usize,
    ) -> Result<Value, Error> {
        match param.mode {
            PassingMode::Value => self.eval_with_depth(operand, env, depth),
            PassingMode::Delayed => Ok(Value::Delayed {
                expr: Rc::new(operand.clone()),
                env: env.clone(),
            }),
            PassingMode::Dynamic => {
                let dynamic_env = self.dynamic_scope().current();
                self.eval_with_depth(operand, &dynamic_env, depth)
            }
            PassingMode::Reference => match operand {
                Value::Symbol(name) if env.is_defined(name) => Ok(Value::Reference {
                    name: name.clone(),
                    env: env.clone(),
                }),
                _ => Err(Error::ReferenceArgument(operand.to_string())),
            },
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{sym, val};

    fn params() -> Vec<Param> {
        vec![
            Param::plain("a"),
            Param::tagged(PassingMode::Delayed, "b"),
            Param::tagged(PassingMode::Reference, "c"),
        ]
    }

    #[test]
    fn test_each_mode_produces_its_wrapper() {
        let interp = Interpreter::new();
        let env = interp.global_env().clone();
        env.define("x", val(3)).unwrap();

        let operands = [
            val(vec![sym("+"), sym("x"), val(1)]),
            val(vec![sym("car"), val(Vec::<Value>::new())]),
            sym("x"),
        ];
        let args = interp.bind_arguments(&sym("f"), &params(), &operands, &env, 0).unwrap();

        assert_eq!(args[0], val(4));
        // Not evaluated yet, so the bad car call has not failed
        assert!(matches!(&args[1], Value::Delayed { expr, .. } if **expr == operands[1]));
        assert_eq!(
            args[2],
            Value::Reference {
                name: "x".to_owned(),
                env: env.clone(),
            }
        );
    }

    #[test]
    fn test_reference_operand_must_name_a_caller_variable() {
        let interp = Interpreter::new();
        let env = interp.global_env();
        let reference = [Param::tagged(PassingMode::Reference, "r")];

        for operand in [val(1), sym("missing"), val(vec![sym("list")])] {
            assert_eq!(
                interp.bind_arguments(&sym("f"), &reference, &[operand.clone()], env, 0),
                Err(Error::ReferenceArgument(operand.to_string()))
            );
        }
    }

    #[test]
    fn test_dynamic_operand_uses_dynamic_stack() {
        let interp = Interpreter::new();
        let global = interp.global_env();
        let caller = global.extend(vec!["v".into()], vec![val(9)]).unwrap();
        let dynamic = [Param::tagged(PassingMode::Dynamic, "d")];

        // Lexically visible, but not on the dynamic stack yet
        assert_eq!(
            interp.bind_arguments(&sym("f"), &dynamic, &[sym("v")], &Environment::new(), 0),
            Err(Error::UnboundVariable("v".to_owned()))
        );

        let _guard = interp.dynamic_scope().enter(&caller);
        assert_eq!(
            interp.bind_arguments(&sym("f"), &dynamic, &[sym("v")], global, 0).unwrap(),
            vec![val(9)]
        );
    }

    #[test]
    fn test_count_mismatch() {
        let interp = Interpreter::new();
        let env = interp.global_env();
        let err = interp
            .bind_arguments(&sym("f"), &params(), &[val(1)], env, 0)
            .unwrap_err();
        assert_eq!(err, Error::arity_error_with_expr(3, 1, "f".to_owned()));
        assert_eq!(
            err.to_string(),
            "ArityError: too few arguments in f: expected 3, got 1"
        );
    }
}
