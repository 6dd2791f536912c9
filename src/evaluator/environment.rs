use crate::Error;
use crate::ast::Value;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// One level of bindings. Insertion order is kept so listings match definition order.
#[derive(Debug, Default)]
pub struct Frame {
    bindings: IndexMap<String, Value>,
}

impl Frame {
    fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    fn insert(&mut self, name: String, value: Value) {
        self.bindings.insert(name, value);
    }

    fn remove(&mut self, name: &str) {
        self.bindings.shift_remove(name);
    }
}

pub(crate) type FrameRef = Rc<RefCell<Frame>>;

#[derive(Debug)]
struct Scope {
    frame: FrameRef,
    parent: Environment,
}

/// Environment for variable bindings
///
/// A chain of shared, mutable frames, newest first. Cloning an `Environment`
/// shares the frames: a closure and the call that created it see each other's
/// `define`/`set!`. The chain ends in the empty sentinel (`Environment::empty`),
/// and parent links are fixed once a scope exists.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    scope: Option<Rc<Scope>>,
}

impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        match (&self.scope, &other.scope) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Environment {
    /// The empty sentinel: no frames at all
    pub fn empty() -> Self {
        Environment { scope: None }
    }

    /// A single empty frame on top of the sentinel (a fresh global environment)
    pub fn new() -> Self {
        Environment::empty().with_frame(FrameRef::default())
    }

    /// Prepend an existing (possibly shared) frame to this chain
    pub(crate) fn with_frame(&self, frame: FrameRef) -> Self {
        Environment {
            scope: Some(Rc::new(Scope {
                frame,
                parent: self.clone(),
            })),
        }
    }

    /// New environment with one frame binding `names` to `values`, on top of `self`
    pub fn extend(&self, names: Vec<String>, values: Vec<Value>) -> Result<Self, Error> {
        if names.len() != values.len() {
            return Err(Error::arity_error(names.len(), values.len()));
        }
        let mut frame = Frame::default();
        for (name, value) in names.into_iter().zip(values) {
            frame.insert(name, value);
        }
        Ok(self.with_frame(Rc::new(RefCell::new(frame))))
    }

    /// The enclosing environment (the sentinel stays the sentinel)
    pub fn parent(&self) -> Self {
        match &self.scope {
            Some(scope) => scope.parent.clone(),
            None => Environment::empty(),
        }
    }

    pub(crate) fn frame(&self) -> Option<FrameRef> {
        self.scope.as_ref().map(|scope| scope.frame.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.scope.is_none()
    }

    /// Number of frames in the chain
    pub fn depth(&self) -> usize {
        self.scopes().count()
    }

    fn scopes(&self) -> impl Iterator<Item = &Scope> {
        std::iter::successors(self.scope.as_deref(), |scope| scope.parent.scope.as_deref())
    }

    /// Raw lookup: the stored value, without following references
    pub fn get(&self, name: &str) -> Option<Value> {
        self.scopes()
            .find_map(|scope| scope.frame.borrow().get(name).cloned())
    }

    pub fn lookup(&self, name: &str) -> Result<Value, Error> {
        self.get(name)
            .ok_or_else(|| Error::UnboundVariable(name.to_owned()))
    }

    /// Update the nearest binding of `name`.
    ///
    /// If that binding holds a reference, the assignment goes to the aliased
    /// slot instead (transitively).
    pub fn assign(&self, name: &str, value: Value) -> Result<(), Error> {
        for scope in self.scopes() {
            let mut frame = scope.frame.borrow_mut();
            let Some(current) = frame.get(name) else {
                continue;
            };
            if let Value::Reference {
                name: target,
                env: target_env,
            } = current
            {
                let (target, target_env) = (target.clone(), target_env.clone());
                drop(frame);
                return target_env.assign(&target, value);
            }
            frame.insert(name.to_owned(), value);
            return Ok(());
        }
        Err(Error::UnboundVariable(name.to_owned()))
    }

    /// Bind `name` in the nearest frame only, overwriting in place; returns the identifier
    pub fn define(&self, name: impl Into<String>, value: Value) -> Result<String, Error> {
        let name = name.into();
        let scope = self.scope.as_ref().ok_or_else(|| {
            Error::EvalError(format!("cannot define {name} in an empty environment"))
        })?;
        scope.frame.borrow_mut().insert(name.clone(), value);
        Ok(name)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.scopes().any(|scope| scope.frame.borrow().contains(name))
    }

    pub fn is_locally_defined(&self, name: &str) -> bool {
        self.scope
            .as_ref()
            .is_some_and(|scope| scope.frame.borrow().contains(name))
    }

    /// Remove `name` from every frame between here and the root
    pub fn unbind(&self, name: &str) {
        for scope in self.scopes() {
            scope.frame.borrow_mut().remove(name);
        }
    }

    /// Remove `name` from the nearest frame only
    pub fn unbind_locally(&self, name: &str) {
        if let Some(scope) = &self.scope {
            scope.frame.borrow_mut().remove(name);
        }
    }

    /// Get all bindings in this environment and its parents
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();

        // Outermost first so inner frames override
        let scopes: Vec<&Scope> = self.scopes().collect();
        for scope in scopes.into_iter().rev() {
            for (name, value) in &scope.frame.borrow().bindings {
                bindings.insert(name.clone(), value.clone());
            }
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    /// Names bound in the nearest frame, in definition order
    pub fn local_names(&self) -> Vec<String> {
        self.scope
            .as_ref()
            .map(|scope| scope.frame.borrow().bindings.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// The dynamic-scope stack.
///
/// Mirrors the live chain of procedure applications: every application pushes
/// its call frame (the very frame its body runs in) and pops it when the body
/// finishes. The base of the stack is the global environment.
#[derive(Debug)]
pub struct DynamicScope {
    stack: RefCell<Environment>,
}

impl DynamicScope {
    pub fn new(base: Environment) -> Self {
        DynamicScope {
            stack: RefCell::new(base),
        }
    }

    /// Snapshot of the stack as an ordinary environment chain
    pub fn current(&self) -> Environment {
        self.stack.borrow().clone()
    }

    pub fn depth(&self) -> usize {
        self.stack.borrow().depth()
    }

    /// Push the newest frame of `call_env`. The frame is popped when the guard drops,
    /// whether the body returned normally or unwound with an error.
    pub(crate) fn enter(&self, call_env: &Environment) -> DynamicScopeGuard<'_> {
        if let Some(frame) = call_env.frame() {
            let mut stack = self.stack.borrow_mut();
            let pushed = stack.with_frame(frame);
            *stack = pushed;
        }
        DynamicScopeGuard {
            scope: self,
            pushed: !call_env.is_empty(),
        }
    }

    fn pop(&self) {
        let mut stack = self.stack.borrow_mut();
        let parent = stack.parent();
        *stack = parent;
    }
}

#[must_use = "the frame is popped as soon as the guard is dropped"]
pub(crate) struct DynamicScopeGuard<'a> {
    scope: &'a DynamicScope,
    pushed: bool,
}

impl Drop for DynamicScopeGuard<'_> {
    fn drop(&mut self) {
        if self.pushed {
            self.scope.pop();
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ArityMismatch;
    use crate::ast::val;

    fn global_with(bindings: &[(&str, Value)]) -> Environment {
        let env = Environment::new();
        for (name, value) in bindings {
            env.define(*name, value.clone()).unwrap();
        }
        env
    }

    #[test]
    fn test_define_then_lookup_then_assign() {
        let env = Environment::new();
        assert_eq!(env.define("x", val(1)).unwrap(), "x");
        assert_eq!(env.lookup("x").unwrap(), val(1));

        env.assign("x", val(2)).unwrap();
        assert_eq!(env.lookup("x").unwrap(), val(2));

        // Redefinition overwrites in place and keeps the original position
        env.define("y", val(3)).unwrap();
        env.define("x", val(4)).unwrap();
        assert_eq!(env.local_names(), ["x", "y"]);
        assert_eq!(env.lookup("x").unwrap(), val(4));
    }

    #[test]
    fn test_assign_unbound_fails() {
        let env = Environment::new();
        assert_eq!(
            env.assign("nope", val(1)),
            Err(Error::UnboundVariable("nope".to_owned()))
        );
        assert_eq!(
            env.lookup("nope"),
            Err(Error::UnboundVariable("nope".to_owned()))
        );
    }

    #[test]
    fn test_define_targets_nearest_frame_only() {
        let global = global_with(&[("x", val(1))]);
        let inner = global.extend(vec![], vec![]).unwrap();

        inner.define("x", val(2)).unwrap();
        assert_eq!(inner.lookup("x").unwrap(), val(2));
        assert_eq!(global.lookup("x").unwrap(), val(1));

        // Discarding the inner frame leaves the outer binding untouched
        drop(inner);
        assert_eq!(global.lookup("x").unwrap(), val(1));
    }

    #[test]
    fn test_assign_updates_nearest_enclosing_binding() {
        let global = global_with(&[("x", val(1))]);
        let inner = global.extend(vec!["y".into()], vec![val(0)]).unwrap();

        inner.assign("x", val(10)).unwrap();
        assert_eq!(global.lookup("x").unwrap(), val(10));
        assert!(!inner.is_locally_defined("x"));
    }

    #[test]
    fn test_frames_are_shared_between_clones() {
        let global = Environment::new();
        let captured = global.clone();
        global.define("late", val(7)).unwrap();
        assert_eq!(captured.lookup("late").unwrap(), val(7));
        assert_eq!(captured, global);
    }

    #[test]
    fn test_assign_through_reference_chain() {
        let global = global_with(&[("y", val(5))]);
        let middle = global
            .extend(
                vec!["b".into()],
                vec![Value::Reference {
                    name: "y".into(),
                    env: global.clone(),
                }],
            )
            .unwrap();
        let inner = middle
            .extend(
                vec!["a".into()],
                vec![Value::Reference {
                    name: "b".into(),
                    env: middle.clone(),
                }],
            )
            .unwrap();

        inner.assign("a", val(50)).unwrap();
        assert_eq!(global.lookup("y").unwrap(), val(50));
        // The alias slots themselves still hold references
        assert!(matches!(inner.get("a"), Some(Value::Reference { .. })));
        assert!(matches!(middle.get("b"), Some(Value::Reference { .. })));
    }

    #[test]
    fn test_defined_predicates() {
        let global = global_with(&[("g", val(1))]);
        let inner = global.extend(vec!["l".into()], vec![val(2)]).unwrap();

        assert!(inner.is_defined("g"));
        assert!(inner.is_defined("l"));
        assert!(!inner.is_locally_defined("g"));
        assert!(inner.is_locally_defined("l"));
        assert!(!global.is_defined("l"));
    }

    #[test]
    fn test_unbind_variants() {
        let global = global_with(&[("x", val(1))]);
        let inner = global.extend(vec!["x".into()], vec![val(2)]).unwrap();

        inner.unbind_locally("x");
        assert_eq!(inner.lookup("x").unwrap(), val(1));
        inner.unbind_locally("x"); // idempotent, outer binding untouched
        assert_eq!(inner.lookup("x").unwrap(), val(1));

        let inner = global.extend(vec!["x".into()], vec![val(2)]).unwrap();
        inner.unbind("x");
        assert!(!inner.is_defined("x"));
        assert!(!global.is_defined("x"));
        inner.unbind("x");
    }

    #[test]
    fn test_extend_arity() {
        let global = Environment::new();
        let too_many = global.extend(vec!["a".into()], vec![val(1), val(2)]);
        assert_eq!(
            too_many.unwrap_err().arity_mismatch(),
            Some(ArityMismatch::TooMany)
        );
        let too_few = global.extend(vec!["a".into(), "b".into()], vec![val(1)]);
        assert_eq!(
            too_few.unwrap_err().arity_mismatch(),
            Some(ArityMismatch::TooFew)
        );
    }

    #[test]
    fn test_empty_sentinel() {
        let empty = Environment::empty();
        assert!(empty.is_empty());
        assert_eq!(empty.depth(), 0);
        assert!(empty.define("x", val(1)).is_err());
        assert_eq!(empty.parent(), Environment::empty());
        assert_eq!(Environment::new().depth(), 1);
    }

    #[test]
    fn test_get_all_bindings_respects_shadowing() {
        let global = global_with(&[("a", val(1)), ("b", val(2))]);
        let inner = global.extend(vec!["a".into()], vec![val(10)]).unwrap();
        assert_eq!(
            inner.get_all_bindings(),
            vec![("a".to_owned(), val(10)), ("b".to_owned(), val(2))]
        );
    }

    #[test]
    fn test_dynamic_scope_guard_pops_on_drop() {
        let global = Environment::new();
        let scope = DynamicScope::new(global.clone());
        assert_eq!(scope.depth(), 1);

        let call = global.extend(vec!["v".into()], vec![val(1)]).unwrap();
        {
            let _outer = scope.enter(&call);
            assert_eq!(scope.depth(), 2);
            assert_eq!(scope.current().lookup("v").unwrap(), val(1));
            {
                let nested = call.extend(vec![], vec![]).unwrap();
                let _inner = scope.enter(&nested);
                assert_eq!(scope.depth(), 3);
            }
            assert_eq!(scope.depth(), 2);
        }
        assert_eq!(scope.depth(), 1);
        assert_eq!(scope.current(), global);
    }

    #[test]
    fn test_dynamic_scope_shares_call_frame() {
        let global = Environment::new();
        let scope = DynamicScope::new(global.clone());
        let call = global.extend(vec!["v".into()], vec![val(1)]).unwrap();
        let _guard = scope.enter(&call);

        // A define in the call frame is visible through the dynamic stack
        call.define("w", val(2)).unwrap();
        assert_eq!(scope.current().lookup("w").unwrap(), val(2));
    }
}
