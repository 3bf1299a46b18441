//! Parent‑linked variable scopes.
//!
//! Environments are shared, not owned: the interpreter's cursor, nested
//! blocks and any number of closures can hold the same scope at once, and
//! a scope outlives its lexical block whenever a closure captured it.  Each
//! one is therefore an independently allocated `Rc<RefCell<_>>` node with an
//! immutable parent link.  The graph is acyclic (a scope never points at a
//! descendant), so reference counting reclaims it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::error::{LoxError, Result};
use crate::token::Token;
use crate::value::Value;

/// Shared handle to an environment.
pub type SharedEnv<'a> = Rc<RefCell<Environment<'a>>>;

#[derive(Debug, Default)]
pub struct Environment<'a> {
    values: HashMap<&'a str, Value<'a>>,
    enclosing: Option<SharedEnv<'a>>,
}

impl<'a> Environment<'a> {
    /// A root (global) environment.
    pub fn new() -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: None,
        }
    }

    pub fn with_enclosing(enclosing: SharedEnv<'a>) -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: Some(enclosing),
        }
    }

    /// Wrap into a shared handle.
    pub fn into_shared(self) -> SharedEnv<'a> {
        Rc::new(RefCell::new(self))
    }

    /// Insert or overwrite `name` in this environment only.
    pub fn define(&mut self, name: &'a str, value: Value<'a>) {
        debug!("define '{}' = {}", name, value);
        self.values.insert(name, value);
    }

    /// Look `name` up here, then in each enclosing environment outward.
    pub fn get(&self, name: &Token<'a>) -> Result<Value<'a>> {
        if let Some(value) = self.values.get(name.lexeme) {
            return Ok(value.clone());
        }

        match &self.enclosing {
            Some(enclosing) => enclosing.borrow().get(name),
            None => Err(undefined(name)),
        }
    }

    /// Overwrite an existing binding, searching outward.  Never creates one.
    pub fn assign(&mut self, name: &Token<'a>, value: Value<'a>) -> Result<()> {
        if let Some(slot) = self.values.get_mut(name.lexeme) {
            *slot = value;
            return Ok(());
        }

        match &self.enclosing {
            Some(enclosing) => enclosing.borrow_mut().assign(name, value),
            None => Err(undefined(name)),
        }
    }

    /// Follow exactly `distance` parent links from `env`.
    pub fn ancestor(env: &SharedEnv<'a>, distance: usize) -> Option<SharedEnv<'a>> {
        let mut current = Rc::clone(env);

        for _ in 0..distance {
            let parent = current.borrow().enclosing.clone()?;
            current = parent;
        }

        Some(current)
    }

    /// Read `name` from the environment exactly `distance` hops out,
    /// without searching further.
    pub fn get_at(env: &SharedEnv<'a>, distance: usize, name: &str) -> Option<Value<'a>> {
        let target = Self::ancestor(env, distance)?;
        let value = target.borrow().values.get(name).cloned();
        value
    }

    /// Overwrite `name` in the environment exactly `distance` hops out.
    /// Returns `false` if that environment has no such binding.
    pub fn assign_at(
        env: &SharedEnv<'a>,
        distance: usize,
        name: &str,
        value: Value<'a>,
    ) -> bool {
        let Some(target) = Self::ancestor(env, distance) else {
            return false;
        };

        let mut target = target.borrow_mut();
        match target.values.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

fn undefined(name: &Token<'_>) -> LoxError {
    LoxError::runtime(name, format!("Undefined variable '{}'.", name.lexeme))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenType;

    fn ident(name: &str) -> Token<'_> {
        Token::new(TokenType::IDENTIFIER, name, 1)
    }

    #[test]
    fn get_walks_outward_and_define_shadows() {
        let global = Environment::new().into_shared();
        global.borrow_mut().define("a", Value::Number(1.0));

        let inner = Environment::with_enclosing(Rc::clone(&global)).into_shared();
        assert_eq!(inner.borrow().get(&ident("a")).unwrap(), Value::Number(1.0));

        inner.borrow_mut().define("a", Value::Number(2.0));
        assert_eq!(inner.borrow().get(&ident("a")).unwrap(), Value::Number(2.0));
        assert_eq!(global.borrow().get(&ident("a")).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn assign_updates_declaring_scope_and_never_creates() {
        let global = Environment::new().into_shared();
        global.borrow_mut().define("a", Value::Nil);
        let inner = Environment::with_enclosing(Rc::clone(&global)).into_shared();

        inner
            .borrow_mut()
            .assign(&ident("a"), Value::Bool(true))
            .unwrap();
        assert_eq!(global.borrow().get(&ident("a")).unwrap(), Value::Bool(true));

        let err = inner
            .borrow_mut()
            .assign(&ident("missing"), Value::Nil)
            .unwrap_err();
        assert_eq!(err.message(), "Undefined variable 'missing'.");
        assert!(inner.borrow().get(&ident("missing")).is_err());
    }

    #[test]
    fn distance_access_targets_one_environment() {
        let global = Environment::new().into_shared();
        global.borrow_mut().define("x", Value::Number(0.0));
        let middle = Environment::with_enclosing(Rc::clone(&global)).into_shared();
        middle.borrow_mut().define("x", Value::Number(1.0));
        let inner = Environment::with_enclosing(Rc::clone(&middle)).into_shared();

        assert_eq!(Environment::get_at(&inner, 1, "x"), Some(Value::Number(1.0)));
        assert_eq!(Environment::get_at(&inner, 2, "x"), Some(Value::Number(0.0)));
        assert_eq!(Environment::get_at(&inner, 0, "x"), None);
        assert!(Environment::ancestor(&inner, 3).is_none());

        assert!(Environment::assign_at(&inner, 2, "x", Value::Number(9.0)));
        assert!(!Environment::assign_at(&inner, 0, "x", Value::Nil));
        assert_eq!(Environment::get_at(&global, 0, "x"), Some(Value::Number(9.0)));
        assert_eq!(Environment::get_at(&middle, 0, "x"), Some(Value::Number(1.0)));
    }
}
