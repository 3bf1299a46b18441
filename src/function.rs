use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::ast::FunctionDecl;
use crate::class::Instance;
use crate::environment::{Environment, SharedEnv};
use crate::error::Result;
use crate::interpreter::{Exec, Interpreter};
use crate::value::Value;

/// A closure: a declaration paired with the environment that was active
/// where it was defined.
pub struct UserFunction<'a> {
    declaration: Rc<FunctionDecl<'a>>,
    closure: SharedEnv<'a>,
    is_initializer: bool,
}

impl<'a> UserFunction<'a> {
    pub fn new(
        declaration: Rc<FunctionDecl<'a>>,
        closure: SharedEnv<'a>,
        is_initializer: bool,
    ) -> Self {
        Self {
            declaration,
            closure,
            is_initializer,
        }
    }

    pub fn name(&self) -> &'a str {
        self.declaration.name.lexeme
    }

    pub fn arity(&self) -> usize {
        self.declaration.params.len()
    }

    /// A copy of this method whose closure is a fresh scope defining `this`.
    /// Built anew on every access; nothing is cached.
    pub fn bind(&self, instance: Rc<RefCell<Instance<'a>>>) -> UserFunction<'a> {
        let mut scope = Environment::with_enclosing(Rc::clone(&self.closure));
        scope.define("this", Value::Instance(instance));

        UserFunction {
            declaration: Rc::clone(&self.declaration),
            closure: scope.into_shared(),
            is_initializer: self.is_initializer,
        }
    }

    /// Run the body in a new scope parented to the captured closure (never
    /// the caller's scope).  Initializers always yield their `this`.
    pub fn call(
        &self,
        interpreter: &mut Interpreter<'a>,
        arguments: Vec<Value<'a>>,
    ) -> Result<Value<'a>> {
        let mut activation = Environment::with_enclosing(Rc::clone(&self.closure));
        for (param, argument) in self.declaration.params.iter().zip(arguments) {
            activation.define(param.lexeme, argument);
        }

        let outcome = interpreter.execute_block(&self.declaration.body, activation.into_shared())?;

        if self.is_initializer {
            debug!("Initializer '{}' yields its instance", self.name());
            return Ok(Environment::get_at(&self.closure, 0, "this").unwrap_or(Value::Nil));
        }

        match outcome {
            Exec::Return(value) => {
                debug!("'{}' returned {}", self.name(), value);
                Ok(value)
            }
            Exec::Normal => Ok(Value::Nil),
        }
    }
}

impl<'a> fmt::Debug for UserFunction<'a> {
    // The closure may (indirectly) hold this very function.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserFunction")
            .field("name", &self.name())
            .field("arity", &self.arity())
            .field("is_initializer", &self.is_initializer)
            .finish_non_exhaustive()
    }
}
