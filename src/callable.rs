//! The closed set of things a call expression can invoke.

use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::class::Class;
use crate::error::{LoxError, Result};
use crate::function::UserFunction;
use crate::interpreter::Interpreter;
use crate::native::NativeFunction;
use crate::token::Token;
use crate::value::Value;

#[derive(Debug, Clone)]
pub enum Callable<'a> {
    Native(Rc<NativeFunction>),
    Function(Rc<UserFunction<'a>>),
    Class(Rc<Class<'a>>),
}

impl<'a> Callable<'a> {
    /// Exact number of arguments a call must supply.
    pub fn arity(&self) -> usize {
        match self {
            Callable::Native(native) => native.arity,
            Callable::Function(function) => function.arity(),
            Callable::Class(class) => class.arity(),
        }
    }

    /// Invoke with already evaluated arguments.  The caller has checked the
    /// arity; `paren` locates errors raised by natives.
    pub fn call(
        &self,
        interpreter: &mut Interpreter<'a>,
        arguments: Vec<Value<'a>>,
        paren: &Token<'a>,
    ) -> Result<Value<'a>> {
        debug!("Calling {} with {} argument(s)", self, arguments.len());

        match self {
            Callable::Native(native) => {
                (native.func)(&arguments).map_err(|msg| LoxError::runtime(paren, msg))
            }
            Callable::Function(function) => function.call(interpreter, arguments),
            Callable::Class(class) => Class::instantiate(class, interpreter, arguments),
        }
    }

    /// Identity comparison.
    pub fn same(&self, other: &Callable<'a>) -> bool {
        match (self, other) {
            (Callable::Native(a), Callable::Native(b)) => Rc::ptr_eq(a, b),
            (Callable::Function(a), Callable::Function(b)) => Rc::ptr_eq(a, b),
            (Callable::Class(a), Callable::Class(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<'a> fmt::Display for Callable<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Native(_) => write!(f, "<native fn>"),
            Callable::Function(function) => write!(f, "<fn {}>", function.name()),
            Callable::Class(class) => write!(f, "{}", class.name),
        }
    }
}
