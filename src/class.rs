//! Classes and their instances.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::callable::Callable;
use crate::error::{LoxError, Result};
use crate::function::UserFunction;
use crate::interpreter::Interpreter;
use crate::token::Token;
use crate::value::Value;

/// Name of the method run on instantiation.
pub const INITIALIZER: &str = "init";

/// Immutable once built.
pub struct Class<'a> {
    pub name: &'a str,
    superclass: Option<Rc<Class<'a>>>,
    methods: HashMap<&'a str, Rc<UserFunction<'a>>>,
}

impl<'a> Class<'a> {
    pub fn new(
        name: &'a str,
        superclass: Option<Rc<Class<'a>>>,
        methods: HashMap<&'a str, Rc<UserFunction<'a>>>,
    ) -> Self {
        Self {
            name,
            superclass,
            methods,
        }
    }

    /// This class's own method table first, then each ancestor in turn.
    pub fn find_method(&self, name: &str) -> Option<Rc<UserFunction<'a>>> {
        match self.methods.get(name) {
            Some(method) => Some(Rc::clone(method)),
            None => self.superclass.as_ref()?.find_method(name),
        }
    }

    /// Arity of `init`, or zero without one.
    pub fn arity(&self) -> usize {
        self.find_method(INITIALIZER).map_or(0, |init| init.arity())
    }

    /// Allocate an instance and run `init` on it if the class (or an
    /// ancestor) defines one.
    pub fn instantiate(
        class: &Rc<Class<'a>>,
        interpreter: &mut Interpreter<'a>,
        arguments: Vec<Value<'a>>,
    ) -> Result<Value<'a>> {
        let instance = Rc::new(RefCell::new(Instance::new(Rc::clone(class))));
        debug!("Instantiating {}", class.name);

        if let Some(init) = class.find_method(INITIALIZER) {
            init.bind(Rc::clone(&instance)).call(interpreter, arguments)?;
        }

        Ok(Value::Instance(instance))
    }
}

impl<'a> fmt::Debug for Class<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.methods.keys().collect();
        methods.sort();

        f.debug_struct("Class")
            .field("name", &self.name)
            .field("superclass", &self.superclass.as_ref().map(|s| s.name))
            .field("methods", &methods)
            .finish()
    }
}

/// An object: its class plus fields created on first assignment.
pub struct Instance<'a> {
    class: Rc<Class<'a>>,
    fields: HashMap<&'a str, Value<'a>>,
}

impl<'a> Instance<'a> {
    pub fn new(class: Rc<Class<'a>>) -> Self {
        Self {
            class,
            fields: HashMap::new(),
        }
    }

    pub fn class(&self) -> &Rc<Class<'a>> {
        &self.class
    }

    /// Own field first; otherwise a method from the class chain, freshly
    /// bound to `instance`.
    pub fn get(instance: &Rc<RefCell<Instance<'a>>>, name: &Token<'a>) -> Result<Value<'a>> {
        let this = instance.borrow();

        if let Some(value) = this.fields.get(name.lexeme) {
            return Ok(value.clone());
        }

        match this.class.find_method(name.lexeme) {
            Some(method) => {
                let bound = method.bind(Rc::clone(instance));
                Ok(Value::Callable(Callable::Function(Rc::new(bound))))
            }
            None => Err(LoxError::runtime(
                name,
                format!("Undefined property '{}'.", name.lexeme),
            )),
        }
    }

    /// Writes straight into the field table; the class is never consulted.
    pub fn set(&mut self, name: &Token<'a>, value: Value<'a>) {
        self.fields.insert(name.lexeme, value);
    }
}

impl<'a> fmt::Debug for Instance<'a> {
    // Fields may refer back to this instance, so only names are shown.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields: Vec<_> = self.fields.keys().collect();
        fields.sort();

        f.debug_struct("Instance")
            .field("class", &self.class.name)
            .field("fields", &fields)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenType;

    fn bare(name: &'static str, superclass: Option<Rc<Class<'static>>>) -> Rc<Class<'static>> {
        Rc::new(Class::new(name, superclass, HashMap::new()))
    }

    #[test]
    fn fields_are_created_on_first_write() {
        let class = bare("Point", None);
        let instance = Rc::new(RefCell::new(Instance::new(class)));
        let x = Token::new(TokenType::IDENTIFIER, "x", 1);

        let err = Instance::get(&instance, &x).unwrap_err();
        assert_eq!(err.message(), "Undefined property 'x'.");

        instance.borrow_mut().set(&x, Value::Number(4.0));
        assert_eq!(Instance::get(&instance, &x).unwrap(), Value::Number(4.0));
    }

    #[test]
    fn class_without_init_has_zero_arity() {
        let base = bare("Base", None);
        let derived = bare("Derived", Some(Rc::clone(&base)));

        assert_eq!(derived.arity(), 0);
        assert!(derived.find_method("missing").is_none());
        assert_eq!(derived.superclass.as_ref().map(|s| s.name), Some("Base"));
    }
}
