//! Tree‑walking evaluator.
//!
//! The interpreter owns a cursor to the *current* environment and a handle
//! to the global one (pre‑seeded with natives).  It consumes the AST plus the
//! resolver's [`Locals`] table: references with a recorded distance are read
//! and written exactly that many scopes out, everything else is a global.
//!
//! Statement execution yields an [`Exec`] outcome instead of unwinding for
//! `return`; the value travels back up through blocks and loops until the
//! function call that owns it.  Runtime errors travel as `Err` and abort the
//! rest of the run.

use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;

use log::{debug, info};

use crate::ast::{Expr, ExprId, Stmt};
use crate::callable::Callable;
use crate::class::{Class, Instance, INITIALIZER};
use crate::environment::{Environment, SharedEnv};
use crate::error::{LoxError, Result};
use crate::function::UserFunction;
use crate::native;
use crate::resolver::Locals;
use crate::token::{Token, TokenType};
use crate::value::Value;

/// Deepest chain of active Lox calls before a runtime error is raised.
const MAX_CALL_DEPTH: usize = 4096;

/// Grow the native stack when less than this remains.
const RED_ZONE: usize = 100 * 1024;

/// Size of each new stack segment.
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Evaluation recurses once per nested node and several times per Lox
/// call, so every recursive entry point runs through here.
#[inline]
fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// How a statement finished.
#[derive(Debug)]
pub enum Exec<'a> {
    Normal,
    /// A `return` is unwinding to the nearest call boundary.
    Return(Value<'a>),
}

pub struct Interpreter<'a> {
    globals: SharedEnv<'a>,
    environment: SharedEnv<'a>,
    locals: HashMap<ExprId, usize>,
    out: Box<dyn Write + 'a>,
    /// Lox calls currently on the stack.
    depth: usize,
}

impl<'a> Default for Interpreter<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Interpreter<'a> {
    /// An interpreter printing to stdout.
    pub fn new() -> Self {
        Self::with_output(io::stdout())
    }

    /// An interpreter whose `print` statements write to `out`.
    pub fn with_output<W: Write + 'a>(out: W) -> Self {
        info!("Initializing Interpreter");

        let globals = Environment::new().into_shared();

        for native in native::all() {
            debug!("Defining native function '{}'", native.name);
            let name = native.name;
            globals
                .borrow_mut()
                .define(name, Value::Callable(Callable::Native(Rc::new(native))));
        }

        Self {
            environment: Rc::clone(&globals),
            globals,
            locals: HashMap::new(),
            out: Box::new(out),
            depth: 0,
        }
    }

    /// Merge a binding table produced by the resolver.
    pub fn add_locals(&mut self, locals: Locals) {
        debug!("Adding {} resolved binding(s)", locals.len());
        self.locals.extend(locals);
    }

    /// Execute a resolved program.  The first runtime error stops it.
    pub fn interpret(&mut self, statements: &[Stmt<'a>]) -> Result<()> {
        debug!("Interpreting {} statements", statements.len());

        for stmt in statements {
            self.execute(stmt)?;
        }

        self.out.flush()?;
        info!("Interpretation completed successfully");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statements
    // ─────────────────────────────────────────────────────────────────────────

    fn execute(&mut self, stmt: &Stmt<'a>) -> Result<Exec<'a>> {
        ensure_sufficient_stack(|| self.execute_stmt(stmt))
    }

    fn execute_stmt(&mut self, stmt: &Stmt<'a>) -> Result<Exec<'a>> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
            }

            Stmt::Print(expr) => {
                let value = self.evaluate(expr)?;
                writeln!(self.out, "{}", value)?;
            }

            Stmt::Var { name, initializer } => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                self.environment.borrow_mut().define(name.lexeme, value);
            }

            Stmt::Block(statements) => {
                let scope = Environment::with_enclosing(Rc::clone(&self.environment));
                return self.execute_block(statements, scope.into_shared());
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    return self.execute(then_branch);
                } else if let Some(else_stmt) = else_branch {
                    return self.execute(else_stmt);
                }
            }

            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    if let Exec::Return(value) = self.execute(body)? {
                        return Ok(Exec::Return(value));
                    }
                }
            }

            Stmt::Function(decl) => {
                debug!("Defining function '{}'", decl.name.lexeme);
                let function = UserFunction::new(Rc::clone(decl), Rc::clone(&self.environment), false);
                self.environment.borrow_mut().define(
                    decl.name.lexeme,
                    Value::Callable(Callable::Function(Rc::new(function))),
                );
            }

            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                debug!("Returning value: {}", value);
                return Ok(Exec::Return(value));
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => {
                let superclass = match superclass {
                    Some(expr) => Some(self.evaluate_superclass(expr, name)?),
                    None => None,
                };

                self.environment.borrow_mut().define(name.lexeme, Value::Nil);

                // Methods of a subclass close over an extra scope holding `super`.
                let outer = superclass.as_ref().map(|sc| {
                    let mut scope = Environment::with_enclosing(Rc::clone(&self.environment));
                    scope.define("super", Value::Callable(Callable::Class(Rc::clone(sc))));
                    std::mem::replace(&mut self.environment, scope.into_shared())
                });

                let table = methods
                    .iter()
                    .map(|decl| {
                        let method = UserFunction::new(
                            Rc::clone(decl),
                            Rc::clone(&self.environment),
                            decl.name.lexeme == INITIALIZER,
                        );
                        (decl.name.lexeme, Rc::new(method))
                    })
                    .collect();

                let class = Rc::new(Class::new(name.lexeme, superclass, table));

                if let Some(previous) = outer {
                    self.environment = previous;
                }

                debug!("Defined class '{}'", name.lexeme);
                self.environment
                    .borrow_mut()
                    .assign(name, Value::Callable(Callable::Class(class)))?;
            }
        }

        Ok(Exec::Normal)
    }

    /// Run `statements` with `environment` as the current scope.  The
    /// previous scope is restored however the block ends: normally, by
    /// `return`, or by a runtime error.
    pub fn execute_block(
        &mut self,
        statements: &[Stmt<'a>],
        environment: SharedEnv<'a>,
    ) -> Result<Exec<'a>> {
        let previous = std::mem::replace(&mut self.environment, environment);

        let outcome = self.execute_sequence(statements);

        self.environment = previous;
        outcome
    }

    fn execute_sequence(&mut self, statements: &[Stmt<'a>]) -> Result<Exec<'a>> {
        for stmt in statements {
            if let Exec::Return(value) = self.execute(stmt)? {
                return Ok(Exec::Return(value));
            }
        }

        Ok(Exec::Normal)
    }

    fn evaluate_superclass(&mut self, expr: &Expr<'a>, class_name: &Token<'a>) -> Result<Rc<Class<'a>>> {
        match self.evaluate(expr)? {
            Value::Callable(Callable::Class(class)) => Ok(class),
            _ => {
                let token = match expr {
                    Expr::Variable { name, .. } => *name,
                    _ => class_name,
                };
                Err(LoxError::runtime(token, "Superclass must be a class."))
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────────────────────────────────────

    pub fn evaluate(&mut self, expr: &Expr<'a>) -> Result<Value<'a>> {
        ensure_sufficient_stack(|| self.evaluate_expr(expr))
    }

    fn evaluate_expr(&mut self, expr: &Expr<'a>) -> Result<Value<'a>> {
        match expr {
            Expr::Literal(literal) => Ok(Value::from(literal)),

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Unary { operator, right } => {
                let right = self.evaluate(right)?;
                self.evaluate_unary(operator, right)
            }

            Expr::Binary {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                evaluate_binary(operator, left, right)
            }

            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                let short_circuits = match operator.token_type {
                    TokenType::OR => left.is_truthy(),
                    _ => !left.is_truthy(),
                };

                if short_circuits {
                    Ok(left)
                } else {
                    self.evaluate(right)
                }
            }

            Expr::Variable { id, name } => self.look_up_variable(*id, name),

            Expr::Assign { id, name, value } => {
                let value = self.evaluate(value)?;

                match self.locals.get(id) {
                    Some(&distance) => {
                        if !Environment::assign_at(&self.environment, distance, name.lexeme, value.clone()) {
                            return Err(undefined_variable(name));
                        }
                    }
                    None => self.globals.borrow_mut().assign(name, value.clone())?,
                }

                Ok(value)
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee = self.evaluate(callee)?;

                let mut args = Vec::with_capacity(arguments.len());
                for arg in arguments {
                    args.push(self.evaluate(arg)?);
                }

                let Value::Callable(callable) = callee else {
                    return Err(LoxError::runtime(paren, "Can only call functions and classes."));
                };

                if args.len() != callable.arity() {
                    return Err(LoxError::runtime(
                        paren,
                        format!(
                            "Expected {} arguments but got {}.",
                            callable.arity(),
                            args.len()
                        ),
                    ));
                }

                if self.depth >= MAX_CALL_DEPTH {
                    return Err(LoxError::runtime(paren, "Stack overflow."));
                }

                self.depth += 1;
                let result = callable.call(self, args, paren);
                self.depth -= 1;
                result
            }

            Expr::Get { object, name } => match self.evaluate(object)? {
                Value::Instance(instance) => Instance::get(&instance, name),
                _ => Err(LoxError::runtime(name, "Only instances have properties.")),
            },

            Expr::Set {
                object,
                name,
                value,
            } => {
                let Value::Instance(instance) = self.evaluate(object)? else {
                    return Err(LoxError::runtime(name, "Only instances have fields."));
                };

                let value = self.evaluate(value)?;
                instance.borrow_mut().set(name, value.clone());
                Ok(value)
            }

            Expr::This { id, keyword } => self.look_up_variable(*id, keyword),

            Expr::Super {
                id,
                keyword,
                method,
            } => self.evaluate_super(*id, keyword, method),
        }
    }

    fn evaluate_unary(&self, operator: &Token<'a>, right: Value<'a>) -> Result<Value<'a>> {
        match operator.token_type {
            TokenType::MINUS => match right {
                Value::Number(n) => Ok(Value::Number(-n)),
                _ => Err(LoxError::runtime(operator, "Operand must be a number.")),
            },
            TokenType::BANG => Ok(Value::Bool(!right.is_truthy())),
            _ => Err(LoxError::runtime(operator, "Invalid unary operator.")),
        }
    }

    fn look_up_variable(&self, id: ExprId, name: &Token<'a>) -> Result<Value<'a>> {
        match self.locals.get(&id) {
            Some(&distance) => Environment::get_at(&self.environment, distance, name.lexeme)
                .ok_or_else(|| undefined_variable(name)),
            None => self.globals.borrow().get(name),
        }
    }

    /// `super.method`: the method is looked up directly on the superclass
    /// stored `distance` scopes out and bound to the `this` one scope closer.
    fn evaluate_super(
        &self,
        id: ExprId,
        keyword: &Token<'a>,
        method: &Token<'a>,
    ) -> Result<Value<'a>> {
        let distance = *self
            .locals
            .get(&id)
            .ok_or_else(|| undefined_variable(keyword))?;

        let Some(Value::Callable(Callable::Class(superclass))) =
            Environment::get_at(&self.environment, distance, "super")
        else {
            return Err(undefined_variable(keyword));
        };

        let receiver = distance
            .checked_sub(1)
            .and_then(|d| Environment::get_at(&self.environment, d, "this"));
        let Some(Value::Instance(instance)) = receiver else {
            return Err(LoxError::runtime(keyword, "Undefined variable 'this'."));
        };

        match superclass.find_method(method.lexeme) {
            Some(found) => Ok(Value::Callable(Callable::Function(Rc::new(
                found.bind(instance),
            )))),
            None => Err(LoxError::runtime(
                method,
                format!("Undefined property '{}'.", method.lexeme),
            )),
        }
    }
}

fn undefined_variable(name: &Token<'_>) -> LoxError {
    LoxError::runtime(name, format!("Undefined variable '{}'.", name.lexeme))
}

fn evaluate_binary<'a>(operator: &Token<'a>, left: Value<'a>, right: Value<'a>) -> Result<Value<'a>> {
    use Value::{Bool, Number};

    let numbers = |left: &Value<'a>, right: &Value<'a>| match (left, right) {
        (Number(a), Number(b)) => Ok((*a, *b)),
        _ => Err(LoxError::runtime(operator, "Operands must be numbers.")),
    };

    match operator.token_type {
        TokenType::PLUS => match (&left, &right) {
            (Number(a), Number(b)) => Ok(Number(a + b)),
            (Value::String(a), Value::String(b)) => {
                let mut joined = String::with_capacity(a.len() + b.len());
                joined.push_str(a);
                joined.push_str(b);
                Ok(Value::String(Rc::from(joined)))
            }
            _ => Err(LoxError::runtime(
                operator,
                "Operands must be two numbers or two strings.",
            )),
        },

        TokenType::MINUS => numbers(&left, &right).map(|(a, b)| Number(a - b)),
        TokenType::STAR => numbers(&left, &right).map(|(a, b)| Number(a * b)),
        // IEEE semantics: x / 0 is ±inf or NaN, not an error.
        TokenType::SLASH => numbers(&left, &right).map(|(a, b)| Number(a / b)),

        TokenType::GREATER => numbers(&left, &right).map(|(a, b)| Bool(a > b)),
        TokenType::GREATER_EQUAL => numbers(&left, &right).map(|(a, b)| Bool(a >= b)),
        TokenType::LESS => numbers(&left, &right).map(|(a, b)| Bool(a < b)),
        TokenType::LESS_EQUAL => numbers(&left, &right).map(|(a, b)| Bool(a <= b)),

        TokenType::EQUAL_EQUAL => Ok(Bool(left == right)),
        TokenType::BANG_EQUAL => Ok(Bool(left != right)),

        _ => Err(LoxError::runtime(operator, "Invalid binary operator.")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::resolver::Resolver;
    use crate::scanner::Scanner;

    use std::cell::RefCell;

    /// `Write` sink the test can read back after the interpreter is gone.
    #[derive(Clone, Default)]
    struct Capture(Rc<RefCell<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn run(src: &str) -> (String, Option<String>) {
        let (tokens, lex_errors) = Scanner::new(src).scan_all();
        assert!(lex_errors.is_empty());
        let statements = Parser::new(&tokens).parse().expect("parses");
        let locals = Resolver::new().resolve(&statements).expect("resolves");

        let capture = Capture::default();
        let mut interpreter = Interpreter::with_output(capture.clone());
        interpreter.add_locals(locals);
        let error = interpreter.interpret(&statements).err().map(|e| e.message());
        drop(interpreter);

        let out = String::from_utf8(capture.0.borrow().clone()).unwrap();
        (out, error)
    }

    #[test]
    fn block_restores_environment_after_runtime_error() {
        let (tokens, _) = Scanner::new("{ var a = 1; a + nil; }").scan_all();
        let statements = Parser::new(&tokens).parse().unwrap();
        let locals = Resolver::new().resolve(&statements).unwrap();

        let mut interpreter = Interpreter::with_output(Capture::default());
        let before = Rc::clone(&interpreter.environment);
        interpreter.add_locals(locals);

        assert!(interpreter.interpret(&statements).is_err());
        assert!(Rc::ptr_eq(&before, &interpreter.environment));
    }

    #[test]
    fn shadowing_after_closure_creation_does_not_rebind() {
        let (out, err) = run(r#"
            var a = "global";
            {
                fun show() { print a; }
                show();
                var a = "block";
                show();
            }
        "#);

        assert_eq!(err, None);
        assert_eq!(out, "global\nglobal\n");
    }

    #[test]
    fn return_unwinds_through_loops_and_blocks() {
        let (out, err) = run(r#"
            fun first(limit) {
                var i = 0;
                while (true) {
                    { if (i == limit) return i; }
                    i = i + 1;
                }
            }
            print first(3);
        "#);

        assert_eq!(err, None);
        assert_eq!(out, "3\n");
    }

    #[test]
    fn runtime_error_stops_remaining_statements() {
        let (out, err) = run("print 1; print -\"x\"; print 2;");

        assert_eq!(out, "1\n");
        assert_eq!(err.as_deref(), Some("Operand must be a number."));
    }

    #[test]
    fn super_skips_intermediate_overrides() {
        let (out, err) = run(r#"
            class A { name() { return "A"; } }
            class B < A { name() { return "B"; } }
            class C < B { name() { return "C" + super.name(); } }
            print C().name();
        "#);

        assert_eq!(err, None);
        assert_eq!(out, "CB\n");
    }

    #[test]
    fn inherited_initializer_runs_for_subclass() {
        let (out, err) = run(r#"
            class Base { init(v) { this.v = v; } }
            class Derived < Base {}
            print Derived(7).v;
        "#);

        assert_eq!(err, None);
        assert_eq!(out, "7\n");
    }

    #[test]
    fn calling_init_directly_returns_the_instance() {
        let (out, err) = run(r#"
            class Foo { init() { this.n = 1; } }
            var foo = Foo();
            print foo.init() == foo;
        "#);

        assert_eq!(err, None);
        assert_eq!(out, "true\n");
    }

    #[test]
    fn non_class_superclass_is_a_runtime_error() {
        let (_, err) = run("var NotAClass = 1; class B < NotAClass {}");
        assert_eq!(err.as_deref(), Some("Superclass must be a class."));
    }
}
