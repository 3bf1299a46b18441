//! Static resolver pass for the **Rox** interpreter.
//!
//! This resolver does three things in one AST walk:
//! 1. Build lexical scopes (stack of `HashMap<&str,bool>` tracking declared/defined).
//! 2. Report static errors (redeclaration, read in own initializer, misplaced
//!    `return` / `this` / `super`).  Errors are collected and the walk goes on,
//!    but any error at all means the program must not run.
//! 3. Record, for *each* variable reference node, how many scopes out its
//!    binding lives.  References found in no local scope get no entry and
//!    are looked up as globals at runtime.
//!
//! The bottom of the scope stack is a `Global` sentinel that never records
//! names: globals may be freely redeclared and are resolved dynamically.

use std::collections::HashMap;

use crate::ast::{Expr, ExprId, FunctionDecl, Stmt};
use crate::class::INITIALIZER;
use crate::error::LoxError;
use crate::token::Token;
use log::{debug, info};

/// Binding table: reference node → number of scope hops to its binding.
pub type Locals = HashMap<ExprId, usize>;

/// What kind of function body are we inside?  Used to validate `return`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FunctionType {
    None,
    Function,
    Method,
    Initializer,
}

/// Are we inside a class body?  Used to validate `this` and `super`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ScopeKind {
    /// Unscoped top level: names are not tracked and may be redeclared.
    Global,
    Local,
}

#[derive(Debug)]
struct Scope<'a> {
    kind: ScopeKind,
    names: HashMap<&'a str, bool>, // false=declared, true=defined
}

impl<'a> Scope<'a> {
    fn new(kind: ScopeKind) -> Self {
        Scope {
            kind,
            names: HashMap::new(),
        }
    }
}

/// Resolver: tracks scopes, enforces static rules, and records binding
/// distances into a [`Locals`] table handed to the interpreter.
pub struct Resolver<'a> {
    scopes: Vec<Scope<'a>>,
    locals: Locals,
    errors: Vec<LoxError>,
    current_function: FunctionType,
    current_class: ClassType,
}

impl<'a> Default for Resolver<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Resolver<'a> {
    pub fn new() -> Self {
        info!("Resolver instantiated");
        Resolver {
            scopes: vec![Scope::new(ScopeKind::Global)],
            locals: HashMap::new(),
            errors: Vec::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
        }
    }

    /// Walk all top‑level statements.  Yields the binding table, or every
    /// static error found.
    pub fn resolve(mut self, statements: &[Stmt<'a>]) -> Result<Locals, Vec<LoxError>> {
        info!(
            "Beginning resolve pass over {} statement(s)",
            statements.len()
        );

        self.resolve_stmts(statements);

        if self.errors.is_empty() {
            info!("Resolved {} local reference(s)", self.locals.len());
            Ok(self.locals)
        } else {
            info!("Resolve pass found {} error(s)", self.errors.len());
            Err(self.errors)
        }
    }

    fn resolve_stmts(&mut self, statements: &[Stmt<'a>]) {
        for stmt in statements {
            self.resolve_stmt(stmt);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statement resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_stmt(&mut self, stmt: &Stmt<'a>) {
        match stmt {
            Stmt::Block(statements) => {
                self.begin_scope();
                self.resolve_stmts(statements);
                self.end_scope();
            }

            Stmt::Var { name, initializer } => {
                // declare → resolve initializer → define
                self.declare(name);
                if let Some(expr) = initializer {
                    self.resolve_expr(expr);
                }
                self.define(name);
            }

            Stmt::Function(decl) => {
                // the name is visible inside its own body (recursion)
                self.declare(decl.name);
                self.define(decl.name);
                self.resolve_function(decl, FunctionType::Function);
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.resolve_class(name, superclass.as_ref(), methods),

            Stmt::Expression(expr) | Stmt::Print(expr) => self.resolve_expr(expr),

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);
                if let Some(eb) = else_branch.as_deref() {
                    self.resolve_stmt(eb);
                }
            }

            Stmt::While { condition, body } => {
                self.resolve_expr(condition);
                self.resolve_stmt(body);
            }

            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    self.error(keyword, "Can't return from top-level code.");
                }

                if let Some(expr) = value {
                    if self.current_function == FunctionType::Initializer {
                        self.error(keyword, "Can't return a value from an initializer.");
                    }
                    self.resolve_expr(expr);
                }
            }
        }
    }

    fn resolve_class(
        &mut self,
        name: &'a Token<'a>,
        superclass: Option<&Expr<'a>>,
        methods: &[std::rc::Rc<FunctionDecl<'a>>],
    ) {
        let enclosing_class = self.current_class;
        self.current_class = ClassType::Class;

        self.declare(name);
        self.define(name);

        if let Some(superclass) = superclass {
            if let Expr::Variable { name: super_name, .. } = superclass {
                if super_name.lexeme == name.lexeme {
                    self.error(super_name, "A class can't inherit from itself.");
                }
            }

            self.current_class = ClassType::Subclass;
            self.resolve_expr(superclass);

            self.begin_scope();
            self.define_implicit("super");
        }

        self.begin_scope();
        self.define_implicit("this");

        for method in methods {
            let kind = if method.name.lexeme == INITIALIZER {
                FunctionType::Initializer
            } else {
                FunctionType::Method
            };
            self.resolve_function(method, kind);
        }

        self.end_scope();

        if superclass.is_some() {
            self.end_scope();
        }

        self.current_class = enclosing_class;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expression resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_expr(&mut self, expr: &Expr<'a>) {
        match expr {
            Expr::Literal(_) => {}

            Expr::Grouping(inner) => self.resolve_expr(inner),

            Expr::Unary { right, .. } => self.resolve_expr(right),

            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }

            Expr::Variable { id, name } => {
                // Only the innermost scope is consulted here.
                if let Some(scope) = self.scopes.last() {
                    if scope.names.get(name.lexeme) == Some(&false) {
                        self.error(name, "Can't read local variable in its own initializer.");
                    }
                }
                self.resolve_local(*id, name);
            }

            Expr::Assign { id, name, value } => {
                // RHS first, then bind the target
                self.resolve_expr(value);
                self.resolve_local(*id, name);
            }

            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee);
                for arg in arguments {
                    self.resolve_expr(arg);
                }
            }

            // Property names are dynamic; only the object is resolved.
            Expr::Get { object, .. } => self.resolve_expr(object),

            Expr::Set { object, value, .. } => {
                self.resolve_expr(value);
                self.resolve_expr(object);
            }

            Expr::This { id, keyword } => {
                if self.current_class == ClassType::None {
                    self.error(keyword, "Can't use 'this' outside of a class.");
                    return;
                }
                self.resolve_local(*id, keyword);
            }

            Expr::Super { id, keyword, .. } => {
                match self.current_class {
                    ClassType::None => {
                        self.error(keyword, "Can't use 'super' outside of a class.");
                    }
                    ClassType::Class => {
                        self.error(keyword, "Can't use 'super' in a class with no superclass.");
                    }
                    ClassType::Subclass => {}
                }
                self.resolve_local(*id, keyword);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Function helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Enter a fresh scope for a function’s parameters + body.
    fn resolve_function(&mut self, decl: &FunctionDecl<'a>, kind: FunctionType) {
        let enclosing = self.current_function;
        self.current_function = kind;

        self.begin_scope();
        for param in &decl.params {
            self.declare(param);
            self.define(param);
        }
        self.resolve_stmts(&decl.body);
        self.end_scope();

        self.current_function = enclosing;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scope management
    // ─────────────────────────────────────────────────────────────────────────

    #[inline]
    fn begin_scope(&mut self) {
        self.scopes.push(Scope::new(ScopeKind::Local));
    }

    #[inline]
    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &Token<'a>) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };

        if scope.kind == ScopeKind::Global {
            return;
        }

        if scope.names.contains_key(name.lexeme) {
            self.error(name, "Already a variable with this name in this scope.");
            return;
        }

        scope.names.insert(name.lexeme, false);
    }

    fn define(&mut self, name: &Token<'a>) {
        if let Some(scope) = self.scopes.last_mut() {
            if scope.kind == ScopeKind::Local {
                scope.names.insert(name.lexeme, true);
            }
        }
    }

    /// Bind `this` / `super` in the scope just opened for a class body.
    fn define_implicit(&mut self, name: &'static str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.names.insert(name, true);
        }
    }

    fn error(&mut self, token: &Token<'a>, message: &str) {
        debug!("Static error at line {}: {}", token.line, message);
        self.errors.push(LoxError::resolve(token, message));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Binding‑distance helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Record this reference as a local `depth` scopes out, or leave it
    /// unrecorded (global) if no local scope declares it.
    fn resolve_local(&mut self, id: ExprId, name: &Token<'a>) {
        let locals = self
            .scopes
            .iter()
            .rev()
            .take_while(|scope| scope.kind == ScopeKind::Local);

        for (depth, scope) in locals.enumerate() {
            if scope.names.contains_key(name.lexeme) {
                debug!("Resolved '{}' at depth {}", name.lexeme, depth);
                self.locals.insert(id, depth);
                return;
            }
        }

        debug!("Resolved '{}' as global", name.lexeme);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::scanner::Scanner;

    fn static_errors(src: &str) -> Vec<String> {
        let (tokens, lex_errors) = Scanner::new(src).scan_all();
        assert!(lex_errors.is_empty());
        let statements = Parser::new(&tokens).parse().expect("source parses");

        match Resolver::new().resolve(&statements) {
            Ok(_) => Vec::new(),
            Err(errors) => errors.iter().map(|e| e.message()).collect(),
        }
    }

    #[test]
    fn redeclaration_only_rejected_within_one_local_scope() {
        assert_eq!(
            static_errors("{ var a = 1; var a = 2; }"),
            vec!["Already a variable with this name in this scope."]
        );
        assert!(static_errors("{ var a = 1; { var a = 2; } }").is_empty());
        assert!(static_errors("var a = 1; var a = 2;").is_empty());
    }

    #[test]
    fn self_reference_in_initializer() {
        assert_eq!(
            static_errors("{ var a = a; }"),
            vec!["Can't read local variable in its own initializer."]
        );
        assert!(static_errors("var a = a;").is_empty());
    }

    #[test]
    fn misplaced_return_this_and_super() {
        assert_eq!(
            static_errors("return 1;"),
            vec!["Can't return from top-level code."]
        );
        assert_eq!(
            static_errors("class A { init() { return 1; } }"),
            vec!["Can't return a value from an initializer."]
        );
        assert!(static_errors("class A { init() { return; } }").is_empty());
        assert_eq!(
            static_errors("print this;"),
            vec!["Can't use 'this' outside of a class."]
        );
        assert_eq!(
            static_errors("fun f() { super.g(); }"),
            vec!["Can't use 'super' outside of a class."]
        );
        assert_eq!(
            static_errors("class A { f() { super.f(); } }"),
            vec!["Can't use 'super' in a class with no superclass."]
        );
        assert_eq!(
            static_errors("class A < A {}"),
            vec!["A class can't inherit from itself."]
        );
    }

    #[test]
    fn errors_accumulate_across_the_whole_program() {
        let errors = static_errors("return; { var b = 1; var b = 2; } print this;");
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn distances_count_scopes_between_use_and_declaration() {
        let src = "{ var a = 1; { { print a; } } } print a;";
        let (tokens, _) = Scanner::new(src).scan_all();
        let statements = Parser::new(&tokens).parse().unwrap();
        let locals = Resolver::new().resolve(&statements).unwrap();

        // Only the inner `a` is local; the trailing global read has no entry.
        assert_eq!(locals.len(), 1);
        assert_eq!(locals.values().copied().collect::<Vec<_>>(), vec![2]);
    }
}
