//! Abstract syntax tree shared by the parser, resolver and interpreter.
//!
//! Both node families are closed sum types; the resolver and the interpreter
//! each match them exhaustively.  Nodes borrow their tokens from the scanned
//! token slice, so the tree lives no longer than the source it came from.

use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::token::Token;

static NEXT_EXPR_ID: AtomicUsize = AtomicUsize::new(0);

/// Identity of a variable‑reference node (`Variable`, `Assign`, `This`,
/// `Super`).  The resolver's binding table is keyed by it, so two textually
/// identical references in different places never share a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(usize);

impl ExprId {
    /// Allocate an id never handed out before in this process.
    pub fn fresh() -> Self {
        ExprId(NEXT_EXPR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A **literal constant** that appears directly in the source code.
///
/// These are the terminal leaves of the expression tree; the parser copies
/// the value out of the token.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    /// IEEE‑754 double.  `"3"` is stored as `3.0`.
    Number(f64),

    /// String literal without surrounding quotes.
    Str(String),

    True,
    False,
    Nil,
}

/// Every kind of *expression*.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr<'a> {
    /// Number, string, `true`, `false`, or `nil`.
    Literal(LiteralValue),

    /// Prefix operator: `!ready`, `-42`.
    Unary {
        operator: &'a Token<'a>,
        right: Box<Expr<'a>>,
    },

    /// Arithmetic, comparison and equality operators.
    Binary {
        left: Box<Expr<'a>>,
        operator: &'a Token<'a>,
        right: Box<Expr<'a>>,
    },

    /// `"(" expression ")"`.
    Grouping(Box<Expr<'a>>),

    /// Read of a named variable.
    Variable { id: ExprId, name: &'a Token<'a> },

    /// `identifier "=" expression`.
    Assign {
        id: ExprId,
        name: &'a Token<'a>,
        value: Box<Expr<'a>>,
    },

    /// Short‑circuiting `and` / `or`.
    Logical {
        left: Box<Expr<'a>>,
        operator: &'a Token<'a>,
        right: Box<Expr<'a>>,
    },

    /// `callee(arguments…)`.
    Call {
        callee: Box<Expr<'a>>,
        /// The closing `)`, kept for error reporting.
        paren: &'a Token<'a>,
        arguments: Vec<Expr<'a>>,
    },

    /// `object.name`
    Get {
        object: Box<Expr<'a>>,
        name: &'a Token<'a>,
    },

    /// `object.name = value`
    Set {
        object: Box<Expr<'a>>,
        name: &'a Token<'a>,
        value: Box<Expr<'a>>,
    },

    /// `super.method`
    Super {
        id: ExprId,
        keyword: &'a Token<'a>,
        method: &'a Token<'a>,
    },

    /// `this` inside a method.
    This { id: ExprId, keyword: &'a Token<'a> },
}

/// A function or method declaration.  Shared (`Rc`) between the tree and
/// every closure created from it.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl<'a> {
    pub name: &'a Token<'a>,

    /// Parameter names, at most 255.
    pub params: Vec<&'a Token<'a>>,

    pub body: Vec<Stmt<'a>>,
}

/// Every kind of *statement*.  A program is a `Vec<Stmt>`.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt<'a> {
    /// Stand‑alone expression terminated by a semicolon.
    Expression(Expr<'a>),

    Print(Expr<'a>),

    /// `"var" IDENT ("=" initializer)? ";"`.
    Var {
        name: &'a Token<'a>,
        initializer: Option<Expr<'a>>,
    },

    /// Braced scope.
    Block(Vec<Stmt<'a>>),

    If {
        condition: Expr<'a>,
        then_branch: Box<Stmt<'a>>,
        else_branch: Option<Box<Stmt<'a>>>,
    },

    /// `while` loop; `for` loops are desugared into this by the parser.
    While {
        condition: Expr<'a>,
        body: Box<Stmt<'a>>,
    },

    Function(Rc<FunctionDecl<'a>>),

    Return {
        /// The `return` keyword, for error locations.
        keyword: &'a Token<'a>,

        /// Absent ⇒ `nil` is returned.
        value: Option<Expr<'a>>,
    },

    Class {
        name: &'a Token<'a>,

        /// Always an `Expr::Variable` when present.
        superclass: Option<Expr<'a>>,

        methods: Vec<Rc<FunctionDecl<'a>>>,
    },
}
