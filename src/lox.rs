//! Driver facade: scan → parse → resolve → interpret.
//!
//! Every stage reports *all* of its errors before the pipeline stops.  A
//! program with any static error is never executed; a runtime error aborts
//! the run at the offending statement.

use std::io::{self, Write};

use log::{debug, info};

use crate::error::{LoxError, EXIT_STATIC_ERROR};
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::resolver::Resolver;
use crate::scanner::Scanner;
use crate::token::Token;

pub type Errors = Vec<LoxError>;

/// Run a whole program, writing `print` output to `out`.
pub fn run_source<W: Write>(source: &str, out: W) -> Result<(), Errors> {
    info!("Running program ({} bytes)", source.len());

    let (tokens, mut errors) = Scanner::new(source).scan_all();

    let mut interpreter = Interpreter::with_output(out);
    run_tokens(&tokens, &mut interpreter, &mut errors)
}

/// Process exit code for a failed run: the first error decides.
pub fn exit_code(errors: &[LoxError]) -> i32 {
    errors
        .first()
        .map_or(EXIT_STATIC_ERROR, LoxError::exit_code)
}

fn run_tokens<'a>(
    tokens: &'a [Token<'a>],
    interpreter: &mut Interpreter<'a>,
    errors: &mut Errors,
) -> Result<(), Errors> {
    let statements = match Parser::new(tokens).parse() {
        Ok(statements) => statements,
        Err(parse_errors) => {
            errors.extend(parse_errors);
            return Err(std::mem::take(errors));
        }
    };

    // Lexical errors still let the parser report its own, but block the rest.
    if !errors.is_empty() {
        return Err(std::mem::take(errors));
    }

    let locals = Resolver::new().resolve(&statements)?;
    debug!("Resolved {} local binding(s)", locals.len());

    interpreter.add_locals(locals);
    interpreter.interpret(&statements).map_err(|e| vec![e])
}

/// An interactive session: one interpreter kept alive across lines, so
/// globals, functions and classes defined earlier stay visible.
pub struct Session {
    interpreter: Interpreter<'static>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_output(io::stdout())
    }

    pub fn with_output<W: Write + 'static>(out: W) -> Self {
        info!("Starting REPL session");
        Self {
            interpreter: Interpreter::with_output(out),
        }
    }

    /// Run one line of input.  Errors are returned for the caller to
    /// report; the session stays usable afterwards.
    pub fn run_line(&mut self, line: &str) -> Result<(), Errors> {
        // Leaked on purpose: closures created by this line borrow its tokens
        // and may be called from any later line.  Together with the
        // interpreter's binding table this grows for the whole session,
        // which is accepted for interactive use (see "REPL lifetime" in
        // DESIGN.md).
        let source: &'static str = Box::leak(line.to_owned().into_boxed_str());
        let (tokens, mut errors) = Scanner::new(source).scan_all();
        let tokens: &'static [Token<'static>] = Box::leak(tokens.into_boxed_slice());

        run_tokens(tokens, &mut self.interpreter, &mut errors)
    }
}
