//! Centralised error hierarchy for the **Rox interpreter**.
//!
//! All subsystems (scanner, parser, resolver, runtime, CLI) convert their
//! internal failure modes into one of the variants defined here.  This gives
//! a uniform `Result<T>` alias throughout the crate and ergonomic
//! inter‑operation with `anyhow` in the binary, while still preserving the
//! line (and, for static errors, the offending lexeme) for diagnostics.
//!
//! Static errors (lex / parse / resolve) and runtime errors are disjoint:
//! the driver maps them to distinct process exit codes via [`LoxError::exit_code`].
//!
//! The module **does not** print diagnostics itself.

use std::io;
use thiserror::Error;

use log::info;

use crate::token::{Token, TokenType};

/// Exit code for runs rejected before execution (lex, parse, resolve).
pub const EXIT_STATIC_ERROR: i32 = 65;

/// Exit code for runs aborted by a runtime error.
pub const EXIT_RUNTIME_ERROR: i32 = 70;

/// Exit code for unreadable input.
pub const EXIT_IO_ERROR: i32 = 74;

/// Canonical error type used throughout the interpreter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoxError {
    /// Lexical (scanner) error with source line information.
    #[error("[line {line}] Error: {message}")]
    Lex {
        /// Human‑readable description.
        message: String,

        /// 1‑based line where the error occurred.
        line: usize,
    },

    /// Syntactic (parser) error.
    #[error("[line {line}] Error{location}: {message}")]
    Parse {
        message: String,
        line: usize,
        /// ` at 'lexeme'`, ` at end`, or empty.
        location: String,
    },

    /// Static‑analysis failure found by the resolver.
    #[error("[line {line}] Error{location}: {message}")]
    Resolve {
        message: String,
        line: usize,
        location: String,
    },

    /// Runtime evaluation error.  Aborts the rest of the run.
    #[error("{message}\n[line {line}]")]
    Runtime { message: String, line: usize },

    /// Wrapper around `std::io::Error` (transparent).  Enables `?` on I/O ops.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// UTF‑8 decoding failure when ingesting external text.
    #[error(transparent)]
    Utf8(#[from] std::str::Utf8Error),
}

impl LoxError {
    /// Helper constructor for the **scanner**.
    pub fn lex<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Lex error: line={}, msg={}", line, message);

        LoxError::Lex { message, line }
    }

    /// Helper constructor for the **parser**.
    pub fn parse<S: Into<String>>(token: &Token<'_>, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Parse error: line={}, msg={}", token.line, message);

        LoxError::Parse {
            message,
            line: token.line,
            location: location_of(token),
        }
    }

    /// Helper constructor for the **resolver**.
    pub fn resolve<S: Into<String>>(token: &Token<'_>, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Resolve error: line={}, msg={}", token.line, message);

        LoxError::Resolve {
            message,
            line: token.line,
            location: location_of(token),
        }
    }

    /// Helper constructor for the **interpreter**.  The token only supplies
    /// the line; the message is expected to name the identifier if any.
    pub fn runtime<S: Into<String>>(token: &Token<'_>, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Runtime error: line={}, msg={}", token.line, message);

        LoxError::Runtime {
            message,
            line: token.line,
        }
    }

    /// `true` for errors detected before any statement runs.
    pub fn is_static(&self) -> bool {
        matches!(
            self,
            LoxError::Lex { .. } | LoxError::Parse { .. } | LoxError::Resolve { .. }
        )
    }

    /// Process exit code expected by callers for this class of failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoxError::Runtime { .. } => EXIT_RUNTIME_ERROR,
            LoxError::Io(_) | LoxError::Utf8(_) => EXIT_IO_ERROR,
            _ => EXIT_STATIC_ERROR,
        }
    }

    /// The bare message, without line decoration.
    pub fn message(&self) -> String {
        match self {
            LoxError::Lex { message, .. }
            | LoxError::Parse { message, .. }
            | LoxError::Resolve { message, .. }
            | LoxError::Runtime { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

fn location_of(token: &Token<'_>) -> String {
    if token.token_type == TokenType::EOF {
        " at end".to_string()
    } else {
        format!(" at '{}'", token.lexeme)
    }
}

/// Crate‑wide `Result` alias.
pub type Result<T> = std::result::Result<T, LoxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_errors_render_location() {
        let tok = Token::new(TokenType::IDENTIFIER, "a", 3);
        let err = LoxError::resolve(&tok, "Already a variable with this name in this scope.");

        assert_eq!(
            err.to_string(),
            "[line 3] Error at 'a': Already a variable with this name in this scope."
        );
        assert!(err.is_static());
        assert_eq!(err.exit_code(), EXIT_STATIC_ERROR);
    }

    #[test]
    fn eof_location_reads_at_end() {
        let tok = Token::new(TokenType::EOF, "", 9);
        let err = LoxError::parse(&tok, "Expect expression.");

        assert_eq!(err.to_string(), "[line 9] Error at end: Expect expression.");
    }

    #[test]
    fn runtime_errors_exit_with_70() {
        let tok = Token::new(TokenType::PLUS, "+", 1);
        let err = LoxError::runtime(&tok, "Operands must be two numbers or two strings.");

        assert!(!err.is_static());
        assert_eq!(err.exit_code(), EXIT_RUNTIME_ERROR);
        assert_eq!(
            err.to_string(),
            "Operands must be two numbers or two strings.\n[line 1]"
        );
    }
}
