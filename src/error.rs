//! Centralised error hierarchy for the **Lox interpreter**.
//!
//! All subsystems (scanner, parser, resolver, runtime, CLI) must convert their
//! internal failure modes into one of the variants defined here.  This enables a
//! uniform `Result<T>` alias throughout the crate and ergonomic inter-operation
//! with `anyhow`, while still preserving rich diagnostic detail.
//!
//! The variants' `Display` impls are the exact diagnostic lines a user sees;
//! printing them (and tracking whether anything went wrong) is the job of the
//! [`ErrorReporter`] sink, not of this type.

use std::io;

use log::info;
use thiserror::Error;

use crate::token::{Token, TokenType};

/// Canonical error type used throughout the interpreter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoxError {
    /// Lexical (scanner) error with source line information.
    #[error("[line {line}] Error: {message}")]
    Lex {
        /// Human-readable description.
        message: String,

        /// 1-based line where the error occurred.
        line: usize,
    },

    /// Syntactic (parser) error. `location` is `" at end"` for EOF or
    /// `" at 'lexeme'"` otherwise.
    #[error("[line {line}] Error{location}: {message}")]
    Parse {
        message: String,
        location: String,
        line: usize,
    },

    /// Static-analysis or resolution failure (e.g. early-binding errors).
    #[error("Resolver Error: {message}")]
    Resolve { message: String, line: usize },

    /// Runtime evaluation error.
    #[error("[line {line}] Runtime Error: {message}")]
    Runtime { message: String, line: usize },

    /// Wrapper around `std::io::Error` (transparent).  Enables `?` on I/O ops.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// UTF-8 decoding failure when ingesting external text.
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl LoxError {
    /// Helper constructor for the **scanner**.
    pub fn lex<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Lex error: line={}, msg={}", line, message);

        LoxError::Lex { message, line }
    }

    /// Helper constructor for the **parser**. The offending token supplies
    /// both the line and the `at ...` location suffix.
    pub fn parse<S: Into<String>>(token: &Token, msg: S) -> Self {
        let message: String = msg.into();

        let location: String = if token.token_type == TokenType::EOF {
            " at end".to_string()
        } else {
            format!(" at '{}'", token.lexeme)
        };

        info!(
            "Creating Parse error: line={}, loc={}, msg={}",
            token.line, location, message
        );

        LoxError::Parse {
            message,
            location,
            line: token.line,
        }
    }

    /// Helper constructor for the **resolver**.
    pub fn resolve<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Resolve error: line={}, msg={}", line, message);

        LoxError::Resolve { message, line }
    }

    /// Helper constructor for the **runtime**.
    pub fn runtime<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Runtime error: line={}, msg={}", line, message);

        LoxError::Runtime { message, line }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, LoxError>;

/// Diagnostic sink shared by every pipeline stage.
///
/// Each reported error is written to stderr exactly once and recorded, and
/// one of the two severity flags is raised. The runner queries the flags at
/// stage boundaries; the REPL calls [`ErrorReporter::reset`] between lines.
#[derive(Debug, Default)]
pub struct ErrorReporter {
    had_error: bool,
    had_runtime_error: bool,
    diagnostics: Vec<String>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, error: &LoxError) {
        let rendered: String = error.to_string();

        eprintln!("{}", rendered);

        match error {
            LoxError::Runtime { .. } => self.had_runtime_error = true,

            _ => self.had_error = true,
        }

        self.diagnostics.push(rendered);
    }

    pub fn had_error(&self) -> bool {
        self.had_error
    }

    pub fn had_runtime_error(&self) -> bool {
        self.had_runtime_error
    }

    /// Every diagnostic line reported so far, in order.
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn reset(&mut self) {
        self.had_error = false;
        self.had_runtime_error = false;
        self.diagnostics.clear();
    }
}
