use std::fs;
use std::io::{self, Write};
use std::path::Path;

use log::{debug, info};

use crate::error::{ErrorReporter, Result};
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::resolver::Resolver;
use crate::scanner::Scanner;
use crate::stmt::Stmt;
use crate::token::Token;

/// Run one chunk of source through the full pipeline.
///
/// Each stage runs to completion before the next; a stage that produced any
/// diagnostic stops the run. Diagnostics and severity flags accumulate in
/// `reporter`; `interpreter` keeps its globals, so REPL lines share state.
pub fn run(source: &str, interpreter: &mut Interpreter, reporter: &mut ErrorReporter) {
    // Scan
    let scanner = Scanner::new(source);
    let mut tokens: Vec<Token> = Vec::new();

    for result in scanner {
        match result {
            Ok(token) => tokens.push(token),

            Err(error) => reporter.report(&error),
        }
    }

    if reporter.had_error() {
        debug!("Scan errors; skipping parse");
        return;
    }

    // Parse
    let mut parser = Parser::with_first_id(tokens, reporter, interpreter.expr_id_floor());
    let statements: Vec<Stmt> = parser.parse();
    let watermark: usize = parser.id_watermark();

    interpreter.raise_expr_id_floor(watermark);

    if reporter.had_error() {
        debug!("Parse errors; skipping resolution");
        return;
    }

    // Resolve
    let mut resolver = Resolver::new(interpreter);

    if let Err(error) = resolver.resolve(&statements) {
        reporter.report(&error);
        return;
    }

    // Evaluate
    if let Err(error) = interpreter.interpret(&statements) {
        reporter.report(&error);
    }
}

/// Execute a script file. Returns the process exit code: 0 on success, 65
/// after a static error, 70 after a runtime error (static wins).
pub fn run_file(path: &Path) -> Result<i32> {
    info!("Running file {}", path.display());

    let source: String = fs::read_to_string(path)?;

    let mut interpreter = Interpreter::new();
    let mut reporter = ErrorReporter::new();

    run(&source, &mut interpreter, &mut reporter);

    if reporter.had_error() {
        return Ok(65);
    }

    if reporter.had_runtime_error() {
        return Ok(70);
    }

    Ok(0)
}

/// Interactive prompt. One line per read; globals persist across lines and
/// the error flags reset after each one. EOF prints a newline and returns.
pub fn run_prompt() -> Result<()> {
    info!("Starting REPL");

    let mut interpreter = Interpreter::new();
    let mut reporter = ErrorReporter::new();

    let stdin = io::stdin();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        let bytes_read: usize = stdin.read_line(&mut line)?;

        if bytes_read == 0 {
            println!();
            break;
        }

        let line: &str = line.trim_end_matches(|c| c == '\r' || c == '\n');

        run(line, &mut interpreter, &mut reporter);

        reporter.reset();
    }

    Ok(())
}
