use rlox as lox;

use lox::ast_printer::AstPrinter;
use lox::error::ErrorReporter;
use lox::expr::Expr;
use lox::parser::Parser;
use lox::scanner::Scanner;
use lox::stmt::Stmt;
use lox::token::Token;

fn parse_source(source: &str) -> (Vec<Stmt>, ErrorReporter) {
    let tokens: Vec<Token> = Scanner::new(source)
        .filter_map(Result::ok)
        .collect();

    let mut reporter = ErrorReporter::new();
    let statements = Parser::new(tokens, &mut reporter).parse();

    (statements, reporter)
}

/// Parse a single expression statement and hand back its expression.
fn parse_expr(source: &str) -> Expr {
    let (mut statements, reporter) = parse_source(source);

    assert!(
        !reporter.had_error(),
        "parse errors: {:?}",
        reporter.diagnostics()
    );
    assert_eq!(statements.len(), 1);

    match statements.remove(0) {
        Stmt::Expression(expr) => expr,
        other => panic!("expected an expression statement, got {:?}", other),
    }
}

#[test]
fn test_printer_precedence() {
    let expr = parse_expr("1 + 2 * 3;");
    assert_eq!(AstPrinter::print(&expr), "(+ 1.0 (* 2.0 3.0))");
}

#[test]
fn test_printer_grouping_and_unary() {
    let expr = parse_expr("(1 + 2) * -3;");
    assert_eq!(AstPrinter::print(&expr), "(* (group (+ 1.0 2.0)) (- 3.0))");
}

#[test]
fn test_printer_logical_and_comparison() {
    let expr = parse_expr("a < 1 or b >= 2 and !c;");
    assert_eq!(AstPrinter::print(&expr), "(or (< a 1.0) (and (>= b 2.0) (! c)))");
}

#[test]
fn test_printer_fractional_number() {
    let expr = parse_expr("3.14;");
    assert_eq!(AstPrinter::print(&expr), "3.14");
}

#[test]
fn test_printer_call_and_properties() {
    let expr = parse_expr("object.field.method(1, x);");
    assert_eq!(
        AstPrinter::print(&expr),
        "(call (. (. object field) method) 1.0 x)"
    );
}

#[test]
fn test_printer_assignment_shapes() {
    let assign = parse_expr("name = 1;");
    assert_eq!(AstPrinter::print(&assign), "(= name 1.0)");

    let set = parse_expr("object.field = 1;");
    assert_eq!(AstPrinter::print(&set), "(= (. object field) 1.0)");
}

#[test]
fn test_printer_is_deterministic() {
    for source in ["1 + 2 * 3;", "a.b(c).d = e or f;", "super.method(this);"] {
        // `super`/`this` only pass the resolver inside classes, but they
        // parse anywhere; the printer only needs the tree.
        let (stmts_a, _) = parse_source(source);
        let (stmts_b, _) = parse_source(source);

        let exprs = |stmts: &[Stmt]| match &stmts[0] {
            Stmt::Expression(expr) => AstPrinter::print(expr),
            other => panic!("unexpected statement {:?}", other),
        };

        assert_eq!(exprs(&stmts_a), exprs(&stmts_b), "source {:?}", source);
    }
}

#[test]
fn test_variable_reference_ids_are_unique() {
    let (statements, _) = parse_source("a + a + a;");

    let mut ids: Vec<usize> = Vec::new();

    fn collect_ids(expr: &Expr, ids: &mut Vec<usize>) {
        match expr {
            Expr::Variable { id, .. } => ids.push(*id),
            Expr::Binary { left, right, .. } => {
                collect_ids(left, ids);
                collect_ids(right, ids);
            }
            _ => {}
        }
    }

    if let Stmt::Expression(expr) = &statements[0] {
        collect_ids(expr, &mut ids);
    }

    assert_eq!(ids.len(), 3);
    ids.dedup();
    assert_eq!(ids.len(), 3, "structurally equal references must stay distinct");
}

#[test]
fn test_for_desugars_into_while() {
    let (statements, reporter) = parse_source("for (var i = 0; i < 3; i = i + 1) print i;");

    assert!(!reporter.had_error());
    assert_eq!(statements.len(), 1);

    // { var i; while (cond) { print i; i = i + 1; } }
    let outer = match &statements[0] {
        Stmt::Block(stmts) => stmts,
        other => panic!("expected enclosing block, got {:?}", other),
    };

    assert!(matches!(outer[0], Stmt::Var { .. }));

    let body = match &outer[1] {
        Stmt::While { body, .. } => body,
        other => panic!("expected while, got {:?}", other),
    };

    match body.as_ref() {
        Stmt::Block(inner) => {
            assert!(matches!(inner[0], Stmt::Print(_)));
            assert!(matches!(inner[1], Stmt::Expression(Expr::Assign { .. })));
        }
        other => panic!("expected body block, got {:?}", other),
    }
}

#[test]
fn test_for_without_clauses() {
    let (statements, reporter) = parse_source("for (;;) print 1;");

    assert!(!reporter.had_error());

    // No initializer means no enclosing block; the condition is literal true.
    match &statements[0] {
        Stmt::While { condition, .. } => {
            assert_eq!(AstPrinter::print(condition), "true");
        }
        other => panic!("expected bare while, got {:?}", other),
    }
}

#[test]
fn test_invalid_assignment_target_reports_but_continues() {
    let (statements, reporter) = parse_source("1 = 2; print 3;");

    assert!(reporter.had_error());
    assert!(reporter
        .diagnostics()
        .iter()
        .any(|d| d.contains("Invalid assignment target.")));

    // Both statements still parsed.
    assert_eq!(statements.len(), 2);
}

#[test]
fn test_synchronization_recovers_at_statement_boundary() {
    let (statements, reporter) = parse_source("var 1 = 2; print 3;");

    assert!(reporter.had_error());
    assert!(reporter
        .diagnostics()
        .iter()
        .any(|d| d.contains("Expect variable name.")));

    // The bad declaration is dropped; the next one survives.
    assert_eq!(statements.len(), 1);
    assert!(matches!(statements[0], Stmt::Print(_)));
}

#[test]
fn test_error_at_end() {
    let (_, reporter) = parse_source("print 1");

    assert!(reporter.had_error());
    assert!(reporter
        .diagnostics()
        .iter()
        .any(|d| d.contains("Error at end: Expect ';' after value.")));
}

#[test]
fn test_error_location_names_the_lexeme() {
    let (_, reporter) = parse_source("print (1;");

    assert!(reporter.had_error());
    assert!(reporter
        .diagnostics()
        .iter()
        .any(|d| d.contains("Error at ';': Expect ')' after expression.")));
}

#[test]
fn test_class_declaration_shape() {
    let (statements, reporter) =
        parse_source("class Child < Parent { init(n) { this.n = n; } get() { return this.n; } }");

    assert!(!reporter.had_error(), "{:?}", reporter.diagnostics());

    match &statements[0] {
        Stmt::Class {
            name,
            superclass,
            methods,
        } => {
            assert_eq!(name.lexeme, "Child");
            assert!(matches!(superclass, Some(Expr::Variable { .. })));
            assert_eq!(methods.len(), 2);
            assert_eq!(methods[0].name.lexeme, "init");
            assert_eq!(methods[0].params.len(), 1);
        }
        other => panic!("expected class declaration, got {:?}", other),
    }
}
