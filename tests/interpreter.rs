use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use rlox as lox;

use lox::error::ErrorReporter;
use lox::interpreter::{self, Interpreter};
use lox::runner;
use lox::value::Value;

/// `print` sink shared between the interpreter and the assertions.
#[derive(Clone)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn buffered_interpreter() -> (Interpreter, Rc<RefCell<Vec<u8>>>) {
    let buffer = Rc::new(RefCell::new(Vec::new()));
    let interpreter = Interpreter::with_output(Box::new(SharedBuf(Rc::clone(&buffer))));
    (interpreter, buffer)
}

fn run_source(source: &str) -> (String, ErrorReporter) {
    let (mut interpreter, buffer) = buffered_interpreter();
    let mut reporter = ErrorReporter::new();

    runner::run(source, &mut interpreter, &mut reporter);

    let output = String::from_utf8(buffer.borrow().clone()).expect("print output is UTF-8");
    (output, reporter)
}

fn assert_prints(source: &str, expected: &[&str]) {
    let (output, reporter) = run_source(source);

    assert!(
        !reporter.had_error() && !reporter.had_runtime_error(),
        "unexpected errors for {:?}: {:?}",
        source,
        reporter.diagnostics()
    );

    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines, expected, "stdout for {:?}", source);
}

fn assert_static_error(source: &str, fragment: &str) {
    let (_, reporter) = run_source(source);

    assert!(reporter.had_error(), "expected static error for {:?}", source);
    assert!(
        reporter.diagnostics().iter().any(|d| d.contains(fragment)),
        "no diagnostic containing {:?} in {:?}",
        fragment,
        reporter.diagnostics()
    );
}

fn assert_runtime_error(source: &str, fragment: &str) {
    let (_, reporter) = run_source(source);

    assert!(
        reporter.had_runtime_error(),
        "expected runtime error for {:?}",
        source
    );
    assert!(
        !reporter.had_error(),
        "runtime scenarios must pass the static stages: {:?}",
        reporter.diagnostics()
    );
    assert!(
        reporter.diagnostics().iter().any(|d| d.contains(fragment)),
        "no diagnostic containing {:?} in {:?}",
        fragment,
        reporter.diagnostics()
    );
}

// ─────────────────────────────────────────────────────────────────────────
// Expressions and statements
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn test_arithmetic() {
    assert_prints("print 1 + 2;", &["3"]);
}

#[test]
fn test_string_concatenation() {
    assert_prints("var a = \"foo\"; print a + \"bar\";", &["foobar"]);
}

#[test]
fn test_number_formatting() {
    assert_prints("print 4.0; print 3.14; print -1; print 10 / 4;", &["4", "3.14", "-1", "2.5"]);
}

#[test]
fn test_block_shadowing() {
    assert_prints(
        "var a = 1; { var a = 2; print a; } print a;",
        &["2", "1"],
    );
}

#[test]
fn test_global_redeclaration_is_allowed() {
    assert_prints("var a = 1; var a = 2; print a;", &["2"]);
}

#[test]
fn test_truthiness() {
    assert_prints(
        "if (0) print \"zero\"; if (\"\") print \"empty\"; if (nil) print \"bad\"; else print \"nil\";",
        &["zero", "empty", "nil"],
    );
}

#[test]
fn test_short_circuit_returns_deciding_operand() {
    // `missing` is never evaluated, or the run would die with a runtime error.
    assert_prints(
        "print \"hi\" or 2; print nil or \"yes\"; print nil and missing; print 1 and 2;",
        &["hi", "yes", "nil", "2"],
    );
}

#[test]
fn test_equality() {
    assert_prints(
        "print 1 == 1; print \"a\" == \"a\"; print nil == nil; print 1 == \"1\"; print nil == false;",
        &["true", "true", "true", "false", "false"],
    );
}

#[test]
fn test_callable_identity_equality() {
    assert_prints("fun f() {} var g = f; print f == g;", &["true"]);
}

#[test]
fn test_for_loop() {
    assert_prints(
        "var sum = 0; for (var i = 1; i <= 3; i = i + 1) sum = sum + i; print sum;",
        &["6"],
    );
}

#[test]
fn test_while_loop() {
    assert_prints(
        "var i = 0; while (i < 3) { i = i + 1; } print i;",
        &["3"],
    );
}

#[test]
fn test_assignment_is_an_expression() {
    assert_prints("var a = 1; print a = 2; print a;", &["2", "2"]);
}

// ─────────────────────────────────────────────────────────────────────────
// Functions and closures
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn test_recursion() {
    assert_prints(
        "fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } print fib(10);",
        &["55"],
    );
}

#[test]
fn test_closure_counter() {
    assert_prints(
        "fun makeCounter() { var i = 0; fun count() { i = i + 1; print i; } return count; } \
         var c = makeCounter(); c(); c();",
        &["1", "2"],
    );
}

#[test]
fn test_closures_share_their_defining_frame() {
    assert_prints(
        "var inc; var get; \
         fun setup() { var n = 0; fun i() { n = n + 1; } fun g() { print n; } inc = i; get = g; } \
         setup(); inc(); inc(); get();",
        &["2"],
    );
}

#[test]
fn test_closure_binding_is_static_not_dynamic() {
    // The classic resolver scenario: `show` keeps seeing the global `a`
    // even after a shadowing declaration appears later in the block.
    assert_prints(
        "var a = \"global\"; { fun show() { print a; } show(); var a = \"block\"; show(); }",
        &["global", "global"],
    );
}

#[test]
fn test_return_unwinds_nested_blocks_only_to_the_call() {
    assert_prints(
        "fun find() { for (var i = 0; i < 10; i = i + 1) { if (i == 3) { return i; } } } \
         print find(); print \"after\";",
        &["3", "after"],
    );
}

#[test]
fn test_function_without_return_yields_nil() {
    assert_prints("fun noop() {} print noop();", &["nil"]);
}

#[test]
fn test_value_display_for_callables() {
    assert_prints("fun f() {} print f; print clock;", &["<fn>", "<native fn>"]);
}

// ─────────────────────────────────────────────────────────────────────────
// Classes
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn test_class_init_and_method() {
    assert_prints(
        "class Greeter { init(n) { this.n = n; } hi() { print \"Hi, \" + this.n; } } \
         Greeter(\"Ada\").hi();",
        &["Hi, Ada"],
    );
}

#[test]
fn test_class_and_instance_display() {
    assert_prints("class Bagel {} print Bagel; print Bagel();", &["<class Bagel>", "<Bagel instance>"]);
}

#[test]
fn test_fields_win_over_methods() {
    assert_prints(
        "class C { name() { return \"method\"; } } \
         var c = C(); c.name = \"field\"; print c.name;",
        &["field"],
    );
}

#[test]
fn test_methods_are_inherited() {
    assert_prints(
        "class A { greet() { return \"A\"; } } class B < A {} print B().greet();",
        &["A"],
    );
}

#[test]
fn test_super_dispatch() {
    assert_prints(
        "class A { say() { print \"A\"; } } \
         class B < A { say() { super.say(); print \"B\"; } } \
         B().say();",
        &["A", "B"],
    );
}

#[test]
fn test_super_init_binds_this_to_the_subclass_instance() {
    assert_prints(
        "class A { init() { this.kind = \"A\"; } } \
         class B < A { init() { super.init(); this.sub = true; } } \
         var b = B(); print b.kind; print b.sub;",
        &["A", "true"],
    );
}

#[test]
fn test_initializer_implicitly_returns_this() {
    assert_prints(
        "class Counter { init() { this.count = 0; } } print Counter().count;",
        &["0"],
    );
}

#[test]
fn test_bare_return_in_initializer_yields_the_instance() {
    assert_prints(
        "class P { init(n) { this.n = n; if (n < 0) { return; } this.n = n * 2; } } \
         print P(-1).n; print P(3).n;",
        &["-1", "6"],
    );
}

#[test]
fn test_bound_method_remembers_its_instance() {
    assert_prints(
        "class Cake { init(f) { this.flavor = f; } taste() { print this.flavor; } } \
         var m = Cake(\"chocolate\").taste; m();",
        &["chocolate"],
    );
}

// ─────────────────────────────────────────────────────────────────────────
// Static errors
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn test_top_level_return_is_rejected() {
    assert_static_error("return 42;", "Can't return from top-level code.");
}

#[test]
fn test_initializer_cannot_return_a_value() {
    assert_static_error(
        "class F { init() { return 42; } }",
        "Can't return a value from an initializer.",
    );
}

#[test]
fn test_read_in_own_initializer() {
    assert_static_error(
        "{ var a = a; }",
        "Can't read local variable in its own initializer.",
    );
}

#[test]
fn test_redeclaration_in_block_scope() {
    assert_static_error(
        "{ var a = 1; var a = 2; }",
        "Already a variable with this name in this scope.",
    );
}

#[test]
fn test_this_outside_class() {
    assert_static_error("print this;", "Can't use 'this' outside of a class.");
}

#[test]
fn test_super_outside_class() {
    assert_static_error("print super.x;", "Can't use 'super' outside of a class.");
}

#[test]
fn test_super_without_superclass() {
    assert_static_error(
        "class Foo { m() { super.m(); } }",
        "Can't use 'super' in a class with no superclass.",
    );
}

#[test]
fn test_class_inheriting_from_itself() {
    assert_static_error("class Foo < Foo {}", "A class can't inherit from itself.");
}

#[test]
fn test_resolver_error_format() {
    let (_, reporter) = run_source("return 42;");
    assert!(reporter
        .diagnostics()
        .iter()
        .any(|d| d.starts_with("Resolver Error: ")));
}

// ─────────────────────────────────────────────────────────────────────────
// Runtime errors
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn test_plus_type_mismatch() {
    assert_runtime_error(
        "print 1 + \"x\";",
        "Operands must be two numbers or two strings.",
    );
}

#[test]
fn test_unary_minus_needs_a_number() {
    assert_runtime_error("print -\"x\";", "Operand must be a number.");
}

#[test]
fn test_division_by_zero() {
    assert_runtime_error("print 1 / 0;", "Division by zero.");
}

#[test]
fn test_undefined_variable() {
    assert_runtime_error("print missing;", "Undefined variable 'missing'.");
}

#[test]
fn test_undefined_assignment_target() {
    assert_runtime_error("missing = 1;", "Undefined variable 'missing'.");
}

#[test]
fn test_wrong_arity() {
    assert_runtime_error("clock(1);", "Expected 0 arguments but got 1.");
}

#[test]
fn test_calling_a_non_callable() {
    assert_runtime_error("\"not a function\"();", "Can only call functions and classes.");
}

#[test]
fn test_property_access_on_non_instance() {
    assert_runtime_error("print 4.foo;", "Only instances have properties.");
}

#[test]
fn test_field_set_on_non_instance() {
    assert_runtime_error("4.foo = 1;", "Only instances have fields.");
}

#[test]
fn test_undefined_property() {
    assert_runtime_error("class Empty {} print Empty().missing;", "Undefined property 'missing'.");
}

#[test]
fn test_superclass_must_be_a_class() {
    assert_runtime_error(
        "var NotAClass = \"so not a class\"; class Sub < NotAClass {}",
        "Superclass must be a class.",
    );
}

#[test]
fn test_initializer_errors_propagate() {
    assert_runtime_error(
        "class F { init() { this.x = 1 + \"boom\"; } } F();",
        "Operands must be two numbers or two strings.",
    );
}

#[test]
fn test_runtime_error_format_and_line() {
    let (_, reporter) = run_source("var a = 1;\nprint a + \"x\";");

    assert!(reporter
        .diagnostics()
        .iter()
        .any(|d| d.starts_with("[line 2] Runtime Error: ")));
}

#[test]
fn test_execution_stops_at_the_first_runtime_error() {
    let (output, reporter) = run_source("print 1; print 1 + \"x\"; print 2;");

    assert!(reporter.had_runtime_error());
    assert_eq!(output.lines().collect::<Vec<_>>(), vec!["1"]);
}

// ─────────────────────────────────────────────────────────────────────────
// Pipeline behavior
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn test_parse_errors_skip_evaluation() {
    let (output, reporter) = run_source("print 1; print ;");

    assert!(reporter.had_error());
    assert!(!reporter.had_runtime_error());
    assert_eq!(output, "", "no statement may run after a parse error");
}

#[test]
fn test_scan_errors_skip_evaluation() {
    let (output, reporter) = run_source("print 1; $");

    assert!(reporter.had_error());
    assert_eq!(output, "");
}

#[test]
fn test_repl_state_persists_across_runs() {
    let (mut interpreter, buffer) = buffered_interpreter();
    let mut reporter = ErrorReporter::new();

    runner::run("var a = 1; fun bump() { a = a + 1; }", &mut interpreter, &mut reporter);
    reporter.reset();

    runner::run("bump(); print a;", &mut interpreter, &mut reporter);

    assert!(!reporter.had_error() && !reporter.had_runtime_error());

    let output = String::from_utf8(buffer.borrow().clone()).unwrap();
    assert_eq!(output, "2\n");
}

#[test]
fn test_repl_error_flags_reset_between_lines() {
    let (mut interpreter, _buffer) = buffered_interpreter();
    let mut reporter = ErrorReporter::new();

    runner::run("print missing;", &mut interpreter, &mut reporter);
    assert!(reporter.had_runtime_error());

    reporter.reset();
    assert!(!reporter.had_runtime_error());

    runner::run("print 1;", &mut interpreter, &mut reporter);
    assert!(!reporter.had_error() && !reporter.had_runtime_error());
}

#[test]
fn test_clock_returns_a_number() {
    // Drive the native through the evaluator rather than poking at it.
    assert_prints("print clock() >= 0;", &["true"]);
}

#[test]
fn test_truthiness_helper() {
    assert!(!interpreter::is_truthy(&Value::Nil));
    assert!(!interpreter::is_truthy(&Value::Bool(false)));
    assert!(interpreter::is_truthy(&Value::Bool(true)));
    assert!(interpreter::is_truthy(&Value::Number(0.0)));
    assert!(interpreter::is_truthy(&Value::String(String::new())));
}
