//! Static resolution pass for the Lox interpreter.
//!
//! This module performs a single AST walk to:
//! 1. **Build lexical scopes**: maintains a stack of `HashMap<String,bool>`
//!    tracking declared (false) and fully defined (true) names in each nested
//!    block, function, or class body.
//! 2. **Enforce static rules**: reports errors such as redeclaration in the
//!    same scope, reading a variable in its own initializer, `return` outside
//!    a function, returning a value from an initializer, and illegal use of
//!    `this`/`super` outside of class bodies.
//! 3. **Record binding distances**: for every variable occurrence
//!    (`Variable`, `Assign`, `This`, `Super`), calls back into the
//!    interpreter to note the lexical depth at which the name was found.
//!    Occurrences found in no scope resolve against the globals at runtime.
//!
//! Resolution halts on the first static error; a run does not proceed to
//! evaluation if the resolver failed.
//!
//! # Usage
//!
//! After parsing, before interpretation:
//! ```ignore
//! let mut resolver = Resolver::new(&mut interpreter);
//! resolver.resolve(&statements)?;
//! ```

use std::collections::HashMap;

use log::{debug, info};

use crate::error::{LoxError, Result};
use crate::expr::Expr;
use crate::interpreter::Interpreter;
use crate::stmt::{FunctionDecl, Stmt};
use crate::token::Token;

/// What kind of function body are we inside?  Used to validate `return`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FunctionType {
    None,
    Function,
    Initializer,
    Method,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ClassType {
    /// Not inside any class
    None,

    /// Inside a class declaration _without_ a superclass
    Class,

    /// Inside a class declaration _with_ a superclass
    Subclass,
}

/// Resolver: tracks scopes, enforces static rules, and *records* binding
/// distances (locals vs. globals) by calling back into the interpreter.
pub struct Resolver<'interp> {
    interpreter: &'interp mut Interpreter,
    scopes: Vec<HashMap<String, bool>>, // false=declared, true=defined
    current_function: FunctionType,
    current_class: ClassType,
}

impl<'interp> Resolver<'interp> {
    /// Create a new resolver bound to the given interpreter.
    pub fn new(interpreter: &'interp mut Interpreter) -> Self {
        info!("Resolver instantiated");
        Resolver {
            interpreter,
            scopes: Vec::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
        }
    }

    /// Walk all top-level statements.
    pub fn resolve(&mut self, statements: &[Stmt]) -> Result<()> {
        info!(
            "Beginning resolve pass over {} statement(s)",
            statements.len()
        );
        for stmt in statements {
            self.resolve_stmt(stmt)?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statement resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Class {
                name,
                superclass,
                methods,
            } => {
                // 1. Declare & define the class name so methods can refer to it
                self.declare(name)?;
                self.define(name);

                // 2. Self-inheritance guard
                if let Some(Expr::Variable {
                    name: super_name, ..
                }) = superclass
                {
                    if super_name.lexeme == name.lexeme {
                        return Err(LoxError::resolve(
                            super_name.line,
                            "A class can't inherit from itself.",
                        ));
                    }
                }

                // 3. Save and enter the class context
                let enclosing_class: ClassType = self.current_class;

                self.current_class = if superclass.is_some() {
                    ClassType::Subclass
                } else {
                    ClassType::Class
                };

                // 4. If there is a superclass, resolve it and bind `super`
                if let Some(superclass) = superclass {
                    self.resolve_expr(superclass)?;

                    self.begin_scope();
                    self.scope_insert("super", true);
                }

                // 5. Open the implicit `this` scope for methods
                self.begin_scope();
                self.scope_insert("this", true);

                // 6. Resolve each method in its own function context
                for method in methods {
                    let kind = if method.name.lexeme == "init" {
                        FunctionType::Initializer
                    } else {
                        FunctionType::Method
                    };

                    self.resolve_function(kind, method)?;
                }

                // 7. Close the `this` scope
                self.end_scope();

                // 8. If we opened a `super` scope, close it now
                if superclass.is_some() {
                    self.end_scope();
                }

                // 9. Restore the outer class context
                self.current_class = enclosing_class;
            }

            Stmt::Block(statements) => {
                self.begin_scope();

                for s in statements {
                    self.resolve_stmt(s)?;
                }

                self.end_scope();
            }

            Stmt::Var { name, initializer } => {
                // Declare first so the initializer cannot read the name,
                // define only once the initializer has been resolved.
                self.declare(name)?;

                if let Some(expr) = initializer {
                    self.resolve_expr(expr)?;
                }

                self.define(name);
            }

            Stmt::Function(declaration) => {
                // Declare & define eagerly so the function can recurse.
                self.declare(&declaration.name)?;
                self.define(&declaration.name);

                self.resolve_function(FunctionType::Function, declaration)?;
            }

            Stmt::Expression(expr) | Stmt::Print(expr) => {
                self.resolve_expr(expr)?;
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition)?;

                self.resolve_stmt(then_branch)?;

                if let Some(eb) = else_branch.as_deref() {
                    self.resolve_stmt(eb)?;
                }
            }

            Stmt::While { condition, body } => {
                self.resolve_expr(condition)?;

                self.resolve_stmt(body)?;
            }

            Stmt::Return { keyword, value } => {
                // 1. Ensure we're inside a function, method, or initializer
                if self.current_function == FunctionType::None {
                    return Err(LoxError::resolve(
                        keyword.line,
                        "Can't return from top-level code.",
                    ));
                }

                // 2. In an initializer, only bare `return;` is allowed
                if self.current_function == FunctionType::Initializer && value.is_some() {
                    return Err(LoxError::resolve(
                        keyword.line,
                        "Can't return a value from an initializer.",
                    ));
                }

                if let Some(expr) = value {
                    self.resolve_expr(expr)?;
                }
            }
        }

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expression resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_expr(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Literal(_) => {
                // Literals have no sub-expressions.
            }

            Expr::Grouping(inner) => {
                self.resolve_expr(inner)?;
            }

            Expr::Unary { right, .. } => {
                self.resolve_expr(right)?;
            }

            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left)?;
                self.resolve_expr(right)?;
            }

            Expr::Variable { id, name } => {
                // Prevent reading a variable in its own initializer.
                if let Some(scope) = self.scopes.last() {
                    if scope.get(&name.lexeme) == Some(&false) {
                        return Err(LoxError::resolve(
                            name.line,
                            "Can't read local variable in its own initializer.",
                        ));
                    }
                }

                self.resolve_local(*id, name);
            }

            Expr::Assign { id, name, value } => {
                // Resolve the right-hand side first, then bind the target.
                self.resolve_expr(value)?;
                self.resolve_local(*id, name);
            }

            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee)?;

                for arg in arguments {
                    self.resolve_expr(arg)?;
                }
            }

            Expr::Get { object, .. } => {
                // Property names are looked up dynamically; only the object
                // expression resolves statically.
                self.resolve_expr(object)?;
            }

            Expr::Set { object, value, .. } => {
                self.resolve_expr(value)?;
                self.resolve_expr(object)?;
            }

            Expr::This { id, keyword } => {
                if self.current_class == ClassType::None {
                    return Err(LoxError::resolve(
                        keyword.line,
                        "Can't use 'this' outside of a class.",
                    ));
                }

                self.resolve_local(*id, keyword);
            }

            Expr::Super { id, keyword, .. } => {
                // 1. Disallow outside any class
                if self.current_class == ClassType::None {
                    return Err(LoxError::resolve(
                        keyword.line,
                        "Can't use 'super' outside of a class.",
                    ));
                }

                // 2. Disallow in a class with no superclass
                if self.current_class != ClassType::Subclass {
                    return Err(LoxError::resolve(
                        keyword.line,
                        "Can't use 'super' in a class with no superclass.",
                    ));
                }

                // 3. Valid. Bind 'super' like a local variable.
                self.resolve_local(*id, keyword);
            }
        }

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Function helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Enter a fresh scope for a function's parameters + body.
    ///
    /// `kind` distinguishes plain functions, methods, and initializers.
    fn resolve_function(&mut self, kind: FunctionType, function: &FunctionDecl) -> Result<()> {
        // Save the enclosing function context so we can restore it later.
        let enclosing = self.current_function;
        self.current_function = kind;

        self.begin_scope();

        for param in &function.params {
            self.declare(param)?;
            self.define(param);
        }

        for stmt in &function.body {
            self.resolve_stmt(stmt)?;
        }

        self.end_scope();

        self.current_function = enclosing;

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scope management
    // ─────────────────────────────────────────────────────────────────────────

    #[inline]
    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    #[inline]
    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn scope_insert(&mut self, name: &str, defined: bool) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), defined);
        }
    }

    fn declare(&mut self, name: &Token) -> Result<()> {
        // Global scope tolerates redeclaration; block scopes do not.
        if let Some(scope) = self.scopes.last_mut() {
            if scope.contains_key(&name.lexeme) {
                return Err(LoxError::resolve(
                    name.line,
                    "Already a variable with this name in this scope.",
                ));
            }

            scope.insert(name.lexeme.clone(), false);
        }
        Ok(())
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), true);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Binding-distance helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Record this variable occurrence as a local at the depth it was found;
    /// names found in no scope are globals and stay unrecorded.
    fn resolve_local(&mut self, id: usize, name: &Token) {
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(&name.lexeme) {
                debug!("Resolved '{}' at depth {}", name.lexeme, depth);
                self.interpreter.note_local(id, depth);
                return;
            }
        }

        debug!("Resolved '{}' as global", name.lexeme);
    }
}
