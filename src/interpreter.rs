use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};

use crate::environment::Environment;
use crate::error::{LoxError, Result};
use crate::expr::Expr;
use crate::stmt::{FunctionDecl, Stmt};
use crate::token::{Token, TokenType};
use crate::value::{LoxClass, LoxFunction, LoxInstance, Value};

/// Out-of-band unwinding through the evaluation stack.
///
/// `Return` is control flow, not failure: it is raised by a `return`
/// statement and intercepted at the nearest function-call boundary.
/// `Error` is a genuine runtime error and unwinds all the way to
/// [`Interpreter::interpret`].
#[derive(Debug)]
pub enum Unwind {
    Return(Value),
    Error(LoxError),
}

impl From<LoxError> for Unwind {
    fn from(error: LoxError) -> Self {
        Unwind::Error(error)
    }
}

impl From<io::Error> for Unwind {
    fn from(error: io::Error) -> Self {
        Unwind::Error(LoxError::Io(error))
    }
}

pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    locals: HashMap<usize, usize>,
    expr_id_floor: usize,
    output: Box<dyn Write>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// Build an interpreter whose `print` statements write to the given
    /// sink instead of stdout.
    pub fn with_output(output: Box<dyn Write>) -> Self {
        let globals = Rc::new(RefCell::new(Environment::new()));

        globals.borrow_mut().define(
            "clock",
            Value::NativeFunction {
                name: "clock",
                arity: 0,
                func: clock_native,
            },
        );

        Interpreter {
            environment: globals.clone(),
            globals,
            locals: HashMap::new(),
            expr_id_floor: 0,
            output,
        }
    }

    /// Lowest expression id a new parse feeding this interpreter may mint.
    ///
    /// Closures defined on earlier REPL lines keep their distance entries in
    /// `locals`, so a later parse must not reuse their ids.
    pub fn expr_id_floor(&self) -> usize {
        self.expr_id_floor
    }

    pub fn raise_expr_id_floor(&mut self, floor: usize) {
        self.expr_id_floor = self.expr_id_floor.max(floor);
    }

    /// Resolver callback: variable reference `id` was found `depth` scopes
    /// out. References without an entry resolve against the globals.
    pub fn note_local(&mut self, id: usize, depth: usize) {
        self.locals.insert(id, depth);
    }

    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<()> {
        info!("Interpreting {} statement(s)", statements.len());

        for statement in statements {
            match self.execute(statement) {
                Ok(()) => {}

                Err(Unwind::Error(error)) => return Err(error),

                // The resolver rejects top-level `return`.
                Err(Unwind::Return(_)) => break,
            }
        }

        Ok(())
    }

    pub fn execute(&mut self, stmt: &Stmt) -> std::result::Result<(), Unwind> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;

                Ok(())
            }

            Stmt::Print(expr) => {
                let value = self.evaluate(expr)?;

                writeln!(self.output, "{}", value)?;

                Ok(())
            }

            Stmt::Var { name, initializer } => {
                let value: Value = if let Some(expr) = initializer {
                    self.evaluate(expr)?
                } else {
                    Value::Nil
                };

                self.environment.borrow_mut().define(&name.lexeme, value);

                Ok(())
            }

            Stmt::Block(statements) => {
                let environment =
                    Environment::with_enclosing(self.environment.clone());

                self.execute_block(statements, Rc::new(RefCell::new(environment)))
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if is_truthy(&self.evaluate(condition)?) {
                    self.execute(then_branch)?;
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)?;
                }

                Ok(())
            }

            Stmt::While { condition, body } => {
                while is_truthy(&self.evaluate(condition)?) {
                    self.execute(body)?;
                }

                Ok(())
            }

            Stmt::Function(declaration) => {
                let function = LoxFunction::new(
                    Rc::clone(declaration),
                    self.environment.clone(),
                    false,
                );

                self.environment
                    .borrow_mut()
                    .define(&declaration.name.lexeme, Value::Function(Rc::new(function)));

                Ok(())
            }

            Stmt::Return { value, .. } => {
                let value: Value = if let Some(expr) = value {
                    self.evaluate(expr)?
                } else {
                    Value::Nil
                };

                Err(Unwind::Return(value))
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.execute_class(name, superclass.as_ref(), methods),
        }
    }

    /// Run `statements` in `environment`, restoring the previous frame on
    /// every exit path, including unwinds.
    pub fn execute_block(
        &mut self,
        statements: &[Stmt],
        environment: Rc<RefCell<Environment>>,
    ) -> std::result::Result<(), Unwind> {
        let previous: Rc<RefCell<Environment>> = self.environment.clone();

        self.environment = environment;

        let mut result = Ok(());

        for statement in statements {
            result = self.execute(statement);

            if result.is_err() {
                break;
            }
        }

        self.environment = previous;

        result
    }

    fn execute_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<FunctionDecl>],
    ) -> std::result::Result<(), Unwind> {
        info!("Defining class '{}'", name.lexeme);

        let superclass_value: Option<Rc<LoxClass>> = match superclass {
            Some(expr) => {
                let line = match expr {
                    Expr::Variable { name, .. } => name.line,
                    _ => name.line,
                };

                match self.evaluate(expr)? {
                    Value::Class(class) => Some(class),

                    _ => {
                        return Err(Unwind::Error(LoxError::runtime(
                            line,
                            "Superclass must be a class.",
                        )))
                    }
                }
            }

            None => None,
        };

        self.environment
            .borrow_mut()
            .define(&name.lexeme, Value::Nil);

        // Methods of a subclass close over a frame binding `super`.
        let previous: Rc<RefCell<Environment>> = self.environment.clone();

        if let Some(ref sc) = superclass_value {
            let mut env = Environment::with_enclosing(self.environment.clone());
            env.define("super", Value::Class(Rc::clone(sc)));

            self.environment = Rc::new(RefCell::new(env));
        }

        let mut method_table: HashMap<String, LoxFunction> = HashMap::new();

        for method in methods {
            let is_initializer = method.name.lexeme == "init";

            let function = LoxFunction::new(
                Rc::clone(method),
                self.environment.clone(),
                is_initializer,
            );

            method_table.insert(method.name.lexeme.clone(), function);
        }

        let class = LoxClass::new(name.lexeme.clone(), superclass_value, method_table);

        self.environment = previous;

        self.environment.borrow_mut().assign(
            &name.lexeme,
            Value::Class(Rc::new(class)),
            name.line,
        )?;

        Ok(())
    }

    pub fn evaluate(&mut self, expr: &Expr) -> std::result::Result<Value, Unwind> {
        match expr {
            Expr::Literal(token) => Ok(self.evaluate_literal(token)?),

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Unary { operator, right } => self.evaluate_unary(operator, right),

            Expr::Binary {
                left,
                operator,
                right,
            } => self.evaluate_binary(left, operator, right),

            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left_val: Value = self.evaluate(left)?;

                // Short-circuit: yield the operand that decided the result.
                if operator.token_type == TokenType::OR {
                    if is_truthy(&left_val) {
                        return Ok(left_val);
                    }
                } else if !is_truthy(&left_val) {
                    return Ok(left_val);
                }

                self.evaluate(right)
            }

            Expr::Variable { id, name } => Ok(self.look_up_variable(name, *id)?),

            Expr::Assign { id, name, value } => {
                let value: Value = self.evaluate(value)?;

                if let Some(&distance) = self.locals.get(id) {
                    Environment::assign_at(
                        &self.environment,
                        distance,
                        &name.lexeme,
                        value.clone(),
                        name.line,
                    )?;
                } else {
                    self.globals
                        .borrow_mut()
                        .assign(&name.lexeme, value.clone(), name.line)?;
                }

                Ok(value)
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => self.evaluate_call(callee, paren, arguments),

            Expr::Get { object, name } => match self.evaluate(object)? {
                Value::Instance(instance) => Ok(LoxInstance::get(&instance, name)?),

                _ => Err(Unwind::Error(LoxError::runtime(
                    name.line,
                    "Only instances have properties.",
                ))),
            },

            Expr::Set {
                object,
                name,
                value,
            } => match self.evaluate(object)? {
                Value::Instance(instance) => {
                    let value: Value = self.evaluate(value)?;

                    instance.borrow_mut().set(name, value.clone());

                    Ok(value)
                }

                _ => Err(Unwind::Error(LoxError::runtime(
                    name.line,
                    "Only instances have fields.",
                ))),
            },

            Expr::This { id, keyword } => Ok(self.look_up_variable(keyword, *id)?),

            Expr::Super {
                id,
                keyword,
                method,
            } => Ok(self.evaluate_super(*id, keyword, method)?),
        }
    }

    fn evaluate_literal(&self, token: &Token) -> Result<Value> {
        match &token.token_type {
            TokenType::NUMBER(n) => Ok(Value::Number(*n)),

            TokenType::STRING(s) => Ok(Value::String(s.clone())),

            TokenType::TRUE => Ok(Value::Bool(true)),

            TokenType::FALSE => Ok(Value::Bool(false)),

            TokenType::NIL => Ok(Value::Nil),

            _ => Err(LoxError::runtime(token.line, "Invalid literal.")),
        }
    }

    fn evaluate_unary(
        &mut self,
        operator: &Token,
        right: &Expr,
    ) -> std::result::Result<Value, Unwind> {
        let value: Value = self.evaluate(right)?;

        match operator.token_type {
            TokenType::MINUS => match value {
                Value::Number(n) => Ok(Value::Number(-n)),

                _ => Err(Unwind::Error(LoxError::runtime(
                    operator.line,
                    "Operand must be a number.",
                ))),
            },

            TokenType::BANG => Ok(Value::Bool(!is_truthy(&value))),

            _ => Err(Unwind::Error(LoxError::runtime(
                operator.line,
                "Invalid unary operator.",
            ))),
        }
    }

    fn evaluate_binary(
        &mut self,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> std::result::Result<Value, Unwind> {
        let left_val: Value = self.evaluate(left)?;
        let right_val: Value = self.evaluate(right)?;

        match operator.token_type {
            TokenType::PLUS => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),

                (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),

                _ => Err(Unwind::Error(LoxError::runtime(
                    operator.line,
                    "Operands must be two numbers or two strings.",
                ))),
            },

            TokenType::MINUS => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a - b)),

                _ => Err(Unwind::Error(LoxError::runtime(
                    operator.line,
                    "Operands must be numbers.",
                ))),
            },

            TokenType::STAR => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a * b)),

                _ => Err(Unwind::Error(LoxError::runtime(
                    operator.line,
                    "Operands must be numbers.",
                ))),
            },

            TokenType::SLASH => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => {
                    if b == 0.0 {
                        Err(Unwind::Error(LoxError::runtime(
                            operator.line,
                            "Division by zero.",
                        )))
                    } else {
                        Ok(Value::Number(a / b))
                    }
                }

                _ => Err(Unwind::Error(LoxError::runtime(
                    operator.line,
                    "Operands must be numbers.",
                ))),
            },

            TokenType::EQUAL_EQUAL => Ok(Value::Bool(is_equal(&left_val, &right_val))),

            TokenType::BANG_EQUAL => Ok(Value::Bool(!is_equal(&left_val, &right_val))),

            TokenType::LESS => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a < b)),

                _ => Err(Unwind::Error(LoxError::runtime(
                    operator.line,
                    "Operands must be numbers.",
                ))),
            },

            TokenType::LESS_EQUAL => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a <= b)),

                _ => Err(Unwind::Error(LoxError::runtime(
                    operator.line,
                    "Operands must be numbers.",
                ))),
            },

            TokenType::GREATER => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a > b)),

                _ => Err(Unwind::Error(LoxError::runtime(
                    operator.line,
                    "Operands must be numbers.",
                ))),
            },

            TokenType::GREATER_EQUAL => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a >= b)),

                _ => Err(Unwind::Error(LoxError::runtime(
                    operator.line,
                    "Operands must be numbers.",
                ))),
            },

            _ => Err(Unwind::Error(LoxError::runtime(
                operator.line,
                "Invalid binary operator.",
            ))),
        }
    }

    fn evaluate_call(
        &mut self,
        callee: &Expr,
        paren: &Token,
        arguments: &[Expr],
    ) -> std::result::Result<Value, Unwind> {
        let callee_val: Value = self.evaluate(callee)?;

        let mut args: Vec<Value> = Vec::with_capacity(arguments.len());
        for argument in arguments {
            args.push(self.evaluate(argument)?);
        }

        match callee_val {
            Value::NativeFunction { name, arity, func } => {
                debug!("Calling native function '{}'", name);

                check_arity(arity, args.len(), paren)?;

                Ok(func(&args)?)
            }

            Value::Function(function) => {
                check_arity(function.arity(), args.len(), paren)?;

                Ok(function.call(self, args)?)
            }

            Value::Class(class) => {
                check_arity(class.arity(), args.len(), paren)?;

                Ok(LoxClass::call(&class, self, args)?)
            }

            _ => Err(Unwind::Error(LoxError::runtime(
                paren.line,
                "Can only call functions and classes.",
            ))),
        }
    }

    fn evaluate_super(&mut self, id: usize, keyword: &Token, method: &Token) -> Result<Value> {
        let distance: usize = match self.locals.get(&id) {
            Some(&distance) => distance,

            None => {
                return Err(LoxError::runtime(
                    keyword.line,
                    "Undefined 'super' expression.",
                ))
            }
        };

        let superclass = match Environment::get_at(
            &self.environment,
            distance,
            "super",
            keyword.line,
        )? {
            Value::Class(class) => class,

            _ => {
                return Err(LoxError::runtime(
                    keyword.line,
                    "Superclass must be a class.",
                ))
            }
        };

        // `this` always lives one frame nearer than `super`.
        let object = match Environment::get_at(
            &self.environment,
            distance - 1,
            "this",
            keyword.line,
        )? {
            Value::Instance(instance) => instance,

            _ => {
                return Err(LoxError::runtime(
                    keyword.line,
                    "Only instances have methods.",
                ))
            }
        };

        match superclass.find_method(&method.lexeme) {
            Some(found) => Ok(Value::Function(Rc::new(found.bind(&object)))),

            None => Err(LoxError::runtime(
                method.line,
                format!("Undefined property '{}'.", method.lexeme),
            )),
        }
    }

    fn look_up_variable(&self, name: &Token, id: usize) -> Result<Value> {
        if let Some(&distance) = self.locals.get(&id) {
            Environment::get_at(&self.environment, distance, &name.lexeme, name.line)
        } else {
            self.globals.borrow().get(&name.lexeme, name.line)
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn check_arity(arity: usize, got: usize, paren: &Token) -> Result<()> {
    if got != arity {
        return Err(LoxError::runtime(
            paren.line,
            format!("Expected {} arguments but got {}.", arity, got),
        ));
    }

    Ok(())
}

/// Only `nil` and `false` are falsey.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Nil => false,

        Value::Bool(b) => *b,

        _ => true,
    }
}

/// Structural equality for primitives, identity for everything callable.
pub fn is_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Nil, Value::Nil) => true,

        (Value::Number(a), Value::Number(b)) => a == b,

        (Value::String(a), Value::String(b)) => a == b,

        (Value::Bool(a), Value::Bool(b)) => a == b,

        (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),

        (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),

        (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),

        _ => false,
    }
}

fn clock_native(_args: &[Value]) -> Result<Value> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| LoxError::runtime(0, format!("Clock error: {}", e)))?
        .as_secs_f64();

    Ok(Value::Number(timestamp))
}
