use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::environment::Environment;
use crate::error::{LoxError, Result};
use crate::interpreter::{Interpreter, Unwind};
use crate::stmt::FunctionDecl;
use crate::token::Token;

/// Runtime values.
///
/// Primitives are compared structurally; functions, classes and instances
/// compare by `Rc` identity (see `interpreter::is_equal`).
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
    NativeFunction {
        name: &'static str,
        arity: usize,
        func: fn(&[Value]) -> Result<Value>,
    },
    Function(Rc<LoxFunction>),
    Class(Rc<LoxClass>),
    Instance(Rc<RefCell<LoxInstance>>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),

            Value::Bool(b) => write!(f, "{}", b),

            Value::Number(n) => {
                if n.fract() == 0.0 {
                    write!(f, "{:.0}", n)
                } else {
                    write!(f, "{}", n)
                }
            }

            Value::String(s) => write!(f, "{}", s),

            Value::NativeFunction { .. } => write!(f, "<native fn>"),

            Value::Function(_) => write!(f, "<fn>"),

            Value::Class(class) => write!(f, "<class {}>", class.name),

            Value::Instance(instance) => {
                write!(f, "<{} instance>", instance.borrow().class.name)
            }
        }
    }
}

/// A user function: declaration + captured closure frame.
#[derive(Debug)]
pub struct LoxFunction {
    declaration: Rc<FunctionDecl>,
    closure: Rc<RefCell<Environment>>,
    is_initializer: bool,
}

impl LoxFunction {
    pub fn new(
        declaration: Rc<FunctionDecl>,
        closure: Rc<RefCell<Environment>>,
        is_initializer: bool,
    ) -> Self {
        LoxFunction {
            declaration,
            closure,
            is_initializer,
        }
    }

    pub fn arity(&self) -> usize {
        self.declaration.params.len()
    }

    pub fn name(&self) -> &str {
        &self.declaration.name.lexeme
    }

    /// Produce a copy of this function whose closure binds `this` to the
    /// given instance.
    pub fn bind(&self, instance: &Rc<RefCell<LoxInstance>>) -> LoxFunction {
        let mut env = Environment::with_enclosing(Rc::clone(&self.closure));
        env.define("this", Value::Instance(Rc::clone(instance)));

        LoxFunction {
            declaration: Rc::clone(&self.declaration),
            closure: Rc::new(RefCell::new(env)),
            is_initializer: self.is_initializer,
        }
    }

    /// Invoke the function. This is the boundary where the `return` control
    /// signal stops unwinding; runtime errors keep propagating.
    pub fn call(&self, interpreter: &mut Interpreter, arguments: Vec<Value>) -> Result<Value> {
        debug!("Calling function '{}'", self.name());

        let mut env = Environment::with_enclosing(Rc::clone(&self.closure));
        for (param, argument) in self.declaration.params.iter().zip(arguments) {
            env.define(&param.lexeme, argument);
        }

        let result = interpreter.execute_block(&self.declaration.body, Rc::new(RefCell::new(env)));

        match result {
            Ok(()) => {
                if self.is_initializer {
                    self.closure_this()
                } else {
                    Ok(Value::Nil)
                }
            }

            Err(Unwind::Return(value)) => {
                if self.is_initializer {
                    // An initializer's bare `return` still yields the instance.
                    self.closure_this()
                } else {
                    Ok(value)
                }
            }

            Err(Unwind::Error(error)) => Err(error),
        }
    }

    fn closure_this(&self) -> Result<Value> {
        Environment::get_at(&self.closure, 0, "this", self.declaration.name.line)
    }
}

/// A class value: method table plus optional superclass.
#[derive(Debug)]
pub struct LoxClass {
    pub name: String,
    superclass: Option<Rc<LoxClass>>,
    methods: HashMap<String, LoxFunction>,
}

impl LoxClass {
    pub fn new(
        name: String,
        superclass: Option<Rc<LoxClass>>,
        methods: HashMap<String, LoxFunction>,
    ) -> Self {
        LoxClass {
            name,
            superclass,
            methods,
        }
    }

    /// Method lookup: own table first, then up the superclass chain.
    pub fn find_method(&self, name: &str) -> Option<&LoxFunction> {
        if let Some(method) = self.methods.get(name) {
            return Some(method);
        }

        self.superclass
            .as_deref()
            .and_then(|superclass| superclass.find_method(name))
    }

    /// A class's arity is its initializer's, or 0 without one.
    pub fn arity(&self) -> usize {
        self.find_method("init")
            .map(LoxFunction::arity)
            .unwrap_or(0)
    }

    /// Calling a class constructs an instance and runs its bound `init`,
    /// if any. Errors raised by the initializer propagate to the caller.
    pub fn call(
        class: &Rc<LoxClass>,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
    ) -> Result<Value> {
        debug!("Instantiating class '{}'", class.name);

        let instance = Rc::new(RefCell::new(LoxInstance::new(Rc::clone(class))));

        if let Some(initializer) = class.find_method("init") {
            initializer.bind(&instance).call(interpreter, arguments)?;
        }

        Ok(Value::Instance(instance))
    }
}

/// An instance: a mutable bag of fields plus its class.
#[derive(Debug)]
pub struct LoxInstance {
    class: Rc<LoxClass>,
    fields: HashMap<String, Value>,
}

impl LoxInstance {
    pub fn new(class: Rc<LoxClass>) -> Self {
        LoxInstance {
            class,
            fields: HashMap::new(),
        }
    }

    /// Property access: a field shadows a method of the same name. Methods
    /// come back already bound to this instance.
    pub fn get(instance: &Rc<RefCell<LoxInstance>>, name: &Token) -> Result<Value> {
        if let Some(value) = instance.borrow().fields.get(&name.lexeme) {
            return Ok(value.clone());
        }

        if let Some(method) = instance.borrow().class.find_method(&name.lexeme) {
            return Ok(Value::Function(Rc::new(method.bind(instance))));
        }

        Err(LoxError::runtime(
            name.line,
            format!("Undefined property '{}'.", name.lexeme),
        ))
    }

    /// Setting a field is unconditional: it creates the field if absent.
    pub fn set(&mut self, name: &Token, value: Value) {
        self.fields.insert(name.lexeme.clone(), value);
    }
}
