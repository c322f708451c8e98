use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{LoxError, Result};
use crate::value::Value;

/// One frame of the lexical environment chain.
///
/// Frames are shared: a closure keeps its defining frame alive, and several
/// closures may point at the same parent, hence `Rc<RefCell<_>>` throughout.
#[derive(Debug)]
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: None,
        }
    }

    pub fn with_enclosing(enclosing: Rc<RefCell<Environment>>) -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: Some(enclosing),
        }
    }

    pub fn define(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str, line: usize) -> Result<Value> {
        if let Some(value) = self.values.get(name) {
            Ok(value.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().get(name, line)
        } else {
            Err(LoxError::runtime(
                line,
                format!("Undefined variable '{}'.", name),
            ))
        }
    }

    pub fn assign(&mut self, name: &str, value: Value, line: usize) -> Result<()> {
        if self.values.contains_key(name) {
            self.values.insert(name.to_string(), value);
            Ok(())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow_mut().assign(name, value, line)
        } else {
            Err(LoxError::runtime(
                line,
                format!("Undefined variable '{}'.", name),
            ))
        }
    }

    /// Read `name` from the frame exactly `distance` hops up the chain.
    pub fn get_at(
        env: &Rc<RefCell<Environment>>,
        distance: usize,
        name: &str,
        line: usize,
    ) -> Result<Value> {
        let frame = Self::ancestor(env, distance);

        match frame.and_then(|frame| frame.borrow().values.get(name).cloned()) {
            Some(value) => Ok(value),

            None => Err(LoxError::runtime(
                line,
                format!("Undefined variable '{}'.", name),
            )),
        }
    }

    /// Write `name` in the frame exactly `distance` hops up the chain.
    pub fn assign_at(
        env: &Rc<RefCell<Environment>>,
        distance: usize,
        name: &str,
        value: Value,
        line: usize,
    ) -> Result<()> {
        if let Some(frame) = Self::ancestor(env, distance) {
            let mut frame = frame.borrow_mut();
            if frame.values.contains_key(name) {
                frame.values.insert(name.to_string(), value);
                return Ok(());
            }
        }

        Err(LoxError::runtime(
            line,
            format!("Undefined variable '{}'.", name),
        ))
    }

    fn ancestor(
        env: &Rc<RefCell<Environment>>,
        distance: usize,
    ) -> Option<Rc<RefCell<Environment>>> {
        let mut environment: Rc<RefCell<Environment>> = Rc::clone(env);

        for _ in 0..distance {
            let enclosing = environment.borrow().enclosing.clone()?;
            environment = enclosing;
        }

        Some(environment)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
