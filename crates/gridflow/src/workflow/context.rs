use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Map, Set};

/// Declaration of a named workflow variable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Prototype {
    pub name: String,
}

impl Prototype {
    pub fn new(name: impl Into<String>) -> Self {
        Prototype { name: name.into() }
    }
}

impl From<&Prototype> for String {
    fn from(prototype: &Prototype) -> String {
        prototype.name.clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Variable {
    pub prototype: Prototype,
    pub value: Value,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Variable {
            prototype: Prototype::new(name),
            value,
        }
    }
}

/// Mapping from variable name to value, produced by a finished task.
/// Forwarding a context always duplicates the values, so downstream mutation
/// can never be observed upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Context {
    variables: Map<String, Variable>,
}

impl Context {
    pub fn new() -> Self {
        Context::default()
    }

    pub fn set(&mut self, variable: Variable) {
        self.variables
            .insert(variable.prototype.name.clone(), variable);
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.set(Variable::new(name, value));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name).map(|v| &v.value)
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Variable> {
        self.variables.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(|name| name.as_str())
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// New context holding the variables of both; on a name clash `other`
    /// wins.
    pub fn merged(&self, other: &Context) -> Context {
        let mut merged = self.clone();
        for variable in other.variables() {
            merged.set(variable.clone());
        }
        merged
    }

    /// New context without the named variables.
    pub fn without(&self, filtered: &Set<String>) -> Context {
        let variables = self
            .variables
            .iter()
            .filter(|(name, _)| !filtered.contains(*name))
            .map(|(name, variable)| (name.clone(), variable.clone()))
            .collect();
        Context { variables }
    }
}
