//! Type definitions of a low-level SQL string representation.

use indexmap::IndexMap;

/// A SQL text with named parameters.
///
/// Parameters appear in the text as `:name` and are kept in the order in which
/// they were first emitted.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SQL {
    pub sql: String,
    pub params: IndexMap<String, Param>,
}

/// A parameter for a parameterized query.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// A literal value supplied by the caller.
    Value(serde_json::Value),
    /// A variable name, bound at execution time. Used to link a nested plan
    /// to the row of its parent.
    Variable(String),
}

impl SQL {
    pub fn new() -> SQL {
        SQL::default()
    }

    pub fn append_syntax(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Append a double quoted identifier. Embedded quotes are doubled.
    pub fn append_identifier(&mut self, identifier: &str) {
        self.sql.push('"');
        self.sql.push_str(&identifier.replace('"', "\"\""));
        self.sql.push('"');
    }

    pub fn append_param(&mut self, name: &str, param: Param) {
        self.sql.push(':');
        self.sql.push_str(name);
        self.params.insert(name.to_string(), param);
    }
}
