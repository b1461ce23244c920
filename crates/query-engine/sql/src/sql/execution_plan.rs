//! Describe the SQL queries handed to an executor.

use super::ast;
use super::string;

/// A single SQL query, kept as an AST until it is sent to the database.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub select: ast::Select,
}

impl Query {
    pub fn new(select: ast::Select) -> Query {
        Query { select }
    }

    /// Extract the query component as SQL.
    pub fn query_sql(&self) -> string::SQL {
        select_to_sql(&self.select)
    }
}

/// Convert a select AST to a SQL string.
pub fn select_to_sql(select: &ast::Select) -> string::SQL {
    let mut sql = string::SQL::new();
    select.to_sql(&mut sql);
    sql
}
