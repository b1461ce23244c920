//! A SQL AST, its conversion to parameterized SQL text and the plan handed to an executor.

pub mod sql;
