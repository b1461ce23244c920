//! The resolved form of a `where` clause.

use query_engine_metadata::metadata::ComparisonOperator;

use crate::query::CastType;

/// A filter tree, resolved against the metadata of the entity it applies to.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterTree {
    /// `field: value` or `field: { op: value }`.
    Comparison {
        field: String,
        operator: ComparisonOperator,
        value: serde_json::Value,
    },
    /// A filter over the entity a relation points to.
    Relation {
        field: String,
        filter: Box<FilterTree>,
    },
    /// `AND`, `OR` and `NOT` over a list of sub-filters.
    Combinator {
        combinator: Combinator,
        children: Vec<FilterTree>,
    },
    /// A comparison against a value at a path inside a JSON column.
    Json {
        field: String,
        path: Vec<String>,
        operator: ComparisonOperator,
        value: serde_json::Value,
        cast: Option<CastType>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
    Not,
}

impl Combinator {
    pub fn from_key(key: &str) -> Option<Combinator> {
        match key {
            "AND" => Some(Combinator::And),
            "OR" => Some(Combinator::Or),
            "NOT" => Some(Combinator::Not),
            _ => None,
        }
    }
}

impl FilterTree {
    /// Combine filters with AND, collapsing the trivial cases.
    pub fn and(mut children: Vec<FilterTree>) -> FilterTree {
        if children.len() == 1 {
            children.remove(0)
        } else {
            FilterTree::Combinator {
                combinator: Combinator::And,
                children,
            }
        }
    }
}
