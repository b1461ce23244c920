//! Row queries: selection, filtering, ordering and pagination.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A raw `where` clause. See [`crate::FilterTree`] for its resolved form.
pub type WhereInput = serde_json::Value;

/// A query against a single entity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QuerySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<SelectSpec>,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub predicate: Option<WhereInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<OrderSpec>,
    /// Page size. A negative value together with a cursor reads the page before it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    /// An opaque page boundary obtained from a previous result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

impl QuerySpec {
    /// Does the caller page through this query?
    pub fn is_paginated(&self) -> bool {
        self.take.is_some() || self.cursor.is_some()
    }
}

/// The selection of an entity's properties.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SelectSpec(pub IndexMap<String, SelectField>);

/// A single selected property.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum SelectField {
    /// `field: true`. For a to-one relation this inlines its simple columns.
    Flag(bool),
    /// `relation: { select, where, orderBy, take, skip, cursor }`, compiled as an
    /// independent query.
    Query(Box<QuerySpec>),
    /// `relation: { field: true, ... }`, a nested selection of a to-one relation.
    Select(SelectSpec),
}

/// An ordered list of ordering directives.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OrderSpec(pub IndexMap<String, OrderTerm>);

/// The ordering of a single property.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum OrderTerm {
    Direction(OrderDirection),
    Json(Vec<JsonOrder>),
    Nested(OrderSpec),
}

/// A direction for an ordering directive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum OrderDirection {
    #[serde(rename = "ASC", alias = "asc")]
    Asc,
    #[serde(rename = "DESC", alias = "desc")]
    Desc,
}

impl OrderDirection {
    pub fn invert(self) -> OrderDirection {
        match self {
            OrderDirection::Asc => OrderDirection::Desc,
            OrderDirection::Desc => OrderDirection::Asc,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// Ordering by a value nested in a JSON column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JsonOrder {
    /// A dotted path into the JSON document.
    pub path: String,
    #[serde(default, rename = "type")]
    pub cast: Option<CastType>,
    pub order: OrderDirection,
}

/// The type a JSON value is cast to before it is compared or ordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum CastType {
    #[serde(rename = "STRING", alias = "string")]
    String,
    #[serde(rename = "INT", alias = "int")]
    Int,
    #[serde(rename = "BOOLEAN", alias = "boolean")]
    Boolean,
    #[serde(rename = "DECIMAL", alias = "decimal")]
    Decimal,
    #[serde(rename = "TIMESTAMP", alias = "timestamp")]
    Timestamp,
}
