//! Aggregate queries.

use enum_iterator::Sequence;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::query::WhereInput;

/// A raw `having` clause, keyed by aggregate function name.
pub type HavingInput = serde_json::Value;

/// An aggregate query against a single entity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AggregateSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<AggregateSelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg: Option<AggregateSelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum: Option<AggregateSelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<AggregateSelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<AggregateSelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<AggregateSelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub having: Option<HavingInput>,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub predicate: Option<WhereInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
}

impl AggregateSpec {
    /// The selection made for an aggregate function, if any.
    pub fn selection(&self, function: AggregateFunction) -> Option<&AggregateSelection> {
        match function {
            AggregateFunction::Count => self.count.as_ref(),
            AggregateFunction::Avg => self.avg.as_ref(),
            AggregateFunction::Sum => self.sum.as_ref(),
            AggregateFunction::Min => self.min.as_ref(),
            AggregateFunction::Max => self.max.as_ref(),
        }
    }
}

/// Properties an aggregate function (or the grouping) applies to.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AggregateSelection(pub IndexMap<String, AggregateField>);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum AggregateField {
    /// `field: true` or `relation: true`.
    Flag(bool),
    /// `relation: { ... }`, descending into the related entity.
    Nested(AggregateSelection),
}

/// The aggregate functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Sequence)]
pub enum AggregateFunction {
    Count,
    Avg,
    Sum,
    Min,
    Max,
}

impl AggregateFunction {
    /// The key naming this function in a request and in a reshaped result.
    pub fn name(self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        }
    }

    pub fn from_name(name: &str) -> Option<AggregateFunction> {
        enum_iterator::all::<AggregateFunction>().find(|function| function.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<AggregateSpec, _> =
            serde_json::from_value(serde_json::json!({ "average": { "id": true } }));
        assert!(result.is_err());
    }

    #[test]
    fn nested_selections_parse() {
        let spec: AggregateSpec = serde_json::from_value(serde_json::json!({
            "avg": { "addresses": { "country": { "version": true } } },
            "groupBy": { "firstName": true }
        }))
        .unwrap();

        let avg = spec.selection(AggregateFunction::Avg).unwrap();
        assert!(matches!(avg.0["addresses"], AggregateField::Nested(_)));
        assert!(spec.selection(AggregateFunction::Count).is_none());
        assert_eq!(AggregateFunction::from_name("max"), Some(AggregateFunction::Max));
    }
}
