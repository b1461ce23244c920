//! Metadata information regarding the database storage of entities.

use std::collections::{BTreeMap, BTreeSet};

use enum_iterator::Sequence;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The scalar types supported by the Engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Sequence, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Boolean,
    Smallint,
    Integer,
    Bigint,
    Real,
    #[serde(rename = "double precision")]
    DoublePrecision,
    Numeric,
    Character,
    #[serde(rename = "character varying")]
    CharacterVarying,
    Text,
    Json,
    Jsonb,
    Date,
    Time,
    Timestamp,
    #[serde(rename = "timestamp with time zone")]
    TimestampWithTimeZone,
    Uuid,
    Binary,
}

impl ScalarType {
    const OPERATORS_SUPPORTED_BY_ALL_TYPES: &'static [ComparisonOperator] = &[
        ComparisonOperator::Equals,
        ComparisonOperator::NotEquals,
        ComparisonOperator::LessThan,
        ComparisonOperator::LessThanOrEqualTo,
        ComparisonOperator::GreaterThan,
        ComparisonOperator::GreaterThanOrEqualTo,
        ComparisonOperator::In,
        ComparisonOperator::NotIn,
        ComparisonOperator::Between,
        ComparisonOperator::NotBetween,
    ];

    const STRING_OPERATORS: &'static [ComparisonOperator] =
        &[ComparisonOperator::Like, ComparisonOperator::NotLike];

    /// Returns the complete set of comparison operators for the given type.
    pub fn comparison_operators(&self) -> BTreeSet<ComparisonOperator> {
        let mut operators =
            BTreeSet::from_iter(Self::OPERATORS_SUPPORTED_BY_ALL_TYPES.iter().copied());
        if self.is_string() {
            operators.extend(Self::STRING_OPERATORS.iter().copied());
        }
        operators
    }

    /// Character types. These are the only columns subject to case and diacritic folding.
    pub fn is_string(&self) -> bool {
        matches!(
            self,
            ScalarType::Character | ScalarType::CharacterVarying | ScalarType::Text
        )
    }

    pub fn is_json(&self) -> bool {
        matches!(self, ScalarType::Json | ScalarType::Jsonb)
    }

    /// Large values are not part of the default selection and are loaded on demand.
    pub fn is_large_object(&self) -> bool {
        matches!(
            self,
            ScalarType::Text | ScalarType::Json | ScalarType::Jsonb | ScalarType::Binary
        )
    }
}

impl std::fmt::Display for ScalarType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ScalarType::DoublePrecision => write!(f, "double precision"),
            ScalarType::CharacterVarying => write!(f, "character varying"),
            ScalarType::TimestampWithTimeZone => write!(f, "timestamp with time zone"),
            _ => write!(f, "{}", format!("{self:?}").to_lowercase()),
        }
    }
}

/// The complete list of supported comparison operators for scalar types.
/// Not all of these are supported for every type.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Sequence,
    Serialize,
    Deserialize,
    JsonSchema,
)]
pub enum ComparisonOperator {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqualTo,
    GreaterThan,
    GreaterThanOrEqualTo,
    Like,
    NotLike,
    In,
    NotIn,
    Between,
    NotBetween,
}

impl ComparisonOperator {
    /// The name of the operator as it appears in a filter.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Equals => "eq",
            Self::NotEquals => "ne",
            Self::LessThan => "lt",
            Self::LessThanOrEqualTo => "le",
            Self::GreaterThan => "gt",
            Self::GreaterThanOrEqualTo => "ge",
            Self::Like => "like",
            Self::NotLike => "notLike",
            Self::In => "in",
            Self::NotIn => "notIn",
            Self::Between => "between",
            Self::NotBetween => "notBetween",
        }
    }

    /// Look an operator up by the name used in filters.
    pub fn from_name(name: &str) -> Option<ComparisonOperator> {
        enum_iterator::all::<ComparisonOperator>().find(|operator| operator.name() == name)
    }

    /// Operators whose operand is a list of values rather than a single one.
    pub fn takes_list(&self) -> bool {
        matches!(
            self,
            Self::In | Self::NotIn | Self::Between | Self::NotBetween
        )
    }
}

impl std::fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Can this column contain null values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub enum Nullable {
    #[default]
    Nullable,
    NonNullable,
}

/// Information about a database column backing an entity property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    /// The storage name of the column.
    pub name: String,
    pub r#type: ScalarType,
    #[serde(default)]
    pub nullable: Nullable,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub unique: bool,
}

impl ColumnInfo {
    pub fn is_non_null(&self) -> bool {
        self.primary_key || self.nullable == Nullable::NonNullable
    }
}

/// A mapping from the name of a unique constraint to its value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct UniquenessConstraints(pub BTreeMap<String, UniquenessConstraint>);

/// The set of properties that make up a uniqueness constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct UniquenessConstraint(pub BTreeSet<String>);
