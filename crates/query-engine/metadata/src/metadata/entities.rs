//! Entities, their columns and the relations between them.
//!
//! This is the registry the compiler walks: every property lookup is a map lookup
//! that either finds a column, a relation, or nothing.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::database::{ColumnInfo, UniquenessConstraints};

/// The name of the identity property assumed when no column is flagged as primary key.
pub const DEFAULT_IDENTITY_PROPERTY: &str = "id";

/// Mapping from an entity name to its information.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct EntitiesInfo(pub BTreeMap<String, EntityInfo>);

impl EntitiesInfo {
    pub fn empty() -> Self {
        EntitiesInfo(BTreeMap::new())
    }
}

/// Information about an entity and the table storing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntityInfo {
    #[serde(default)]
    pub schema_name: Option<String>,
    pub table_name: String,
    /// Scalar properties, keyed by property name.
    pub columns: BTreeMap<String, ColumnInfo>,
    /// Relation properties, keyed by property name.
    #[serde(default)]
    pub relations: BTreeMap<String, RelationInfo>,
    /// Uniqueness constraints, expressed over property names.
    #[serde(default)]
    pub uniqueness_constraints: UniquenessConstraints,
}

/// The cardinality of a relation, seen from the entity declaring it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    ManyToOne,
    OneToOne,
    OneToMany,
    ManyToMany,
}

impl RelationKind {
    pub fn is_to_many(self) -> bool {
        matches!(self, RelationKind::OneToMany | RelationKind::ManyToMany)
    }
}

/// A relation property.
///
/// The owning side of a relation carries the storage details (`joinColumn` for to-one,
/// `joinTable` for many-to-many). The inverse side names the owning relation on the
/// target entity through `mappedBy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelationInfo {
    pub kind: RelationKind,
    pub target: String,
    #[serde(default)]
    pub join_column: Option<String>,
    #[serde(default)]
    pub mapped_by: Option<String>,
    #[serde(default)]
    pub join_table: Option<JoinTable>,
}

impl RelationInfo {
    pub fn is_owning(&self) -> bool {
        self.mapped_by.is_none()
    }
}

/// The link table of a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinTable {
    #[serde(default)]
    pub schema_name: Option<String>,
    pub name: String,
    /// Column referencing the owning entity.
    pub join_column: String,
    /// Column referencing the target entity.
    pub inverse_join_column: String,
}

/// What a property of an entity resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property<'a> {
    Column(&'a ColumnInfo),
    Relation(&'a RelationInfo),
}

impl EntityInfo {
    pub fn column(&self, property: &str) -> Option<&ColumnInfo> {
        self.columns.get(property)
    }

    pub fn relation(&self, property: &str) -> Option<&RelationInfo> {
        self.relations.get(property)
    }

    pub fn property(&self, property: &str) -> Option<Property<'_>> {
        self.column(property)
            .map(Property::Column)
            .or_else(|| self.relation(property).map(Property::Relation))
    }

    /// The identity property: the primary key column, or `id` by convention.
    pub fn identity(&self) -> Option<(&str, &ColumnInfo)> {
        self.columns
            .iter()
            .find(|(_, column)| column.primary_key)
            .or_else(|| self.columns.get_key_value(DEFAULT_IDENTITY_PROPERTY))
            .map(|(property, column)| (property.as_str(), column))
    }

    /// Properties guaranteed to be unique and never null, primary key first.
    /// A uniqueness constraint only counts when it spans a single property.
    pub fn unique_non_null_properties(&self) -> Vec<&str> {
        let mut properties: Vec<&str> = self
            .columns
            .iter()
            .filter(|(_, column)| column.primary_key)
            .map(|(property, _)| property.as_str())
            .collect();

        let unique = self
            .columns
            .iter()
            .filter(|(property, column)| {
                let constrained = self
                    .uniqueness_constraints
                    .0
                    .values()
                    .any(|constraint| constraint.0.len() == 1 && constraint.0.contains(*property));
                (column.unique || constrained) && column.is_non_null() && !column.primary_key
            })
            .map(|(property, _)| property.as_str());

        properties.extend(unique);
        properties
    }

    /// Columns selected when no explicit selection is given.
    pub fn simple_columns(&self) -> impl Iterator<Item = (&String, &ColumnInfo)> {
        self.columns
            .iter()
            .filter(|(_, column)| !column.r#type.is_large_object())
    }
}

impl super::Metadata {
    pub fn get_entity(&self, name: &str) -> Option<&EntityInfo> {
        self.entities.0.get(name)
    }

    /// Walk a dotted path of relations starting at `entity`, returning the name and
    /// information of the entity the path ends on.
    fn walk<'a>(&'a self, entity: &str, relations: &[&str]) -> Option<(&'a str, &'a EntityInfo)> {
        let start = self.entities.0.get_key_value(entity)?;
        relations
            .iter()
            .try_fold((start.0.as_str(), start.1), |(_, info), property| {
                let relation = info.relation(property)?;
                self.entities
                    .0
                    .get_key_value(&relation.target)
                    .map(|(name, info)| (name.as_str(), info))
            })
    }

    /// Find a relation by a dotted path, e.g. `address.country`.
    pub fn find_relation(&self, entity: &str, path: &str) -> Option<&RelationInfo> {
        let segments: Vec<&str> = path.split('.').collect();
        let (last, init) = segments.split_last()?;
        let (_, owner) = self.walk(entity, init)?;
        owner.relation(last)
    }

    /// Find a column by a dotted path, e.g. `address.country.name`.
    pub fn find_column(&self, entity: &str, path: &str) -> Option<&ColumnInfo> {
        let segments: Vec<&str> = path.split('.').collect();
        let (last, init) = segments.split_last()?;
        let (_, owner) = self.walk(entity, init)?;
        owner.column(last)
    }

    /// The owning relation on the target entity of an inverse relation.
    pub fn owning_side<'a>(&'a self, relation: &'a RelationInfo) -> Option<&'a RelationInfo> {
        match &relation.mapped_by {
            None => Some(relation),
            Some(mapped_by) => self.get_entity(&relation.target)?.relation(mapped_by),
        }
    }
}
