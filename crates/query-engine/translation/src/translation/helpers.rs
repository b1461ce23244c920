//! Helpers for processing requests and building SQL.

use std::collections::{BTreeMap, BTreeSet};

use query_engine_configuration::CompilerSettings;
use query_engine_metadata::metadata::{self, ColumnInfo, EntityInfo, Property, RelationInfo};
use query_engine_sql::sql;

use super::error::Error;

/// The alias of the entity a query starts from.
pub const ROOT_ALIAS: &str = "self";

/// Length of the hash suffix appended to shortened aliases.
const HASH_SUFFIX_LENGTH: usize = 6;

/// Static information from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct Env<'a> {
    metadata: &'a metadata::Metadata,
    settings: &'a CompilerSettings,
}

/// For an entity in the query, we track what it is in the metadata (so we can look up
/// its columns and relations) and how the query addresses it (the alias we generate).
#[derive(Debug, Clone)]
pub struct EntityAndAlias<'a> {
    /// Entity name for property lookup
    pub name: &'a str,
    pub info: &'a EntityInfo,
    /// The alias before truncation. Aliases of related entities are derived from it.
    pub path: String,
    /// Table alias to query from
    pub alias: sql::ast::TableAlias,
}

impl<'a> Env<'a> {
    /// Create a new Env by supplying the metadata and the compiler settings.
    pub fn new(metadata: &'a metadata::Metadata, settings: &'a CompilerSettings) -> Env<'a> {
        Env { metadata, settings }
    }

    pub fn metadata(&self) -> &'a metadata::Metadata {
        self.metadata
    }

    pub fn settings(&self) -> &'a CompilerSettings {
        self.settings
    }

    /// Lookup an entity's information in the metadata.
    pub fn lookup_entity(&self, name: &str) -> Result<(&'a str, &'a EntityInfo), Error> {
        self.metadata
            .entities
            .0
            .get_key_value(name)
            .map(|(name, info)| (name.as_str(), info))
            .ok_or_else(|| Error::EntityNotFound(name.to_string()))
    }

    /// The entity a query starts from, addressed as `self`.
    pub fn root(&self, state: &mut State, name: &str) -> Result<EntityAndAlias<'a>, Error> {
        let (name, info) = self.lookup_entity(name)?;
        Ok(EntityAndAlias {
            name,
            info,
            path: ROOT_ALIAS.to_string(),
            alias: state.make_table_alias(ROOT_ALIAS),
        })
    }

    /// Lookup a property of an entity.
    pub fn lookup_property(
        &self,
        entity: &EntityAndAlias<'a>,
        property: &str,
    ) -> Result<Property<'a>, Error> {
        entity.info.property(property).ok_or_else(|| Error::Schema {
            entity: entity.name.to_string(),
            path: property.to_string(),
        })
    }

    /// The identity column of an entity.
    pub fn identity(&self, entity: &EntityAndAlias<'a>) -> Result<(&'a str, &'a ColumnInfo), Error> {
        entity.info.identity().ok_or_else(|| Error::Schema {
            entity: entity.name.to_string(),
            path: metadata::DEFAULT_IDENTITY_PROPERTY.to_string(),
        })
    }

    /// The relation on the target entity that owns the storage details of `relation`.
    pub fn owning_side(
        &self,
        entity: &EntityAndAlias<'a>,
        property: &str,
        relation: &'a RelationInfo,
    ) -> Result<&'a RelationInfo, Error> {
        self.metadata
            .owning_side(relation)
            .ok_or_else(|| Error::Schema {
                entity: entity.name.to_string(),
                path: format!(
                    "{property} (mappedBy {})",
                    relation.mapped_by.as_deref().unwrap_or_default()
                ),
            })
    }

    /// Apply the configured case and diacritic folding to a fragment compared
    /// with, or ordered by, a string column.
    pub fn normalize(&self, column: &ColumnInfo, expression: sql::ast::Expression) -> sql::ast::Expression {
        if !column.r#type.is_string() {
            return expression;
        }
        let normalization = self.settings.normalization;
        let mut expression = expression;
        if normalization.unaccent {
            expression =
                sql::helpers::function_call(sql::ast::Function::Unaccent, vec![expression]);
        }
        if normalization.case_insensitive {
            expression = sql::helpers::function_call(sql::ast::Function::Lower, vec![expression]);
        }
        expression
    }
}

impl<'a> EntityAndAlias<'a> {
    /// A column of this entity, as addressed in the query.
    pub fn column(&self, column: &ColumnInfo) -> sql::ast::Expression {
        sql::ast::Expression::ColumnReference(self.column_reference(column))
    }

    pub fn column_reference(&self, column: &ColumnInfo) -> sql::ast::ColumnReference {
        sql::ast::ColumnReference::TableColumn {
            table: sql::ast::TableReference::AliasedTable(self.alias.clone()),
            name: sql::ast::ColumnName(column.name.clone()),
        }
    }

    /// A column of this entity by its storage name.
    pub fn column_named(&self, name: &str) -> sql::ast::Expression {
        sql::helpers::aliased_column(&self.alias, name)
    }

    /// The table storing this entity.
    pub fn table(&self) -> sql::ast::TableReference {
        sql::helpers::table_reference(self.info.schema_name.as_deref(), &self.info.table_name)
    }

    /// A FROM clause selecting from this entity.
    pub fn from(&self) -> sql::ast::From {
        sql::ast::From::Table {
            reference: self.table(),
            alias: self.alias.clone(),
        }
    }
}

/// Per-compile state: parameter names and generated aliases.
///
/// A single `State` is shared by every plan compiled for one request, nested
/// collection plans included, so parameter names never repeat within it.
#[derive(Debug)]
pub struct State {
    max_identifier_length: usize,
    param_index: u64,
    /// Generated aliases, before and after shortening.
    aliases: BTreeMap<String, String>,
    taken: BTreeSet<String>,
}

impl State {
    pub fn new(max_identifier_length: usize) -> State {
        State {
            max_identifier_length,
            param_index: 0,
            aliases: BTreeMap::new(),
            taken: BTreeSet::new(),
        }
    }

    /// The name of a fresh parameter: `p0`, `p1`, ...
    pub fn next_param(&mut self) -> String {
        let name = format!("p{}", self.param_index);
        self.param_index += 1;
        name
    }

    /// Bind a value to a fresh parameter.
    pub fn make_parameter(&mut self, value: serde_json::Value) -> sql::ast::Expression {
        let name = self.next_param();
        sql::helpers::parameter(name, value)
    }

    /// Bind a variable, resolved at execution time, to a fresh parameter.
    pub fn make_variable(&mut self, variable: &str) -> sql::ast::Expression {
        let name = self.next_param();
        sql::helpers::variable(name, variable.to_string())
    }

    /// Fit an alias into the identifier length limit.
    ///
    /// The same alias always maps to the same result within a compile, and two
    /// different aliases never do. Aliases that are too long, or that clash with a
    /// result handed out before, are cut short and suffixed with `_` and a hash of
    /// the original.
    pub fn truncate_alias(&mut self, alias: &str) -> String {
        if let Some(truncated) = self.aliases.get(alias) {
            return truncated.clone();
        }

        let truncated = if alias.len() <= self.max_identifier_length && !self.taken.contains(alias)
        {
            alias.to_string()
        } else {
            let keep = self
                .max_identifier_length
                .saturating_sub(HASH_SUFFIX_LENGTH + 1);
            let head = floor_char_boundary(alias, keep);
            let mut salt: u32 = 0;
            loop {
                let mut hasher = blake3::Hasher::new();
                hasher.update(alias.as_bytes());
                if salt > 0 {
                    hasher.update(&salt.to_le_bytes());
                }
                let hash = hasher.finalize().to_hex();
                let candidate = format!("{head}_{}", &hash.as_str()[..HASH_SUFFIX_LENGTH]);
                if !self.taken.contains(&candidate) {
                    break candidate;
                }
                salt += 1;
            }
        };

        self.taken.insert(truncated.clone());
        self.aliases.insert(alias.to_string(), truncated.clone());
        truncated
    }

    /// Create table aliases using this function so they respect the length limit.
    pub fn make_table_alias(&mut self, alias: &str) -> sql::ast::TableAlias {
        sql::helpers::make_table_alias(self.truncate_alias(alias))
    }

    /// Create column aliases using this function so they respect the length limit.
    pub fn make_column_alias(&mut self, alias: &str) -> sql::ast::ColumnAlias {
        sql::helpers::make_column_alias(self.truncate_alias(alias))
    }
}

/// Derive an alias from its parent's alias and a storage name: `{prefix}_{name}`.
pub fn make_alias(prefix: &str, name: &str) -> String {
    format!("{}_{}", prefix.trim_start_matches('_'), name)
}

fn floor_char_boundary(s: &str, index: usize) -> &str {
    if index >= s.len() {
        return s;
    }
    let mut end = index;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// The select list of a query under construction. Every expression is projected once.
#[derive(Debug, Default)]
pub struct Projection {
    columns: Vec<(sql::ast::ColumnAlias, sql::ast::Expression)>,
    hints: BTreeSet<String>,
}

impl Projection {
    /// Project an expression, returning the alias it can be read back by.
    pub fn add(
        &mut self,
        state: &mut State,
        hint: &str,
        expression: sql::ast::Expression,
    ) -> sql::ast::ColumnAlias {
        if let Some((alias, _)) = self.columns.iter().find(|(_, e)| *e == expression) {
            return alias.clone();
        }
        let mut candidate = hint.to_string();
        let mut index = 1;
        while self.hints.contains(&candidate) {
            candidate = format!("{hint}_{index}");
            index += 1;
        }
        self.hints.insert(candidate.clone());
        let alias = state.make_column_alias(&candidate);
        self.columns.push((alias.clone(), expression));
        alias
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn into_select_list(self) -> Vec<(sql::ast::ColumnAlias, sql::ast::Expression)> {
        self.columns
    }
}
