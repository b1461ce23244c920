//! Resolve relation properties to the joins that reach them.

use indexmap::IndexMap;

use query_engine_metadata::metadata::{RelationInfo, RelationKind};
use query_engine_sql::sql;

use crate::translation::error::Error;
use crate::translation::helpers::{make_alias, EntityAndAlias, Env, State};

/// The joins a query needs, keyed by the alias of the joined entity before truncation.
/// Reaching the same relation twice reuses the first join.
#[derive(Debug, Default, Clone)]
pub struct Joins {
    joins: IndexMap<String, sql::ast::Join>,
    /// Whether a to-many relation was joined, so rows of the root entity may repeat.
    pub fans_out: bool,
}

impl Joins {
    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.joins.contains_key(key)
    }

    pub fn insert(&mut self, key: String, join: sql::ast::Join) {
        self.joins.entry(key).or_insert(join);
    }

    /// Add the joins of `other` not already present.
    pub fn extend(&mut self, other: Joins) {
        for (key, join) in other.joins {
            self.insert(key, join);
        }
        self.fans_out |= other.fans_out;
    }

    /// The joins in an order where every join comes after the join it depends on.
    pub fn into_sorted(self) -> Vec<sql::ast::Join> {
        sort_joins(self.joins)
    }
}

/// Order joins so that a join whose alias is a prefix of another's comes first.
///
/// A derived alias always extends the alias of its parent, so a stable sort on
/// the length of the untruncated alias puts parents before their children.
pub fn sort_joins(joins: IndexMap<String, sql::ast::Join>) -> Vec<sql::ast::Join> {
    let mut joins: Vec<(String, sql::ast::Join)> = joins.into_iter().collect();
    joins.sort_by_key(|(key, _)| key.len());
    joins.into_iter().map(|(_, join)| join).collect()
}

/// Join the target of a relation property to `parent`, returning the joined entity.
pub fn join_relation<'a>(
    env: &Env<'a>,
    state: &mut State,
    joins: &mut Joins,
    parent: &EntityAndAlias<'a>,
    property: &str,
    relation: &'a RelationInfo,
) -> Result<EntityAndAlias<'a>, Error> {
    let (target_name, target_info) = env.lookup_entity(&relation.target)?;
    let path = make_alias(&parent.path, property);
    let target = EntityAndAlias {
        name: target_name,
        info: target_info,
        alias: state.make_table_alias(&path),
        path,
    };

    if relation.kind.is_to_many() {
        joins.fans_out = true;
    }
    if joins.contains(&target.path) {
        return Ok(target);
    }

    let join = translate_join(env, state, parent, property, relation, &target)?;
    joins.insert(target.path.clone(), join);
    tracing::trace!(relation = property, alias = %target.alias.name, "joined relation");
    Ok(target)
}

fn translate_join<'a>(
    env: &Env<'a>,
    state: &mut State,
    parent: &EntityAndAlias<'a>,
    property: &str,
    relation: &'a RelationInfo,
    target: &EntityAndAlias<'a>,
) -> Result<sql::ast::Join, Error> {
    let owning = env.owning_side(parent, property, relation)?;
    let (_, target_identity) = env.identity(target)?;
    let (_, parent_identity) = env.identity(parent)?;
    let equals = |left, right| sql::helpers::binary(left, sql::ast::BinaryOperator::Equals, right);

    let join = match (owning.kind, &owning.join_table) {
        (RelationKind::ManyToMany, Some(join_table)) => {
            let link_alias = state.make_table_alias(&link_path(&target.path));
            // The owning side's join column points at the owner.
            let (parent_column, target_column) = if relation.is_owning() {
                (&join_table.join_column, &join_table.inverse_join_column)
            } else {
                (&join_table.inverse_join_column, &join_table.join_column)
            };
            sql::ast::LeftOuterJoin {
                source: sql::ast::JoinSource::Through {
                    link: sql::helpers::table_reference(
                        join_table.schema_name.as_deref(),
                        &join_table.name,
                    ),
                    link_alias: link_alias.clone(),
                    link_on: equals(
                        sql::helpers::aliased_column(&link_alias, target_column),
                        target.column(target_identity),
                    ),
                    table: target.table(),
                },
                alias: target.alias.clone(),
                on: equals(
                    sql::helpers::aliased_column(&link_alias, parent_column),
                    parent.column(parent_identity),
                ),
            }
        }
        (_, _) => {
            let join_column = owning
                .join_column
                .as_deref()
                .ok_or_else(|| Error::Schema {
                    entity: parent.name.to_string(),
                    path: format!("{property} (joinColumn)"),
                })?;
            let on = if relation.is_owning() {
                equals(
                    parent.column_named(join_column),
                    target.column(target_identity),
                )
            } else {
                equals(
                    target.column_named(join_column),
                    parent.column(parent_identity),
                )
            };
            sql::ast::LeftOuterJoin {
                source: sql::ast::JoinSource::Table(target.table()),
                alias: target.alias.clone(),
                on,
            }
        }
    };

    Ok(sql::ast::Join::LeftOuterJoin(join))
}

/// The alias of the link table of a many-to-many join. `$` never occurs in a
/// derived alias, so this cannot clash with a relation path.
fn link_path(target_path: &str) -> String {
    format!("{target_path}$link")
}

/// How the rows of an independently executed relation query are tied to a parent row.
pub struct CollectionLink<'a> {
    /// The parent column holding the value the related rows are matched on.
    pub parent_column: &'a str,
    /// The joins and condition to add to the related query, given the bound parent value.
    pub kind: CollectionLinkKind<'a>,
}

pub enum CollectionLinkKind<'a> {
    /// `self.<column> = <parent value>`
    Column(&'a str),
    /// The related rows are reached through a link table whose `parent_column`
    /// holds the parent value and whose `target_column` points at the related row.
    Through {
        schema: Option<&'a str>,
        table: &'a str,
        parent_column: &'a str,
        target_column: &'a str,
    },
}

/// Work out how a relation query is linked to the rows of its parent.
pub fn collection_link<'a>(
    env: &Env<'a>,
    parent: &EntityAndAlias<'a>,
    property: &str,
    relation: &'a RelationInfo,
) -> Result<CollectionLink<'a>, Error> {
    let owning = env.owning_side(parent, property, relation)?;
    let (_, parent_identity) = env.identity(parent)?;

    match (owning.kind, &owning.join_table) {
        (RelationKind::ManyToMany, Some(join_table)) => {
            let (parent_column, target_column) = if relation.is_owning() {
                (&join_table.join_column, &join_table.inverse_join_column)
            } else {
                (&join_table.inverse_join_column, &join_table.join_column)
            };
            Ok(CollectionLink {
                parent_column: &parent_identity.name,
                kind: CollectionLinkKind::Through {
                    schema: join_table.schema_name.as_deref(),
                    table: &join_table.name,
                    parent_column,
                    target_column,
                },
            })
        }
        (_, _) => {
            let join_column = owning
                .join_column
                .as_deref()
                .ok_or_else(|| Error::Schema {
                    entity: parent.name.to_string(),
                    path: format!("{property} (joinColumn)"),
                })?;
            if relation.is_owning() {
                let (target_name, target_info) = env.lookup_entity(&relation.target)?;
                let (_, target_identity) =
                    target_info.identity().ok_or_else(|| Error::Schema {
                        entity: target_name.to_string(),
                        path: query_engine_metadata::metadata::DEFAULT_IDENTITY_PROPERTY
                            .to_string(),
                    })?;
                Ok(CollectionLink {
                    parent_column: join_column,
                    kind: CollectionLinkKind::Column(&target_identity.name),
                })
            } else {
                Ok(CollectionLink {
                    parent_column: &parent_identity.name,
                    kind: CollectionLinkKind::Column(join_column),
                })
            }
        }
    }
}

/// Apply a collection link to the root of a relation query: add the joins it
/// needs and return the condition restricting it to the parent's value.
pub fn translate_collection_link(
    state: &mut State,
    joins: &mut Joins,
    root: &EntityAndAlias<'_>,
    link: &CollectionLink<'_>,
    identity: &query_engine_metadata::metadata::ColumnInfo,
    variable: &str,
) -> sql::ast::Expression {
    let value = state.make_variable(variable);
    match &link.kind {
        CollectionLinkKind::Column(column) => sql::helpers::binary(
            root.column_named(column),
            sql::ast::BinaryOperator::Equals,
            value,
        ),
        CollectionLinkKind::Through {
            schema,
            table,
            parent_column,
            target_column,
        } => {
            let path = link_path(&root.path);
            let link_alias = state.make_table_alias(&path);
            joins.insert(
                path,
                sql::ast::Join::LeftOuterJoin(sql::ast::LeftOuterJoin {
                    source: sql::ast::JoinSource::Table(sql::helpers::table_reference(
                        *schema, table,
                    )),
                    alias: link_alias.clone(),
                    on: sql::helpers::binary(
                        sql::helpers::aliased_column(&link_alias, target_column),
                        sql::ast::BinaryOperator::Equals,
                        root.column(identity),
                    ),
                }),
            );
            sql::helpers::binary(
                sql::helpers::aliased_column(&link_alias, parent_column),
                sql::ast::BinaryOperator::Equals,
                value,
            )
        }
    }
}
