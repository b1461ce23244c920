//! Handle the translation of selections.

use query_engine_metadata::metadata::Property;
use query_engine_models::{QuerySpec, SelectField, SelectSpec};
use query_engine_sql::sql;

use super::relationships::{self, Joins};
use super::CompiledPlan;
use crate::translation::error::Error;
use crate::translation::helpers::{make_alias, EntityAndAlias, Env, Projection, State};

/// How a flat result row is read back into a nested object.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// A scalar property, read from a projected column.
    Column {
        key: String,
        alias: sql::ast::ColumnAlias,
    },
    /// A to-one relation joined into the same query. The related object is
    /// `null` when its identity column is.
    Reference {
        key: String,
        identity: sql::ast::ColumnAlias,
        fields: Vec<Field>,
    },
    /// A relation compiled as an independent query and executed once per row.
    /// `variable` is the projected column the related rows are linked on.
    Collection {
        key: String,
        variable: sql::ast::ColumnAlias,
        plan: Box<CompiledPlan>,
    },
}

impl Field {
    pub fn key(&self) -> &str {
        match self {
            Field::Column { key, .. }
            | Field::Reference { key, .. }
            | Field::Collection { key, .. } => key,
        }
    }
}

/// Translate the selection of an entity. Scalar and to-one properties are
/// projected into `projection`; to-many relations become nested plans.
pub fn translate_select<'a>(
    env: &Env<'a>,
    state: &mut State,
    joins: &mut Joins,
    projection: &mut Projection,
    current: &EntityAndAlias<'a>,
    select: Option<&SelectSpec>,
) -> Result<Vec<Field>, Error> {
    let select = match select {
        Some(select) if !select.0.is_empty() => select,
        _ => return Ok(simple_columns(state, projection, current)),
    };

    let mut fields = vec![];
    for (property, field) in &select.0 {
        match (env.lookup_property(current, property)?, field) {
            (_, SelectField::Flag(false)) => {}
            (Property::Column(column), SelectField::Flag(true)) => {
                let alias = projection.add(
                    state,
                    &make_alias(&current.path, &column.name),
                    current.column(column),
                );
                fields.push(Field::Column {
                    key: property.clone(),
                    alias,
                });
            }
            (Property::Column(_), _) => {
                return Err(Error::UnsupportedOperation(format!(
                    "A nested selection on the column '{property}'"
                )))
            }
            (Property::Relation(relation), SelectField::Query(query)) => {
                fields.push(translate_collection(
                    env, state, projection, current, property, relation, query,
                )?);
            }
            (Property::Relation(relation), SelectField::Flag(true) | SelectField::Select(_))
                if relation.kind.is_to_many() =>
            {
                let query = QuerySpec {
                    select: match field {
                        SelectField::Select(select) => Some(select.clone()),
                        _ => None,
                    },
                    ..QuerySpec::default()
                };
                fields.push(translate_collection(
                    env, state, projection, current, property, relation, &query,
                )?);
            }
            (Property::Relation(relation), SelectField::Flag(true) | SelectField::Select(_)) => {
                let target =
                    relationships::join_relation(env, state, joins, current, property, relation)?;
                let (_, identity) = env.identity(&target)?;
                let identity = projection.add(
                    state,
                    &make_alias(&target.path, &identity.name),
                    target.column(identity),
                );
                let nested = match field {
                    SelectField::Select(select) => Some(select),
                    _ => None,
                };
                let nested = translate_select(env, state, joins, projection, &target, nested)?;
                fields.push(Field::Reference {
                    key: property.clone(),
                    identity,
                    fields: nested,
                });
            }
        }
    }
    Ok(fields)
}

/// The columns selected when a selection is empty: every column except large ones.
fn simple_columns(
    state: &mut State,
    projection: &mut Projection,
    current: &EntityAndAlias<'_>,
) -> Vec<Field> {
    current
        .info
        .simple_columns()
        .map(|(property, column)| Field::Column {
            key: property.clone(),
            alias: projection.add(
                state,
                &make_alias(&current.path, &column.name),
                current.column(column),
            ),
        })
        .collect()
}

fn translate_collection<'a>(
    env: &Env<'a>,
    state: &mut State,
    projection: &mut Projection,
    current: &EntityAndAlias<'a>,
    property: &str,
    relation: &'a query_engine_metadata::metadata::RelationInfo,
    query: &QuerySpec,
) -> Result<Field, Error> {
    let link = relationships::collection_link(env, current, property, relation)?;
    let variable = projection.add(
        state,
        &make_alias(&current.path, link.parent_column),
        current.column_named(link.parent_column),
    );
    let plan = super::translate_plan(
        env,
        state,
        &relation.target,
        query,
        Some((&link, variable.name.as_str())),
    )?;
    tracing::trace!(relation = property, "compiled collection");
    Ok(Field::Collection {
        key: property.to_string(),
        variable,
        plan: Box::new(plan),
    })
}
