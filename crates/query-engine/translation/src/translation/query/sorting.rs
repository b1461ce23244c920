//! Handle 'order by' translation.

use query_engine_metadata::metadata::{self, ColumnInfo, Property};
use query_engine_models::{CastType, OrderDirection, OrderSpec, OrderTerm};
use query_engine_sql::sql;

use super::relationships::{self, Joins};
use super::values;
use crate::translation::error::Error;
use crate::translation::helpers::{make_alias, EntityAndAlias, Env, Projection, State};

/// A single ordering term of a compiled query.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderElement {
    /// The dotted property path ordered by. Cursors record their values under it.
    pub key: String,
    /// The projected column holding the value ordered by.
    pub alias: sql::ast::ColumnAlias,
    pub target: sql::ast::Expression,
    pub direction: OrderDirection,
    /// Whether the value can be `NULL`, either by the column definition or because
    /// it comes through an outer join.
    pub nullable: bool,
    /// Whether a cursor can seek on this element. Values extracted from JSON
    /// documents cannot be compared reliably, so they are not.
    pub cursorable: bool,
}

impl OrderElement {
    /// The ORDER BY element, flipped when reading backwards.
    pub fn to_sql(&self, backward: bool) -> sql::ast::OrderByElement {
        let direction = if backward {
            self.direction.invert()
        } else {
            self.direction
        };
        sql::ast::OrderByElement {
            target: self.target.clone(),
            direction: match direction {
                OrderDirection::Asc => sql::ast::OrderByDirection::Asc,
                OrderDirection::Desc => sql::ast::OrderByDirection::Desc,
            },
        }
    }
}

/// Convert the order by fields of a query into order elements, projecting
/// every value ordered by and joining the relations it traverses.
pub fn translate_order_by<'a>(
    env: &Env<'a>,
    state: &mut State,
    joins: &mut Joins,
    projection: &mut Projection,
    current: &EntityAndAlias<'a>,
    order_by: &OrderSpec,
) -> Result<Vec<OrderElement>, Error> {
    let mut elements = vec![];
    translate_order_terms(
        env,
        state,
        joins,
        projection,
        current,
        None,
        order_by,
        &mut elements,
    )?;
    Ok(elements)
}

#[allow(clippy::too_many_arguments)]
fn translate_order_terms<'a>(
    env: &Env<'a>,
    state: &mut State,
    joins: &mut Joins,
    projection: &mut Projection,
    current: &EntityAndAlias<'a>,
    prefix: Option<&str>,
    order_by: &OrderSpec,
    elements: &mut Vec<OrderElement>,
) -> Result<(), Error> {
    for (property, term) in &order_by.0 {
        let key = match prefix {
            Some(prefix) => format!("{prefix}.{property}"),
            None => property.clone(),
        };
        match (env.lookup_property(current, property)?, term) {
            (Property::Column(column), OrderTerm::Direction(direction)) => {
                let target = env.normalize(column, current.column(column));
                let alias = projection.add(state, &make_alias(&current.path, &column.name), target.clone());
                elements.push(OrderElement {
                    key,
                    alias,
                    target,
                    direction: *direction,
                    nullable: prefix.is_some() || !column.is_non_null(),
                    cursorable: true,
                });
            }
            (Property::Column(column), OrderTerm::Json(orders)) if column.r#type.is_json() => {
                for order in orders {
                    elements.push(translate_json_order(
                        state,
                        projection,
                        current,
                        column,
                        &key,
                        &order.path,
                        order.cast.unwrap_or(CastType::String),
                        order.order,
                    ));
                }
            }
            (Property::Relation(relation), OrderTerm::Nested(nested)) => {
                if relation.kind.is_to_many() {
                    return Err(Error::UnsupportedOperation(format!(
                        "Ordering by the to-many relation '{key}'"
                    )));
                }
                let target =
                    relationships::join_relation(env, state, joins, current, property, relation)?;
                translate_order_terms(
                    env,
                    state,
                    joins,
                    projection,
                    &target,
                    Some(&key),
                    nested,
                    elements,
                )?;
            }
            (_, term) => {
                return Err(Error::UnsupportedOperation(format!(
                    "Ordering '{key}' by {}",
                    describe(term)
                )))
            }
        }
    }
    Ok(())
}

/// `CAST(jsonb_extract_path_text(column, 'a', 'b') AS type)`
#[allow(clippy::too_many_arguments)]
fn translate_json_order(
    state: &mut State,
    projection: &mut Projection,
    current: &EntityAndAlias<'_>,
    column: &ColumnInfo,
    key: &str,
    path: &str,
    cast: CastType,
    direction: OrderDirection,
) -> OrderElement {
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    let mut arguments = vec![current.column(column)];
    arguments.extend(
        segments
            .iter()
            .map(|segment| state.make_parameter(serde_json::Value::String((*segment).to_string()))),
    );
    let target = sql::helpers::cast(
        sql::helpers::function_call(sql::ast::Function::JsonbExtractPathText, arguments),
        values::cast_type_name(cast),
    );
    let hint = make_alias(&current.path, &format!("{}_{}", column.name, segments.join("_")));
    let alias = projection.add(state, &hint, target.clone());
    OrderElement {
        key: format!("{key}.{path}"),
        alias,
        target,
        direction,
        nullable: true,
        cursorable: false,
    }
}

fn describe(term: &OrderTerm) -> &'static str {
    match term {
        OrderTerm::Direction(_) => "a direction",
        OrderTerm::Json(_) => "a JSON path",
        OrderTerm::Nested(_) => "a nested ordering",
    }
}

/// Make sure the ordering is total by appending a unique, non-null property of
/// the root entity if the ordering does not already include one. The primary key
/// is preferred, then single-property unique constraints, then `id`.
pub fn ensure_unique_order_by<'a>(
    state: &mut State,
    projection: &mut Projection,
    root: &EntityAndAlias<'a>,
    elements: &mut Vec<OrderElement>,
) -> Result<(), Error> {
    let candidates = root.info.unique_non_null_properties();
    // a folded string is no longer unique
    let unique = elements.iter().any(|element| {
        candidates.contains(&element.key.as_str())
            && root
                .info
                .column(&element.key)
                .is_some_and(|column| element.target == root.column(column))
    });
    if unique {
        return Ok(());
    }

    let property = candidates
        .first()
        .copied()
        .unwrap_or(metadata::DEFAULT_IDENTITY_PROPERTY);
    let column = root.info.column(property).ok_or_else(|| Error::Schema {
        entity: root.name.to_string(),
        path: property.to_string(),
    })?;
    let target = root.column(column);
    let alias = projection.add(state, &make_alias(&root.path, &column.name), target.clone());
    tracing::trace!(property, "appended unique ordering");
    elements.push(OrderElement {
        key: property.to_string(),
        alias,
        target,
        direction: OrderDirection::Asc,
        nullable: !column.is_non_null(),
        cursorable: true,
    });
    Ok(())
}
