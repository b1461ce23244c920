//! Handle filtering/where clauses translation.

use query_engine_metadata::metadata::{ColumnInfo, ComparisonOperator, EntityInfo, Property};
use query_engine_models::{Combinator, FilterTree, WhereInput};
use query_engine_sql::sql;

use super::json_path;
use super::relationships::{self, Joins};
use super::values;
use crate::translation::error::Error;
use crate::translation::helpers::{EntityAndAlias, Env, State};

/// Translate a `where` clause against the entity it applies to.
/// A missing or empty clause translates to `true`.
pub fn translate_where<'a>(
    env: &Env<'a>,
    state: &mut State,
    joins: &mut Joins,
    current: &EntityAndAlias<'a>,
    predicate: &WhereInput,
) -> Result<sql::ast::Expression, Error> {
    match parse_filter(env, current.name, current.info, predicate)? {
        None => Ok(sql::helpers::true_expr()),
        Some(filter) => translate_filter(env, state, joins, current, &filter),
    }
}

// Parsing //

/// Resolve a raw `where` clause into a filter tree. Every key is checked against
/// the metadata: it must be a combinator, a column or a relation of the entity.
pub fn parse_filter(
    env: &Env<'_>,
    entity: &str,
    info: &EntityInfo,
    value: &serde_json::Value,
) -> Result<Option<FilterTree>, Error> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Object(object) => {
            let filters = parse_object(env, entity, info, object)?;
            Ok(if filters.is_empty() {
                None
            } else {
                Some(FilterTree::and(filters))
            })
        }
        other => Err(Error::type_mismatch(entity, "a filter object", other)),
    }
}

fn parse_object(
    env: &Env<'_>,
    entity: &str,
    info: &EntityInfo,
    object: &serde_json::Map<String, serde_json::Value>,
) -> Result<Vec<FilterTree>, Error> {
    let mut filters = vec![];
    for (key, value) in object {
        if let Some(combinator) = Combinator::from_key(key) {
            let children: Vec<FilterTree> = match value {
                serde_json::Value::Array(items) => items
                    .iter()
                    .map(|item| parse_filter(env, entity, info, item))
                    .collect::<Result<Vec<_>, Error>>()?
                    .into_iter()
                    .flatten()
                    .collect(),
                serde_json::Value::Object(_) => {
                    parse_filter(env, entity, info, value)?.into_iter().collect()
                }
                other => {
                    return Err(Error::type_mismatch(key, "a filter or a list of filters", other))
                }
            };
            // empty combinators compile to nothing
            if !children.is_empty() {
                filters.push(FilterTree::Combinator {
                    combinator,
                    children,
                });
            }
            continue;
        }

        match info.property(key) {
            None => {
                return Err(Error::Schema {
                    entity: entity.to_string(),
                    path: key.clone(),
                })
            }
            Some(Property::Column(column)) if column.r#type.is_json() => {
                filters.extend(parse_json_filter(key, value)?);
            }
            Some(Property::Column(column)) => {
                filters.extend(parse_comparisons(key, column, value)?);
            }
            Some(Property::Relation(relation)) => {
                let (target_name, target_info) = env.lookup_entity(&relation.target)?;
                let filter = match value {
                    serde_json::Value::Null => {
                        let (identity, _) =
                            target_info.identity().ok_or_else(|| Error::Schema {
                                entity: target_name.to_string(),
                                path: query_engine_metadata::metadata::DEFAULT_IDENTITY_PROPERTY
                                    .to_string(),
                            })?;
                        FilterTree::Comparison {
                            field: identity.to_string(),
                            operator: ComparisonOperator::Equals,
                            value: serde_json::Value::Null,
                        }
                    }
                    serde_json::Value::Object(_) => {
                        match parse_filter(env, target_name, target_info, value)? {
                            Some(filter) => filter,
                            None => continue,
                        }
                    }
                    other => {
                        return Err(Error::type_mismatch(
                            key,
                            "a filter on the related entity",
                            other,
                        ))
                    }
                };
                filters.push(FilterTree::Relation {
                    field: key.clone(),
                    filter: Box::new(filter),
                });
            }
        }
    }
    Ok(filters)
}

/// `field: value` or `field: { op: value, ... }`. Several operators are ANDed.
fn parse_comparisons(
    field: &str,
    column: &ColumnInfo,
    value: &serde_json::Value,
) -> Result<Vec<FilterTree>, Error> {
    match value {
        serde_json::Value::Object(operators) => operators
            .iter()
            .map(|(name, operand)| {
                let operator = ComparisonOperator::from_name(name).ok_or_else(|| {
                    Error::invalid_filter(field, format!("unknown operator '{name}'"))
                })?;
                if !column.r#type.comparison_operators().contains(&operator) {
                    return Err(Error::UnsupportedOperation(format!(
                        "Operator '{operator}' on '{field}' of type {}",
                        column.r#type
                    )));
                }
                check_operand(field, operator, operand)?;
                for item in operands(operator, operand) {
                    values::check_value(field, item, column.r#type)?;
                }
                Ok(FilterTree::Comparison {
                    field: field.to_string(),
                    operator,
                    value: operand.clone(),
                })
            })
            .collect(),
        serde_json::Value::Array(_) => Err(Error::type_mismatch(field, "a single value", value)),
        bare => {
            values::check_value(field, bare, column.r#type)?;
            Ok(vec![FilterTree::Comparison {
                field: field.to_string(),
                operator: ComparisonOperator::Equals,
                value: bare.clone(),
            }])
        }
    }
}

/// `field: { path, op: value, type? }`, or a list of those.
fn parse_json_filter(field: &str, value: &serde_json::Value) -> Result<Vec<FilterTree>, Error> {
    match value {
        serde_json::Value::Null => Ok(vec![FilterTree::Comparison {
            field: field.to_string(),
            operator: ComparisonOperator::Equals,
            value: serde_json::Value::Null,
        }]),
        serde_json::Value::Array(leaves) => leaves
            .iter()
            .map(|leaf| parse_json_leaf(field, leaf))
            .collect(),
        leaf => Ok(vec![parse_json_leaf(field, leaf)?]),
    }
}

fn parse_json_leaf(field: &str, leaf: &serde_json::Value) -> Result<FilterTree, Error> {
    let serde_json::Value::Object(leaf) = leaf else {
        return Err(Error::type_mismatch(field, "a JSON path filter", leaf));
    };

    let path = match leaf.get("path") {
        None => vec![],
        Some(serde_json::Value::String(path)) => path
            .split('.')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect(),
        Some(other) => return Err(Error::type_mismatch(field, "a dotted path", other)),
    };

    let cast = match leaf.get("type") {
        None | Some(serde_json::Value::Null) => None,
        Some(cast) => Some(
            serde_json::from_value(cast.clone())
                .map_err(|_| Error::invalid_filter(field, format!("unknown type {cast}")))?,
        ),
    };

    // only the first recognized operator counts
    let (operator, value) = leaf
        .iter()
        .find_map(|(key, value)| ComparisonOperator::from_name(key).map(|op| (op, value)))
        .ok_or_else(|| Error::invalid_filter(field, "no recognized operator"))?;
    check_operand(field, operator, value)?;

    Ok(FilterTree::Json {
        field: field.to_string(),
        path,
        operator,
        value: value.clone(),
        cast,
    })
}

/// List operators take a list, range operators exactly two bounds, the rest a single value.
fn check_operand(
    field: &str,
    operator: ComparisonOperator,
    operand: &serde_json::Value,
) -> Result<(), Error> {
    match (operator, operand) {
        (ComparisonOperator::In | ComparisonOperator::NotIn, serde_json::Value::Array(_)) => Ok(()),
        (ComparisonOperator::In | ComparisonOperator::NotIn, other) => {
            Err(Error::type_mismatch(field, "a list of values", other))
        }
        (ComparisonOperator::Between | ComparisonOperator::NotBetween, serde_json::Value::Array(bounds))
            if bounds.len() == 2 =>
        {
            Ok(())
        }
        (ComparisonOperator::Between | ComparisonOperator::NotBetween, other) => {
            Err(Error::type_mismatch(field, "a pair of bounds", other))
        }
        (_, serde_json::Value::Array(_)) => {
            Err(Error::type_mismatch(field, "a single value", operand))
        }
        _ => Ok(()),
    }
}

/// The individual values an operand consists of.
fn operands(operator: ComparisonOperator, operand: &serde_json::Value) -> Vec<&serde_json::Value> {
    match (operator.takes_list(), operand) {
        (true, serde_json::Value::Array(items)) => items.iter().collect(),
        _ => vec![operand],
    }
}

// Translation //

/// Translate a filter tree to a boolean expression, adding the joins it needs.
pub fn translate_filter<'a>(
    env: &Env<'a>,
    state: &mut State,
    joins: &mut Joins,
    current: &EntityAndAlias<'a>,
    filter: &FilterTree,
) -> Result<sql::ast::Expression, Error> {
    match filter {
        FilterTree::Combinator {
            combinator,
            children,
        } => {
            let children = children
                .iter()
                .map(|child| translate_filter(env, state, joins, current, child))
                .collect::<Result<Vec<_>, Error>>()?;
            Ok(match combinator {
                Combinator::And => sql::helpers::and_all(children),
                Combinator::Or => sql::helpers::or_all(children),
                Combinator::Not => sql::helpers::not(sql::helpers::and_all(children)),
            })
        }
        FilterTree::Comparison {
            field,
            operator,
            value,
        } => {
            let column = lookup_column(current, field)?;
            let left = env.normalize(column, current.column(column));
            translate_comparison(state, left, *operator, value, |value| {
                env.normalize(column, value)
            })
        }
        FilterTree::Relation { field, filter } => {
            let Some(Property::Relation(relation)) = current.info.property(field) else {
                return Err(Error::Schema {
                    entity: current.name.to_string(),
                    path: field.clone(),
                });
            };
            if let Some(expression) = translate_null_relation(env, current, relation, filter)? {
                return Ok(expression);
            }
            let target = relationships::join_relation(env, state, joins, current, field, relation)?;
            translate_filter(env, state, joins, &target, filter)
        }
        FilterTree::Json {
            field,
            path,
            operator,
            value,
            cast,
        } => {
            let column = lookup_column(current, field)?;
            json_path::translate_json_predicate(
                env,
                state,
                current.column(column),
                path,
                *operator,
                value,
                *cast,
            )
        }
    }
}

fn lookup_column<'a>(current: &EntityAndAlias<'a>, field: &str) -> Result<&'a ColumnInfo, Error> {
    current.info.column(field).ok_or_else(|| Error::Schema {
        entity: current.name.to_string(),
        path: field.to_string(),
    })
}

/// `relation: null`, `relation: { id: null }` and the `eq`/`ne` forms of the latter only
/// need the join column of an owning to-one relation, not a join.
fn translate_null_relation<'a>(
    env: &Env<'a>,
    current: &EntityAndAlias<'a>,
    relation: &'a query_engine_metadata::metadata::RelationInfo,
    filter: &FilterTree,
) -> Result<Option<sql::ast::Expression>, Error> {
    let FilterTree::Comparison {
        field,
        operator,
        value: serde_json::Value::Null,
    } = filter
    else {
        return Ok(None);
    };
    let Some(join_column) = relation.join_column.as_deref() else {
        return Ok(None);
    };
    if !relation.is_owning() || relation.kind.is_to_many() {
        return Ok(None);
    }
    let (_, target) = env.lookup_entity(&relation.target)?;
    if target.identity().map(|(identity, _)| identity) != Some(field.as_str()) {
        return Ok(None);
    }
    Ok(match operator {
        ComparisonOperator::Equals => Some(sql::helpers::is_null(current.column_named(join_column))),
        ComparisonOperator::NotEquals => {
            Some(sql::helpers::is_not_null(current.column_named(join_column)))
        }
        _ => None,
    })
}

/// Translate a single comparison of `left` against a value. Each value is bound to
/// its own parameter and passed through `wrap` before it is compared.
pub fn translate_comparison(
    state: &mut State,
    left: sql::ast::Expression,
    operator: ComparisonOperator,
    value: &serde_json::Value,
    wrap: impl Fn(sql::ast::Expression) -> sql::ast::Expression,
) -> Result<sql::ast::Expression, Error> {
    let binary_operator = match operator {
        ComparisonOperator::Equals if value.is_null() => return Ok(sql::helpers::is_null(left)),
        ComparisonOperator::NotEquals if value.is_null() => {
            return Ok(sql::helpers::is_not_null(left))
        }
        ComparisonOperator::Equals => sql::ast::BinaryOperator::Equals,
        ComparisonOperator::NotEquals => sql::ast::BinaryOperator::NotEquals,
        ComparisonOperator::LessThan => sql::ast::BinaryOperator::LessThan,
        ComparisonOperator::LessThanOrEqualTo => sql::ast::BinaryOperator::LessThanOrEqualTo,
        ComparisonOperator::GreaterThan => sql::ast::BinaryOperator::GreaterThan,
        ComparisonOperator::GreaterThanOrEqualTo => {
            sql::ast::BinaryOperator::GreaterThanOrEqualTo
        }
        ComparisonOperator::Like => sql::ast::BinaryOperator::Like,
        ComparisonOperator::NotLike => sql::ast::BinaryOperator::NotLike,
        ComparisonOperator::In | ComparisonOperator::NotIn => {
            let items = value.as_array().ok_or_else(|| {
                Error::type_mismatch(operator.name(), "a list of values", value)
            })?;
            let negated = operator == ComparisonOperator::NotIn;
            if items.is_empty() {
                // nothing is in an empty list
                return Ok(if negated {
                    sql::helpers::true_expr()
                } else {
                    sql::helpers::false_expr()
                });
            }
            return Ok(sql::ast::Expression::BinaryArrayOperation {
                left: Box::new(left),
                operator: if negated {
                    sql::ast::BinaryArrayOperator::NotIn
                } else {
                    sql::ast::BinaryArrayOperator::In
                },
                right: items
                    .iter()
                    .map(|item| wrap(state.make_parameter(item.clone())))
                    .collect(),
            });
        }
        ComparisonOperator::Between | ComparisonOperator::NotBetween => {
            let Some([low, high]) = value.as_array().map(Vec::as_slice) else {
                return Err(Error::type_mismatch(operator.name(), "a pair of bounds", value));
            };
            let low = wrap(state.make_parameter(low.clone()));
            let high = wrap(state.make_parameter(high.clone()));
            return Ok(sql::ast::Expression::Between {
                expression: Box::new(left),
                low: Box::new(low),
                high: Box::new(high),
                negated: operator == ComparisonOperator::NotBetween,
            });
        }
    };
    let right = wrap(state.make_parameter(value.clone()));
    Ok(sql::helpers::binary(left, binary_operator, right))
}
