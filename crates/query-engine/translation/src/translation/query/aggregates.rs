//! Handle aggregate queries: aggregate functions, grouping and `having`.
//!
//! Every projected aggregate is recorded with the logical path it answers, e.g.
//! `avg.addresses.country.version`, so flat result rows can be reshaped into
//! nested objects whatever the aliases ended up being shortened to.

use indexmap::IndexMap;

use query_engine_metadata::metadata::{ComparisonOperator, Property};
use query_engine_models::{AggregateField, AggregateFunction, AggregateSelection, AggregateSpec, Combinator};
use query_engine_sql::sql;

use super::filtering;
use super::relationships::{self, Joins};
use crate::translation::error::Error;
use crate::translation::helpers::{EntityAndAlias, Env, Projection, State};

/// The prefix of grouped values in a reshaped row.
pub const GROUP_BY_KEY: &str = "groupBy";

/// A compiled aggregate query.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatePlan {
    pub entity: String,
    pub query: sql::execution_plan::Query,
    /// Projected column alias to the logical paths it answers.
    pub aliases: IndexMap<String, Vec<String>>,
}

pub fn translate_aggregate_plan<'a>(
    env: &Env<'a>,
    state: &mut State,
    entity: &str,
    spec: &AggregateSpec,
) -> Result<AggregatePlan, Error> {
    let root = env.root(state, entity)?;
    let mut joins = Joins::default();
    let mut projection = Projection::default();
    let mut aliases: IndexMap<String, Vec<String>> = IndexMap::new();

    let mut filter_joins = Joins::default();
    let predicate = match &spec.predicate {
        Some(predicate) => {
            filtering::translate_where(env, state, &mut filter_joins, &root, predicate)?
        }
        None => sql::helpers::true_expr(),
    };
    // Rows repeated by a to-many filter join must be aggregated once.
    let predicate = if filter_joins.fans_out {
        semi_join(env, &root, filter_joins, predicate)?
    } else {
        joins.extend(filter_joins);
        predicate
    };

    for function in enum_iterator::all::<AggregateFunction>() {
        let Some(selection) = spec.selection(function) else {
            continue;
        };
        let mut targets = vec![];
        resolve_selection(env, state, &mut joins, &root, function.name(), selection, &mut targets)?;
        for (path, column) in targets {
            let alias = projection.add(
                state,
                &path.replace('.', "_"),
                aggregate_expression(function, column),
            );
            aliases.entry(alias.name).or_default().push(path);
        }
    }

    let mut group_by = vec![];
    if let Some(selection) = &spec.group_by {
        let mut targets = vec![];
        resolve_selection(env, state, &mut joins, &root, GROUP_BY_KEY, selection, &mut targets)?;
        for (path, column) in targets {
            let column = sql::ast::Expression::ColumnReference(column);
            let alias = projection.add(state, &path.replace('.', "_"), column.clone());
            aliases.entry(alias.name).or_default().push(path);
            if !group_by.contains(&column) {
                group_by.push(column);
            }
        }
    }

    let having = match &spec.having {
        Some(having) => translate_having(env, state, &mut joins, &root, having)?,
        None => sql::helpers::true_expr(),
    };

    if projection.is_empty() {
        return Err(Error::UnsupportedOperation(
            "An aggregate query without aggregates or groups".to_string(),
        ));
    }

    let mut select = sql::helpers::simple_select(projection.into_select_list());
    select.from = Some(root.from());
    select.joins = joins.into_sorted();
    select.where_ = sql::ast::Where(predicate);
    select.group_by = sql::ast::GroupBy { elements: group_by };
    select.having = sql::ast::Having(having);
    select.limit = sql::ast::Limit {
        limit: spec.take,
        offset: spec.skip,
    };

    Ok(AggregatePlan {
        entity: root.name.to_string(),
        query: sql::execution_plan::Query::new(select),
        aliases,
    })
}

/// `self.id IN (SELECT self.id FROM ... WHERE predicate)`, the filter applied
/// without joining its relations into the aggregated rows.
fn semi_join<'a>(
    env: &Env<'a>,
    root: &EntityAndAlias<'a>,
    joins: Joins,
    predicate: sql::ast::Expression,
) -> Result<sql::ast::Expression, Error> {
    let (_, identity) = env.identity(root)?;
    let mut select = sql::helpers::simple_select(vec![(
        sql::helpers::make_column_alias(identity.name.clone()),
        root.column(identity),
    )]);
    select.from = Some(root.from());
    select.joins = joins.into_sorted();
    select.where_ = sql::ast::Where(predicate);
    Ok(sql::ast::Expression::InSelect {
        expression: Box::new(root.column(identity)),
        select: Box::new(select),
    })
}

/// Resolve an aggregate selection to the columns it applies to, together with
/// their logical paths. A relation flagged `true` stands for its identity column.
fn resolve_selection<'a>(
    env: &Env<'a>,
    state: &mut State,
    joins: &mut Joins,
    current: &EntityAndAlias<'a>,
    prefix: &str,
    selection: &AggregateSelection,
    targets: &mut Vec<(String, sql::ast::ColumnReference)>,
) -> Result<(), Error> {
    for (property, field) in &selection.0 {
        let path = format!("{prefix}.{property}");
        match (env.lookup_property(current, property)?, field) {
            (_, AggregateField::Flag(false)) => {}
            (Property::Column(column), AggregateField::Flag(true)) => {
                targets.push((path, current.column_reference(column)));
            }
            (Property::Column(_), AggregateField::Nested(_)) => {
                return Err(Error::UnsupportedOperation(format!(
                    "A nested aggregate selection on the column '{path}'"
                )))
            }
            (Property::Relation(relation), AggregateField::Flag(true)) => {
                let target =
                    relationships::join_relation(env, state, joins, current, property, relation)?;
                let (_, identity) = env.identity(&target)?;
                targets.push((path, target.column_reference(identity)));
            }
            (Property::Relation(relation), AggregateField::Nested(nested)) => {
                let target =
                    relationships::join_relation(env, state, joins, current, property, relation)?;
                resolve_selection(env, state, joins, &target, &path, nested, targets)?;
            }
        }
    }
    Ok(())
}

fn aggregate_expression(
    function: AggregateFunction,
    column: sql::ast::ColumnReference,
) -> sql::ast::Expression {
    let function = match function {
        AggregateFunction::Count => {
            return sql::ast::Expression::Count(sql::ast::CountType::Simple(column))
        }
        AggregateFunction::Avg => sql::ast::Function::Avg,
        AggregateFunction::Sum => sql::ast::Function::Sum,
        AggregateFunction::Min => sql::ast::Function::Min,
        AggregateFunction::Max => sql::ast::Function::Max,
    };
    sql::helpers::function_call(function, vec![sql::ast::Expression::ColumnReference(column)])
}

/// `having: { count: { id: { gt: 2 } }, OR: [...] }`
fn translate_having<'a>(
    env: &Env<'a>,
    state: &mut State,
    joins: &mut Joins,
    root: &EntityAndAlias<'a>,
    having: &serde_json::Value,
) -> Result<sql::ast::Expression, Error> {
    let object = match having {
        serde_json::Value::Null => return Ok(sql::helpers::true_expr()),
        serde_json::Value::Object(object) => object,
        other => return Err(Error::type_mismatch("having", "an object", other)),
    };

    let mut terms = vec![];
    for (key, value) in object {
        if let Some(combinator) = Combinator::from_key(key) {
            let children: Vec<&serde_json::Value> = match value {
                serde_json::Value::Array(items) => items.iter().collect(),
                serde_json::Value::Object(_) => vec![value],
                other => {
                    return Err(Error::type_mismatch(key, "a condition or a list of conditions", other))
                }
            };
            let children = children
                .into_iter()
                .map(|child| translate_having(env, state, joins, root, child))
                .collect::<Result<Vec<_>, Error>>()?;
            if children.is_empty() {
                continue;
            }
            terms.push(match combinator {
                Combinator::And => sql::helpers::and_all(children),
                Combinator::Or => sql::helpers::or_all(children),
                Combinator::Not => sql::helpers::not(sql::helpers::and_all(children)),
            });
            continue;
        }

        let function = AggregateFunction::from_name(key).ok_or_else(|| Error::Schema {
            entity: root.name.to_string(),
            path: format!("having.{key}"),
        })?;
        terms.push(translate_having_function(env, state, joins, root, function, value)?);
    }
    Ok(sql::helpers::and_all(terms))
}

fn translate_having_function<'a>(
    env: &Env<'a>,
    state: &mut State,
    joins: &mut Joins,
    current: &EntityAndAlias<'a>,
    function: AggregateFunction,
    value: &serde_json::Value,
) -> Result<sql::ast::Expression, Error> {
    let serde_json::Value::Object(fields) = value else {
        return Err(Error::type_mismatch(function.name(), "an object of conditions", value));
    };

    let mut terms = vec![];
    for (property, condition) in fields {
        match env.lookup_property(current, property)? {
            Property::Column(column) => {
                let target = aggregate_expression(function, current.column_reference(column));
                terms.extend(translate_condition(state, property, &target, condition)?);
            }
            Property::Relation(relation) => {
                let related =
                    relationships::join_relation(env, state, joins, current, property, relation)?;
                if is_condition(condition) {
                    let (_, identity) = env.identity(&related)?;
                    let target = aggregate_expression(function, related.column_reference(identity));
                    terms.extend(translate_condition(state, property, &target, condition)?);
                } else {
                    terms.push(translate_having_function(
                        env, state, joins, &related, function, condition,
                    )?);
                }
            }
        }
    }
    Ok(sql::helpers::and_all(terms))
}

/// An object whose keys are all comparison operators.
fn is_condition(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Object(object) => {
            !object.is_empty()
                && object
                    .keys()
                    .all(|key| ComparisonOperator::from_name(key).is_some())
        }
        _ => true,
    }
}

fn translate_condition(
    state: &mut State,
    field: &str,
    target: &sql::ast::Expression,
    condition: &serde_json::Value,
) -> Result<Vec<sql::ast::Expression>, Error> {
    match condition {
        serde_json::Value::Object(operators) => operators
            .iter()
            .map(|(name, operand)| {
                let operator = ComparisonOperator::from_name(name).ok_or_else(|| {
                    Error::invalid_filter(field, format!("unknown operator '{name}'"))
                })?;
                filtering::translate_comparison(state, target.clone(), operator, operand, |e| e)
            })
            .collect(),
        bare => Ok(vec![filtering::translate_comparison(
            state,
            target.clone(),
            ComparisonOperator::Equals,
            bare,
            |e| e,
        )?]),
    }
}
