//! Translate an incoming `QuerySpec` or `AggregateSpec`.

pub mod aggregates;
pub mod cursor;
pub mod fields;
pub mod filtering;
pub mod json_path;
pub mod relationships;
pub mod sorting;
pub mod values;

use query_engine_configuration::CompilerSettings;
use query_engine_metadata::metadata;
use query_engine_models::{AggregateSpec, QuerySpec};
use query_engine_sql::sql;

use crate::translation::error::{CompileError, Error};
use crate::translation::helpers::{make_alias, Env, Projection, State};
use aggregates::AggregatePlan;
use fields::Field;
use relationships::{CollectionLink, Joins};
use sorting::OrderElement;

/// The alias of the total count column.
pub const COUNT_ALIAS: &str = "count";

/// The variable an id-keyed field load is bound from.
pub const LOAD_ID_VARIABLE: &str = "id";

/// A compiled row query, ready to be executed and reshaped.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPlan {
    pub entity: String,
    pub from: sql::ast::From,
    /// Set when a to-many relation is joined for filtering, so root rows may repeat.
    pub distinct: bool,
    pub select_list: Vec<(sql::ast::ColumnAlias, sql::ast::Expression)>,
    /// Joins ordered parents first.
    pub joins: Vec<sql::ast::Join>,
    /// The `where` clause, including the link to a parent row for nested plans.
    pub predicate: sql::ast::Expression,
    pub order_by: Vec<OrderElement>,
    pub fields: Vec<Field>,
    pub pagination: Pagination,
    /// The identity column of the root entity.
    pub identity: sql::ast::Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pagination {
    pub take: Option<i64>,
    pub skip: Option<u64>,
    /// The predicate seeking past the requested cursor, if one was applied.
    pub seek: Option<sql::ast::Expression>,
    /// Rows are read in reverse order and flipped back by the runner.
    pub backward: bool,
    /// Whether rows of this plan can produce cursors.
    pub cursorable: bool,
}

impl CompiledPlan {
    /// The query reading a page of rows. One row more than requested is read to
    /// tell whether there is more in the reading direction.
    pub fn rows_query(&self) -> sql::execution_plan::Query {
        let mut select = self.base_select();
        if let Some(seek) = &self.pagination.seek {
            select.where_ = sql::ast::Where(sql::helpers::and(self.predicate.clone(), seek.clone()));
        }
        select.order_by = sql::ast::OrderBy {
            elements: self
                .order_by
                .iter()
                .map(|element| element.to_sql(self.pagination.backward))
                .collect(),
        };
        select.limit = sql::ast::Limit {
            limit: self.pagination.take.map(|take| take.unsigned_abs() + 1),
            offset: self.pagination.skip,
        };
        sql::execution_plan::Query::new(select)
    }

    /// The query counting every row matching the filter, regardless of pagination.
    pub fn count_query(&self) -> sql::execution_plan::Query {
        sql::execution_plan::Query::new(sql::helpers::count_select(
            &self.base_select(),
            self.identity.clone(),
            sql::helpers::make_column_alias(COUNT_ALIAS.to_string()),
        ))
    }

    /// The number of rows requested, if the plan is limited.
    pub fn page_size(&self) -> Option<u64> {
        self.pagination.take.map(i64::unsigned_abs)
    }

    /// Whether the rows read are only part of the result, so the total needs
    /// the count query.
    pub fn is_counted(&self) -> bool {
        self.pagination.take.is_some()
            || self.pagination.skip.is_some_and(|skip| skip > 0)
            || self.pagination.seek.is_some()
    }

    fn base_select(&self) -> sql::ast::Select {
        let mut select = sql::helpers::simple_select(self.select_list.clone());
        select.distinct = self.distinct;
        select.from = Some(self.from.clone());
        select.joins.clone_from(&self.joins);
        select.where_ = sql::ast::Where(self.predicate.clone());
        select
    }
}

/// Translate a query on an entity into a plan.
pub fn translate(
    metadata: &metadata::Metadata,
    settings: &CompilerSettings,
    entity: &str,
    query: &QuerySpec,
) -> Result<CompiledPlan, CompileError> {
    let span = tracing::info_span!("Translate query", entity);
    let _enter = span.enter();

    let env = Env::new(metadata, settings);
    let mut state = State::new(settings.max_identifier_length);
    let plan = translate_plan(&env, &mut state, entity, query, None).map_err(|source| {
        CompileError {
            entity: entity.to_string(),
            query: serde_json::to_value(query).unwrap_or_default(),
            source,
        }
    })?;

    let rows = plan.rows_query().query_sql();
    tracing::debug!(generated_sql = %rows.sql, params = ?rows.params, "compiled query");
    Ok(plan)
}

/// Translate an aggregate query on an entity into a plan.
pub fn translate_aggregate(
    metadata: &metadata::Metadata,
    settings: &CompilerSettings,
    entity: &str,
    spec: &AggregateSpec,
) -> Result<AggregatePlan, CompileError> {
    let span = tracing::info_span!("Translate aggregate", entity);
    let _enter = span.enter();

    let env = Env::new(metadata, settings);
    let mut state = State::new(settings.max_identifier_length);
    let plan = aggregates::translate_aggregate_plan(&env, &mut state, entity, spec).map_err(
        |source| CompileError {
            entity: entity.to_string(),
            query: serde_json::to_value(spec).unwrap_or_default(),
            source,
        },
    )?;

    let sql = plan.query.query_sql();
    tracing::debug!(generated_sql = %sql.sql, params = ?sql.params, "compiled aggregate");
    Ok(plan)
}

/// A query loading one column of one row, by identity.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldLoad {
    pub query: sql::execution_plan::Query,
    pub alias: sql::ast::ColumnAlias,
}

/// Translate the lazy load of a column left out of default selections. The
/// identity is bound from the variable [`LOAD_ID_VARIABLE`].
pub fn translate_field_load(
    metadata: &metadata::Metadata,
    settings: &CompilerSettings,
    entity: &str,
    field: &str,
) -> Result<FieldLoad, CompileError> {
    let span = tracing::info_span!("Translate field load", entity, field);
    let _enter = span.enter();

    let env = Env::new(metadata, settings);
    let mut state = State::new(settings.max_identifier_length);
    translate_field_load_plan(&env, &mut state, entity, field).map_err(|source| CompileError {
        entity: entity.to_string(),
        query: serde_json::json!({ "load": field }),
        source,
    })
}

fn translate_field_load_plan(
    env: &Env<'_>,
    state: &mut State,
    entity: &str,
    field: &str,
) -> Result<FieldLoad, Error> {
    let root = env.root(state, entity)?;
    let column = root.info.column(field).ok_or_else(|| Error::Schema {
        entity: root.name.to_string(),
        path: field.to_string(),
    })?;
    let (_, identity) = env.identity(&root)?;
    let alias = state.make_column_alias(&make_alias(&root.path, &column.name));
    let mut select = sql::helpers::simple_select(vec![(alias.clone(), root.column(column))]);
    select.from = Some(root.from());
    select.where_ = sql::ast::Where(sql::helpers::binary(
        root.column(identity),
        sql::ast::BinaryOperator::Equals,
        state.make_variable(LOAD_ID_VARIABLE),
    ));
    Ok(FieldLoad {
        query: sql::execution_plan::Query::new(select),
        alias,
    })
}

/// Translate a query into a plan, sharing `state` with the enclosing plan.
/// Nested plans are linked to the row of their parent through `link`.
pub(crate) fn translate_plan<'a>(
    env: &Env<'a>,
    state: &mut State,
    entity: &str,
    query: &QuerySpec,
    link: Option<(&CollectionLink<'a>, &str)>,
) -> Result<CompiledPlan, Error> {
    let root = env.root(state, entity)?;
    let (_, identity) = env.identity(&root)?;
    let mut joins = Joins::default();
    let mut projection = Projection::default();

    // filtering first, so parameters follow the order of the request
    let mut predicate = match &query.predicate {
        Some(predicate) => filtering::translate_where(env, state, &mut joins, &root, predicate)?,
        None => sql::helpers::true_expr(),
    };
    if let Some((link, variable)) = link {
        let condition = relationships::translate_collection_link(
            state, &mut joins, &root, link, identity, variable,
        );
        predicate = sql::helpers::and(predicate, condition);
    }

    let mut order_by = match &query.order_by {
        Some(order_by) => {
            sorting::translate_order_by(env, state, &mut joins, &mut projection, &root, order_by)?
        }
        None => vec![],
    };
    if query.is_paginated() {
        sorting::ensure_unique_order_by(state, &mut projection, &root, &mut order_by)?;
    }

    let fields = fields::translate_select(
        env,
        state,
        &mut joins,
        &mut projection,
        &root,
        query.select.as_ref(),
    )?;
    if projection.is_empty() {
        projection.add(state, &make_alias(&root.path, &identity.name), root.column(identity));
    }

    let backward = query.take.is_some_and(|take| take < 0);
    let cursorable = order_by.iter().all(|element| element.cursorable);
    let seek = match (&query.cursor, cursorable) {
        (Some(cursor), true) => cursor::read_cursor(cursor, &order_by)
            .map(|entries| cursor::seek_predicate(state, &order_by, &entries, backward)),
        (Some(_), false) => {
            tracing::warn!(entity, "ignoring cursor, the ordering includes JSON values");
            None
        }
        (None, _) => None,
    };

    Ok(CompiledPlan {
        entity: root.name.to_string(),
        from: root.from(),
        distinct: joins.fans_out,
        select_list: projection.into_select_list(),
        joins: joins.into_sorted(),
        predicate,
        order_by,
        fields,
        pagination: Pagination {
            take: query.take,
            skip: query.skip,
            seek,
            backward,
            cursorable,
        },
        identity: root.column(identity),
    })
}
