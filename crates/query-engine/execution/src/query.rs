//! Execute compiled row queries and shape their results into pages.

use std::future::Future;
use std::pin::Pin;

use tracing::Instrument;

use query_engine_translation::translation::query::cursor;
use query_engine_translation::translation::query::fields::Field;
use query_engine_translation::translation::query::{CompiledPlan, FieldLoad, COUNT_ALIAS, LOAD_ID_VARIABLE};

use crate::error::Error;
use crate::executor::{self, Executor, Row, Variables};
use crate::metrics::Metrics;

/// The key of the cursor attached to every row of a cursorable page.
pub const CURSOR_KEY: &str = "_cursor";
/// Attached to the first row of a page.
pub const HAS_PREVIOUS_KEY: &str = "_hasPrev";
/// Attached to the last row of a page.
pub const HAS_NEXT_KEY: &str = "_hasNext";

/// A page of shaped rows, together with the number of rows matching the filter.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub total_count: u64,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// Execute a plan and shape its rows.
pub async fn execute(
    executor: &dyn Executor,
    metrics: &Metrics,
    plan: &CompiledPlan,
) -> Result<Page, Error> {
    execute_plan(executor, metrics, plan, Variables::new())
        .instrument(tracing::info_span!("Execute query", entity = %plan.entity))
        .await
}

/// Load one column of one row, e.g. a large column left out of default
/// selections. A missing row reads as `null`.
pub async fn load_field(
    executor: &dyn Executor,
    metrics: &Metrics,
    load: &FieldLoad,
    id: serde_json::Value,
) -> Result<serde_json::Value, Error> {
    let mut variables = Variables::new();
    variables.insert(LOAD_ID_VARIABLE.to_string(), id);
    let rows = executor::fetch(executor, metrics, &load.query, &variables).await?;
    match rows.into_iter().next() {
        Some(mut row) => row
            .remove(&load.alias.name)
            .ok_or_else(|| Error::MissingColumn(load.alias.name.clone())),
        None => Ok(serde_json::Value::Null),
    }
}

// Nested collections recurse, so the future is boxed.
fn execute_plan<'a>(
    executor: &'a dyn Executor,
    metrics: &'a Metrics,
    plan: &'a CompiledPlan,
    variables: Variables,
) -> Pin<Box<dyn Future<Output = Result<Page, Error>> + Send + 'a>> {
    Box::pin(async move {
        let mut rows =
            executor::fetch(executor, metrics, &plan.rows_query(), &variables).await?;

        let pagination = &plan.pagination;
        let has_more = match plan.page_size() {
            Some(size) => {
                let size = usize::try_from(size).unwrap_or(usize::MAX);
                let has_more = rows.len() > size;
                rows.truncate(size);
                has_more
            }
            None => false,
        };
        let skipped = pagination.skip.is_some_and(|skip| skip > 0);
        let (has_previous, has_next) = if pagination.backward {
            rows.reverse();
            (has_more, pagination.seek.is_some() || skipped)
        } else {
            (pagination.seek.is_some() || skipped, has_more)
        };

        let total_count = if plan.is_counted() {
            count(executor, metrics, plan, &variables).await?
        } else {
            rows.len() as u64
        };

        let mut shaped = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut object = shape_row(executor, metrics, &plan.fields, row).await?;
            if pagination.cursorable && !plan.order_by.is_empty() {
                object.insert(
                    CURSOR_KEY.to_string(),
                    serde_json::Value::String(cursor::row_cursor(&plan.order_by, row)),
                );
            }
            shaped.push(object);
        }
        if let Some(first) = shaped.first_mut() {
            first.insert(HAS_PREVIOUS_KEY.to_string(), serde_json::Value::Bool(has_previous));
        }
        if let Some(last) = shaped.last_mut() {
            last.insert(HAS_NEXT_KEY.to_string(), serde_json::Value::Bool(has_next));
        }

        Ok(Page {
            total_count,
            rows: shaped,
        })
    })
}

async fn count(
    executor: &dyn Executor,
    metrics: &Metrics,
    plan: &CompiledPlan,
    variables: &Variables,
) -> Result<u64, Error> {
    let rows = executor::fetch(executor, metrics, &plan.count_query(), variables).await?;
    let value = rows
        .first()
        .and_then(|row| row.get(COUNT_ALIAS))
        .ok_or_else(|| Error::MissingColumn(COUNT_ALIAS.to_string()))?;
    let count = match value {
        serde_json::Value::Number(number) => number.as_u64(),
        serde_json::Value::String(text) => text.parse().ok(),
        _ => None,
    };
    count.ok_or_else(|| Error::InvalidCount(value.clone()))
}

/// Read a flat row back into an object following the compiled fields.
/// Collections are fetched one parent row at a time.
fn shape_row<'a>(
    executor: &'a dyn Executor,
    metrics: &'a Metrics,
    fields: &'a [Field],
    row: &'a Row,
) -> Pin<Box<dyn Future<Output = Result<serde_json::Map<String, serde_json::Value>, Error>> + Send + 'a>>
{
    Box::pin(async move {
        let mut object = serde_json::Map::new();
        for field in fields {
            let value = match field {
                Field::Column { alias, .. } => column(row, &alias.name)?.clone(),
                Field::Reference {
                    identity, fields, ..
                } => {
                    if column(row, &identity.name)?.is_null() {
                        serde_json::Value::Null
                    } else {
                        serde_json::Value::Object(
                            shape_row(executor, metrics, fields, row).await?,
                        )
                    }
                }
                Field::Collection {
                    key,
                    variable,
                    plan,
                } => {
                    let mut variables = Variables::new();
                    variables.insert(variable.name.clone(), column(row, &variable.name)?.clone());
                    metrics.subquery_total.inc();
                    let page = execute_plan(executor, metrics, plan, variables)
                        .instrument(tracing::debug_span!("Execute collection", relation = key.as_str()))
                        .await?;
                    serde_json::to_value(page).map_err(|err| Error::Executor(Box::new(err)))?
                }
            };
            object.insert(field.key().to_string(), value);
        }
        Ok(object)
    })
}

fn column<'a>(row: &'a Row, alias: &str) -> Result<&'a serde_json::Value, Error> {
    row.get(alias)
        .ok_or_else(|| Error::MissingColumn(alias.to_string()))
}
