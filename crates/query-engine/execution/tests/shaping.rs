mod common;

use query_engine_execution::error::Error;
use query_engine_execution::executor::{Executor, Row, Statement};
use query_engine_execution::{aggregates, query};
use query_engine_models::{AggregateSpec, QuerySpec};
use query_engine_sql::sql;
use query_engine_translation::translation::query::fields::Field;
use query_engine_translation::translation::query::{
    translate, translate_aggregate, translate_field_load, CompiledPlan,
};
use serde_json::json;
use similar_asserts::assert_eq;

async fn compile(query: serde_json::Value) -> anyhow::Result<CompiledPlan> {
    let configuration = common::configuration().await?;
    let query: QuerySpec = serde_json::from_value(query)?;
    Ok(translate(
        &configuration.metadata,
        &configuration.settings,
        "Contact",
        &query,
    )?)
}

#[tokio::test]
async fn collections_are_fetched_per_row() {
    let executor = common::contacts();
    let metrics = common::metrics();
    let plan = compile(json!({
        "select": { "id": true, "addresses": { "select": { "street": true } } },
        "orderBy": { "id": "ASC" },
        "take": 3
    }))
    .await
    .unwrap();
    let page = query::execute(&executor, &metrics, &plan).await.unwrap();

    assert_eq!(page.rows.len(), 3);
    assert_eq!(
        page.rows[0]["addresses"],
        json!({
            "totalCount": 2,
            "rows": [
                { "street": "1 Main Street", "_hasPrev": false },
                { "street": "2 High Street", "_hasNext": false }
            ]
        })
    );
    assert_eq!(page.rows[1]["addresses"], json!({ "totalCount": 0, "rows": [] }));
    assert_eq!(
        page.rows[2]["addresses"],
        json!({
            "totalCount": 1,
            "rows": [{ "street": "3 Elm Street", "_hasPrev": false, "_hasNext": false }]
        })
    );
    assert_eq!(metrics.subquery_total.get(), 3);
    // one page, its count, and one query per contact
    assert_eq!(metrics.query_total.get(), 5);
}

#[tokio::test]
async fn missing_references_are_null() {
    let executor = common::contacts();
    let plan = compile(json!({
        "select": { "id": true, "company": true },
        "where": { "id": { "in": [1, 4] } },
        "orderBy": { "id": "ASC" },
        "take": 10
    }))
    .await
    .unwrap();
    let page = query::execute(&executor, &common::metrics(), &plan)
        .await
        .unwrap();
    assert_eq!(page.total_count, 2);
    assert_eq!(page.rows[0]["company"], json!({ "id": 1, "name": "Acme" }));
    assert_eq!(page.rows[1]["company"], json!(null));
}

#[tokio::test]
async fn nested_plans_need_their_parent_row() {
    let executor = common::contacts();
    let plan = compile(json!({ "select": { "addresses": true } })).await.unwrap();
    let addresses = plan
        .fields
        .iter()
        .find_map(|field| match field {
            Field::Collection { plan, .. } => Some(plan),
            _ => None,
        })
        .unwrap();
    let error = query::execute(&executor, &common::metrics(), addresses)
        .await
        .unwrap_err();
    assert!(matches!(error, Error::MissingVariable(variable) if variable == "self_id"));
}

#[tokio::test]
async fn large_columns_load_by_id() {
    let executor = common::contacts();
    let metrics = common::metrics();
    let configuration = common::configuration().await.unwrap();
    let load = translate_field_load(
        &configuration.metadata,
        &configuration.settings,
        "Contact",
        "notes",
    )
    .unwrap();
    assert_eq!(
        query::load_field(&executor, &metrics, &load, json!(1))
            .await
            .unwrap(),
        json!("met at the fair")
    );
    assert_eq!(
        query::load_field(&executor, &metrics, &load, json!(99))
            .await
            .unwrap(),
        json!(null)
    );
}

/// Answers every aggregate query with a single row holding `"3"` in every column.
struct Threes;

#[async_trait::async_trait]
impl Executor for Threes {
    async fn fetch(
        &self,
        statement: &Statement<'_>,
    ) -> Result<Vec<Row>, Box<dyn std::error::Error + Send + Sync>> {
        let sql::ast::SelectList::SelectList(list) = &statement.query.select.select_list;
        Ok(vec![list
            .iter()
            .map(|(alias, _)| (alias.name.clone(), json!("3")))
            .collect()])
    }
}

#[tokio::test]
async fn aggregate_rows_are_reshaped() {
    let configuration = common::configuration().await.unwrap();
    let spec: AggregateSpec = serde_json::from_value(json!({
        "count": { "id": true },
        "avg": { "age": true },
        "max": { "company": { "name": true } },
        "groupBy": { "lastName": true }
    }))
    .unwrap();
    let plan = translate_aggregate(
        &configuration.metadata,
        &configuration.settings,
        "Contact",
        &spec,
    )
    .unwrap();
    let rows = aggregates::execute(&Threes, &common::metrics(), &plan)
        .await
        .unwrap();
    assert_eq!(
        rows,
        vec![json!({
            "count": { "id": 3 },
            "avg": { "age": 3 },
            "max": { "company": { "name": 3 } },
            "groupBy": { "lastName": 3 }
        })]
    );
}
