//! The boundary between the runner and the database.

use indexmap::IndexMap;

use query_engine_sql::sql;
use query_engine_sql::sql::string::Param;

use crate::error::Error;
use crate::metrics::Metrics;

/// A flat result row, keyed by column alias.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Values bound to the variables of a query, e.g. the parent row of a collection.
pub type Variables = IndexMap<String, serde_json::Value>;

/// A query ready to be sent: its text, and every named parameter resolved to a value.
#[derive(Debug, Clone)]
pub struct Statement<'a> {
    pub query: &'a sql::execution_plan::Query,
    pub sql: String,
    pub params: IndexMap<String, serde_json::Value>,
}

impl<'a> Statement<'a> {
    /// Render a query and bind its variables.
    pub fn new(
        query: &'a sql::execution_plan::Query,
        variables: &Variables,
    ) -> Result<Statement<'a>, Error> {
        let sql::string::SQL { sql, params } = query.query_sql();
        let params: IndexMap<String, serde_json::Value> = params
            .into_iter()
            .map(|(name, param)| match param {
                Param::Value(value) => Ok((name, value)),
                Param::Variable(variable) => variables
                    .get(&variable)
                    .cloned()
                    .map(|value| (name, value))
                    .ok_or(Error::MissingVariable(variable)),
            })
            .collect::<Result<_, Error>>()?;
        Ok(Statement { query, sql, params })
    }
}

/// Something able to run a SQL statement with named parameters (`:p0`, ...).
/// Array values are passed as arrays for `IN` and `BETWEEN`.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    async fn fetch(
        &self,
        statement: &Statement<'_>,
    ) -> Result<Vec<Row>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Run a single query, recording it in the metrics.
pub(crate) async fn fetch(
    executor: &dyn Executor,
    metrics: &Metrics,
    query: &sql::execution_plan::Query,
    variables: &Variables,
) -> Result<Vec<Row>, Error> {
    let statement = Statement::new(query, variables)?;
    tracing::info!(generated_sql = %statement.sql, params = ?statement.params, "executing");

    let timer = metrics.query_duration.start_timer();
    let rows = executor.fetch(&statement).await.map_err(Error::Executor)?;
    timer.observe_duration();
    metrics.query_total.inc();

    tracing::debug!(rows = rows.len(), "executed");
    Ok(rows)
}
