use std::path::PathBuf;

use query_engine_configuration::Configuration;
use query_engine_sql::sql;

/// Load the runtime configuration of the contacts fixture.
pub async fn configuration() -> anyhow::Result<Configuration> {
    let _ = env_logger::builder().is_test(true).try_init();

    let directory = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../../static/contacts");
    let parsed_configuration = query_engine_configuration::parse_configuration(&directory).await?;
    Ok(query_engine_configuration::make_runtime_configuration(
        parsed_configuration,
    )?)
}

/// The SQL text of a query, and its parameters as `name = value` lines.
pub fn sql_and_params(query: &sql::execution_plan::Query) -> (String, Vec<String>) {
    let sql = query.query_sql();
    let params = sql
        .params
        .iter()
        .map(|(name, param)| match param {
            sql::string::Param::Value(value) => format!("{name} = {value}"),
            sql::string::Param::Variable(variable) => format!("{name} = ${variable}"),
        })
        .collect();
    (sql.sql, params)
}
