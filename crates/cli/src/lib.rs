//! The query engine CLI: create a configuration, print its JSON schema, and
//! show the SQL a query compiles to.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use clap::Subcommand;
use tokio::fs;

use query_engine_configuration::version1::CONFIGURATION_FILENAME;
use query_engine_models::{AggregateSpec, QuerySpec};
use query_engine_sql::sql;
use query_engine_translation::translation::query::fields::Field;
use query_engine_translation::translation::query::{self, CompiledPlan};

/// The various contextual bits and bobs we need to run.
pub struct Context {
    pub context_path: PathBuf,
}

/// The command invoked by the user.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Initialize a configuration in the current (empty) directory.
    Initialize {
        /// Overwrite an existing configuration.
        #[arg(long)]
        force: bool,
    },
    /// Print the JSON schema of the configuration format.
    Schema,
    /// Compile a query and print the SQL it produces.
    Compile {
        /// The entity queried.
        #[arg(long)]
        entity: String,
        /// Read the query as an aggregate query.
        #[arg(long, conflicts_with = "load")]
        aggregate: bool,
        /// Compile the lazy load of this column instead of a query.
        #[arg(long)]
        load: Option<String>,
        /// The query, as JSON.
        #[arg(default_value = "{}")]
        query: String,
    },
}

/// Run a command in a given directory, returning what it prints.
pub async fn run(command: Command, context: &Context) -> anyhow::Result<String> {
    match command {
        Command::Initialize { force } => initialize(&context.context_path, force).await,
        Command::Schema => {
            let schema = query_engine_configuration::generate_latest_schema();
            Ok(serde_json::to_string_pretty(&schema)? + "\n")
        }
        Command::Compile {
            entity,
            aggregate,
            load,
            query,
        } => compile(&context.context_path, &entity, aggregate, load.as_deref(), &query).await,
    }
}

/// Write an empty configuration and its JSON schema.
async fn initialize(context_path: &Path, force: bool) -> anyhow::Result<String> {
    let configuration_file = context_path.join(CONFIGURATION_FILENAME);
    if !force && fs::try_exists(&configuration_file).await? {
        anyhow::bail!(
            "{} already exists, use --force to overwrite it",
            configuration_file.display()
        );
    }
    query_engine_configuration::write_parsed_configuration(
        query_engine_configuration::ParsedConfiguration::empty(),
        context_path,
    )
    .await?;
    Ok(format!("Initialized {}\n", configuration_file.display()))
}

async fn compile(
    context_path: &Path,
    entity: &str,
    aggregate: bool,
    load: Option<&str>,
    query: &str,
) -> anyhow::Result<String> {
    let parsed = query_engine_configuration::parse_configuration(context_path).await?;
    let configuration = query_engine_configuration::make_runtime_configuration(parsed)?;
    let (metadata, settings) = (&configuration.metadata, &configuration.settings);

    let mut output = String::new();
    if let Some(field) = load {
        let load = query::translate_field_load(metadata, settings, entity, field)?;
        explain_query(&mut output, &format!("{entity}.{field}"), &load.query)?;
    } else if aggregate {
        let spec: AggregateSpec = serde_json::from_str(query)?;
        let plan = query::translate_aggregate(metadata, settings, entity, &spec)?;
        explain_query(&mut output, entity, &plan.query)?;
        for (alias, paths) in &plan.aliases {
            writeln!(output, "-- {alias} => {}", paths.join(", "))?;
        }
    } else {
        let spec: QuerySpec = serde_json::from_str(query)?;
        let plan = query::translate(metadata, settings, entity, &spec)?;
        explain_plan(&mut output, entity, &plan)?;
    }
    Ok(output)
}

/// Print a plan, its count query, and every nested collection plan.
fn explain_plan(output: &mut String, label: &str, plan: &CompiledPlan) -> anyhow::Result<()> {
    explain_query(output, label, &plan.rows_query())?;
    if plan.is_counted() {
        explain_query(output, &format!("{label} (count)"), &plan.count_query())?;
    }
    explain_fields(output, label, &plan.fields)
}

fn explain_fields(output: &mut String, label: &str, fields: &[Field]) -> anyhow::Result<()> {
    for field in fields {
        match field {
            Field::Column { .. } => {}
            Field::Reference { key, fields, .. } => {
                explain_fields(output, &format!("{label}.{key}"), fields)?;
            }
            Field::Collection {
                key,
                variable,
                plan,
            } => {
                let label = format!("{label}.{key} (per row, bound from {})", variable.name);
                explain_plan(output, &label, plan)?;
            }
        }
    }
    Ok(())
}

fn explain_query(
    output: &mut String,
    label: &str,
    query: &sql::execution_plan::Query,
) -> anyhow::Result<()> {
    let sql = query.query_sql();
    writeln!(output, "-- {label}")?;
    writeln!(output, "{};", pretty_print(&sql.sql))?;
    for (name, param) in &sql.params {
        match param {
            sql::string::Param::Value(value) => writeln!(output, "-- :{name} = {value}")?,
            sql::string::Param::Variable(variable) => writeln!(output, "-- :{name} = ${variable}")?,
        }
    }
    writeln!(output)?;
    Ok(())
}

/// Pretty print SQL for humans.
pub fn pretty_print(sql: &str) -> String {
    sqlformat::format(
        sql,
        &sqlformat::QueryParams::None,
        sqlformat::FormatOptions::default(),
    )
}
