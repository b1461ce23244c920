use std::path::PathBuf;

use query_engine_cli::{run, Command, Context};

fn contacts() -> Context {
    Context {
        context_path: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../static/contacts"),
    }
}

#[tokio::test]
async fn initialize_writes_configuration_and_schema() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let context = Context {
        context_path: dir.path().to_owned(),
    };

    run(Command::Initialize { force: false }, &context).await?;
    assert!(dir.path().join("configuration.json").exists());
    assert!(dir.path().join("schema.json").exists());

    assert!(run(Command::Initialize { force: false }, &context)
        .await
        .is_err());
    run(Command::Initialize { force: true }, &context).await?;
    Ok(())
}

#[tokio::test]
async fn schema_is_json() -> anyhow::Result<()> {
    let output = run(Command::Schema, &contacts()).await?;
    let schema: serde_json::Value = serde_json::from_str(&output)?;
    assert_eq!(schema["title"], "ParsedConfiguration");
    Ok(())
}

#[tokio::test]
async fn compile_prints_every_plan() -> anyhow::Result<()> {
    let output = run(
        Command::Compile {
            entity: "Contact".to_string(),
            aggregate: false,
            load: None,
            query: r#"{ "select": { "firstName": true, "addresses": true }, "where": { "id": 1 }, "take": 5 }"#
                .to_string(),
        },
        &contacts(),
    )
    .await?;
    assert!(output.starts_with("-- Contact\n"));
    assert!(output.contains("-- Contact (count)\n"));
    assert!(output.contains("-- Contact.addresses (per row, bound from self_id)\n"));
    assert!(output.contains("-- :p0 = 1\n"));
    assert!(output.contains(r#""first_name""#));
    Ok(())
}

#[tokio::test]
async fn compile_prints_the_count_of_skipped_queries() -> anyhow::Result<()> {
    let compile = |query: &str| Command::Compile {
        entity: "Contact".to_string(),
        aggregate: false,
        load: None,
        query: query.to_string(),
    };

    let output = run(compile(r#"{ "select": { "id": true }, "skip": 2 }"#), &contacts()).await?;
    assert!(output.contains("-- Contact (count)\n"));

    let output = run(compile(r#"{ "select": { "id": true }, "skip": 0 }"#), &contacts()).await?;
    assert!(!output.contains("(count)"));
    Ok(())
}

#[tokio::test]
async fn compile_reports_unknown_fields() {
    let error = run(
        Command::Compile {
            entity: "Contact".to_string(),
            aggregate: false,
            load: None,
            query: r#"{ "where": { "nope": 1 } }"#.to_string(),
        },
        &contacts(),
    )
    .await
    .unwrap_err();
    assert!(error.to_string().contains("nope"));
}

#[tokio::test]
async fn compile_aggregates_lists_aliases() -> anyhow::Result<()> {
    let output = run(
        Command::Compile {
            entity: "Contact".to_string(),
            aggregate: true,
            load: None,
            query: r#"{ "count": { "id": true } }"#.to_string(),
        },
        &contacts(),
    )
    .await?;
    assert!(output.contains("-- count_id => count.id\n"));
    Ok(())
}
