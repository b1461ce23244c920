//! The CLI can do a few things. This provides a central point where those things are routed and
//! then done, making it easier to test this crate deterministically.

use std::path::PathBuf;

use clap::Parser;

use query_engine_cli::{run, Command, Context};

/// The query engine command-line interface.
#[derive(Debug, Parser)]
#[command(name = "query-engine", version)]
struct Args {
    /// The path to the configuration directory.
    #[arg(long = "context", env = "QUERY_ENGINE_CONTEXT_PATH", default_value = ".")]
    context_path: PathBuf,
    /// The command to invoke.
    #[command(subcommand)]
    subcommand: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let context = Context {
        context_path: args.context_path,
    };
    tracing::debug!(command = ?args.subcommand, "running");
    let output = run(args.subcommand, &context).await?;
    print!("{output}");
    Ok(())
}
