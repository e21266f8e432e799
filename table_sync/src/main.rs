use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indexmap::IndexMap;

use table_sync::{config, utils, TableSync};

/// Keep a database schema in line with declared tables
#[derive(Debug, Parser)]
#[command(name = "table_sync", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "table_sync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the statements a sync would run
    Plan {
        /// YAML or JSON file with table definitions
        #[arg(short, long)]
        schema: PathBuf,
    },
    /// Bring the database in line with the table definitions
    Sync {
        /// YAML or JSON file with table definitions
        #[arg(short, long)]
        schema: PathBuf,
        /// Log the statements instead of executing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the live schema as JSON
    Inspect,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = config::load_from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    utils::init_logging(&config.logging).context("initializing logging")?;

    if let Command::Sync { dry_run: true, .. } = cli.command {
        config.sync.dry_run = true;
    }

    let mut client = TableSync::connect(config)
        .await
        .context("connecting to database")?;

    match &cli.command {
        Command::Plan { schema } => {
            load_models(&mut client, schema)?;
            let task = client.plan().await.context("planning schema changes")?;
            let statements = client.render(&task)?;
            if statements.is_empty() {
                println!("-- schema is up to date");
            }
            for statement in statements {
                println!("{};", statement);
            }
            print_abandoned(&task.abandoned_columns);
        }
        Command::Sync { schema, .. } => {
            load_models(&mut client, schema)?;
            let report = client.sync().await.context("synchronizing schema")?;
            if report.dry_run {
                for statement in &report.statements {
                    println!("{};", statement);
                }
            }
            println!(
                "{} statement(s) rendered, {} executed",
                report.statements.len(),
                report.executed
            );
            print_abandoned(&report.abandoned_columns);
        }
        Command::Inspect => {
            let schema = client.actual_schema().await.context("reading live schema")?;
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
    }

    client.connection().close().await;
    Ok(())
}

fn print_abandoned(abandoned: &IndexMap<String, Vec<String>>) {
    for (table, columns) in abandoned {
        println!("-- {}: columns not declared by any model: {}", table, columns.join(", "));
    }
}

fn load_models(client: &mut TableSync, path: &Path) -> Result<()> {
    let count = client
        .models_mut()
        .load_file(path)
        .with_context(|| format!("reading table definitions from {}", path.display()))?;
    tracing::info!(count, path = %path.display(), "loaded table definitions");
    Ok(())
}
