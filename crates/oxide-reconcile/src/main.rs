//! oxide-reconcile CLI
//!
//! Command-line tool for reconciling a MySQL database with a schema document.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use sqlx::mysql::MySqlPoolOptions;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_reconcile::prelude::*;

/// Declarative schema reconciliation for MySQL.
#[derive(Parser)]
#[command(name = "oxide-reconcile")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL.
    #[arg(
        short,
        long,
        env = "DATABASE_URL",
        default_value = "mysql://root@localhost:3306/app"
    )]
    database: String,

    /// Schema document (JSON) declaring the tables.
    #[arg(short, long, env = "RECONCILE_SCHEMA", default_value = "schema.json")]
    schema: PathBuf,

    /// Drop and recreate every declared table. Destroys all data.
    #[arg(long)]
    force: bool,

    /// Read and plan without issuing DDL.
    #[arg(long)]
    dry_run: bool,

    /// Report format.
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let registry = SchemaRegistry::load(&cli.schema)?;
    info!(
        schema = %cli.schema.display(),
        tables = registry.len(),
        "Loaded schema document"
    );

    // DDL runs one statement at a time
    let pool = MySqlPoolOptions::new()
        .max_connections(1)
        .connect(&cli.database)
        .await?;

    let reconciler = Reconciler::new(MySqlCatalog::new(pool), registry).dry_run(cli.dry_run);

    let report = if cli.force {
        warn!("Force mode: every declared table will be dropped and recreated");
        reconciler.recreate_all().await?
    } else {
        reconciler.reconcile().await?
    };

    match cli.format {
        Format::Text => println!("{report}"),
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if report.has_failures() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
