//! oxide-planner CLI
//!
//! Command-line tool for planning and writing schema migrations.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_planner::prelude::*;

/// Schema migration planner.
#[derive(Parser)]
#[command(name = "oxide-planner")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the plan between two snapshot files.
    Plan {
        /// Previous snapshot (JSON table map).
        #[arg(long)]
        previous: PathBuf,

        /// Current snapshot (JSON table map).
        #[arg(long)]
        current: PathBuf,

        /// Convert column names of the current snapshot to snake_case.
        #[arg(long)]
        snake_case: bool,
    },

    /// Write the next migration and record its state.
    Make {
        /// Current snapshot (JSON table map).
        #[arg(long)]
        current: PathBuf,

        /// State database URL.
        #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
        database: String,

        /// Migrations directory.
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Migration name.
        #[arg(short, long)]
        name: Option<String>,

        /// Migration comment.
        #[arg(short, long)]
        comment: Option<String>,

        /// Print the plan without writing anything.
        #[arg(long)]
        preview: bool,

        /// Convert column names to snake_case.
        #[arg(long)]
        snake_case: bool,
    },
}

fn load_tables(path: &Path) -> anyhow::Result<Tables> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let tables: Tables = serde_json::from_str(&contents)
        .with_context(|| format!("Invalid snapshot {}", path.display()))?;
    Ok(tables)
}

fn policy(snake_case: bool) -> ColumnNamePolicy {
    if snake_case {
        ColumnNamePolicy::SnakeCase
    } else {
        ColumnNamePolicy::Preserve
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
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

    match cli.command {
        Commands::Plan {
            previous,
            current,
            snake_case,
        } => {
            let previous = load_tables(&previous)?;
            let current: Tables = load_tables(&current)?
                .into_iter()
                .map(|(name, table)| {
                    let table = table.with_column_policy(policy(snake_case));
                    (name, table)
                })
                .collect();

            let plan = plan_migration(&previous, &current)?;
            if plan.is_empty() {
                info!("No changes found");
                return Ok(());
            }

            for line in &plan.console_out {
                println!("[Actions] {}", line);
            }
            for line in plan.preview_lines() {
                println!("{}", line);
            }
        }

        Commands::Make {
            current,
            database,
            out_dir,
            name,
            comment,
            preview,
            snake_case,
        } => {
            let current = load_tables(&current)?;

            let mut options = MigrationOptions {
                out_dir,
                preview,
                debug: cli.verbose,
                column_policy: policy(snake_case),
                ..MigrationOptions::default()
            };
            options.migration_name = name;
            options.comment = comment;

            // Connect to database
            let connect = database
                .parse::<SqliteConnectOptions>()?
                .create_if_missing(true);
            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(connect)
                .await?;

            let maker = MigrationMaker::new(SqliteStateStore::new(pool));
            match maker.make(&current, &options).await? {
                MakeOutcome::NoChangesFound => info!("No changes found"),
                MakeOutcome::SuccessWithoutSave => info!("Preview only, nothing saved"),
                MakeOutcome::Success { path } => {
                    info!("Created migration: {}", path.display());
                }
                MakeOutcome::SuccessAnyway { path } => {
                    warn!(
                        "Created migration {} but its state was not recorded",
                        path.display()
                    );
                }
            }
        }
    }

    Ok(())
}
