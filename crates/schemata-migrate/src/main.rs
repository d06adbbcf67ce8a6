//! schemata CLI
//!
//! Command-line tool for generating and applying MySQL migrations.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use schemata_migrate::artifact;
use schemata_migrate::config::DEFAULT_CONFIG_FILE;
use schemata_migrate::prelude::*;

/// Snapshot-based MySQL migrations.
#[derive(Parser)]
#[command(name = "schemata")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// MySQL connection URL; takes precedence over the config file.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Migrations directory.
    #[arg(short, long, default_value = "migrations")]
    migrations_dir: PathBuf,

    /// Entity declaration document.
    #[arg(short, long, default_value = "schemata.declarations.json")]
    declarations: PathBuf,

    /// Connection config file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a connection config file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Generate a new migration from declaration changes.
    MakeMigration {
        /// Migration name (letters, digits, '_' and '-').
        #[arg(short, long)]
        name: Option<String>,

        /// Create the migration even if nothing changed.
        #[arg(long)]
        empty: bool,

        /// Show SQL without writing files (dry run).
        #[arg(long)]
        dry_run: bool,
    },

    /// Apply pending migrations.
    Migrate {
        /// Stop after this version (all if not specified).
        #[arg(short, long)]
        target: Option<MigrationVersion>,
    },

    /// Show migration status.
    Status,

    /// Clear the ledger lock left behind by a runner that died.
    Unlock,

    /// Show SQL for a migration without executing.
    Sql {
        /// Migration version (latest if not specified).
        #[arg(long = "version", value_name = "VERSION")]
        migration: Option<MigrationVersion>,

        /// Show rollback SQL instead of forward SQL.
        #[arg(short, long)]
        reverse: bool,
    },
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
        Commands::InitConfig { force } => {
            Config::template().write(&cli.config, force)?;
            info!("Wrote {}", cli.config.display());
        }

        Commands::MakeMigration {
            name,
            empty,
            dry_run,
        } => {
            let planned = PlanBuilder::new(&cli.migrations_dir)
                .allow_empty(empty)
                .dry_run(dry_run)
                .build_from_declarations(
                    name.as_deref().unwrap_or_default(),
                    &cli.declarations,
                )?;

            if dry_run {
                println!("Would create migration: {}", planned.path.display());
                println!("\n{}", planned.artifact.render_up_sql());
            }
        }

        Commands::Migrate { target } => {
            let conn = resolve_connector(cli.database_url.as_deref(), &cli.config)?;
            let mut executor = MigrationExecutor::new(conn, &cli.migrations_dir);

            let result = executor.run(target).await;
            executor.close().await?;

            match result? {
                RunOutcome::UpToDate => info!("Database is up to date."),
                RunOutcome::Applied(versions) => {
                    info!("Applied {} migration(s).", versions.len());
                }
                RunOutcome::Locked { applied } => {
                    warn!(
                        "Migration table locked by another runner; applied {} before stopping.",
                        applied.len()
                    );
                }
            }
        }

        Commands::Status => {
            let conn = resolve_connector(cli.database_url.as_deref(), &cli.config)?;
            let mut executor = MigrationExecutor::new(conn, &cli.migrations_dir);

            let result = executor.status().await;
            executor.close().await?;
            let status = result?;

            if status.is_empty() {
                info!("No migrations found in {}.", cli.migrations_dir.display());
            } else {
                println!("\nMigrations:");
                println!("{:-<60}", "");

                for migration in &status {
                    let mark = if migration.applied { "X" } else { " " };
                    match migration.applied_at {
                        Some(at) => println!(
                            " [{mark}] {}_{} ({})",
                            migration.version,
                            migration.name,
                            at.format("%Y-%m-%d %H:%M:%S")
                        ),
                        None => println!(" [{mark}] {}_{}", migration.version, migration.name),
                    }
                }
                println!();
            }
        }

        Commands::Unlock => {
            let conn = resolve_connector(cli.database_url.as_deref(), &cli.config)?;
            let mut executor = MigrationExecutor::new(conn, &cli.migrations_dir);

            let result = executor.unlock().await;
            executor.close().await?;

            if result? {
                info!("Migration table unlocked.");
            } else {
                info!("No migration table yet, nothing to unlock.");
            }
        }

        Commands::Sql { migration, reverse } => {
            let entries = artifact::scan(&cli.migrations_dir)?;
            let entry = match migration {
                Some(version) => entries
                    .into_iter()
                    .find(|e| e.version == version)
                    .ok_or(MigrateError::UnknownVersion(version))?,
                None => entries
                    .into_iter()
                    .last()
                    .ok_or_else(|| MigrateError::NoMigrations(cli.migrations_dir.clone()))?,
            };
            let artifact = entry.load()?;

            if reverse {
                match &artifact.down {
                    DownPlan::DestroyDatabase => {
                        println!(
                            "-- {} is the first migration; reverting it drops the database",
                            artifact.dir_name()
                        );
                    }
                    DownPlan::Statements { statements } => {
                        for sql in statements {
                            println!("{sql};");
                        }
                    }
                }
            } else {
                print!("{}", artifact.render_up_sql());
            }
        }
    }

    Ok(())
}
