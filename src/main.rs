mod bootstrap;
mod config;
mod database;
mod error;
mod ledger;
mod lock;
mod migrate;
mod reconcile;
mod resolver;
mod seed;
mod validate;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::error;

use crate::bootstrap::{Bootstrap, BootstrapResult};
use crate::config::Config;
use crate::database::Database;
use crate::error::SqlBootError;
use crate::ledger::MigrationRecord;

#[derive(Parser)]
#[command(name = "sqlboot", version, about = "Database bootstrap and migration runner")]
struct Args {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c', default_value = "sqlboot.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: SqlBootCommand,
}

#[derive(Subcommand)]
enum SqlBootCommand {
    /// Bring the database to a fully migrated, seeded, validated state
    Init {
        /// Print the bootstrap result as JSON
        #[arg(long = "json", default_value_t = false)]
        json: bool,
    },

    /// List applied migrations from the ledger
    Status,

    /// Check that required tables and the default administrator account exist
    Validate,

    /// Grant every known permission to the super-admin role
    Reconcile,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let config = Config::load(&args.config);

    // Keep the handle alive for the lifetime of the process
    let _logger = match flexi_logger::Logger::try_with_str(&config.logging.level)
        .and_then(|logger| logger.start())
    {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    match run(args.command, &config) {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: SqlBootCommand, config: &Config) -> Result<ExitCode, SqlBootError> {
    let db = Database::open(&config.db_path())?;

    match command {
        SqlBootCommand::Init { json } => {
            let result = Bootstrap::new(&db, &config.bootstrap).initialize();
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&result)
                        .map_err(|e| SqlBootError::Error(e.to_string()))?
                );
            } else {
                print_result(&result);
            }
            // Fail-safe contract: the result, not an error, says how it went.
            // The exit code lets strict environments halt on failure.
            Ok(if result.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        SqlBootCommand::Status => {
            MigrationRecord::ensure_table(&db)?;
            let records = MigrationRecord::status(&db)?;
            if records.is_empty() {
                println!("No migrations applied");
            }
            for record in records {
                println!(
                    "{}  {}  {} bytes  {} ms",
                    record.executed_at,
                    record.name,
                    record.file_size,
                    record.execution_time_ms.unwrap_or_default()
                );
            }
            Ok(ExitCode::SUCCESS)
        }

        SqlBootCommand::Validate => {
            validate::validate(&db)?;
            println!("Installation is valid");
            Ok(ExitCode::SUCCESS)
        }

        SqlBootCommand::Reconcile => {
            let outcome = reconcile::reconcile(&db)?;
            if outcome.role_found {
                println!(
                    "Granted {} permission(s) to '{}'",
                    outcome.granted,
                    reconcile::SUPER_ADMIN_ROLE
                );
            } else {
                println!(
                    "Role '{}' not found, nothing granted",
                    reconcile::SUPER_ADMIN_ROLE
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_result(result: &BootstrapResult) {
    println!(
        "Bootstrap {}: {} ({} ms)",
        if result.success { "succeeded" } else { "failed" },
        result.message,
        result.duration_ms
    );
    println!(
        "Migrations applied: {}, seeds executed: {}",
        result.migrations_applied, result.seeds_executed
    );
    for action in &result.actions {
        println!("  - {action}");
    }
    for warning in &result.warnings {
        println!("  warning: {warning}");
    }
    for err in &result.errors {
        println!("  error: {err}");
    }
}
