use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::config;
use crate::database::{DatabaseManager, MIGRATOR};

#[derive(Subcommand)]
pub enum MigrateCommands {
    #[command(about = "Apply pending migrations to the request directory")]
    Run,

    #[command(about = "List embedded migrations and whether they are applied")]
    Info,
}

pub async fn handle(cmd: MigrateCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let manager = DatabaseManager::from_config(&config().database)?;

    let result = match cmd {
        MigrateCommands::Run => {
            manager.run_migrations().await?;
            output_success(&output_format, "Migrations applied", None)
        }
        MigrateCommands::Info => info(&manager, &output_format).await,
    };

    manager.close_all().await;
    result
}

const UNDEFINED_TABLE: &str = "42P01";

async fn info(manager: &DatabaseManager, output_format: &OutputFormat) -> anyhow::Result<()> {
    let applied = applied_versions(
        sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success")
            .fetch_all(&manager.main_pool())
            .await,
    )?;

    let migrations: Vec<_> = MIGRATOR
        .iter()
        .map(|m| (m.version, m.description.to_string(), applied.contains(&m.version)))
        .collect();

    match output_format {
        OutputFormat::Json => {
            let items: Vec<_> = migrations
                .iter()
                .map(|(version, description, applied)| {
                    json!({ "version": version, "description": description, "applied": applied })
                })
                .collect();
            output_success(output_format, "Migration status", Some(json!({ "migrations": items })))
        }
        OutputFormat::Text => {
            for (version, description, applied) in migrations {
                let mark = if applied { "applied" } else { "pending" };
                println!("{:>4}  {:<8} {}", version, mark, description);
            }
            Ok(())
        }
    }
}

/// A missing bookkeeping table means nothing has been applied yet; any other
/// failure is reported.
fn applied_versions(result: Result<Vec<i64>, sqlx::Error>) -> anyhow::Result<Vec<i64>> {
    match result {
        Ok(versions) => Ok(versions),
        Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some(UNDEFINED_TABLE) => Ok(Vec::new()),
        Err(e) => Err(anyhow::Error::new(e).context("failed to read applied migrations")),
    }
}
