use sqlx::Row;
use std::collections::HashSet;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use erp_gate::authz::Role;
use erp_gate::db::{SqliteUserStore, UserStore, MIGRATOR};
use erp_gate::models::user::NewUser;
use erp_gate::utils::HashCost;

#[derive(Parser, Debug)]
#[command(author, version, about = "erp-gate admin tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Create a user account
    CreateUser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        /// admin, manager, accounts or regular
        #[arg(long, value_parser = parse_role)]
        role: Role,
        #[arg(long)]
        department: Option<String>,
        /// Falls back to the ERP_GATE_PASSWORD environment variable
        #[arg(long, env = "ERP_GATE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Disable a user account; existing tokens stop working on their next request
    DeactivateUser {
        #[arg(long)]
        email: String,
    },
}

fn parse_role(raw: &str) -> Result<Role, String> {
    raw.parse::<Role>().map_err(|err| err.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();
    let pool = get_pool().await?;

    match cli.command {
        Commands::MigrateRun => {
            MIGRATOR.run(&pool).await.context("failed to run migrations")?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            print_status(&pool).await?;
        }
        Commands::CreateUser {
            email,
            name,
            role,
            department,
            password,
        } => {
            MIGRATOR.run(&pool).await.context("failed to run migrations")?;
            let store = SqliteUserStore::new(pool);
            let cost = HashCost::from_env()?;
            let user = store
                .create(
                    NewUser {
                        email,
                        name,
                        password,
                        role,
                        department,
                        assigned_work: Vec::new(),
                        team_members: Vec::new(),
                    },
                    &cost,
                )
                .await?;
            println!("Created {} user {} ({})", user.role, user.email, user.id);
        }
        Commands::DeactivateUser { email } => {
            let store = SqliteUserStore::new(pool);
            let user = store.deactivate(&email).await?;
            println!("Deactivated {} ({})", user.email, user.id);
        }
    }

    Ok(())
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    let options = database_url
        .parse::<SqliteConnectOptions>()
        .with_context(|| format!("invalid DATABASE_URL: {database_url}"))?
        .create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool) -> anyhow::Result<()> {
    let table = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
        .fetch_optional(pool)
        .await?;
    let applied_versions: HashSet<i64> = if table.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in MIGRATOR.iter() {
        let status = if applied_versions.contains(&migration.version) { "applied" } else { "pending" };
        let desc = migration.description.trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}
