mod summary;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use sqlshift_common::Error;
use sqlshift_config::{AppConfig, ConfigLoader};
use sqlshift_db::{Dialect, DirectorySource, MigrationRunner, RunProfile, SqliteDatabase};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqlshift", version, about = "Versioned, dialect-aware SQL schema migrations")]
struct Cli {
    /// Config file (YAML or TOML). Defaults to ~/.config/sqlshift/config.yml
    #[arg(short, long, env = "SQLSHIFT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Database file to migrate
    #[arg(long, env = "SQLSHIFT_DATABASE", global = true)]
    database: Option<PathBuf>,

    /// Target dialect: sqlite, postgres, mysql
    #[arg(long, env = "SQLSHIFT_DIALECT", global = true)]
    dialect: Option<String>,

    /// Directory holding <version>_<name>[.<dialect>].<up|down>.sql scripts
    #[arg(short, long, env = "SQLSHIFT_MIGRATIONS", global = true)]
    migrations: Option<PathBuf>,

    /// Run profile: full or lite
    #[arg(long, env = "SQLSHIFT_PROFILE", global = true)]
    profile: Option<String>,

    /// Ledger table name
    #[arg(long, env = "SQLSHIFT_TABLE", global = true)]
    table: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply every pending migration
    Up,
    /// Roll back the most recently applied migrations
    Down {
        #[arg(long, default_value_t = 1)]
        steps: usize,
    },
    /// Mark a version as applied and clean without running any SQL
    Force { version: u64 },
    /// Show the current ledger version
    Version {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    init_tracing(&config);

    let dialect: Dialect = config.database.dialect.parse()?;
    let profile: RunProfile = config.migrations.profile.parse()?;
    let db_path = config.database.resolved_path();

    let mut db = open_database(dialect, &db_path)?;
    let source = DirectorySource::new(&config.migrations.dir);
    let mut runner = MigrationRunner::new(&mut db, &source)
        .with_profile(profile)
        .with_ledger_table(&config.migrations.table)?;

    match cli.command {
        Command::Up => {
            let report = runner.up().context("migration failed")?;
            let status = runner.version()?;
            summary::print_run_summary(&report, &db_path, &status);
        }
        Command::Down { steps } => {
            if steps == 0 {
                bail!("--steps must be at least 1");
            }
            let report = runner.down(steps).context("rollback failed")?;
            let status = runner.version()?;
            summary::print_run_summary(&report, &db_path, &status);
        }
        Command::Force { version } => {
            runner
                .force(version)
                .with_context(|| format!("failed to force version {version}"))?;
            println!("ledger forced to version {version}");
        }
        Command::Version { json } => {
            let status = runner.version()?;
            if json {
                println!("{}", serde_json::to_string(&status)?);
            } else {
                println!("{status}");
            }
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = ConfigLoader::new(cli.config.clone())
        .load()
        .context("failed to load configuration")?;

    if let Some(path) = &cli.database {
        config.database.path = Some(path.clone());
    }
    if let Some(dialect) = &cli.dialect {
        config.database.dialect = dialect.clone();
    }
    if let Some(dir) = &cli.migrations {
        config.migrations.dir = dir.clone();
    }
    if let Some(profile) = &cli.profile {
        config.migrations.profile = profile.clone();
    }
    if let Some(table) = &cli.table {
        config.migrations.table = table.clone();
    }

    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log.level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Only SQLite ships with a bundled driver.
fn open_database(dialect: Dialect, path: &std::path::Path) -> Result<SqliteDatabase> {
    match dialect {
        Dialect::Sqlite => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create data directory {}", parent.display())
                })?;
            }
            info!(%dialect, "connecting");
            Ok(SqliteDatabase::open(path)?)
        }
        other => Err(Error::DialectUnsupported(format!(
            "{other} (no driver bundled with the sqlshift CLI)"
        ))
        .into()),
    }
}
