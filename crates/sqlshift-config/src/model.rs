use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sqlshift_common::{Error, Result};
use sqlshift_db::validate_table_name;

/// Top-level configuration, read from `config.yml` / `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub migrations: MigrationsConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `sqlite`, `postgres` or `mysql`.
    pub dialect: String,
    /// Database file for SQLite. Defaults to `<data_dir>/sqlshift/app.db`.
    pub path: Option<PathBuf>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dialect: "sqlite".to_string(),
            path: None,
        }
    }
}

impl DatabaseConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("sqlshift")
                .join("app.db")
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationsConfig {
    pub dir: PathBuf,
    /// Name of the ledger table inside the target database.
    pub table: String,
    /// `full` runs everything; `lite` leaves out full-text-search scripts.
    pub profile: String,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("migrations"),
            table: "schema_migrations".to_string(),
            profile: "full".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Reject values that would otherwise only fail once SQL is built from them.
    pub fn validate(&self) -> Result<()> {
        validate_table_name(&self.migrations.table)
            .map_err(|e| Error::Config(format!("migrations.table: {e}")))?;
        if self.database.dialect.trim().is_empty() {
            return Err(Error::Config("database.dialect cannot be empty".into()));
        }
        Ok(())
    }
}
