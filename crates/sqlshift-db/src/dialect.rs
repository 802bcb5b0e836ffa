use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlshift_common::Error;

use crate::migrations::MigrationScript;

/// Relational engines the engine knows how to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sqlite,
    Postgres,
    Mysql,
}

impl Dialect {
    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
            Dialect::Mysql => "mysql",
        }
    }

    /// Bind placeholder for the `n`th (1-based) parameter.
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Dialect::Sqlite => format!("?{n}"),
            Dialect::Postgres => format!("${n}"),
            Dialect::Mysql => "?".to_string(),
        }
    }

    /// Query returning a non-zero count when the table bound to
    /// placeholder 1 exists.
    pub fn table_exists_sql(self) -> String {
        match self {
            Dialect::Sqlite => {
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1".to_string()
            }
            Dialect::Postgres => "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1"
                .to_string(),
            Dialect::Mysql => "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_name = ?"
                .to_string(),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "mysql" | "mariadb" => Ok(Dialect::Mysql),
            other => Err(Error::DialectUnsupported(other.to_string())),
        }
    }
}

/// Groups of scripts a run profile can leave out wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureCategory {
    /// Full-text-search virtual tables and the triggers that keep them in sync.
    FullTextSearch,
}

impl FeatureCategory {
    /// Category implied by a script slug, e.g. `gists_fts` or `fts_rebuild`.
    pub fn from_slug(slug: &str) -> Option<Self> {
        slug.split(['_', '-'])
            .any(|token| token.eq_ignore_ascii_case("fts"))
            .then_some(FeatureCategory::FullTextSearch)
    }
}

impl fmt::Display for FeatureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureCategory::FullTextSearch => f.write_str("full-text search"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunProfile {
    #[default]
    Full,
    /// Lightweight profile for tests and ephemeral databases.
    Lite,
}

impl RunProfile {
    pub fn excludes(self, category: FeatureCategory) -> bool {
        match self {
            RunProfile::Full => false,
            RunProfile::Lite => matches!(category, FeatureCategory::FullTextSearch),
        }
    }
}

impl FromStr for RunProfile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(RunProfile::Full),
            "lite" | "test" => Ok(RunProfile::Lite),
            other => Err(Error::Config(format!("unknown run profile: {other}"))),
        }
    }
}

/// Why a script was passed over without touching the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    Dialect { tagged: Dialect, active: Dialect },
    Profile { category: FeatureCategory, profile: RunProfile },
}

/// Decides which scripts run against the active dialect and profile.
///
/// Skips are never recorded, so the same decision is reached on every run.
#[derive(Debug, Clone, Copy)]
pub struct DialectPolicy {
    dialect: Dialect,
    profile: RunProfile,
}

impl DialectPolicy {
    pub fn new(dialect: Dialect, profile: RunProfile) -> Self {
        Self { dialect, profile }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn applies(&self, script: &MigrationScript) -> bool {
        self.skip_reason(script).is_none()
    }

    pub fn skip_reason(&self, script: &MigrationScript) -> Option<SkipReason> {
        match script.dialect {
            Some(tagged) if tagged != self.dialect => {
                return Some(SkipReason::Dialect {
                    tagged,
                    active: self.dialect,
                });
            }
            _ => {}
        }
        match script.category {
            Some(category) if self.profile.excludes(category) => Some(SkipReason::Profile {
                category,
                profile: self.profile,
            }),
            _ => None,
        }
    }
}
