use std::fmt;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use sqlshift_common::{Error, Result};
use tracing::debug;

use crate::database::{Database, DriverResult, Param};
use crate::dialect::Dialect;

pub const DEFAULT_TABLE: &str = "schema_migrations";

static TABLE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("table name pattern is valid")
});

/// Ledger table names are spliced into SQL, so only plain identifiers pass.
pub fn validate_table_name(table: &str) -> Result<()> {
    if TABLE_NAME.is_match(table) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "ledger table must be a plain SQL identifier, got {table:?}"
        )))
    }
}

/// Current position of the ledger, as reported by `MigrationRunner::version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VersionStatus {
    NoneApplied,
    At { version: u64, dirty: bool },
}

impl VersionStatus {
    pub fn is_dirty(&self) -> bool {
        matches!(self, VersionStatus::At { dirty: true, .. })
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionStatus::NoneApplied => f.write_str("no migrations applied"),
            VersionStatus::At {
                version,
                dirty: false,
            } => write!(f, "version {version}"),
            VersionStatus::At {
                version,
                dirty: true,
            } => write!(f, "version {version} (dirty)"),
        }
    }
}

/// Applied-version bookkeeping kept in a table of the target database.
///
/// Each row is `(version, dirty, forced, applied_at)`. A version counts as
/// applied when it has a clean row, or when a clean forced row sits at or
/// above it. Upserts are delete-then-insert so the same SQL works on every
/// dialect.
pub(crate) struct VersionLedger {
    table: String,
    dialect: Dialect,
}

impl VersionLedger {
    /// `table` must already be validated as a plain identifier.
    pub(crate) fn new(table: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            table: table.into(),
            dialect,
        }
    }

    fn ph(&self, n: usize) -> String {
        self.dialect.placeholder(n)
    }

    pub(crate) fn ensure_table(&self, db: &mut dyn Database) -> Result<()> {
        db.create_table_if_not_exists(
            &self.table,
            "version BIGINT PRIMARY KEY, \
             dirty BOOLEAN NOT NULL, \
             forced BOOLEAN NOT NULL, \
             applied_at VARCHAR(64) NOT NULL",
        )
        .map_err(|e| ledger_error(format!("failed to create {}", self.table), e))
    }

    fn table_exists(&self, db: &mut dyn Database) -> Result<bool> {
        let count = db
            .query_scalar(
                &self.dialect.table_exists_sql(),
                &[Param::Text(self.table.clone())],
            )
            .map_err(|e| ledger_error(format!("failed to look up {}", self.table), e))?;
        Ok(count.unwrap_or(0) > 0)
    }

    pub(crate) fn has(&self, db: &mut dyn Database, version: u64) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE dirty = {} AND (version = {} OR (forced = {} AND version >= {}))",
            self.table,
            self.ph(1),
            self.ph(2),
            self.ph(3),
            self.ph(4),
        );
        let count = db
            .query_scalar(
                &sql,
                &[
                    Param::Bool(false),
                    version_param(version),
                    Param::Bool(true),
                    version_param(version),
                ],
            )
            .map_err(|e| ledger_error(format!("failed to read version {version}"), e))?;
        Ok(count.unwrap_or(0) > 0)
    }

    pub(crate) fn record(&self, db: &mut dyn Database, version: u64, dirty: bool) -> Result<()> {
        self.write(db, version, dirty, false)
            .map_err(|e| ledger_error(format!("failed to record version {version}"), e))?;
        debug!(version, dirty, "ledger updated");
        Ok(())
    }

    fn write(
        &self,
        db: &mut dyn Database,
        version: u64,
        dirty: bool,
        forced: bool,
    ) -> DriverResult<()> {
        db.execute(
            &format!("DELETE FROM {} WHERE version = {}", self.table, self.ph(1)),
            &[version_param(version)],
        )?;
        db.execute(
            &format!(
                "INSERT INTO {} (version, dirty, forced, applied_at) VALUES ({}, {}, {}, {})",
                self.table,
                self.ph(1),
                self.ph(2),
                self.ph(3),
                self.ph(4),
            ),
            &[
                version_param(version),
                Param::Bool(dirty),
                Param::Bool(forced),
                Param::Text(Utc::now().to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Highest recorded version and its dirty flag. Does not create the table.
    pub(crate) fn current_version(&self, db: &mut dyn Database) -> Result<VersionStatus> {
        if !self.table_exists(db)? {
            return Ok(VersionStatus::NoneApplied);
        }

        let max = db
            .query_scalar(&format!("SELECT MAX(version) FROM {}", self.table), &[])
            .map_err(|e| ledger_error("failed to read current version".into(), e))?;
        let Some(version) = max else {
            return Ok(VersionStatus::NoneApplied);
        };

        let dirty = db
            .query_scalar(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE version = {} AND dirty = {}",
                    self.table,
                    self.ph(1),
                    self.ph(2)
                ),
                &[Param::Int(version), Param::Bool(true)],
            )
            .map_err(|e| ledger_error("failed to read dirty flag".into(), e))?
            .unwrap_or(0)
            > 0;

        Ok(VersionStatus::At {
            version: from_sql_version(version)?,
            dirty,
        })
    }

    /// Lowest version left dirty by a failed run, if any.
    pub(crate) fn first_dirty(&self, db: &mut dyn Database) -> Result<Option<u64>> {
        let min = db
            .query_scalar(
                &format!(
                    "SELECT MIN(version) FROM {} WHERE dirty = {}",
                    self.table,
                    self.ph(1)
                ),
                &[Param::Bool(true)],
            )
            .map_err(|e| ledger_error("failed to look for dirty versions".into(), e))?;
        min.map(from_sql_version).transpose()
    }

    /// Clean versions that were recorded by running a script, newest first.
    /// Forced baselines are left out.
    pub(crate) fn executed_desc(&self, db: &mut dyn Database) -> Result<Vec<u64>> {
        let versions = db
            .query_column(
                &format!(
                    "SELECT version FROM {} WHERE dirty = {} AND forced = {} ORDER BY version DESC",
                    self.table,
                    self.ph(1),
                    self.ph(2)
                ),
                &[Param::Bool(false), Param::Bool(false)],
            )
            .map_err(|e| ledger_error("failed to list applied versions".into(), e))?;
        versions.into_iter().map(from_sql_version).collect()
    }

    /// Forget `version` after its down script ran.
    ///
    /// Every row at or above `version` is dropped. If one of them was a
    /// forced baseline, the baseline moves down to `baseline` so the
    /// versions below stay applied.
    pub(crate) fn revert(
        &self,
        db: &mut dyn Database,
        version: u64,
        baseline: Option<u64>,
    ) -> Result<()> {
        let covering = db
            .query_scalar(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE forced = {} AND version >= {}",
                    self.table,
                    self.ph(1),
                    self.ph(2)
                ),
                &[Param::Bool(true), version_param(version)],
            )
            .map_err(|e| ledger_error(format!("failed to read baseline for {version}"), e))?
            .unwrap_or(0)
            > 0;

        db.execute(
            &format!("DELETE FROM {} WHERE version >= {}", self.table, self.ph(1)),
            &[version_param(version)],
        )
        .map_err(|e| ledger_error(format!("failed to remove version {version}"), e))?;

        match baseline {
            Some(lower) if covering => {
                self.write(db, lower, false, true)
                    .map_err(|e| ledger_error(format!("failed to move baseline to {lower}"), e))?;
                debug!(version, baseline = lower, "ledger record removed, baseline moved");
            }
            _ => debug!(version, "ledger record removed"),
        }
        Ok(())
    }

    /// Drop every row, leaving the ledger at "no migrations applied".
    pub(crate) fn clear(&self, db: &mut dyn Database) -> Result<()> {
        db.execute(&format!("DELETE FROM {}", self.table), &[])
            .map_err(|e| ledger_error(format!("failed to clear {}", self.table), e))?;
        Ok(())
    }

    /// Point the ledger at `version`, clean, without running any script.
    ///
    /// Rows at or above `version` and every dirty row are dropped first.
    pub(crate) fn force(&self, db: &mut dyn Database, version: u64) -> Result<()> {
        let clear = format!(
            "DELETE FROM {} WHERE version >= {} OR dirty = {}",
            self.table,
            self.ph(1),
            self.ph(2)
        );
        db.execute(&clear, &[version_param(version), Param::Bool(true)])
            .and_then(|_| self.write(db, version, false, true))
            .map_err(|e| ledger_error(format!("failed to force version {version}"), e))
    }
}

fn version_param(version: u64) -> Param {
    // Loader rejects versions above i64::MAX.
    Param::Int(version as i64)
}

fn from_sql_version(raw: i64) -> Result<u64> {
    u64::try_from(raw).map_err(|_| Error::Ledger(format!("negative version {raw} in ledger")))
}

fn ledger_error(context: String, e: sqlshift_common::DriverError) -> Error {
    Error::Ledger(format!("{context}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::SqliteDatabase;

    fn setup() -> (SqliteDatabase, VersionLedger) {
        let mut db = SqliteDatabase::in_memory().unwrap();
        let ledger = VersionLedger::new(DEFAULT_TABLE, Dialect::Sqlite);
        ledger.ensure_table(&mut db).unwrap();
        (db, ledger)
    }

    #[test]
    fn ensure_table_is_idempotent() {
        let (mut db, ledger) = setup();
        ledger.record(&mut db, 1, false).unwrap();
        ledger.ensure_table(&mut db).unwrap();
        assert!(ledger.has(&mut db, 1).unwrap());
    }

    #[test]
    fn has_requires_clean_record() {
        let (mut db, ledger) = setup();
        assert!(!ledger.has(&mut db, 1).unwrap());

        ledger.record(&mut db, 1, true).unwrap();
        assert!(!ledger.has(&mut db, 1).unwrap());

        ledger.record(&mut db, 1, false).unwrap();
        assert!(ledger.has(&mut db, 1).unwrap());
        assert!(!ledger.has(&mut db, 2).unwrap());
    }

    #[test]
    fn record_upserts_single_row() {
        let (mut db, ledger) = setup();
        ledger.record(&mut db, 5, true).unwrap();
        ledger.record(&mut db, 5, false).unwrap();
        let rows: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn current_version_without_table_has_no_side_effects() {
        let mut db = SqliteDatabase::in_memory().unwrap();
        let ledger = VersionLedger::new(DEFAULT_TABLE, Dialect::Sqlite);
        assert_eq!(
            ledger.current_version(&mut db).unwrap(),
            VersionStatus::NoneApplied
        );
        let tables: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(tables, 0);
    }

    #[test]
    fn current_version_reports_highest_and_dirty_flag() {
        let (mut db, ledger) = setup();
        assert_eq!(
            ledger.current_version(&mut db).unwrap(),
            VersionStatus::NoneApplied
        );

        ledger.record(&mut db, 1, false).unwrap();
        ledger.record(&mut db, 2, true).unwrap();
        let status = ledger.current_version(&mut db).unwrap();
        assert_eq!(
            status,
            VersionStatus::At {
                version: 2,
                dirty: true
            }
        );
        assert!(status.is_dirty());
        assert_eq!(ledger.first_dirty(&mut db).unwrap(), Some(2));
    }

    #[test]
    fn force_sets_clean_baseline_covering_lower_versions() {
        let (mut db, ledger) = setup();
        ledger.record(&mut db, 2, false).unwrap();
        ledger.record(&mut db, 3, true).unwrap();
        ledger.record(&mut db, 9, false).unwrap();

        ledger.force(&mut db, 5).unwrap();

        assert_eq!(
            ledger.current_version(&mut db).unwrap(),
            VersionStatus::At {
                version: 5,
                dirty: false
            }
        );
        assert_eq!(ledger.first_dirty(&mut db).unwrap(), None);
        for v in 1..=5 {
            assert!(ledger.has(&mut db, v).unwrap(), "version {v} should count as applied");
        }
        assert!(!ledger.has(&mut db, 6).unwrap());
        assert!(!ledger.has(&mut db, 9).unwrap());
    }

    #[test]
    fn executed_desc_skips_forced_and_dirty_rows() {
        let (mut db, ledger) = setup();
        for v in [1, 2, 10] {
            ledger.record(&mut db, v, false).unwrap();
        }
        ledger.record(&mut db, 11, true).unwrap();
        assert_eq!(ledger.executed_desc(&mut db).unwrap(), vec![10, 2, 1]);

        ledger.force(&mut db, 12).unwrap();
        assert_eq!(ledger.executed_desc(&mut db).unwrap(), vec![10, 2, 1]);
    }

    #[test]
    fn revert_moves_forced_baseline_down() {
        let (mut db, ledger) = setup();
        ledger.force(&mut db, 3).unwrap();

        ledger.revert(&mut db, 3, Some(2)).unwrap();
        assert_eq!(
            ledger.current_version(&mut db).unwrap(),
            VersionStatus::At {
                version: 2,
                dirty: false
            }
        );
        assert!(ledger.has(&mut db, 1).unwrap());
        assert!(!ledger.has(&mut db, 3).unwrap());

        ledger.revert(&mut db, 2, None).unwrap();
        assert_eq!(
            ledger.current_version(&mut db).unwrap(),
            VersionStatus::NoneApplied
        );
    }

    #[test]
    fn revert_of_executed_version_keeps_lower_rows() {
        let (mut db, ledger) = setup();
        for v in [1, 2] {
            ledger.record(&mut db, v, false).unwrap();
        }
        ledger.revert(&mut db, 2, Some(1)).unwrap();
        assert_eq!(ledger.executed_desc(&mut db).unwrap(), vec![1]);
        let forced: i64 = db
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM schema_migrations WHERE forced = 1",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(forced, 0);
    }

    #[test]
    fn clear_empties_the_ledger() {
        let (mut db, ledger) = setup();
        ledger.record(&mut db, 1, false).unwrap();
        ledger.record(&mut db, 2, true).unwrap();
        ledger.clear(&mut db).unwrap();
        assert_eq!(
            ledger.current_version(&mut db).unwrap(),
            VersionStatus::NoneApplied
        );
        assert_eq!(ledger.first_dirty(&mut db).unwrap(), None);
    }

    #[test]
    fn table_names_must_be_plain_identifiers() {
        validate_table_name("schema_migrations").unwrap();
        validate_table_name("_v2").unwrap();
        assert!(validate_table_name("bad name").is_err());
        assert!(validate_table_name("1ledger").is_err());
        assert!(validate_table_name("t; DROP TABLE users").is_err());
    }

    #[test]
    fn version_status_display() {
        assert_eq!(VersionStatus::NoneApplied.to_string(), "no migrations applied");
        assert_eq!(
            VersionStatus::At {
                version: 3,
                dirty: true
            }
            .to_string(),
            "version 3 (dirty)"
        );
    }

    #[test]
    fn version_status_serializes_for_health_checks() {
        let json = serde_json::to_value(VersionStatus::At {
            version: 4,
            dirty: false,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "at", "version": 4, "dirty": false})
        );
    }
}
