use std::path::Path;

use rusqlite::Connection;
use rusqlite::types::Value;
use sqlshift_common::{DriverError, Error, Result};
use tracing::info;

use crate::dialect::Dialect;

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// A bind parameter for ledger queries.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Int(i64),
    Bool(bool),
    Text(String),
}

/// The primitives the migration engine needs from a database handle.
///
/// `SqliteDatabase` is bundled. Other dialects plug in their own driver by
/// implementing this trait; placeholders in `sql` follow
/// [`Dialect::placeholder`].
pub trait Database {
    fn dialect(&self) -> Dialect;

    /// Run one raw statement taken from a migration script.
    fn execute_statement(&mut self, sql: &str) -> DriverResult<()>;

    /// Run a parameterised statement and return the affected row count.
    fn execute(&mut self, sql: &str, params: &[Param]) -> DriverResult<usize>;

    /// First column of the first row, `None` for no row or SQL NULL.
    fn query_scalar(&mut self, sql: &str, params: &[Param]) -> DriverResult<Option<i64>>;

    /// First column of every row.
    fn query_column(&mut self, sql: &str, params: &[Param]) -> DriverResult<Vec<i64>>;

    fn create_table_if_not_exists(&mut self, table: &str, columns: &str) -> DriverResult<()> {
        self.execute_statement(&format!("CREATE TABLE IF NOT EXISTS {table} ({columns})"))
    }
}

/// SQLite handle backed by rusqlite.
pub struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening database at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn to_values(params: &[Param]) -> Vec<Value> {
    params
        .iter()
        .map(|p| match p {
            Param::Int(i) => Value::Integer(*i),
            Param::Bool(b) => Value::Integer(i64::from(*b)),
            Param::Text(s) => Value::Text(s.clone()),
        })
        .collect()
}

impl Database for SqliteDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute_statement(&mut self, sql: &str) -> DriverResult<()> {
        // execute_batch tolerates statements that return rows (PRAGMA, SELECT).
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn execute(&mut self, sql: &str, params: &[Param]) -> DriverResult<usize> {
        let changed = self
            .conn
            .execute(sql, rusqlite::params_from_iter(to_values(params)))?;
        Ok(changed)
    }

    fn query_scalar(&mut self, sql: &str, params: &[Param]) -> DriverResult<Option<i64>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(to_values(params)))?;
        let value = match rows.next()? {
            Some(row) => row.get::<_, Option<i64>>(0)?,
            None => None,
        };
        Ok(value)
    }

    fn query_column(&mut self, sql: &str, params: &[Param]) -> DriverResult<Vec<i64>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(to_values(params)), |row| {
            row.get::<_, i64>(0)
        })?;

        let mut values = Vec::new();
        for row in rows {
            values.push(row?);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_and_query_round_trip() {
        let mut db = SqliteDatabase::in_memory().unwrap();
        db.execute_statement("CREATE TABLE t (id INTEGER PRIMARY KEY, flag INTEGER)")
            .unwrap();
        let n = db
            .execute(
                "INSERT INTO t (id, flag) VALUES (?1, ?2)",
                &[Param::Int(5), Param::Bool(true)],
            )
            .unwrap();
        assert_eq!(n, 1);

        let flag = db
            .query_scalar("SELECT flag FROM t WHERE id = ?1", &[Param::Int(5)])
            .unwrap();
        assert_eq!(flag, Some(1));
    }

    #[test]
    fn scalar_is_none_for_no_rows_and_null() {
        let mut db = SqliteDatabase::in_memory().unwrap();
        db.execute_statement("CREATE TABLE t (id INTEGER)").unwrap();
        assert_eq!(db.query_scalar("SELECT id FROM t", &[]).unwrap(), None);
        assert_eq!(db.query_scalar("SELECT MAX(id) FROM t", &[]).unwrap(), None);
    }

    #[test]
    fn query_column_collects_every_row() {
        let mut db = SqliteDatabase::in_memory().unwrap();
        db.execute_statement("CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (3), (1), (2);")
            .unwrap();
        let ids = db
            .query_column("SELECT id FROM t ORDER BY id DESC", &[])
            .unwrap();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn create_table_if_not_exists_is_idempotent() {
        let mut db = SqliteDatabase::in_memory().unwrap();
        db.create_table_if_not_exists("ledger", "version INTEGER PRIMARY KEY")
            .unwrap();
        db.create_table_if_not_exists("ledger", "version INTEGER PRIMARY KEY")
            .unwrap();
    }

    #[test]
    fn driver_errors_surface() {
        let mut db = SqliteDatabase::in_memory().unwrap();
        assert!(db.execute_statement("CREATE TABLE").is_err());
        assert!(db.query_scalar("SELECT * FROM missing", &[]).is_err());
    }
}
