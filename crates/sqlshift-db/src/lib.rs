pub mod database;
pub mod dialect;
mod ledger;
pub mod migrations;
pub mod runner;
pub mod source;
pub mod splitter;

pub use database::{Database, DriverResult, Param, SqliteDatabase};
pub use dialect::{Dialect, DialectPolicy, FeatureCategory, RunProfile, SkipReason};
pub use ledger::{DEFAULT_TABLE, VersionStatus, validate_table_name};
pub use migrations::{MigrationScript, parse_script};
pub use runner::{MigrationEvent, MigrationRunner, RunReport, RunState};
pub use source::{DirectorySource, MigrationSource, RawScript, StaticSource, load_scripts};
pub use splitter::split_statements;
