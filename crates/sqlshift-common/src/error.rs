use thiserror::Error;

use crate::Direction;

pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by a database driver, kept opaque so any driver fits.
pub type DriverError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    /// A script file name could not be parsed. Loaders log and skip these.
    #[error("cannot load migration {file}: {reason}")]
    Load { file: String, reason: String },

    #[error("unsupported dialect: {0}")]
    DialectUnsupported(String),

    #[error(
        "migration {version} failed at statement {index} of {total} (`{preview}`): {source}"
    )]
    StatementExecution {
        version: u64,
        index: usize,
        total: usize,
        preview: String,
        #[source]
        source: DriverError,
    },

    #[error("ledger error: {0}")]
    Ledger(String),

    #[error(
        "version {0} is dirty: repair the schema by hand, then force the ledger to a clean version"
    )]
    Dirty(u64),

    #[error("no applicable {direction} script for version {version}")]
    MissingScript { version: u64, direction: Direction },

    #[error("duplicate {direction} migration {version}: {first} and {second}")]
    DuplicateVersion {
        version: u64,
        direction: Direction,
        first: String,
        second: String,
    },

    #[error("database error: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
