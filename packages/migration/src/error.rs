use std::io;
use std::path::PathBuf;

use sea_orm::DbErr;
use thiserror::Error;

use crate::splitter::ScanError;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to read migrations directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read migration script {file}: {source}")]
    ReadScript {
        file: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid migration file name '{file}': {reason}")]
    InvalidFilename { file: String, reason: &'static str },

    #[error("migration version '{version}' is used by both {first} and {second}")]
    DuplicateVersion {
        version: String,
        first: String,
        second: String,
    },

    #[error("failed to parse migration script {file}: {source}")]
    Scan {
        file: String,
        #[source]
        source: ScanError,
    },

    #[error("migration ledger unavailable: {0}")]
    Ledger(#[source] DbErr),

    #[error("migration {file} failed at statement {index} ({preview}): {source}")]
    Statement {
        file: String,
        index: usize,
        preview: String,
        #[source]
        source: DbErr,
    },

    #[error("failed to record migration {version}: {source}")]
    Record {
        version: String,
        #[source]
        source: DbErr,
    },

    #[error("transaction error while applying {file}: {source}")]
    Transaction {
        file: String,
        #[source]
        source: DbErr,
    },

    #[error(
        "pending migration {version} sorts before already applied version {latest}; \
         rename it or allow out-of-order migrations"
    )]
    OutOfOrder { version: String, latest: String },
}
