use migration::MigrationError;
use sea_orm::DbErr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbInfraError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("failed to connect to database after {attempts} attempt(s): {source}")]
    Connect {
        attempts: u32,
        #[source]
        source: DbErr,
    },

    #[error("failed to prepare database connection with '{statement}': {source}")]
    ConnectionSetup {
        statement: &'static str,
        #[source]
        source: DbErr,
    },

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("migration run timed out after {after_ms}ms")]
    Timeout { after_ms: u128 },

    #[error("migration run cancelled")]
    Cancelled,
}

impl DbInfraError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
