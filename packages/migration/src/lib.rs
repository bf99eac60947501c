//! Versioned SQL migrations for the meter-reading admin database.
//!
//! Scripts named `<version>_<description>.sql` are applied in lexical file
//! name order; each applied version is recorded in the `applied_migrations`
//! ledger in the same transaction as the script itself.

pub use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use sea_orm::{DatabaseBackend, Statement};

pub mod error;
pub mod ledger;
pub mod runner;
pub mod script;
pub mod splitter;

pub use error::MigrationError;
pub use runner::{MigrationReport, MigrationRunner, MigrationStatus, OrderPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationCommand {
    Up,
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    Up(MigrationReport),
    Status(MigrationStatus),
}

/// Run `command` against an already open connection.
/// Used by both the CLI orchestration and tests.
pub async fn migrate<C>(
    db: &C,
    runner: &MigrationRunner,
    command: MigrationCommand,
) -> Result<MigrationOutcome, MigrationError>
where
    C: ConnectionTrait + TransactionTrait,
{
    let db_info_before = get_db_diagnostics(db, runner).await;

    tracing::info!("▶ cmd={command:?}  profile={}", db_info_before.profile);
    tracing::info!("▶ connected to DB: {}", db_info_before.name);
    tracing::info!(
        "▶ BEFORE: {} migration file(s) found, {} applied",
        db_info_before.defined_migrations_count,
        db_info_before.mig_count
    );

    let result = match command {
        MigrationCommand::Up => runner.run(db).await.map(MigrationOutcome::Up),
        MigrationCommand::Status => runner.status(db).await.map(MigrationOutcome::Status),
    };

    match result {
        Ok(outcome) => {
            match &outcome {
                MigrationOutcome::Up(_) => {
                    let db_info_after = get_db_diagnostics(db, runner).await;
                    tracing::info!(
                        "▶ AFTER: {} migration file(s) found, {} applied",
                        db_info_after.defined_migrations_count,
                        db_info_after.mig_count
                    );
                }
                MigrationOutcome::Status(status) => log_status(status),
            }
            tracing::info!("✅ {command:?} OK for {}", db_info_before.profile);
            Ok(outcome)
        }
        Err(e) => {
            tracing::error!("❌ {command:?} failed for {}: {e}", db_info_before.profile);
            Err(e)
        }
    }
}

fn log_status(status: &MigrationStatus) {
    for version in &status.applied {
        tracing::info!("  applied  {version}");
    }
    for file in &status.pending {
        tracing::info!("  pending  {file}");
    }
    for version in &status.orphaned {
        tracing::warn!("  orphaned {version} (no migration file)");
    }
    tracing::info!(
        "▶ STATUS: {} applied, {} pending",
        status.applied.len(),
        status.pending.len()
    );
}

#[derive(Debug)]
struct DbDiagnostics {
    profile: String,
    name: String,
    mig_count: usize,
    defined_migrations_count: usize,
}

/// Best effort: diagnostics never fail the command they decorate.
async fn get_db_diagnostics<C>(db: &C, runner: &MigrationRunner) -> DbDiagnostics
where
    C: ConnectionTrait,
{
    let backend = db.get_database_backend();
    let profile = format!("{backend:?}");

    let name_sql = match backend {
        DatabaseBackend::Postgres => Some("select current_database() as name"),
        DatabaseBackend::Sqlite => {
            Some("SELECT file AS name FROM pragma_database_list WHERE name = 'main'")
        }
        DatabaseBackend::MySql => None,
    };
    let name = match name_sql {
        Some(sql) => match db.query_one(Statement::from_string(backend, sql)).await {
            Ok(Some(row)) => match row.try_get::<String>("", "name") {
                Ok(file) if file.is_empty() => ":memory:".to_string(),
                Ok(name) => name,
                Err(_) => "<unknown>".to_string(),
            },
            _ => "<unknown>".to_string(),
        },
        None => "<unsupported>".to_string(),
    };

    let mig_count = ledger::applied_versions_if_present(db)
        .await
        .map(|versions| versions.len())
        .unwrap_or(0);
    let defined_migrations_count = script::discover(runner.dir())
        .map(|scripts| scripts.len())
        .unwrap_or(0);

    DbDiagnostics {
        profile,
        name,
        mig_count,
        defined_migrations_count,
    }
}

/// Number of versions in the ledger; 0 when the ledger table does not exist.
pub async fn count_applied_migrations<C>(db: &C) -> Result<usize, MigrationError>
where
    C: ConnectionTrait,
{
    ledger::applied_versions_if_present(db)
        .await
        .map(|versions| versions.len())
        .map_err(MigrationError::Ledger)
}

/// Greatest applied version, or `None` when nothing has been applied.
pub async fn get_latest_migration_version<C>(db: &C) -> Result<Option<String>, MigrationError>
where
    C: ConnectionTrait,
{
    ledger::applied_versions_if_present(db)
        .await
        .map(|versions| versions.last().cloned())
        .map_err(MigrationError::Ledger)
}
