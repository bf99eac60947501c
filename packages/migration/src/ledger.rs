//! The `applied_migrations` table: one row per version whose script ran to
//! completion. Rows are only ever inserted.

use std::collections::BTreeSet;

use sea_orm::{ConnectionTrait, DatabaseBackend, DbErr, Statement, TransactionTrait};
use tracing::debug;

pub const LEDGER_TABLE: &str = "applied_migrations";

fn create_ledger_sql(backend: DatabaseBackend) -> String {
    let id_column = match backend {
        DatabaseBackend::Postgres => "id SERIAL PRIMARY KEY",
        DatabaseBackend::Sqlite => "id INTEGER PRIMARY KEY AUTOINCREMENT",
        DatabaseBackend::MySql => "id INTEGER PRIMARY KEY AUTO_INCREMENT",
    };
    format!(
        "CREATE TABLE IF NOT EXISTS {LEDGER_TABLE} (\n    \
         {id_column},\n    \
         version TEXT UNIQUE NOT NULL,\n    \
         applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP\n)"
    )
}

/// Create the ledger table if it is missing, committed on its own so later
/// failures never undo it.
pub async fn ensure_ledger<C>(db: &C) -> Result<(), DbErr>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;
    txn.execute_unprepared(&create_ledger_sql(db.get_database_backend()))
        .await?;
    txn.commit().await?;
    debug!(table = LEDGER_TABLE, "migration ledger ready");
    Ok(())
}

/// All versions recorded in the ledger, in lexical order.
pub async fn applied_versions<C>(db: &C) -> Result<BTreeSet<String>, DbErr>
where
    C: ConnectionTrait,
{
    let stmt = Statement::from_string(
        db.get_database_backend(),
        format!("SELECT version FROM {LEDGER_TABLE} ORDER BY version ASC"),
    );
    db.query_all(stmt)
        .await?
        .into_iter()
        .map(|row| row.try_get::<String>("", "version"))
        .collect()
}

/// Whether the ledger table exists. Read-only; errors are the database's.
pub async fn ledger_exists<C>(db: &C) -> Result<bool, DbErr>
where
    C: ConnectionTrait,
{
    let backend = db.get_database_backend();
    let sql = match backend {
        DatabaseBackend::Postgres => {
            "SELECT COUNT(*) AS n FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1"
        }
        DatabaseBackend::Sqlite => {
            "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = ?"
        }
        DatabaseBackend::MySql => {
            "SELECT COUNT(*) AS n FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_name = ?"
        }
    };
    let stmt = Statement::from_sql_and_values(backend, sql, [LEDGER_TABLE.into()]);
    let count = match db.query_one(stmt).await? {
        Some(row) => row.try_get::<i64>("", "n")?,
        None => 0,
    };
    Ok(count > 0)
}

/// Like [`applied_versions`], but a database without a ledger table reads as
/// empty instead of failing. Nothing is created, and any other database error
/// is returned.
pub async fn applied_versions_if_present<C>(db: &C) -> Result<BTreeSet<String>, DbErr>
where
    C: ConnectionTrait,
{
    if !ledger_exists(db).await? {
        debug!(table = LEDGER_TABLE, "migration ledger not created yet");
        return Ok(BTreeSet::new());
    }
    applied_versions(db).await
}

/// Record `version` as applied. Meant to run inside the transaction that
/// executed the script, so the row and the schema change commit together.
pub async fn record_version<C>(db: &C, version: &str) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    let backend = db.get_database_backend();
    let placeholder = match backend {
        DatabaseBackend::Postgres => "$1",
        DatabaseBackend::Sqlite | DatabaseBackend::MySql => "?",
    };
    let stmt = Statement::from_sql_and_values(
        backend,
        format!("INSERT INTO {LEDGER_TABLE} (version) VALUES ({placeholder})"),
        [version.into()],
    );
    db.execute(stmt).await?;
    Ok(())
}
