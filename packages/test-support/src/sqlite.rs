//! File-backed SQLite databases for migration tests.
//!
//! A file rather than `sqlite::memory:` so a test can reconnect and observe
//! exactly what was committed.

use std::path::PathBuf;
use std::time::Duration;

use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Statement,
};
use tempfile::TempDir;

use crate::unique_str;

pub struct TempSqlite {
    _dir: TempDir,
    path: PathBuf,
}

impl TempSqlite {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create sqlite temp dir");
        let path = dir.path().join(format!("{}.db", unique_str("migrate")));
        Self { _dir: dir, path }
    }

    pub fn url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.path.display())
    }

    /// Single-connection pool, matching how the migration CLI connects.
    pub async fn connect(&self) -> DatabaseConnection {
        let mut opt = ConnectOptions::new(self.url());
        opt.min_connections(1)
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(2))
            .sqlx_logging(false);
        Database::connect(opt).await.expect("connect to temp sqlite")
    }
}

impl Default for TempSqlite {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn table_exists<C: ConnectionTrait>(db: &C, table: &str) -> bool {
    let stmt = Statement::from_sql_and_values(
        DatabaseBackend::Sqlite,
        "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = ?",
        [table.into()],
    );
    let row = db
        .query_one(stmt)
        .await
        .expect("query sqlite_master")
        .expect("count row");
    row.try_get::<i64>("", "n").expect("read count") > 0
}

pub async fn count_rows<C: ConnectionTrait>(db: &C, table: &str) -> i64 {
    let stmt = Statement::from_string(
        DatabaseBackend::Sqlite,
        format!("SELECT COUNT(*) AS n FROM {table}"),
    );
    let row = db
        .query_one(stmt)
        .await
        .expect("count query")
        .expect("count row");
    row.try_get::<i64>("", "n").expect("read count")
}

/// Ledger versions straight from the table, in insertion order.
pub async fn ledger_versions<C: ConnectionTrait>(db: &C) -> Vec<String> {
    let stmt = Statement::from_string(
        DatabaseBackend::Sqlite,
        "SELECT version FROM applied_migrations ORDER BY id ASC",
    );
    db.query_all(stmt)
        .await
        .expect("read ledger")
        .into_iter()
        .map(|row| row.try_get::<String>("", "version").expect("version column"))
        .collect()
}
