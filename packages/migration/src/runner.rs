use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use sea_orm::{ConnectionTrait, TransactionTrait};
use tracing::{debug, error, info, warn};

use crate::error::MigrationError;
use crate::ledger;
use crate::script::{self, MigrationScript};
use crate::splitter::{split_statements, Dialect};

/// How versions that sort before the latest applied version are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderPolicy {
    /// Refuse the whole run before anything executes.
    #[default]
    Strict,
    /// Apply them anyway, in lexical order, with a warning.
    Lenient,
}

/// Outcome of a successful `up` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Versions applied by this run, in application order.
    pub applied: Vec<String>,
    /// Versions found on disk that were already in the ledger.
    pub skipped: Vec<String>,
    pub statements_executed: usize,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Read-only view of the ledger against the scripts on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Versions recorded in the ledger.
    pub applied: Vec<String>,
    /// File names of scripts not yet applied, in the order they would run.
    pub pending: Vec<String>,
    /// Ledger versions with no script on disk.
    pub orphaned: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MigrationRunner {
    dir: PathBuf,
    order: OrderPolicy,
}

impl MigrationRunner {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            order: OrderPolicy::default(),
        }
    }

    pub fn with_order(mut self, order: OrderPolicy) -> Self {
        self.order = order;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn order(&self) -> OrderPolicy {
        self.order
    }

    /// Apply every script whose version is not in the ledger yet.
    ///
    /// Each script runs in its own transaction together with its ledger
    /// insert. The first failing script is rolled back and ends the run;
    /// scripts after it are never attempted.
    pub async fn run<C>(&self, db: &C) -> Result<MigrationReport, MigrationError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        ledger::ensure_ledger(db)
            .await
            .map_err(MigrationError::Ledger)?;
        let applied = ledger::applied_versions(db)
            .await
            .map_err(MigrationError::Ledger)?;
        info!(count = applied.len(), "already applied migrations: {applied:?}");

        let scripts = script::discover(&self.dir)?;
        info!(
            count = scripts.len(),
            dir = %self.dir.display(),
            "found migration files: {:?}",
            scripts.iter().map(|s| s.file_name.as_str()).collect::<Vec<_>>()
        );
        warn_orphaned(&applied, &scripts);

        let pending: Vec<&MigrationScript> = scripts
            .iter()
            .filter(|s| !applied.contains(&s.version))
            .collect();
        self.check_order(&applied, &pending)?;

        let mut report = MigrationReport::default();
        for script in &scripts {
            if applied.contains(&script.version) {
                info!(file = %script.file_name, "skipping migration (already applied)");
                report.skipped.push(script.version.clone());
                continue;
            }
            report.statements_executed += apply_script(db, script).await?;
            report.applied.push(script.version.clone());
        }

        info!(
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            statements = report.statements_executed,
            "migrations complete"
        );
        Ok(report)
    }

    /// Compare the ledger with the directory without changing anything. A
    /// database that never ran a migration has no ledger table and reports
    /// everything as pending.
    pub async fn status<C>(&self, db: &C) -> Result<MigrationStatus, MigrationError>
    where
        C: ConnectionTrait,
    {
        let applied = ledger::applied_versions_if_present(db)
            .await
            .map_err(MigrationError::Ledger)?;
        let scripts = script::discover(&self.dir)?;
        let on_disk: BTreeSet<&str> = scripts.iter().map(|s| s.version.as_str()).collect();

        Ok(MigrationStatus {
            pending: scripts
                .iter()
                .filter(|s| !applied.contains(&s.version))
                .map(|s| s.file_name.clone())
                .collect(),
            orphaned: applied
                .iter()
                .filter(|v| !on_disk.contains(v.as_str()))
                .cloned()
                .collect(),
            applied: applied.into_iter().collect(),
        })
    }

    fn check_order(
        &self,
        applied: &BTreeSet<String>,
        pending: &[&MigrationScript],
    ) -> Result<(), MigrationError> {
        let Some(latest) = applied.last() else {
            return Ok(());
        };
        for script in pending.iter().filter(|s| s.version < *latest) {
            match self.order {
                OrderPolicy::Strict => {
                    error!(
                        file = %script.file_name,
                        latest = %latest,
                        "pending migration sorts before latest applied version"
                    );
                    return Err(MigrationError::OutOfOrder {
                        version: script.version.clone(),
                        latest: latest.clone(),
                    });
                }
                OrderPolicy::Lenient => {
                    warn!(
                        file = %script.file_name,
                        latest = %latest,
                        "applying migration out of order"
                    );
                }
            }
        }
        Ok(())
    }
}

fn warn_orphaned(applied: &BTreeSet<String>, scripts: &[MigrationScript]) {
    for version in applied {
        if !scripts.iter().any(|s| &s.version == version) {
            warn!(version = %version, "ledger version has no migration file on disk");
        }
    }
}

/// Run one script and its ledger insert in a single transaction. Returns the
/// number of statements executed.
async fn apply_script<C>(db: &C, script: &MigrationScript) -> Result<usize, MigrationError>
where
    C: ConnectionTrait + TransactionTrait,
{
    info!(file = %script.file_name, version = %script.version, "applying migration");

    let body = script.read_body()?;
    let dialect = Dialect::from(db.get_database_backend());
    let statements = split_statements(&body, dialect).map_err(|source| {
        error!(file = %script.file_name, error = %source, "failed to parse migration script");
        MigrationError::Scan {
            file: script.file_name.clone(),
            source,
        }
    })?;

    let txn = db
        .begin()
        .await
        .map_err(|source| MigrationError::Transaction {
            file: script.file_name.clone(),
            source,
        })?;

    for (idx, stmt) in statements.iter().enumerate() {
        let index = idx + 1;
        let result = txn.execute_unprepared(&stmt.sql).await;
        if let Err(source) = result {
            error!(
                file = %script.file_name,
                index,
                line = stmt.line,
                error = %source,
                "error executing statement, rolling back: {}",
                stmt.preview()
            );
            if let Err(rollback_err) = txn.rollback().await {
                warn!(file = %script.file_name, error = %rollback_err, "rollback failed");
            }
            return Err(MigrationError::Statement {
                file: script.file_name.clone(),
                index,
                preview: stmt.preview(),
                source,
            });
        }
        debug!(
            file = %script.file_name,
            index,
            line = stmt.line,
            "executed: {}",
            stmt.preview()
        );
    }

    let recorded = ledger::record_version(&txn, &script.version).await;
    if let Err(source) = recorded {
        error!(
            version = %script.version,
            error = %source,
            "failed to record migration, rolling back"
        );
        if let Err(rollback_err) = txn.rollback().await {
            warn!(file = %script.file_name, error = %rollback_err, "rollback failed");
        }
        return Err(MigrationError::Record {
            version: script.version.clone(),
            source,
        });
    }
    txn.commit().await.map_err(|source| MigrationError::Record {
        version: script.version.clone(),
        source,
    })?;

    info!(
        file = %script.file_name,
        statements = statements.len(),
        "migration applied successfully and recorded"
    );
    Ok(statements.len())
}
