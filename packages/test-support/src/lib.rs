//! Shared helpers for migration tests: unique names, test logging, throwaway
//! SQLite databases and migration directories.

use ulid::Ulid;

pub mod fixtures;
pub mod logging;
pub mod sqlite;

pub use fixtures::MigrationDir;
pub use sqlite::TempSqlite;

/// Generate a unique string with the given prefix
///
/// # Examples
/// ```
/// use test_support::unique_str;
///
/// let id1 = unique_str("db");
/// let id2 = unique_str("db");
/// assert_ne!(id1, id2);
/// assert!(id1.starts_with("db-"));
/// ```
pub fn unique_str(prefix: &str) -> String {
    format!("{}-{}", prefix, Ulid::new())
}
