use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::MigrationError;

pub const SCRIPT_EXTENSION: &str = "sql";

/// A migration file found on disk. The body is read lazily, only when the
/// script actually has to be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    pub version: String,
    pub file_name: String,
    pub path: PathBuf,
}

impl MigrationScript {
    pub fn read_body(&self) -> Result<String, MigrationError> {
        fs::read_to_string(&self.path).map_err(|source| MigrationError::ReadScript {
            file: self.file_name.clone(),
            source,
        })
    }
}

/// Version token of a migration file name: the text before the first `_`.
pub fn version_of(file_name: &str) -> Result<&str, MigrationError> {
    match file_name.split_once('_') {
        Some((version, _)) if !version.is_empty() => Ok(version),
        Some(_) => Err(MigrationError::InvalidFilename {
            file: file_name.to_string(),
            reason: "version token before '_' is empty",
        }),
        None => Err(MigrationError::InvalidFilename {
            file: file_name.to_string(),
            reason: "expected '<version>_<description>.sql'",
        }),
    }
}

fn has_script_extension(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(SCRIPT_EXTENSION))
}

/// List the migration scripts in `dir`, sorted by file name.
///
/// Ordering is plain lexical order of the names, never directory listing
/// order or timestamps. Non-`.sql` entries and subdirectories are ignored.
pub fn discover(dir: &Path) -> Result<Vec<MigrationScript>, MigrationError> {
    let read_dir_err = |source| MigrationError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_dir_err)? {
        let entry = entry.map_err(read_dir_err)?;
        if !entry.path().is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            warn!(path = %entry.path().display(), "ignoring migration file with non-UTF-8 name");
            continue;
        };
        if has_script_extension(&name) {
            names.push(name);
        } else {
            debug!(file = %name, "ignoring non-sql file in migrations directory");
        }
    }
    names.sort();

    let mut seen: HashMap<String, String> = HashMap::new();
    let mut scripts = Vec::with_capacity(names.len());
    for name in names {
        let version = version_of(&name)?.to_string();
        if let Some(first) = seen.insert(version.clone(), name.clone()) {
            return Err(MigrationError::DuplicateVersion {
                version,
                first,
                second: name,
            });
        }
        scripts.push(MigrationScript {
            version,
            path: dir.join(&name),
            file_name: name,
        });
    }

    Ok(scripts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), "SELECT 1;").unwrap();
    }

    #[test]
    fn version_is_prefix_before_first_underscore() {
        assert_eq!(version_of("001_init.sql").unwrap(), "001");
        assert_eq!(version_of("2024_01_add_pincodes.sql").unwrap(), "2024");
    }

    #[test]
    fn version_requires_underscore_and_token() {
        assert!(matches!(
            version_of("init.sql"),
            Err(MigrationError::InvalidFilename { .. })
        ));
        assert!(matches!(
            version_of("_init.sql"),
            Err(MigrationError::InvalidFilename { .. })
        ));
    }

    #[test]
    fn discover_sorts_lexically_and_filters() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "010_c.sql");
        touch(dir.path(), "002_b.SQL");
        touch(dir.path(), "001_a.sql");
        touch(dir.path(), "README.md");
        fs::create_dir(dir.path().join("003_dir.sql")).unwrap();

        let scripts = discover(dir.path()).unwrap();
        let names: Vec<_> = scripts.iter().map(|s| s.file_name.as_str()).collect();
        assert_eq!(names, vec!["001_a.sql", "002_b.SQL", "010_c.sql"]);
        assert_eq!(scripts[2].version, "010");
        assert_eq!(scripts[0].path, dir.path().join("001_a.sql"));
    }

    #[test]
    fn discover_empty_directory_is_fine() {
        let dir = TempDir::new().unwrap();
        assert!(discover(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn discover_missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            discover(&missing),
            Err(MigrationError::ReadDir { .. })
        ));
    }

    #[test]
    fn discover_rejects_duplicate_versions() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "001_a.sql");
        touch(dir.path(), "001_b.sql");

        match discover(dir.path()) {
            Err(MigrationError::DuplicateVersion {
                version,
                first,
                second,
            }) => {
                assert_eq!(version, "001");
                assert_eq!(first, "001_a.sql");
                assert_eq!(second, "001_b.sql");
            }
            other => panic!("expected duplicate version error, got {other:?}"),
        }
    }
}
