use std::fs;
use std::path::Path;

use tempfile::TempDir;

/// A throwaway migrations directory.
pub struct MigrationDir {
    dir: TempDir,
}

impl MigrationDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create migrations temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, file_name: &str, body: &str) -> &Self {
        fs::write(self.dir.path().join(file_name), body).expect("write migration file");
        self
    }

    pub fn remove(&self, file_name: &str) -> &Self {
        fs::remove_file(self.dir.path().join(file_name)).expect("remove migration file");
        self
    }
}

impl Default for MigrationDir {
    fn default() -> Self {
        Self::new()
    }
}
