//! Path utilities for temporary databases and test data files.

use std::path::{Path, PathBuf};

/// Returns the workspace root directory.
pub fn workspace_root() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir)
        .parent() // crates/
        .and_then(|p| p.parent()) // workspace root
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from(manifest_dir))
}

/// Returns `services/{service_name}/testdata/`.
pub fn service_testdata_dir(service_name: &str) -> PathBuf {
    workspace_root()
        .join("services")
        .join(service_name)
        .join("testdata")
}

/// Creates a temporary directory for test output.
///
/// The directory is removed when the returned `TempDir` is dropped.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("xenia_test_")
        .tempdir()
        .expect("Failed to create temporary test directory")
}

/// A fresh SQLite database path inside its own temporary directory.
///
/// Keep the `TempDir` alive for as long as the database is used.
pub fn temp_sqlite_path() -> (tempfile::TempDir, PathBuf) {
    let dir = temp_test_dir();
    let path = dir.path().join("xenia.db");
    (dir, path)
}

/// Write `content` to `dir/name` and return the full path.
pub fn write_test_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_root_is_valid() {
        let root = workspace_root();
        assert!(
            root.join("Cargo.toml").exists(),
            "Workspace root should contain Cargo.toml: {:?}",
            root
        );
    }

    #[test]
    fn test_temp_sqlite_path_is_unused() {
        let (dir, path) = temp_sqlite_path();
        assert!(path.starts_with(dir.path()));
        assert!(!path.exists());
    }

    #[test]
    fn test_write_test_file() {
        let dir = temp_test_dir();
        let path = write_test_file(dir.path(), "obs.csv", "DATE_UTC,WSPD\n");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "DATE_UTC,WSPD\n");
    }
}
