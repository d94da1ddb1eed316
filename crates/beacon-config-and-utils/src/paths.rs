//! File system paths.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Directory under the home directory holding Beacon state.
const BASE_DIR_NAME: &str = ".beacon";

/// Manages file system paths.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.beacon)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.beacon`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.beacon).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.beacon/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the queue database path (~/.beacon/queue.sqlite).
    pub fn queue_database_file(&self) -> PathBuf {
        self.base_dir.join("queue.sqlite")
    }

    /// Ensure the base directory exists.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_with_base_dir() {
        let base = PathBuf::from("/tmp/test-beacon");
        let paths = Paths::with_base_dir(base.clone());

        assert_eq!(paths.base_dir(), &base);
        assert_eq!(paths.config_file(), base.join("config.json"));
        assert_eq!(paths.queue_database_file(), base.join("queue.sqlite"));
    }

    #[test]
    fn test_paths_default() {
        let paths = Paths::new().unwrap();
        let home = dirs::home_dir().unwrap();

        assert_eq!(paths.base_dir(), &home.join(".beacon"));
    }

    #[test]
    fn test_ensure_dirs_creates_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("beacon");
        let paths = Paths::with_base_dir(base.clone());

        assert!(!base.exists());
        paths.ensure_dirs().unwrap();
        paths.ensure_dirs().unwrap();
        assert!(base.is_dir());
    }
}
