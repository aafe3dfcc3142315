//! Project identity and the per-project data directory.
//!
//! A project is identified by the first 10 hex characters of
//! `MD5("<abs_path>::<birthtime_ms>")`, where the birthtime is taken from
//! the `.git` directory when present and from the project root otherwise.
//! Deleting and recreating a project at the same path therefore yields a
//! fresh identity and a fresh data directory.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use md5::{Digest, Md5};

use crate::constants::{
    CONTEXTWEAVER_HOME_DIR, INDEX_DB_FILENAME, LOCK_FILENAME, VECTORS_DIR_FILENAME,
};
use crate::errors::{CwError, CwResult};

/// Ten-hex-character project identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectId(String);

impl ProjectId {
    /// Derive the id for a project root.
    ///
    /// # Errors
    ///
    /// Returns [`CwError::ProjectRootNotFound`] if the root does not exist.
    pub fn derive(root: &Path) -> CwResult<Self> {
        if !root.is_dir() {
            return Err(CwError::ProjectRootNotFound(root.to_path_buf()));
        }
        let abs = root.canonicalize()?;

        let git_dir = abs.join(".git");
        let birth_target = if git_dir.is_dir() { git_dir } else { abs.clone() };
        let birth_ms = birthtime_ms(&birth_target)?;

        let seed = format!("{}::{}", normalize_path(&abs), birth_ms);
        let digest = Md5::digest(seed.as_bytes());
        let hex = hex::encode(digest);
        Ok(Self(hex[..10].to_string()))
    }

    /// Wrap an already-derived id (e.g. from a stored report).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The project's data directory under `home`.
    pub fn data_dir(&self, home: &Path) -> PathBuf {
        home.join(CONTEXTWEAVER_HOME_DIR).join(&self.0)
    }

    /// Path of the row store database.
    pub fn index_db_path(&self, home: &Path) -> PathBuf {
        self.data_dir(home).join(INDEX_DB_FILENAME)
    }

    /// Path of the vector store backing directory.
    pub fn vectors_path(&self, home: &Path) -> PathBuf {
        self.data_dir(home).join(VECTORS_DIR_FILENAME)
    }

    /// Path of the process lock file.
    pub fn lock_path(&self, home: &Path) -> PathBuf {
        self.data_dir(home).join(LOCK_FILENAME)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Creation time of `path` in milliseconds since the epoch.
///
/// Filesystems without birthtime fall back to mtime, which keeps the id
/// stable for the lifetime of the directory.
fn birthtime_ms(path: &Path) -> CwResult<u128> {
    let meta = std::fs::metadata(path)?;
    let stamp = meta.created().or_else(|_| meta.modified())?;
    Ok(stamp
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0))
}

/// Forward-slash form of an absolute path.
fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn derive_is_stable_for_same_root() {
        let dir = TempDir::new().unwrap();
        let a = ProjectId::derive(dir.path()).unwrap();
        let b = ProjectId::derive(dir.path()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 10);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn derive_differs_between_roots() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        let a = ProjectId::derive(dir_a.path()).unwrap();
        let b = ProjectId::derive(dir_b.path()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn derive_missing_root_fails() {
        let err = ProjectId::derive(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, CwError::ProjectRootNotFound(_)));
    }

    #[test]
    fn data_dir_layout() {
        let id = ProjectId::new("abc123def0");
        let home = Path::new("/home/u");
        assert_eq!(
            id.index_db_path(home),
            Path::new("/home/u/.contextweaver/abc123def0/index.db")
        );
        assert_eq!(
            id.vectors_path(home),
            Path::new("/home/u/.contextweaver/abc123def0/vectors.lance")
        );
        assert_eq!(
            id.lock_path(home),
            Path::new("/home/u/.contextweaver/abc123def0/index.lock")
        );
    }
}
