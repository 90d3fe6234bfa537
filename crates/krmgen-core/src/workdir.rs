//! Scoped working tree
//!
//! Every generation run works on a private copy of the input directory. The
//! copy is mutated in place (templates expanded, Kustomize files rewritten,
//! Helm output added) and removed when the [`WorkingTree`] is dropped, on
//! success and on every error path alike.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use walkdir::WalkDir;

use crate::error::{CoreError, Result};

#[derive(Debug)]
pub struct WorkingTree {
    dir: TempDir,
}

impl WorkingTree {
    /// Create an empty working tree in the system temp directory
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("krmgen").tempdir()?;
        Ok(Self { dir })
    }

    /// Create a working tree holding a recursive copy of `source`
    pub fn copy_from(source: &Path) -> Result<Self> {
        let tree = Self::new()?;
        copy_dir(source, tree.path())?;
        tracing::debug!(
            "copied {} into working tree {}",
            source.display(),
            tree.path().display()
        );
        Ok(tree)
    }

    /// Root directory of the tree
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Resolve a path relative to the tree root
    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(relative)
    }
}

/// Recursively copy the contents of `source` into the existing directory `target`
pub fn copy_dir(source: &Path, target: &Path) -> Result<()> {
    for entry in WalkDir::new(source).min_depth(1) {
        let entry = entry.map_err(|e| CoreError::Copy {
            path: source.display().to_string(),
            message: e.to_string(),
        })?;

        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| CoreError::Copy {
                path: entry.path().display().to_string(),
                message: e.to_string(),
            })?;
        let destination = target.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination)?;
        } else {
            fs::copy(entry.path(), &destination).map_err(|e| CoreError::Copy {
                path: entry.path().display().to_string(),
                message: e.to_string(),
            })?;
        }
    }
    Ok(())
}
