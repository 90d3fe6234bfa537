//! In-place template expansion of working tree files

use std::fs;
use std::path::{Path, PathBuf};

use krmgen_engine::Evaluator;

use crate::error::{ComposeError, Result};

/// Copy `path` to `{file}_{YYYYmmdd-HHMMSS}{ext}` next to it.
///
/// Best effort: a failed copy is logged and otherwise ignored.
pub fn backup_file(path: &Path) -> Option<PathBuf> {
    let backup = backup_path(path, &chrono::Local::now().format("%Y%m%d-%H%M%S").to_string());
    match fs::copy(path, &backup) {
        Ok(_) => {
            tracing::debug!("backed up {} to {}", path.display(), backup.display());
            Some(backup)
        }
        Err(e) => {
            tracing::warn!("could not back up {}: {}", path.display(), e);
            None
        }
    }
}

fn backup_path(path: &Path, stamp: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    path.with_file_name(format!("{file_name}_{stamp}{ext}"))
}

/// Back up `path`, then replace its content with the evaluated content
pub fn expand_in_place(evaluator: &Evaluator, path: &Path) -> Result<()> {
    let content = fs::read_to_string(path).map_err(|e| ComposeError::io(path, e))?;
    backup_file(path);

    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let expanded = evaluator.evaluate_named(&name, &content)?;

    fs::write(path, expanded).map_err(|e| ComposeError::io(path, e))?;
    tracing::debug!("expanded templates in {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::evaluator;

    #[test]
    fn test_backup_path() {
        assert_eq!(
            backup_path(Path::new("/tree/kustomization.yaml"), "20240131-235959"),
            PathBuf::from("/tree/kustomization.yaml_20240131-235959.yaml")
        );
        assert_eq!(
            backup_path(Path::new("/tree/kustomization"), "20240131-235959"),
            PathBuf::from("/tree/kustomization_20240131-235959")
        );
    }

    #[test]
    fn test_expand_in_place_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cm.yaml");
        fs::write(&path, "name: {{ upper(\"app\") }}\n").unwrap();

        expand_in_place(&evaluator(dir.path()), &path).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "name: APP\n");
        let backups: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("cm.yaml_"))
            .collect();
        assert_eq!(backups.len(), 1);
        assert!(backups[0].ends_with(".yaml"));
        assert_eq!(
            fs::read_to_string(dir.path().join(&backups[0])).unwrap(),
            "name: {{ upper(\"app\") }}\n"
        );
    }

    #[test]
    fn test_expand_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = expand_in_place(&evaluator(dir.path()), &dir.path().join("nope.yaml"))
            .unwrap_err();
        assert!(err.to_string().contains("nope.yaml"));
    }
}
