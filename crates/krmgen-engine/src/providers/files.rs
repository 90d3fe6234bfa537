//! Reading files of the working tree

use std::fs;
use std::path::{Component, Path};

use super::key_and_fallback;
use crate::error::ProviderError;

pub const READ_FILE_FUNCTION: &str = "readF";

/// True when `path` stays lexically inside the directory it is joined to
pub fn is_local(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

/// `readF(path[, fallback])`
///
/// The path check happens before any filesystem access, so an escaping path
/// fails even when a fallback is given. Read failures of a local path return
/// the fallback when there is one.
pub fn read_file(root: &Path, args: &[String]) -> Result<String, ProviderError> {
    let (path, fallback) = key_and_fallback(READ_FILE_FUNCTION, args)?;
    if !is_local(path) {
        return Err(ProviderError::NotLocalPath {
            path: path.to_string(),
        });
    }

    match fs::read_to_string(root.join(path)) {
        Ok(content) => Ok(content),
        Err(e) => match fallback {
            Some(fallback) => {
                tracing::debug!("reading {} failed, using fallback: {}", path, e);
                Ok(fallback.to_string())
            }
            None => Err(ProviderError::FileRead {
                path: path.to_string(),
                source: e,
            }),
        },
    }
}
