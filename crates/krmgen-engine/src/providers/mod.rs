//! Lookups exposed to templates
//!
//! Each provider resolves values from outside the template: environment
//! variables, files of the working tree, vault secrets and the tool itself.

pub mod env;
pub mod files;
pub mod krmgen;
pub mod vault;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use krmgen_core::{EnvLookup, ProcessEnv};

use crate::error::ProviderError;
use vault::{AzureConnector, SecretStore};

/// Everything a provider may read from
#[derive(Clone)]
pub struct ProviderContext {
    root: PathBuf,
    env: Arc<dyn EnvLookup>,
    store: Arc<SecretStore>,
}

impl ProviderContext {
    pub fn new(root: impl Into<PathBuf>, env: Arc<dyn EnvLookup>, store: Arc<SecretStore>) -> Self {
        Self {
            root: root.into(),
            env,
            store,
        }
    }

    /// Context over the process environment and the Azure backend
    pub fn from_process(root: impl Into<PathBuf>) -> Result<Self, ProviderError> {
        let connector = AzureConnector::from_env(&ProcessEnv)?;
        Ok(Self::new(
            root,
            Arc::new(ProcessEnv),
            Arc::new(SecretStore::new(Arc::new(connector))),
        ))
    }

    /// Same lookups, files resolved against another directory
    pub fn with_root(&self, root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            env: Arc::clone(&self.env),
            store: Arc::clone(&self.store),
        }
    }

    /// Directory `readF` paths are relative to
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn env(&self) -> &dyn EnvLookup {
        self.env.as_ref()
    }

    pub fn store(&self) -> &SecretStore {
        &self.store
    }
}

impl std::fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderContext")
            .field("root", &self.root)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Split `key[, fallback]` arguments
pub(crate) fn key_and_fallback<'a>(
    function: &str,
    args: &'a [String],
) -> Result<(&'a str, Option<&'a str>), ProviderError> {
    match args {
        [key] => Ok((key.as_str(), None)),
        [key, fallback] => Ok((key.as_str(), Some(fallback.as_str()))),
        _ => Err(ProviderError::WrongArgumentCount {
            function: function.to_string(),
            expected: "1 or 2",
            got: args.len(),
        }),
    }
}

/// Split `name[, version]` arguments, latest version when omitted
pub(crate) fn name_and_version<'a>(
    function: &str,
    args: &'a [String],
) -> Result<(&'a str, &'a str), ProviderError> {
    let (name, version) = key_and_fallback(function, args)?;
    Ok((name, version.unwrap_or("")))
}
