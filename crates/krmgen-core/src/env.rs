//! Environment variable access
//!
//! Template functions and the Helm stage read the process environment through
//! [`EnvLookup`] so that tests can hand in a fixed map instead of mutating the
//! real environment.

use std::collections::HashMap;

/// Override for the `helm` executable
pub const ENV_HELM_EXECUTABLE: &str = "KRMGEN_HELM_EXECUTABLE";

/// Fallback chart repository username
pub const ENV_HELM_USERNAME: &str = "KRMGEN_HELM_USERNAME";

/// Fallback chart repository password
pub const ENV_HELM_PASSWORD: &str = "KRMGEN_HELM_PASSWORD";

/// Override for the `kubectl` executable
pub const ENV_KUBECTL_EXECUTABLE: &str = "KRMGEN_KUBECTL_EXECUTABLE";

/// Read-only view of environment variables
pub trait EnvLookup: Send + Sync {
    /// Value of `key`, `None` if unset or not valid unicode
    fn var(&self, key: &str) -> Option<String>;

    /// Value of `key`, treating an empty value like an unset one
    fn non_empty(&self, key: &str) -> Option<String> {
        self.var(key).filter(|v| !v.is_empty())
    }
}

/// The real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// A fixed set of variables
#[derive(Debug, Clone, Default)]
pub struct MapEnv(HashMap<String, String>);

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl EnvLookup for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}
