//! Environment lookups scoped to Argo CD plugin variables

use krmgen_core::EnvLookup;

use super::key_and_fallback;
use crate::error::ProviderError;

pub const ARGOCD_ENV_FUNCTION: &str = "argocdEnv";
pub const KUBE_ENV_FUNCTION: &str = "kubeEnv";

/// Prefix of variables set on the Argo CD application plugin
pub const ARGOCD_ENV_PREFIX: &str = "ARGOCD_ENV_";
/// Prefix of the build environment Argo CD provides to plugins
pub const ARGOCD_APP_PREFIX: &str = "ARGOCD_APP_";
pub const KUBE_PREFIX: &str = "KUBE_";

/// `argocdEnv(key[, fallback])`
pub fn argocd_env(env: &dyn EnvLookup, args: &[String]) -> Result<String, ProviderError> {
    let (key, fallback) = key_and_fallback(ARGOCD_ENV_FUNCTION, args)?;
    let app_key = format!("{}{}", ARGOCD_APP_PREFIX, key);

    env.var(&format!("{}{}", ARGOCD_ENV_PREFIX, key))
        .or_else(|| env.var(&app_key))
        .or_else(|| fallback.map(str::to_string))
        .ok_or(ProviderError::EnvNotFound { key: app_key })
}

/// `kubeEnv(key[, fallback])`
pub fn kube_env(env: &dyn EnvLookup, args: &[String]) -> Result<String, ProviderError> {
    let (key, fallback) = key_and_fallback(KUBE_ENV_FUNCTION, args)?;
    let kube_key = format!("{}{}", KUBE_PREFIX, key);

    env.var(&kube_key)
        .or_else(|| fallback.map(str::to_string))
        .ok_or(ProviderError::EnvNotFound { key: kube_key })
}
