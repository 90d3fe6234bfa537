//! Configuration document model
//!
//! A directory handed to krmgen may contain any number of YAML files; only
//! those whose top-level `kind` is exactly [`CONFIG_KIND`] are configuration
//! documents. Everything else (Kustomize files, plain manifests, values files)
//! is treated as ordinary content of the working tree.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{CoreError, Result};

/// The `kind` value that marks a file as a krmgen configuration document
pub const CONFIG_KIND: &str = "KrmGen";

/// A krmgen configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
    /// API version (krmgen.config.librucha.com/v1alpha1)
    #[serde(default)]
    pub api_version: String,

    /// Always `KrmGen` for documents that reach this type
    #[serde(default)]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    /// Helm charts to render
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm: Option<HelmSpec>,

    /// Optional pointer to the overlay source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kustomize: Option<KustomizeRef>,
}

impl ConfigDocument {
    /// Returns true if at least one Helm chart is declared
    pub fn has_helm(&self) -> bool {
        self.charts().is_some_and(|charts| !charts.is_empty())
    }

    /// Declared charts in declaration order
    pub fn charts(&self) -> Option<&[HelmChartSpec]> {
        self.helm.as_ref()?.charts.as_deref()
    }
}

/// Labels and annotations attached to the document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// The `helm` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HelmSpec {
    #[serde(default)]
    pub charts: Option<Vec<HelmChartSpec>>,
}

/// A single chart to render with `helm template`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmChartSpec {
    /// Chart name
    #[serde(default)]
    pub name: String,

    /// Chart repository (`oci://...` or `https://...`)
    #[serde(default, rename = "repo")]
    pub repo_url: String,

    /// Never pass credentials, not even the ones from the environment
    #[serde(default)]
    pub ignore_credentials: bool,

    #[serde(default, rename = "repoUser")]
    pub username: String,

    #[serde(default, rename = "repoPassword")]
    pub password: String,

    #[serde(default)]
    pub release_name: String,

    /// Chart version, latest if empty
    #[serde(default)]
    pub version: String,

    /// Values written to a temporary values file
    #[serde(default)]
    pub values_inline: serde_yaml::Mapping,

    /// Values file relative to the working tree
    #[serde(default)]
    pub values_file: String,
}

/// Pointer to the Kustomize overlay
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KustomizeRef {
    #[serde(default)]
    pub path: Option<String>,
}

/// Check whether a file is a krmgen configuration document.
///
/// Never fails: unreadable files, directories, invalid YAML and documents
/// that are not mappings all count as "not a config document".
pub fn is_config_document(path: &Path) -> bool {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::debug!("skipping {}: {}", path.display(), e);
            return false;
        }
    };

    match serde_yaml::from_str::<serde_yaml::Value>(&content) {
        Ok(doc) => doc
            .as_mapping()
            .and_then(|map| map.get("kind"))
            .and_then(serde_yaml::Value::as_str)
            .is_some_and(|kind| kind == CONFIG_KIND),
        Err(e) => {
            tracing::debug!("skipping {}: not a YAML mapping ({})", path.display(), e);
            false
        }
    }
}

/// Decode a config document read from `path`, wrapping parse failures with the path
pub fn parse_config(path: &Path, content: &str) -> Result<ConfigDocument> {
    serde_yaml::from_str(content).map_err(|source| CoreError::ConfigParse {
        path: path.display().to_string(),
        source,
    })
}
