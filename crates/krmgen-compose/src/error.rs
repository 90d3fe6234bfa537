//! Error types for composition

use thiserror::Error;

use krmgen_core::CoreError;
use krmgen_engine::EngineError;

/// Composition errors
#[derive(Debug, Error)]
pub enum ComposeError {
    // ============ Configuration Errors ============
    #[error("helm repo {url} is not supported")]
    UnsupportedRepository { url: String },

    #[error("Found multiple kustomization files under {root}: {}", files.join(", "))]
    MultipleKustomizations { root: String, files: Vec<String> },

    #[error("Field {field} of {path} must be a list of strings")]
    InvalidListField { field: String, path: String },

    #[error("Kustomization {path} must be a YAML mapping")]
    InvalidDescriptor { path: String },

    #[error("Failed to parse {path}: {source}")]
    DescriptorParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    // ============ Tool Errors ============
    #[error("Failed to start {program}: {source}")]
    ToolSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} finished with {status}, error output: {stderr}")]
    ToolFailed {
        program: String,
        status: String,
        stderr: String,
    },

    // ============ Wrapped Errors ============
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ComposeError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ComposeError>;
