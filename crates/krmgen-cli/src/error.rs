//! CLI error types with exit code handling
//!
//! This module provides a unified error type for CLI operations that
//! maps errors to appropriate exit codes.

use miette::Diagnostic;
use thiserror::Error;

use krmgen_compose::ComposeError;
use krmgen_core::CoreError;
use krmgen_engine::{EngineError, ProviderError, TemplateError};

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Template evaluation failed, keeps the source span of the template
    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(TemplateError),

    /// Config document, kustomization or chart source is invalid
    #[error("Configuration error: {message}")]
    #[diagnostic(code(krmgen::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// helm or kubectl could not be run or failed
    #[error("Tool error: {message}")]
    #[diagnostic(code(krmgen::cli::tool))]
    Tool {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(krmgen::cli::io))]
    Io { message: String },

    /// Anything else
    #[error("{message}")]
    #[diagnostic(code(krmgen::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Template(_) => exit_codes::TEMPLATE_ERROR,
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Tool { .. } => exit_codes::TOOL_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    pub fn config(message: impl ToString, help: Option<&str>) -> Self {
        Self::Config {
            message: message.to_string(),
            help: help.map(str::to_string),
        }
    }

    pub fn tool(message: impl ToString, help: Option<&str>) -> Self {
        Self::Tool {
            message: message.to_string(),
            help: help.map(str::to_string),
        }
    }

    pub fn io(message: impl ToString) -> Self {
        Self::Io {
            message: message.to_string(),
        }
    }

    pub fn other(message: impl ToString) -> Self {
        Self::Other {
            message: message.to_string(),
        }
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Template(e) => CliError::Template(e),
        }
    }
}

impl From<ProviderError> for CliError {
    fn from(err: ProviderError) -> Self {
        CliError::other(err)
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConfigParse { .. } => CliError::config(
                err,
                Some(
                    "directives inside YAML values must be quoted, \
                     e.g. name: '{{ kubeEnv(\"NAME\") }}'",
                ),
            ),
            CoreError::Io(_) | CoreError::Copy { .. } => CliError::io(err),
        }
    }
}

impl From<ComposeError> for CliError {
    fn from(err: ComposeError) -> Self {
        match err {
            ComposeError::Engine(e) => e.into(),
            ComposeError::Core(e) => e.into(),
            ComposeError::UnsupportedRepository { .. } => CliError::config(
                err,
                Some("use an oci:// registry or an http(s) chart repository"),
            ),
            ComposeError::MultipleKustomizations { .. } => CliError::config(
                err,
                Some("keep a single kustomization file in the source directory"),
            ),
            ComposeError::InvalidListField { .. }
            | ComposeError::InvalidDescriptor { .. }
            | ComposeError::DescriptorParse { .. } => CliError::config(err, None),
            ComposeError::ToolSpawn { .. } => CliError::tool(
                err,
                Some("install it or point --helm-executable / --kubectl-executable at it"),
            ),
            ComposeError::ToolFailed { .. } => CliError::tool(err, None),
            ComposeError::Io { .. } => CliError::io(err),
            ComposeError::Yaml(_) => CliError::other(err),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let unsupported: CliError = ComposeError::UnsupportedRepository {
            url: "ftp://x".to_string(),
        }
        .into();
        assert_eq!(unsupported.exit_code(), exit_codes::CONFIG_ERROR);

        let failed: CliError = ComposeError::ToolFailed {
            program: "helm".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "no chart".to_string(),
        }
        .into();
        assert_eq!(failed.exit_code(), exit_codes::TOOL_ERROR);
        assert!(failed.to_string().contains("no chart"));

        let missing: CliError = ProviderError::EnvNotFound {
            key: "KUBE_NS".to_string(),
        }
        .into();
        assert_eq!(missing.exit_code(), exit_codes::ERROR);
    }
}
