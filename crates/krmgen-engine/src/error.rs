//! Engine error types with beautiful formatting

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::suggestions::{extract_function_name, suggest_unknown_function};

/// Main engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by template functions that look things up outside the template
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("wrong arguments count for function {function:?}: expected {expected} arguments but got {got}")]
    WrongArgumentCount {
        function: String,
        expected: &'static str,
        got: usize,
    },

    #[error("env value {key} not found in env and default value not provided")]
    EnvNotFound { key: String },

    #[error("given filepath {path} is not relative (local) path")]
    NotLocalPath { path: String },

    #[error("reading file {path} failed: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("authentication failed: {message}")]
    Auth { message: String },

    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("request to {url} returned {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("invalid {what}: {message}")]
    Decode { what: &'static str, message: String },

    #[error("none KEY block found in PFX bundle {name}")]
    NoKeyBlock { name: String },

    #[error("none CERTIFICATE block found in PFX bundle {name}")]
    NoCertificateBlock { name: String },

    #[error("key type {kty} of key {name} is not supported")]
    UnsupportedKeyType { name: String, kty: String },

    #[error("storage account {account} has no access keys")]
    NoStorageKeys { account: String },
}

impl ProviderError {
    pub fn decode(what: &'static str, message: impl ToString) -> Self {
        Self::Decode {
            what,
            message: message.to_string(),
        }
    }
}

impl From<ProviderError> for minijinja::Error {
    fn from(err: ProviderError) -> Self {
        minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, err.to_string())
            .with_source(err)
    }
}

/// Error kind for categorizing template errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    UndefinedVariable,
    UnknownFilter,
    UnknownFunction,
    SyntaxError,
    TypeError,
    InvalidOperation,
    Other,
}

impl TemplateErrorKind {
    /// Convert to a code string for diagnostics
    pub fn to_code_string(&self) -> &'static str {
        match self {
            Self::UndefinedVariable => "undefined_variable",
            Self::UnknownFilter => "unknown_filter",
            Self::UnknownFunction => "unknown_function",
            Self::SyntaxError => "syntax",
            Self::TypeError => "type",
            Self::InvalidOperation => "invalid_operation",
            Self::Other => "render",
        }
    }
}

/// Template-specific error with source information
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(krmgen::template::evaluate))]
pub struct TemplateError {
    /// Error message
    pub message: String,

    /// Error kind for categorization
    pub kind: TemplateErrorKind,

    /// Template source code
    #[source_code]
    pub src: NamedSource<String>,

    /// Error location in source
    #[label("error occurred here")]
    pub span: Option<SourceSpan>,

    /// Suggestion for fixing the error
    #[help]
    pub suggestion: Option<String>,
}

impl TemplateError {
    /// Create a new template error from a MiniJinja error.
    ///
    /// `known_functions` feeds the "did you mean" help for unknown functions.
    pub fn from_minijinja(
        err: minijinja::Error,
        template_name: &str,
        template_source: &str,
        known_functions: &[&str],
    ) -> Self {
        let (kind, message) = categorize_minijinja_error(&err);
        let span = err
            .line()
            .and_then(|line_num| calculate_span(template_source, line_num));

        let suggestion = match kind {
            TemplateErrorKind::UnknownFunction => extract_function_name(&err.to_string())
                .and_then(|name| suggest_unknown_function(&name, known_functions)),
            _ => None,
        };

        Self {
            message,
            kind,
            src: NamedSource::new(template_name, template_source.to_string()),
            span,
            suggestion,
        }
    }

    /// Get the error kind
    pub fn kind(&self) -> TemplateErrorKind {
        self.kind
    }
}

/// Categorize a MiniJinja error into our error kinds
fn categorize_minijinja_error(err: &minijinja::Error) -> (TemplateErrorKind, String) {
    let kind = match err.kind() {
        minijinja::ErrorKind::UndefinedError => TemplateErrorKind::UndefinedVariable,
        minijinja::ErrorKind::UnknownFilter => TemplateErrorKind::UnknownFilter,
        minijinja::ErrorKind::UnknownFunction => TemplateErrorKind::UnknownFunction,
        minijinja::ErrorKind::SyntaxError => TemplateErrorKind::SyntaxError,
        minijinja::ErrorKind::InvalidOperation => TemplateErrorKind::InvalidOperation,
        minijinja::ErrorKind::NonPrimitive | minijinja::ErrorKind::NonKey => {
            TemplateErrorKind::TypeError
        }
        _ => TemplateErrorKind::Other,
    };

    let message = err
        .to_string()
        .replace("invalid operation: ", "")
        .replace("syntax error: ", "")
        .replace("undefined value", "undefined variable");

    (kind, message)
}

/// Calculate the source span for a given line number
fn calculate_span(source: &str, line_num: usize) -> Option<SourceSpan> {
    let mut offset = 0;

    for (index, line) in source.lines().enumerate() {
        if index + 1 == line_num {
            return Some(SourceSpan::new(offset.into(), line.len()));
        }
        offset += line.len() + 1;
    }

    None
}
