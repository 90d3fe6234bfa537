//! krmgen engine - template evaluation for configuration text
//!
//! This crate provides a MiniJinja-based evaluator with:
//! - A sprig flavoured helper library and filters
//! - Environment, file and secret-vault lookups callable from templates
//! - Human-readable error messages with suggestions

pub mod engine;
pub mod error;
pub mod filters;
pub mod functions;
pub mod providers;
pub mod registry;
pub mod suggestions;

pub use engine::{DEFAULT_TEMPLATE_NAME, Evaluator};
pub use error::{EngineError, ProviderError, Result, TemplateError, TemplateErrorKind};
pub use providers::ProviderContext;
pub use providers::vault::{
    AzureConnector, AzureEndpoints, KeyVault, SecretStore, StorageAccounts, VaultConnector,
};
pub use registry::{FunctionRegistry, REMOVED_FUNCTIONS};
