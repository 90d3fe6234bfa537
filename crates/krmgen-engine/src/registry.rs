//! The function table templates can call
//!
//! Names registered here are the public surface template authors write
//! against. Renaming one breaks every template that uses it.

use std::collections::BTreeMap;

use minijinja::value::Rest;
use minijinja::{Environment, Value};

use crate::error::ProviderError;
use crate::functions;
use crate::providers::env::{ARGOCD_ENV_FUNCTION, KUBE_ENV_FUNCTION, argocd_env, kube_env};
use crate::providers::files::{READ_FILE_FUNCTION, read_file};
use crate::providers::krmgen::{GENERATED_FUNCTION, VERSION_FUNCTION, generated, version};
use crate::providers::vault::SecretStore;
use crate::providers::{ProviderContext, name_and_version};

/// Baseline helpers templates may call
pub const BASELINE_FUNCTIONS: [&str; 34] = [
    "print",
    "printf",
    "upper",
    "lower",
    "title",
    "trim",
    "trimPrefix",
    "trimSuffix",
    "replace",
    "contains",
    "hasPrefix",
    "hasSuffix",
    "quote",
    "squote",
    "indent",
    "nindent",
    "trunc",
    "b64enc",
    "b64dec",
    "sha256sum",
    "toYaml",
    "toJson",
    "default",
    "empty",
    "coalesce",
    "ternary",
    "required",
    "fail",
    "list",
    "dict",
    "join",
    "splitList",
    "semverCompare",
    "now",
];

/// Helper names templates must never reach, they would expose the whole
/// process environment
pub const REMOVED_FUNCTIONS: [&str; 2] = ["env", "expandenv"];

pub const AZ_SECRET_FUNCTION: &str = "azSec";
pub const AZ_CERTIFICATE_FUNCTION: &str = "azCert";
pub const AZ_KEY_FUNCTION: &str = "azKey";
pub const AZ_PFX_KEY_FUNCTION: &str = "azPfxKey";
pub const AZ_PFX_CERTIFICATE_FUNCTION: &str = "azPfxCrt";
pub const AZ_STORAGE_KEY_FUNCTION: &str = "azStoreKey";

type VaultLookup = fn(&SecretStore, &str, &str, &str) -> Result<String, ProviderError>;

/// Immutable name to callable table
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    functions: BTreeMap<&'static str, Value>,
}

impl FunctionRegistry {
    /// Assemble the table for one provider context.
    ///
    /// Only closures are created; nothing is looked up until a template
    /// calls a function.
    pub fn build(ctx: &ProviderContext) -> Self {
        let mut functions: BTreeMap<&'static str, Value> = functions::baseline()
            .into_iter()
            .filter(|(name, _)| BASELINE_FUNCTIONS.contains(name))
            .collect();

        let vault_functions: [(&'static str, VaultLookup); 5] = [
            (AZ_SECRET_FUNCTION, SecretStore::secret),
            (AZ_CERTIFICATE_FUNCTION, SecretStore::certificate),
            (AZ_KEY_FUNCTION, SecretStore::key),
            (AZ_PFX_KEY_FUNCTION, SecretStore::pfx_private_key),
            (AZ_PFX_CERTIFICATE_FUNCTION, SecretStore::pfx_certificates),
        ];
        for (name, lookup) in vault_functions {
            let ctx = ctx.clone();
            functions.insert(
                name,
                provider(move |args| {
                    let (vault, rest) = args.split_first().ok_or_else(|| {
                        ProviderError::WrongArgumentCount {
                            function: name.to_string(),
                            expected: "1 or 2",
                            got: 0,
                        }
                    })?;
                    let (secret, version) = name_and_version(name, rest)?;
                    lookup(ctx.store(), vault, secret, version)
                }),
            );
        }

        let store_ctx = ctx.clone();
        functions.insert(
            AZ_STORAGE_KEY_FUNCTION,
            provider(move |args| match args {
                [subscription, group, account] => {
                    store_ctx.store().storage_key(subscription, group, account)
                }
                _ => Err(ProviderError::WrongArgumentCount {
                    function: AZ_STORAGE_KEY_FUNCTION.to_string(),
                    expected: "3",
                    got: args.len(),
                }),
            }),
        );

        let env_ctx = ctx.clone();
        functions.insert(
            ARGOCD_ENV_FUNCTION,
            provider(move |args| argocd_env(env_ctx.env(), args)),
        );
        let env_ctx = ctx.clone();
        functions.insert(
            KUBE_ENV_FUNCTION,
            provider(move |args| kube_env(env_ctx.env(), args)),
        );
        let file_ctx = ctx.clone();
        functions.insert(
            READ_FILE_FUNCTION,
            provider(move |args| read_file(file_ctx.root(), args)),
        );

        functions.insert(VERSION_FUNCTION, Value::from_function(version));
        functions.insert(GENERATED_FUNCTION, Value::from_function(generated));

        Self { functions }
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        self.functions.keys().copied().collect()
    }

    /// Make every function callable from templates of `env`
    pub fn install(&self, env: &mut Environment<'_>) {
        for (name, function) in &self.functions {
            env.add_global(*name, function.clone());
        }
    }
}

/// Wrap a provider taking string arguments into a template callable
fn provider<F>(resolve: F) -> Value
where
    F: Fn(&[String]) -> Result<String, ProviderError> + Send + Sync + 'static,
{
    Value::from_function(move |args: Rest<String>| -> Result<String, minijinja::Error> {
        resolve(&args).map_err(Into::into)
    })
}
