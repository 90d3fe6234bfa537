//! Azure Key Vault and Storage backend
//!
//! Talks to the Key Vault data plane and the Resource Manager REST APIs with
//! a blocking HTTP client. Access tokens come from a service principal when
//! `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and `AZURE_CLIENT_SECRET` are set,
//! and from the instance metadata (managed identity) endpoint otherwise.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use krmgen_core::EnvLookup;
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{
    CertificateBundle, KeyBundle, KeyVault, SecretBundle, StorageAccounts, StorageKey,
    VaultConnector, default_vault_url, lock,
};
use crate::error::ProviderError;

type Result<T> = std::result::Result<T, ProviderError>;

pub const AZURE_TENANT_ID: &str = "AZURE_TENANT_ID";
pub const AZURE_CLIENT_ID: &str = "AZURE_CLIENT_ID";
pub const AZURE_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";
pub const AZURE_AUTHORITY_HOST: &str = "AZURE_AUTHORITY_HOST";

const KEY_VAULT_API_VERSION: &str = "7.4";
const STORAGE_API_VERSION: &str = "2023-01-01";
const IMDS_API_VERSION: &str = "2018-02-01";

const KEY_VAULT_RESOURCE: &str = "https://vault.azure.net";
const MANAGEMENT_RESOURCE: &str = "https://management.azure.com";

/// Service endpoints, overridable for sovereign clouds and tests
#[derive(Debug, Clone)]
pub struct AzureEndpoints {
    pub authority: String,
    pub managed_identity: String,
    pub management: String,
    /// Fixed vault URL used for every vault name
    pub vault: Option<String>,
}

impl Default for AzureEndpoints {
    fn default() -> Self {
        Self {
            authority: "https://login.microsoftonline.com".to_string(),
            managed_identity: "http://169.254.169.254/metadata/identity/oauth2/token".to_string(),
            management: MANAGEMENT_RESOURCE.to_string(),
            vault: None,
        }
    }
}

#[derive(Debug, Clone)]
enum Credential {
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
    ManagedIdentity {
        client_id: Option<String>,
    },
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct StorageKeyList {
    #[serde(default)]
    keys: Vec<StorageKey>,
}

/// Bearer tokens per resource, fetched on first use
struct TokenSource {
    http: Client,
    credential: Credential,
    authority: String,
    managed_identity: String,
    tokens: Mutex<HashMap<String, String>>,
}

impl TokenSource {
    fn token(&self, resource: &str) -> Result<String> {
        if let Some(token) = lock(&self.tokens).get(resource).cloned() {
            return Ok(token);
        }

        let request = match &self.credential {
            Credential::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            } => {
                let url = format!(
                    "{}/{}/oauth2/v2.0/token",
                    self.authority.trim_end_matches('/'),
                    tenant_id
                );
                let scope = format!("{}/.default", resource);
                self.http.post(url).form(&[
                    ("grant_type", "client_credentials"),
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.as_str()),
                    ("scope", scope.as_str()),
                ])
            }
            Credential::ManagedIdentity { client_id } => {
                let mut query = vec![("api-version", IMDS_API_VERSION), ("resource", resource)];
                if let Some(id) = client_id {
                    query.push(("client_id", id.as_str()));
                }
                self.http
                    .get(&self.managed_identity)
                    .header("Metadata", "true")
                    .query(&query)
            }
        };

        let response: TokenResponse = send(request, "token endpoint").map_err(|e| {
            ProviderError::Auth {
                message: e.to_string(),
            }
        })?;
        tracing::debug!("acquired access token for {}", resource);

        lock(&self.tokens).insert(resource.to_string(), response.access_token.clone());
        Ok(response.access_token)
    }
}

/// Send a request and decode the JSON answer
fn send<T: DeserializeOwned>(request: RequestBuilder, target: &str) -> Result<T> {
    let response = request.send().map_err(|e| ProviderError::Request {
        url: e.url().map_or_else(|| target.to_string(), ToString::to_string),
        message: e.to_string(),
    })?;

    let status = response.status();
    let url = response.url().to_string();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(ProviderError::Status {
            url,
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .map_err(|e| ProviderError::decode("response", format!("{}: {}", url, e)))
}

/// Production [`VaultConnector`]
pub struct AzureConnector {
    http: Client,
    tokens: Arc<TokenSource>,
    endpoints: AzureEndpoints,
}

impl AzureConnector {
    /// Connector for the public cloud, configured from the environment
    pub fn from_env(env: &dyn EnvLookup) -> Result<Self> {
        let mut endpoints = AzureEndpoints::default();
        if let Some(authority) = env.non_empty(AZURE_AUTHORITY_HOST) {
            endpoints.authority = authority;
        }
        Self::with_endpoints(env, endpoints)
    }

    pub fn with_endpoints(env: &dyn EnvLookup, endpoints: AzureEndpoints) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::Request {
                url: endpoints.management.clone(),
                message: e.to_string(),
            })?;

        let credential = match (
            env.non_empty(AZURE_TENANT_ID),
            env.non_empty(AZURE_CLIENT_ID),
            env.non_empty(AZURE_CLIENT_SECRET),
        ) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => Credential::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            },
            (_, client_id, _) => Credential::ManagedIdentity { client_id },
        };

        let tokens = Arc::new(TokenSource {
            http: http.clone(),
            credential,
            authority: endpoints.authority.clone(),
            managed_identity: endpoints.managed_identity.clone(),
            tokens: Mutex::default(),
        });

        Ok(Self {
            http,
            tokens,
            endpoints,
        })
    }
}

impl VaultConnector for AzureConnector {
    fn vault_url(&self, vault_name: &str) -> String {
        match &self.endpoints.vault {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => default_vault_url(vault_name),
        }
    }

    fn key_vault(&self, vault_url: &str) -> Result<Arc<dyn KeyVault>> {
        Ok(Arc::new(RestKeyVault {
            base: vault_url.trim_end_matches('/').to_string(),
            http: self.http.clone(),
            tokens: Arc::clone(&self.tokens),
        }))
    }

    fn storage_accounts(&self, subscription: &str) -> Result<Arc<dyn StorageAccounts>> {
        Ok(Arc::new(RestStorageAccounts {
            base: format!(
                "{}/subscriptions/{}",
                self.endpoints.management.trim_end_matches('/'),
                subscription
            ),
            http: self.http.clone(),
            tokens: Arc::clone(&self.tokens),
        }))
    }
}

struct RestKeyVault {
    base: String,
    http: Client,
    tokens: Arc<TokenSource>,
}

impl RestKeyVault {
    fn get<T: DeserializeOwned>(&self, collection: &str, name: &str, version: &str) -> Result<T> {
        let url = if version.is_empty() {
            format!("{}/{}/{}", self.base, collection, name)
        } else {
            format!("{}/{}/{}/{}", self.base, collection, name, version)
        };
        let token = self.tokens.token(KEY_VAULT_RESOURCE)?;
        let request = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("api-version", KEY_VAULT_API_VERSION)]);
        send(request, &url)
    }
}

impl KeyVault for RestKeyVault {
    fn get_secret(&self, name: &str, version: &str) -> Result<SecretBundle> {
        self.get("secrets", name, version)
    }

    fn get_key(&self, name: &str, version: &str) -> Result<KeyBundle> {
        self.get("keys", name, version)
    }

    fn get_certificate(&self, name: &str, version: &str) -> Result<CertificateBundle> {
        self.get("certificates", name, version)
    }
}

struct RestStorageAccounts {
    base: String,
    http: Client,
    tokens: Arc<TokenSource>,
}

impl StorageAccounts for RestStorageAccounts {
    fn list_keys(&self, resource_group: &str, account: &str) -> Result<Vec<StorageKey>> {
        let url = format!(
            "{}/resourceGroups/{}/providers/Microsoft.Storage/storageAccounts/{}/listKeys",
            self.base, resource_group, account
        );
        let token = self.tokens.token(MANAGEMENT_RESOURCE)?;
        let request = self
            .http
            .post(&url)
            .bearer_auth(token)
            .query(&[("api-version", STORAGE_API_VERSION)])
            .body("");
        let list: StorageKeyList = send(request, &url)?;
        Ok(list.keys)
    }
}
