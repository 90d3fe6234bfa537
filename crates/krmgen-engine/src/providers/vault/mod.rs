//! Secret-vault lookups
//!
//! [`SecretStore`] sits between the template functions and a vault backend.
//! Clients are created lazily, once per vault name (or subscription for
//! storage accounts), and every fetched bundle is kept for the lifetime of
//! the store. Repeating a lookup inside one generation run never reaches the
//! backend twice.

pub mod azure;
pub mod pfx;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use once_cell::sync::Lazy;
use regex::Regex;
use rsa::pkcs8::EncodePublicKey;
use rsa::{BigUint, RsaPublicKey};
use serde::Deserialize;
use x509_cert::Certificate;
use x509_cert::der::{Decode, EncodePem, pem::LineEnding};

use crate::error::ProviderError;

pub use azure::{AzureConnector, AzureEndpoints};

type Result<T> = std::result::Result<T, ProviderError>;

static OBJECT_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\w+://[^/]+)/(?:secrets|keys|certificates)/([^/]+)/([^/]*)$").unwrap()
});

/// Public URL of a Key Vault instance
pub fn default_vault_url(vault_name: &str) -> String {
    format!("https://{}.vault.azure.net", vault_name)
}

/// A secret as returned by the vault
#[derive(Debug, Clone, Deserialize)]
pub struct SecretBundle {
    pub id: String,
    pub value: String,
}

/// JSON web key material of a vault key
#[derive(Debug, Clone, Deserialize)]
pub struct JsonWebKey {
    pub kid: String,
    pub kty: String,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyBundle {
    pub key: JsonWebKey,
}

/// A certificate with its DER encoding in base64 (`cer`)
#[derive(Debug, Clone, Deserialize)]
pub struct CertificateBundle {
    pub id: String,
    pub cer: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageKey {
    pub key_name: String,
    pub value: String,
}

/// Identifier the backend reports for a fetched bundle
trait Identified {
    fn id(&self) -> &str;
}

impl Identified for SecretBundle {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for KeyBundle {
    fn id(&self) -> &str {
        &self.key.kid
    }
}

impl Identified for CertificateBundle {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Client for one vault instance. An empty `version` means the latest one.
pub trait KeyVault: Send + Sync {
    fn get_secret(&self, name: &str, version: &str) -> Result<SecretBundle>;
    fn get_key(&self, name: &str, version: &str) -> Result<KeyBundle>;
    fn get_certificate(&self, name: &str, version: &str) -> Result<CertificateBundle>;
}

/// Storage-account management client bound to one subscription
pub trait StorageAccounts: Send + Sync {
    fn list_keys(&self, resource_group: &str, account: &str) -> Result<Vec<StorageKey>>;
}

/// Creates backend clients
pub trait VaultConnector: Send + Sync {
    fn vault_url(&self, vault_name: &str) -> String {
        default_vault_url(vault_name)
    }

    fn key_vault(&self, vault_url: &str) -> Result<Arc<dyn KeyVault>>;

    fn storage_accounts(&self, subscription: &str) -> Result<Arc<dyn StorageAccounts>>;
}

/// Memoizing front of a [`VaultConnector`]
pub struct SecretStore {
    connector: Arc<dyn VaultConnector>,
    vaults: Mutex<HashMap<String, Arc<dyn KeyVault>>>,
    subscriptions: Mutex<HashMap<String, Arc<dyn StorageAccounts>>>,
    secrets: Mutex<HashMap<String, SecretBundle>>,
    keys: Mutex<HashMap<String, KeyBundle>>,
    certificates: Mutex<HashMap<String, CertificateBundle>>,
    storage_keys: Mutex<HashMap<String, StorageKey>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cache key of a vault object
pub fn bundle_key(vault_url: &str, name: &str, version: &str) -> String {
    format!("{}/{}/{}", vault_url, name, version)
}

/// Cache key of an object identifier such as
/// `https://unit.vault.azure.net/secrets/db/0a1b2c`
fn reported_key(id: &str) -> String {
    match OBJECT_ID.captures(id) {
        Some(caps) => bundle_key(&caps[1], &caps[2], &caps[3]),
        None => id.to_string(),
    }
}

impl SecretStore {
    pub fn new(connector: Arc<dyn VaultConnector>) -> Self {
        Self {
            connector,
            vaults: Mutex::default(),
            subscriptions: Mutex::default(),
            secrets: Mutex::default(),
            keys: Mutex::default(),
            certificates: Mutex::default(),
            storage_keys: Mutex::default(),
        }
    }

    /// Plain secret value
    pub fn secret(&self, vault_name: &str, name: &str, version: &str) -> Result<String> {
        let bundle = self.bundle(&self.secrets, vault_name, name, version, |vault| {
            vault.get_secret(name, version)
        })?;
        Ok(bundle.value)
    }

    /// Public part of a vault key as `PUBLIC KEY` PEM
    pub fn key(&self, vault_name: &str, name: &str, version: &str) -> Result<String> {
        let bundle = self.bundle(&self.keys, vault_name, name, version, |vault| {
            vault.get_key(name, version)
        })?;
        public_key_pem(name, &bundle.key)
    }

    /// Certificate as `CERTIFICATE` PEM
    pub fn certificate(&self, vault_name: &str, name: &str, version: &str) -> Result<String> {
        let bundle = self.bundle(&self.certificates, vault_name, name, version, |vault| {
            vault.get_certificate(name, version)
        })?;
        certificate_pem(&bundle.cer)
    }

    /// Private key of a PFX bundle stored as a secret
    pub fn pfx_private_key(&self, vault_name: &str, name: &str, version: &str) -> Result<String> {
        let encoded = self.secret(vault_name, name, version)?;
        pfx::private_key_pem(name, &encoded)
    }

    /// Certificate chain of a PFX bundle stored as a secret
    pub fn pfx_certificates(&self, vault_name: &str, name: &str, version: &str) -> Result<String> {
        let encoded = self.secret(vault_name, name, version)?;
        pfx::certificate_chain_pem(name, &encoded)
    }

    /// First access key of a storage account
    pub fn storage_key(
        &self,
        subscription: &str,
        resource_group: &str,
        account: &str,
    ) -> Result<String> {
        let cache_key = format!("{}:{}:{}", subscription, resource_group, account);
        if let Some(hit) = lock(&self.storage_keys).get(&cache_key).cloned() {
            return Ok(hit.value);
        }

        let client = self.storage_client(subscription)?;
        let key = client
            .list_keys(resource_group, account)?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::NoStorageKeys {
                account: account.to_string(),
            })?;
        tracing::debug!("fetched storage key {} of {}", key.key_name, account);

        lock(&self.storage_keys).insert(cache_key, key.clone());
        Ok(key.value)
    }

    fn bundle<T, F>(
        &self,
        cache: &Mutex<HashMap<String, T>>,
        vault_name: &str,
        name: &str,
        version: &str,
        fetch: F,
    ) -> Result<T>
    where
        T: Identified + Clone,
        F: FnOnce(&dyn KeyVault) -> Result<T>,
    {
        let vault_url = self.connector.vault_url(vault_name);
        let key = bundle_key(&vault_url, name, version);
        if let Some(hit) = lock(cache).get(&key).cloned() {
            return Ok(hit);
        }

        let client = self.vault_client(vault_name, &vault_url)?;
        let bundle = fetch(client.as_ref())?;
        tracing::debug!("fetched {} from {}", bundle.id(), vault_url);

        let mut entries = lock(cache);
        entries.insert(reported_key(bundle.id()), bundle.clone());
        entries.insert(key, bundle.clone());
        Ok(bundle)
    }

    fn vault_client(&self, vault_name: &str, vault_url: &str) -> Result<Arc<dyn KeyVault>> {
        if let Some(client) = lock(&self.vaults).get(vault_name).cloned() {
            return Ok(client);
        }
        let client = self.connector.key_vault(vault_url)?;
        lock(&self.vaults).insert(vault_name.to_string(), Arc::clone(&client));
        Ok(client)
    }

    fn storage_client(&self, subscription: &str) -> Result<Arc<dyn StorageAccounts>> {
        if let Some(client) = lock(&self.subscriptions).get(subscription).cloned() {
            return Ok(client);
        }
        let client = self.connector.storage_accounts(subscription)?;
        lock(&self.subscriptions).insert(subscription.to_string(), Arc::clone(&client));
        Ok(client)
    }
}

impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretStore")
            .field("vaults", &lock(&self.vaults).len())
            .field("secrets", &lock(&self.secrets).len())
            .finish_non_exhaustive()
    }
}

/// Decode base64 in either the standard or the URL-safe unpadded alphabet
pub(crate) fn decode_base64(what: &'static str, encoded: &str) -> Result<Vec<u8>> {
    let trimmed = encoded.trim();
    STANDARD
        .decode(trimmed)
        .or_else(|_| URL_SAFE_NO_PAD.decode(trimmed.trim_end_matches('=')))
        .map_err(|e| ProviderError::decode(what, e))
}

fn certificate_pem(cer: &str) -> Result<String> {
    let der = decode_base64("certificate", cer)?;
    Certificate::from_der(&der)
        .and_then(|cert| cert.to_pem(LineEnding::LF))
        .map_err(|e| ProviderError::decode("certificate", e))
}

fn public_key_pem(name: &str, jwk: &JsonWebKey) -> Result<String> {
    let (Some(n), Some(e)) = (&jwk.n, &jwk.e) else {
        return Err(ProviderError::UnsupportedKeyType {
            name: name.to_string(),
            kty: jwk.kty.clone(),
        });
    };
    if !jwk.kty.starts_with("RSA") {
        return Err(ProviderError::UnsupportedKeyType {
            name: name.to_string(),
            kty: jwk.kty.clone(),
        });
    }

    let modulus = BigUint::from_bytes_be(&decode_base64("key modulus", n)?);
    let exponent = BigUint::from_bytes_be(&decode_base64("key exponent", e)?);
    RsaPublicKey::new(modulus, exponent)
        .map_err(|e| ProviderError::decode("RSA key", e))?
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| ProviderError::decode("RSA key", e))
}
