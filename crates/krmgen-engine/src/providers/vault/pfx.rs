//! PFX (PKCS#12) bundles stored as vault secrets
//!
//! Certificates imported into a vault are also exposed as a secret whose
//! value is the base64 encoded PFX with an empty password.

use p12_keystore::{KeyStore, KeyStoreEntry};
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::EncodePrivateKey;
use x509_cert::der::pem::{self, LineEnding};

use super::decode_base64;
use crate::error::ProviderError;

fn open(encoded: &str) -> Result<KeyStore, ProviderError> {
    let der = decode_base64("PFX bundle", encoded)?;
    KeyStore::from_pkcs12(&der, "").map_err(|e| ProviderError::decode("PFX bundle", e))
}

fn encode(label: &'static str, der: &[u8]) -> Result<String, ProviderError> {
    pem::encode_string(label, LineEnding::LF, der)
        .map_err(|e| ProviderError::decode("PEM block", e))
}

/// First private key of the bundle as PKCS#8 `PRIVATE KEY` PEM
///
/// PKCS#1 RSA keys are converted to PKCS#8 on the way out.
pub fn private_key_pem(name: &str, encoded: &str) -> Result<String, ProviderError> {
    let store = open(encoded)?;
    let (alias, chain) = store
        .private_key_chain()
        .ok_or_else(|| ProviderError::NoKeyBlock {
            name: name.to_string(),
        })?;
    tracing::debug!("using key {} of PFX bundle {}", alias, name);

    match RsaPrivateKey::from_pkcs1_der(chain.key()) {
        Ok(key) => {
            let document = key
                .to_pkcs8_der()
                .map_err(|e| ProviderError::decode("RSA key", e))?;
            encode("PRIVATE KEY", document.as_bytes())
        }
        Err(_) => encode("PRIVATE KEY", chain.key()),
    }
}

/// Every certificate of the bundle as `CERTIFICATE` PEM, newline separated
pub fn certificate_chain_pem(name: &str, encoded: &str) -> Result<String, ProviderError> {
    let store = open(encoded)?;
    let mut blocks = Vec::new();
    for (_, entry) in store.entries() {
        let certificates = match entry {
            KeyStoreEntry::PrivateKeyChain(chain) => chain.chain().to_vec(),
            KeyStoreEntry::Certificate(cert) => vec![cert.clone()],
        };
        for cert in certificates {
            blocks.push(encode("CERTIFICATE", cert.as_der())?);
        }
    }

    if blocks.is_empty() {
        return Err(ProviderError::NoCertificateBlock {
            name: name.to_string(),
        });
    }
    Ok(blocks.join("\n"))
}
