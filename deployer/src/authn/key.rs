//! API key used to sign control plane requests

use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD, Engine};
use p256::pkcs8::{DecodePrivateKey, EncodePublicKey, LineEnding};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use crate::errors::DeployError;
use crate::filesys::file::File;

/// Where to read the API key from
#[derive(Debug)]
pub enum KeySource {
    /// PEM text supplied directly, e.g. from an environment variable
    Content(SecretString),

    /// Path to a PEM file
    Path(PathBuf),
}

/// Elliptic curve private key for request signing.
///
/// Signatures are always ECDSA over SHA-256, whatever the curve.
#[derive(Clone)]
pub enum ApiKey {
    P256(p256::ecdsa::SigningKey),
    P384(p384::ecdsa::SigningKey),
}

impl ApiKey {
    /// Load a key from content or a file
    pub async fn load(source: KeySource) -> Result<Self, DeployError> {
        match source {
            KeySource::Content(content) => Self::from_pem(content.expose_secret()),
            KeySource::Path(path) => {
                let file = File::new(&path);
                let content = file.read_string().await.map_err(|e| {
                    DeployError::InvalidKey(format!("Unable to read {}: {}", path.display(), e))
                })?;
                Self::from_pem(&content)
            }
        }
    }

    /// Parse a PKCS#8 or SEC1 PEM encoded EC private key
    pub fn from_pem(pem: &str) -> Result<Self, DeployError> {
        let pem = pem.trim();
        if pem.is_empty() {
            return Err(DeployError::InvalidKey("No key material provided".to_string()));
        }

        if let Ok(key) = p256::SecretKey::from_pkcs8_pem(pem) {
            return Ok(ApiKey::P256(key.into()));
        }
        if let Ok(key) = p384::SecretKey::from_pkcs8_pem(pem) {
            return Ok(ApiKey::P384(key.into()));
        }
        if let Ok(key) = p256::SecretKey::from_sec1_pem(pem) {
            return Ok(ApiKey::P256(key.into()));
        }
        if let Ok(key) = p384::SecretKey::from_sec1_pem(pem) {
            return Ok(ApiKey::P384(key.into()));
        }

        Err(DeployError::InvalidKey(
            "Key must be a PEM encoded elliptic curve private key".to_string(),
        ))
    }

    /// PEM encoded SubjectPublicKeyInfo
    pub fn public_key_pem(&self) -> Result<String, DeployError> {
        let pem = match self {
            ApiKey::P256(key) => key.verifying_key().to_public_key_pem(LineEnding::LF),
            ApiKey::P384(key) => key.verifying_key().to_public_key_pem(LineEnding::LF),
        };
        pem.map_err(|e| DeployError::InvalidKey(format!("Unable to encode public key: {}", e)))
    }

    /// Base64 of the PEM public key, sent verbatim as `X-Key`
    pub fn public_key_encoded(&self) -> Result<String, DeployError> {
        Ok(STANDARD.encode(self.public_key_pem()?))
    }

    /// DER encoded ECDSA/SHA-256 signature over `message`
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, DeployError> {
        match self {
            ApiKey::P256(key) => {
                use p256::ecdsa::{signature::Signer, Signature};
                let signature: Signature = key.sign(message);
                Ok(signature.to_der().as_bytes().to_vec())
            }
            ApiKey::P384(key) => {
                use p384::ecdsa::{signature::hazmat::PrehashSigner, Signature};
                let digest = Sha256::digest(message);
                let signature: Signature = key
                    .sign_prehash(&digest)
                    .map_err(|e| DeployError::InvalidKey(format!("Signing failed: {}", e)))?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
        }
    }

    /// Check a DER signature produced by [`ApiKey::sign`]
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        match self {
            ApiKey::P256(key) => {
                use p256::ecdsa::{signature::Verifier, Signature};
                Signature::from_der(signature)
                    .map(|sig| key.verifying_key().verify(message, &sig).is_ok())
                    .unwrap_or(false)
            }
            ApiKey::P384(key) => {
                use p384::ecdsa::{signature::hazmat::PrehashVerifier, Signature};
                let digest = Sha256::digest(message);
                Signature::from_der(signature)
                    .map(|sig| key.verifying_key().verify_prehash(&digest, &sig).is_ok())
                    .unwrap_or(false)
            }
        }
    }

    /// Curve name, for logging
    pub fn curve(&self) -> &'static str {
        match self {
            ApiKey::P256(_) => "P-256",
            ApiKey::P384(_) => "P-384",
        }
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKey").field("curve", &self.curve()).finish_non_exhaustive()
    }
}
