//! Control plane request signing
//!
//! Each request carries the signer's public key and an ECDSA signature over
//! a canonical message:
//!
//! ```text
//! METHOD\nURL\nTIMESTAMP\nCONTENT_HASH
//! ```
//!
//! where the timestamp is ISO-8601 UTC with a literal `Z` suffix and the
//! content hash is the base64 SHA-256 digest of the body. The remote service
//! rebuilds the same string, so the layout must not change.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use http::Method;
use sha2::{Digest, Sha256};

use crate::authn::key::ApiKey;
use crate::errors::DeployError;

pub const HEADER_TIMESTAMP: &str = "X-Timestamp";
pub const HEADER_CONTENT_HASH: &str = "X-Content-Hash";
pub const HEADER_KEY_ID: &str = "X-Key-Id";
pub const HEADER_KEY: &str = "X-Key";
pub const HEADER_AUTHORIZATION: &str = "X-Authorization";

/// Base64 SHA-256 digest of a request body
pub fn content_hash(body: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(body))
}

/// Timestamp in the format the control plane parses
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// The exact string that gets signed
pub fn canonical_message(method: &Method, url: &str, timestamp: &str, content_hash: &str) -> String {
    format!("{}\n{}\n{}\n{}", method.as_str(), url, timestamp, content_hash)
}

/// Signs requests on behalf of `tenant:application:default`
#[derive(Debug, Clone)]
pub struct RequestSigner {
    key: ApiKey,
    key_id: String,
    public_key: String,
}

impl RequestSigner {
    /// Create a signer for the given tenant and application
    pub fn new(key: ApiKey, tenant: &str, application: &str) -> Result<Self, DeployError> {
        let public_key = key.public_key_encoded()?;
        Ok(Self {
            key,
            key_id: format!("{}:{}:default", tenant, application),
            public_key,
        })
    }

    /// The signing key
    pub fn key(&self) -> &ApiKey {
        &self.key
    }

    /// Value of the `X-Key-Id` header
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Build the authentication headers for one request.
    ///
    /// A new list is built on every call; nothing is shared between requests.
    pub fn sign(
        &self,
        method: &Method,
        url: &str,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>, DeployError> {
        let hash = content_hash(body);
        let timestamp = format_timestamp(now);
        let message = canonical_message(method, url, &timestamp, &hash);
        let signature = STANDARD.encode(self.key.sign(message.as_bytes())?);

        Ok(vec![
            (HEADER_TIMESTAMP.to_string(), timestamp),
            (HEADER_CONTENT_HASH.to_string(), hash),
            (HEADER_KEY_ID.to_string(), self.key_id.clone()),
            (HEADER_KEY.to_string(), self.public_key.clone()),
            (HEADER_AUTHORIZATION.to_string(), signature),
        ])
    }
}
