//! Ephemeral data plane identity
//!
//! Every cloud client owns a freshly generated P-384 key and a self-signed
//! certificate for it. The certificate is shipped inside the application
//! package as `security/clients.pem`, and the key/certificate pair is
//! written to disk so that callers can authenticate against the deployed
//! endpoint.

use std::str::FromStr;
use std::time::SystemTime;

use chrono::{DateTime, Duration, Utc};
use der::asn1::UtcTime;
use der::pem::LineEnding;
use der::EncodePem;
use p384::ecdsa::signature::hazmat::PrehashSigner;
use p384::ecdsa::signature::{Keypair, Signer};
use p384::ecdsa::{DerSignature, Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use spki::{AlgorithmIdentifierOwned, DynSignatureAlgorithmIdentifier, ObjectIdentifier, SubjectPublicKeyInfoOwned};
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::{Time, Validity};
use x509_cert::Certificate;

use crate::errors::DeployError;

/// Common name used for both subject and issuer
pub const CERTIFICATE_COMMON_NAME: &str = "localhost";

/// Tolerated clock skew before the certificate becomes valid, in seconds
pub const NOT_BEFORE_SKEW_SECS: i64 = 60;

/// Certificate lifetime, in days
pub const VALIDITY_DAYS: i64 = 7;

/// ecdsa-with-SHA256
const ECDSA_WITH_SHA_256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");

/// Self-signed certificate and its private key
#[derive(Clone)]
pub struct ClientCertificate {
    key: p384::SecretKey,
    certificate: Certificate,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
}

impl ClientCertificate {
    /// Generate a fresh key pair and certificate
    pub fn generate() -> Result<Self, DeployError> {
        Self::generate_with_key(p384::SecretKey::random(&mut OsRng), Utc::now())
    }

    /// Generate a certificate for an existing key, valid relative to `now`
    pub fn generate_with_key(key: p384::SecretKey, now: DateTime<Utc>) -> Result<Self, DeployError> {
        let not_before = now - Duration::seconds(NOT_BEFORE_SKEW_SECS);
        let not_after = now + Duration::days(VALIDITY_DAYS);

        let signing_key = SigningKey::from(&key);
        let signer = Sha256Signer(&signing_key);

        let public_key = SubjectPublicKeyInfoOwned::from_key(*signing_key.verifying_key())
            .map_err(cert_error)?;
        let subject = Name::from_str(&format!("CN={}", CERTIFICATE_COMMON_NAME)).map_err(cert_error)?;
        let validity = Validity {
            not_before: to_x509_time(not_before)?,
            not_after: to_x509_time(not_after)?,
        };

        let certificate = CertificateBuilder::new(
            Profile::Root,
            random_serial_number()?,
            validity,
            subject,
            public_key,
            &signer,
        )
        .map_err(cert_error)?
        .build::<DerSignature>()
        .map_err(cert_error)?;

        Ok(Self {
            key,
            certificate,
            not_before,
            not_after,
        })
    }

    /// The X.509 certificate
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Start of the validity window
    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    /// End of the validity window
    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Public key of the held private key
    pub fn public_key(&self) -> p384::PublicKey {
        self.key.public_key()
    }

    /// PEM encoded certificate
    pub fn certificate_pem(&self) -> Result<String, DeployError> {
        self.certificate.to_pem(LineEnding::LF).map_err(cert_error)
    }

    /// SEC1 ("EC PRIVATE KEY") PEM encoded private key
    pub fn private_key_pem(&self) -> Result<String, DeployError> {
        let pem = self.key.to_sec1_pem(LineEnding::LF).map_err(cert_error)?;
        Ok(String::from(pem.as_str()))
    }

    /// Private key followed by certificate, as used for client authentication
    pub fn key_and_certificate_pem(&self) -> Result<String, DeployError> {
        Ok(format!("{}{}", self.private_key_pem()?, self.certificate_pem()?))
    }
}

impl std::fmt::Debug for ClientCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCertificate")
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}

/// Signs certificates with ECDSA over SHA-256 using a P-384 key
struct Sha256Signer<'a>(&'a SigningKey);

impl Keypair for Sha256Signer<'_> {
    type VerifyingKey = VerifyingKey;

    fn verifying_key(&self) -> VerifyingKey {
        *self.0.verifying_key()
    }
}

impl DynSignatureAlgorithmIdentifier for Sha256Signer<'_> {
    fn signature_algorithm_identifier(&self) -> spki::Result<AlgorithmIdentifierOwned> {
        Ok(AlgorithmIdentifierOwned {
            oid: ECDSA_WITH_SHA_256,
            parameters: None,
        })
    }
}

impl Signer<DerSignature> for Sha256Signer<'_> {
    fn try_sign(&self, msg: &[u8]) -> Result<DerSignature, p384::ecdsa::signature::Error> {
        let signature: Signature = self.0.sign_prehash(&Sha256::digest(msg))?;
        Ok(signature.to_der())
    }
}

/// Positive, non-zero 159-bit serial
fn random_serial_number() -> Result<SerialNumber, DeployError> {
    let mut bytes = [0u8; 20];
    OsRng.fill_bytes(&mut bytes);
    bytes[0] = (bytes[0] & 0x7f).max(1);
    SerialNumber::new(&bytes).map_err(cert_error)
}

fn to_x509_time(time: DateTime<Utc>) -> Result<Time, DeployError> {
    let utc = UtcTime::from_system_time(SystemTime::from(time)).map_err(cert_error)?;
    Ok(Time::UtcTime(utc))
}

fn cert_error(err: impl std::fmt::Display) -> DeployError {
    DeployError::CertificateError(err.to_string())
}
