use thiserror::Error;

use crate::pki::TrustStoreError;
use crate::revocation::RevocationError;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by token issuance, renewal, cancellation and
/// validation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed request: {0}")]
    MalformedInput(String),

    #[error("Request does not name a token type")]
    MissingTokenType,

    #[error("Unsupported token type: {0}")]
    UnsupportedTokenType(String),

    #[error("Failed to marshal assertion: {0}")]
    Marshal(String),

    #[error("Failed to unmarshal assertion: {0}")]
    Unmarshal(String),

    #[error("Assertion failed schema validation: {0}")]
    Schema(String),

    #[error("Invalid assertion: {0}")]
    InvalidAssertion(String),

    #[error("Assertion {0} has been revoked")]
    RevokedAssertion(String),

    #[error("Assertion {0} has expired")]
    ExpiredAssertion(String),

    #[error("Invalid lifetime: {0}")]
    InvalidLifetime(String),

    #[error("Unsupported subject confirmation: {0}")]
    UnsupportedConfirmation(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Untrusted certificate: {0}")]
    UntrustedCertificate(String),

    #[error("Signature carries no X.509 certificate")]
    NoEmbeddedCertificate,

    #[error("Unknown trust domain: {0}")]
    UnknownTrustDomain(String),

    #[error("Unknown attribute provider: {0}")]
    UnknownAttributeProvider(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] crate::crypto::Error),

    #[error("Trust store error: {0}")]
    TrustStore(#[from] TrustStoreError),

    #[error("Revocation registry error: {0}")]
    Revocation(#[from] RevocationError),

    #[error(transparent)]
    Xml(#[from] crate::xml::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
