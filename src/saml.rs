//! SAML assertion model shared by both protocol versions.

mod codec;
pub mod dialect;
pub mod dsig;
pub mod schema;
mod v11;
mod v2;

pub use codec::{AssertionCodec, CodecOptions, detect_version};
pub use dialect::{AssertionDialect, Saml11, Saml2};

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

use crate::error::{Error, Result};
use crate::lifetime::Lifetime;
use dsig::{KeyInfo, Signature};

/// Protocol version of an assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamlVersion {
    V1_1,
    V2_0,
}

impl SamlVersion {
    /// Namespace of the version's `Assertion` element.
    pub fn namespace(self) -> &'static str {
        match self {
            SamlVersion::V1_1 => Saml11::NAMESPACE,
            SamlVersion::V2_0 => Saml2::NAMESPACE,
        }
    }

    /// WS-Security token type URI, which also names the revocation family.
    pub fn token_type(self) -> &'static str {
        match self {
            SamlVersion::V1_1 => Saml11::TOKEN_TYPE,
            SamlVersion::V2_0 => Saml2::TOKEN_TYPE,
        }
    }

    /// Name of the attribute carrying the assertion identifier.
    pub fn id_attribute(self) -> &'static str {
        match self {
            SamlVersion::V1_1 => Saml11::ID_ATTRIBUTE,
            SamlVersion::V2_0 => Saml2::ID_ATTRIBUTE,
        }
    }

    pub fn from_namespace(namespace: &str) -> Option<Self> {
        [SamlVersion::V1_1, SamlVersion::V2_0]
            .into_iter()
            .find(|v| v.namespace() == namespace)
    }
}

impl fmt::Display for SamlVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamlVersion::V1_1 => f.write_str("1.1"),
            SamlVersion::V2_0 => f.write_str("2.0"),
        }
    }
}

/// How the presenter of an assertion proves it is the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfirmationMethod {
    Bearer,
    SenderVouches,
    HolderOfKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub name: String,
    pub confirmation: ConfirmationMethod,
    /// Proof key the presenter must demonstrate possession of. Only set for
    /// holder-of-key confirmation.
    pub key_info: Option<KeyInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<String>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttributeStatement {
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthnStatement {
    pub instant: DateTime<Utc>,
    /// Authentication context class (SAML 2.0) or authentication method
    /// (SAML 1.1) URI.
    pub method: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validity {
    pub not_before: DateTime<Utc>,
    pub not_on_or_after: DateTime<Utc>,
}

impl From<Lifetime> for Validity {
    fn from(lifetime: Lifetime) -> Self {
        Self {
            not_before: lifetime.created(),
            not_on_or_after: lifetime.expires(),
        }
    }
}

impl TryFrom<Validity> for Lifetime {
    type Error = Error;

    fn try_from(validity: Validity) -> Result<Self> {
        Lifetime::new(validity.not_before, validity.not_on_or_after)
    }
}

/// A signed or unsigned SAML assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    pub version: SamlVersion,
    pub id: String,
    pub issue_instant: DateTime<Utc>,
    pub issuer: String,
    pub subject: Subject,
    pub validity: Validity,
    pub audience: Option<String>,
    pub authn_statement: Option<AuthnStatement>,
    pub attribute_statements: Vec<AttributeStatement>,
    pub signature: Option<Signature>,
}

impl Assertion {
    /// All attributes across every attribute statement, in document order.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attribute_statements
            .iter()
            .flat_map(|statement| statement.attributes.iter())
    }

    pub fn lifetime(&self) -> Result<Lifetime> {
        self.validity.try_into()
    }
}

/// `xs:dateTime` rendering with millisecond precision in UTC.
pub(crate) fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_instant(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|e| format!("invalid dateTime '{value}': {e}"))
}
