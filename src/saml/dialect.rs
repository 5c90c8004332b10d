use crate::error::Result;
use crate::saml::{Assertion, ConfirmationMethod, SamlVersion};

/// Version-specific names and wire shape of an assertion.
///
/// The token lifecycle is written once against this trait; each SAML
/// version supplies its constants and its XML mapping.
pub trait AssertionDialect: Send + Sync + 'static {
    const VERSION: SamlVersion;
    /// Assertion namespace URI.
    const NAMESPACE: &'static str;
    /// Prefix bound to `NAMESPACE` when writing.
    const PREFIX: &'static str;
    const ELEMENT_LOCAL_NAME: &'static str = "Assertion";
    /// Attribute carrying the assertion identifier.
    const ID_ATTRIBUTE: &'static str;
    /// Token type URI of the WS-Security SAML token profile.
    const TOKEN_TYPE: &'static str;
    /// `ValueType` of a key identifier referencing the assertion id.
    const KEY_IDENTIFIER_VALUE_TYPE: &'static str;
    const DEFAULT_AUTHN_METHOD: &'static str;
    /// Local names of the statements the dialect may carry.
    const STATEMENT_TYPES: &'static [&'static str];

    fn confirmation_uri(method: ConfirmationMethod) -> &'static str;

    fn confirmation_method(uri: &str) -> Option<ConfirmationMethod> {
        [
            ConfirmationMethod::Bearer,
            ConfirmationMethod::SenderVouches,
            ConfirmationMethod::HolderOfKey,
        ]
        .into_iter()
        .find(|method| Self::confirmation_uri(*method) == uri)
    }

    /// Serializes the assertion as this dialect's `Assertion` element.
    fn write(assertion: &Assertion) -> Result<String>;

    /// Parses an `Assertion` element already known to be in this dialect's
    /// namespace.
    fn read(xml: &str) -> Result<Assertion>;
}

/// SAML 2.0 assertions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Saml2;

/// SAML 1.1 assertions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Saml11;
