//! Inbound request context and outbound token types of the provider.

use chrono::Duration;
use serde::Serialize;

use crate::confirmation::{Principal, PublicKeyRef};
use crate::error::{Error, Result};
use crate::saml::Attribute;
use crate::xml::{self, XmlConfig, ns};

/// Everything a token request carries into the provider.
///
/// The targets hold the XML text of the WS-Trust target element; its first
/// child is the assertion the request operates on.
#[derive(Debug, Clone, Default)]
pub struct ProtocolContext {
    pub token_type: Option<String>,
    pub cancel_target: Option<String>,
    pub renew_target: Option<String>,
    pub validate_target: Option<String>,
    pub caller: Option<Principal>,
    pub on_behalf_of: Option<Principal>,
    pub proof_key: Option<PublicKeyRef>,
    /// Address of the relying party, written as the assertion audience.
    pub applies_to: Option<String>,
    pub claimed_attributes: Vec<Attribute>,
    /// Requested lifetime, overriding the provider default.
    pub lifetime: Option<Duration>,
    /// Issuer name, overriding the provider default.
    pub issuer: Option<String>,
}

impl ProtocolContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = Some(token_type.into());
        self
    }

    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(Principal::new(caller));
        self
    }

    pub fn with_on_behalf_of(mut self, principal: impl Into<String>) -> Self {
        self.on_behalf_of = Some(Principal::new(principal));
        self
    }

    pub fn with_proof_key(mut self, key: PublicKeyRef) -> Self {
        self.proof_key = Some(key);
        self
    }

    pub fn with_applies_to(mut self, applies_to: impl Into<String>) -> Self {
        self.applies_to = Some(applies_to.into());
        self
    }

    pub fn with_claimed_attribute(mut self, attribute: Attribute) -> Self {
        self.claimed_attributes.push(attribute);
        self
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Targets `assertion_xml` for renewal, wrapping it in `wst:RenewTarget`.
    pub fn with_renew_target(mut self, assertion_xml: &str) -> Self {
        self.renew_target = Some(Target::Renew.wrap(assertion_xml));
        self
    }

    /// Targets `assertion_xml` for cancellation, wrapping it in `wst:CancelTarget`.
    pub fn with_cancel_target(mut self, assertion_xml: &str) -> Self {
        self.cancel_target = Some(Target::Cancel.wrap(assertion_xml));
        self
    }

    /// Targets `assertion_xml` for validation, wrapping it in `wst:ValidateTarget`.
    pub fn with_validate_target(mut self, assertion_xml: &str) -> Self {
        self.validate_target = Some(Target::Validate.wrap(assertion_xml));
        self
    }

    /// The target element of the given kind.
    pub fn target(&self, kind: Target) -> Option<&str> {
        match kind {
            Target::Renew => self.renew_target.as_deref(),
            Target::Cancel => self.cancel_target.as_deref(),
            Target::Validate => self.validate_target.as_deref(),
        }
    }
}

/// WS-Trust target element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Renew,
    Cancel,
    Validate,
}

impl Target {
    pub fn local_name(self) -> &'static str {
        match self {
            Target::Renew => "RenewTarget",
            Target::Cancel => "CancelTarget",
            Target::Validate => "ValidateTarget",
        }
    }

    /// Wraps an element in this target element.
    pub fn wrap(self, element_xml: &str) -> String {
        format!(
            "<wst:{name} xmlns:wst=\"{ns}\">{element_xml}</wst:{name}>",
            name = self.local_name(),
            ns = ns::WS_TRUST
        )
    }
}

/// Token produced by issue and renew.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityToken {
    pub token_type: String,
    /// The assertion XML.
    pub content: String,
    pub id: String,
    pub attached_reference: AttachedReference,
}

/// Reference by which a message may point at an issued token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedReference {
    pub value_type: String,
    pub token_type: String,
    pub key_identifier: String,
}

#[derive(Serialize)]
struct SecurityTokenReferenceXml<'a> {
    #[serde(rename = "@wsse11:TokenType")]
    token_type: &'a str,
    #[serde(rename = "wsse:KeyIdentifier")]
    key_identifier: KeyIdentifierXml<'a>,
}

#[derive(Serialize)]
struct KeyIdentifierXml<'a> {
    #[serde(rename = "@ValueType")]
    value_type: &'a str,
    #[serde(rename = "$text")]
    value: &'a str,
}

impl AttachedReference {
    /// Renders the `wsse:SecurityTokenReference` element.
    pub fn to_xml(&self) -> Result<String> {
        let config = XmlConfig::new()
            .namespace("wsse", ns::WSSE)
            .namespace("wsse11", ns::WSSE11);
        let reference = SecurityTokenReferenceXml {
            token_type: &self.token_type,
            key_identifier: KeyIdentifierXml {
                value_type: &self.value_type,
                value: &self.key_identifier,
            },
        };
        xml::to_string_with_root(&config, "wsse:SecurityTokenReference", &reference)
            .map_err(|e| Error::Marshal(e.to_string()))
    }
}
