use serde::{Deserialize, Serialize};

use super::dialect::{AssertionDialect, Saml11};
use super::dsig::{KeyInfo, Signature};
use super::{
    Assertion, Attribute, AttributeStatement, AuthnStatement, ConfirmationMethod, SamlVersion,
    Subject, Validity, format_instant, parse_instant,
};
use crate::error::{Error, Result};
use crate::xml::{self, XmlConfig, ns};

const MAJOR_VERSION: &str = "1";
const MINOR_VERSION: &str = "1";
/// `AttributeNamespace` written on every SAML 1.1 attribute.
pub(crate) const ATTRIBUTE_NAMESPACE: &str = "urn:oasis:names:tc:SAML:1.0:assertion#attributes";

#[derive(Debug, Serialize, Deserialize)]
struct AssertionXml {
    #[serde(rename = "@MajorVersion")]
    major_version: String,
    #[serde(rename = "@MinorVersion")]
    minor_version: String,
    #[serde(rename = "@AssertionID")]
    id: String,
    #[serde(rename = "@Issuer")]
    issuer: String,
    #[serde(rename = "@IssueInstant")]
    issue_instant: String,
    #[serde(rename(serialize = "saml:Conditions", deserialize = "Conditions"))]
    conditions: ConditionsXml,
    #[serde(
        rename(serialize = "saml:AuthenticationStatement", deserialize = "AuthenticationStatement"),
        skip_serializing_if = "Option::is_none",
        default
    )]
    authn_statement: Option<AuthenticationStatementXml>,
    #[serde(
        rename(serialize = "saml:AttributeStatement", deserialize = "AttributeStatement"),
        default
    )]
    attribute_statements: Vec<AttributeStatementXml>,
    #[serde(
        rename(serialize = "ds:Signature", deserialize = "Signature"),
        skip_serializing_if = "Option::is_none",
        default
    )]
    signature: Option<Signature>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConditionsXml {
    #[serde(rename = "@NotBefore")]
    not_before: String,
    #[serde(rename = "@NotOnOrAfter")]
    not_on_or_after: String,
    #[serde(
        rename(
            serialize = "saml:AudienceRestrictionCondition",
            deserialize = "AudienceRestrictionCondition"
        ),
        skip_serializing_if = "Option::is_none",
        default
    )]
    audience_restriction: Option<AudienceRestrictionXml>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AudienceRestrictionXml {
    #[serde(rename(serialize = "saml:Audience", deserialize = "Audience"), default)]
    audiences: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SubjectXml {
    #[serde(rename(serialize = "saml:NameIdentifier", deserialize = "NameIdentifier"))]
    name_identifier: NameIdentifierXml,
    #[serde(rename(serialize = "saml:SubjectConfirmation", deserialize = "SubjectConfirmation"))]
    confirmation: SubjectConfirmationXml,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NameIdentifierXml {
    #[serde(rename = "@Format", skip_serializing_if = "Option::is_none", default)]
    format: Option<String>,
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SubjectConfirmationXml {
    #[serde(
        rename(serialize = "saml:ConfirmationMethod", deserialize = "ConfirmationMethod"),
        default
    )]
    methods: Vec<String>,
    #[serde(
        rename(serialize = "ds:KeyInfo", deserialize = "KeyInfo"),
        skip_serializing_if = "Option::is_none",
        default
    )]
    key_info: Option<KeyInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AuthenticationStatementXml {
    #[serde(rename = "@AuthenticationMethod")]
    method: String,
    #[serde(rename = "@AuthenticationInstant")]
    instant: String,
    #[serde(rename(serialize = "saml:Subject", deserialize = "Subject"))]
    subject: SubjectXml,
}

#[derive(Debug, Serialize, Deserialize)]
struct AttributeStatementXml {
    #[serde(rename(serialize = "saml:Subject", deserialize = "Subject"))]
    subject: SubjectXml,
    #[serde(rename(serialize = "saml:Attribute", deserialize = "Attribute"), default)]
    attributes: Vec<AttributeXml>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AttributeXml {
    #[serde(rename = "@AttributeName")]
    name: String,
    #[serde(rename = "@AttributeNamespace")]
    namespace: String,
    #[serde(rename(serialize = "saml:AttributeValue", deserialize = "AttributeValue"), default)]
    values: Vec<String>,
}

impl TryFrom<&Assertion> for AssertionXml {
    type Error = Error;

    fn try_from(assertion: &Assertion) -> Result<Self> {
        // SAML 1.1 carries the subject inside its statements
        if assertion.authn_statement.is_none() && assertion.attribute_statements.is_empty() {
            return Err(Error::Marshal(
                "a SAML 1.1 assertion needs at least one statement to carry its subject".into(),
            ));
        }

        let subject = SubjectXml {
            name_identifier: NameIdentifierXml {
                format: None,
                value: assertion.subject.name.clone(),
            },
            confirmation: SubjectConfirmationXml {
                methods: vec![Saml11::confirmation_uri(assertion.subject.confirmation).to_string()],
                key_info: assertion.subject.key_info.clone(),
            },
        };

        Ok(Self {
            major_version: MAJOR_VERSION.to_string(),
            minor_version: MINOR_VERSION.to_string(),
            id: assertion.id.clone(),
            issuer: assertion.issuer.clone(),
            issue_instant: format_instant(&assertion.issue_instant),
            conditions: ConditionsXml {
                not_before: format_instant(&assertion.validity.not_before),
                not_on_or_after: format_instant(&assertion.validity.not_on_or_after),
                audience_restriction: assertion.audience.clone().map(|audience| {
                    AudienceRestrictionXml {
                        audiences: vec![audience],
                    }
                }),
            },
            authn_statement: assertion.authn_statement.as_ref().map(|statement| {
                AuthenticationStatementXml {
                    method: statement.method.clone(),
                    instant: format_instant(&statement.instant),
                    subject: subject.clone(),
                }
            }),
            attribute_statements: assertion
                .attribute_statements
                .iter()
                .map(|statement| AttributeStatementXml {
                    subject: subject.clone(),
                    attributes: statement
                        .attributes
                        .iter()
                        .map(|attribute| AttributeXml {
                            name: attribute.name.clone(),
                            namespace: ATTRIBUTE_NAMESPACE.to_string(),
                            values: attribute.values.clone(),
                        })
                        .collect(),
                })
                .collect(),
            signature: assertion.signature.clone(),
        })
    }
}

impl TryFrom<AssertionXml> for Assertion {
    type Error = Error;

    fn try_from(xml: AssertionXml) -> Result<Self> {
        if xml.major_version != MAJOR_VERSION || xml.minor_version != MINOR_VERSION {
            return Err(Error::Unmarshal(format!(
                "expected SAML 1.1, found MajorVersion=\"{}\" MinorVersion=\"{}\"",
                xml.major_version, xml.minor_version
            )));
        }

        let subject_xml = xml
            .authn_statement
            .as_ref()
            .map(|statement| &statement.subject)
            .or_else(|| xml.attribute_statements.first().map(|statement| &statement.subject))
            .ok_or_else(|| Error::Unmarshal("assertion carries no subject statement".into()))?;

        let confirmation = subject_xml
            .confirmation
            .methods
            .iter()
            .find_map(|uri| Saml11::confirmation_method(uri))
            .ok_or_else(|| Error::Unmarshal("no known confirmation method".into()))?;
        let key_info = subject_xml.confirmation.key_info.clone();
        if confirmation == ConfirmationMethod::HolderOfKey && key_info.is_none() {
            return Err(Error::Unmarshal(
                "holder-of-key confirmation without key info".into(),
            ));
        }
        let subject = Subject {
            name: subject_xml.name_identifier.value.clone(),
            confirmation,
            key_info,
        };

        let authn_statement = xml
            .authn_statement
            .map(|statement| -> Result<AuthnStatement> {
                Ok(AuthnStatement {
                    instant: parse_instant(&statement.instant).map_err(Error::Unmarshal)?,
                    method: statement.method,
                })
            })
            .transpose()?;

        Ok(Assertion {
            version: SamlVersion::V1_1,
            id: xml.id,
            issue_instant: parse_instant(&xml.issue_instant).map_err(Error::Unmarshal)?,
            issuer: xml.issuer,
            subject,
            validity: Validity {
                not_before: parse_instant(&xml.conditions.not_before).map_err(Error::Unmarshal)?,
                not_on_or_after: parse_instant(&xml.conditions.not_on_or_after)
                    .map_err(Error::Unmarshal)?,
            },
            audience: xml
                .conditions
                .audience_restriction
                .and_then(|restriction| restriction.audiences.into_iter().next()),
            authn_statement,
            attribute_statements: xml
                .attribute_statements
                .into_iter()
                .map(|statement| AttributeStatement {
                    attributes: statement
                        .attributes
                        .into_iter()
                        .map(|attribute| Attribute {
                            name: attribute.name,
                            values: attribute.values,
                        })
                        .collect(),
                })
                .collect(),
            signature: xml.signature,
        })
    }
}

impl AssertionDialect for Saml11 {
    const VERSION: SamlVersion = SamlVersion::V1_1;
    const NAMESPACE: &'static str = ns::SAML11_ASSERTION;
    const PREFIX: &'static str = "saml";
    const ID_ATTRIBUTE: &'static str = "AssertionID";
    const TOKEN_TYPE: &'static str =
        "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLV1.1";
    const KEY_IDENTIFIER_VALUE_TYPE: &'static str =
        "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.0#SAMLAssertionID";
    const DEFAULT_AUTHN_METHOD: &'static str = "urn:oasis:names:tc:SAML:1.0:am:password";
    const STATEMENT_TYPES: &'static [&'static str] = &[
        "AuthenticationStatement",
        "AttributeStatement",
        "AuthorizationDecisionStatement",
        "SubjectStatement",
        "Statement",
    ];

    fn confirmation_uri(method: ConfirmationMethod) -> &'static str {
        match method {
            ConfirmationMethod::Bearer => "urn:oasis:names:tc:SAML:1.0:cm:bearer",
            ConfirmationMethod::SenderVouches => "urn:oasis:names:tc:SAML:1.0:cm:sender-vouches",
            ConfirmationMethod::HolderOfKey => "urn:oasis:names:tc:SAML:1.0:cm:holder-of-key",
        }
    }

    fn write(assertion: &Assertion) -> Result<String> {
        if assertion.version != Self::VERSION {
            return Err(Error::Marshal(format!(
                "SAML {} assertion cannot be written as SAML {}",
                assertion.version,
                Self::VERSION
            )));
        }

        let config = XmlConfig::new()
            .namespace(Self::PREFIX, Self::NAMESPACE)
            .namespace("ds", ns::DSIG);
        let root = format!("{}:{}", Self::PREFIX, Self::ELEMENT_LOCAL_NAME);
        let wire = AssertionXml::try_from(assertion)?;
        xml::to_string_with_root(&config, &root, &wire).map_err(|e| Error::Marshal(e.to_string()))
    }

    fn read(xml: &str) -> Result<Assertion> {
        let parsed: AssertionXml = xml::from_str(xml).map_err(|e| Error::Unmarshal(e.to_string()))?;
        parsed.try_into()
    }
}
