use serde::{Deserialize, Serialize};

use super::dialect::{AssertionDialect, Saml2};
use super::dsig::{KeyInfo, Signature};
use super::{
    Assertion, Attribute, AttributeStatement, AuthnStatement, ConfirmationMethod, SamlVersion,
    Subject, Validity, format_instant, parse_instant,
};
use crate::error::{Error, Result};
use crate::xml::{self, XmlConfig, ns};

const VERSION: &str = "2.0";
const KEY_INFO_CONFIRMATION_TYPE: &str = "saml2:KeyInfoConfirmationDataType";

#[derive(Debug, Serialize, Deserialize)]
struct AssertionXml {
    #[serde(rename = "@ID")]
    id: String,
    #[serde(rename = "@Version")]
    version: String,
    #[serde(rename = "@IssueInstant")]
    issue_instant: String,
    #[serde(rename(serialize = "saml2:Issuer", deserialize = "Issuer"))]
    issuer: String,
    #[serde(
        rename(serialize = "ds:Signature", deserialize = "Signature"),
        skip_serializing_if = "Option::is_none",
        default
    )]
    signature: Option<Signature>,
    #[serde(rename(serialize = "saml2:Subject", deserialize = "Subject"))]
    subject: SubjectXml,
    #[serde(rename(serialize = "saml2:Conditions", deserialize = "Conditions"))]
    conditions: ConditionsXml,
    #[serde(
        rename(serialize = "saml2:AuthnStatement", deserialize = "AuthnStatement"),
        skip_serializing_if = "Option::is_none",
        default
    )]
    authn_statement: Option<AuthnStatementXml>,
    #[serde(
        rename(serialize = "saml2:AttributeStatement", deserialize = "AttributeStatement"),
        default
    )]
    attribute_statements: Vec<AttributeStatementXml>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SubjectXml {
    #[serde(rename(serialize = "saml2:NameID", deserialize = "NameID"))]
    name_id: NameIdXml,
    #[serde(rename(serialize = "saml2:SubjectConfirmation", deserialize = "SubjectConfirmation"))]
    confirmation: SubjectConfirmationXml,
}

#[derive(Debug, Serialize, Deserialize)]
struct NameIdXml {
    #[serde(rename = "@Format", skip_serializing_if = "Option::is_none", default)]
    format: Option<String>,
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SubjectConfirmationXml {
    #[serde(rename = "@Method")]
    method: String,
    #[serde(
        rename(
            serialize = "saml2:SubjectConfirmationData",
            deserialize = "SubjectConfirmationData"
        ),
        skip_serializing_if = "Option::is_none",
        default
    )]
    data: Option<SubjectConfirmationDataXml>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SubjectConfirmationDataXml {
    #[serde(
        rename(serialize = "@xsi:type", deserialize = "@type"),
        skip_serializing_if = "Option::is_none",
        default
    )]
    xsi_type: Option<String>,
    #[serde(
        rename(serialize = "ds:KeyInfo", deserialize = "KeyInfo"),
        skip_serializing_if = "Option::is_none",
        default
    )]
    key_info: Option<KeyInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConditionsXml {
    #[serde(rename = "@NotBefore")]
    not_before: String,
    #[serde(rename = "@NotOnOrAfter")]
    not_on_or_after: String,
    #[serde(
        rename(serialize = "saml2:AudienceRestriction", deserialize = "AudienceRestriction"),
        skip_serializing_if = "Option::is_none",
        default
    )]
    audience_restriction: Option<AudienceRestrictionXml>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AudienceRestrictionXml {
    #[serde(rename(serialize = "saml2:Audience", deserialize = "Audience"), default)]
    audiences: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AuthnStatementXml {
    #[serde(rename = "@AuthnInstant")]
    authn_instant: String,
    #[serde(rename(serialize = "saml2:AuthnContext", deserialize = "AuthnContext"))]
    context: AuthnContextXml,
}

#[derive(Debug, Serialize, Deserialize)]
struct AuthnContextXml {
    #[serde(rename(serialize = "saml2:AuthnContextClassRef", deserialize = "AuthnContextClassRef"))]
    class_ref: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct AttributeStatementXml {
    #[serde(rename(serialize = "saml2:Attribute", deserialize = "Attribute"), default)]
    attributes: Vec<AttributeXml>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AttributeXml {
    #[serde(rename = "@Name")]
    name: String,
    #[serde(rename = "@NameFormat", skip_serializing_if = "Option::is_none", default)]
    name_format: Option<String>,
    #[serde(rename(serialize = "saml2:AttributeValue", deserialize = "AttributeValue"), default)]
    values: Vec<String>,
}

impl From<&Assertion> for AssertionXml {
    fn from(assertion: &Assertion) -> Self {
        let subject = &assertion.subject;
        let data = subject.key_info.clone().map(|key_info| SubjectConfirmationDataXml {
            xsi_type: Some(KEY_INFO_CONFIRMATION_TYPE.to_string()),
            key_info: Some(key_info),
        });

        Self {
            id: assertion.id.clone(),
            version: VERSION.to_string(),
            issue_instant: format_instant(&assertion.issue_instant),
            issuer: assertion.issuer.clone(),
            signature: assertion.signature.clone(),
            subject: SubjectXml {
                name_id: NameIdXml {
                    format: None,
                    value: subject.name.clone(),
                },
                confirmation: SubjectConfirmationXml {
                    method: Saml2::confirmation_uri(subject.confirmation).to_string(),
                    data,
                },
            },
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
                AuthnStatementXml {
                    authn_instant: format_instant(&statement.instant),
                    context: AuthnContextXml {
                        class_ref: statement.method.clone(),
                    },
                }
            }),
            attribute_statements: assertion
                .attribute_statements
                .iter()
                .map(|statement| AttributeStatementXml {
                    attributes: statement
                        .attributes
                        .iter()
                        .map(|attribute| AttributeXml {
                            name: attribute.name.clone(),
                            name_format: None,
                            values: attribute.values.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

impl TryFrom<AssertionXml> for Assertion {
    type Error = Error;

    fn try_from(xml: AssertionXml) -> Result<Self> {
        if xml.version != VERSION {
            return Err(Error::Unmarshal(format!(
                "expected Version=\"{VERSION}\", found \"{}\"",
                xml.version
            )));
        }
        let confirmation = Saml2::confirmation_method(&xml.subject.confirmation.method)
            .ok_or_else(|| {
                Error::Unmarshal(format!(
                    "unknown confirmation method '{}'",
                    xml.subject.confirmation.method
                ))
            })?;
        let key_info = xml.subject.confirmation.data.and_then(|data| data.key_info);
        if confirmation == ConfirmationMethod::HolderOfKey && key_info.is_none() {
            return Err(Error::Unmarshal(
                "holder-of-key confirmation without key info".into(),
            ));
        }

        let authn_statement = xml
            .authn_statement
            .map(|statement| -> Result<AuthnStatement> {
                Ok(AuthnStatement {
                    instant: parse_instant(&statement.authn_instant).map_err(Error::Unmarshal)?,
                    method: statement.context.class_ref,
                })
            })
            .transpose()?;

        Ok(Assertion {
            version: SamlVersion::V2_0,
            id: xml.id,
            issue_instant: parse_instant(&xml.issue_instant).map_err(Error::Unmarshal)?,
            issuer: xml.issuer,
            subject: Subject {
                name: xml.subject.name_id.value,
                confirmation,
                key_info,
            },
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

impl AssertionDialect for Saml2 {
    const VERSION: SamlVersion = SamlVersion::V2_0;
    const NAMESPACE: &'static str = ns::SAML2_ASSERTION;
    const PREFIX: &'static str = "saml2";
    const ID_ATTRIBUTE: &'static str = "ID";
    const TOKEN_TYPE: &'static str =
        "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLV2.0";
    const KEY_IDENTIFIER_VALUE_TYPE: &'static str =
        "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLID";
    const DEFAULT_AUTHN_METHOD: &'static str =
        "urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport";
    const STATEMENT_TYPES: &'static [&'static str] =
        &["AuthnStatement", "AttributeStatement", "AuthzDecisionStatement", "Statement"];

    fn confirmation_uri(method: ConfirmationMethod) -> &'static str {
        match method {
            ConfirmationMethod::Bearer => "urn:oasis:names:tc:SAML:2.0:cm:bearer",
            ConfirmationMethod::SenderVouches => "urn:oasis:names:tc:SAML:2.0:cm:sender-vouches",
            ConfirmationMethod::HolderOfKey => "urn:oasis:names:tc:SAML:2.0:cm:holder-of-key",
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

        let mut config = XmlConfig::new()
            .namespace(Self::PREFIX, Self::NAMESPACE)
            .namespace("ds", ns::DSIG);
        if assertion.subject.key_info.is_some() {
            config = config.namespace("xsi", ns::XSI);
        }
        let root = format!("{}:{}", Self::PREFIX, Self::ELEMENT_LOCAL_NAME);
        xml::to_string_with_root(&config, &root, &AssertionXml::from(assertion))
            .map_err(|e| Error::Marshal(e.to_string()))
    }

    fn read(xml: &str) -> Result<Assertion> {
        let parsed: AssertionXml = xml::from_str(xml).map_err(|e| Error::Unmarshal(e.to_string()))?;
        parsed.try_into()
    }
}
