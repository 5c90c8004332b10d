use tracing::{debug, warn};

use super::dialect::{AssertionDialect, Saml2, Saml11};
use super::schema::{self, ViolationKind};
use super::{Assertion, SamlVersion};
use crate::error::{Error, Result};
use crate::xml::utils;

/// Decoding behaviour of an [`AssertionCodec`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecOptions {
    /// Run the structural schema check before parsing.
    pub schema_validation: bool,
    /// Downgrade empty-value violations to warnings. Every other violation
    /// still fails decoding.
    pub tolerate_null_values: bool,
}

/// Converts assertions to and from their XML form for both SAML versions.
#[derive(Debug, Clone, Default)]
pub struct AssertionCodec {
    options: CodecOptions,
}

impl AssertionCodec {
    pub fn new(options: CodecOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> CodecOptions {
        self.options
    }

    pub fn encode(&self, assertion: &Assertion) -> Result<String> {
        match assertion.version {
            SamlVersion::V2_0 => Saml2::write(assertion),
            SamlVersion::V1_1 => Saml11::write(assertion),
        }
    }

    /// Parses an assertion of the given version.
    ///
    /// An `Assertion` element from the other version is rejected, never
    /// reinterpreted.
    pub fn decode(&self, xml: &str, version: SamlVersion) -> Result<Assertion> {
        if self.options.schema_validation {
            self.check_schema(xml, version)?;
        }

        let root = utils::root_name(xml).map_err(|e| Error::Unmarshal(e.to_string()))?;
        if !root.matches(version.namespace(), Saml2::ELEMENT_LOCAL_NAME) {
            warn!(%root, %version, "Rejected assertion of the wrong version");
            return Err(Error::Unmarshal(format!(
                "expected a SAML {version} assertion, found {root}"
            )));
        }

        let assertion = match version {
            SamlVersion::V2_0 => Saml2::read(xml)?,
            SamlVersion::V1_1 => Saml11::read(xml)?,
        };
        debug!(id = %assertion.id, %version, "Decoded assertion");
        Ok(assertion)
    }

    fn check_schema(&self, xml: &str, version: SamlVersion) -> Result<()> {
        let violations = schema::validate(xml, version).map_err(|e| Error::Schema(e.to_string()))?;
        let mut failures = Vec::new();
        for violation in violations {
            if self.options.tolerate_null_values && violation.kind == ViolationKind::NullValue {
                warn!(%violation, "Tolerating empty value in assertion");
            } else {
                failures.push(violation.to_string());
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Schema(failures.join("; ")))
        }
    }
}

/// Version of an assertion, from the namespace of its root element.
pub fn detect_version(xml: &str) -> Result<SamlVersion> {
    let root = utils::root_name(xml).map_err(|e| Error::MalformedInput(e.to_string()))?;
    root.namespace
        .as_deref()
        .and_then(SamlVersion::from_namespace)
        .filter(|_| root.local_name == Saml2::ELEMENT_LOCAL_NAME)
        .ok_or_else(|| Error::UnsupportedTokenType(root.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saml::dsig::{KeyInfo, KeyValue, RsaKeyValue};
    use crate::saml::{
        Attribute, AttributeStatement, AuthnStatement, ConfirmationMethod, Subject, Validity,
    };
    use chrono::{Duration, TimeZone, Utc};

    fn assertion(version: SamlVersion) -> Assertion {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        Assertion {
            version,
            id: "ID_7f1c".into(),
            issue_instant: now,
            issuer: "urn:sts:test".into(),
            subject: Subject {
                name: "alice".into(),
                confirmation: ConfirmationMethod::Bearer,
                key_info: None,
            },
            validity: Validity {
                not_before: now - Duration::seconds(2),
                not_on_or_after: now + Duration::minutes(5),
            },
            audience: Some("https://rp.example.org".into()),
            authn_statement: Some(AuthnStatement {
                instant: now,
                method: "urn:test:password".into(),
            }),
            attribute_statements: vec![AttributeStatement {
                attributes: vec![
                    Attribute::new("role", ["admin", "user"]),
                    Attribute::new("mail", ["alice@example.org"]),
                ],
            }],
            signature: None,
        }
    }

    #[test]
    fn test_roundtrip_both_versions() {
        let codec = AssertionCodec::new(CodecOptions {
            schema_validation: true,
            tolerate_null_values: false,
        });
        for version in [SamlVersion::V2_0, SamlVersion::V1_1] {
            let original = assertion(version);
            let xml = codec.encode(&original).unwrap();
            assert_eq!(detect_version(&xml).unwrap(), version);
            assert_eq!(codec.decode(&xml, version).unwrap(), original);
        }
    }

    #[test]
    fn test_holder_of_key_roundtrip() {
        let codec = AssertionCodec::default();
        for version in [SamlVersion::V2_0, SamlVersion::V1_1] {
            let mut original = assertion(version);
            original.subject.confirmation = ConfirmationMethod::HolderOfKey;
            original.subject.key_info = Some(KeyInfo {
                key_value: Some(KeyValue {
                    rsa_key_value: RsaKeyValue {
                        modulus: "AQAB".into(),
                        exponent: "AQAB".into(),
                    },
                }),
                x509_data: None,
            });
            let xml = codec.encode(&original).unwrap();
            assert_eq!(codec.decode(&xml, version).unwrap(), original);
        }
    }

    #[test]
    fn test_versions_never_accepted_for_each_other() {
        let codec = AssertionCodec::default();
        let v2 = codec.encode(&assertion(SamlVersion::V2_0)).unwrap();
        let v11 = codec.encode(&assertion(SamlVersion::V1_1)).unwrap();

        assert!(matches!(codec.decode(&v2, SamlVersion::V1_1), Err(Error::Unmarshal(_))));
        assert!(matches!(codec.decode(&v11, SamlVersion::V2_0), Err(Error::Unmarshal(_))));
    }

    #[test]
    fn test_encode_rejects_saml11_without_statements() {
        let mut bare = assertion(SamlVersion::V1_1);
        bare.authn_statement = None;
        bare.attribute_statements.clear();
        assert!(matches!(AssertionCodec::default().encode(&bare), Err(Error::Marshal(_))));
    }

    #[test]
    fn test_null_leniency_is_opt_in() {
        let xml = AssertionCodec::default()
            .encode(&assertion(SamlVersion::V2_0))
            .unwrap();
        let with_null = xml.replace(
            "<saml2:NameID>alice</saml2:NameID>",
            "<saml2:NameID></saml2:NameID>",
        );

        let strict = AssertionCodec::new(CodecOptions {
            schema_validation: true,
            tolerate_null_values: false,
        });
        assert!(matches!(
            strict.decode(&with_null, SamlVersion::V2_0),
            Err(Error::Schema(_))
        ));

        let lenient = AssertionCodec::new(CodecOptions {
            schema_validation: true,
            tolerate_null_values: true,
        });
        let decoded = lenient.decode(&with_null, SamlVersion::V2_0).unwrap();
        assert_eq!(decoded.subject.name, "");

        let broken = with_null.replace("Version=\"2.0\"", "Version=\"3.0\"");
        assert!(matches!(
            lenient.decode(&broken, SamlVersion::V2_0),
            Err(Error::Schema(_))
        ));
    }

    #[test]
    fn test_detect_version_rejects_foreign_roots() {
        assert!(matches!(
            detect_version("<foo xmlns=\"urn:oasis:names:tc:SAML:2.0:assertion\"/>"),
            Err(Error::UnsupportedTokenType(_))
        ));
        assert!(matches!(detect_version("no root element here"), Err(Error::MalformedInput(_))));
    }
}
