mod common;

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Duration;
use common::{ISSUER, TestPki, frozen_clock, saml2_provider, saml11_provider};
use saml_sts::Error;
use saml_sts::confirmation::PublicKeyRef;
use saml_sts::pki::cert_utils::{CertificateParams, generate_self_signed};
use saml_sts::provider::attributes::StaticAttributeProvider;
use saml_sts::provider::{ProtocolContext, StatusCode};
use saml_sts::revocation::{MemoryRevocationRegistry, RevocationRegistry};
use saml_sts::saml::{
    AssertionCodec, AssertionDialect, Attribute, ConfirmationMethod, Saml2, Saml11, SamlVersion,
};
use saml_sts::xml::utils;

fn issue_request<D: AssertionDialect>() -> ProtocolContext {
    ProtocolContext::new()
        .with_token_type(D::TOKEN_TYPE)
        .with_caller("alice")
        .with_applies_to("https://rp.example.org")
        .with_claimed_attribute(Attribute::new("role", ["admin"]))
}

#[test]
fn test_issued_token_expires_after_its_lifetime() {
    let clock = frozen_clock();
    let provider = saml2_provider(clock.clone(), Arc::new(MemoryRevocationRegistry::new()))
        .with_signer(TestPki::new().signer());

    let token = provider.issue_token(&issue_request::<Saml2>()).unwrap();
    assert_eq!(token.token_type, Saml2::TOKEN_TYPE);
    assert!(token.id.starts_with("ID_"));

    let assertion = AssertionCodec::default()
        .decode(&token.content, SamlVersion::V2_0)
        .unwrap();
    assert_eq!(assertion.id, token.id);
    assert_eq!(assertion.issuer, ISSUER);
    assert_eq!(assertion.subject.name, "alice");
    assert_eq!(assertion.subject.confirmation, ConfirmationMethod::Bearer);
    assert_eq!(assertion.audience.as_deref(), Some("https://rp.example.org"));
    assert_eq!(assertion.attributes().collect::<Vec<_>>(), vec![&Attribute::new("role", ["admin"])]);
    assert_eq!(
        assertion.validity.not_on_or_after - assertion.validity.not_before,
        Duration::minutes(5) + Duration::seconds(2)
    );
    assert!(assertion.signature.is_some());

    let validate = ProtocolContext::new().with_validate_target(&token.content);

    clock.advance(Duration::minutes(1));
    let decision = provider.validate_token(&validate).unwrap();
    assert!(decision.valid, "{decision}");
    assert_eq!(decision.status, StatusCode::Valid);

    clock.advance(Duration::minutes(9));
    let decision = provider.validate_token(&validate).unwrap();
    assert!(!decision.valid);
    assert_eq!(decision.status, StatusCode::Invalid);
    assert!(decision.reason.contains("expired"), "{}", decision.reason);
}

#[test]
fn test_clock_skew_boundaries_are_inclusive() {
    let clock = frozen_clock();
    let provider = saml2_provider(clock.clone(), Arc::new(MemoryRevocationRegistry::new()))
        .with_clock_skew(Duration::seconds(30));
    let token = provider.issue_token(&issue_request::<Saml2>()).unwrap();
    let validate = ProtocolContext::new().with_validate_target(&token.content);

    clock.advance(Duration::minutes(5) + Duration::seconds(30));
    assert!(provider.validate_token(&validate).unwrap().valid);

    clock.advance(Duration::milliseconds(1));
    assert!(!provider.validate_token(&validate).unwrap().valid);
}

#[test]
fn test_cancel_then_renew_is_rejected() {
    let clock = frozen_clock();
    let revocations = Arc::new(MemoryRevocationRegistry::new());
    let provider = saml2_provider(clock, revocations.clone()).with_signer(TestPki::new().signer());

    let token = provider.issue_token(&issue_request::<Saml2>()).unwrap();
    let cancel = ProtocolContext::new().with_cancel_target(&token.content);
    provider.cancel_token(&cancel).unwrap();
    // Canceling twice is a no-op
    provider.cancel_token(&cancel).unwrap();
    assert!(revocations.is_revoked(Saml2::TOKEN_TYPE, &token.id));
    assert!(!revocations.is_revoked(Saml11::TOKEN_TYPE, &token.id));

    let renewed = provider.renew_token(&ProtocolContext::new().with_renew_target(&token.content));
    assert!(matches!(renewed, Err(Error::RevokedAssertion(id)) if id == token.id));

    let decision = provider
        .validate_token(&ProtocolContext::new().with_validate_target(&token.content))
        .unwrap();
    assert!(!decision.valid);
    assert!(decision.reason.contains("canceled"), "{}", decision.reason);
}

#[test]
fn test_renewal_issues_a_fresh_assertion() {
    let clock = frozen_clock();
    let provider = saml2_provider(clock.clone(), Arc::new(MemoryRevocationRegistry::new()))
        .with_signer(TestPki::new().signer());
    let codec = AssertionCodec::default();

    let original = provider.issue_token(&issue_request::<Saml2>()).unwrap();
    clock.advance(Duration::minutes(4));
    let renewed = provider
        .renew_token(&ProtocolContext::new().with_renew_target(&original.content))
        .unwrap();
    assert_ne!(renewed.id, original.id);

    let before = codec.decode(&original.content, SamlVersion::V2_0).unwrap();
    let after = codec.decode(&renewed.content, SamlVersion::V2_0).unwrap();
    assert_eq!(after.subject, before.subject);
    assert_eq!(after.audience, before.audience);
    assert_eq!(after.attribute_statements, before.attribute_statements);
    assert_eq!(after.authn_statement, before.authn_statement);
    assert_eq!(
        after.validity.not_before - before.validity.not_before,
        Duration::minutes(4)
    );

    // The renewed token outlives the original one
    clock.advance(Duration::minutes(3));
    let check = |content: &str| {
        provider
            .validate_token(&ProtocolContext::new().with_validate_target(content))
            .unwrap()
            .valid
    };
    assert!(!check(&original.content));
    assert!(check(&renewed.content));
}

#[test]
fn test_saml11_lifecycle() {
    let clock = frozen_clock();
    let provider = saml11_provider(clock, Arc::new(MemoryRevocationRegistry::new()))
        .with_signer(TestPki::new().signer());

    let token = provider.issue_token(&issue_request::<Saml11>()).unwrap();
    assert_eq!(token.token_type, Saml11::TOKEN_TYPE);
    assert_eq!(
        utils::root_attribute(&token.content, "AssertionID").unwrap().as_deref(),
        Some(token.id.as_str())
    );
    assert_eq!(
        token.attached_reference.value_type,
        Saml11::KEY_IDENTIFIER_VALUE_TYPE
    );

    let renewed = provider
        .renew_token(&ProtocolContext::new().with_renew_target(&token.content))
        .unwrap();
    let decision = provider
        .validate_token(&ProtocolContext::new().with_validate_target(&renewed.content))
        .unwrap();
    assert!(decision.valid, "{decision}");
}

#[test]
fn test_versions_are_never_mixed() {
    let clock = frozen_clock();
    let revocations = Arc::new(MemoryRevocationRegistry::new());
    let saml2 = saml2_provider(clock.clone(), revocations.clone());
    let saml11 = saml11_provider(clock, revocations);

    let v2_token = saml2.issue_token(&issue_request::<Saml2>()).unwrap();

    let decision = saml11
        .validate_token(&ProtocolContext::new().with_validate_target(&v2_token.content))
        .unwrap();
    assert!(!decision.valid);
    assert!(decision.reason.contains("type mismatch"), "{}", decision.reason);

    assert!(matches!(
        saml11.renew_token(&ProtocolContext::new().with_renew_target(&v2_token.content)),
        Err(Error::InvalidAssertion(_))
    ));
    assert!(matches!(
        saml11.cancel_token(&ProtocolContext::new().with_cancel_target(&v2_token.content)),
        Err(Error::InvalidAssertion(_))
    ));
    assert!(matches!(
        saml11.issue_token(&issue_request::<Saml2>()),
        Err(Error::UnsupportedTokenType(_))
    ));
}

#[test]
fn test_request_errors() {
    let provider = saml2_provider(frozen_clock(), Arc::new(MemoryRevocationRegistry::new()));

    assert!(matches!(
        provider.issue_token(&ProtocolContext::new().with_caller("alice")),
        Err(Error::MissingTokenType)
    ));
    assert!(matches!(
        provider.validate_token(&ProtocolContext::new()),
        Err(Error::MalformedInput(_))
    ));
    assert!(matches!(
        provider.renew_token(&ProtocolContext::new()),
        Err(Error::MalformedInput(_))
    ));
    assert!(matches!(
        provider.issue_token(&issue_request::<Saml2>().with_lifetime(Duration::zero())),
        Err(Error::InvalidLifetime(_))
    ));

    // A target that holds no assertion is an invalid token, not a failed request
    let decision = provider
        .validate_token(&ProtocolContext::new().with_validate_target("<garbage"))
        .unwrap();
    assert!(!decision.valid);
}

#[test]
fn test_token_type_may_be_the_assertion_namespace() {
    let provider = saml2_provider(frozen_clock(), Arc::new(MemoryRevocationRegistry::new()));
    let request = ProtocolContext::new()
        .with_token_type(Saml2::NAMESPACE)
        .with_caller("alice");
    assert!(provider.issue_token(&request).is_ok());
}

#[test]
fn test_foreign_signature_is_invalid() {
    let clock = frozen_clock();
    let revocations = Arc::new(MemoryRevocationRegistry::new());
    let forger = saml2_provider(clock.clone(), revocations.clone()).with_signer(TestPki::new().signer());
    let provider = saml2_provider(clock, revocations).with_signer(TestPki::new().signer());

    let forged = forger.issue_token(&issue_request::<Saml2>()).unwrap();
    let decision = provider
        .validate_token(&ProtocolContext::new().with_validate_target(&forged.content))
        .unwrap();
    assert!(!decision.valid);

    assert!(matches!(
        provider.renew_token(&ProtocolContext::new().with_renew_target(&forged.content)),
        Err(Error::InvalidSignature(_))
    ));
}

#[test]
fn test_tampered_token_is_invalid() {
    let provider = saml2_provider(frozen_clock(), Arc::new(MemoryRevocationRegistry::new()))
        .with_signer(TestPki::new().signer());
    let token = provider.issue_token(&issue_request::<Saml2>()).unwrap();
    let tampered = token.content.replace(">alice<", ">mallory<");
    assert_ne!(tampered, token.content);

    let decision = provider
        .validate_token(&ProtocolContext::new().with_validate_target(&tampered))
        .unwrap();
    assert!(!decision.valid);
}

#[test]
fn test_confirmation_methods() {
    let clock = frozen_clock();
    let provider = saml2_provider(clock, Arc::new(MemoryRevocationRegistry::new()));
    let codec = AssertionCodec::default();

    let token = provider
        .issue_token(&issue_request::<Saml2>().with_on_behalf_of("bob"))
        .unwrap();
    let assertion = codec.decode(&token.content, SamlVersion::V2_0).unwrap();
    assert_eq!(assertion.subject.confirmation, ConfirmationMethod::SenderVouches);
    assert_eq!(assertion.subject.name, "bob");

    let (proof, _) = generate_self_signed(&CertificateParams::leaf("alice-device")).unwrap();
    let der = proof.to_der().unwrap();
    let token = provider
        .issue_token(&issue_request::<Saml2>().with_proof_key(PublicKeyRef::Certificate(der.clone())))
        .unwrap();
    let assertion = codec.decode(&token.content, SamlVersion::V2_0).unwrap();
    assert_eq!(assertion.subject.confirmation, ConfirmationMethod::HolderOfKey);
    assert_eq!(
        assertion.subject.key_info.unwrap().certificate(),
        Some(STANDARD.encode(&der).as_str())
    );

    let anonymous = provider
        .issue_token(&ProtocolContext::new().with_token_type(Saml2::TOKEN_TYPE))
        .unwrap();
    let assertion = codec.decode(&anonymous.content, SamlVersion::V2_0).unwrap();
    assert_eq!(assertion.subject.name, "ANONYMOUS");
    assert!(assertion.attribute_statements.is_empty());
}

#[test]
fn test_attribute_provider_replaces_claims() {
    let provider = saml2_provider(frozen_clock(), Arc::new(MemoryRevocationRegistry::new()))
        .with_attribute_provider(Arc::new(StaticAttributeProvider::new(vec![Attribute::new(
            "department",
            ["finance"],
        )])));
    let token = provider.issue_token(&issue_request::<Saml2>()).unwrap();
    let assertion = AssertionCodec::default()
        .decode(&token.content, SamlVersion::V2_0)
        .unwrap();
    assert_eq!(
        assertion.attributes().cloned().collect::<Vec<_>>(),
        vec![Attribute::new("department", ["finance"])]
    );
}

#[test]
fn test_attached_reference_names_the_token() {
    let provider = saml2_provider(frozen_clock(), Arc::new(MemoryRevocationRegistry::new()));
    let token = provider.issue_token(&issue_request::<Saml2>()).unwrap();
    let reference = token.attached_reference.to_xml().unwrap();
    assert!(reference.contains(&format!(">{}</wsse:KeyIdentifier>", token.id)));
    assert!(reference.contains(Saml2::KEY_IDENTIFIER_VALUE_TYPE));
}

#[test]
fn test_concurrent_cancellation() {
    let revocations = Arc::new(MemoryRevocationRegistry::new());
    let provider = saml2_provider(frozen_clock(), revocations.clone());
    let tokens: Vec<_> = (0..8)
        .map(|_| provider.issue_token(&issue_request::<Saml2>()).unwrap())
        .collect();

    std::thread::scope(|scope| {
        for token in &tokens {
            let provider = &provider;
            scope.spawn(move || {
                provider
                    .cancel_token(&ProtocolContext::new().with_cancel_target(&token.content))
                    .unwrap();
            });
        }
    });

    assert_eq!(revocations.len(), tokens.len());
    for token in &tokens {
        let renewed = provider.renew_token(&ProtocolContext::new().with_renew_target(&token.content));
        assert!(matches!(renewed, Err(Error::RevokedAssertion(_))));
    }
}

#[test]
fn test_unrepresentable_lifetime_is_rejected() {
    let clock = frozen_clock();
    let provider = saml2_provider(clock, Arc::new(MemoryRevocationRegistry::new()));

    let result = provider.issue_token(&issue_request::<Saml2>().with_lifetime(Duration::MAX));
    assert!(matches!(result, Err(Error::InvalidLifetime(_))), "{result:?}");

    let token = provider.issue_token(&issue_request::<Saml2>()).unwrap();
    let renew = ProtocolContext::new()
        .with_renew_target(&token.content)
        .with_lifetime(Duration::MAX);
    let result = provider.renew_token(&renew);
    assert!(matches!(result, Err(Error::InvalidLifetime(_))), "{result:?}");
}
