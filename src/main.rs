use std::sync::Arc;

use color_eyre::eyre::eyre;
use saml_sts::{
    config::Config,
    consumer::AssertionConsumer,
    crypto::SigningCredential,
    pki::{MemoryTrustStore, TrustStore, TrustStoreRegistry, cert_utils},
    provider::{ProtocolContext, Saml2TokenProvider},
    revocation::MemoryRevocationRegistry,
    saml::{Attribute, AssertionDialect, Saml2},
    signature::AssertionSigner,
    sts::SecurityTokenService,
    telemetry,
};

const DEMO_DOMAIN: &str = "demo";

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let config = Config::load()?;
    tracing::info!("Loaded configuration: {:?}", config);

    let principal = std::env::args().nth(1).unwrap_or_else(|| "alice".to_string());
    let context = ProtocolContext::new()
        .with_token_type(Saml2::TOKEN_TYPE)
        .with_caller(principal)
        .with_claimed_attribute(Attribute::new("role", ["user"]));

    if config.sts.signing.is_some() {
        // Configured deployment: sign with the configured credential and
        // verify against the configured trust domains
        let sts = SecurityTokenService::from_config(&config)?;
        let token = sts.issue(&context)?;
        println!("{}", token.content);
        println!("{}", token.attached_reference.to_xml()?);

        let decision = sts.validate(&ProtocolContext::new().with_validate_target(&token.content))?;
        println!("STS validation: {decision}");

        let consumer = AssertionConsumer::from_config(&config)?;
        for domain in config.trust.domains.keys() {
            println!("{domain}: {}", consumer.evaluate(&token.content, domain));
        }
        return Ok(());
    }

    // No signing credential configured: run against a throwaway CA
    let (ca_cert, ca_key) = cert_utils::generate_self_signed(&cert_utils::CertificateParams::ca(
        "SAML STS Demo CA",
    ))?;
    let (sts_cert, sts_key) = cert_utils::generate_signed_by(
        &cert_utils::CertificateParams::leaf(config.sts.issuer.as_str()),
        &ca_cert,
        &ca_key,
    )?;
    let signer = AssertionSigner::new(SigningCredential::new(sts_key, sts_cert)?);

    let provider = Saml2TokenProvider::new(
        config.sts.issuer.clone(),
        Arc::new(MemoryRevocationRegistry::new()),
    )
    .with_default_lifetime(config.sts.token_lifetime()?)
    .with_clock_skew(config.sts.clock_skew()?)
    .with_signer(signer);

    let token = provider.issue_token(&context)?;
    println!("{}", token.content);
    println!("{}", token.attached_reference.to_xml()?);

    let decision =
        provider.validate_token(&ProtocolContext::new().with_validate_target(&token.content))?;
    println!("STS validation: {decision}");

    let store = MemoryTrustStore::new();
    if store.add_certs([ca_cert.to_der()?]) == 0 {
        return Err(eyre!("demo CA was not added to the trust store"));
    }
    let trust_stores = TrustStoreRegistry::new();
    trust_stores.register(DEMO_DOMAIN, store);
    let consumer = AssertionConsumer::new(trust_stores);
    println!("Relying party: {}", consumer.evaluate(&token.content, DEMO_DOMAIN));

    Ok(())
}
