#![allow(dead_code)]

use std::sync::Arc;

use chrono::Duration;
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use saml_sts::crypto::SigningCredential;
use saml_sts::lifetime::{Clock, FixedClock, SystemClock};
use saml_sts::pki::cert_utils::{CertificateParams, generate_self_signed, generate_signed_by};
use saml_sts::pki::{MemoryTrustStore, TrustStore, TrustStoreRegistry};
use saml_sts::provider::{Saml2TokenProvider, Saml11TokenProvider};
use saml_sts::revocation::MemoryRevocationRegistry;
use saml_sts::signature::AssertionSigner;
use saml_sts::telemetry;

pub const TRUST_DOMAIN: &str = "sp";
pub const ISSUER: &str = "https://sts.example.org";

/// A CA and an STS signing certificate issued by it.
pub struct TestPki {
    pub ca_cert: X509,
    pub ca_key: PKey<Private>,
    pub sts_cert: X509,
    pub sts_key: PKey<Private>,
}

impl TestPki {
    pub fn new() -> Self {
        let (ca_cert, ca_key) = generate_self_signed(&CertificateParams::ca("Test Root")).unwrap();
        let (sts_cert, sts_key) =
            generate_signed_by(&CertificateParams::leaf("sts.example.org"), &ca_cert, &ca_key)
                .unwrap();
        Self {
            ca_cert,
            ca_key,
            sts_cert,
            sts_key,
        }
    }

    pub fn signer(&self) -> AssertionSigner {
        AssertionSigner::new(
            SigningCredential::new(self.sts_key.clone(), self.sts_cert.clone()).unwrap(),
        )
    }

    /// Registry whose `TRUST_DOMAIN` trusts the CA.
    pub fn trust_stores(&self) -> TrustStoreRegistry {
        let store = MemoryTrustStore::new();
        assert_eq!(store.add_certs([self.ca_cert.to_der().unwrap()]), 1);
        let registry = TrustStoreRegistry::new();
        registry.register(TRUST_DOMAIN, store);
        registry
    }
}

/// Clock frozen at the current instant.
pub fn frozen_clock() -> Arc<FixedClock> {
    telemetry::init_tracing();
    Arc::new(FixedClock::new(SystemClock.now()))
}

pub fn saml2_provider(
    clock: Arc<FixedClock>,
    revocations: Arc<MemoryRevocationRegistry>,
) -> Saml2TokenProvider {
    Saml2TokenProvider::new(ISSUER, revocations)
        .with_clock(clock)
        .with_default_lifetime(Duration::minutes(5))
}

pub fn saml11_provider(
    clock: Arc<FixedClock>,
    revocations: Arc<MemoryRevocationRegistry>,
) -> Saml11TokenProvider {
    Saml11TokenProvider::new(ISSUER, revocations)
        .with_clock(clock)
        .with_default_lifetime(Duration::minutes(5))
}
