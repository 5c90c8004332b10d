//! Relying-party verification of received assertions.

use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::lifetime::{Clock, LifetimeCalculator};
use crate::pki::{TrustPathValidator, TrustStoreRegistry};
use crate::provider::{DEFAULT_CLOCK_SKEW, DEFAULT_TOKEN_LIFETIME, TrustDecision};
use crate::revocation::RevocationRegistry;
use crate::saml::{Assertion, AssertionCodec, detect_version};
use crate::signature::SignatureVerifier;

/// Runs the checks a relying party applies before trusting an assertion:
/// signature, trust path of the signer, lifetime, and optionally revocation
/// and audience.
#[derive(Debug, Clone)]
pub struct AssertionConsumer {
    codec: AssertionCodec,
    verifier: SignatureVerifier,
    validator: TrustPathValidator,
    trust_stores: TrustStoreRegistry,
    lifetimes: LifetimeCalculator,
    clock_skew: Duration,
    revocations: Option<Arc<dyn RevocationRegistry>>,
    audience: Option<String>,
}

impl AssertionConsumer {
    pub fn new(trust_stores: TrustStoreRegistry) -> Self {
        Self {
            codec: AssertionCodec::default(),
            verifier: SignatureVerifier::new(),
            validator: TrustPathValidator::default(),
            trust_stores,
            lifetimes: LifetimeCalculator::new(DEFAULT_TOKEN_LIFETIME),
            clock_skew: DEFAULT_CLOCK_SKEW,
            revocations: None,
            audience: None,
        }
    }

    /// Consumer over the configured trust domains, using the configured
    /// clock skew and revocation checking.
    pub fn from_config(config: &Config) -> Result<Self> {
        let trust_stores = TrustStoreRegistry::load(&config.trust.domains)?;
        info!(domains = ?trust_stores.domains(), "Loaded trust stores");
        Ok(Self::new(trust_stores)
            .with_validator(TrustPathValidator::new(config.trust.revocation_checking))
            .with_codec(AssertionCodec::new(config.sts.codec_options()))
            .with_clock_skew(config.sts.clock_skew()?))
    }

    /// Clock for both the lifetime and the certificate validity checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.lifetimes = self.lifetimes.with_clock(clock.clone());
        self.validator = self.validator.with_clock(clock);
        self
    }

    pub fn with_validator(mut self, validator: TrustPathValidator) -> Self {
        self.validator = validator.with_clock(self.lifetimes.clock());
        self
    }

    pub fn with_codec(mut self, codec: AssertionCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    /// Also reject assertions canceled at the issuing STS.
    pub fn with_revocations(mut self, revocations: Arc<dyn RevocationRegistry>) -> Self {
        self.revocations = Some(revocations);
        self
    }

    /// Only accept assertions addressed to `audience`.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Verifies `xml` against the trust store of `trust_domain` and returns
    /// the decoded assertion.
    pub fn verify(&self, xml: &str, trust_domain: &str) -> Result<Assertion> {
        let store = self
            .trust_stores
            .get(trust_domain)
            .ok_or_else(|| Error::UnknownTrustDomain(trust_domain.to_string()))?;

        let version = detect_version(xml)?;
        let assertion = self.codec.decode(xml, version)?;
        debug!(id = %assertion.id, %version, "Verifying assertion");

        let certificate = self.verifier.extract_signer_certificate(xml)?;
        self.verifier.verify(xml, &certificate)?;
        self.validator.validate(&certificate, &store)?;

        let lifetime = assertion.lifetime()?;
        if self.lifetimes.is_expired(&lifetime, self.clock_skew) {
            return Err(Error::ExpiredAssertion(assertion.id));
        }
        if let Some(revocations) = &self.revocations {
            if revocations.is_revoked(version.token_type(), &assertion.id) {
                return Err(Error::RevokedAssertion(assertion.id));
            }
        }
        if let Some(expected) = &self.audience {
            if assertion.audience.as_deref() != Some(expected.as_str()) {
                return Err(Error::InvalidAssertion(format!(
                    "assertion {} is not addressed to {expected}",
                    assertion.id
                )));
            }
        }

        info!(id = %assertion.id, subject = %assertion.subject.name, "Accepted assertion");
        Ok(assertion)
    }

    /// `verify` as a decision: any failure becomes an invalid decision
    /// carrying the reason.
    pub fn evaluate(&self, xml: &str, trust_domain: &str) -> TrustDecision {
        match self.verify(xml, trust_domain) {
            Ok(assertion) => TrustDecision::valid(format!("Assertion {} accepted", assertion.id)),
            Err(e) => {
                warn!(error = %e, "Rejected assertion");
                TrustDecision::invalid(e.to_string())
            }
        }
    }
}
