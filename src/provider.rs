//! The token lifecycle engine, written once over an assertion dialect.

pub mod attributes;
mod decision;
mod request;

pub use attributes::{AttributeProvider, AttributeProviderRegistry};
pub use decision::{StatusCode, TrustDecision};
pub use request::{AttachedReference, ProtocolContext, SecurityToken, Target};

use chrono::Duration;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::confirmation::{ConfirmationMethodSelector, Principal};
use crate::error::{Error, Result};
use crate::lifetime::{Clock, LifetimeCalculator};
use crate::revocation::RevocationRegistry;
use crate::saml::{
    Assertion, AssertionCodec, AssertionDialect, AttributeStatement, AuthnStatement, Saml2,
    Saml11, SamlVersion, Subject,
};
use crate::signature::{AssertionSigner, SignatureVerifier};
use crate::xml::utils;

pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::seconds(7200);
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::milliseconds(2000);

/// Object-safe view of a token provider, used to dispatch requests by
/// token type.
pub trait SecurityTokenProvider: Send + Sync + fmt::Debug {
    fn token_type(&self) -> &'static str;

    fn version(&self) -> SamlVersion;

    /// Whether requests for `token_type` are handled by this provider.
    fn supports(&self, token_type: &str) -> bool;

    fn issue_token(&self, context: &ProtocolContext) -> Result<SecurityToken>;

    fn renew_token(&self, context: &ProtocolContext) -> Result<SecurityToken>;

    fn cancel_token(&self, context: &ProtocolContext) -> Result<()>;

    fn validate_token(&self, context: &ProtocolContext) -> Result<TrustDecision>;
}

/// Issues, renews, cancels and validates assertions of dialect `D`.
pub struct TokenProvider<D: AssertionDialect> {
    issuer: String,
    codec: AssertionCodec,
    lifetimes: LifetimeCalculator,
    clock_skew: Duration,
    revocations: Arc<dyn RevocationRegistry>,
    signer: Option<AssertionSigner>,
    verifier: SignatureVerifier,
    attribute_provider: Option<Arc<dyn AttributeProvider>>,
    dialect: PhantomData<D>,
}

pub type Saml2TokenProvider = TokenProvider<Saml2>;
pub type Saml11TokenProvider = TokenProvider<Saml11>;

impl<D: AssertionDialect> TokenProvider<D> {
    pub fn new(issuer: impl Into<String>, revocations: Arc<dyn RevocationRegistry>) -> Self {
        Self {
            issuer: issuer.into(),
            codec: AssertionCodec::default(),
            lifetimes: LifetimeCalculator::new(DEFAULT_TOKEN_LIFETIME),
            clock_skew: DEFAULT_CLOCK_SKEW,
            revocations,
            signer: None,
            verifier: SignatureVerifier::new(),
            attribute_provider: None,
            dialect: PhantomData,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.lifetimes = self.lifetimes.with_clock(clock);
        self
    }

    pub fn with_default_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetimes = LifetimeCalculator::new(lifetime).with_clock(self.lifetimes.clock());
        self
    }

    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    pub fn with_signer(mut self, signer: AssertionSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_attribute_provider(mut self, provider: Arc<dyn AttributeProvider>) -> Self {
        self.attribute_provider = Some(provider);
        self
    }

    pub fn with_codec(mut self, codec: AssertionCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn codec(&self) -> &AssertionCodec {
        &self.codec
    }

    pub fn lifetimes(&self) -> &LifetimeCalculator {
        &self.lifetimes
    }

    /// Token type URI, which also names the revocation family.
    pub fn family(&self) -> &'static str {
        D::TOKEN_TYPE
    }

    /// Requests may name the token type by its profile URI or by the
    /// assertion namespace.
    pub fn supports(&self, token_type: &str) -> bool {
        token_type == D::TOKEN_TYPE || token_type == D::NAMESPACE
    }

    pub fn issue_token(&self, context: &ProtocolContext) -> Result<SecurityToken> {
        let token_type = context.token_type.as_deref().ok_or(Error::MissingTokenType)?;
        if !self.supports(token_type) {
            return Err(Error::UnsupportedTokenType(token_type.to_string()));
        }

        let lifetime = self.lifetimes.compute_lifetime(context.lifetime, self.clock_skew)?;
        let confirmation = ConfirmationMethodSelector::select(
            context.caller.as_ref(),
            context.on_behalf_of.as_ref(),
            context.proof_key.as_ref(),
        )?;

        let attributes = match &self.attribute_provider {
            Some(provider) => {
                let principal = Principal::new(confirmation.subject_name.as_str());
                provider.attributes(&principal, &context.claimed_attributes)
            }
            None => context.claimed_attributes.clone(),
        };
        let attribute_statements = if attributes.is_empty() {
            Vec::new()
        } else {
            vec![AttributeStatement { attributes }]
        };

        let now = self.lifetimes.now();
        let assertion = Assertion {
            version: D::VERSION,
            id: new_assertion_id(),
            issue_instant: now,
            issuer: context.issuer.clone().unwrap_or_else(|| self.issuer.clone()),
            subject: Subject {
                name: confirmation.subject_name,
                confirmation: confirmation.method,
                key_info: confirmation.key_info,
            },
            validity: lifetime.into(),
            audience: context.applies_to.clone(),
            authn_statement: Some(AuthnStatement {
                instant: now,
                method: D::DEFAULT_AUTHN_METHOD.to_string(),
            }),
            attribute_statements,
            signature: None,
        };

        let token = self.finish(assertion)?;
        info!(
            id = %token.id,
            version = %D::VERSION,
            expires = %lifetime.expires(),
            "Issued assertion"
        );
        Ok(token)
    }

    pub fn renew_token(&self, context: &ProtocolContext) -> Result<SecurityToken> {
        let (xml, previous) = self.locate(context, Target::Renew)?;
        if self.revocations.is_revoked(self.family(), &previous.id) {
            warn!(id = %previous.id, "Refused to renew a revoked assertion");
            return Err(Error::RevokedAssertion(previous.id));
        }
        self.check_own_signature(&xml, &previous.id)?;

        let lifetime = self.lifetimes.compute_lifetime(context.lifetime, self.clock_skew)?;
        let renewed = Assertion {
            id: new_assertion_id(),
            issue_instant: self.lifetimes.now(),
            validity: lifetime.into(),
            signature: None,
            ..previous.clone()
        };

        let token = self.finish(renewed)?;
        info!(previous = %previous.id, id = %token.id, expires = %lifetime.expires(), "Renewed assertion");
        Ok(token)
    }

    pub fn cancel_token(&self, context: &ProtocolContext) -> Result<()> {
        let (xml, assertion) = self.locate(context, Target::Cancel)?;
        self.check_own_signature(&xml, &assertion.id)?;

        if self.revocations.revoke(self.family(), &assertion.id)? {
            info!(id = %assertion.id, "Canceled assertion");
        } else {
            debug!(id = %assertion.id, "Assertion was already canceled");
        }
        Ok(())
    }

    /// Validation never fails on a bad token: it answers with an invalid
    /// decision instead. Only a request without a validate target is an
    /// error.
    pub fn validate_token(&self, context: &ProtocolContext) -> Result<TrustDecision> {
        let target = context
            .target(Target::Validate)
            .ok_or_else(|| Error::MalformedInput("request has no validate target".into()))?;

        let decision = match self.evaluate(target) {
            Ok(()) => TrustDecision::valid("Validated"),
            Err(reason) => TrustDecision::invalid(reason),
        };
        debug!(%decision, "Validated assertion");
        Ok(decision)
    }

    fn evaluate(&self, target: &str) -> std::result::Result<(), String> {
        let (xml, assertion) = self
            .extract(target)
            .map_err(|e| format!("Validation failure: type mismatch ({e})"))?;

        self.check_own_signature(&xml, &assertion.id)
            .map_err(|e| format!("Validation failure: {e}"))?;
        if self.revocations.is_revoked(self.family(), &assertion.id) {
            return Err(format!("Validation failure: assertion {} has been canceled", assertion.id));
        }
        let lifetime = assertion
            .lifetime()
            .map_err(|e| format!("Validation failure: {e}"))?;
        if self.lifetimes.is_expired(&lifetime, self.clock_skew) {
            return Err(format!("Validation failure: assertion {} has expired", assertion.id));
        }
        Ok(())
    }

    /// Target of `kind` from the context, with its assertion decoded.
    fn locate(&self, context: &ProtocolContext, kind: Target) -> Result<(String, Assertion)> {
        let target = context.target(kind).ok_or_else(|| {
            Error::MalformedInput(format!("request has no {}", kind.local_name()))
        })?;
        self.extract(target)
    }

    fn extract(&self, target: &str) -> Result<(String, Assertion)> {
        let xml = utils::first_child_element(target)
            .map_err(|e| Error::InvalidAssertion(e.to_string()))?
            .ok_or_else(|| Error::InvalidAssertion("target element is empty".into()))?;
        let root = utils::root_name(&xml)?;
        if !root.matches(D::NAMESPACE, D::ELEMENT_LOCAL_NAME) {
            return Err(Error::InvalidAssertion(format!(
                "expected a SAML {} assertion, found {root}",
                D::VERSION
            )));
        }
        let assertion = self.codec.decode(&xml, D::VERSION)?;
        Ok((xml, assertion))
    }

    fn check_own_signature(&self, xml: &str, id: &str) -> Result<()> {
        let Some(signer) = &self.signer else {
            return Ok(());
        };
        self.verifier.verify(xml, signer.certificate()).inspect_err(|e| {
            warn!(%id, error = %e, "Assertion is not signed by this provider");
        })
    }

    fn finish(&self, mut assertion: Assertion) -> Result<SecurityToken> {
        if let Some(signer) = &self.signer {
            signer.sign(&mut assertion, &self.codec)?;
        }
        let content = self.codec.encode(&assertion)?;
        Ok(SecurityToken {
            token_type: D::TOKEN_TYPE.to_string(),
            content,
            attached_reference: AttachedReference {
                value_type: D::KEY_IDENTIFIER_VALUE_TYPE.to_string(),
                token_type: D::TOKEN_TYPE.to_string(),
                key_identifier: assertion.id.clone(),
            },
            id: assertion.id,
        })
    }
}

fn new_assertion_id() -> String {
    format!("ID_{}", Uuid::new_v4())
}

impl<D: AssertionDialect> fmt::Debug for TokenProvider<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenProvider")
            .field("version", &D::VERSION)
            .field("issuer", &self.issuer)
            .field("signed", &self.signer.is_some())
            .field("attribute_provider", &self.attribute_provider)
            .finish_non_exhaustive()
    }
}

impl<D: AssertionDialect> SecurityTokenProvider for TokenProvider<D> {
    fn token_type(&self) -> &'static str {
        D::TOKEN_TYPE
    }

    fn version(&self) -> SamlVersion {
        D::VERSION
    }

    fn supports(&self, token_type: &str) -> bool {
        TokenProvider::supports(self, token_type)
    }

    fn issue_token(&self, context: &ProtocolContext) -> Result<SecurityToken> {
        TokenProvider::issue_token(self, context)
    }

    fn renew_token(&self, context: &ProtocolContext) -> Result<SecurityToken> {
        TokenProvider::renew_token(self, context)
    }

    fn cancel_token(&self, context: &ProtocolContext) -> Result<()> {
        TokenProvider::cancel_token(self, context)
    }

    fn validate_token(&self, context: &ProtocolContext) -> Result<TrustDecision> {
        TokenProvider::validate_token(self, context)
    }
}
