//! Security Token Service front: routes WS-Trust requests to the provider
//! of the requested token type.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::lifetime::{Clock, SystemClock};
use crate::provider::{
    AttributeProvider, AttributeProviderRegistry, ProtocolContext, Saml11TokenProvider, Saml2TokenProvider,
    SecurityToken, SecurityTokenProvider, Target, TokenProvider, TrustDecision,
};
use crate::revocation::{FileRevocationRegistry, MemoryRevocationRegistry, RevocationRegistry};
use crate::saml::{AssertionCodec, AssertionDialect, detect_version};
use crate::signature::AssertionSigner;
use crate::xml::utils;

/// WS-Trust request types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Issue,
    Renew,
    Cancel,
    Validate,
}

impl RequestType {
    const ALL: [RequestType; 4] = [
        RequestType::Issue,
        RequestType::Renew,
        RequestType::Cancel,
        RequestType::Validate,
    ];

    pub fn uri(self) -> &'static str {
        match self {
            RequestType::Issue => "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Issue",
            RequestType::Renew => "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Renew",
            RequestType::Cancel => "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Cancel",
            RequestType::Validate => "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Validate",
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|request| request.uri() == uri)
    }

    fn target(self) -> Option<Target> {
        match self {
            RequestType::Issue => None,
            RequestType::Renew => Some(Target::Renew),
            RequestType::Cancel => Some(Target::Cancel),
            RequestType::Validate => Some(Target::Validate),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StsResponse {
    Token(SecurityToken),
    Canceled,
    Status(TrustDecision),
}

/// Token providers keyed by the token types they handle.
pub struct SecurityTokenService {
    providers: Vec<Arc<dyn SecurityTokenProvider>>,
    revocations: Arc<dyn RevocationRegistry>,
}

impl SecurityTokenService {
    pub fn new(revocations: Arc<dyn RevocationRegistry>) -> Self {
        Self {
            providers: Vec::new(),
            revocations,
        }
    }

    /// Service with a SAML 2.0 and a SAML 1.1 provider built from
    /// configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::from_config_with_clock(config, Arc::new(SystemClock))
    }

    pub fn from_config_with_clock(config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let sts = &config.sts;
        let revocations: Arc<dyn RevocationRegistry> = match &sts.revocation_file {
            Some(path) => Arc::new(FileRevocationRegistry::open(path)?),
            None => Arc::new(MemoryRevocationRegistry::new()),
        };
        let signer = sts
            .signing
            .as_ref()
            .map(|signing| -> Result<AssertionSigner> {
                let credential = signing.load_credential()?;
                Ok(AssertionSigner::new(credential).with_algorithm(signing.signature_algorithm()?))
            })
            .transpose()?;
        let attribute_provider = sts
            .attribute_provider
            .as_deref()
            .map(|name| AttributeProviderRegistry::default().create(name, &sts.attribute_options))
            .transpose()?;

        let mut service = Self::new(revocations.clone());
        service.register(Arc::new(configure(
            Saml2TokenProvider::new(sts.issuer.clone(), revocations.clone()),
            config,
            clock.clone(),
            signer.clone(),
            attribute_provider.clone(),
        )?));
        service.register(Arc::new(configure(
            Saml11TokenProvider::new(sts.issuer.clone(), revocations),
            config,
            clock,
            signer.clone(),
            attribute_provider,
        )?));
        info!(
            issuer = %sts.issuer,
            signed = signer.is_some(),
            "Security token service ready"
        );
        Ok(service)
    }

    pub fn register(&mut self, provider: Arc<dyn SecurityTokenProvider>) {
        debug!(token_type = provider.token_type(), "Registered token provider");
        self.providers.push(provider);
    }

    pub fn revocations(&self) -> &Arc<dyn RevocationRegistry> {
        &self.revocations
    }

    pub fn provider_for(&self, token_type: &str) -> Option<&Arc<dyn SecurityTokenProvider>> {
        self.providers.iter().find(|provider| provider.supports(token_type))
    }

    pub fn token_types(&self) -> Vec<&'static str> {
        self.providers.iter().map(|provider| provider.token_type()).collect()
    }

    /// Dispatches a request. Without an explicit token type, renew, cancel
    /// and validate requests go to the provider matching the namespace of
    /// the target assertion.
    pub fn handle(&self, request: RequestType, context: &ProtocolContext) -> Result<StsResponse> {
        let provider = self.resolve(request, context)?;
        debug!(request = request.uri(), token_type = provider.token_type(), "Dispatching request");
        Ok(match request {
            RequestType::Issue => StsResponse::Token(provider.issue_token(context)?),
            RequestType::Renew => StsResponse::Token(provider.renew_token(context)?),
            RequestType::Cancel => {
                provider.cancel_token(context)?;
                StsResponse::Canceled
            }
            RequestType::Validate => StsResponse::Status(provider.validate_token(context)?),
        })
    }

    pub fn issue(&self, context: &ProtocolContext) -> Result<SecurityToken> {
        self.resolve(RequestType::Issue, context)?.issue_token(context)
    }

    pub fn renew(&self, context: &ProtocolContext) -> Result<SecurityToken> {
        self.resolve(RequestType::Renew, context)?.renew_token(context)
    }

    pub fn cancel(&self, context: &ProtocolContext) -> Result<()> {
        self.resolve(RequestType::Cancel, context)?.cancel_token(context)
    }

    pub fn validate(&self, context: &ProtocolContext) -> Result<TrustDecision> {
        self.resolve(RequestType::Validate, context)?.validate_token(context)
    }

    fn resolve(
        &self,
        request: RequestType,
        context: &ProtocolContext,
    ) -> Result<&Arc<dyn SecurityTokenProvider>> {
        if let Some(token_type) = &context.token_type {
            return self
                .provider_for(token_type)
                .ok_or_else(|| Error::UnsupportedTokenType(token_type.clone()));
        }

        let kind = request.target().ok_or(Error::MissingTokenType)?;
        let target = context.target(kind).ok_or_else(|| {
            Error::MalformedInput(format!("request has no {}", kind.local_name()))
        })?;
        let assertion = utils::first_child_element(target)
            .map_err(|e| Error::InvalidAssertion(e.to_string()))?
            .ok_or_else(|| Error::InvalidAssertion("target element is empty".into()))?;
        let version = detect_version(&assertion)?;
        self.providers
            .iter()
            .find(|provider| provider.version() == version)
            .ok_or_else(|| Error::UnsupportedTokenType(version.token_type().to_string()))
    }
}

fn configure<D: AssertionDialect>(
    provider: TokenProvider<D>,
    config: &Config,
    clock: Arc<dyn Clock>,
    signer: Option<AssertionSigner>,
    attribute_provider: Option<Arc<dyn AttributeProvider>>,
) -> Result<TokenProvider<D>> {
    let mut provider = provider
        .with_default_lifetime(config.sts.token_lifetime()?)
        .with_clock(clock)
        .with_clock_skew(config.sts.clock_skew()?)
        .with_codec(AssertionCodec::new(config.sts.codec_options()));
    if let Some(signer) = signer {
        provider = provider.with_signer(signer);
    }
    if let Some(attribute_provider) = attribute_provider {
        provider = provider.with_attribute_provider(attribute_provider);
    }
    Ok(provider)
}

impl fmt::Debug for SecurityTokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityTokenService")
            .field("token_types", &self.token_types())
            .finish_non_exhaustive()
    }
}
