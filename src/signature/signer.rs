use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use openssl::x509::X509Ref;
use tracing::debug;

use crate::crypto::{SignatureAlg, SigningCredential};
use crate::error::Result;
use crate::saml::{Assertion, AssertionCodec};
use crate::saml::dsig::{
    Algorithm, CanonicalizationMethod, KeyInfo, Reference, Signature, SignedInfo, Transform,
    Transforms, algorithms,
};
use crate::xml::{self, XmlConfig, ns};

/// Produces enveloped signatures with the configured credential.
///
/// The signature covers the whole assertion through a `#<id>` reference,
/// transformed with enveloped-signature and exclusive C14N, and embeds the
/// signer certificate in `KeyInfo`.
#[derive(Debug, Clone)]
pub struct AssertionSigner {
    credential: SigningCredential,
    algorithm: SignatureAlg,
}

impl AssertionSigner {
    pub fn new(credential: SigningCredential) -> Self {
        Self {
            credential,
            algorithm: SignatureAlg::default(),
        }
    }

    pub fn with_algorithm(mut self, algorithm: SignatureAlg) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn algorithm(&self) -> SignatureAlg {
        self.algorithm
    }

    pub fn certificate(&self) -> &X509Ref {
        self.credential.certificate()
    }

    /// Signs `assertion` in place, replacing any previous signature.
    pub fn sign(&self, assertion: &mut Assertion, codec: &AssertionCodec) -> Result<()> {
        assertion.signature = None;
        let hash = self.algorithm.hash_alg();

        let unsigned = codec.encode(assertion)?;
        let digest = hash.hash(xml::canonicalize(&unsigned, None)?)?;

        let signed_info = SignedInfo {
            canon_method: CanonicalizationMethod::new(algorithms::EXCLUSIVE_C14N),
            signature_method: Algorithm::new(self.algorithm.uri()),
            references: vec![Reference {
                uri: format!("#{}", assertion.id),
                transforms: Some(Transforms {
                    transform: vec![
                        Transform::new(algorithms::ENVELOPED_SIGNATURE),
                        Transform::new(algorithms::EXCLUSIVE_C14N),
                    ],
                }),
                digest_method: Algorithm::new(hash.uri()),
                digest_value: STANDARD.encode(digest),
            }],
        };

        let config = XmlConfig::new().namespace("ds", ns::DSIG);
        let signed_info_xml = xml::to_string_with_root(&config, "ds:SignedInfo", &signed_info)?;
        let canonical = xml::canonicalize(&signed_info_xml, None)?;
        let signature_value = self.credential.sign(canonical.as_bytes(), self.algorithm)?;

        assertion.signature = Some(Signature {
            signed_info,
            signature_value: STANDARD.encode(signature_value),
            key_info: Some(KeyInfo::from_certificate(
                STANDARD.encode(self.credential.certificate_der()?),
            )),
        });
        debug!(id = %assertion.id, algorithm = self.algorithm.uri(), "Signed assertion");
        Ok(())
    }
}
