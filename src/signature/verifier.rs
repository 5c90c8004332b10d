use openssl::x509::{X509, X509Ref};
use tracing::{debug, warn};

use super::decode_base64;
use crate::crypto::{HashAlg, SignatureAlg, rsa};
use crate::error::{Error, Result};
use crate::saml::detect_version;
use crate::saml::dsig::{Signature, algorithms};
use crate::xml::{self, ns, utils};

/// Checks enveloped signatures on assertion documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureVerifier;

impl SignatureVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Certificate embedded in the assertion's own signature.
    pub fn extract_signer_certificate(&self, xml: &str) -> Result<X509> {
        let signature = parse_signature(xml)?;
        let encoded = signature
            .key_info
            .as_ref()
            .and_then(|key_info| key_info.certificate())
            .ok_or(Error::NoEmbeddedCertificate)?;
        let der = decode_base64(encoded, "X509Certificate")?;
        X509::from_der(&der).map_err(|e| {
            Error::InvalidSignature(format!("embedded certificate is not valid DER: {e}"))
        })
    }

    /// Whether the assertion's signature was made by `certificate` over
    /// this exact content.
    ///
    /// A digest or signature mismatch yields `false`. A missing or
    /// structurally broken signature is an error.
    pub fn verify_signature(&self, xml: &str, certificate: &X509Ref) -> Result<bool> {
        let signature_xml = signature_element(xml)?;
        let signature = parse_element::<Signature>(&signature_xml)?;
        let signed_info = &signature.signed_info;

        if signed_info.canon_method.algorithm != algorithms::EXCLUSIVE_C14N {
            return Err(Error::InvalidSignature(format!(
                "unsupported canonicalization method {}",
                signed_info.canon_method.algorithm
            )));
        }
        let algorithm = SignatureAlg::from_uri(&signed_info.signature_method.algorithm)
            .ok_or_else(|| {
                Error::InvalidSignature(format!(
                    "unsupported signature method {}",
                    signed_info.signature_method.algorithm
                ))
            })?;

        let [reference] = signed_info.references.as_slice() else {
            return Err(Error::InvalidSignature(format!(
                "expected exactly one reference, found {}",
                signed_info.references.len()
            )));
        };
        let id = assertion_id(xml)?;
        if reference.uri.strip_prefix('#') != Some(id.as_str()) {
            return Err(Error::InvalidSignature(format!(
                "reference {} does not target assertion {id}",
                reference.uri
            )));
        }

        let mut inclusive_prefixes = None;
        for transform in reference.transforms.iter().flat_map(|t| t.transform.iter()) {
            match transform.algorithm.as_str() {
                algorithms::ENVELOPED_SIGNATURE => {}
                algorithms::EXCLUSIVE_C14N => {
                    inclusive_prefixes = transform
                        .inclusive_namespaces
                        .as_ref()
                        .map(|inclusive| inclusive.prefixes());
                }
                other => {
                    return Err(Error::InvalidSignature(format!("unsupported transform {other}")));
                }
            }
        }
        let digest_alg = HashAlg::from_uri(&reference.digest_method.algorithm).ok_or_else(|| {
            Error::InvalidSignature(format!(
                "unsupported digest method {}",
                reference.digest_method.algorithm
            ))
        })?;

        let enveloped = utils::remove_child_element(xml, ns::DSIG, "Signature")?;
        let canonical = xml::canonicalize(&enveloped, inclusive_prefixes.as_deref())?;
        let expected_digest = decode_base64(&reference.digest_value, "DigestValue")?;
        if digest_alg.hash(canonical)? != expected_digest {
            warn!(%id, "Assertion digest mismatch");
            return Ok(false);
        }

        let signed_info_xml = utils::find_child_element(&signature_xml, ns::DSIG, "SignedInfo")?
            .ok_or_else(|| Error::InvalidSignature("Signature has no SignedInfo".into()))?;
        let signed_info_prefixes = signed_info
            .canon_method
            .inclusive_namespaces
            .as_ref()
            .map(|inclusive| inclusive.prefixes());
        let canonical_signed_info =
            xml::canonicalize(&signed_info_xml, signed_info_prefixes.as_deref())?;
        let signature_value = decode_base64(&signature.signature_value, "SignatureValue")?;
        let public_key = certificate.public_key().map_err(crate::crypto::Error::from)?;

        let valid = rsa::verify(
            &public_key,
            algorithm.hash_alg(),
            canonical_signed_info.as_bytes(),
            &signature_value,
        )?;
        if valid {
            debug!(%id, "Assertion signature verified");
        } else {
            warn!(%id, "Assertion signature value mismatch");
        }
        Ok(valid)
    }

    /// `verify_signature` as a hard check.
    pub fn verify(&self, xml: &str, certificate: &X509Ref) -> Result<()> {
        if self.verify_signature(xml, certificate)? {
            Ok(())
        } else {
            Err(Error::InvalidSignature(
                "signature does not match the assertion content".into(),
            ))
        }
    }
}

fn signature_element(xml: &str) -> Result<String> {
    utils::find_child_element(xml, ns::DSIG, "Signature")?
        .ok_or_else(|| Error::InvalidSignature("assertion is not signed".into()))
}

fn parse_signature(xml: &str) -> Result<Signature> {
    parse_element(&signature_element(xml)?)
}

fn parse_element<T: serde::de::DeserializeOwned>(xml: &str) -> Result<T> {
    xml::from_str(xml).map_err(|e| Error::InvalidSignature(format!("malformed signature: {e}")))
}

fn assertion_id(xml: &str) -> Result<String> {
    let version = detect_version(xml)?;
    utils::root_attribute(xml, version.id_attribute())?
        .ok_or_else(|| Error::InvalidSignature(format!("assertion has no {} attribute", version.id_attribute())))
}
