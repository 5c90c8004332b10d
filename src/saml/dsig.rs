//! XML-DSig elements as they appear inside assertions.

use serde::{Deserialize, Serialize};

pub mod algorithms {
    pub const EXCLUSIVE_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
    pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(rename(serialize = "ds:SignedInfo", deserialize = "SignedInfo"))]
    pub signed_info: SignedInfo,
    #[serde(rename(serialize = "ds:SignatureValue", deserialize = "SignatureValue"))]
    pub signature_value: String,
    #[serde(
        rename(serialize = "ds:KeyInfo", deserialize = "KeyInfo"),
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub key_info: Option<KeyInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedInfo {
    #[serde(rename(
        serialize = "ds:CanonicalizationMethod",
        deserialize = "CanonicalizationMethod"
    ))]
    pub canon_method: CanonicalizationMethod,
    #[serde(rename(serialize = "ds:SignatureMethod", deserialize = "SignatureMethod"))]
    pub signature_method: Algorithm,
    #[serde(rename(serialize = "ds:Reference", deserialize = "Reference"), default)]
    pub references: Vec<Reference>,
}

/// Element carrying only an `Algorithm` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Algorithm {
    #[serde(rename = "@Algorithm")]
    pub algorithm: String,
}

impl Algorithm {
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "@URI", default)]
    pub uri: String,
    #[serde(
        rename(serialize = "ds:Transforms", deserialize = "Transforms"),
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub transforms: Option<Transforms>,
    #[serde(rename(serialize = "ds:DigestMethod", deserialize = "DigestMethod"))]
    pub digest_method: Algorithm,
    #[serde(rename(serialize = "ds:DigestValue", deserialize = "DigestValue"))]
    pub digest_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transforms {
    #[serde(rename(serialize = "ds:Transform", deserialize = "Transform"), default)]
    pub transform: Vec<Transform>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transform {
    #[serde(rename = "@Algorithm")]
    pub algorithm: String,
    #[serde(
        rename(serialize = "ec:InclusiveNamespaces", deserialize = "InclusiveNamespaces"),
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub inclusive_namespaces: Option<InclusiveNamespaces>,
}

impl Transform {
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            inclusive_namespaces: None,
        }
    }
}

/// `ds:CanonicalizationMethod` has the same shape as a transform: an
/// algorithm plus an optional exclusive C14N prefix list.
pub type CanonicalizationMethod = Transform;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusiveNamespaces {
    #[serde(rename = "@xmlns:ec", default = "exc_c14n_namespace")]
    pub xmlns: String,
    #[serde(rename = "@PrefixList", default)]
    pub prefix_list: String,
}

impl InclusiveNamespaces {
    pub fn prefixes(&self) -> Vec<&str> {
        self.prefix_list.split_whitespace().collect()
    }
}

fn exc_c14n_namespace() -> String {
    algorithms::EXCLUSIVE_C14N.to_string()
}

/// Key material: a certificate for signatures and X.509 proof keys, or a
/// bare RSA key value for raw proof keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct KeyInfo {
    #[serde(
        rename(serialize = "ds:KeyValue", deserialize = "KeyValue"),
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub key_value: Option<KeyValue>,
    #[serde(
        rename(serialize = "ds:X509Data", deserialize = "X509Data"),
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub x509_data: Option<X509Data>,
}

impl KeyInfo {
    /// Key info embedding a base64 DER certificate.
    pub fn from_certificate(certificate_b64: impl Into<String>) -> Self {
        Self {
            key_value: None,
            x509_data: Some(X509Data {
                certificates: vec![certificate_b64.into()],
            }),
        }
    }

    /// First embedded certificate, still base64 encoded.
    pub fn certificate(&self) -> Option<&str> {
        self.x509_data
            .as_ref()
            .and_then(|data| data.certificates.first())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct X509Data {
    #[serde(
        rename(serialize = "ds:X509Certificate", deserialize = "X509Certificate"),
        default
    )]
    pub certificates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    #[serde(rename(serialize = "ds:RSAKeyValue", deserialize = "RSAKeyValue"))]
    pub rsa_key_value: RsaKeyValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsaKeyValue {
    #[serde(rename(serialize = "ds:Modulus", deserialize = "Modulus"))]
    pub modulus: String,
    #[serde(rename(serialize = "ds:Exponent", deserialize = "Exponent"))]
    pub exponent: String,
}
