//! Choice of the subject confirmation method for an issued assertion.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use openssl::pkey::{Id, PKey};
use openssl::x509::X509;
use tracing::debug;

use crate::crypto::rsa;
use crate::error::{Error, Result};
use crate::saml::ConfirmationMethod;
use crate::saml::dsig::{KeyInfo, KeyValue, RsaKeyValue};

/// Authenticated identity a request is made by, or on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal {
    name: String,
}

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Proof-of-possession key supplied with a request, DER encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKeyRef {
    /// X.509 certificate.
    Certificate(Vec<u8>),
    /// `SubjectPublicKeyInfo` of a bare public key.
    PublicKey(Vec<u8>),
}

/// Outcome of the selection: the method plus the subject it binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub method: ConfirmationMethod,
    pub subject_name: String,
    /// Embedded proof key, set only for holder-of-key.
    pub key_info: Option<KeyInfo>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfirmationMethodSelector;

impl ConfirmationMethodSelector {
    /// Subject name used when a bearer token is requested without a caller.
    pub const ANONYMOUS: &'static str = "ANONYMOUS";

    /// Picks exactly one method. On-behalf-of wins over a proof key, which
    /// wins over bearer.
    pub fn select(
        caller: Option<&Principal>,
        on_behalf_of: Option<&Principal>,
        proof_key: Option<&PublicKeyRef>,
    ) -> Result<Confirmation> {
        let confirmation = if let Some(principal) = on_behalf_of {
            Confirmation {
                method: ConfirmationMethod::SenderVouches,
                subject_name: principal.name().to_string(),
                key_info: None,
            }
        } else if let Some(key) = proof_key {
            Confirmation {
                method: ConfirmationMethod::HolderOfKey,
                subject_name: caller
                    .map(|principal| principal.name().to_string())
                    .unwrap_or_else(|| Self::ANONYMOUS.to_string()),
                key_info: Some(key_info_for(key)?),
            }
        } else {
            Confirmation {
                method: ConfirmationMethod::Bearer,
                subject_name: caller
                    .map(|principal| principal.name().to_string())
                    .unwrap_or_else(|| Self::ANONYMOUS.to_string()),
                key_info: None,
            }
        };
        debug!(method = ?confirmation.method, subject = %confirmation.subject_name, "Selected subject confirmation");
        Ok(confirmation)
    }
}

fn key_info_for(key: &PublicKeyRef) -> Result<KeyInfo> {
    match key {
        PublicKeyRef::Certificate(der) => {
            X509::from_der(der).map_err(|e| {
                Error::UnsupportedConfirmation(format!("proof certificate is not valid DER: {e}"))
            })?;
            Ok(KeyInfo::from_certificate(STANDARD.encode(der)))
        }
        PublicKeyRef::PublicKey(der) => {
            let key = PKey::public_key_from_der(der).map_err(|e| {
                Error::UnsupportedConfirmation(format!("proof key is not valid DER: {e}"))
            })?;
            if key.id() != Id::RSA {
                return Err(Error::UnsupportedConfirmation(format!(
                    "holder-of-key with a {:?} key is not supported",
                    key.id()
                )));
            }
            let (modulus, exponent) = rsa::public_components(&key)?;
            Ok(KeyInfo {
                key_value: Some(KeyValue {
                    rsa_key_value: RsaKeyValue {
                        modulus: STANDARD.encode(modulus),
                        exponent: STANDARD.encode(exponent),
                    },
                }),
                x509_data: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::rsa::{RsaKeySize, generate_key};
    use crate::pki::cert_utils::{CertificateParams, generate_self_signed};

    #[test]
    fn test_on_behalf_of_takes_precedence() {
        let caller = Principal::new("service");
        let user = Principal::new("alice");
        let key = PublicKeyRef::Certificate(vec![1, 2, 3]);

        let confirmation =
            ConfirmationMethodSelector::select(Some(&caller), Some(&user), Some(&key)).unwrap();
        assert_eq!(confirmation.method, ConfirmationMethod::SenderVouches);
        assert_eq!(confirmation.subject_name, "alice");
        assert!(confirmation.key_info.is_none());
    }

    #[test]
    fn test_bearer_defaults_to_anonymous() {
        let confirmation = ConfirmationMethodSelector::select(None, None, None).unwrap();
        assert_eq!(confirmation.method, ConfirmationMethod::Bearer);
        assert_eq!(confirmation.subject_name, ConfirmationMethodSelector::ANONYMOUS);

        let bob = Principal::new("bob");
        let confirmation = ConfirmationMethodSelector::select(Some(&bob), None, None).unwrap();
        assert_eq!(confirmation.subject_name, "bob");
    }

    #[test]
    fn test_holder_of_key_with_certificate() {
        let (cert, _) = generate_self_signed(&CertificateParams::leaf("alice")).unwrap();
        let der = cert.to_der().unwrap();
        let caller = Principal::new("alice");

        let confirmation = ConfirmationMethodSelector::select(
            Some(&caller),
            None,
            Some(&PublicKeyRef::Certificate(der.clone())),
        )
        .unwrap();
        assert_eq!(confirmation.method, ConfirmationMethod::HolderOfKey);
        let key_info = confirmation.key_info.unwrap();
        assert_eq!(key_info.certificate(), Some(STANDARD.encode(&der).as_str()));
    }

    #[test]
    fn test_holder_of_key_with_rsa_key() {
        let key = generate_key(RsaKeySize::Rsa2048).unwrap();
        let der = key.public_key_to_der().unwrap();

        let confirmation =
            ConfirmationMethodSelector::select(None, None, Some(&PublicKeyRef::PublicKey(der)))
                .unwrap();
        let value = confirmation.key_info.unwrap().key_value.unwrap().rsa_key_value;
        assert_eq!(value.exponent, "AQAB");
        assert_eq!(STANDARD.decode(value.modulus).unwrap(), key.rsa().unwrap().n().to_vec());
    }

    #[test]
    fn test_unsupported_key_fails_early() {
        let group =
            openssl::ec::EcGroup::from_curve_name(openssl::nid::Nid::X9_62_PRIME256V1).unwrap();
        let ec = PKey::from_ec_key(openssl::ec::EcKey::generate(&group).unwrap()).unwrap();
        let der = ec.public_key_to_der().unwrap();

        let result = ConfirmationMethodSelector::select(None, None, Some(&PublicKeyRef::PublicKey(der)));
        assert!(matches!(result, Err(Error::UnsupportedConfirmation(_))));

        let result =
            ConfirmationMethodSelector::select(None, None, Some(&PublicKeyRef::Certificate(vec![0])));
        assert!(matches!(result, Err(Error::UnsupportedConfirmation(_))));
    }
}
