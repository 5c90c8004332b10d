use crate::crypto::errors::{CryptoResult, Error};
use crate::crypto::{SignatureAlg, rsa};
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509, X509Ref};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::path::Path;

/// Private key and certificate used to sign issued assertions.
#[derive(Clone)]
pub struct SigningCredential {
    key: PKey<Private>,
    certificate: X509,
}

impl SigningCredential {
    /// Pair a key with its certificate. The certificate must carry the
    /// key's public half.
    pub fn new(key: PKey<Private>, certificate: X509) -> CryptoResult<Self> {
        if !certificate.public_key()?.public_eq(&key) {
            return Err(Error::Invalid(
                "certificate public key does not match the signing key".into(),
            ));
        }
        Ok(Self { key, certificate })
    }

    /// Load from PEM encoded key and certificate, decrypting the key with
    /// `password` when one is given.
    pub fn from_pem(
        key_pem: &[u8],
        cert_pem: &[u8],
        password: Option<&SecretString>,
    ) -> CryptoResult<Self> {
        let key = match password {
            Some(password) => PKey::private_key_from_pem_passphrase(
                key_pem,
                password.expose_secret().as_bytes(),
            )?,
            None => PKey::private_key_from_pem(key_pem)?,
        };
        let certificate = X509::from_pem(cert_pem)?;
        Self::new(key, certificate)
    }

    pub fn from_files(
        key_path: impl AsRef<Path>,
        cert_path: impl AsRef<Path>,
        password: Option<&SecretString>,
    ) -> CryptoResult<Self> {
        let key_pem = std::fs::read(key_path)?;
        let cert_pem = std::fs::read(cert_path)?;
        Self::from_pem(&key_pem, &cert_pem, password)
    }

    pub fn certificate(&self) -> &X509Ref {
        &self.certificate
    }

    pub fn certificate_der(&self) -> CryptoResult<Vec<u8>> {
        Ok(self.certificate.to_der()?)
    }

    pub fn sign(&self, data: &[u8], algorithm: SignatureAlg) -> CryptoResult<Vec<u8>> {
        rsa::sign(&self.key, algorithm.hash_alg(), data)
    }
}

impl fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subject = self
            .certificate
            .subject_name()
            .entries()
            .filter_map(|entry| entry.data().as_utf8().ok().map(|s| s.to_string()))
            .collect::<Vec<_>>()
            .join(",");
        f.debug_struct("SigningCredential")
            .field("subject", &subject)
            .finish_non_exhaustive()
    }
}
