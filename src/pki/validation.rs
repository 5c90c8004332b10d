use std::sync::Arc;

use openssl::asn1::Asn1Time;
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::verify::X509VerifyFlags;
use openssl::x509::{CrlStatus, X509, X509Crl, X509Ref, X509StoreContext};
use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::lifetime::{Clock, SystemClock};
use crate::pki::truststore::{TrustStore, TrustStoreError};

/// Decides whether a signer certificate chains to a trusted anchor and is
/// currently within its validity window.
#[derive(Debug, Clone)]
pub struct TrustPathValidator {
    revocation_checking: bool,
    clock: Arc<dyn Clock>,
}

impl Default for TrustPathValidator {
    fn default() -> Self {
        Self::new(false)
    }
}

impl TrustPathValidator {
    pub fn new(revocation_checking: bool) -> Self {
        Self {
            revocation_checking,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Path validation followed by the validity check of the certificate
    /// itself.
    ///
    /// Times are evaluated against the validator's clock rather than inside
    /// the path builder, so anchors outside their own window are left out of
    /// the path instead.
    pub fn validate<S: TrustStore>(&self, certificate: &X509Ref, store: &S) -> Result<()> {
        self.validate_path(certificate, store)?;
        self.check_validity(certificate)
    }

    fn validate_path<S: TrustStore>(&self, certificate: &X509Ref, store: &S) -> Result<()> {
        let now = Asn1Time::from_unix(self.clock.now().timestamp() as _).map_err(untrusted)?;

        let mut builder = X509StoreBuilder::new().map_err(untrusted)?;
        let mut anchors = Vec::new();
        for entry in store.iter_all_certificates() {
            let anchor = entry.to_x509().map_err(untrusted)?;
            if !within_window(&anchor, &now).map_err(untrusted)? {
                tracing::warn!("Skipping trust anchor outside its validity window: {}", entry.subject);
                continue;
            }
            builder.add_cert(anchor.clone()).map_err(untrusted)?;
            anchors.push(anchor);
        }
        if anchors.is_empty() {
            return Err(Error::UntrustedCertificate(
                "trust store holds no usable anchors".into(),
            ));
        }
        builder
            .set_flags(X509VerifyFlags::PARTIAL_CHAIN | X509VerifyFlags::NO_CHECK_TIME)
            .map_err(untrusted)?;
        let trust = builder.build();

        let chain = Stack::<X509>::new().map_err(untrusted)?;
        let mut context = X509StoreContext::new().map_err(untrusted)?;
        let failure = context
            .init(&trust, certificate, &chain, |ctx| {
                if ctx.verify_cert()? {
                    Ok(None)
                } else {
                    Ok(Some(ctx.error()))
                }
            })
            .map_err(untrusted)?;

        if let Some(error) = failure {
            tracing::debug!("Path validation failed: {}", error.error_string());
            return Err(Error::UntrustedCertificate(format!(
                "no trusted path to an anchor: {}",
                error.error_string()
            )));
        }

        if self.revocation_checking {
            self.check_revocation(certificate, &anchors, store)?;
        }
        Ok(())
    }

    /// Rejects certificates listed by a CRL of their issuer. Anchors are
    /// trusted directly and need no list.
    fn check_revocation<S: TrustStore>(
        &self,
        certificate: &X509Ref,
        anchors: &[X509],
        store: &S,
    ) -> Result<()> {
        let der = certificate.to_der().map_err(untrusted)?;
        for anchor in anchors {
            if anchor.to_der().map_err(untrusted)? == der {
                return Ok(());
            }
        }

        let issuer_name = certificate.issuer_name().to_der().map_err(untrusted)?;
        let issuer = anchors
            .iter()
            .find(|anchor| {
                anchor.subject_name().to_der().ok().as_deref() == Some(issuer_name.as_slice())
            })
            .ok_or_else(|| Error::UntrustedCertificate("issuer is not a trust anchor".into()))?;
        let issuer_key = issuer.public_key().map_err(untrusted)?;
        let owned = X509::from_der(&der).map_err(untrusted)?;

        let mut checked = false;
        for raw in store.iter_all_crls() {
            let crl = X509Crl::from_der(&raw).map_err(untrusted)?;
            if crl.issuer_name().to_der().map_err(untrusted)? != issuer_name {
                continue;
            }
            if !crl.verify(&issuer_key).map_err(untrusted)? {
                tracing::warn!("Ignoring revocation list with an invalid signature");
                continue;
            }
            checked = true;
            if let CrlStatus::Revoked(_) | CrlStatus::RemoveFromCrl(_) = crl.get_by_cert(&owned) {
                return Err(Error::UntrustedCertificate(
                    "certificate has been revoked by its issuer".into(),
                ));
            }
        }

        if !checked {
            return Err(Error::UntrustedCertificate(
                "revocation checking is enabled but no revocation list covers the issuer".into(),
            ));
        }
        Ok(())
    }

    /// Rejects certificates whose notBefore lies in the future or whose
    /// notAfter lies in the past.
    pub fn check_validity(&self, certificate: &X509Ref) -> Result<()> {
        let now = Asn1Time::from_unix(self.clock.now().timestamp() as _).map_err(untrusted)?;
        if certificate.not_before().compare(&now).map_err(untrusted)? == Ordering::Greater {
            return Err(Error::UntrustedCertificate(format!(
                "certificate is not valid before {}",
                certificate.not_before()
            )));
        }
        if certificate.not_after().compare(&now).map_err(untrusted)? == Ordering::Less {
            return Err(Error::UntrustedCertificate(format!(
                "certificate expired at {}",
                certificate.not_after()
            )));
        }
        Ok(())
    }
}

fn within_window(certificate: &X509Ref, now: &Asn1Time) -> std::result::Result<bool, openssl::error::ErrorStack> {
    Ok(certificate.not_before().compare(now)? != Ordering::Greater
        && certificate.not_after().compare(now)? != Ordering::Less)
}

fn untrusted(e: impl Into<TrustStoreError>) -> Error {
    Error::UntrustedCertificate(e.into().to_string())
}
