use chrono::{DateTime, Duration, Utc};
use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{BasicConstraints, KeyUsage, SubjectKeyIdentifier};
use openssl::x509::{X509, X509Builder, X509Name, X509NameBuilder, X509Ref};

/// Subject and validity window of a certificate to generate.
#[derive(Debug, Clone)]
pub struct CertificateParams {
    pub common_name: String,
    pub organization: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub ca: bool,
}

impl CertificateParams {
    /// Issuing certificate valid for one year.
    pub fn ca(common_name: impl Into<String>) -> Self {
        Self {
            ca: true,
            ..Self::leaf(common_name)
        }
    }

    /// Signing certificate valid for one year.
    pub fn leaf(common_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            common_name: common_name.into(),
            organization: "Security Token Service".into(),
            not_before: now - Duration::days(1),
            not_after: now + Duration::days(365),
            ca: false,
        }
    }

    pub fn valid_between(mut self, not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> Self {
        self.not_before = not_before;
        self.not_after = not_after;
        self
    }
}

/// Generate a self-signed certificate and its RSA key.
pub fn generate_self_signed(
    params: &CertificateParams,
) -> Result<(X509, PKey<Private>), ErrorStack> {
    let key_pair = PKey::from_rsa(Rsa::generate(2048)?)?;
    let cert = build_certificate(params, &key_pair, None)?;
    Ok((cert, key_pair))
}

/// Generate a certificate issued by `issuer_cert`.
pub fn generate_signed_by(
    params: &CertificateParams,
    issuer_cert: &X509Ref,
    issuer_key: &PKeyRef<Private>,
) -> Result<(X509, PKey<Private>), ErrorStack> {
    let key_pair = PKey::from_rsa(Rsa::generate(2048)?)?;
    let cert = build_certificate(params, &key_pair, Some((issuer_cert, issuer_key)))?;
    Ok((cert, key_pair))
}

fn build_certificate(
    params: &CertificateParams,
    key_pair: &PKeyRef<Private>,
    issuer: Option<(&X509Ref, &PKeyRef<Private>)>,
) -> Result<X509, ErrorStack> {
    let mut cert_builder = X509Builder::new()?;
    cert_builder.set_version(2)?;
    let serial_number = generate_serial_number()?;
    cert_builder.set_serial_number(&serial_number)?;

    let subject_name = create_x509_name(&[
        ("O", params.organization.as_str()),
        ("CN", params.common_name.as_str()),
    ])?;
    cert_builder.set_subject_name(&subject_name)?;
    match issuer {
        Some((issuer_cert, _)) => cert_builder.set_issuer_name(issuer_cert.subject_name())?,
        None => cert_builder.set_issuer_name(&subject_name)?,
    }
    cert_builder.set_pubkey(key_pair)?;

    let not_before = Asn1Time::from_unix(params.not_before.timestamp() as _)?;
    let not_after = Asn1Time::from_unix(params.not_after.timestamp() as _)?;
    cert_builder.set_not_before(&not_before)?;
    cert_builder.set_not_after(&not_after)?;

    if params.ca {
        cert_builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
        cert_builder.append_extension(
            KeyUsage::new()
                .critical()
                .key_cert_sign()
                .crl_sign()
                .build()?,
        )?;
    } else {
        cert_builder.append_extension(BasicConstraints::new().build()?)?;
        cert_builder.append_extension(
            KeyUsage::new()
                .critical()
                .digital_signature()
                .non_repudiation()
                .build()?,
        )?;
    }
    let subject_key_id = SubjectKeyIdentifier::new()
        .build(&cert_builder.x509v3_context(issuer.map(|(cert, _)| cert), None))?;
    cert_builder.append_extension(subject_key_id)?;

    let signing_key = issuer.map(|(_, key)| key).unwrap_or(key_pair);
    cert_builder.sign(signing_key, MessageDigest::sha256())?;
    Ok(cert_builder.build())
}

fn generate_serial_number() -> Result<Asn1Integer, ErrorStack> {
    let mut serial = BigNum::new()?;
    serial.rand(128, MsbOption::MAYBE_ZERO, false)?;
    serial.to_asn1_integer()
}

fn create_x509_name(entries: &[(&str, &str)]) -> Result<X509Name, ErrorStack> {
    let mut name_builder = X509NameBuilder::new()?;
    for (key, value) in entries {
        name_builder.append_entry_by_text(key, value)?;
    }
    Ok(name_builder.build())
}
