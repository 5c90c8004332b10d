use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use openssl::error::ErrorStack;
use openssl::sha::sha256;
use openssl::x509::{X509, X509Crl};
use thiserror::Error;
use walkdir::WalkDir;
use x509_parser::prelude::*;

/// Error type for trust store operations.
#[derive(Debug, Error)]
pub enum TrustStoreError {
    #[error("X.509 error: {0}")]
    X509(#[from] X509Error),

    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] ErrorStack),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<walkdir::Error> for TrustStoreError {
    fn from(e: walkdir::Error) -> Self {
        TrustStoreError::Io(e.into())
    }
}

/// Represents a certificate with additional metadata.
#[derive(Debug, Clone)]
pub struct CertificateEntry {
    pub raw: Arc<Vec<u8>>,
    pub serial_number: String,
    pub subject: String,
    pub issuer: String,
    /// Hex encoded SHA-256 of the DER bytes.
    pub fingerprint: String,
}

impl CertificateEntry {
    /// Create a certificate entry from DER-encoded bytes
    pub fn from_der(der: impl AsRef<[u8]>) -> Result<Self, TrustStoreError> {
        let der_bytes = der.as_ref();
        let (_, cert) =
            X509Certificate::from_der(der_bytes).map_err(|e| TrustStoreError::X509(e.into()))?;

        Ok(Self {
            raw: Arc::new(der_bytes.to_vec()),
            serial_number: cert.tbs_certificate.serial.to_string(),
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            fingerprint: hex::encode(sha256(der_bytes)),
        })
    }

    /// Parse the certificate from stored DER bytes
    pub fn parse(&self) -> Result<X509Certificate<'_>, TrustStoreError> {
        let (_, cert) =
            X509Certificate::from_der(&self.raw).map_err(|e| TrustStoreError::X509(e.into()))?;
        Ok(cert)
    }

    pub fn to_x509(&self) -> Result<X509, TrustStoreError> {
        Ok(X509::from_der(&self.raw)?)
    }
}

/// Interface of a set of trust anchors with their revocation lists.
pub trait TrustStore: Clone + Send + Sync + 'static {
    /// Add DER encoded certificates to the trust store.
    ///
    /// Returns the number of certificates added.
    fn add_certs<I, D>(&self, der_certs: I) -> usize
    where
        I: IntoIterator<Item = D>,
        D: AsRef<[u8]>;

    /// Add DER encoded certificate revocation lists.
    ///
    /// Returns the number of lists added.
    fn add_crls<I, D>(&self, der_crls: I) -> usize
    where
        I: IntoIterator<Item = D>,
        D: AsRef<[u8]>;

    /// Get a certificate by its serial number.
    fn get_cert_by_serial(&self, serial_number: &str) -> Option<CertificateEntry>;

    /// Get a certificate by its subject DN.
    fn get_cert_by_subject(&self, subject: &str) -> Option<CertificateEntry>;

    /// Remove a certificate from the trust store by its fingerprint.
    fn remove_cert(&self, fingerprint: &str) -> bool;

    /// Remove all certificates and revocation lists.
    fn clear(&self);

    /// All trust anchors.
    fn iter_all_certificates(&self) -> Vec<CertificateEntry>;

    /// All revocation lists, DER encoded.
    fn iter_all_crls(&self) -> Vec<Arc<Vec<u8>>>;
}

/// In-memory trust store implementation.
///
/// Certificates are usually loaded once from a directory and never
/// persisted back to disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryTrustStore {
    cache: Arc<DashMap<String, CertificateEntry>>,
    crls: Arc<DashMap<String, Arc<Vec<u8>>>>,
}

impl MemoryTrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a trust store from the certificates found under `base_path`.
    ///
    /// Files ending in .der, .pem, .cer or .crt are read as certificates, .crl
    /// files as revocation lists. Both DER and PEM encodings are accepted and
    /// a PEM file may bundle several certificates.
    pub fn load<P: Into<PathBuf>>(base_path: P) -> Result<Self, TrustStoreError> {
        let base_path = base_path.into();
        let store = Self::new();
        let (mut certs, mut crls) = (0, 0);

        for entry in WalkDir::new(&base_path) {
            let entry = entry?;
            let path = entry.path();
            let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
                continue;
            };
            let ext = ext.to_ascii_lowercase();

            if matches!(ext.as_str(), "der" | "pem" | "cer" | "crt") {
                match read_certificates(path) {
                    Ok(ders) => certs += store.add_certs(ders),
                    Err(e) => tracing::warn!("Skipping {}: {e}", path.display()),
                }
            } else if ext == "crl" {
                match read_crl(path) {
                    Ok(der) => crls += store.add_crls([der]),
                    Err(e) => tracing::warn!("Skipping {}: {e}", path.display()),
                }
            }
        }
        tracing::info!(
            "Loaded {certs} certificates and {crls} revocation lists from {}",
            base_path.display()
        );
        Ok(store)
    }

    /// Return the amount of certificates currently cached.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if the trust store is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Produce an iterator over all stored certificates.
    pub fn iter(&self) -> impl Iterator<Item = CertificateEntry> + '_ {
        self.cache.iter().map(|e| e.value().clone())
    }
}

fn read_certificates(path: &Path) -> Result<Vec<Vec<u8>>, TrustStoreError> {
    let bytes = std::fs::read(path)?;
    if bytes.starts_with(b"-----BEGIN") {
        X509::stack_from_pem(&bytes)?
            .iter()
            .map(|cert| cert.to_der().map_err(Into::into))
            .collect()
    } else {
        CertificateEntry::from_der(&bytes)?;
        Ok(vec![bytes])
    }
}

fn read_crl(path: &Path) -> Result<Vec<u8>, TrustStoreError> {
    let bytes = std::fs::read(path)?;
    let crl = if bytes.starts_with(b"-----BEGIN") {
        X509Crl::from_pem(&bytes)?
    } else {
        X509Crl::from_der(&bytes)?
    };
    Ok(crl.to_der()?)
}

impl TrustStore for MemoryTrustStore {
    fn add_certs<I, D>(&self, der_certs: I) -> usize
    where
        I: IntoIterator<Item = D>,
        D: AsRef<[u8]>,
    {
        let mut count = 0;
        for der_cert in der_certs {
            match CertificateEntry::from_der(der_cert.as_ref()) {
                Ok(cert_entry) => {
                    self.cache.insert(cert_entry.fingerprint.clone(), cert_entry);
                    count += 1;
                }
                Err(e) => tracing::warn!("Ignoring invalid certificate: {e}"),
            }
        }
        count
    }

    fn add_crls<I, D>(&self, der_crls: I) -> usize
    where
        I: IntoIterator<Item = D>,
        D: AsRef<[u8]>,
    {
        let mut count = 0;
        for der_crl in der_crls {
            let der = der_crl.as_ref();
            if X509Crl::from_der(der).is_ok() {
                self.crls.insert(hex::encode(sha256(der)), Arc::new(der.to_vec()));
                count += 1;
            } else {
                tracing::warn!("Ignoring invalid revocation list");
            }
        }
        count
    }

    fn get_cert_by_serial(&self, serial_number: &str) -> Option<CertificateEntry> {
        self.cache
            .iter()
            .find(|entry| entry.value().serial_number == serial_number)
            .map(|entry| entry.value().clone())
    }

    fn get_cert_by_subject(&self, subject: &str) -> Option<CertificateEntry> {
        self.cache
            .iter()
            .find(|entry| entry.value().subject == subject)
            .map(|entry| entry.value().clone())
    }

    fn remove_cert(&self, fingerprint: &str) -> bool {
        self.cache.remove(fingerprint).is_some()
    }

    fn clear(&self) {
        self.cache.clear();
        self.crls.clear();
    }

    fn iter_all_certificates(&self) -> Vec<CertificateEntry> {
        self.iter().collect()
    }

    fn iter_all_crls(&self) -> Vec<Arc<Vec<u8>>> {
        self.crls.iter().map(|e| e.value().clone()).collect()
    }
}

/// Named trust stores, one per trust domain.
#[derive(Debug, Clone, Default)]
pub struct TrustStoreRegistry {
    domains: Arc<DashMap<String, MemoryTrustStore>>,
}

impl TrustStoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load one trust store per configured domain directory.
    pub fn load(domains: &HashMap<String, PathBuf>) -> Result<Self, TrustStoreError> {
        let registry = Self::new();
        for (name, path) in domains {
            registry.register(name.clone(), MemoryTrustStore::load(path)?);
        }
        Ok(registry)
    }

    /// Register or replace the store for a trust domain.
    pub fn register(&self, name: impl Into<String>, store: MemoryTrustStore) {
        self.domains.insert(name.into(), store);
    }

    pub fn get(&self, name: &str) -> Option<MemoryTrustStore> {
        self.domains.get(name).map(|entry| entry.value().clone())
    }

    pub fn domains(&self) -> Vec<String> {
        self.domains.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pki::cert_utils::{CertificateParams, generate_self_signed};
    use tempfile::TempDir;

    fn cert_der(cn: &str) -> Vec<u8> {
        let (cert, _) = generate_self_signed(&CertificateParams::ca(cn)).unwrap();
        cert.to_der().unwrap()
    }

    #[test]
    fn test_add_and_lookup() {
        let store = MemoryTrustStore::new();
        let der = cert_der("Lookup CA");
        assert_eq!(store.add_certs([&der, &b"not a certificate".to_vec()]), 1);

        let entry = store.iter().next().unwrap();
        assert!(entry.subject.contains("CN=Lookup CA"));
        assert_eq!(entry.subject, entry.issuer);
        assert!(store.get_cert_by_subject(&entry.subject).is_some());
        assert!(store.get_cert_by_serial(&entry.serial_number).is_some());

        assert!(store.remove_cert(&entry.fingerprint));
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_from_directory() {
        let dir = TempDir::new().unwrap();
        let (pem_a, _) = generate_self_signed(&CertificateParams::ca("PEM A")).unwrap();
        let (pem_b, _) = generate_self_signed(&CertificateParams::ca("PEM B")).unwrap();
        let mut bundle = pem_a.to_pem().unwrap();
        bundle.extend(pem_b.to_pem().unwrap());

        std::fs::write(dir.path().join("bundle.pem"), bundle).unwrap();
        std::fs::write(dir.path().join("single.der"), cert_der("DER")).unwrap();
        std::fs::write(dir.path().join("broken.crt"), b"garbage").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let store = MemoryTrustStore::load(dir.path()).unwrap();
        assert_eq!(store.len(), 3);
        assert!(store.iter_all_crls().is_empty());
    }

    #[test]
    fn test_registry_lookup() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("root.der"), cert_der("Root")).unwrap();

        let domains = HashMap::from([("partners".to_string(), dir.path().to_path_buf())]);
        let registry = TrustStoreRegistry::load(&domains).unwrap();

        assert_eq!(registry.get("partners").map(|s| s.len()), Some(1));
        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.domains(), vec!["partners".to_string()]);
    }
}
