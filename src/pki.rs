pub mod cert_utils;
pub mod truststore;
pub mod validation;

pub use truststore::{
    CertificateEntry, MemoryTrustStore, TrustStore, TrustStoreError, TrustStoreRegistry,
};
pub use validation::TrustPathValidator;
