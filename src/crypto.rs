mod credential;
mod errors;
pub mod rsa;

pub use credential::SigningCredential;
pub use errors::Error;

pub(crate) use errors::CryptoResult;
use openssl::hash::{Hasher, MessageDigest as Digest};
use std::fmt;
use std::str::FromStr;

/// Digest algorithms usable in XML signature references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlg {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlg {
    /// Hash the given data with this hash algorithm
    pub fn hash(&self, data: impl AsRef<[u8]>) -> CryptoResult<Vec<u8>> {
        let mut hasher = Hasher::new(self.into())?;
        hasher.update(data.as_ref())?;
        Ok(hasher.finish()?.to_vec())
    }

    /// Algorithm identifier used in `ds:DigestMethod`.
    pub fn uri(self) -> &'static str {
        match self {
            HashAlg::Sha1 => "http://www.w3.org/2000/09/xmldsig#sha1",
            HashAlg::Sha256 => "http://www.w3.org/2001/04/xmlenc#sha256",
            HashAlg::Sha384 => "http://www.w3.org/2001/04/xmldsig-more#sha384",
            HashAlg::Sha512 => "http://www.w3.org/2001/04/xmlenc#sha512",
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        [HashAlg::Sha1, HashAlg::Sha256, HashAlg::Sha384, HashAlg::Sha512]
            .into_iter()
            .find(|alg| alg.uri() == uri)
    }
}

impl From<&HashAlg> for Digest {
    fn from(hash_alg: &HashAlg) -> Self {
        match hash_alg {
            HashAlg::Sha1 => Digest::sha1(),
            HashAlg::Sha256 => Digest::sha256(),
            HashAlg::Sha384 => Digest::sha384(),
            HashAlg::Sha512 => Digest::sha512(),
        }
    }
}

impl fmt::Display for HashAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HashAlg::Sha1 => "SHA-1",
            HashAlg::Sha256 => "SHA-256",
            HashAlg::Sha384 => "SHA-384",
            HashAlg::Sha512 => "SHA-512",
        };
        write!(f, "{name}")
    }
}

/// RSA PKCS#1 v1.5 signature algorithms usable in `ds:SignatureMethod`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureAlg {
    RsaSha1,
    #[default]
    RsaSha256,
    RsaSha384,
    RsaSha512,
}

impl SignatureAlg {
    const ALL: [SignatureAlg; 4] = [
        SignatureAlg::RsaSha1,
        SignatureAlg::RsaSha256,
        SignatureAlg::RsaSha384,
        SignatureAlg::RsaSha512,
    ];

    pub fn uri(self) -> &'static str {
        match self {
            SignatureAlg::RsaSha1 => "http://www.w3.org/2000/09/xmldsig#rsa-sha1",
            SignatureAlg::RsaSha256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
            SignatureAlg::RsaSha384 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384",
            SignatureAlg::RsaSha512 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512",
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.uri() == uri)
    }

    /// The digest paired with this algorithm, for both the signature and the
    /// reference digest.
    pub fn hash_alg(self) -> HashAlg {
        match self {
            SignatureAlg::RsaSha1 => HashAlg::Sha1,
            SignatureAlg::RsaSha256 => HashAlg::Sha256,
            SignatureAlg::RsaSha384 => HashAlg::Sha384,
            SignatureAlg::RsaSha512 => HashAlg::Sha512,
        }
    }
}

impl FromStr for SignatureAlg {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rsa-sha1" => Ok(SignatureAlg::RsaSha1),
            "rsa-sha256" => Ok(SignatureAlg::RsaSha256),
            "rsa-sha384" => Ok(SignatureAlg::RsaSha384),
            "rsa-sha512" => Ok(SignatureAlg::RsaSha512),
            _ => Self::from_uri(s)
                .ok_or_else(|| Error::Invalid(format!("unsupported signature algorithm '{s}'"))),
        }
    }
}
