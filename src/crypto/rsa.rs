use crate::crypto::HashAlg;
use crate::crypto::errors::{CryptoResult, Error};
use openssl::bn::BigNum;
use openssl::pkey::{HasPublic, Id, PKey, PKeyRef, Private, Public};
use openssl::rsa::Rsa;
use openssl::sign::{Signer, Verifier};

/// RSA key sizes used when generating signing keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RsaKeySize {
    #[default]
    Rsa2048,
    Rsa3072,
    Rsa4096,
}

impl RsaKeySize {
    /// Get the key size in bits
    pub fn bits(&self) -> u32 {
        match self {
            RsaKeySize::Rsa2048 => 2048,
            RsaKeySize::Rsa3072 => 3072,
            RsaKeySize::Rsa4096 => 4096,
        }
    }
}

impl TryFrom<u32> for RsaKeySize {
    type Error = Error;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        match bits {
            2048 => Ok(Self::Rsa2048),
            3072 => Ok(Self::Rsa3072),
            4096 => Ok(Self::Rsa4096),
            _ => Err(Error::Invalid("Unsupported RSA key size".into())),
        }
    }
}

/// Generate a fresh RSA private key
pub fn generate_key(size: RsaKeySize) -> CryptoResult<PKey<Private>> {
    let rsa = Rsa::generate(size.bits())?;
    Ok(PKey::from_rsa(rsa)?)
}

/// RSASSA-PKCS1-v1_5 signature over `data`
pub fn sign(key: &PKeyRef<Private>, hash: HashAlg, data: &[u8]) -> CryptoResult<Vec<u8>> {
    ensure_rsa(key)?;
    let mut signer = Signer::new((&hash).into(), key)?;
    signer.update(data)?;
    Ok(signer.sign_to_vec()?)
}

/// Verify an RSASSA-PKCS1-v1_5 signature. Malformed signatures verify as false.
pub fn verify<T: HasPublic>(
    key: &PKeyRef<T>,
    hash: HashAlg,
    data: &[u8],
    signature: &[u8],
) -> CryptoResult<bool> {
    ensure_rsa(key)?;
    let mut verifier = Verifier::new((&hash).into(), key)?;
    verifier.update(data)?;
    Ok(verifier.verify(signature).unwrap_or(false))
}

/// Big-endian modulus and public exponent of an RSA key
pub fn public_components<T: HasPublic>(key: &PKeyRef<T>) -> CryptoResult<(Vec<u8>, Vec<u8>)> {
    ensure_rsa(key)?;
    let rsa = key.rsa()?;
    Ok((rsa.n().to_vec(), rsa.e().to_vec()))
}

/// Rebuild a public key from its modulus and exponent
pub fn public_key_from_components(modulus: &[u8], exponent: &[u8]) -> CryptoResult<PKey<Public>> {
    let n = BigNum::from_slice(modulus)?;
    let e = BigNum::from_slice(exponent)?;
    let rsa = Rsa::from_public_components(n, e)?;
    Ok(PKey::from_rsa(rsa)?)
}

fn ensure_rsa<T>(key: &PKeyRef<T>) -> CryptoResult<()> {
    if key.id() == Id::RSA {
        Ok(())
    } else {
        Err(Error::Invalid(format!("expected an RSA key, found {:?}", key.id())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let key = generate_key(RsaKeySize::Rsa2048).unwrap();
        let data = b"canonical signed info";

        let signature = sign(&key, HashAlg::Sha256, data).unwrap();
        assert_eq!(signature.len(), 256);
        assert!(verify(&key, HashAlg::Sha256, data, &signature).unwrap());
        assert!(!verify(&key, HashAlg::Sha256, b"tampered", &signature).unwrap());
        assert!(!verify(&key, HashAlg::Sha1, data, &signature).unwrap());
    }

    #[test]
    fn test_garbage_signature_verifies_false() {
        let key = generate_key(RsaKeySize::Rsa2048).unwrap();
        assert!(!verify(&key, HashAlg::Sha256, b"data", b"short").unwrap());
    }

    #[test]
    fn test_components_roundtrip() {
        let key = generate_key(RsaKeySize::Rsa2048).unwrap();
        let (n, e) = public_components(&key).unwrap();
        let public = public_key_from_components(&n, &e).unwrap();
        assert!(public.public_eq(&key));
    }

    #[test]
    fn test_non_rsa_key_rejected() {
        let group = openssl::ec::EcGroup::from_curve_name(openssl::nid::Nid::X9_62_PRIME256V1)
            .unwrap();
        let ec = openssl::ec::EcKey::generate(&group).unwrap();
        let key = PKey::from_ec_key(ec).unwrap();
        assert!(matches!(sign(&key, HashAlg::Sha256, b"data"), Err(Error::Invalid(_))));
    }

    #[test]
    fn test_key_size_from_bits() {
        assert_eq!(RsaKeySize::try_from(3072).unwrap(), RsaKeySize::Rsa3072);
        assert!(RsaKeySize::try_from(1024).is_err());
    }
}
