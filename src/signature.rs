//! Enveloped XML-DSig signatures over assertions.

mod signer;
mod verifier;

pub use signer::AssertionSigner;
pub use verifier::SignatureVerifier;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Error, Result};

/// Decodes base64 element content, ignoring the line breaks signers are
/// allowed to insert.
pub(crate) fn decode_base64(value: &str, what: &str) -> Result<Vec<u8>> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| Error::InvalidSignature(format!("{what} is not valid base64: {e}")))
}
