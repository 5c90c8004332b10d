//! XML plumbing shared by the assertion codec and the signature layer.

mod c14n;
mod config;
mod de;
mod error;
mod ser;
pub mod utils;

pub use c14n::canonicalize;
pub use config::XmlConfig;
pub use de::from_str;
pub use error::Error;
pub use ser::to_string_with_root;

pub type Result<T> = std::result::Result<T, Error>;

/// Namespace URIs used across the crate.
pub mod ns {
    pub const SAML2_ASSERTION: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
    pub const SAML11_ASSERTION: &str = "urn:oasis:names:tc:SAML:1.0:assertion";
    pub const DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";
    pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
    pub const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
    pub const WS_TRUST: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512";
    pub const WSSE: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
    pub const WSSE11: &str = "http://docs.oasis-open.org/wss/oasis-wss-wssecurity-secext-1.1.xsd";
}
