pub mod config;
pub mod confirmation;
pub mod consumer;
pub mod crypto;
pub mod error;
pub mod lifetime;
pub mod pki;
pub mod provider;
pub mod revocation;
pub mod saml;
pub mod signature;
pub mod sts;
pub mod telemetry;
pub mod xml;

pub use error::{Error, Result};
