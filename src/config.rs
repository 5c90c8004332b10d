use std::collections::HashMap;
use std::path::PathBuf;

use config::{Config as ConfigLib, ConfigError, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;

use crate::crypto::{self, SignatureAlg, SigningCredential};
use crate::saml::CodecOptions;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub sts: StsConfig,
    pub trust: TrustConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StsConfig {
    pub issuer: String,
    pub token_lifetime_secs: u64,
    pub clock_skew_ms: u64,
    pub schema_validation: bool,
    pub tolerate_null_values: bool,
    #[serde(default)]
    pub attribute_provider: Option<String>,
    #[serde(default)]
    pub attribute_options: HashMap<String, String>,
    #[serde(default)]
    pub signing: Option<SigningConfig>,
    #[serde(default)]
    pub revocation_file: Option<PathBuf>,
}

impl StsConfig {
    pub fn token_lifetime(&self) -> Result<chrono::Duration, ConfigError> {
        i64::try_from(self.token_lifetime_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| out_of_range("sts.token_lifetime_secs", self.token_lifetime_secs))
    }

    pub fn clock_skew(&self) -> Result<chrono::Duration, ConfigError> {
        i64::try_from(self.clock_skew_ms)
            .ok()
            .and_then(chrono::Duration::try_milliseconds)
            .ok_or_else(|| out_of_range("sts.clock_skew_ms", self.clock_skew_ms))
    }

    pub fn codec_options(&self) -> CodecOptions {
        CodecOptions {
            schema_validation: self.schema_validation,
            tolerate_null_values: self.tolerate_null_values,
        }
    }
}

fn out_of_range(key: &str, value: u64) -> ConfigError {
    ConfigError::Message(format!("{key} = {value} is out of range"))
}

#[derive(Debug, Clone, Deserialize)]
pub struct SigningConfig {
    pub key_path: PathBuf,
    pub cert_path: PathBuf,
    #[serde(default)]
    pub key_password: Option<SecretString>,
    /// `rsa-sha256` style name or algorithm URI.
    #[serde(default)]
    pub algorithm: Option<String>,
}

impl SigningConfig {
    /// Reads the key and certificate from disk.
    pub fn load_credential(&self) -> Result<SigningCredential, crypto::Error> {
        SigningCredential::from_files(&self.key_path, &self.cert_path, self.key_password.as_ref())
    }

    pub fn signature_algorithm(&self) -> Result<SignatureAlg, crypto::Error> {
        self.algorithm
            .as_deref()
            .map(str::parse::<SignatureAlg>)
            .transpose()
            .map(Option::unwrap_or_default)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrustConfig {
    /// CRL checking during path validation. Every validation fails when it
    /// is enabled and the trust store holds no CRL for the signer's issuer.
    pub revocation_checking: bool,
    /// Trust store directory per trust domain.
    #[serde(default)]
    pub domains: HashMap<String, PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    pub fn load_with_sources(
        env_vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigLib::builder()
            .set_default("sts.issuer", "urn:saml-sts")?
            .set_default("sts.token_lifetime_secs", 7200)?
            .set_default("sts.clock_skew_ms", 2000)?
            .set_default("sts.schema_validation", true)?
            .set_default("sts.tolerate_null_values", false)?
            .set_default("trust.revocation_checking", false)?
            .add_source(File::with_name("config/settings").required(false));

        // If env_vars is provided, we use it instead of system environment
        // This is to avoid systems variables pollution across tests
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // Should be in the format APP_STS__ISSUER or APP_TRUST__DOMAINS__SP
            builder = builder.add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_default_config() {
        let config = Config::load_with_sources(Some(HashMap::new())).expect("Failed to load config");

        assert_eq!(config.sts.issuer, "urn:saml-sts");
        assert_eq!(config.sts.token_lifetime().unwrap(), chrono::Duration::hours(2));
        assert_eq!(config.sts.clock_skew().unwrap(), chrono::Duration::seconds(2));
        assert!(config.sts.schema_validation);
        assert!(!config.sts.tolerate_null_values);
        assert!(config.sts.signing.is_none());
        assert!(config.sts.attribute_provider.is_none());
        assert!(!config.trust.revocation_checking);
        assert!(config.trust.domains.is_empty());
    }

    #[test]
    fn test_env_config() {
        let mut env_vars = HashMap::new();
        env_vars.insert("sts.issuer".to_string(), "https://sts.example.org".to_string());
        env_vars.insert("sts.clock_skew_ms".to_string(), "500".to_string());
        env_vars.insert("sts.signing.key_path".to_string(), "keys/sts.key".to_string());
        env_vars.insert("sts.signing.cert_path".to_string(), "keys/sts.crt".to_string());
        env_vars.insert("sts.signing.key_password".to_string(), "changeit".to_string());
        env_vars.insert("sts.signing.algorithm".to_string(), "rsa-sha512".to_string());
        env_vars.insert("sts.attribute_provider".to_string(), "static".to_string());
        env_vars.insert("sts.attribute_options.role".to_string(), "admin".to_string());
        env_vars.insert("trust.revocation_checking".to_string(), "true".to_string());
        env_vars.insert("trust.domains.sp".to_string(), "/etc/trust/sp".to_string());

        let config = Config::load_with_sources(Some(env_vars)).expect("Failed to load config");

        assert_eq!(config.sts.issuer, "https://sts.example.org");
        assert_eq!(config.sts.clock_skew().unwrap(), chrono::Duration::milliseconds(500));
        let signing = config.sts.signing.unwrap();
        assert_eq!(signing.key_path, PathBuf::from("keys/sts.key"));
        assert_eq!(signing.key_password.as_ref().unwrap().expose_secret(), "changeit");
        assert_eq!(signing.signature_algorithm().unwrap(), SignatureAlg::RsaSha512);
        assert_eq!(config.sts.attribute_provider.as_deref(), Some("static"));
        assert_eq!(config.sts.attribute_options["role"], "admin");
        assert!(config.trust.revocation_checking);
        assert_eq!(config.trust.domains["sp"], PathBuf::from("/etc/trust/sp"));
    }

    #[test]
    fn test_partial_env_override() {
        let mut env_vars = HashMap::new();
        // We just override the lifetime
        env_vars.insert("sts.token_lifetime_secs".to_string(), "300".to_string());

        let config = Config::load_with_sources(Some(env_vars)).expect("Failed to load config");

        assert_eq!(config.sts.token_lifetime().unwrap(), chrono::Duration::minutes(5));
        // The other values should use default
        assert_eq!(config.sts.issuer, "urn:saml-sts");
        assert_eq!(config.sts.clock_skew_ms, 2000);
    }

    #[test]
    fn test_out_of_range_durations() {
        let mut sts = Config::load_with_sources(Some(HashMap::new()))
            .expect("Failed to load config")
            .sts;
        sts.token_lifetime_secs = i64::MAX as u64 / 1000 + 1;
        sts.clock_skew_ms = u64::MAX;

        assert!(sts.token_lifetime().is_err());
        assert!(sts.clock_skew().is_err());
    }

    #[test]
    fn test_default_signature_algorithm() {
        let signing = SigningConfig {
            key_path: "a.key".into(),
            cert_path: "a.crt".into(),
            key_password: None,
            algorithm: None,
        };
        assert_eq!(signing.signature_algorithm().unwrap(), SignatureAlg::RsaSha256);
        let bogus = SigningConfig {
            algorithm: Some("hmac-md5".into()),
            ..signing
        };
        assert!(bogus.signature_algorithm().is_err());
    }
}
