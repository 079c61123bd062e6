use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Default assertion lifetime (5 minutes).
const DEFAULT_ASSERTION_LIFETIME_SECS: u64 = 300;

/// Identity provider signing identity.
///
/// The certificate and the private key can each be given inline (usually via
/// `${VAR}` expansion) or as a path to a PEM file, but not both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct IdpConfig {
    /// Entity ID written as the `Issuer` of every response and assertion.
    pub entity_id: String,

    /// PEM-encoded X.509 signing certificate.
    #[serde(default)]
    pub certificate: Option<String>,

    /// Path to a PEM-encoded X.509 signing certificate.
    #[serde(default)]
    pub certificate_path: Option<PathBuf>,

    /// PEM-encoded private key (PKCS#8 or PKCS#1).
    #[serde(default, skip_serializing)]
    pub private_key: Option<String>,

    /// Path to a PEM-encoded private key.
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,

    /// How long an issued assertion stays valid.
    #[serde(default = "default_assertion_lifetime_secs")]
    pub assertion_lifetime_secs: u64,

    /// Tolerance subtracted from `NotBefore` for service-provider clock drift.
    #[serde(default = "default_clock_skew_secs")]
    pub clock_skew_secs: u64,

    /// `Format` attribute of the issued `NameID`.
    #[serde(default = "default_name_id_format")]
    pub name_id_format: String,

    /// Upper bound on the decoded size of an incoming `SAMLRequest`.
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
}

fn default_assertion_lifetime_secs() -> u64 {
    DEFAULT_ASSERTION_LIFETIME_SECS
}

fn default_clock_skew_secs() -> u64 {
    60
}

fn default_name_id_format() -> String {
    "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress".to_string()
}

fn default_max_request_bytes() -> usize {
    256 * 1024
}

impl IdpConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.entity_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "idp.entity_id must not be empty".into(),
            ));
        }
        if self.assertion_lifetime_secs == 0 {
            return Err(ConfigError::Validation(
                "idp.assertion_lifetime_secs must be greater than zero".into(),
            ));
        }
        if self.max_request_bytes == 0 {
            return Err(ConfigError::Validation(
                "idp.max_request_bytes must be greater than zero".into(),
            ));
        }
        exactly_one(
            "certificate",
            self.certificate.is_some(),
            self.certificate_path.is_some(),
        )?;
        exactly_one(
            "private_key",
            self.private_key.is_some(),
            self.private_key_path.is_some(),
        )?;
        Ok(())
    }

    /// PEM text of the signing certificate.
    pub fn certificate_pem(&self) -> Result<String, ConfigError> {
        load_pem(self.certificate.as_deref(), self.certificate_path.as_deref())
    }

    /// PEM text of the signing key.
    pub fn private_key_pem(&self) -> Result<String, ConfigError> {
        load_pem(self.private_key.as_deref(), self.private_key_path.as_deref())
    }
}

fn exactly_one(name: &str, inline: bool, path: bool) -> Result<(), ConfigError> {
    match (inline, path) {
        (true, false) | (false, true) => Ok(()),
        (true, true) => Err(ConfigError::Validation(format!(
            "idp.{name} and idp.{name}_path are mutually exclusive"
        ))),
        (false, false) => Err(ConfigError::Validation(format!(
            "one of idp.{name} or idp.{name}_path is required"
        ))),
    }
}

fn load_pem(inline: Option<&str>, path: Option<&Path>) -> Result<String, ConfigError> {
    match (inline, path) {
        (Some(pem), _) => Ok(pem.to_string()),
        (None, Some(path)) => {
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e, path.to_path_buf()))
        }
        (None, None) => Err(ConfigError::Validation(
            "no PEM source configured".into(),
        )),
    }
}
