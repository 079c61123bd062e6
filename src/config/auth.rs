use serde::{Deserialize, Serialize};
use validator::ValidateEmail;

use super::ConfigError;
use crate::models::validators::is_valid_dns_label;

/// How a subject is authenticated before an assertion is issued.
///
/// Exactly one strategy is active for the whole deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum AuthConfig {
    /// Identity asserted by an authenticating reverse proxy.
    ///
    /// **Security:** The header is only trusted when the request originates
    /// from a trusted proxy IP (configured via `server.trusted_proxies`).
    Sso(SsoAuthConfig),

    /// Email and password checked against configured credential digests.
    Password(PasswordAuthConfig),

    /// Accepts every presented subject. Only allowed on loopback binds.
    TestStub,
}

impl AuthConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        match self {
            AuthConfig::Sso(c) => c.validate(),
            AuthConfig::Password(c) => c.validate(),
            AuthConfig::TestStub => Ok(()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuthConfig::Sso(_) => "sso",
            AuthConfig::Password(_) => "password",
            AuthConfig::TestStub => "test_stub",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct SsoAuthConfig {
    /// Header carrying the authenticated subject (e.g., "X-Authenticated-Email").
    #[serde(default = "default_identity_header")]
    pub identity_header: String,
}

fn default_identity_header() -> String {
    "X-Authenticated-Email".to_string()
}

impl SsoAuthConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.identity_header.is_empty() {
            return Err(ConfigError::Validation(
                "auth.identity_header cannot be empty".into(),
            ));
        }
        if http::HeaderName::from_bytes(self.identity_header.as_bytes()).is_err() {
            return Err(ConfigError::Validation(format!(
                "auth.identity_header '{}' is not a valid header name",
                self.identity_header
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct PasswordAuthConfig {
    /// Accepted credentials. Each entry is scoped to one tenant.
    #[serde(default)]
    pub credentials: Vec<StaticCredential>,
}

impl PasswordAuthConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (i, cred) in self.credentials.iter().enumerate() {
            if !is_valid_dns_label(&cred.tenant) {
                return Err(ConfigError::Validation(format!(
                    "auth.credentials[{i}].tenant '{}' is not a valid subdomain",
                    cred.tenant
                )));
            }
            if !cred.email.validate_email() {
                return Err(ConfigError::Validation(format!(
                    "auth.credentials[{i}].email is not a valid email address"
                )));
            }
            if cred.password_sha256.len() != 64
                || !cred.password_sha256.chars().all(|c| c.is_ascii_hexdigit())
            {
                return Err(ConfigError::Validation(format!(
                    "auth.credentials[{i}].password_sha256 must be 64 hex characters"
                )));
            }
        }
        Ok(())
    }
}

/// A single accepted credential.
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct StaticCredential {
    /// Subdomain of the tenant this credential may sign in to.
    pub tenant: String,
    pub email: String,
    /// Hex-encoded SHA-256 digest of the password.
    pub password_sha256: String,
}

impl std::fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredential")
            .field("tenant", &self.tenant)
            .field("email", &self.email)
            .field("password_sha256", &"****")
            .finish()
    }
}
