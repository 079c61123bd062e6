//! Configuration module for the identity provider.
//!
//! Portcullis is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [tenants]
//! domain_suffix = "example.com"
//!
//! [[tenants.store.tenants]]
//! subdomain = "acme"
//! assertion_issuance_enabled = true
//!
//! [idp]
//! entity_id = "https://idp.example.com/saml/metadata"
//! certificate_path = "/etc/portcullis/idp.crt"
//! private_key = "${IDP_PRIVATE_KEY}"
//!
//! [auth]
//! type = "sso"
//! identity_header = "X-Authenticated-Email"
//! ```

mod auth;
#[cfg(feature = "database-sqlite")]
mod database;
mod idp;
mod observability;
mod server;
mod tenants;

use std::path::Path;

pub use auth::*;
#[cfg(feature = "database-sqlite")]
pub use database::*;
pub use idp::*;
pub use observability::*;
use serde::{Deserialize, Serialize};
pub use server::*;
pub use tenants::*;

/// Root configuration for the identity provider.
///
/// `tenants`, `idp` and `auth` have no defaults: the endpoint suffix, the
/// signing material and the authentication strategy are always explicit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct PortcullisConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Tenant resolution: endpoint grammar, matching policy and store.
    pub tenants: TenantsConfig,

    /// Identity provider signing identity.
    pub idp: IdpConfig,

    /// How subjects are authenticated before an assertion is issued.
    pub auth: AuthConfig,

    /// Observability configuration (logging, metrics).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl PortcullisConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing required variables will cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;

        // Detect feature-gated values before typed deserialization so the user
        // sees which feature is missing instead of an "unknown variant" error.
        let raw: toml::Value = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        check_disabled_features(&raw)?;

        let mut config: PortcullisConfig =
            toml::from_str(&expanded).map_err(ConfigError::Parse)?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    fn validate(&mut self) -> Result<(), ConfigError> {
        self.tenants.validate()?;
        self.idp.validate()?;
        self.auth.validate()?;

        match &self.auth {
            AuthConfig::TestStub => {
                if !self.server.host.is_loopback() {
                    return Err(ConfigError::Validation(
                        "The test stub verifier (auth.type = \"test_stub\") approves every \
                         presented subject and may only be used when the server binds to a \
                         loopback address (server.host = \"127.0.0.1\")."
                            .into(),
                    ));
                }
            }
            AuthConfig::Sso(_) if !self.server.trusted_proxies.is_configured() => {
                if !self.server.host.is_loopback() {
                    return Err(ConfigError::Validation(
                        "SSO verification (auth.type = \"sso\") is enabled and the server \
                         binds to a non-localhost address, but server.trusted_proxies is not \
                         configured. This allows any client to spoof the identity header. \
                         Either configure server.trusted_proxies.cidrs with your proxy's IP \
                         ranges, or bind to localhost (server.host = \"127.0.0.1\")."
                            .into(),
                    ));
                }
                tracing::warn!(
                    "SSO verification is enabled without server.trusted_proxies configured. \
                     Identity headers will be accepted from ANY local source. Configure \
                     server.trusted_proxies.cidrs for production deployments."
                );
            }
            _ => {}
        }

        Ok(())
    }

    /// Generate the JSON schema for the configuration file.
    #[cfg(feature = "json-schema")]
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(PortcullisConfig)
    }

    /// Generate the JSON schema as a pretty-printed JSON string.
    #[cfg(feature = "json-schema")]
    pub fn json_schema_string() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::json_schema())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Check for feature-gated configuration values before typed deserialization.
fn check_disabled_features(raw: &toml::Value) -> Result<(), ConfigError> {
    let mut issues: Vec<(String, &str)> = Vec::new();

    if let Some(type_val) = raw
        .get("tenants")
        .and_then(|v| v.get("store"))
        .and_then(|v| v.get("type"))
        .and_then(|v| v.as_str())
    {
        check_tenant_store_feature(type_val, &mut issues);
    }

    if raw
        .get("observability")
        .and_then(|v| v.get("metrics"))
        .and_then(|v| v.get("enabled"))
        .and_then(|v| v.as_bool())
        == Some(true)
    {
        check_metrics_feature(&mut issues);
    }

    if issues.is_empty() {
        return Ok(());
    }

    let details = issues
        .iter()
        .map(|(msg, _)| msg.as_str())
        .collect::<Vec<_>>()
        .join("\n  - ");
    let features = issues
        .iter()
        .map(|(_, feat)| *feat)
        .collect::<Vec<_>>()
        .join(",");

    Err(ConfigError::Validation(format!(
        "Configuration requires features not compiled in this build:\n  \
         - {details}\n\n\
         Rebuild with: cargo build --features {features}\n\
         Or use the 'full' profile: cargo build --features full\n\
         Run 'portcullis features' to see all available features."
    )))
}

fn check_tenant_store_feature(type_val: &str, _issues: &mut Vec<(String, &str)>) {
    #[cfg(not(feature = "database-sqlite"))]
    if type_val == "sqlite" {
        _issues.push((
            "Tenant store type 'sqlite' requires the 'database-sqlite' feature".into(),
            "database-sqlite",
        ));
    }
    let _ = type_val;
}

fn check_metrics_feature(_issues: &mut Vec<(String, &str)>) {
    #[cfg(not(feature = "prometheus"))]
    _issues.push((
        "Metrics (observability.metrics.enabled = true) require the 'prometheus' feature".into(),
        "prometheus",
    ));
}

/// Expand `${VAR}` references, ignoring anything after a `#` comment marker.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    static ENV_VAR: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
        regex::Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid")
    });

    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');

        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in ENV_VAR.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            line_result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            line_result.push_str(&value);

            last_end = whole.end();
        }

        line_result.push_str(&line[last_end..]);
        result.push_str(&line_result);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}


#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::{test_fixtures::minimal_config_toml, *};
    use crate::tests::support::test_key_pair;

    #[test]
    fn test_minimal_config() {
        let keys = test_key_pair();
        let config = PortcullisConfig::from_str(&minimal_config_toml(
            keys,
            r#"
[auth]
type = "test_stub"
"#,
        ))
        .unwrap();

        assert_eq!(config.tenants.domain_suffix, "example.com");
        assert_eq!(
            config.tenants.subdomain_matching,
            SubdomainMatching::CaseInsensitive
        );
        assert!(matches!(config.auth, AuthConfig::TestStub));
    }

    #[test]
    fn test_missing_auth_section_is_rejected() {
        let keys = test_key_pair();
        let err = PortcullisConfig::from_str(&minimal_config_toml(keys, "")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "got {err}");
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let keys = test_key_pair();
        let err = PortcullisConfig::from_str(&minimal_config_toml(
            keys,
            r#"
[auth]
type = "test_stub"

[observability]
colour = "blue"
"#,
        ))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "got {err}");
    }

    #[test]
    #[serial]
    fn test_env_var_expansion() {
        temp_env::with_var("PORTCULLIS_TEST_SUFFIX", Some("corp.test"), || {
            let result = expand_env_vars("domain_suffix = \"${PORTCULLIS_TEST_SUFFIX}\"").unwrap();
            assert_eq!(result, "domain_suffix = \"corp.test\"");
        });
    }

    #[test]
    #[serial]
    fn test_missing_env_var_errors() {
        temp_env::with_var_unset("PORTCULLIS_TEST_MISSING", || {
            let err = expand_env_vars("key = \"${PORTCULLIS_TEST_MISSING}\"").unwrap_err();
            assert!(
                matches!(err, ConfigError::EnvVarNotFound(ref name) if name == "PORTCULLIS_TEST_MISSING")
            );
        });
    }

    #[test]
    fn test_env_var_in_comment_ignored() {
        let result = expand_env_vars("# ${NOT_SET_ANYWHERE}").unwrap();
        assert_eq!(result, "# ${NOT_SET_ANYWHERE}");
    }

    #[test]
    #[serial]
    fn test_env_var_before_comment_expanded() {
        temp_env::with_var("PORTCULLIS_TEST_HEADER", Some("X-User"), || {
            let result =
                expand_env_vars("identity_header = \"${PORTCULLIS_TEST_HEADER}\" # ${IGNORED}")
                    .unwrap();
            assert_eq!(result, "identity_header = \"X-User\" # ${IGNORED}");
        });
    }

    #[test]
    fn test_test_stub_on_public_host_errors() {
        let keys = test_key_pair();
        let toml = minimal_config_toml(
            keys,
            r#"
[auth]
type = "test_stub"
"#,
        )
        .replace("host = \"127.0.0.1\"", "host = \"0.0.0.0\"");

        let err = PortcullisConfig::from_str(&toml).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("test_stub"), "unexpected message: {msg}");
    }

    #[test]
    fn test_sso_without_trusted_proxies_non_localhost_errors() {
        let keys = test_key_pair();
        let toml = minimal_config_toml(
            keys,
            r#"
[auth]
type = "sso"
identity_header = "X-Authenticated-Email"
"#,
        )
        .replace("host = \"127.0.0.1\"", "host = \"0.0.0.0\"");

        let err = PortcullisConfig::from_str(&toml).unwrap_err();
        assert!(err.to_string().contains("trusted_proxies"));
    }

    #[test]
    fn test_sso_with_trusted_proxies_non_localhost_ok() {
        let keys = test_key_pair();
        let toml = minimal_config_toml(
            keys,
            r#"
[auth]
type = "sso"
identity_header = "X-Authenticated-Email"
"#,
        )
        .replace(
            "host = \"127.0.0.1\"",
            "host = \"0.0.0.0\"\n[server.trusted_proxies]\ncidrs = [\"10.0.0.0/8\"]",
        );

        let config = PortcullisConfig::from_str(&toml).unwrap();
        assert!(config.server.trusted_proxies.is_configured());
    }

    #[test]
    #[cfg(not(feature = "database-sqlite"))]
    fn test_disabled_sqlite_store_error() {
        let raw: toml::Value = toml::from_str(
            r#"
            [tenants.store]
            type = "sqlite"
            path = "tenants.db"
        "#,
        )
        .unwrap();

        let msg = check_disabled_features(&raw).unwrap_err().to_string();
        assert!(msg.contains("database-sqlite"), "{msg}");
    }

    #[test]
    fn test_static_store_passes_feature_check() {
        let raw: toml::Value = toml::from_str(
            r#"
            [tenants.store]
            type = "static"
        "#,
        )
        .unwrap();

        assert!(check_disabled_features(&raw).is_ok());
    }
}
