use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[cfg(feature = "database-sqlite")]
use super::SqliteConfig;
use super::ConfigError;
use crate::models::validators::is_valid_dns_label;

/// Tenant resolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct TenantsConfig {
    /// Fixed DNS suffix every service-provider endpoint lives under.
    /// `acme.example.com` resolves to tenant `acme` when this is `example.com`.
    pub domain_suffix: String,

    /// Only accept `https` endpoint URLs.
    #[serde(default)]
    pub require_https: bool,

    /// How the subdomain label is compared with stored tenant keys.
    #[serde(default)]
    pub subdomain_matching: SubdomainMatching,

    /// How long a tenant lookup may be served from memory, in seconds.
    /// Bounds how stale an `assertion_issuance_enabled` flag can be.
    /// Set to 0 to disable caching.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Where tenant records are read from.
    #[serde(default)]
    pub store: TenantStoreConfig,
}

fn default_cache_ttl() -> u64 {
    30
}

impl TenantsConfig {
    pub(super) fn validate(&mut self) -> Result<(), ConfigError> {
        let suffix = self
            .domain_suffix
            .trim()
            .trim_matches('.')
            .to_ascii_lowercase();

        if suffix.is_empty() {
            return Err(ConfigError::Validation(
                "tenants.domain_suffix cannot be empty".into(),
            ));
        }
        if let Some(label) = suffix.split('.').find(|l| !is_valid_dns_label(l)) {
            return Err(ConfigError::Validation(format!(
                "tenants.domain_suffix '{}' contains an invalid DNS label '{}'",
                self.domain_suffix, label
            )));
        }
        self.domain_suffix = suffix;

        self.store.validate()
    }
}

/// Subdomain comparison policy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum SubdomainMatching {
    /// Lowercase the endpoint label before lookup. `ACME.example.com`
    /// resolves to tenant `acme`.
    #[default]
    CaseInsensitive,
    /// Look the label up exactly as written. Tenant keys are stored in
    /// lowercase, so labels containing uppercase letters never match.
    Exact,
}

/// Tenant store backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TenantStoreConfig {
    /// Tenants listed inline in the configuration file.
    Static(StaticTenantsConfig),

    /// Tenants read from a SQLite database.
    #[cfg(feature = "database-sqlite")]
    Sqlite(SqliteConfig),
}

impl Default for TenantStoreConfig {
    fn default() -> Self {
        TenantStoreConfig::Static(StaticTenantsConfig::default())
    }
}

impl TenantStoreConfig {
    fn validate(&mut self) -> Result<(), ConfigError> {
        match self {
            TenantStoreConfig::Static(c) => c.validate(),
            #[cfg(feature = "database-sqlite")]
            TenantStoreConfig::Sqlite(c) => c.validate(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TenantStoreConfig::Static(_) => "static",
            #[cfg(feature = "database-sqlite")]
            TenantStoreConfig::Sqlite(_) => "sqlite",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct StaticTenantsConfig {
    #[serde(default)]
    pub tenants: Vec<StaticTenant>,
}

impl StaticTenantsConfig {
    /// Subdomains are canonicalized to lowercase and must be unique
    /// ignoring case.
    fn validate(&mut self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for tenant in &mut self.tenants {
            if !is_valid_dns_label(&tenant.subdomain) {
                return Err(ConfigError::Validation(format!(
                    "Tenant subdomain '{}' is not a valid DNS label",
                    tenant.subdomain
                )));
            }
            tenant.subdomain = tenant.subdomain.to_ascii_lowercase();
            if !seen.insert(tenant.subdomain.clone()) {
                return Err(ConfigError::Validation(format!(
                    "Tenant subdomain '{}' is configured more than once (subdomains are case-insensitive)",
                    tenant.subdomain
                )));
            }
        }
        Ok(())
    }
}

/// A tenant declared in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct StaticTenant {
    pub subdomain: String,

    #[serde(default)]
    pub name: Option<String>,

    /// Whether assertions may be issued for this tenant.
    #[serde(default)]
    pub assertion_issuance_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<TenantsConfig, ConfigError> {
        let mut config: TenantsConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_suffix_is_normalized() {
        let config = parse(r#"domain_suffix = ".Example.COM.""#).unwrap();
        assert_eq!(config.domain_suffix, "example.com");
        assert_eq!(config.cache_ttl_secs, 30);
        assert!(!config.require_https);
    }

    #[test]
    fn test_empty_suffix_rejected() {
        assert!(parse(r#"domain_suffix = """#).is_err());
        assert!(parse(r#"domain_suffix = "...""#).is_err());
    }

    #[test]
    fn test_invalid_suffix_label_rejected() {
        let err = parse(r#"domain_suffix = "exa_mple.com""#).unwrap_err();
        assert!(err.to_string().contains("exa_mple"));
    }

    #[test]
    fn test_static_tenants_are_lowercased() {
        let config = parse(
            r#"
            domain_suffix = "example.com"

            [store]
            type = "static"

            [[store.tenants]]
            subdomain = "Acme"
            assertion_issuance_enabled = true
        "#,
        )
        .unwrap();

        let TenantStoreConfig::Static(store) = &config.store else {
            panic!("expected static store");
        };
        assert_eq!(store.tenants[0].subdomain, "acme");
        assert!(store.tenants[0].assertion_issuance_enabled);
    }

    #[test]
    fn test_case_insensitive_duplicates_rejected() {
        let err = parse(
            r#"
            domain_suffix = "example.com"

            [store]
            type = "static"

            [[store.tenants]]
            subdomain = "acme"

            [[store.tenants]]
            subdomain = "ACME"
        "#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_invalid_static_subdomain_rejected() {
        let err = parse(
            r#"
            domain_suffix = "example.com"

            [store]
            type = "static"

            [[store.tenants]]
            subdomain = "acme.eu"
        "#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("acme.eu"));
    }

    #[test]
    fn test_exact_matching_parses() {
        let config = parse(
            r#"
            domain_suffix = "example.com"
            subdomain_matching = "exact"
        "#,
        )
        .unwrap();
        assert_eq!(config.subdomain_matching, SubdomainMatching::Exact);
    }
}
