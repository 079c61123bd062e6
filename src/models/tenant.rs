use serde::{Deserialize, Serialize};
use validator::Validate;

use super::validators::validate_subdomain;

/// A customer context that service providers are grouped under.
///
/// Tenants are created and updated by an administrative process outside this
/// service; here they are only read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Tenant {
    /// Canonical lowercase subdomain; unique ignoring case.
    #[validate(custom(function = "validate_subdomain"))]
    pub subdomain: String,
    /// Display name
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    /// Whether assertions may be issued for this tenant's service providers.
    pub assertion_issuance_enabled: bool,
}

impl Tenant {
    pub fn new(subdomain: impl Into<String>, assertion_issuance_enabled: bool) -> Self {
        Self {
            subdomain: subdomain.into(),
            name: None,
            assertion_issuance_enabled,
        }
    }
}

impl From<&crate::config::StaticTenant> for Tenant {
    fn from(t: &crate::config::StaticTenant) -> Self {
        Self {
            subdomain: t.subdomain.to_ascii_lowercase(),
            name: t.name.clone(),
            assertion_issuance_enabled: t.assertion_issuance_enabled,
        }
    }
}

/// Opaque identifier of the party an assertion is issued for.
///
/// Usually an email address. The value is passed to the signer exactly as it
/// was authenticated.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Subject(String);

impl Subject {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self(identifier.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Subjects are personal data; keep them out of `{:?}` output.
impl std::fmt::Debug for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Subject(..)")
    }
}
