use std::sync::Arc;

use super::{EndpointGrammar, EndpointHost, TenantStore, parse_endpoint};
use crate::{config::SubdomainMatching, db::DbResult, models::Tenant};

/// Why an endpoint did not resolve to a tenant.
///
/// Callers must not expose the distinction; it exists for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    /// The endpoint URL does not carry an extractable subdomain.
    MalformedRequestUrl,
    /// The subdomain is well-formed but no tenant owns it.
    TenantNotFound,
}

impl NotFoundReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotFoundReason::MalformedRequestUrl => "malformed_request_url",
            NotFoundReason::TenantNotFound => "tenant_not_found",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(Tenant),
    NotFound(NotFoundReason),
}

/// Maps service-provider endpoint URLs to tenants.
pub struct TenantResolver {
    grammar: EndpointGrammar,
    matching: SubdomainMatching,
    store: Arc<dyn TenantStore>,
}

impl TenantResolver {
    pub fn new(
        grammar: EndpointGrammar,
        matching: SubdomainMatching,
        store: Arc<dyn TenantStore>,
    ) -> Self {
        Self {
            grammar,
            matching,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn TenantStore> {
        &self.store
    }

    /// Resolve the tenant named by `endpoint_url`.
    ///
    /// Store failures are returned as errors so the caller fails closed;
    /// they are never reported as `NotFound`.
    pub async fn resolve(&self, endpoint_url: &str) -> DbResult<Resolution> {
        let label = match parse_endpoint(endpoint_url, &self.grammar) {
            EndpointHost::Parsed(label) => label,
            EndpointHost::Unparseable => {
                return Ok(Resolution::NotFound(NotFoundReason::MalformedRequestUrl));
            }
        };

        let key = match self.matching {
            SubdomainMatching::CaseInsensitive => label.to_ascii_lowercase(),
            SubdomainMatching::Exact => label,
        };

        Ok(match self.store.find_by_subdomain(&key).await? {
            Some(tenant) => Resolution::Found(tenant),
            None => Resolution::NotFound(NotFoundReason::TenantNotFound),
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use rstest::rstest;

    use super::*;
    use crate::{db::DbError, tenant::MemoryTenantStore};

    fn resolver(matching: SubdomainMatching) -> TenantResolver {
        let store = MemoryTenantStore::new([
            Tenant::new("acme", true),
            Tenant::new("globex", false),
        ])
        .unwrap();
        TenantResolver::new(
            EndpointGrammar::new("example.com", false),
            matching,
            Arc::new(store),
        )
    }

    #[tokio::test]
    async fn test_resolves_existing_tenant() {
        let resolution = resolver(SubdomainMatching::CaseInsensitive)
            .resolve("https://acme.example.com/sso")
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::Found(Tenant::new("acme", true)));
    }

    #[tokio::test]
    async fn test_disabled_tenant_still_resolves() {
        let resolution = resolver(SubdomainMatching::CaseInsensitive)
            .resolve("https://globex.example.com/sso")
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::Found(Tenant::new("globex", false)));
    }

    #[tokio::test]
    async fn test_unknown_tenant() {
        let resolution = resolver(SubdomainMatching::CaseInsensitive)
            .resolve("https://ghost.example.com/sso")
            .await
            .unwrap();
        assert_eq!(
            resolution,
            Resolution::NotFound(NotFoundReason::TenantNotFound)
        );
    }

    #[rstest]
    #[case("http://notasub/sso")]
    #[case("https://acme.example.com.evil.net/sso")]
    #[case("not a url")]
    #[tokio::test]
    async fn test_malformed_urls(#[case] url: &str) {
        let resolution = resolver(SubdomainMatching::CaseInsensitive)
            .resolve(url)
            .await
            .unwrap();
        assert_eq!(
            resolution,
            Resolution::NotFound(NotFoundReason::MalformedRequestUrl)
        );
    }

    #[tokio::test]
    async fn test_case_insensitive_matching() {
        let resolution = resolver(SubdomainMatching::CaseInsensitive)
            .resolve("https://ACME.example.com/sso")
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::Found(Tenant::new("acme", true)));
    }

    #[tokio::test]
    async fn test_exact_matching_rejects_uppercase() {
        let resolver = resolver(SubdomainMatching::Exact);

        assert_eq!(
            resolver
                .resolve("https://ACME.example.com/sso")
                .await
                .unwrap(),
            Resolution::NotFound(NotFoundReason::TenantNotFound)
        );
        assert_eq!(
            resolver
                .resolve("https://acme.example.com/sso")
                .await
                .unwrap(),
            Resolution::Found(Tenant::new("acme", true))
        );
    }

    struct FailingStore;

    #[async_trait]
    impl TenantStore for FailingStore {
        async fn find_by_subdomain(&self, _subdomain: &str) -> DbResult<Option<Tenant>> {
            Err(DbError::Internal("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let resolver = TenantResolver::new(
            EndpointGrammar::new("example.com", false),
            SubdomainMatching::CaseInsensitive,
            Arc::new(FailingStore),
        );
        assert!(resolver.resolve("https://acme.example.com/sso").await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_url_skips_store() {
        let resolver = TenantResolver::new(
            EndpointGrammar::new("example.com", false),
            SubdomainMatching::CaseInsensitive,
            Arc::new(FailingStore),
        );
        assert_eq!(
            resolver.resolve("http://notasub/sso").await.unwrap(),
            Resolution::NotFound(NotFoundReason::MalformedRequestUrl)
        );
    }
}
