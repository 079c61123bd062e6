use std::collections::HashMap;

use async_trait::async_trait;
use validator::Validate;

use crate::{
    db::{DbError, DbResult},
    models::Tenant,
};

/// Read-only point lookups of tenant records.
///
/// Keys are compared exactly. Tenant subdomains are stored in canonical
/// lowercase form, so case folding is the caller's decision
/// (see [`SubdomainMatching`](crate::config::SubdomainMatching)).
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Find the tenant whose subdomain equals `subdomain`.
    async fn find_by_subdomain(&self, subdomain: &str) -> DbResult<Option<Tenant>>;

    /// Verify the backing store is reachable.
    async fn health_check(&self) -> DbResult<()> {
        Ok(())
    }
}

/// Tenant store over a fixed set of records, typically from the config file.
#[derive(Debug, Default)]
pub struct MemoryTenantStore {
    tenants: HashMap<String, Tenant>,
}

impl MemoryTenantStore {
    /// Build the store, rejecting invalid records and subdomains that collide
    /// ignoring case.
    pub fn new(tenants: impl IntoIterator<Item = Tenant>) -> DbResult<Self> {
        let mut map = HashMap::new();
        for tenant in tenants {
            tenant
                .validate()
                .map_err(|e| DbError::Validation(e.to_string()))?;

            let key = tenant.subdomain.to_ascii_lowercase();
            if map.contains_key(&key) {
                return Err(DbError::Conflict(format!(
                    "Tenant with subdomain '{}' already exists",
                    key
                )));
            }
            map.insert(key, tenant);
        }
        Ok(Self { tenants: map })
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}

#[async_trait]
impl TenantStore for MemoryTenantStore {
    async fn find_by_subdomain(&self, subdomain: &str) -> DbResult<Option<Tenant>> {
        Ok(self.tenants.get(subdomain).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_subdomain_rejected() {
        let result = MemoryTenantStore::new([Tenant::new("acme", true), Tenant::new("acme", false)]);
        assert!(matches!(result, Err(DbError::Conflict(_))));
    }

    #[test]
    fn test_non_canonical_subdomain_rejected() {
        let result = MemoryTenantStore::new([Tenant::new("Acme", true)]);
        assert!(matches!(result, Err(DbError::Validation(_))));
    }

    #[test]
    fn test_empty_store() {
        let store = MemoryTenantStore::new([]).unwrap();
        assert!(store.is_empty());
    }
}
