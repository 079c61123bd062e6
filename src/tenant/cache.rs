use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;

use super::TenantStore;
use crate::{db::DbResult, models::Tenant, observability::metrics};

/// Upper bound on cached keys. Misses are cached too, so without a bound a
/// client could grow the map with random subdomains.
const MAX_ENTRIES: usize = 10_000;

struct CacheEntry {
    tenant: Option<Tenant>,
    expires_at: Instant,
}

/// Tenant store decorator that serves repeated lookups from memory.
///
/// A cached answer (including "no such tenant") is at most `ttl` old, which
/// bounds how long a flipped `assertion_issuance_enabled` flag can go
/// unnoticed. Store errors are never cached.
pub struct CachedTenantStore {
    inner: Arc<dyn TenantStore>,
    ttl: Duration,
    entries: DashMap<String, CacheEntry>,
}

impl CachedTenantStore {
    pub fn new(inner: Arc<dyn TenantStore>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: DashMap::new(),
        }
    }

    fn cached(&self, subdomain: &str) -> Option<Option<Tenant>> {
        let now = Instant::now();
        let entry = self.entries.get(subdomain)?;
        if entry.expires_at > now {
            return Some(entry.tenant.clone());
        }
        drop(entry);
        self.entries.remove_if(subdomain, |_, e| e.expires_at <= now);
        None
    }

    fn store(&self, subdomain: &str, tenant: Option<Tenant>) {
        if self.entries.len() >= MAX_ENTRIES {
            let now = Instant::now();
            self.entries.retain(|_, e| e.expires_at > now);
            if self.entries.len() >= MAX_ENTRIES {
                return;
            }
        }
        self.entries.insert(
            subdomain.to_string(),
            CacheEntry {
                tenant,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}

#[async_trait]
impl TenantStore for CachedTenantStore {
    async fn find_by_subdomain(&self, subdomain: &str) -> DbResult<Option<Tenant>> {
        if let Some(hit) = self.cached(subdomain) {
            metrics::record_tenant_cache("hit");
            return Ok(hit);
        }

        metrics::record_tenant_cache("miss");
        let tenant = self.inner.find_by_subdomain(subdomain).await?;
        self.store(subdomain, tenant.clone());
        Ok(tenant)
    }

    async fn health_check(&self) -> DbResult<()> {
        self.inner.health_check().await
    }
}
