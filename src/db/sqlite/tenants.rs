use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::{db::error::DbResult, models::Tenant, tenant::TenantStore};

pub struct SqliteTenantStore {
    pool: SqlitePool,
}

impl SqliteTenantStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantStore for SqliteTenantStore {
    async fn find_by_subdomain(&self, subdomain: &str) -> DbResult<Option<Tenant>> {
        // The column collates NOCASE for uniqueness; lookups compare exactly.
        let row = sqlx::query(
            r#"
            SELECT subdomain, name, assertion_issuance_enabled
            FROM tenants
            WHERE subdomain = ? COLLATE BINARY
            "#,
        )
        .bind(subdomain)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Tenant {
            subdomain: row.get("subdomain"),
            name: row.get("name"),
            assertion_issuance_enabled: row.get("assertion_issuance_enabled"),
        }))
    }

    async fn health_check(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
