mod error;
#[cfg(feature = "database-sqlite")]
pub mod sqlite;

#[cfg(all(test, feature = "database-sqlite"))]
pub mod tests;

pub use error::{DbError, DbResult};

/// Connection pool for the SQLite tenant store.
#[cfg(feature = "database-sqlite")]
pub struct DbPool {
    pool: sqlx::SqlitePool,
}

#[cfg(feature = "database-sqlite")]
impl DbPool {
    pub async fn from_config(cfg: &crate::config::SqliteConfig) -> DbResult<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(cfg.max_connections)
            .connect_with(
                sqlx::sqlite::SqliteConnectOptions::new()
                    .filename(&cfg.path)
                    .create_if_missing(cfg.create_if_missing)
                    .journal_mode(if cfg.wal_mode {
                        sqlx::sqlite::SqliteJournalMode::Wal
                    } else {
                        sqlx::sqlite::SqliteJournalMode::Delete
                    })
                    .busy_timeout(std::time::Duration::from_millis(cfg.busy_timeout_ms)),
            )
            .await?;

        Ok(Self { pool })
    }

    /// Run database migrations using sqlx's migration runner.
    /// This automatically creates and manages a _sqlx_migrations table.
    pub async fn run_migrations(&self) -> DbResult<()> {
        tracing::info!("Running SQLite migrations");
        sqlx::migrate!("./migrations_sqlx/sqlite")
            .run(&self.pool)
            .await?;
        tracing::info!("SQLite migrations completed successfully");
        Ok(())
    }

    /// Tenant store backed by this pool.
    pub fn tenants(&self) -> sqlite::SqliteTenantStore {
        sqlite::SqliteTenantStore::new(self.pool.clone())
    }
}
