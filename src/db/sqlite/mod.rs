mod tenants;

pub use tenants::SqliteTenantStore;
