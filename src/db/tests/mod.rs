//! Shared tenant store test infrastructure
//!
//! Store tests are written as async functions that take `&dyn TenantStore`,
//! so the same assertions run against the in-memory store and the SQLite
//! store (in-memory database with the real migrations applied).
