//! Tenant resolution.
//!
//! A service-provider endpoint URL is parsed by a pure grammar
//! ([`parse_endpoint`]) into a subdomain label, which is then looked up in
//! an injected [`TenantStore`].

mod cache;
mod endpoint;
mod resolver;
mod store;

pub use cache::CachedTenantStore;
pub use endpoint::{EndpointGrammar, EndpointHost, parse_endpoint};
pub use resolver::{NotFoundReason, Resolution, TenantResolver};
pub use store::{MemoryTenantStore, TenantStore};
