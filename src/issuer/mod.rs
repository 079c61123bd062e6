//! Assertion issuance.
//!
//! [`authorize`] turns a resolved tenant into an [`AuthorizedTenant`] when
//! the tenant allows issuance; only that token can reach an
//! [`AssertionSigner`]. [`IssuanceService`] ties resolution, the gate and
//! signing together for the HTTP layer.

mod error;
mod gate;
mod service;
mod signer;
mod xmldsig;

pub use error::IssuanceError;
pub use gate::{AuthorizedTenant, Denied, IssueContext, authorize};
pub use service::IssuanceService;
pub use signer::{AssertionSigner, SignedAssertion, SignerError, SigningRequest};
pub use xmldsig::XmlDsigSigner;
