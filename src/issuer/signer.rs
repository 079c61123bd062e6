use async_trait::async_trait;

use crate::models::Subject;

/// Everything the signer needs to produce one assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningRequest {
    /// Subject exactly as authenticated.
    pub subject: Subject,
    /// Subdomain of the authorized tenant.
    pub tenant: String,
    /// Assertion consumer service URL; also the response `Destination`.
    pub recipient: String,
    /// Service-provider entity the assertion is restricted to.
    pub audience: String,
    /// ID of the AuthnRequest being answered, when there was one.
    pub in_response_to: Option<String>,
}

/// Signed output produced by an [`AssertionSigner`].
#[derive(Debug, Clone)]
pub struct SignedAssertion {
    /// Complete response document, ready to be delivered by a binding.
    pub document: Vec<u8>,
    pub assertion_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("Signing key error: {0}")]
    Key(String),

    #[error("Invalid signing input: {0}")]
    InvalidInput(String),

    #[error("Cryptographic operation failed: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),
}

/// Produces signed assertion documents.
///
/// Implementations own the document format and all key material. Callers
/// only reach a signer through [`super::AuthorizedTenant::issue`].
#[async_trait]
pub trait AssertionSigner: Send + Sync {
    async fn sign(&self, request: &SigningRequest) -> Result<SignedAssertion, SignerError>;
}
