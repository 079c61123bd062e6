use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::SignerError;
use crate::{auth::AuthError, db::DbError, saml::SamlRequestError};

/// Why an SSO request did not produce an assertion.
///
/// The three tenant rejections render identically so callers cannot tell an
/// unknown tenant from a disabled one.
#[derive(Debug, thiserror::Error)]
pub enum IssuanceError {
    #[error("Service-provider endpoint URL has no tenant subdomain")]
    MalformedRequestUrl,

    #[error("No tenant owns the endpoint subdomain")]
    TenantNotFound,

    #[error("Assertion issuance is disabled for the tenant")]
    TenantCapabilityDisabled,

    #[error("Invalid SAML request: {0}")]
    InvalidSamlRequest(#[from] SamlRequestError),

    #[error("Authentication failed: {0}")]
    Authentication(#[from] AuthError),

    #[error("Tenant store error: {0}")]
    Store(#[from] DbError),

    #[error("Signing failed: {0}")]
    Signer(#[from] SignerError),
}

impl IssuanceError {
    /// Outcome label for logs and metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            IssuanceError::MalformedRequestUrl => "malformed_request_url",
            IssuanceError::TenantNotFound => "tenant_not_found",
            IssuanceError::TenantCapabilityDisabled => "tenant_capability_disabled",
            IssuanceError::InvalidSamlRequest(_) => "invalid_saml_request",
            IssuanceError::Authentication(_) => "unauthenticated",
            IssuanceError::Store(_) => "store_error",
            IssuanceError::Signer(_) => "signer_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            IssuanceError::MalformedRequestUrl
            | IssuanceError::TenantNotFound
            | IssuanceError::TenantCapabilityDisabled => StatusCode::FORBIDDEN,
            IssuanceError::InvalidSamlRequest(_) => StatusCode::BAD_REQUEST,
            IssuanceError::Authentication(AuthError::Internal(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            IssuanceError::Authentication(_) => StatusCode::UNAUTHORIZED,
            IssuanceError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            IssuanceError::Signer(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for IssuanceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, outcome = self.outcome(), "SSO request failed");
        }
        // Rejections carry no body.
        status.into_response()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    async fn body_len(response: Response) -> usize {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .len()
    }

    #[rstest]
    #[case(IssuanceError::MalformedRequestUrl)]
    #[case(IssuanceError::TenantNotFound)]
    #[case(IssuanceError::TenantCapabilityDisabled)]
    #[tokio::test]
    async fn test_tenant_rejections_are_indistinguishable(#[case] error: IssuanceError) {
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get("content-type").is_none());
        assert_eq!(body_len(response).await, 0);
    }

    #[rstest]
    #[case(IssuanceError::InvalidSamlRequest(SamlRequestError::MissingAcsUrl), StatusCode::BAD_REQUEST)]
    #[case(IssuanceError::Authentication(AuthError::MissingIdentity), StatusCode::UNAUTHORIZED)]
    #[case(IssuanceError::Authentication(AuthError::Internal("x".into())), StatusCode::INTERNAL_SERVER_ERROR)]
    #[case(IssuanceError::Store(DbError::Internal("down".into())), StatusCode::SERVICE_UNAVAILABLE)]
    #[case(IssuanceError::Signer(SignerError::Key("bad".into())), StatusCode::INTERNAL_SERVER_ERROR)]
    #[tokio::test]
    async fn test_status_codes(#[case] error: IssuanceError, #[case] expected: StatusCode) {
        let response = error.into_response();
        assert_eq!(response.status(), expected);
        assert_eq!(body_len(response).await, 0);
    }
}
