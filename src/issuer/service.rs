use std::{sync::Arc, time::Instant};

use super::{
    AssertionSigner, AuthorizedTenant, IssuanceError, IssueContext, SignedAssertion, authorize,
};
use crate::{
    models::Subject,
    observability::metrics,
    tenant::{NotFoundReason, Resolution, TenantResolver},
};

/// Resolves, gates and signs for one SSO request at a time.
pub struct IssuanceService {
    resolver: TenantResolver,
    signer: Arc<dyn AssertionSigner>,
}

impl IssuanceService {
    pub fn new(resolver: TenantResolver, signer: Arc<dyn AssertionSigner>) -> Self {
        Self { resolver, signer }
    }

    pub fn resolver(&self) -> &TenantResolver {
        &self.resolver
    }

    /// Resolve the tenant owning `endpoint_url` and check it may issue.
    ///
    /// All rejections happen here, before a subject is known.
    pub async fn authorize_endpoint(
        &self,
        endpoint_url: &str,
    ) -> Result<AuthorizedTenant, IssuanceError> {
        let tenant = match self.resolver.resolve(endpoint_url).await? {
            Resolution::Found(tenant) => tenant,
            Resolution::NotFound(reason) => {
                tracing::info!(reason = reason.as_str(), "No tenant for endpoint");
                return Err(match reason {
                    NotFoundReason::MalformedRequestUrl => IssuanceError::MalformedRequestUrl,
                    NotFoundReason::TenantNotFound => IssuanceError::TenantNotFound,
                });
            }
        };

        authorize(tenant).map_err(|denied| {
            tracing::info!(
                tenant = %denied.subdomain,
                "Assertion issuance disabled for tenant"
            );
            IssuanceError::TenantCapabilityDisabled
        })
    }

    /// Sign an assertion for `subject` through the configured signer.
    pub async fn issue(
        &self,
        authorized: &AuthorizedTenant,
        subject: Subject,
        context: IssueContext,
    ) -> Result<SignedAssertion, IssuanceError> {
        let start = Instant::now();
        let result = authorized
            .issue(self.signer.as_ref(), subject, context)
            .await;
        metrics::record_signing(start.elapsed(), result.is_ok());

        let signed = result?;
        tracing::info!(
            tenant = %authorized.tenant().subdomain,
            assertion_id = %signed.assertion_id,
            "Issued assertion"
        );
        Ok(signed)
    }
}
