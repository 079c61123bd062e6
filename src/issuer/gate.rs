use super::{AssertionSigner, SignedAssertion, SignerError, SigningRequest};
use crate::models::{Subject, Tenant};

/// The tenant does not permit assertion issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denied {
    pub subdomain: String,
}

/// Proof that a tenant passed [`authorize`].
///
/// This is the only way to reach a signer, so nothing can be signed for a
/// tenant whose issuance flag is off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedTenant {
    tenant: Tenant,
}

/// Where the issued assertion is going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueContext {
    pub recipient: String,
    pub audience: String,
    pub in_response_to: Option<String>,
}

/// Check the tenant's issuance flag.
///
/// Runs before any assertion material exists; a denial carries only the
/// tenant key.
pub fn authorize(tenant: Tenant) -> Result<AuthorizedTenant, Denied> {
    if tenant.assertion_issuance_enabled {
        Ok(AuthorizedTenant { tenant })
    } else {
        Err(Denied {
            subdomain: tenant.subdomain,
        })
    }
}

impl AuthorizedTenant {
    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    /// Ask `signer` for an assertion about `subject`.
    ///
    /// The subject is handed over unmodified and the signer's output is
    /// returned as-is.
    pub async fn issue(
        &self,
        signer: &dyn AssertionSigner,
        subject: Subject,
        context: IssueContext,
    ) -> Result<SignedAssertion, SignerError> {
        let request = SigningRequest {
            subject,
            tenant: self.tenant.subdomain.clone(),
            recipient: context.recipient,
            audience: context.audience,
            in_response_to: context.in_response_to,
        };
        signer.sign(&request).await
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::tests::support::RecordingSigner;

    fn context() -> IssueContext {
        IssueContext {
            recipient: "https://acme.example.com/sso".into(),
            audience: "https://sp.acme.example.com".into(),
            in_response_to: Some("_req1".into()),
        }
    }

    #[rstest]
    #[case("user@acme.com")]
    #[case("")]
    #[case("admin")]
    fn test_disabled_tenant_always_denied(#[case] _subject: &str) {
        let result = authorize(Tenant::new("globex", false));
        assert_eq!(
            result,
            Err(Denied {
                subdomain: "globex".into()
            })
        );
    }

    #[test]
    fn test_enabled_tenant_allowed() {
        let authorized = authorize(Tenant::new("acme", true)).unwrap();
        assert_eq!(authorized.tenant().subdomain, "acme");
    }

    #[test]
    fn test_authorize_is_idempotent() {
        let tenant = Tenant::new("acme", true);
        assert_eq!(authorize(tenant.clone()), authorize(tenant));
    }

    #[rstest]
    #[case("user@acme.com")]
    #[case("  User@ACME.com ")]
    #[case("ünïcödé@acme.com")]
    #[tokio::test]
    async fn test_issue_forwards_subject_unmodified(#[case] subject: &str) {
        let signer = RecordingSigner::default();
        let authorized = authorize(Tenant::new("acme", true)).unwrap();

        let signed = authorized
            .issue(&signer, Subject::new(subject), context())
            .await
            .unwrap();

        let calls = signer.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].subject.as_str(), subject);
        assert_eq!(calls[0].tenant, "acme");
        assert_eq!(calls[0].recipient, "https://acme.example.com/sso");
        assert_eq!(calls[0].in_response_to.as_deref(), Some("_req1"));
        assert_eq!(signed.document, RecordingSigner::document_for(subject));
    }
}
