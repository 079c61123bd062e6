use std::collections::HashMap;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::AuthError;
use crate::{config::StaticCredential, models::Subject};

/// Source of truth for email/password checks.
#[async_trait]
pub trait CredentialBackend: Send + Sync {
    /// Returns the account's own identity on success, so the subject does not
    /// depend on how the user typed it. `Ok(None)` covers unknown users and
    /// wrong passwords alike.
    async fn verify(
        &self,
        tenant: &str,
        email: &str,
        password: &str,
    ) -> Result<Option<Subject>, AuthError>;
}

/// Credentials listed in the config file, as SHA-256 password digests.
///
/// Entries are keyed by tenant and by email, both compared ignoring ASCII case.
pub struct StaticCredentials {
    entries: HashMap<(String, String), StoredCredential>,
}

struct StoredCredential {
    email: String,
    password_sha256: String,
}

/// Compared against when the user is unknown, so both paths do the same work.
const DUMMY_DIGEST: &str = "0000000000000000000000000000000000000000000000000000000000000000";

impl StaticCredentials {
    pub fn new<'a>(credentials: impl IntoIterator<Item = &'a StaticCredential>) -> Self {
        let entries = credentials
            .into_iter()
            .map(|c| {
                (
                    (
                        c.tenant.to_ascii_lowercase(),
                        c.email.to_ascii_lowercase(),
                    ),
                    StoredCredential {
                        email: c.email.clone(),
                        password_sha256: c.password_sha256.to_ascii_lowercase(),
                    },
                )
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl CredentialBackend for StaticCredentials {
    async fn verify(
        &self,
        tenant: &str,
        email: &str,
        password: &str,
    ) -> Result<Option<Subject>, AuthError> {
        let key = (tenant.to_ascii_lowercase(), email.to_ascii_lowercase());
        let computed = hash_password(password);

        let stored = self.entries.get(&key);
        let digest = stored.map_or(DUMMY_DIGEST, |s| s.password_sha256.as_str());
        let matches: bool = computed.as_bytes().ct_eq(digest.as_bytes()).into();
        Ok(stored
            .filter(|_| matches)
            .map(|s| Subject::new(s.email.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(tenant: &str, email: &str, password: &str) -> StaticCredential {
        StaticCredential {
            tenant: tenant.into(),
            email: email.into(),
            password_sha256: hash_password(password),
        }
    }

    fn backend() -> StaticCredentials {
        StaticCredentials::new(&[
            credential("acme", "alice@acme.test", "hunter2"),
            credential("globex", "bob@globex.test", "swordfish"),
        ])
    }

    #[test]
    fn test_hash_password() {
        assert_eq!(
            hash_password("password"),
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
        );
    }

    #[tokio::test]
    async fn test_correct_password() {
        assert_eq!(
            backend()
                .verify("acme", "alice@acme.test", "hunter2")
                .await
                .unwrap(),
            Some(Subject::new("alice@acme.test"))
        );
    }

    #[tokio::test]
    async fn test_email_is_case_insensitive() {
        assert_eq!(
            backend()
                .verify("acme", "Alice@ACME.test", "hunter2")
                .await
                .unwrap(),
            Some(Subject::new("alice@acme.test"))
        );
    }

    #[tokio::test]
    async fn test_wrong_password() {
        assert!(
            backend()
                .verify("acme", "alice@acme.test", "Hunter2")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_credentials_are_tenant_scoped() {
        assert!(
            backend()
                .verify("globex", "alice@acme.test", "hunter2")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_unknown_user() {
        assert!(
            backend()
                .verify("acme", "mallory@acme.test", "hunter2")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_dummy_digest_never_matches() {
        let backend = StaticCredentials::new(&Vec::<StaticCredential>::new());
        assert_eq!(backend.len(), 0);
        assert!(
            backend
                .verify("acme", "x@acme.test", "")
                .await
                .unwrap()
                .is_none()
        );
    }
}
