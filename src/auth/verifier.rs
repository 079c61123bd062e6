use std::{net::IpAddr, sync::Arc};

use axum::http::{HeaderMap, HeaderName};
use ipnet::IpNet;

use super::{AuthError, CredentialBackend, StaticCredentials};
use crate::{
    config::{AuthConfig, PortcullisConfig, TrustedProxiesConfig},
    models::{Subject, Tenant},
    observability::metrics,
};

/// Email and password submitted through the login form.
#[derive(Clone)]
pub struct PasswordCredentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for PasswordCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordCredentials")
            .field("email", &"..")
            .field("password", &"****")
            .finish()
    }
}

/// What a verifier gets to look at for one request.
pub struct VerificationInput<'a> {
    /// Tenant the request was authorized for.
    pub tenant: &'a Tenant,
    pub headers: &'a HeaderMap,
    /// Address of the directly connected peer, when known.
    pub connecting_ip: Option<IpAddr>,
    pub credentials: Option<&'a PasswordCredentials>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Authenticated(Subject),
    /// Nothing to verify yet; the caller should prompt for credentials.
    CredentialsRequired,
}

/// Decides which subject an assertion is issued for.
pub enum AuthenticationVerifier {
    Sso(SsoVerifier),
    Password(PasswordVerifier),
    TestStub(TestStubVerifier),
}

impl AuthenticationVerifier {
    pub fn from_config(config: &PortcullisConfig) -> Result<Self, AuthError> {
        Ok(match &config.auth {
            AuthConfig::Sso(sso) => {
                let identity_header = HeaderName::from_bytes(sso.identity_header.as_bytes())
                    .map_err(|e| AuthError::Internal(format!("invalid identity header: {e}")))?;
                AuthenticationVerifier::Sso(SsoVerifier::new(
                    identity_header,
                    config.server.trusted_proxies.clone(),
                ))
            }
            AuthConfig::Password(password) => {
                let backend = StaticCredentials::new(&password.credentials);
                tracing::info!(credentials = backend.len(), "Loaded static credentials");
                AuthenticationVerifier::Password(PasswordVerifier::new(Arc::new(backend)))
            }
            AuthConfig::TestStub => {
                tracing::error!(
                    "The test stub verifier is active: every presented email is accepted \
                     without a password. Never use this outside local testing."
                );
                AuthenticationVerifier::TestStub(TestStubVerifier)
            }
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuthenticationVerifier::Sso(_) => "sso",
            AuthenticationVerifier::Password(_) => "password",
            AuthenticationVerifier::TestStub(_) => "test_stub",
        }
    }

    /// Whether this verifier collects credentials through the login form.
    pub fn uses_login_form(&self) -> bool {
        !matches!(self, AuthenticationVerifier::Sso(_))
    }

    pub async fn verify(&self, input: VerificationInput<'_>) -> Result<Verification, AuthError> {
        let result = match self {
            AuthenticationVerifier::Sso(v) => v.verify(&input),
            AuthenticationVerifier::Password(v) => v.verify(&input).await,
            AuthenticationVerifier::TestStub(v) => v.verify(&input),
        };

        match &result {
            Ok(Verification::Authenticated(_)) => metrics::record_auth_attempt(self.kind(), true),
            Ok(Verification::CredentialsRequired) => {}
            Err(_) => metrics::record_auth_attempt(self.kind(), false),
        }
        result
    }
}

/// Trusts an identity header set by an authenticating reverse proxy.
///
/// **Security:** When `server.trusted_proxies` is configured the header is only
/// read from trusted peers; otherwise any peer can set it, which config
/// validation only permits on loopback binds.
pub struct SsoVerifier {
    identity_header: HeaderName,
    trusted_proxies: TrustedProxiesConfig,
    parsed_cidrs: Vec<IpNet>,
}

impl SsoVerifier {
    pub fn new(identity_header: HeaderName, trusted_proxies: TrustedProxiesConfig) -> Self {
        let parsed_cidrs = trusted_proxies.parsed_cidrs();
        Self {
            identity_header,
            trusted_proxies,
            parsed_cidrs,
        }
    }

    fn verify(&self, input: &VerificationInput<'_>) -> Result<Verification, AuthError> {
        if self.trusted_proxies.is_configured() {
            let is_trusted = match input.connecting_ip {
                Some(ip) => self.trusted_proxies.is_trusted_ip(ip, &self.parsed_cidrs),
                None => self.trusted_proxies.dangerously_trust_all,
            };
            if !is_trusted {
                if let Some(ip) = input.connecting_ip
                    && input.headers.contains_key(&self.identity_header)
                {
                    tracing::warn!(
                        connecting_ip = %ip,
                        identity_header = %self.identity_header,
                        "Ignoring identity header from untrusted IP - \
                         configure server.trusted_proxies to trust this source"
                    );
                }
                return Err(AuthError::MissingIdentity);
            }
        }

        let identity = input
            .headers
            .get(&self.identity_header)
            .ok_or(AuthError::MissingIdentity)?
            .to_str()
            .map_err(|_| AuthError::MissingIdentity)?;
        if identity.is_empty() {
            return Err(AuthError::MissingIdentity);
        }

        Ok(Verification::Authenticated(Subject::new(identity)))
    }
}

/// Checks submitted email/password pairs against a [`CredentialBackend`].
pub struct PasswordVerifier {
    backend: Arc<dyn CredentialBackend>,
}

impl PasswordVerifier {
    pub fn new(backend: Arc<dyn CredentialBackend>) -> Self {
        Self { backend }
    }

    async fn verify(&self, input: &VerificationInput<'_>) -> Result<Verification, AuthError> {
        let Some(credentials) = input.credentials else {
            return Ok(Verification::CredentialsRequired);
        };
        self.backend
            .verify(
                &input.tenant.subdomain,
                &credentials.email,
                &credentials.password,
            )
            .await?
            .map(Verification::Authenticated)
            .ok_or(AuthError::InvalidCredentials)
    }
}

/// Accepts any non-empty email without checking the password.
pub struct TestStubVerifier;

impl TestStubVerifier {
    fn verify(&self, input: &VerificationInput<'_>) -> Result<Verification, AuthError> {
        match input.credentials {
            None => Ok(Verification::CredentialsRequired),
            Some(c) if c.email.is_empty() => Err(AuthError::InvalidCredentials),
            Some(c) => Ok(Verification::Authenticated(Subject::new(c.email.clone()))),
        }
    }
}
