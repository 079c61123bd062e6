//! SAML single sign-on endpoint.
//!
//! `GET /saml/auth` accepts the HTTP-Redirect binding, `POST /saml/auth` the
//! HTTP-POST binding (which is also what the login form submits). Both run
//! the same pipeline:
//!
//! 1. decode and parse the `AuthnRequest`
//! 2. resolve the tenant from its ACS URL and check the issuance flag
//! 3. authenticate the subject
//! 4. sign and deliver the assertion
//!
//! Every tenant rejection happens in step 2, before anything is known about
//! the subject.

use std::{
    net::{IpAddr, SocketAddr},
    time::Instant,
};

use axum::{
    Form,
    extract::{ConnectInfo, Query, State},
    http::{Extensions, HeaderMap},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::{
    AppState,
    auth::{AuthError, PasswordCredentials, Verification, VerificationInput},
    issuer::{IssuanceError, IssueContext},
    observability::metrics,
    saml::{self, SamlRequestError},
};

/// Path the login form posts back to.
pub const SSO_PATH: &str = "/saml/auth";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Redirect,
    Post,
}

impl Binding {
    fn as_str(&self) -> &'static str {
        match self {
            Binding::Redirect => "redirect",
            Binding::Post => "post",
        }
    }

    fn decode(&self, encoded: &str, limit: usize) -> Result<String, SamlRequestError> {
        match self {
            Binding::Redirect => saml::decode_redirect(encoded, limit),
            Binding::Post => saml::decode_post(encoded, limit),
        }
    }
}

/// Query parameters of the HTTP-Redirect binding.
#[derive(Debug, Deserialize)]
pub struct RedirectParams {
    #[serde(rename = "SAMLRequest")]
    pub saml_request: Option<String>,
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
}

/// Form fields of the HTTP-POST binding and the login form.
#[derive(Deserialize)]
pub struct PostParams {
    #[serde(rename = "SAMLRequest")]
    pub saml_request: Option<String>,
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for PostParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostParams")
            .field("saml_request", &self.saml_request.as_ref().map(|_| ".."))
            .field("relay_state", &self.relay_state)
            .field("email", &self.email.as_ref().map(|_| ".."))
            .field("password", &self.password.as_ref().map(|_| "****"))
            .finish()
    }
}

/// Everything one SSO request carries, independent of binding.
struct SsoRequest<'a> {
    binding: Binding,
    saml_request: Option<&'a str>,
    relay_state: Option<&'a str>,
    headers: &'a HeaderMap,
    connecting_ip: Option<IpAddr>,
    credentials: Option<PasswordCredentials>,
}

/// What a successful pass through the pipeline produced.
enum SsoOutcome {
    Issued {
        acs_url: String,
        document: Vec<u8>,
    },
    LoginForm {
        tenant: String,
        saml_request: String,
        failed: bool,
    },
}

impl SsoOutcome {
    fn label(&self) -> &'static str {
        match self {
            SsoOutcome::Issued { .. } => "issued",
            SsoOutcome::LoginForm { failed: false, .. } => "credentials_required",
            SsoOutcome::LoginForm { failed: true, .. } => "invalid_credentials",
        }
    }
}

/// HTTP-Redirect binding.
#[tracing::instrument(name = "sso.redirect", skip_all)]
pub async fn sso_redirect(
    State(state): State<AppState>,
    extensions: Extensions,
    headers: HeaderMap,
    Query(params): Query<RedirectParams>,
) -> Response {
    let request = SsoRequest {
        binding: Binding::Redirect,
        saml_request: params.saml_request.as_deref(),
        relay_state: params.relay_state.as_deref(),
        headers: &headers,
        connecting_ip: connecting_ip(&extensions),
        credentials: None,
    };
    respond(&state, request).await
}

/// HTTP-POST binding; also receives login form submissions.
#[tracing::instrument(name = "sso.post", skip_all)]
pub async fn sso_post(
    State(state): State<AppState>,
    extensions: Extensions,
    headers: HeaderMap,
    Form(params): Form<PostParams>,
) -> Response {
    let credentials = params.email.map(|email| PasswordCredentials {
        email,
        password: params.password.unwrap_or_default(),
    });
    let request = SsoRequest {
        binding: Binding::Post,
        saml_request: params.saml_request.as_deref(),
        relay_state: params.relay_state.as_deref(),
        headers: &headers,
        connecting_ip: connecting_ip(&extensions),
        credentials,
    };
    respond(&state, request).await
}

fn connecting_ip(extensions: &Extensions) -> Option<IpAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

async fn respond(state: &AppState, request: SsoRequest<'_>) -> Response {
    let start = Instant::now();
    let binding = request.binding;
    let relay_state = request.relay_state;

    let result = process(state, request).await;
    let outcome = match &result {
        Ok(outcome) => outcome.label(),
        Err(e) => e.outcome(),
    };
    metrics::record_sso_request(binding.as_str(), outcome, start.elapsed());
    tracing::debug!(binding = binding.as_str(), outcome, "SSO request finished");

    match result {
        Ok(SsoOutcome::Issued { acs_url, document }) => {
            saml::auto_submit_response(&acs_url, &document, relay_state)
        }
        Ok(SsoOutcome::LoginForm {
            tenant,
            saml_request,
            failed,
        }) => saml::login_form(SSO_PATH, &tenant, &saml_request, relay_state, failed),
        Err(e) => e.into_response(),
    }
}

async fn process(state: &AppState, request: SsoRequest<'_>) -> Result<SsoOutcome, IssuanceError> {
    let encoded = request
        .saml_request
        .filter(|s| !s.is_empty())
        .ok_or(SamlRequestError::Missing)?;
    let xml = request
        .binding
        .decode(encoded, state.config.idp.max_request_bytes)?;
    let authn_request = saml::parse_authn_request(&xml)?;

    let authorized = state
        .issuance
        .authorize_endpoint(&authn_request.acs_url)
        .await?;
    let tenant = authorized.tenant();

    let verification = state
        .verifier
        .verify(VerificationInput {
            tenant,
            headers: request.headers,
            connecting_ip: request.connecting_ip,
            credentials: request.credentials.as_ref(),
        })
        .await;

    let login_form = |failed: bool| SsoOutcome::LoginForm {
        tenant: tenant.name.clone().unwrap_or_else(|| tenant.subdomain.clone()),
        saml_request: saml::encode_post(&xml),
        failed,
    };

    let subject = match verification {
        Ok(Verification::Authenticated(subject)) => subject,
        Ok(Verification::CredentialsRequired) => return Ok(login_form(false)),
        Err(AuthError::InvalidCredentials) if state.verifier.uses_login_form() => {
            tracing::info!(tenant = %tenant.subdomain, "Rejected sign-in attempt");
            return Ok(login_form(true));
        }
        Err(e) => return Err(e.into()),
    };

    let context = IssueContext {
        recipient: authn_request.acs_url.clone(),
        audience: authn_request
            .issuer
            .unwrap_or_else(|| authn_request.acs_url.clone()),
        in_response_to: authn_request.id,
    };
    let signed = state.issuance.issue(&authorized, subject, context).await?;

    Ok(SsoOutcome::Issued {
        acs_url: authn_request.acs_url,
        document: signed.document,
    })
}
