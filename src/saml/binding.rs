use std::sync::LazyLock;

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use quick_xml::escape::escape;
use sha2::{Digest, Sha256};

const AUTO_SUBMIT_SCRIPT: &str = "document.forms[0].submit();";

/// CSP source for the inline auto-submit script.
static AUTO_SUBMIT_SCRIPT_HASH: LazyLock<String> = LazyLock::new(|| {
    format!(
        "'sha256-{}'",
        STANDARD.encode(Sha256::digest(AUTO_SUBMIT_SCRIPT.as_bytes()))
    )
});

/// Deliver a signed response to the service provider over HTTP-POST.
///
/// The page posts `SAMLResponse` (and `RelayState`, when present) to the ACS
/// URL as soon as it loads. Its policy only allows the inline script by hash
/// and form submission to the ACS origin.
pub fn auto_submit_response(acs_url: &str, document: &[u8], relay_state: Option<&str>) -> Response {
    let relay_state_field = relay_state
        .map(|rs| {
            format!(
                r#"<input type="hidden" name="RelayState" value="{}"/>"#,
                escape(rs)
            )
        })
        .unwrap_or_default();

    let body = format!(
        concat!(
            "<!DOCTYPE html>\n",
            r#"<html><head><meta charset="utf-8"><title>Signing in</title></head>"#,
            r#"<body><form method="post" action="{action}">"#,
            r#"<input type="hidden" name="SAMLResponse" value="{response}"/>{relay_state}"#,
            r#"<noscript><button type="submit">Continue</button></noscript>"#,
            r#"</form><script>{script}</script></body></html>"#,
        ),
        action = escape(acs_url),
        response = STANDARD.encode(document),
        relay_state = relay_state_field,
        script = AUTO_SUBMIT_SCRIPT,
    );

    let csp = format!(
        "default-src 'none'; script-src {}; form-action {}; base-uri 'none'; frame-ancestors 'none'",
        *AUTO_SUBMIT_SCRIPT_HASH,
        form_action_source(acs_url),
    );

    html_response(StatusCode::OK, body, Some(csp))
}

/// Render the sign-in form for form-based verifiers.
///
/// The original `SAMLRequest` is carried through in HTTP-POST encoding so the
/// submission is handled like any other POST-binding request.
pub fn login_form(
    action: &str,
    tenant: &str,
    saml_request: &str,
    relay_state: Option<&str>,
    failed: bool,
) -> Response {
    let relay_state_field = relay_state
        .map(|rs| {
            format!(
                r#"<input type="hidden" name="RelayState" value="{}"/>"#,
                escape(rs)
            )
        })
        .unwrap_or_default();
    let error = if failed {
        r#"<p role="alert">Invalid email or password.</p>"#
    } else {
        ""
    };

    let body = format!(
        concat!(
            "<!DOCTYPE html>\n",
            r#"<html><head><meta charset="utf-8"><title>Sign in to {tenant}</title></head>"#,
            r#"<body><h1>Sign in to {tenant}</h1>{error}"#,
            r#"<form method="post" action="{action}">"#,
            r#"<input type="hidden" name="SAMLRequest" value="{saml_request}"/>{relay_state}"#,
            r#"<label>Email <input type="email" name="email" autocomplete="username" required/></label>"#,
            r#"<label>Password <input type="password" name="password" autocomplete="current-password"/></label>"#,
            r#"<button type="submit">Sign in</button>"#,
            r#"</form></body></html>"#,
        ),
        tenant = escape(tenant),
        error = error,
        action = escape(action),
        saml_request = escape(saml_request),
        relay_state = relay_state_field,
    );

    let status = if failed {
        StatusCode::UNAUTHORIZED
    } else {
        StatusCode::OK
    };
    html_response(status, body, None)
}

fn form_action_source(acs_url: &str) -> String {
    match url::Url::parse(acs_url) {
        Ok(url) if url.origin().is_tuple() => url.origin().ascii_serialization(),
        _ => "'none'".to_string(),
    }
}

fn html_response(status: StatusCode, body: String, csp: Option<String>) -> Response {
    let mut response = (
        status,
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        body,
    )
        .into_response();

    if let Some(csp) = csp
        && let Ok(value) = HeaderValue::from_str(&csp)
    {
        response
            .headers_mut()
            .insert(header::CONTENT_SECURITY_POLICY, value);
    }
    response
}
