//! Security headers middleware.
//!
//! Adds standard security headers to all responses to protect against
//! clickjacking, MIME-sniffing and protocol downgrade attacks. Pages that
//! set their own `Content-Security-Policy` (the SAML POST form) keep it.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header, header::HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::{
    AppState,
    config::{HstsConfig, SecurityHeadersConfig},
};

/// Middleware that adds security headers to all responses.
pub async fn security_headers_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let config = &state.config.server.security_headers;

    if !config.enabled {
        return next.run(request).await;
    }

    // Check if this is a secure connection (for HSTS)
    let is_secure = is_secure_connection(&request);

    let mut response = next.run(request).await;
    apply_security_headers(config, is_secure, response.headers_mut());
    response
}

fn apply_security_headers(config: &SecurityHeadersConfig, is_secure: bool, headers: &mut HeaderMap) {
    // X-Content-Type-Options: nosniff
    if let Some(value) = try_header_value(&config.content_type_options) {
        headers.insert(header::X_CONTENT_TYPE_OPTIONS, value);
    }

    // X-Frame-Options: DENY or SAMEORIGIN
    if let Some(value) = config.frame_options.as_deref().and_then(try_header_value) {
        headers.insert(header::X_FRAME_OPTIONS, value);
    }

    // Strict-Transport-Security (only on HTTPS connections)
    if config.hsts.enabled && is_secure {
        let hsts_value = build_hsts_header(&config.hsts);
        if let Some(value) = try_header_value(&hsts_value) {
            headers.insert(header::STRICT_TRANSPORT_SECURITY, value);
        }
    }

    // Content-Security-Policy, unless the handler chose one
    if !headers.contains_key(header::CONTENT_SECURITY_POLICY)
        && let Some(value) = config
            .content_security_policy
            .as_deref()
            .and_then(try_header_value)
    {
        headers.insert(header::CONTENT_SECURITY_POLICY, value);
    }

    // Referrer-Policy
    if let Some(value) = config.referrer_policy.as_deref().and_then(try_header_value) {
        headers.insert(header::REFERRER_POLICY, value);
    }
}

/// Try to convert a string to a header value, returning None if empty or invalid.
fn try_header_value(s: &str) -> Option<HeaderValue> {
    if s.is_empty() {
        return None;
    }
    HeaderValue::try_from(s).ok()
}

/// Build the Strict-Transport-Security header value.
fn build_hsts_header(config: &HstsConfig) -> String {
    let mut parts = vec![format!("max-age={}", config.max_age_secs)];

    if config.include_subdomains {
        parts.push("includeSubDomains".to_string());
    }

    if config.preload {
        parts.push("preload".to_string());
    }

    parts.join("; ")
}

/// Check if the request came over a secure connection.
///
/// This checks for:
/// - X-Forwarded-Proto: https (from reverse proxy)
/// - The request URI scheme (if available)
fn is_secure_connection<B>(request: &Request<B>) -> bool {
    let forwarded_https = request
        .headers()
        .get("x-forwarded-proto")
        .is_some_and(|proto| proto.as_bytes().eq_ignore_ascii_case(b"https"));

    let scheme_https = request
        .uri()
        .scheme_str()
        .is_some_and(|s| s.eq_ignore_ascii_case("https"));

    forwarded_https || scheme_https
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_hsts_header_basic() {
        let config = HstsConfig {
            enabled: true,
            max_age_secs: 31536000,
            include_subdomains: false,
            preload: false,
        };

        assert_eq!(build_hsts_header(&config), "max-age=31536000");
    }

    #[test]
    fn test_build_hsts_header_full() {
        let config = HstsConfig {
            enabled: true,
            max_age_secs: 63072000,
            include_subdomains: true,
            preload: true,
        };

        assert_eq!(
            build_hsts_header(&config),
            "max-age=63072000; includeSubDomains; preload"
        );
    }

    #[test]
    fn test_default_headers() {
        let mut headers = HeaderMap::new();
        apply_security_headers(&SecurityHeadersConfig::default(), false, &mut headers);

        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
        assert_eq!(headers[header::REFERRER_POLICY], "no-referrer");
        assert!(
            headers[header::CONTENT_SECURITY_POLICY]
                .to_str()
                .unwrap()
                .starts_with("default-src 'none'")
        );
        assert!(!headers.contains_key(header::STRICT_TRANSPORT_SECURITY));
    }

    #[test]
    fn test_hsts_only_on_secure_connections() {
        let mut headers = HeaderMap::new();
        apply_security_headers(&SecurityHeadersConfig::default(), true, &mut headers);
        assert_eq!(
            headers[header::STRICT_TRANSPORT_SECURITY],
            "max-age=31536000; includeSubDomains"
        );
    }

    #[test]
    fn test_handler_csp_preserved() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("script-src 'sha256-abc'"),
        );
        apply_security_headers(&SecurityHeadersConfig::default(), false, &mut headers);
        assert_eq!(
            headers[header::CONTENT_SECURITY_POLICY],
            "script-src 'sha256-abc'"
        );
    }

    #[test]
    fn test_forwarded_proto_is_secure() {
        let request = Request::builder()
            .uri("/saml/auth")
            .header("x-forwarded-proto", "HTTPS")
            .body(())
            .unwrap();
        assert!(is_secure_connection(&request));

        let request = Request::builder().uri("/saml/auth").body(()).unwrap();
        assert!(!is_secure_connection(&request));
    }
}
