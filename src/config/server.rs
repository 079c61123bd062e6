use std::net::IpAddr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request body size limit in bytes.
    ///
    /// SAML POST bindings are small; the default leaves room for large
    /// AuthnRequests without accepting arbitrary uploads.
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    /// Trusted proxy configuration. Identity headers consumed by the SSO
    /// verifier are only honored from these peers.
    #[serde(default)]
    pub trusted_proxies: TrustedProxiesConfig,

    /// Security headers configuration.
    #[serde(default)]
    pub security_headers: SecurityHeadersConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
            trusted_proxies: TrustedProxiesConfig::default(),
            security_headers: SecurityHeadersConfig::default(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn default_port() -> u16 {
    8080
}

fn default_body_limit() -> usize {
    512 * 1024
}

/// Configuration for trusted reverse proxies.
///
/// **Security Note:** the SSO verifier trusts an identity header set by an
/// authenticating proxy. Only trust that header when the connecting client
/// is a known proxy.
///
/// - `dangerously_trust_all: true` trusts headers from ANY source. Only use
///   when the server cannot be reached except through the proxy.
/// - `cidrs: ["10.0.0.0/8"]` trusts headers only when the connecting IP is
///   within one of the ranges.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct TrustedProxiesConfig {
    /// Trust all peers.
    #[serde(default)]
    pub dangerously_trust_all: bool,

    /// List of trusted proxy CIDR ranges (e.g., ["10.0.0.0/8", "172.16.0.0/12"]).
    #[serde(default)]
    pub cidrs: Vec<String>,
}

impl TrustedProxiesConfig {
    /// Parse the CIDR strings into IpNet objects.
    ///
    /// Invalid CIDRs are logged as warnings and skipped.
    pub fn parsed_cidrs(&self) -> Vec<IpNet> {
        self.cidrs
            .iter()
            .filter_map(|cidr_str| {
                cidr_str.parse::<IpNet>().ok().or_else(|| {
                    tracing::warn!(cidr = %cidr_str, "Invalid CIDR in trusted_proxies config, skipping");
                    None
                })
            })
            .collect()
    }

    /// Check if an IP address is within any of the trusted CIDR ranges.
    pub fn is_trusted_ip(&self, ip: IpAddr, parsed_cidrs: &[IpNet]) -> bool {
        if self.dangerously_trust_all {
            return true;
        }
        parsed_cidrs.iter().any(|cidr| cidr.contains(&ip))
    }

    /// Returns true if proxy headers should potentially be trusted.
    pub fn is_configured(&self) -> bool {
        self.dangerously_trust_all || !self.cidrs.is_empty()
    }
}

/// Security headers configuration.
///
/// Handlers may set their own `Content-Security-Policy`; the configured
/// value only applies to responses that do not carry one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct SecurityHeadersConfig {
    /// Enable security headers.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// X-Content-Type-Options header value.
    #[serde(default = "default_content_type_options")]
    pub content_type_options: String,

    /// X-Frame-Options header value. Default: "DENY"
    #[serde(default = "default_frame_options")]
    pub frame_options: Option<String>,

    /// Strict-Transport-Security header configuration.
    #[serde(default)]
    pub hsts: HstsConfig,

    /// Default Content-Security-Policy header value.
    #[serde(default = "default_csp")]
    pub content_security_policy: Option<String>,

    /// Referrer-Policy header value. SAML responses must not leak through
    /// the Referer header, so the default sends none.
    #[serde(default = "default_referrer_policy")]
    pub referrer_policy: Option<String>,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            content_type_options: default_content_type_options(),
            frame_options: default_frame_options(),
            hsts: HstsConfig::default(),
            content_security_policy: default_csp(),
            referrer_policy: default_referrer_policy(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_content_type_options() -> String {
    "nosniff".to_string()
}

fn default_frame_options() -> Option<String> {
    Some("DENY".to_string())
}

fn default_csp() -> Option<String> {
    Some(
        "default-src 'none'; form-action 'self'; frame-ancestors 'none'; base-uri 'none'"
            .to_string(),
    )
}

fn default_referrer_policy() -> Option<String> {
    Some("no-referrer".to_string())
}

/// HSTS (HTTP Strict Transport Security) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct HstsConfig {
    /// Enable HSTS header. Only sent on HTTPS connections.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Max age in seconds.
    #[serde(default = "default_hsts_max_age")]
    pub max_age_secs: u64,

    /// Include subdomains.
    #[serde(default = "default_true")]
    pub include_subdomains: bool,

    /// Allow preload list inclusion.
    #[serde(default)]
    pub preload: bool,
}

impl Default for HstsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_secs: default_hsts_max_age(),
            include_subdomains: true,
            preload: false,
        }
    }
}

fn default_hsts_max_age() -> u64 {
    31536000 // 1 year
}
