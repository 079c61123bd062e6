//! Service-provider endpoint grammar.
//!
//! An endpoint URL names its tenant in the leftmost DNS label:
//!
//! ```text
//! endpoint  = scheme "://" label "." suffix [ ":" port ] [ path-abempty ] [ "?" query ] [ "#" fragment ]
//! scheme    = "http" / "https"            ; "https" only when require_https is set
//! label     = 1*63( ALPHA / DIGIT / "-" ) ; no leading or trailing "-"
//! suffix    = the configured domain suffix, compared ignoring ASCII case
//! ```
//!
//! Userinfo, IP literals, nested labels (`a.b.example.com`) and hosts that
//! merely contain the suffix (`acme.example.com.evil.net`) do not match.

use url::{Host, Url};

use crate::{config::TenantsConfig, models::validators::is_valid_dns_label};

/// Result of parsing an endpoint URL against the grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointHost {
    /// The tenant label, in the case it was written.
    Parsed(String),
    Unparseable,
}

#[derive(Debug, Clone)]
pub struct EndpointGrammar {
    domain_suffix: String,
    require_https: bool,
}

impl EndpointGrammar {
    pub fn new(domain_suffix: &str, require_https: bool) -> Self {
        Self {
            domain_suffix: domain_suffix.trim_matches('.').to_ascii_lowercase(),
            require_https,
        }
    }

    pub fn from_config(config: &TenantsConfig) -> Self {
        Self::new(&config.domain_suffix, config.require_https)
    }

    pub fn domain_suffix(&self) -> &str {
        &self.domain_suffix
    }
}

/// Extract the tenant label from a service-provider endpoint URL.
pub fn parse_endpoint(endpoint_url: &str, grammar: &EndpointGrammar) -> EndpointHost {
    let Ok(url) = Url::parse(endpoint_url.trim()) else {
        return EndpointHost::Unparseable;
    };

    match url.scheme() {
        "https" => {}
        "http" if !grammar.require_https => {}
        _ => return EndpointHost::Unparseable,
    }

    if !url.username().is_empty() || url.password().is_some() {
        return EndpointHost::Unparseable;
    }

    let Some(Host::Domain(host)) = url.host() else {
        return EndpointHost::Unparseable;
    };

    // The URL parser lowercases hosts; recover the written case so the exact
    // matching policy can see it.
    let host = match raw_host(endpoint_url.trim()) {
        Some(raw) if raw.eq_ignore_ascii_case(host) => raw,
        _ => host,
    };

    let Some(label) = strip_suffix_ignore_case(host, &grammar.domain_suffix)
        .and_then(|rest| rest.strip_suffix('.'))
    else {
        return EndpointHost::Unparseable;
    };

    if !is_valid_dns_label(label) {
        return EndpointHost::Unparseable;
    }

    EndpointHost::Parsed(label.to_string())
}

fn strip_suffix_ignore_case<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    if s.len() < suffix.len() || !s.is_char_boundary(s.len() - suffix.len()) {
        return None;
    }
    let (head, tail) = s.split_at(s.len() - suffix.len());
    tail.eq_ignore_ascii_case(suffix).then_some(head)
}

/// Host component of an absolute URL exactly as written.
fn raw_host(input: &str) -> Option<&str> {
    let (_, rest) = input.split_once("://")?;
    let authority = rest.split(['/', '?', '#', '\\']).next()?;
    let host_port = authority.rsplit('@').next()?;
    Some(match host_port.rsplit_once(':') {
        Some((host, port)) if port.bytes().all(|b| b.is_ascii_digit()) => host,
        _ => host_port,
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn grammar() -> EndpointGrammar {
        EndpointGrammar::new("example.com", false)
    }

    #[rstest]
    #[case("https://acme.example.com/sso", "acme")]
    #[case("http://acme.example.com/sso", "acme")]
    #[case("https://acme.example.com", "acme")]
    #[case("https://acme.example.com:8443/saml/consume?x=1#top", "acme")]
    #[case("https://acme-eu.example.com/sso", "acme-eu")]
    #[case("https://ACME.Example.COM/sso", "ACME")]
    #[case("  https://acme.example.com/sso  ", "acme")]
    fn test_parses_tenant_label(#[case] url: &str, #[case] expected: &str) {
        assert_eq!(
            parse_endpoint(url, &grammar()),
            EndpointHost::Parsed(expected.to_string())
        );
    }

    #[rstest]
    #[case::no_subdomain("http://notasub/sso")]
    #[case::bare_suffix("https://example.com/sso")]
    #[case::nested_labels("https://a.b.example.com/sso")]
    #[case::lookalike_host("https://acme.example.com.evil.net/sso")]
    #[case::suffix_inside_label("https://acmeexample.com/sso")]
    #[case::userinfo_confusion("https://acme.example.com@evil.net/sso")]
    #[case::userinfo("https://user@acme.example.com/sso")]
    #[case::ip_literal("https://10.0.0.1/sso")]
    #[case::ftp_scheme("ftp://acme.example.com/sso")]
    #[case::relative("/sso")]
    #[case::empty("")]
    #[case::leading_hyphen("https://-acme.example.com/sso")]
    #[case::underscore("https://ac_me.example.com/sso")]
    #[case::trailing_dot("https://acme.example.com./sso")]
    fn test_rejects_non_matching_urls(#[case] url: &str) {
        assert_eq!(parse_endpoint(url, &grammar()), EndpointHost::Unparseable);
    }

    #[test]
    fn test_require_https() {
        let grammar = EndpointGrammar::new("example.com", true);
        assert_eq!(
            parse_endpoint("http://acme.example.com/sso", &grammar),
            EndpointHost::Unparseable
        );
        assert_eq!(
            parse_endpoint("https://acme.example.com/sso", &grammar),
            EndpointHost::Parsed("acme".into())
        );
    }

    #[test]
    fn test_multi_label_suffix() {
        let grammar = EndpointGrammar::new(".sso.corp.test", false);
        assert_eq!(grammar.domain_suffix(), "sso.corp.test");
        assert_eq!(
            parse_endpoint("https://globex.sso.corp.test/acs", &grammar),
            EndpointHost::Parsed("globex".into())
        );
        assert_eq!(
            parse_endpoint("https://globex.corp.test/acs", &grammar),
            EndpointHost::Unparseable
        );
    }

    #[test]
    fn test_parsing_is_deterministic() {
        let url = "https://acme.example.com/sso";
        assert_eq!(
            parse_endpoint(url, &grammar()),
            parse_endpoint(url, &grammar())
        );
    }

    #[test]
    fn test_raw_host() {
        assert_eq!(raw_host("https://Acme.example.com:443/x"), Some("Acme.example.com"));
        assert_eq!(raw_host("https://u@Acme.example.com"), Some("Acme.example.com"));
        assert_eq!(raw_host("no-scheme"), None);
    }
}
