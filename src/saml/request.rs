use std::io::Read;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use flate2::read::DeflateDecoder;
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};

/// The parts of an AuthnRequest the issuer acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthnRequest {
    /// Request ID, echoed as `InResponseTo`.
    pub id: Option<String>,
    /// Service-provider entity ID.
    pub issuer: Option<String>,
    /// `AssertionConsumerServiceURL`; the tenant is resolved from this.
    pub acs_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SamlRequestError {
    #[error("SAMLRequest parameter is missing")]
    Missing,

    #[error("SAMLRequest is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("SAMLRequest could not be inflated: {0}")]
    Inflate(#[from] std::io::Error),

    #[error("SAMLRequest exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("SAMLRequest is not valid UTF-8")]
    Utf8,

    #[error("SAMLRequest is not well-formed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("SAMLRequest must not contain a document type declaration")]
    DocType,

    #[error("SAMLRequest root element is not AuthnRequest")]
    NotAuthnRequest,

    #[error("AuthnRequest has no AssertionConsumerServiceURL")]
    MissingAcsUrl,
}

/// Decode an HTTP-Redirect binding `SAMLRequest` (base64 of raw DEFLATE).
///
/// Inflation stops one byte past `limit`.
pub fn decode_redirect(encoded: &str, limit: usize) -> Result<String, SamlRequestError> {
    let compressed = STANDARD.decode(strip_whitespace(encoded))?;

    let mut xml = Vec::new();
    DeflateDecoder::new(compressed.as_slice())
        .take(limit as u64 + 1)
        .read_to_end(&mut xml)?;
    if xml.len() > limit {
        return Err(SamlRequestError::TooLarge { limit });
    }

    String::from_utf8(xml).map_err(|_| SamlRequestError::Utf8)
}

/// Decode an HTTP-POST binding `SAMLRequest` (plain base64).
pub fn decode_post(encoded: &str, limit: usize) -> Result<String, SamlRequestError> {
    let encoded = strip_whitespace(encoded);
    // Base64 inflates by 4/3; reject before decoding anything oversized.
    if encoded.len() / 4 * 3 > limit + 3 {
        return Err(SamlRequestError::TooLarge { limit });
    }
    let xml = STANDARD.decode(&encoded)?;
    if xml.len() > limit {
        return Err(SamlRequestError::TooLarge { limit });
    }
    String::from_utf8(xml).map_err(|_| SamlRequestError::Utf8)
}

/// Encode request XML for re-submission over HTTP-POST.
pub fn encode_post(xml: &str) -> String {
    STANDARD.encode(xml.as_bytes())
}

fn strip_whitespace(encoded: &str) -> String {
    encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect()
}

/// Extract ID, Issuer and AssertionConsumerServiceURL from an AuthnRequest.
///
/// Signatures on the request are not validated.
pub fn parse_authn_request(xml: &str) -> Result<AuthnRequest, SamlRequestError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut depth = 0usize;
    let mut root: Option<(Option<String>, Option<String>)> = None;
    let mut in_issuer = false;
    let mut issuer: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::DocType(_) => return Err(SamlRequestError::DocType),
            Event::Start(e) => {
                if depth == 0 && root.is_none() {
                    root = Some(root_attributes(&e)?);
                } else if depth == 1 && e.local_name().as_ref() == b"Issuer" {
                    in_issuer = true;
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if depth == 0 && root.is_none() {
                    root = Some(root_attributes(&e)?);
                }
            }
            Event::Text(t) if in_issuer => {
                let text = t.unescape()?;
                issuer.get_or_insert_with(String::new).push_str(&text);
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 1 {
                    in_issuer = false;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let (id, acs_url) = root.ok_or(SamlRequestError::NotAuthnRequest)?;
    let acs_url = acs_url
        .filter(|url| !url.is_empty())
        .ok_or(SamlRequestError::MissingAcsUrl)?;

    Ok(AuthnRequest {
        id,
        issuer: issuer.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        acs_url,
    })
}

/// Check the root element name and pull `ID` and the ACS URL from it.
fn root_attributes(
    e: &BytesStart<'_>,
) -> Result<(Option<String>, Option<String>), SamlRequestError> {
    if e.local_name().as_ref() != b"AuthnRequest" {
        return Err(SamlRequestError::NotAuthnRequest);
    }

    let mut id = None;
    let mut acs_url = None;
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        match attr.key.local_name().as_ref() {
            b"ID" => id = Some(attr.unescape_value()?.into_owned()),
            b"AssertionConsumerServiceURL" => {
                acs_url = Some(attr.unescape_value()?.into_owned())
            }
            _ => {}
        }
    }
    Ok((id, acs_url))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::{Compression, write::DeflateEncoder};

    use super::*;

    const REQUEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol"
    xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion"
    ID="_a1b2c3" Version="2.0" IssueInstant="2026-10-19T12:00:00Z"
    AssertionConsumerServiceURL="https://acme.example.com/sso?x=1&amp;y=2"
    ProtocolBinding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST">
  <saml:Issuer>https://sp.acme.example.com</saml:Issuer>
  <samlp:NameIDPolicy AllowCreate="true"/>
</samlp:AuthnRequest>"#;

    fn deflate(xml: &str) -> String {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(xml.as_bytes()).unwrap();
        STANDARD.encode(encoder.finish().unwrap())
    }

    #[test]
    fn test_parse_authn_request() {
        let request = parse_authn_request(REQUEST).unwrap();
        assert_eq!(
            request,
            AuthnRequest {
                id: Some("_a1b2c3".into()),
                issuer: Some("https://sp.acme.example.com".into()),
                acs_url: "https://acme.example.com/sso?x=1&y=2".into(),
            }
        );
    }

    #[test]
    fn test_parse_self_closing_request() {
        let request = parse_authn_request(
            r#"<AuthnRequest ID="_x" AssertionConsumerServiceURL="https://acme.example.com/sso"/>"#,
        )
        .unwrap();
        assert_eq!(request.id.as_deref(), Some("_x"));
        assert_eq!(request.issuer, None);
    }

    #[test]
    fn test_nested_issuer_ignored() {
        let request = parse_authn_request(
            r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" AssertionConsumerServiceURL="https://acme.example.com/sso"><samlp:Extensions><Issuer>evil</Issuer></samlp:Extensions></samlp:AuthnRequest>"#,
        )
        .unwrap();
        assert_eq!(request.issuer, None);
    }

    #[test]
    fn test_missing_acs_url() {
        let err = parse_authn_request(r#"<AuthnRequest ID="_x"></AuthnRequest>"#).unwrap_err();
        assert!(matches!(err, SamlRequestError::MissingAcsUrl));
    }

    #[test]
    fn test_wrong_root() {
        let err = parse_authn_request(r#"<LogoutRequest ID="_x"/>"#).unwrap_err();
        assert!(matches!(err, SamlRequestError::NotAuthnRequest));
    }

    #[test]
    fn test_empty_document() {
        let err = parse_authn_request("").unwrap_err();
        assert!(matches!(err, SamlRequestError::NotAuthnRequest));
    }

    #[test]
    fn test_doctype_rejected() {
        let err = parse_authn_request(
            r#"<!DOCTYPE x [<!ENTITY a "b">]><AuthnRequest AssertionConsumerServiceURL="https://acme.example.com/sso"/>"#,
        )
        .unwrap_err();
        assert!(matches!(err, SamlRequestError::DocType));
    }

    #[test]
    fn test_decode_redirect() {
        let xml = decode_redirect(&deflate(REQUEST), 64 * 1024).unwrap();
        assert_eq!(xml, REQUEST);
    }

    #[test]
    fn test_decode_redirect_limit() {
        let big = "a".repeat(10_000);
        let err = decode_redirect(&deflate(&big), 1024).unwrap_err();
        assert!(matches!(err, SamlRequestError::TooLarge { limit: 1024 }));
    }

    #[test]
    fn test_decode_post_with_line_breaks() {
        let encoded = encode_post(REQUEST);
        let wrapped = encoded
            .as_bytes()
            .chunks(76)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join("\r\n");
        assert_eq!(decode_post(&wrapped, 64 * 1024).unwrap(), REQUEST);
    }

    #[test]
    fn test_decode_post_line_breaks_do_not_count_toward_limit() {
        let body = "a".repeat(1000);
        let wrapped = encode_post(&body)
            .as_bytes()
            .chunks(76)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join("\r\n");
        assert_eq!(decode_post(&wrapped, 1010).unwrap(), body);
    }

    #[test]
    fn test_decode_post_limit() {
        let encoded = encode_post(&"a".repeat(2048));
        assert!(matches!(
            decode_post(&encoded, 1024),
            Err(SamlRequestError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_decode_post_invalid_base64() {
        assert!(matches!(
            decode_post("not base64!", 1024),
            Err(SamlRequestError::Base64(_))
        ));
    }
}
