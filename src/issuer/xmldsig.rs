//! SAML 2.0 response signer using enveloped XML signatures.
//!
//! The assertion is written directly in exclusive canonical form (namespace
//! declaration on the apex element, attributes in sorted order, explicit end
//! tags, no inter-element whitespace, canonical escaping), so the digest is
//! computed over exactly the bytes that appear in the document once the
//! `ds:Signature` element is removed.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use openssl::{
    hash::MessageDigest,
    pkey::{Id, PKey, Private},
    sign::Signer,
    x509::X509,
};
use sha2::{Digest, Sha256};

use super::{AssertionSigner, SignedAssertion, SignerError, SigningRequest};
use crate::config::IdpConfig;

const SAML_ASSERTION_NS: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
const SAML_PROTOCOL_NS: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
const XMLDSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
const BEARER: &str = "urn:oasis:names:tc:SAML:2.0:cm:bearer";
const STATUS_SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";
const PASSWORD_PROTECTED_TRANSPORT: &str =
    "urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport";

pub struct XmlDsigSigner {
    entity_id: String,
    key: PKey<Private>,
    /// Base64 DER of the signing certificate, as carried in `KeyInfo`.
    certificate_b64: String,
    assertion_lifetime: TimeDelta,
    clock_skew: TimeDelta,
    name_id_format: String,
}

impl XmlDsigSigner {
    /// Load the signing identity described by `[idp]`.
    ///
    /// The key must be RSA and must belong to the certificate.
    pub fn from_config(config: &IdpConfig) -> Result<Self, SignerError> {
        let cert_pem = config
            .certificate_pem()
            .map_err(|e| SignerError::Key(e.to_string()))?;
        let key_pem = config
            .private_key_pem()
            .map_err(|e| SignerError::Key(e.to_string()))?;

        let certificate = X509::from_pem(cert_pem.as_bytes())
            .map_err(|e| SignerError::Key(format!("invalid certificate: {e}")))?;
        let key = PKey::private_key_from_pem(key_pem.as_bytes())
            .map_err(|e| SignerError::Key(format!("invalid private key: {e}")))?;

        if key.id() != Id::RSA {
            return Err(SignerError::Key("signing key must be RSA".into()));
        }
        let certificate_key = certificate.public_key()?;
        if !key.public_eq(&certificate_key) {
            return Err(SignerError::Key(
                "private key does not match the certificate".into(),
            ));
        }

        let assertion_lifetime = seconds(config.assertion_lifetime_secs)?;
        let clock_skew = seconds(config.clock_skew_secs)?;

        Ok(Self {
            entity_id: config.entity_id.clone(),
            key,
            certificate_b64: STANDARD.encode(certificate.to_der()?),
            assertion_lifetime,
            clock_skew,
            name_id_format: config.name_id_format.clone(),
        })
    }

    fn sign_at(
        &self,
        request: &SigningRequest,
        now: DateTime<Utc>,
    ) -> Result<SignedAssertion, SignerError> {
        check_xml_chars("subject", request.subject.as_str())?;
        check_xml_chars("recipient", &request.recipient)?;
        check_xml_chars("audience", &request.audience)?;
        if let Some(id) = &request.in_response_to {
            check_xml_chars("in_response_to", id)?;
        }

        let expires = now
            .checked_add_signed(self.assertion_lifetime)
            .ok_or_else(|| SignerError::InvalidInput("assertion lifetime out of range".into()))?;
        let not_before = now
            .checked_sub_signed(self.clock_skew)
            .ok_or_else(|| SignerError::InvalidInput("clock skew out of range".into()))?;

        let assertion_id = new_id();
        let issue_instant = timestamp(now);
        let expires = timestamp(expires);
        let in_response_to_attr = request
            .in_response_to
            .as_deref()
            .map(|id| format!(r#" InResponseTo="{}""#, escape_attr(id)))
            .unwrap_or_default();

        let head = format!(
            r#"<saml:Assertion xmlns:saml="{SAML_ASSERTION_NS}" ID="{assertion_id}" IssueInstant="{issue_instant}" Version="2.0"><saml:Issuer>{issuer}</saml:Issuer>"#,
            issuer = escape_text(&self.entity_id),
        );
        let tail = format!(
            concat!(
                r#"<saml:Subject><saml:NameID Format="{format}">{subject}</saml:NameID>"#,
                r#"<saml:SubjectConfirmation Method="{BEARER}">"#,
                r#"<saml:SubjectConfirmationData{in_response_to} NotOnOrAfter="{expires}" Recipient="{recipient}"></saml:SubjectConfirmationData>"#,
                r#"</saml:SubjectConfirmation></saml:Subject>"#,
                r#"<saml:Conditions NotBefore="{not_before}" NotOnOrAfter="{expires}">"#,
                r#"<saml:AudienceRestriction><saml:Audience>{audience}</saml:Audience></saml:AudienceRestriction>"#,
                r#"</saml:Conditions>"#,
                r#"<saml:AuthnStatement AuthnInstant="{issue_instant}" SessionIndex="{session_index}">"#,
                r#"<saml:AuthnContext><saml:AuthnContextClassRef>{class_ref}</saml:AuthnContextClassRef></saml:AuthnContext>"#,
                r#"</saml:AuthnStatement></saml:Assertion>"#,
            ),
            format = escape_attr(&self.name_id_format),
            subject = escape_text(request.subject.as_str()),
            BEARER = BEARER,
            in_response_to = in_response_to_attr,
            expires = expires,
            recipient = escape_attr(&request.recipient),
            not_before = timestamp(not_before),
            audience = escape_text(&request.audience),
            issue_instant = issue_instant,
            session_index = new_id(),
            class_ref = PASSWORD_PROTECTED_TRANSPORT,
        );

        let digest = STANDARD.encode(Sha256::digest(format!("{head}{tail}").as_bytes()));
        let signed_info = format!(
            concat!(
                r#"<ds:SignedInfo>"#,
                r#"<ds:CanonicalizationMethod Algorithm="{EXC_C14N}"></ds:CanonicalizationMethod>"#,
                r#"<ds:SignatureMethod Algorithm="{RSA_SHA256}"></ds:SignatureMethod>"#,
                r##"<ds:Reference URI="#{assertion_id}"><ds:Transforms>"##,
                r#"<ds:Transform Algorithm="{ENVELOPED_SIGNATURE}"></ds:Transform>"#,
                r#"<ds:Transform Algorithm="{EXC_C14N}"></ds:Transform>"#,
                r#"</ds:Transforms><ds:DigestMethod Algorithm="{SHA256}"></ds:DigestMethod>"#,
                r#"<ds:DigestValue>{digest}</ds:DigestValue></ds:Reference></ds:SignedInfo>"#,
            ),
            EXC_C14N = EXC_C14N,
            RSA_SHA256 = RSA_SHA256,
            assertion_id = assertion_id,
            ENVELOPED_SIGNATURE = ENVELOPED_SIGNATURE,
            SHA256 = SHA256,
            digest = digest,
        );

        // Canonical SignedInfo renders the inherited ds namespace on itself.
        let canonical_signed_info = signed_info.replacen(
            "<ds:SignedInfo>",
            &format!(r#"<ds:SignedInfo xmlns:ds="{XMLDSIG_NS}">"#),
            1,
        );
        let mut signer = Signer::new(MessageDigest::sha256(), &self.key)?;
        signer.update(canonical_signed_info.as_bytes())?;
        let signature_value = STANDARD.encode(signer.sign_to_vec()?);

        let signature = format!(
            concat!(
                r#"<ds:Signature xmlns:ds="{XMLDSIG_NS}">{signed_info}"#,
                r#"<ds:SignatureValue>{signature_value}</ds:SignatureValue>"#,
                r#"<ds:KeyInfo><ds:X509Data><ds:X509Certificate>{certificate}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>"#,
                r#"</ds:Signature>"#,
            ),
            XMLDSIG_NS = XMLDSIG_NS,
            signed_info = signed_info,
            signature_value = signature_value,
            certificate = self.certificate_b64,
        );

        let document = format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<samlp:Response xmlns:samlp="{SAML_PROTOCOL_NS}" xmlns:saml="{SAML_ASSERTION_NS}" Destination="{destination}" ID="{response_id}"{in_response_to} IssueInstant="{issue_instant}" Version="2.0">"#,
                r#"<saml:Issuer>{issuer}</saml:Issuer>"#,
                r#"<samlp:Status><samlp:StatusCode Value="{STATUS_SUCCESS}"></samlp:StatusCode></samlp:Status>"#,
                r#"{head}{signature}{tail}</samlp:Response>"#,
            ),
            SAML_PROTOCOL_NS = SAML_PROTOCOL_NS,
            SAML_ASSERTION_NS = SAML_ASSERTION_NS,
            destination = escape_attr(&request.recipient),
            response_id = new_id(),
            in_response_to = in_response_to_attr,
            issue_instant = issue_instant,
            issuer = escape_text(&self.entity_id),
            STATUS_SUCCESS = STATUS_SUCCESS,
            head = head,
            signature = signature,
            tail = tail,
        );

        Ok(SignedAssertion {
            document: document.into_bytes(),
            assertion_id,
        })
    }
}

#[async_trait]
impl AssertionSigner for XmlDsigSigner {
    async fn sign(&self, request: &SigningRequest) -> Result<SignedAssertion, SignerError> {
        self.sign_at(request, Utc::now())
    }
}

fn seconds(secs: u64) -> Result<TimeDelta, SignerError> {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| SignerError::InvalidInput(format!("{secs} seconds is out of range")))
}

/// SAML IDs are xsd:ID, which must not start with a digit.
fn new_id() -> String {
    format!("_{}", uuid::Uuid::new_v4().simple())
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn check_xml_chars(field: &str, value: &str) -> Result<(), SignerError> {
    let invalid = value
        .chars()
        .any(|c| (c < '\u{20}' && !matches!(c, '\t' | '\n' | '\r')) || matches!(c, '\u{FFFE}' | '\u{FFFF}'));
    if invalid {
        return Err(SignerError::InvalidInput(format!(
            "{field} contains characters not allowed in XML"
        )));
    }
    Ok(())
}

fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
    out
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
    out
}
