//! Shared test fixtures: signing identities and a recording signer.

use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;
use openssl::{
    asn1::Asn1Time,
    bn::BigNum,
    hash::MessageDigest,
    pkey::PKey,
    rsa::Rsa,
    x509::{X509Builder, X509NameBuilder},
};

use crate::{
    config::IdpConfig,
    issuer::{AssertionSigner, SignedAssertion, SignerError, SigningRequest},
};

/// PEM-encoded signing identity.
pub struct TestKeyPair {
    pub certificate_pem: String,
    pub private_key_pem: String,
}

/// Generate a self-signed RSA-2048 certificate and its PKCS#8 key.
pub fn generate_key_pair(common_name: &str) -> TestKeyPair {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", common_name).unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(365).unwrap())
        .unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();
    let certificate = builder.build();

    TestKeyPair {
        certificate_pem: String::from_utf8(certificate.to_pem().unwrap()).unwrap(),
        private_key_pem: String::from_utf8(key.private_key_to_pem_pkcs8().unwrap()).unwrap(),
    }
}

/// Key generation is slow; tests share one identity.
pub fn test_key_pair() -> &'static TestKeyPair {
    static KEYS: OnceLock<TestKeyPair> = OnceLock::new();
    KEYS.get_or_init(|| generate_key_pair("idp.example.com"))
}

/// `[idp]` section with inline PEM material.
pub fn test_idp_config(keys: &TestKeyPair) -> IdpConfig {
    IdpConfig {
        entity_id: "https://idp.example.com/saml/metadata".into(),
        certificate: Some(keys.certificate_pem.clone()),
        certificate_path: None,
        private_key: Some(keys.private_key_pem.clone()),
        private_key_path: None,
        assertion_lifetime_secs: 300,
        clock_skew_secs: 60,
        name_id_format: "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress".into(),
        max_request_bytes: 256 * 1024,
    }
}

/// Signer that records each request and returns a predictable document.
#[derive(Default)]
pub struct RecordingSigner {
    calls: Mutex<Vec<SigningRequest>>,
}

impl RecordingSigner {
    pub fn calls(&self) -> Vec<SigningRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// The document returned for `subject`.
    pub fn document_for(subject: &str) -> Vec<u8> {
        format!("signed:{subject}").into_bytes()
    }
}

#[async_trait]
impl AssertionSigner for RecordingSigner {
    async fn sign(&self, request: &SigningRequest) -> Result<SignedAssertion, SignerError> {
        self.calls.lock().unwrap().push(request.clone());
        Ok(SignedAssertion {
            document: Self::document_for(request.subject.as_str()),
            assertion_id: format!("_recorded{}", self.calls.lock().unwrap().len()),
        })
    }
}
