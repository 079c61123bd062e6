//! Subject authentication.
//!
//! The issuer gate trusts whatever subject it is handed. This module is the
//! boundary that decides who that subject is; a verifier that approves
//! everything makes every tenant's assertions forgeable, so the test stub is
//! refused by config validation on non-loopback binds.

mod credentials;
mod error;
mod verifier;

pub use credentials::{CredentialBackend, StaticCredentials};
pub use error::AuthError;
pub use verifier::{
    AuthenticationVerifier, PasswordCredentials, PasswordVerifier, SsoVerifier,
    TestStubVerifier, Verification, VerificationInput,
};
