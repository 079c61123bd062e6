//! Consolidated test modules.
//!
//! `support` holds fixtures shared by unit tests across the crate; `sso_e2e`
//! drives the full router through both SAML bindings.

pub(crate) mod support;
