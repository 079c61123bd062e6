//! SAML 2.0 HTTP bindings.
//!
//! Incoming AuthnRequests arrive over HTTP-Redirect (deflated, base64) or
//! HTTP-POST (base64). Responses always leave over HTTP-POST as an
//! auto-submitting form.

mod binding;
mod request;

pub use binding::{auto_submit_response, login_form};
pub use request::{
    AuthnRequest, SamlRequestError, decode_post, decode_redirect, encode_post,
    parse_authn_request,
};
