use std::{borrow::Cow, sync::LazyLock};

use regex::Regex;
use validator::ValidationError;

/// A single DNS label: letters, digits and inner hyphens, 1 to 63 characters.
/// Examples: "acme", "acme-eu", "a1"
pub static DNS_LABEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?$").unwrap()
});

pub fn is_valid_dns_label(label: &str) -> bool {
    DNS_LABEL_REGEX.is_match(label)
}

/// Validate a stored tenant subdomain.
///
/// Stored keys are canonical: a valid DNS label in lowercase.
pub fn validate_subdomain(subdomain: &str) -> Result<(), ValidationError> {
    if !is_valid_dns_label(subdomain) {
        let mut err = ValidationError::new("invalid_subdomain");
        err.message = Some(Cow::Owned(format!(
            "'{}' is not a valid DNS label",
            subdomain
        )));
        return Err(err);
    }
    if subdomain.bytes().any(|b| b.is_ascii_uppercase()) {
        let mut err = ValidationError::new("subdomain_not_canonical");
        err.message = Some(Cow::Borrowed("Tenant subdomains must be lowercase"));
        return Err(err);
    }
    Ok(())
}
