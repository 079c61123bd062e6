use std::fmt;

#[derive(Debug)]
pub enum AuthError {
    /// Required identity header missing, or sent by an untrusted peer
    MissingIdentity,

    /// Credentials were provided but are invalid (generic, prevents enumeration)
    InvalidCredentials,

    /// Internal error during authentication
    Internal(String),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingIdentity => "missing_identity",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::Internal(_) => "internal_error",
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingIdentity => write!(f, "Identity header required"),
            AuthError::InvalidCredentials => write!(f, "Invalid authentication credentials"),
            AuthError::Internal(msg) => write!(f, "Internal authentication error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}
