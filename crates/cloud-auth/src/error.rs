//! Error types for login and token handling

/// Errors from the login exchange and token decoding.
///
/// `Clone` so a single in-flight login can hand the same failure to every
/// caller waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("login failed: {0}")]
    Login(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("invalid token claims: {0}")]
    InvalidClaims(String),

    #[error("token expired: {0}")]
    Expired(String),
}

impl Error {
    /// Fatal errors are configuration problems that another login cannot fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::InvalidClaims(_))
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
