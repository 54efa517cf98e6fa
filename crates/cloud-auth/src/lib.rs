//! Credential lifecycle for the cloud API
//!
//! Every API call needs a bearer token obtained by a login exchange with a
//! client id/secret. This crate decodes those tokens, performs the login,
//! and caches the result per client with single-flight refresh.
//!
//! Flow:
//! 1. Client builds an `HttpAuthenticator` from its id/secret
//! 2. `CredentialCache::get_token()` logs in on first use
//! 3. Later calls reuse the cached `Token` until it nears `exp`
//! 4. The first call inside the refresh margin logs in again; concurrent
//!    callers wait on that same login

pub mod cache;
pub mod clock;
pub mod constants;
pub mod error;
pub mod token;

pub use cache::CredentialCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use constants::*;
pub use error::{Error, Result};
pub use token::{Authenticator, HttpAuthenticator, Token};
