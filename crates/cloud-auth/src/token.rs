//! Bearer tokens and the login exchange
//!
//! The login endpoint takes the client id/secret pair and answers with a
//! signed JWT. Identity (`userId`, `tenantId`) and timing (`iat`, `exp`)
//! are read from the token's payload segment; the signature is the
//! server's business and is not verified here.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// A bearer credential with the identity claims it was issued for.
///
/// Tokens are never mutated: a refresh produces a new `Token`.
#[derive(Debug, Clone)]
pub struct Token {
    raw: Secret<String>,
    /// Unix milliseconds
    issued_at: u64,
    /// Unix milliseconds
    expires_at: u64,
    user_id: String,
    tenant_id: String,
}

/// Claims read from the JWT payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Claims {
    #[serde(default)]
    exp: Option<u64>,
    #[serde(default)]
    iat: Option<u64>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    tenant_id: Option<String>,
}

impl Token {
    /// Decode a raw JWT into a `Token`.
    ///
    /// `now_millis` fills in `issued_at` when `iat` is absent, and
    /// `default_lifetime` fills in `expires_at` when `exp` is absent.
    /// Missing `userId`/`tenantId` is `InvalidClaims`; a token that is
    /// already past `exp` is `Expired`.
    pub fn decode(raw: String, now_millis: u64, default_lifetime: Duration) -> Result<Self> {
        let claims = decode_claims(&raw)?;

        let user_id = claims
            .user_id
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::InvalidClaims("token has no userId claim".into()))?;
        let tenant_id = claims
            .tenant_id
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::InvalidClaims("token has no tenantId claim".into()))?;

        let issued_at = match claims.iat {
            Some(iat) => claim_millis("iat", iat)?,
            None => now_millis,
        };
        let expires_at = match claims.exp {
            Some(exp) => claim_millis("exp", exp)?,
            None => now_millis.saturating_add(duration_millis(default_lifetime)),
        };
        if expires_at <= now_millis {
            return Err(Error::Expired(format!(
                "login returned a token that expired at {expires_at} (now {now_millis})"
            )));
        }

        Ok(Self {
            raw: Secret::new(raw),
            issued_at,
            expires_at,
            user_id,
            tenant_id,
        })
    }

    /// The opaque bearer credential.
    pub fn raw(&self) -> &str {
        self.raw.expose()
    }

    /// `Authorization` header value.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.raw.expose())
    }

    pub fn issued_at_millis(&self) -> u64 {
        self.issued_at
    }

    pub fn expires_at_millis(&self) -> u64 {
        self.expires_at
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Whether the token can still be handed out at `now_millis`, keeping
    /// `margin` in reserve before `exp`.
    pub fn is_fresh(&self, now_millis: u64, margin: Duration) -> bool {
        now_millis.saturating_add(duration_millis(margin)) < self.expires_at
    }
}

/// Seconds claim to Unix milliseconds; out of range is `InvalidClaims`.
fn claim_millis(claim: &str, secs: u64) -> Result<u64> {
    secs.checked_mul(1000).ok_or_else(|| {
        Error::InvalidClaims(format!("{claim} claim {secs} is out of range"))
    })
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn decode_claims(raw: &str) -> Result<Claims> {
    let mut segments = raw.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => {
            return Err(Error::InvalidClaims(
                "token is not a three-segment JWT".into(),
            ));
        }
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| Error::InvalidClaims(format!("payload is not base64url: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::InvalidClaims(format!("payload is not a claims object: {e}")))
}

/// Performs the login exchange and returns the raw token text.
///
/// Uses `Pin<Box<dyn Future>>` so the cache can hold `Arc<dyn Authenticator>`.
pub trait Authenticator: Send + Sync {
    fn login(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    id: &'a str,
    secret: &'a str,
}

/// Login against the API's personal access token endpoint.
pub struct HttpAuthenticator {
    http: reqwest::Client,
    endpoint: String,
    client_id: String,
    secret: Secret<String>,
}

impl HttpAuthenticator {
    /// `api_root` is `{base_url}{api_suffix}`, e.g. `https://api.example.com/api`.
    pub fn new(
        http: reqwest::Client,
        api_root: &str,
        client_id: String,
        secret: Secret<String>,
    ) -> Self {
        let endpoint = format!(
            "{}{}",
            api_root.trim_end_matches('/'),
            crate::constants::LOGIN_PATH
        );
        Self {
            http,
            endpoint,
            client_id,
            secret,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn exchange(&self) -> Result<String> {
        debug!(endpoint = %self.endpoint, client_id = %self.client_id, "logging in");
        let response = self
            .http
            .post(&self.endpoint)
            .json(&LoginRequest {
                id: &self.client_id,
                secret: self.secret.expose(),
            })
            .send()
            .await
            .map_err(|e| Error::Http(format!("login request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("reading login response: {e}")))?;

        if !status.is_success() {
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(Error::InvalidCredentials(format!(
                    "login rejected ({status}): {body}"
                )));
            }
            return Err(Error::Login(format!("login returned {status}: {body}")));
        }

        parse_login_body(&body)
    }
}

impl Authenticator for HttpAuthenticator {
    fn login(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(self.exchange())
    }
}

/// The endpoint answers with the bare JWT, occasionally JSON-quoted.
fn parse_login_body(body: &str) -> Result<String> {
    let trimmed = body.trim();
    let raw = if trimmed.starts_with('"') {
        serde_json::from_str::<String>(trimmed)
            .map_err(|e| Error::Login(format!("invalid login response: {e}")))?
    } else {
        trimmed.to_owned()
    };
    if raw.is_empty() {
        return Err(Error::Login("login response carried no token".into()));
    }
    Ok(raw)
}
