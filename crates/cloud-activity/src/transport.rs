//! Authenticated JSON transport
//!
//! Every request asks the credential cache for a token first. A 404 is
//! returned as `None` so callers can turn it into a kind-specific
//! `NotFound`; a 401 drops the cached token if it is still the one that was
//! sent (the server no longer accepts it) and surfaces as an authentication
//! error. Nothing is retried here.

use std::sync::Arc;

use cloud_auth::CredentialCache;
use reqwest::Method;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// HTTP access to the API root with bearer authentication.
pub struct ApiTransport {
    http: reqwest::Client,
    api_root: String,
    credentials: Arc<CredentialCache>,
}

impl ApiTransport {
    /// `api_root` is `{base_url}{api_suffix}`.
    pub fn new(http: reqwest::Client, api_root: &str, credentials: Arc<CredentialCache>) -> Self {
        Self {
            http,
            api_root: api_root.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialCache> {
        &self.credentials
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_root, path)
    }

    /// GET `path` and decode the JSON body. `Ok(None)` on 404.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Option<T>> {
        let Some(body) = self.execute(Method::GET, path, query, None).await? else {
            return Ok(None);
        };
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| Error::Transport(format!("decoding GET {path}: {e}")))
    }

    /// Send a request with an optional JSON body and return the raw response
    /// body. `Ok(None)` on 404.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Option<String>> {
        self.execute(method, path, &[], body).await
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<Option<String>> {
        let token = self.credentials.get_token().await?;
        let url = self.url(path);

        let mut request = self
            .http
            .request(method.clone(), &url)
            .header(reqwest::header::AUTHORIZATION, token.bearer());
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(%method, path, "sending API request");
        let response = request
            .send()
            .await
            .map_err(|e| Error::Transport(format!("{method} {path} failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("reading {method} {path} response: {e}")))?;

        match status {
            s if s.is_success() => Ok(Some(text)),
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::UNAUTHORIZED => {
                warn!(%method, path, "API rejected bearer token, invalidating cache");
                self.credentials.invalidate_token(&token).await;
                Err(Error::Authentication(cloud_auth::Error::InvalidCredentials(
                    format!("{method} {path} returned {status}: {text}"),
                )))
            }
            _ => Err(Error::Transport(format!(
                "{method} {path} returned {status}: {text}"
            ))),
        }
    }
}
