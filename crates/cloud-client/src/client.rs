//! Resource client façade
//!
//! One `ResourceClient` per API account. It owns the credential cache, the
//! authenticated transport and the operation tracker, so every resource
//! call and every status poll shares a single token.

use std::sync::Arc;

use cloud_activity::{
    ApiTransport, Error, HttpOperationSource, Operation, OperationKind, OperationTracker,
    PollConfig, Result,
};
use cloud_auth::{CredentialCache, HttpAuthenticator, Token};
use common::Secret;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::resource::{Filter, ResourceKind};

/// A personal access token belonging to the authenticated user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalAccessToken {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

pub struct ResourceClient {
    transport: Arc<ApiTransport>,
    tracker: OperationTracker,
    activity_polling: PollConfig,
    backup_job_polling: PollConfig,
}

impl ResourceClient {
    /// Build a client over an existing credential cache.
    pub fn new(http: reqwest::Client, api_root: &str, credentials: Arc<CredentialCache>) -> Self {
        let transport = Arc::new(ApiTransport::new(http, api_root, credentials));
        let tracker = OperationTracker::new(Arc::new(HttpOperationSource::new(transport.clone())));
        Self {
            transport,
            tracker,
            activity_polling: PollConfig::for_kind(OperationKind::Activity),
            backup_job_polling: PollConfig::for_kind(OperationKind::BackupJob),
        }
    }

    /// Build a client that logs in with a client id and secret.
    pub fn connect(
        http: reqwest::Client,
        api_root: &str,
        client_id: String,
        secret: Secret<String>,
    ) -> Self {
        let authenticator = HttpAuthenticator::new(http.clone(), api_root, client_id, secret);
        let credentials = Arc::new(CredentialCache::new(Arc::new(authenticator)));
        Self::new(http, api_root, credentials)
    }

    /// Override the poll settings used for one operation kind.
    pub fn with_polling(mut self, kind: OperationKind, config: PollConfig) -> Self {
        match kind {
            OperationKind::Activity => self.activity_polling = config,
            OperationKind::BackupJob => self.backup_job_polling = config,
        }
        self
    }

    pub fn credentials(&self) -> &Arc<CredentialCache> {
        self.transport.credentials()
    }

    pub fn polling(&self, kind: OperationKind) -> &PollConfig {
        match kind {
            OperationKind::Activity => &self.activity_polling,
            OperationKind::BackupJob => &self.backup_job_polling,
        }
    }

    /// Current valid token, logging in if needed.
    pub async fn token(&self) -> Result<Arc<Token>> {
        Ok(self.credentials().get_token().await?)
    }

    /// List a collection. A collection the API does not serve lists as empty.
    pub async fn list<T: DeserializeOwned>(
        &self,
        kind: &ResourceKind,
        filter: &dyn Filter,
    ) -> Result<Vec<T>> {
        let query = filter.query();
        debug!(kind = kind.name, filters = query.len(), "listing collection");
        let items: Option<Vec<T>> = self.transport.get_json(kind.collection, &query).await?;
        Ok(items.unwrap_or_default())
    }

    /// Read one item. A missing id is `NotFound` naming the resource kind.
    pub async fn read<T: DeserializeOwned>(&self, kind: &ResourceKind, id: &str) -> Result<T> {
        self.transport
            .get_json(&kind.item_path(id), &[])
            .await?
            .ok_or_else(|| Error::not_found(kind.name, id))
    }

    /// Issue a mutating call and return the id of the activity it started.
    pub async fn start_activity(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<String> {
        let response = self
            .transport
            .send(method.clone(), path, body)
            .await?
            .ok_or_else(|| Error::Transport(format!("{method} {path} returned 404")))?;
        let id = activity_id(&response).ok_or_else(|| {
            Error::Transport(format!("{method} {path} returned no activity id: {response}"))
        })?;
        info!(%method, path, activity_id = %id, "activity started");
        Ok(id)
    }

    /// Personal access tokens of the user the current token belongs to.
    pub async fn personal_access_tokens(&self) -> Result<Vec<PersonalAccessToken>> {
        let token = self.token().await?;
        let path = format!(
            "/iam/v2/users/{}/tenants/{}/personal_access_tokens",
            token.user_id(),
            token.tenant_id()
        );
        let tokens: Option<Vec<PersonalAccessToken>> = self.transport.get_json(&path, &[]).await?;
        Ok(tokens.unwrap_or_default())
    }

    pub async fn wait_for_activity(&self, id: &str, cancel: &CancellationToken) -> Result<Operation> {
        self.tracker
            .wait_for_completion(OperationKind::Activity, id, &self.activity_polling, cancel)
            .await
    }

    pub async fn wait_for_backup_job(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Operation> {
        self.tracker
            .wait_for_completion(OperationKind::BackupJob, id, &self.backup_job_polling, cancel)
            .await
    }

    /// `start_activity` followed by `wait_for_activity`.
    pub async fn run_activity(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        cancel: &CancellationToken,
    ) -> Result<Operation> {
        let id = self.start_activity(method, path, body).await?;
        self.wait_for_activity(&id, cancel).await
    }
}

/// Activity id from a mutating call's response: a JSON string, an object
/// with `activityId`/`id`, or the bare body text.
fn activity_id(body: &str) -> Option<String> {
    let id = match serde_json::from_str::<Value>(body) {
        Ok(Value::String(id)) => id,
        Ok(Value::Object(fields)) => ["activityId", "activity_id", "id"]
            .iter()
            .find_map(|key| fields.get(*key).and_then(Value::as_str))?
            .to_string(),
        Ok(_) => return None,
        Err(_) => body.trim().to_string(),
    };
    (!id.is_empty()).then_some(id)
}
