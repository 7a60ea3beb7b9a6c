//! The workspace item lookup contract and its HTTP implementation
//!
//! The engine defines the call shape only; transport policy (timeouts,
//! retries) belongs to the HTTP collaborator behind it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("unexpected response ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },
}

/// A pipeline item in the target workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceItem {
    pub id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(rename = "type")]
    pub item_type: String,
}

/// Lookup contract against the target workspace's item API.
#[async_trait]
pub trait WorkspaceClient: Send + Sync {
    /// Look up a pipeline item by display name. `Ok(None)` means the
    /// workspace has no pipeline with that name.
    async fn get_item_by_name(
        &self,
        workspace_id: &str,
        name: &str,
        token: &str,
    ) -> Result<Option<WorkspaceItem>, ClientError>;

    /// Fetch a pipeline item by id. `Ok(None)` means the id no longer
    /// exists.
    async fn get_item(
        &self,
        workspace_id: &str,
        item_id: &str,
        token: &str,
    ) -> Result<Option<WorkspaceItem>, ClientError>;
}

#[derive(Debug, Deserialize)]
struct ItemListResponse {
    value: Vec<WorkspaceItem>,
}

/// reqwest-backed implementation of [`WorkspaceClient`]. The base URL is
/// a parameter so tests can point it at a mock server.
pub struct HttpWorkspaceClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpWorkspaceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        token: &str,
    ) -> Result<Option<T>, ClientError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| ClientError::Transport(err.to_string()))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ClientError::Unauthorized(format!("{url} returned {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::UnexpectedResponse {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|err| ClientError::Transport(err.to_string()))
    }
}

#[async_trait]
impl WorkspaceClient for HttpWorkspaceClient {
    async fn get_item_by_name(
        &self,
        workspace_id: &str,
        name: &str,
        token: &str,
    ) -> Result<Option<WorkspaceItem>, ClientError> {
        let url = format!(
            "{}/v1/workspaces/{workspace_id}/items?type=DataPipeline",
            self.base_url
        );
        debug!(%workspace_id, %name, "listing workspace pipelines");
        let listing: Option<ItemListResponse> = self.get_json(&url, token).await?;
        Ok(listing.and_then(|listing| {
            listing
                .value
                .into_iter()
                .find(|item| item.display_name == name)
        }))
    }

    async fn get_item(
        &self,
        workspace_id: &str,
        item_id: &str,
        token: &str,
    ) -> Result<Option<WorkspaceItem>, ClientError> {
        let url = format!(
            "{}/v1/workspaces/{workspace_id}/items/{item_id}",
            self.base_url
        );
        debug!(%workspace_id, %item_id, "fetching workspace item");
        self.get_json(&url, token).await
    }
}
