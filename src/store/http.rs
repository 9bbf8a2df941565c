//! HTTP transform store: client for this crate's REST routes.
//!
//! Thin wrapper over `reqwest`. Status handling lives in pure functions so it
//! can be tested without a server.

use std::time::Duration;

use reqwest::Url;

use serde::Serialize;

use super::{StoreError, StoreOutcome, StoredBatch, TransformStore};
use crate::sync::{TransformAction, TransformBatch, WorkspaceId};

const REQUEST_TIMEOUT_SECS: u64 = 10;
const CONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Serialize)]
struct StoreRequest<'a> {
    actions: &'a [TransformAction],
}

pub struct HttpTransformStore {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpTransformStore {
    /// Build a client for the server at `base_url`, authenticating with the
    /// session `token` when given.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transport`] if `base_url` is not an absolute
    /// http(s) URL or the HTTP client cannot be built.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, StoreError> {
        let base_url = Url::parse(base_url).map_err(|e| StoreError::Transport(format!("invalid base url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::Transport(format!("invalid base url: {base_url}")));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self { http, base_url, token })
    }

    fn request(&self, method: reqwest::Method, workspace_id: WorkspaceId, node_id: &str) -> reqwest::RequestBuilder {
        let url = transforms_url(&self.base_url, workspace_id, node_id);
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait::async_trait]
impl TransformStore for HttpTransformStore {
    async fn store(
        &self,
        workspace_id: WorkspaceId,
        node_id: &str,
        actions: &[TransformAction],
    ) -> Result<StoreOutcome, StoreError> {
        let response = self
            .request(reqwest::Method::POST, workspace_id, node_id)
            .json(&StoreRequest { actions })
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        parse_store_response(status, &body, workspace_id)
    }

    async fn find(&self, workspace_id: WorkspaceId, node_id: &str) -> Result<Option<TransformBatch>, StoreError> {
        let response = self
            .request(reqwest::Method::GET, workspace_id, node_id)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        parse_find_response(status, &body, workspace_id)
    }
}

// =============================================================================
// PURE HELPERS
// =============================================================================

/// Route for one node's batch under `base_url`. Each segment is
/// percent-encoded, so a node id containing `/` stays a single segment.
pub(crate) fn transforms_url(base_url: &Url, workspace_id: WorkspaceId, node_id: &str) -> Url {
    let mut url = base_url.clone();
    let workspace = workspace_id.to_string();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments
            .pop_if_empty()
            .extend(["api", "workspaces", workspace.as_str(), "nodes", node_id, "transforms"]);
    }
    url
}

fn status_error(status: u16, body: &str, workspace_id: WorkspaceId) -> StoreError {
    match status {
        401 => StoreError::Unauthenticated,
        404 => StoreError::WorkspaceNotFound(workspace_id),
        _ => StoreError::Response { status, body: body.to_owned() },
    }
}

pub(crate) fn parse_store_response(status: u16, body: &str, workspace_id: WorkspaceId) -> Result<StoreOutcome, StoreError> {
    if status != 200 {
        return Err(status_error(status, body, workspace_id));
    }
    serde_json::from_str(body).map_err(|e| StoreError::Decode(e.to_string()))
}

pub(crate) fn parse_find_response(
    status: u16,
    body: &str,
    workspace_id: WorkspaceId,
) -> Result<Option<TransformBatch>, StoreError> {
    if status != 200 {
        return Err(status_error(status, body, workspace_id));
    }
    let stored: Option<StoredBatch> = serde_json::from_str(body).map_err(|e| StoreError::Decode(e.to_string()))?;
    Ok(stored.map(|s| s.actions))
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
