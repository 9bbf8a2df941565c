//! Transform batch routes: REST surface over the Postgres store.
//!
//! ERROR HANDLING
//! ==============
//! Store errors map to status codes in one place, `store_error_to_status`.
//! A workspace the caller does not own is reported as 404 rather than 403 so
//! workspace ids are not enumerable.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;

use super::auth::AuthUser;
use crate::state::AppState;
use crate::store::postgres::{find_batch, upsert_batch};
use crate::store::{StoreError, StoreOutcome, StoredBatch};
use crate::sync::{NodeId, TransformBatch, WorkspaceId, is_monotonic};

#[derive(Debug, Deserialize)]
pub struct StoreBody {
    pub actions: TransformBatch,
}

pub(crate) fn store_error_to_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::Unauthenticated => StatusCode::UNAUTHORIZED,
        StoreError::WorkspaceNotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Database(_) | StoreError::Decode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        StoreError::Transport(_) | StoreError::Response { .. } => StatusCode::BAD_GATEWAY,
    }
}

fn log_store_error(err: &StoreError, workspace_id: WorkspaceId, node_id: &str) -> StatusCode {
    let status = store_error_to_status(err);
    if status.is_server_error() {
        tracing::error!(error = %err, code = err.error_code(), workspace_id, node_id, "transform store failed");
    } else {
        tracing::debug!(error = %err, code = err.error_code(), workspace_id, node_id, "transform request rejected");
    }
    status
}

/// `POST /api/workspaces/{workspace_id}/nodes/{node_id}/transforms`
pub async fn store_transforms(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((workspace_id, node_id)): Path<(WorkspaceId, NodeId)>,
    Json(body): Json<StoreBody>,
) -> Result<Json<StoreOutcome>, StatusCode> {
    if workspace_id < 1 || !is_monotonic(&body.actions) {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let outcome = upsert_batch(&state.pool, &auth.subject, workspace_id, &node_id, &body.actions)
        .await
        .map_err(|e| log_store_error(&e, workspace_id, &node_id))?;

    tracing::debug!(workspace_id, node_id, actions = body.actions.len(), inserted = outcome.inserted, "transform batch stored");
    Ok(Json(outcome))
}

/// `GET /api/workspaces/{workspace_id}/nodes/{node_id}/transforms`
///
/// Responds `null` when nothing is stored or the caller does not own the
/// workspace.
pub async fn find_transforms(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((workspace_id, node_id)): Path<(WorkspaceId, NodeId)>,
) -> Result<Json<Option<StoredBatch>>, StatusCode> {
    let actions = find_batch(&state.pool, &auth.subject, workspace_id, &node_id)
        .await
        .map_err(|e| log_store_error(&e, workspace_id, &node_id))?;

    Ok(Json(actions.map(|actions| StoredBatch { workspace_id, node_id, actions })))
}

#[cfg(test)]
#[path = "transforms_test.rs"]
mod tests;
